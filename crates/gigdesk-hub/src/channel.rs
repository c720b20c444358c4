use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use gigdesk_types::events::{HubCommand, HubEvent};
use gigdesk_types::models::{Chat, Message};

use crate::backoff::ReconnectPolicy;
use crate::connector::{Connector, Link};
use crate::error::HubError;
use crate::protocol::{self, HubMessage};
use crate::state::{ConnectionMachine, ConnectionState};

/// Keepalive interval: the client pings the hub every 15 seconds.
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// What the channel listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Room {
    /// A single conversation: joined on connect, messages of other chats dropped.
    Chat(Uuid),
    /// The chat list feed: joins nothing, forwards everything.
    Inbox,
}

impl Room {
    pub fn chat_id(&self) -> Option<Uuid> {
        match self {
            Self::Chat(id) => Some(*id),
            Self::Inbox => None,
        }
    }

    fn accepts(&self, chat_id: Uuid) -> bool {
        match self {
            Self::Chat(id) => *id == chat_id,
            Self::Inbox => true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub room: Room,
    pub local_user: Uuid,
    pub policy: ReconnectPolicy,
    pub keepalive: Duration,
}

impl ChannelConfig {
    pub fn chat(chat_id: Uuid, local_user: Uuid) -> Self {
        Self {
            room: Room::Chat(chat_id),
            local_user,
            policy: ReconnectPolicy::default(),
            keepalive: KEEPALIVE_INTERVAL,
        }
    }

    pub fn inbox(local_user: Uuid) -> Self {
        Self {
            room: Room::Inbox,
            ..Self::chat(Uuid::nil(), local_user)
        }
    }
}

/// Everything the channel reports, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    MessageCreated(Message),
    MessageUpdated(Message),
    MessageDeleted(Uuid),
    /// Id of the participant who is typing.
    Typing(Uuid),
    ChatsUpdated(Vec<Chat>),
    ConnectionStateChanged(ConnectionState),
    Error { message: String, retryable: bool },
}

/// One hub connection bound to one room.
///
/// Created idle; [`start`](Self::start) spawns the driver task that dials,
/// joins the room, pumps frames and walks the reconnect schedule after a
/// drop. Dropping the channel stops it.
pub struct LiveChannel {
    inner: Arc<Inner>,
}

struct Inner {
    config: ChannelConfig,
    connector: Arc<dyn Connector>,
    machine: Mutex<ConnectionMachine>,
    // Lock order: machine, then outbound.
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
    cancel: Mutex<CancellationToken>,
    events: mpsc::UnboundedSender<ChannelEvent>,
}

enum PumpExit {
    Cancelled,
    Lost,
}

impl LiveChannel {
    pub fn new(
        config: ChannelConfig,
        connector: Arc<dyn Connector>,
    ) -> (Self, mpsc::UnboundedReceiver<ChannelEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let inner = Arc::new(Inner {
            config,
            connector,
            machine: Mutex::new(ConnectionMachine::new()),
            outbound: Mutex::new(None),
            cancel: Mutex::new(CancellationToken::new()),
            events,
        });
        (Self { inner }, rx)
    }

    pub fn room(&self) -> Room {
        self.inner.config.room
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.machine.lock().state()
    }

    /// Start connecting. Returns false (and does nothing) unless the channel
    /// is Disconnected.
    pub fn start(&self) -> bool {
        let epoch = {
            let mut machine = self.inner.machine.lock();
            let Some(epoch) = machine.begin_connect() else {
                debug!("hub channel already {:?}, start ignored", machine.state());
                return false;
            };
            self.inner.emit_state(ConnectionState::Connecting);
            epoch
        };

        let cancel = CancellationToken::new();
        *self.inner.cancel.lock() = cancel.clone();

        let inner = self.inner.clone();
        tokio::spawn(async move {
            inner.drive(epoch, cancel).await;
        });
        true
    }

    /// Tear down the connection and any pending reconnect. Returns false if
    /// the channel was already stopped.
    pub fn stop(&self) -> bool {
        let mut machine = self.inner.machine.lock();
        let stopped = machine.stop();
        self.inner.cancel.lock().cancel();
        self.inner.outbound.lock().take();
        if stopped {
            info!("hub channel stopped");
            self.inner.emit_state(ConnectionState::Disconnected);
        }
        stopped
    }

    pub fn notify_typing(&self) -> Result<(), HubError> {
        let chat_id = self.room().chat_id().ok_or(HubError::NoRoom)?;
        self.inner.invoke(HubCommand::NotifyTyping { chat_id })
    }

    pub fn mark_read(&self) -> Result<(), HubError> {
        let chat_id = self.room().chat_id().ok_or(HubError::NoRoom)?;
        self.inner.invoke(HubCommand::MarkChatAsRead { chat_id })
    }
}

impl Drop for LiveChannel {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Inner {
    fn emit(&self, event: ChannelEvent) {
        // Receiver gone means nobody is listening any more.
        let _ = self.events.send(event);
    }

    fn emit_state(&self, state: ConnectionState) {
        self.emit(ChannelEvent::ConnectionStateChanged(state));
    }

    fn invoke(&self, cmd: HubCommand) -> Result<(), HubError> {
        let outbound = self.outbound.lock();
        let tx = outbound.as_ref().ok_or(HubError::NotConnected)?;
        tx.send(protocol::encode_command(&cmd))
            .map_err(|_| HubError::NotConnected)
    }

    async fn drive(self: Arc<Self>, epoch: u64, cancel: CancellationToken) {
        let first = tokio::select! {
            _ = cancel.cancelled() => return,
            res = self.connector.connect() => res,
        };
        let mut link = match first {
            Ok(link) => link,
            Err(e) => {
                warn!("hub connection failed: {}", e);
                self.give_up(epoch, format!("Не удалось подключиться к чату: {}", e));
                return;
            }
        };

        loop {
            if !self.established(epoch, &link) {
                return;
            }

            let exit = self.pump(&mut link, &cancel).await;
            drop(link);
            if let PumpExit::Cancelled = exit {
                return;
            }

            {
                let mut machine = self.machine.lock();
                self.outbound.lock().take();
                if !machine.lost(epoch) {
                    return;
                }
                warn!("hub connection lost");
                self.emit_state(ConnectionState::Reconnecting);
            }

            link = match self.reconnect(&cancel).await {
                Some(link) => link,
                None => {
                    if !cancel.is_cancelled() {
                        self.give_up(epoch, "Соединение с чатом потеряно".to_string());
                    }
                    return;
                }
            };
        }
    }

    /// Join the room and publish the link. False when this run was superseded.
    fn established(&self, epoch: u64, link: &Link) -> bool {
        let mut machine = self.machine.lock();
        if !machine.established(epoch) {
            return false;
        }

        if let Some(chat_id) = self.config.room.chat_id() {
            for cmd in [
                HubCommand::JoinChat { chat_id },
                HubCommand::MarkChatAsRead { chat_id },
            ] {
                let _ = link.outbound.send(protocol::encode_command(&cmd));
            }
        }
        *self.outbound.lock() = Some(link.outbound.clone());
        info!("hub channel connected ({:?})", self.config.room);
        self.emit_state(ConnectionState::Connected);
        true
    }

    fn give_up(&self, epoch: u64, message: String) {
        let mut machine = self.machine.lock();
        if machine.give_up(epoch) {
            self.emit(ChannelEvent::Error {
                message,
                retryable: true,
            });
            self.emit_state(ConnectionState::Disconnected);
        }
    }

    async fn pump(&self, link: &mut Link, cancel: &CancellationToken) -> PumpExit {
        let mut keepalive = tokio::time::interval(self.config.keepalive);
        keepalive.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return PumpExit::Cancelled,
                frame = link.inbound.recv() => {
                    let Some(raw) = frame else {
                        return PumpExit::Lost;
                    };
                    match protocol::decode(&raw) {
                        Ok(HubMessage::Invocation(event)) => self.dispatch(event),
                        Ok(HubMessage::Close { error, allow_reconnect }) => {
                            info!("hub sent close (error: {:?}, allow_reconnect: {})", error, allow_reconnect);
                            return PumpExit::Lost;
                        }
                        Ok(HubMessage::Completion { invocation_id, error: Some(error) }) => {
                            warn!("hub invocation {} failed: {}", invocation_id, error);
                        }
                        Ok(_) => {}
                        Err(e) => warn!("dropping malformed hub frame: {}", e),
                    }
                }
                _ = keepalive.tick() => {
                    if link.outbound.send(protocol::encode_ping()).is_err() {
                        return PumpExit::Lost;
                    }
                }
            }
        }
    }

    fn dispatch(&self, event: HubEvent) {
        if let Some(chat_id) = event.chat_id()
            && !self.config.room.accepts(chat_id)
        {
            debug!("dropping hub event for chat {}", chat_id);
            return;
        }

        let event = match event {
            HubEvent::ReceiveMessage(m) => ChannelEvent::MessageCreated(m),
            HubEvent::MessageUpdated(m) => ChannelEvent::MessageUpdated(m),
            HubEvent::MessageDeleted(id) => ChannelEvent::MessageDeleted(id),
            HubEvent::UserTyping(sender) if sender == self.config.local_user => return,
            HubEvent::UserTyping(sender) => ChannelEvent::Typing(sender),
            HubEvent::UpdateChats(chats) => ChannelEvent::ChatsUpdated(chats),
        };
        self.emit(event);
    }

    /// Walk the reconnect schedule. `None` once it is exhausted or cancelled.
    async fn reconnect(&self, cancel: &CancellationToken) -> Option<Link> {
        let policy = &self.config.policy;
        for attempt in 0..policy.max_attempts() {
            let delay = policy.delay_for(attempt)?;
            info!(
                "reconnecting to hub in {:?} (attempt {}/{})",
                delay,
                attempt + 1,
                policy.max_attempts()
            );

            tokio::select! {
                _ = cancel.cancelled() => return None,
                _ = tokio::time::sleep(delay) => {}
            }
            let res = tokio::select! {
                _ = cancel.cancelled() => return None,
                res = self.connector.connect() => res,
            };
            match res {
                Ok(link) => return Some(link),
                Err(e) => warn!("hub reconnect attempt {} failed: {}", attempt + 1, e),
            }
        }
        warn!("hub reconnect schedule exhausted, giving up");
        None
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde_json::{Value, json};

    use super::*;
    use crate::protocol::RECORD_SEPARATOR;

    struct ServerEnd {
        to_client: mpsc::UnboundedSender<String>,
        from_client: mpsc::UnboundedReceiver<String>,
    }

    type ConnectHook = Box<dyn FnOnce() + Send>;

    struct FakeConnector {
        attempts: AtomicUsize,
        failing: AtomicBool,
        servers: mpsc::UnboundedSender<ServerEnd>,
        // Runs once, after the link is handed out and before connect returns.
        on_connect: Mutex<Option<ConnectHook>>,
    }

    impl FakeConnector {
        fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ServerEnd>) {
            let (servers, rx) = mpsc::unbounded_channel();
            let fake = Arc::new(Self {
                attempts: AtomicUsize::new(0),
                failing: AtomicBool::new(false),
                servers,
                on_connect: Mutex::new(None),
            });
            (fake, rx)
        }

        fn attempts(&self) -> usize {
            self.attempts.load(Ordering::SeqCst)
        }

        fn set_failing(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }

        fn set_on_connect(&self, hook: impl FnOnce() + Send + 'static) {
            *self.on_connect.lock() = Some(Box::new(hook));
        }
    }

    #[async_trait]
    impl Connector for FakeConnector {
        async fn connect(&self) -> Result<Link, HubError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                return Err(HubError::Handshake("refused".into()));
            }
            let (to_client, inbound) = mpsc::unbounded_channel();
            let (outbound, from_client) = mpsc::unbounded_channel();
            let _ = self.servers.send(ServerEnd {
                to_client,
                from_client,
            });
            let hook = self.on_connect.lock().take();
            if let Some(hook) = hook {
                hook();
            }
            Ok(Link { outbound, inbound })
        }
    }

    /// Next non-ping frame the client sent.
    async fn next_frame(server: &mut ServerEnd) -> Value {
        loop {
            let raw = server.from_client.recv().await.expect("client closed");
            let body: Value = serde_json::from_str(raw.trim_end_matches(RECORD_SEPARATOR)).unwrap();
            if body["type"] != 6 {
                return body;
            }
        }
    }

    async fn next_event(events: &mut mpsc::UnboundedReceiver<ChannelEvent>) -> ChannelEvent {
        tokio::time::timeout(Duration::from_secs(60), events.recv())
            .await
            .expect("timed out waiting for channel event")
            .expect("event stream closed")
    }

    fn invocation(target: &str, argument: Value) -> String {
        let mut raw = json!({ "type": 1, "target": target, "arguments": [argument] }).to_string();
        raw.push(RECORD_SEPARATOR);
        raw
    }

    fn message_json(id: u128, chat_id: Uuid) -> Value {
        json!({
            "id": Uuid::from_u128(id),
            "chatId": chat_id,
            "senderId": Uuid::from_u128(5),
            "content": "hi",
            "sentAt": "2025-03-01T10:00:00Z",
        })
    }

    async fn connected_channel(
        config: ChannelConfig,
    ) -> (
        LiveChannel,
        mpsc::UnboundedReceiver<ChannelEvent>,
        Arc<FakeConnector>,
        mpsc::UnboundedReceiver<ServerEnd>,
        ServerEnd,
    ) {
        let (fake, mut servers) = FakeConnector::new();
        let (channel, mut events) = LiveChannel::new(config, fake.clone());
        assert!(channel.start());
        let server = servers.recv().await.unwrap();
        assert_eq!(
            next_event(&mut events).await,
            ChannelEvent::ConnectionStateChanged(ConnectionState::Connecting)
        );
        assert_eq!(
            next_event(&mut events).await,
            ChannelEvent::ConnectionStateChanged(ConnectionState::Connected)
        );
        (channel, events, fake, servers, server)
    }

    #[tokio::test]
    async fn test_start_is_idempotent_and_joins_then_marks_read() {
        let chat = Uuid::from_u128(9);
        let (fake, mut servers) = FakeConnector::new();
        let (channel, mut events) = LiveChannel::new(ChannelConfig::chat(chat, Uuid::from_u128(7)), fake.clone());

        assert!(channel.start());
        assert!(!channel.start());
        let mut server = servers.recv().await.unwrap();
        assert_eq!(
            next_event(&mut events).await,
            ChannelEvent::ConnectionStateChanged(ConnectionState::Connecting)
        );
        assert_eq!(
            next_event(&mut events).await,
            ChannelEvent::ConnectionStateChanged(ConnectionState::Connected)
        );
        assert!(!channel.start());
        assert_eq!(fake.attempts(), 1);

        let join = next_frame(&mut server).await;
        assert_eq!(join["target"], "JoinChat");
        assert_eq!(join["arguments"][0], chat.to_string());
        let read = next_frame(&mut server).await;
        assert_eq!(read["target"], "MarkChatAsRead");
    }

    #[tokio::test]
    async fn test_inbound_filtering() {
        let chat = Uuid::from_u128(9);
        let me = Uuid::from_u128(7);
        let peer = Uuid::from_u128(8);
        let (_channel, mut events, _fake, _servers, server) =
            connected_channel(ChannelConfig::chat(chat, me)).await;

        let send = |raw: String| server.to_client.send(raw).unwrap();
        send(invocation("ReceiveMessage", message_json(1, Uuid::from_u128(99))));
        send(invocation("MessageUpdated", message_json(2, Uuid::from_u128(99))));
        send(invocation("UserTyping", json!(me)));
        send(invocation("ReceiveMessage", message_json(3, chat)));
        send(invocation("UserTyping", json!(peer)));
        send(invocation("MessageDeleted", json!(Uuid::from_u128(3))));

        match next_event(&mut events).await {
            ChannelEvent::MessageCreated(m) => assert_eq!(m.id, Uuid::from_u128(3)),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(next_event(&mut events).await, ChannelEvent::Typing(peer));
        assert_eq!(
            next_event(&mut events).await,
            ChannelEvent::MessageDeleted(Uuid::from_u128(3))
        );
    }

    #[tokio::test]
    async fn test_inbox_joins_nothing_and_forwards_chat_list() {
        let (channel, mut events, _fake, _servers, mut server) =
            connected_channel(ChannelConfig::inbox(Uuid::from_u128(7))).await;

        assert!(matches!(channel.notify_typing(), Err(HubError::NoRoom)));
        server.to_client.send(invocation("UpdateChats", json!([]))).unwrap();
        assert_eq!(next_event(&mut events).await, ChannelEvent::ChatsUpdated(vec![]));

        channel.stop();
        while let Some(raw) = server.from_client.recv().await {
            assert!(raw.contains("\"type\":6"), "inbox sent {}", raw);
        }
    }

    #[tokio::test]
    async fn test_invocations_fail_fast_when_not_connected() {
        let (fake, _servers) = FakeConnector::new();
        let (channel, _events) = LiveChannel::new(ChannelConfig::chat(Uuid::from_u128(9), Uuid::from_u128(7)), fake);

        assert!(matches!(channel.notify_typing(), Err(HubError::NotConnected)));
        assert!(matches!(channel.mark_read(), Err(HubError::NotConnected)));
    }

    #[tokio::test]
    async fn test_notify_typing_when_connected() {
        let chat = Uuid::from_u128(9);
        let (channel, _events, _fake, _servers, mut server) =
            connected_channel(ChannelConfig::chat(chat, Uuid::from_u128(7))).await;

        next_frame(&mut server).await;
        next_frame(&mut server).await;
        channel.notify_typing().unwrap();
        let typing = next_frame(&mut server).await;
        assert_eq!(typing["target"], "NotifyTyping");
        assert_eq!(typing["arguments"][0], chat.to_string());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnects_after_drop_and_rejoins() {
        let chat = Uuid::from_u128(9);
        let (channel, mut events, fake, mut servers, server) =
            connected_channel(ChannelConfig::chat(chat, Uuid::from_u128(7))).await;

        drop(server);
        assert_eq!(
            next_event(&mut events).await,
            ChannelEvent::ConnectionStateChanged(ConnectionState::Reconnecting)
        );

        let mut server = servers.recv().await.unwrap();
        assert_eq!(
            next_event(&mut events).await,
            ChannelEvent::ConnectionStateChanged(ConnectionState::Connected)
        );
        assert_eq!(fake.attempts(), 2);
        assert_eq!(next_frame(&mut server).await["target"], "JoinChat");
        assert_eq!(channel.state(), ConnectionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_schedule() {
        let mut config = ChannelConfig::chat(Uuid::from_u128(9), Uuid::from_u128(7));
        config.policy = ReconnectPolicy {
            delays: vec![Duration::ZERO, Duration::from_secs(2)],
        };
        let (channel, mut events, fake, _servers, server) = connected_channel(config).await;

        fake.set_failing(true);
        drop(server);
        assert_eq!(
            next_event(&mut events).await,
            ChannelEvent::ConnectionStateChanged(ConnectionState::Reconnecting)
        );
        assert!(matches!(
            next_event(&mut events).await,
            ChannelEvent::Error { retryable: true, .. }
        ));
        assert_eq!(
            next_event(&mut events).await,
            ChannelEvent::ConnectionStateChanged(ConnectionState::Disconnected)
        );
        assert_eq!(fake.attempts(), 3);
        assert_eq!(channel.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_failed_initial_connect_can_be_restarted() {
        let (fake, mut servers) = FakeConnector::new();
        fake.set_failing(true);
        let (channel, mut events) =
            LiveChannel::new(ChannelConfig::chat(Uuid::from_u128(9), Uuid::from_u128(7)), fake.clone());

        assert!(channel.start());
        assert_eq!(
            next_event(&mut events).await,
            ChannelEvent::ConnectionStateChanged(ConnectionState::Connecting)
        );
        assert!(matches!(next_event(&mut events).await, ChannelEvent::Error { .. }));
        assert_eq!(
            next_event(&mut events).await,
            ChannelEvent::ConnectionStateChanged(ConnectionState::Disconnected)
        );
        assert_eq!(fake.attempts(), 1);

        fake.set_failing(false);
        assert!(channel.start());
        servers.recv().await.unwrap();
        assert_eq!(
            next_event(&mut events).await,
            ChannelEvent::ConnectionStateChanged(ConnectionState::Connecting)
        );
        assert_eq!(
            next_event(&mut events).await,
            ChannelEvent::ConnectionStateChanged(ConnectionState::Connected)
        );
    }

    #[tokio::test]
    async fn test_stopped_run_never_joins() {
        let (fake, mut servers) = FakeConnector::new();
        let (channel, mut events) =
            LiveChannel::new(ChannelConfig::chat(Uuid::from_u128(9), Uuid::from_u128(7)), fake.clone());
        let channel = Arc::new(channel);
        let leaving = channel.clone();
        fake.set_on_connect(move || {
            leaving.stop();
        });

        assert!(channel.start());
        let mut server = servers.recv().await.unwrap();
        while let Some(raw) = tokio::time::timeout(Duration::from_secs(60), server.from_client.recv())
            .await
            .expect("superseded run kept the link open")
        {
            assert!(!raw.contains("JoinChat"), "stopped run sent {}", raw);
            assert!(!raw.contains("MarkChatAsRead"), "stopped run sent {}", raw);
        }

        assert_eq!(
            next_event(&mut events).await,
            ChannelEvent::ConnectionStateChanged(ConnectionState::Connecting)
        );
        assert_eq!(
            next_event(&mut events).await,
            ChannelEvent::ConnectionStateChanged(ConnectionState::Disconnected)
        );
        assert_eq!(channel.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_stop_twice_closes_socket() {
        let (channel, mut events, _fake, _servers, mut server) =
            connected_channel(ChannelConfig::chat(Uuid::from_u128(9), Uuid::from_u128(7))).await;

        assert!(channel.stop());
        assert!(!channel.stop());
        assert_eq!(
            next_event(&mut events).await,
            ChannelEvent::ConnectionStateChanged(ConnectionState::Disconnected)
        );
        while server.from_client.recv().await.is_some() {}
        assert_eq!(channel.state(), ConnectionState::Disconnected);
    }
}

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, Notify, mpsc};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use gigdesk_api::{ChatApi, MarketApi, OrderApi};
use gigdesk_hub::{ChannelConfig, ChannelEvent, ConnectionState, Connector, LiveChannel, ReconnectPolicy};
use gigdesk_types::models::{Chat, Message, Order, PaymentStatus, Role};

use crate::composer::{Composer, OutgoingAttachment, Submission};
use crate::deadline::TimeLeft;
use crate::error::SessionError;
use crate::history::{self, HistoryFetcher};
use crate::order::{OrderAction, OrderController};
use crate::store::MessageStore;
use crate::typing::TypingIndicator;

const LOAD_FAILED: &str = "Ошибка загрузки данных";
const HISTORY_FAILED: &str = "Ошибка при загрузке сообщений";
const SEND_FAILED: &str = "Ошибка отправки сообщения";
const EDIT_FAILED: &str = "Ошибка редактирования сообщения";
const DELETE_FAILED: &str = "Ошибка удаления сообщения";
const REVIEW_FAILED: &str = "Заказ завершён, но отзыв не сохранён";

/// Which conversation to open, and as whom.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub chat_id: Uuid,
    pub user_id: Uuid,
    pub policy: ReconnectPolicy,
}

impl SessionContext {
    pub fn new(chat_id: Uuid, user_id: Uuid) -> Self {
        Self {
            chat_id,
            user_id,
            policy: ReconnectPolicy::default(),
        }
    }
}

/// Something the view has to react to.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    MessagesChanged,
    Typing(bool),
    Connection(ConnectionState),
    Error(SessionError),
    Closed,
}

/// One open conversation: its messages, its order, its composer and its
/// live hub connection.
///
/// All methods take `&self`; the session can be shared between the task
/// pumping [`next_update`](Self::next_update) and the one reacting to input.
pub struct ConversationSession {
    chat: Chat,
    order_id: Uuid,
    user_id: Uuid,
    api: Arc<dyn MarketApi>,
    orders: OrderController,
    payment_status: Mutex<PaymentStatus>,
    store: Mutex<MessageStore>,
    history: Mutex<HistoryFetcher>,
    composer: Mutex<Composer>,
    typing: Mutex<TypingIndicator>,
    channel: LiveChannel,
    events: AsyncMutex<mpsc::UnboundedReceiver<ChannelEvent>>,
    error: Mutex<Option<SessionError>>,
    // Delivered by the next `next_update` call before anything else.
    deferred: Mutex<Option<SessionUpdate>>,
    reconnecting: AtomicBool,
    closed: AtomicBool,
    shutdown: Notify,
}

impl ConversationSession {
    /// Load the conversation and connect to the hub.
    pub async fn open(
        ctx: SessionContext,
        api: Arc<dyn MarketApi>,
        connector: Arc<dyn Connector>,
    ) -> Result<Self, SessionError> {
        let chat_id = ctx.chat_id;
        let (mut history, first_page) = HistoryFetcher::start();

        let (profile, chat, page) = tokio::join!(
            api.profile(),
            api.chat(chat_id),
            history::load_page(api.as_ref(), chat_id, first_page.page),
        );
        let profile = profile.map_err(|e| SessionError::from_api(&e, LOAD_FAILED))?;
        let chat = chat.map_err(|e| SessionError::from_api(&e, LOAD_FAILED))?;
        let order_id = chat.order_id.ok_or(SessionError::ChatWithoutOrder)?;

        let mut store = MessageStore::new();
        match history.complete(first_page, page) {
            Some(Ok(messages)) => {
                store.prepend(messages);
            }
            Some(Err(e)) => return Err(SessionError::from_api(&e, HISTORY_FAILED)),
            None => {}
        }

        let order = api
            .order(order_id)
            .await
            .map_err(|e| SessionError::from_api(&e, LOAD_FAILED))?;
        let payment_status = if order.invoices.is_empty() {
            match api.payment_status(order_id).await {
                Ok(res) => res.status.unwrap_or_default(),
                Err(e) => {
                    warn!("payment status lookup for order {} failed: {}", order_id, e);
                    PaymentStatus::default()
                }
            }
        } else {
            order.payment_status()
        };

        let role = Role::from_profile(&profile.role);
        let orders = OrderController::new(api.clone(), chat_id, ctx.user_id, role, order);

        let config = ChannelConfig {
            policy: ctx.policy,
            ..ChannelConfig::chat(chat_id, ctx.user_id)
        };
        let (channel, events) = LiveChannel::new(config, connector);
        channel.start();

        info!(
            "opened chat {} for order {} as {:?} ({} messages)",
            chat_id,
            order_id,
            role,
            store.len()
        );

        Ok(Self {
            chat,
            order_id,
            user_id: ctx.user_id,
            api,
            orders,
            payment_status: Mutex::new(payment_status),
            store: Mutex::new(store),
            history: Mutex::new(history),
            composer: Mutex::new(Composer::new()),
            typing: Mutex::new(TypingIndicator::default()),
            channel,
            events: AsyncMutex::new(events),
            error: Mutex::new(None),
            deferred: Mutex::new(None),
            reconnecting: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            shutdown: Notify::new(),
        })
    }

    // -- State --

    pub fn chat(&self) -> &Chat {
        &self.chat
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    pub fn role(&self) -> Role {
        self.orders.role()
    }

    pub fn order(&self) -> Order {
        self.orders.order()
    }

    pub fn payment_status(&self) -> PaymentStatus {
        *self.payment_status.lock()
    }

    pub fn time_left(&self, now: DateTime<Utc>) -> TimeLeft {
        TimeLeft::until(self.orders.order().deadline, now)
    }

    pub fn messages(&self) -> Vec<Message> {
        self.store.lock().iter().cloned().collect()
    }

    pub fn message_count(&self) -> usize {
        self.store.lock().len()
    }

    pub fn has_more_history(&self) -> bool {
        self.history.lock().has_more()
    }

    pub fn is_loading_history(&self) -> bool {
        self.history.lock().is_loading()
    }

    pub fn is_typing(&self) -> bool {
        self.typing.lock().is_active()
    }

    pub fn is_busy(&self) -> bool {
        self.orders.is_busy()
    }

    pub fn draft(&self) -> String {
        self.composer.lock().draft().to_string()
    }

    pub fn editing(&self) -> Option<Uuid> {
        self.composer.lock().editing()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.channel.state()
    }

    pub fn error(&self) -> Option<SessionError> {
        self.error.lock().clone()
    }

    pub fn dismiss_error(&self) {
        self.error.lock().take();
    }

    /// Late results are dropped once the conversation is closed.
    fn ensure_open(&self) -> Result<(), SessionError> {
        if self.closed.load(Ordering::Acquire) {
            debug!("chat {}: dropping result that settled after close", self.chat.id);
            return Err(SessionError::Closed);
        }
        Ok(())
    }

    fn fail(&self, err: SessionError) -> SessionError {
        warn!("chat {}: {}", self.chat.id, err);
        *self.error.lock() = Some(err.clone());
        err
    }

    // -- Composer --

    pub fn set_draft(&self, text: impl Into<String>) {
        let typing = self.composer.lock().set_draft(text);
        if typing && let Err(e) = self.channel.notify_typing() {
            debug!("typing notice not sent: {}", e);
        }
    }

    pub fn begin_edit(&self, message_id: Uuid) -> Result<(), SessionError> {
        let message = self.store.lock().get(message_id).cloned();
        let Some(message) = message else {
            return Err(self.fail(SessionError::Invalid("Сообщение не найдено".into())));
        };
        let result = self.composer.lock().begin_edit(&message, self.user_id);
        result.map_err(|e| self.fail(e.into()))
    }

    pub fn cancel_edit(&self) {
        self.composer.lock().cancel_edit();
    }

    /// Send the draft (or save the edit). Validation happens before anything
    /// reaches the network.
    pub async fn submit(&self, attachment: Option<OutgoingAttachment>) -> Result<(), SessionError> {
        let submission = self.composer.lock().prepare(attachment);
        let submission = submission.map_err(|e| self.fail(e.into()))?;

        match submission {
            Submission::Send(req) => {
                let result = self.api.send_message(self.chat.id, req).await;
                self.ensure_open()?;
                let message = result.map_err(|e| self.fail(SessionError::from_api(&e, SEND_FAILED)))?;
                self.store.lock().append(message);
            }
            Submission::Edit { message_id, req } => {
                let content = req.content.clone();
                let result = self.api.update_message(self.chat.id, message_id, req).await;
                self.ensure_open()?;
                result.map_err(|e| self.fail(SessionError::from_api(&e, EDIT_FAILED)))?;
                self.store.lock().update(message_id, Some(content));
            }
        }
        self.composer.lock().reset();
        Ok(())
    }

    pub async fn delete_message(&self, message_id: Uuid) -> Result<(), SessionError> {
        let result = self.api.delete_message(self.chat.id, message_id).await;
        self.ensure_open()?;
        result.map_err(|e| self.fail(SessionError::from_api(&e, DELETE_FAILED)))?;
        self.store.lock().remove(message_id);
        Ok(())
    }

    // -- History --

    /// Backfill one older page. Returns how many messages were added; 0 when
    /// the request was skipped, exhausted or outlived the session.
    pub async fn load_older(&self) -> Result<usize, SessionError> {
        let request = self.history.lock().begin_older();
        let Some(request) = request else {
            return Ok(0);
        };

        let result = history::load_page(self.api.as_ref(), self.chat.id, request.page).await;
        let settled = self.history.lock().complete(request, result);
        match settled {
            None => Ok(0),
            Some(Ok(messages)) => Ok(self.store.lock().prepend(messages)),
            Some(Err(e)) => Err(self.fail(SessionError::from_api(&e, HISTORY_FAILED))),
        }
    }

    // -- Order --

    pub async fn perform(&self, action: OrderAction) -> Result<(), SessionError> {
        let result = self.orders.perform(action.clone()).await;
        self.ensure_open()?;
        let outcome = result.map_err(|e| self.fail(SessionError::from_order(&action, &e)))?;

        if !outcome.order.invoices.is_empty() {
            *self.payment_status.lock() = outcome.order.payment_status();
        }
        if let Some(message) = outcome.system_message {
            self.store.lock().append(message);
        }
        if let Some(e) = outcome.review_error {
            return Err(self.fail(SessionError::from_api(&e, REVIEW_FAILED)));
        }
        Ok(())
    }

    /// Re-read the order from the server, e.g. after the hub connection was
    /// re-established and transitions may have been missed.
    pub async fn refresh_order(&self) -> Result<(), SessionError> {
        let result = self.api.order(self.order_id).await;
        self.ensure_open()?;
        let order = result.map_err(|e| self.fail(SessionError::from_api(&e, LOAD_FAILED)))?;
        if !order.invoices.is_empty() {
            *self.payment_status.lock() = order.payment_status();
        }
        self.orders.reconcile(order);
        Ok(())
    }

    // -- Live updates --

    /// Wait for the next change: a hub event or the typing indicator timing out.
    ///
    /// A reconnect yields `Connection(Connected)` first; if the order refresh
    /// that follows it fails, the next call yields the `Error`.
    pub async fn next_update(&self) -> SessionUpdate {
        let shutdown = self.shutdown.notified();
        tokio::pin!(shutdown);
        if self.closed.load(Ordering::Acquire) {
            return SessionUpdate::Closed;
        }
        if let Some(update) = self.deferred.lock().take() {
            return update;
        }

        let mut events = self.events.lock().await;
        loop {
            let deadline = self.typing.lock().deadline();
            let typing_expired = async {
                match deadline {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None => std::future::pending().await,
                }
            };

            let event = tokio::select! {
                _ = &mut shutdown => return SessionUpdate::Closed,
                event = events.recv() => event,
                _ = typing_expired => {
                    if self.typing.lock().expire(Instant::now()) {
                        return SessionUpdate::Typing(false);
                    }
                    continue;
                }
            };

            let Some(event) = event else {
                return SessionUpdate::Closed;
            };
            let Some(update) = self.apply_event(event) else {
                continue;
            };
            if let SessionUpdate::Connection(state) = update
                && let Some(err) = self.track_connection(state).await
            {
                *self.deferred.lock() = Some(SessionUpdate::Error(err));
            }
            return update;
        }
    }

    /// Apply one hub event. `None` when nothing visible changed.
    pub fn apply_event(&self, event: ChannelEvent) -> Option<SessionUpdate> {
        match event {
            ChannelEvent::MessageCreated(message) => {
                let inserted = self.store.lock().append(message);
                inserted.then_some(SessionUpdate::MessagesChanged)
            }
            ChannelEvent::MessageUpdated(message) => {
                let updated = self.store.lock().update(message.id, message.content);
                updated.then_some(SessionUpdate::MessagesChanged)
            }
            ChannelEvent::MessageDeleted(id) => {
                let removed = self.store.lock().remove(id);
                removed.then_some(SessionUpdate::MessagesChanged)
            }
            ChannelEvent::Typing(sender) => {
                let started = self.typing.lock().on_typing(sender, Instant::now());
                started.then_some(SessionUpdate::Typing(true))
            }
            ChannelEvent::ChatsUpdated(_) => None,
            ChannelEvent::ConnectionStateChanged(state) => Some(SessionUpdate::Connection(state)),
            ChannelEvent::Error { message, .. } => {
                Some(SessionUpdate::Error(self.fail(SessionError::Connection(message))))
            }
        }
    }

    /// Returns the error of a failed post-reconnect refresh.
    async fn track_connection(&self, state: ConnectionState) -> Option<SessionError> {
        match state {
            ConnectionState::Reconnecting => {
                self.reconnecting.store(true, Ordering::Release);
                None
            }
            ConnectionState::Connected if self.reconnecting.swap(false, Ordering::AcqRel) => {
                match self.refresh_order().await {
                    Ok(()) => {
                        debug!("order {} refreshed after reconnect", self.order_id);
                        None
                    }
                    Err(SessionError::Closed) => None,
                    Err(e) => Some(e),
                }
            }
            _ => None,
        }
    }

    /// Try the hub connection again after it gave up.
    pub fn reconnect(&self) -> bool {
        if self.closed.load(Ordering::Acquire) {
            return false;
        }
        self.channel.start()
    }

    /// Leave the conversation: stop the hub connection and drop anything
    /// still in flight. Safe to call more than once.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.orders.close();
        self.channel.stop();
        self.typing.lock().clear();
        self.history.lock().invalidate();
        self.shutdown.notify_waiters();
        info!("closed chat {}", self.chat.id);
    }
}

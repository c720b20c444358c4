use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::HubError;
use crate::protocol;

/// How long the hub has to answer the handshake.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// An established hub session, reduced to text frames.
///
/// `outbound` takes fully encoded frames (record separator included).
/// `inbound` yields one decoded-ready frame at a time and ends when the
/// underlying socket closes. Dropping every `outbound` sender closes the socket.
pub struct Link {
    pub outbound: mpsc::UnboundedSender<String>,
    pub inbound: mpsc::UnboundedReceiver<String>,
}

/// Dials the hub. The channel calls this once per (re)connection attempt.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self) -> Result<Link, HubError>;
}

/// WebSocket transport to the hub endpoint.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    hub_url: String,
    token: String,
}

impl WebSocketConnector {
    pub fn new(hub_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            hub_url: hub_url.into(),
            token: token.into(),
        }
    }

    /// `http(s)://host/chatHub` -> `ws(s)://host/chatHub?access_token=...`
    pub fn ws_url(&self) -> Result<Url, HubError> {
        let mut url = Url::parse(&self.hub_url)?;
        let scheme = match url.scheme() {
            "https" | "wss" => "wss",
            _ => "ws",
        };
        url.set_scheme(scheme)
            .map_err(|_| HubError::Protocol(format!("cannot use scheme {} for {}", scheme, self.hub_url)))?;
        url.query_pairs_mut().append_pair("access_token", &self.token);
        Ok(url)
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self) -> Result<Link, HubError> {
        let url = self.ws_url()?;
        debug!("dialing hub at {}{}", url.host_str().unwrap_or_default(), url.path());

        let (ws_stream, _) = tokio_tungstenite::connect_async(url.as_str()).await?;
        let (mut sink, mut stream) = ws_stream.split();

        sink.send(WsMessage::Text(protocol::handshake_request().into()))
            .await?;

        // The handshake reply is the first frame; anything batched after it is
        // already hub traffic.
        let first = tokio::time::timeout(HANDSHAKE_TIMEOUT, async {
            while let Some(msg) = stream.next().await {
                match msg? {
                    WsMessage::Text(text) => return Ok(text.to_string()),
                    WsMessage::Close(_) => return Err(HubError::Closed),
                    _ => {}
                }
            }
            Err(HubError::Closed)
        })
        .await
        .map_err(|_| HubError::Handshake("timed out waiting for handshake reply".into()))??;

        let mut frames = protocol::split_frames(&first);
        let reply = frames
            .next()
            .ok_or_else(|| HubError::Handshake("empty handshake reply".into()))?;
        protocol::parse_handshake(reply)?;
        info!("hub handshake complete");

        let (in_tx, in_rx) = mpsc::unbounded_channel::<String>();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();

        for frame in frames {
            let _ = in_tx.send(frame.to_string());
        }

        // Outbound frames -> socket. Ends when every sender is dropped.
        tokio::spawn(async move {
            while let Some(text) = out_rx.recv().await {
                if sink.send(WsMessage::Text(text.into())).await.is_err() {
                    break;
                }
            }
            let _ = sink.close().await;
            debug!("hub writer finished");
        });

        // Socket -> inbound frames. Dropping `in_tx` signals connection loss.
        tokio::spawn(async move {
            while let Some(msg) = stream.next().await {
                match msg {
                    Ok(WsMessage::Text(text)) => {
                        for frame in protocol::split_frames(&text) {
                            if in_tx.send(frame.to_string()).is_err() {
                                return;
                            }
                        }
                    }
                    Ok(WsMessage::Close(frame)) => {
                        debug!("hub closed the socket: {:?}", frame);
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("hub socket error: {}", e);
                        break;
                    }
                }
            }
        });

        Ok(Link {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}

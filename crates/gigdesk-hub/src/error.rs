use thiserror::Error;

#[derive(Debug, Error)]
pub enum HubError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("invalid hub url: {0}")]
    Url(#[from] url::ParseError),

    #[error("handshake rejected: {0}")]
    Handshake(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("not connected")]
    NotConnected,

    #[error("channel is not bound to a chat")]
    NoRoom,

    #[error("connection closed")]
    Closed,
}

impl From<serde_json::Error> for HubError {
    fn from(e: serde_json::Error) -> Self {
        Self::Protocol(e.to_string())
    }
}

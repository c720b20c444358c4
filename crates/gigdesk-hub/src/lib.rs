//! Live Channel: one auto-reconnecting hub connection per open conversation.
//!
//! The hub pushes message and typing events for the joined chat; the client
//! sends join / typing / mark-read invocations. Everything the channel learns
//! is surfaced as a single ordered stream of [`ChannelEvent`]s.

pub mod backoff;
pub mod channel;
pub mod connector;
pub mod error;
pub mod protocol;
pub mod state;

pub use backoff::ReconnectPolicy;
pub use channel::{ChannelConfig, ChannelEvent, LiveChannel, Room};
pub use connector::{Connector, Link, WebSocketConnector};
pub use error::HubError;
pub use state::{ConnectionMachine, ConnectionState};

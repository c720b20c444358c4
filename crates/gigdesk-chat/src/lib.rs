//! Conversation core for the marketplace chat: message history with
//! backfill, live hub updates, the composer, and the order actions that can
//! be taken from inside a chat.
//!
//! [`ConversationSession`] ties the pieces together for one open chat.

pub mod composer;
pub mod deadline;
pub mod error;
pub mod history;
pub mod inbox;
pub mod order;
pub mod scroll;
pub mod session;
pub mod store;
pub mod typing;

pub use composer::{ComposeError, Composer, OutgoingAttachment};
pub use deadline::TimeLeft;
pub use error::SessionError;
pub use history::{HistoryFetcher, PAGE_SIZE, Page};
pub use inbox::ChatList;
pub use order::{OrderAction, OrderController, OrderError, Review};
pub use scroll::{ScrollAction, ScrollAnchor};
pub use session::{ConversationSession, SessionContext, SessionUpdate};
pub use store::MessageStore;
pub use typing::TypingIndicator;

//! # convo-shared
//!
//! Types shared by the Convo store and server: identity newtypes, the
//! persisted message shape, and the real-time event protocol spoken over the
//! WebSocket gateway.

pub mod constants;
pub mod error;
pub mod message;
pub mod protocol;
pub mod types;

pub use error::ProtocolError;
pub use message::{Attachment, Message, ReplyPreview};
pub use types::{CallKind, ConnectionId, UserId};

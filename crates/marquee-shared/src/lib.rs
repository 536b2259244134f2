//! # marquee-shared
//!
//! Identifiers, record types and constants shared by every Marquee crate.

pub mod constants;
pub mod models;
pub mod types;

pub use models::*;
pub use types::{ConversationId, MessageId, NotificationId, UserId};

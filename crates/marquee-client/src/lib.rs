//! # marquee-client
//!
//! Facades that UI surfaces and the HTTP layer talk to: [`ChatService`] for
//! conversations and messages, [`NotificationService`] for the feed, both
//! bundled in an explicitly constructed [`AppState`].

pub mod chat;
pub mod notifications;
pub mod state;

pub use chat::ChatService;
pub use notifications::{LogNotifier, NotificationPermission, NotificationService, SystemNotifier};
pub use state::AppState;

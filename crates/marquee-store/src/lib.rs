//! # marquee-store
//!
//! In-memory state for the Marquee messaging core: the conversation
//! directory, the notification feed, and the listener registry that fans
//! changes out to observers.
//!
//! Nothing here is persisted; state lives for the lifetime of the process.

pub mod directory;
pub mod notifications;
pub mod seed;
pub mod subscriptions;
pub mod sync;

mod error;

pub use directory::ConversationDirectory;
pub use error::{Result, StoreError};
pub use notifications::NotificationStore;
pub use subscriptions::{
    ConversationListener, Listener, ListenerSet, MessageListener, Subscription,
    SubscriptionRegistry,
};

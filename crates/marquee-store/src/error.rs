use marquee_shared::{ConversationId, MessageId, NotificationId};
use thiserror::Error;

/// Errors produced by the store layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The conversation id is not registered in the directory.
    #[error("Unknown conversation: {0}")]
    UnknownConversation(ConversationId),

    /// The message id does not exist in the given conversation.
    #[error("Unknown message {message} in conversation {conversation}")]
    UnknownMessage {
        conversation: ConversationId,
        message: MessageId,
    },

    /// No notification with this id.
    #[error("Unknown notification: {0}")]
    UnknownNotification(NotificationId),

    /// A conversation with this id is already registered.
    #[error("Conversation already exists: {0}")]
    ConversationExists(ConversationId),

    /// Unsubscribe for a registration that is no longer present.
    #[error("Unknown listener: {0}")]
    UnknownListener(u64),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;

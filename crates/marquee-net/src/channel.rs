//! Transport seam between the chat facade and whatever delivers messages.

use std::sync::Weak;

use marquee_shared::{Conversation, ConversationId, DeliveryStatus, Message, MessageId, NewMessage, UserId};

/// A message arriving from a remote peer.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub conversation_id: ConversationId,
    pub message: NewMessage,
}

/// Callbacks a channel uses to report back into the store.
///
/// Implementations must not block; they are invoked from runtime tasks.
pub trait DeliverySink: Send + Sync {
    /// A dispatched message progressed (e.g. the server acknowledged it).
    fn update_status(
        &self,
        conversation_id: &ConversationId,
        message_id: &MessageId,
        status: DeliveryStatus,
    );

    /// Conversations a remote peer could currently write into.
    fn inbound_candidates(&self) -> Vec<Conversation>;

    /// A remote peer sent a message.
    fn receive(&self, inbound: InboundMessage);
}

/// Duplex message transport.
///
/// Channels only ever hold a [`Weak`] reference to the sink, so a dropped
/// facade turns late callbacks into no-ops.
pub trait DeliveryChannel: Send + Sync {
    /// Start receiving on behalf of `local_user`.  Opening an open channel
    /// is a no-op.
    fn open(&self, local_user: &UserId, sink: Weak<dyn DeliverySink>);

    /// Hand an outgoing message to the transport.  Never blocks.
    fn dispatch(&self, message: &Message, sink: Weak<dyn DeliverySink>);

    /// Stop receiving and cancel every pending deferred task.
    fn close(&self);

    fn is_open(&self) -> bool;
}

//! Chat facade: the single entry point UI surfaces talk to.
//!
//! [`ChatService`] owns the conversation directory, the listener registry and
//! a [`DeliveryChannel`].  Every mutation runs under the directory lock and
//! queues its change set before releasing it, so change sets are published
//! in commit order.  One thread at a time drains the queue with no lock
//! held; a mutation committed meanwhile (from another thread or from a
//! listener) is delivered by that drainer right after the current change.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use chrono::Utc;
use tracing::{debug, info, warn};

use marquee_net::{DeliveryChannel, DeliverySink, InboundMessage, SimulatedChannel, SimulatorConfig};
use marquee_shared::{
    Conversation, ConversationId, DeliveryStatus, Message, MessageId, NewConversation, NewMessage,
    UserId,
};
use marquee_store::sync::lock;
use marquee_store::{seed, ConversationDirectory, Result, Subscription, SubscriptionRegistry};

/// State changes to fan out once the directory lock is released.
#[derive(Default)]
struct Changes {
    messages: Option<(ConversationId, Vec<Message>)>,
    conversations: Option<Vec<Conversation>>,
}

impl Changes {
    fn is_empty(&self) -> bool {
        self.messages.is_none() && self.conversations.is_none()
    }
}

/// Committed change sets waiting to be published.
#[derive(Default)]
struct Outbox {
    pending: VecDeque<Changes>,
    draining: bool,
}

struct ChatCore {
    me: Weak<ChatCore>,
    directory: Mutex<ConversationDirectory>,
    outbox: Mutex<Outbox>,
    registry: SubscriptionRegistry,
    channel: Arc<dyn DeliveryChannel>,
    local_user: Mutex<Option<UserId>>,
}

/// Cheaply cloneable handle; clones share the same state.
#[derive(Clone)]
pub struct ChatService {
    core: Arc<ChatCore>,
}

impl ChatService {
    pub fn new(channel: Arc<dyn DeliveryChannel>) -> Self {
        let core = Arc::new_cyclic(|me| ChatCore {
            me: me.clone(),
            directory: Mutex::new(ConversationDirectory::new()),
            outbox: Mutex::new(Outbox::default()),
            registry: SubscriptionRegistry::new(),
            channel,
            local_user: Mutex::new(None),
        });
        Self { core }
    }

    /// Service backed by a [`SimulatedChannel`].
    pub fn simulated(config: SimulatorConfig) -> Self {
        Self::new(Arc::new(SimulatedChannel::new(config)))
    }

    // ------------------------------------------------------------------
    // Connection
    // ------------------------------------------------------------------

    /// Open the delivery channel for `user_id`.  No-op while connected.
    pub fn connect(&self, user_id: impl Into<UserId>) {
        let user_id = user_id.into();
        if self.core.channel.is_open() {
            debug!(user = %user_id, "Already connected");
            return;
        }

        *lock(&self.core.local_user) = Some(user_id.clone());
        self.core.channel.open(&user_id, self.core.sink());
        if !self.core.channel.is_open() {
            lock(&self.core.local_user).take();
            warn!(user = %user_id, "Delivery channel failed to open, still disconnected");
            return;
        }
        info!(user = %user_id, "Chat connected");
    }

    /// Close the channel and cancel its deferred work.  Conversations and
    /// messages stay queryable.
    pub fn disconnect(&self) {
        self.core.channel.close();
        if let Some(user) = lock(&self.core.local_user).take() {
            info!(user = %user, "Chat disconnected");
        }
    }

    pub fn is_connected(&self) -> bool {
        self.core.channel.is_open()
    }

    pub fn local_user(&self) -> Option<UserId> {
        lock(&self.core.local_user).clone()
    }

    // ------------------------------------------------------------------
    // Directory
    // ------------------------------------------------------------------

    /// Register conversations with their history (e.g. demo data).  The
    /// batch is rejected as a whole if any id is taken or repeated.
    pub fn seed(&self, conversations: Vec<(Conversation, Vec<Message>)>) -> Result<usize> {
        let mut directory = lock(&self.core.directory);
        let loaded = directory.insert_conversations(conversations).map_err(|e| {
            warn!(error = %e, "Seeding rejected");
            e
        })?;
        let changes = Changes {
            conversations: Some(directory.list_conversations()),
            ..Default::default()
        };
        info!(conversations = loaded, "Seeded chat directory");
        self.core.commit(directory, changes);
        Ok(loaded)
    }

    pub fn load_sample_data(&self) -> Result<usize> {
        self.seed(seed::sample_conversations())
    }

    pub fn create_conversation(&self, new: NewConversation) -> Conversation {
        let mut directory = lock(&self.core.directory);
        let conversation = directory.create_conversation(new);
        let changes = Changes {
            conversations: Some(directory.list_conversations()),
            ..Default::default()
        };
        self.core.commit(directory, changes);
        conversation
    }

    /// All conversations, most recently updated first.
    pub fn get_conversations(&self) -> Vec<Conversation> {
        lock(&self.core.directory).list_conversations()
    }

    pub fn get_conversation(&self, conversation_id: &ConversationId) -> Option<Conversation> {
        lock(&self.core.directory)
            .get_conversation(conversation_id)
            .cloned()
    }

    /// Messages in append order; empty for unknown conversations.
    pub fn get_messages(&self, conversation_id: &ConversationId) -> Vec<Message> {
        lock(&self.core.directory)
            .list_messages(conversation_id)
            .to_vec()
    }

    pub fn total_unread(&self) -> u32 {
        lock(&self.core.directory).total_unread()
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    /// Send a text message.
    pub fn send_message(
        &self,
        conversation_id: &ConversationId,
        content: impl Into<String>,
        sender_id: impl Into<UserId>,
        sender_name: impl Into<String>,
    ) -> Result<Message> {
        self.send(
            conversation_id,
            NewMessage::text(sender_id, sender_name, content),
        )
    }

    /// Send any kind of message.  The returned message is in `Sending`;
    /// the channel moves it forward later.
    pub fn send(&self, conversation_id: &ConversationId, new: NewMessage) -> Result<Message> {
        self.core.append_and_publish(conversation_id, new, false)
    }

    /// Mark everything not written by `user_id` as read and reset the unread
    /// counter.  Both listener sets are notified even when nothing changed;
    /// the return value says whether anything did.
    pub fn mark_as_read(&self, conversation_id: &ConversationId, user_id: &UserId) -> Result<bool> {
        let mut directory = lock(&self.core.directory);
        let changed = directory.mark_read(conversation_id, user_id).map_err(|e| {
            warn!(conversation = %conversation_id, error = %e, "Mark as read failed");
            e
        })?;
        let changes = Changes {
            messages: Some((
                conversation_id.clone(),
                directory.list_messages(conversation_id).to_vec(),
            )),
            conversations: Some(directory.list_conversations()),
        };
        self.core.commit(directory, changes);
        Ok(changed)
    }

    /// Update a participant's presence everywhere they appear.
    pub fn set_presence(&self, user_id: &UserId, online: bool) -> usize {
        let mut directory = lock(&self.core.directory);
        let changed = directory.set_presence(user_id, online, Utc::now());
        let changes = if changed.is_empty() {
            Changes::default()
        } else {
            Changes {
                conversations: Some(directory.list_conversations()),
                ..Default::default()
            }
        };
        self.core.commit(directory, changes);
        changed.len()
    }

    // ------------------------------------------------------------------
    // Subscriptions
    // ------------------------------------------------------------------

    pub fn subscribe_to_conversations<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&[Conversation]) + Send + Sync + 'static,
    {
        self.core
            .registry
            .subscribe_to_conversations(Arc::new(listener))
    }

    pub fn subscribe_to_messages<F>(
        &self,
        conversation_id: &ConversationId,
        listener: F,
    ) -> Subscription
    where
        F: Fn(&[Message]) + Send + Sync + 'static,
    {
        self.core
            .registry
            .subscribe_to_messages(conversation_id.clone(), Arc::new(listener))
    }
}

impl Default for ChatService {
    fn default() -> Self {
        Self::simulated(SimulatorConfig::default())
    }
}

impl ChatCore {
    fn sink(&self) -> Weak<dyn DeliverySink> {
        self.me.clone()
    }

    fn append_and_publish(
        &self,
        conversation_id: &ConversationId,
        new: NewMessage,
        inbound: bool,
    ) -> Result<Message> {
        let mut directory = lock(&self.directory);
        let message = directory.append_message(conversation_id, new).map_err(|e| {
            warn!(conversation = %conversation_id, error = %e, "Send failed");
            e
        })?;
        if inbound {
            directory.increment_unread(conversation_id)?;
        }
        let changes = Changes {
            messages: Some((
                conversation_id.clone(),
                directory.list_messages(conversation_id).to_vec(),
            )),
            conversations: Some(directory.list_conversations()),
        };
        self.commit(directory, changes);

        self.channel.dispatch(&message, self.sink());
        Ok(message)
    }

    /// Queue `changes` while the directory is still locked, release it, then
    /// publish.
    fn commit(&self, directory: MutexGuard<'_, ConversationDirectory>, changes: Changes) {
        if !changes.is_empty() {
            lock(&self.outbox).pending.push_back(changes);
        }
        drop(directory);
        self.flush();
    }

    /// Publish queued change sets in order unless another call is already
    /// doing so.
    fn flush(&self) {
        {
            let mut outbox = lock(&self.outbox);
            if outbox.draining || outbox.pending.is_empty() {
                return;
            }
            outbox.draining = true;
        }

        loop {
            let changes = {
                let mut outbox = lock(&self.outbox);
                match outbox.pending.pop_front() {
                    Some(changes) => changes,
                    None => {
                        outbox.draining = false;
                        return;
                    }
                }
            };
            self.publish(changes);
        }
    }

    fn publish(&self, changes: Changes) {
        if let Some((conversation_id, messages)) = changes.messages {
            self.registry.notify_messages(&conversation_id, &messages);
        }
        if let Some(conversations) = changes.conversations {
            self.registry.notify_conversations(&conversations);
        }
    }
}

impl DeliverySink for ChatCore {
    fn update_status(
        &self,
        conversation_id: &ConversationId,
        message_id: &MessageId,
        status: DeliveryStatus,
    ) {
        let mut directory = lock(&self.directory);
        match directory.advance_status(conversation_id, message_id, status) {
            Ok(true) => {}
            Ok(false) => return,
            Err(e) => {
                debug!(error = %e, "Status update for unknown message");
                return;
            }
        }
        let changes = Changes {
            messages: Some((
                conversation_id.clone(),
                directory.list_messages(conversation_id).to_vec(),
            )),
            ..Default::default()
        };
        debug!(message = %message_id, ?status, "Message status advanced");
        self.commit(directory, changes);
    }

    fn inbound_candidates(&self) -> Vec<Conversation> {
        let local_user = lock(&self.local_user).clone();
        let conversations = lock(&self.directory).list_conversations();
        match local_user {
            Some(user) => conversations
                .into_iter()
                .filter(|c| c.has_participant(&user))
                .collect(),
            None => conversations,
        }
    }

    fn receive(&self, inbound: InboundMessage) {
        let InboundMessage {
            conversation_id,
            message,
        } = inbound;
        if let Err(e) = self.append_and_publish(&conversation_id, message, true) {
            warn!(conversation = %conversation_id, error = %e, "Dropped inbound message");
        }
    }
}

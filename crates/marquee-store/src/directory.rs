//! The authoritative set of conversations and their message lists.
//!
//! [`ConversationDirectory`] is a plain in-memory structure with `&mut self`
//! mutators; callers that share it across threads wrap it in a mutex (see
//! the facade in `marquee-client`).

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use tracing::debug;

use marquee_shared::{
    Conversation, ConversationId, DeliveryStatus, Message, MessageId, NewConversation, NewMessage,
    UserId,
};

use crate::error::{Result, StoreError};

struct Entry {
    conversation: Conversation,
    messages: Vec<Message>,
}

impl Entry {
    /// Keep the cached `last_message` in sync with the tail of the list.
    fn refresh_last_message(&mut self) {
        if let Some(last) = self.messages.last() {
            self.conversation.last_message = Some(last.clone());
        }
    }
}

/// Indexed collection of conversations.  Conversations are never removed,
/// so positions in `entries` are stable and double as insertion order.
#[derive(Default)]
pub struct ConversationDirectory {
    entries: Vec<Entry>,
    index: HashMap<ConversationId, usize>,
}

impl ConversationDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Register a new conversation with a generated id and no messages.
    pub fn create_conversation(&mut self, new: NewConversation) -> Conversation {
        let now = Utc::now();
        let conversation = Conversation {
            id: ConversationId::generate(),
            participants: new.participants,
            last_message: None,
            unread_count: 0,
            kind: new.kind,
            title: new.title,
            created_at: now,
            updated_at: now,
        };

        debug!(conversation = %conversation.id, "Created conversation");
        self.push(conversation.clone(), Vec::new());
        conversation
    }

    /// Register a pre-built conversation together with its history.
    ///
    /// Messages are re-homed to `conversation.id`; `last_message` is derived
    /// from the history when the caller left it empty.
    pub fn insert_conversation(
        &mut self,
        mut conversation: Conversation,
        mut messages: Vec<Message>,
    ) -> Result<()> {
        if self.index.contains_key(&conversation.id) {
            return Err(StoreError::ConversationExists(conversation.id));
        }

        for message in &mut messages {
            message.conversation_id = conversation.id.clone();
        }
        messages.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        if conversation.last_message.is_none() {
            conversation.last_message = messages.last().cloned();
        }

        self.push(conversation, messages);
        Ok(())
    }

    /// Register several pre-built conversations at once.  Nothing is
    /// inserted if any id is already registered or repeats within the batch.
    pub fn insert_conversations(
        &mut self,
        batch: Vec<(Conversation, Vec<Message>)>,
    ) -> Result<usize> {
        let mut ids = HashSet::new();
        for (conversation, _) in &batch {
            if self.index.contains_key(&conversation.id) || !ids.insert(&conversation.id) {
                return Err(StoreError::ConversationExists(conversation.id.clone()));
            }
        }

        let count = batch.len();
        for (conversation, messages) in batch {
            self.insert_conversation(conversation, messages)?;
        }
        Ok(count)
    }

    fn push(&mut self, conversation: Conversation, messages: Vec<Message>) {
        self.index
            .insert(conversation.id.clone(), self.entries.len());
        self.entries.push(Entry {
            conversation,
            messages,
        });
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// All conversations, most recently updated first.  Ties keep insertion
    /// order.
    pub fn list_conversations(&self) -> Vec<Conversation> {
        let mut conversations: Vec<Conversation> = self
            .entries
            .iter()
            .map(|e| e.conversation.clone())
            .collect();
        conversations.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        conversations
    }

    /// Messages of a conversation in append order.  Unknown ids yield an
    /// empty slice.
    pub fn list_messages(&self, conversation_id: &ConversationId) -> &[Message] {
        self.entry(conversation_id)
            .map(|e| e.messages.as_slice())
            .unwrap_or(&[])
    }

    pub fn get_conversation(&self, conversation_id: &ConversationId) -> Option<&Conversation> {
        self.entry(conversation_id).map(|e| &e.conversation)
    }

    pub fn get_message(
        &self,
        conversation_id: &ConversationId,
        message_id: &MessageId,
    ) -> Option<&Message> {
        self.list_messages(conversation_id)
            .iter()
            .rev()
            .find(|m| &m.id == message_id)
    }

    /// Sum of all unread counters.
    pub fn total_unread(&self) -> u32 {
        self.entries
            .iter()
            .map(|e| e.conversation.unread_count)
            .sum()
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Append a message in status `Sending` and return it.
    ///
    /// The timestamp never precedes the previous message or the
    /// conversation's `updated_at`, so per-conversation order and
    /// `updated_at` stay monotonic even if the wall clock steps back.
    pub fn append_message(
        &mut self,
        conversation_id: &ConversationId,
        new: NewMessage,
    ) -> Result<Message> {
        let entry = self.entry_mut(conversation_id)?;

        let mut timestamp = Utc::now().max(entry.conversation.updated_at);
        if let Some(last) = entry.messages.last() {
            timestamp = timestamp.max(last.timestamp);
        }

        let message = Message {
            id: MessageId::generate(),
            conversation_id: conversation_id.clone(),
            sender_id: new.sender_id,
            sender_name: new.sender_name,
            sender_avatar: new.sender_avatar,
            content: new.content,
            timestamp,
            kind: new.kind,
            metadata: new.metadata,
            status: DeliveryStatus::Sending,
        };

        entry.messages.push(message.clone());
        entry.conversation.last_message = Some(message.clone());
        entry.conversation.updated_at = timestamp;

        debug!(
            conversation = %conversation_id,
            message = %message.id,
            sender = %message.sender_id,
            "Appended message"
        );
        Ok(message)
    }

    /// Mark every message not authored by `reader` as read and reset the
    /// unread counter.  Returns `true` if anything changed.
    pub fn mark_read(&mut self, conversation_id: &ConversationId, reader: &UserId) -> Result<bool> {
        let entry = self.entry_mut(conversation_id)?;

        let mut changed = false;
        for message in entry
            .messages
            .iter_mut()
            .filter(|m| &m.sender_id != reader && m.status != DeliveryStatus::Read)
        {
            message.status = DeliveryStatus::Read;
            changed = true;
        }

        if entry.conversation.unread_count != 0 {
            entry.conversation.unread_count = 0;
            changed = true;
        }

        if changed {
            entry.refresh_last_message();
            debug!(conversation = %conversation_id, reader = %reader, "Marked conversation read");
        }
        Ok(changed)
    }

    /// Move a message's status forward.  Returns `false` when `status` is not
    /// ahead of the current one.
    pub fn advance_status(
        &mut self,
        conversation_id: &ConversationId,
        message_id: &MessageId,
        status: DeliveryStatus,
    ) -> Result<bool> {
        let entry = self.entry_mut(conversation_id)?;

        let message = entry
            .messages
            .iter_mut()
            .rev()
            .find(|m| &m.id == message_id)
            .ok_or_else(|| StoreError::UnknownMessage {
                conversation: conversation_id.clone(),
                message: message_id.clone(),
            })?;

        let Some(next) = message.status.advance_to(status) else {
            return Ok(false);
        };
        message.status = next;

        let is_last = entry
            .conversation
            .last_message
            .as_ref()
            .is_some_and(|m| &m.id == message_id);
        if is_last {
            entry.refresh_last_message();
        }
        Ok(true)
    }

    /// Bump the unread counter, returning the new value.
    pub fn increment_unread(&mut self, conversation_id: &ConversationId) -> Result<u32> {
        let entry = self.entry_mut(conversation_id)?;
        entry.conversation.unread_count = entry.conversation.unread_count.saturating_add(1);
        Ok(entry.conversation.unread_count)
    }

    /// Update a user's presence in every conversation they take part in.
    /// Going offline records `at` as last-seen.  Returns the conversations
    /// that changed.
    pub fn set_presence(
        &mut self,
        user: &UserId,
        online: bool,
        at: DateTime<Utc>,
    ) -> Vec<ConversationId> {
        let mut changed = Vec::new();

        for entry in &mut self.entries {
            let mut touched = false;
            for participant in entry
                .conversation
                .participants
                .iter_mut()
                .filter(|p| &p.id == user && p.online != online)
            {
                participant.online = online;
                if !online {
                    participant.last_seen = Some(at);
                }
                touched = true;
            }
            if touched {
                changed.push(entry.conversation.id.clone());
            }
        }

        changed
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn entry(&self, conversation_id: &ConversationId) -> Option<&Entry> {
        self.index
            .get(conversation_id)
            .map(|&i| &self.entries[i])
    }

    fn entry_mut(&mut self, conversation_id: &ConversationId) -> Result<&mut Entry> {
        match self.index.get(conversation_id) {
            Some(&i) => Ok(&mut self.entries[i]),
            None => Err(StoreError::UnknownConversation(conversation_id.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use marquee_shared::{ConversationKind, Participant};

    use super::*;

    fn conversation(id: &str, updated_at: DateTime<Utc>) -> Conversation {
        Conversation {
            id: ConversationId::from(id),
            participants: vec![
                Participant::new("u1", "John Smith"),
                Participant::new("current", "You").online(),
            ],
            last_message: None,
            unread_count: 0,
            kind: ConversationKind::Direct,
            title: None,
            created_at: updated_at,
            updated_at,
        }
    }

    fn directory_with(ids: &[&str]) -> ConversationDirectory {
        let mut dir = ConversationDirectory::new();
        let base = Utc::now() - Duration::hours(1);
        for id in ids {
            dir.insert_conversation(conversation(id, base), Vec::new())
                .unwrap();
        }
        dir
    }

    #[test]
    fn append_sets_sending_and_updates_conversation() {
        let mut dir = directory_with(&["C1"]);
        let c1 = ConversationId::from("C1");

        let msg = dir
            .append_message(&c1, NewMessage::text("current", "You", "hello"))
            .unwrap();

        assert_eq!(msg.status, DeliveryStatus::Sending);
        let messages = dir.list_messages(&c1);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "hello");
        assert_eq!(messages[0].sender_id, UserId::from("current"));

        let conv = dir.get_conversation(&c1).unwrap();
        assert_eq!(conv.last_message.as_ref().map(|m| &m.id), Some(&msg.id));
        assert_eq!(conv.updated_at, msg.timestamp);
    }

    #[test]
    fn append_timestamps_are_monotonic() {
        let mut dir = directory_with(&["C1"]);
        let c1 = ConversationId::from("C1");

        for i in 0..20 {
            let before = dir.list_messages(&c1).len();
            dir.append_message(&c1, NewMessage::text("current", "You", format!("m{i}")))
                .unwrap();
            assert_eq!(dir.list_messages(&c1).len(), before + 1);
        }

        let messages = dir.list_messages(&c1);
        assert!(messages
            .windows(2)
            .all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[test]
    fn append_to_unknown_conversation_fails_without_side_effects() {
        let mut dir = directory_with(&["C1"]);
        let err = dir
            .append_message(&ConversationId::from("nope"), NewMessage::text("a", "A", "x"))
            .unwrap_err();

        assert_eq!(err, StoreError::UnknownConversation(ConversationId::from("nope")));
        assert!(dir.list_messages(&ConversationId::from("C1")).is_empty());
    }

    #[test]
    fn unknown_conversation_lists_no_messages() {
        let dir = ConversationDirectory::new();
        assert!(dir.list_messages(&ConversationId::from("ghost")).is_empty());
    }

    #[test]
    fn conversations_sorted_newest_first_with_stable_ties() {
        let mut dir = directory_with(&["A", "B", "C"]);
        dir.append_message(&ConversationId::from("B"), NewMessage::text("u1", "John", "hi"))
            .unwrap();

        let ids: Vec<String> = dir
            .list_conversations()
            .into_iter()
            .map(|c| c.id.0)
            .collect();
        assert_eq!(ids, vec!["B", "A", "C"]);
    }

    #[test]
    fn mark_read_flips_peer_messages_and_resets_unread() {
        let mut dir = directory_with(&["C1"]);
        let c1 = ConversationId::from("C1");
        let me = UserId::from("current");

        let own = dir
            .append_message(&c1, NewMessage::text("current", "You", "mine"))
            .unwrap();
        for text in ["one", "two"] {
            dir.append_message(&c1, NewMessage::text("u1", "John Smith", text))
                .unwrap();
            dir.increment_unread(&c1).unwrap();
        }
        assert_eq!(dir.get_conversation(&c1).unwrap().unread_count, 2);

        assert!(dir.mark_read(&c1, &me).unwrap());

        let messages = dir.list_messages(&c1);
        assert_eq!(
            messages.iter().find(|m| m.id == own.id).unwrap().status,
            DeliveryStatus::Sending
        );
        assert!(messages
            .iter()
            .filter(|m| m.sender_id != me)
            .all(|m| m.status == DeliveryStatus::Read));
        let conv = dir.get_conversation(&c1).unwrap();
        assert_eq!(conv.unread_count, 0);
        assert_eq!(
            conv.last_message.as_ref().unwrap().status,
            DeliveryStatus::Read
        );
    }

    #[test]
    fn mark_read_is_idempotent() {
        let mut dir = directory_with(&["C1"]);
        let c1 = ConversationId::from("C1");
        let me = UserId::from("current");
        dir.append_message(&c1, NewMessage::text("u1", "John Smith", "ping"))
            .unwrap();
        dir.increment_unread(&c1).unwrap();

        assert!(dir.mark_read(&c1, &me).unwrap());
        let after_first: Vec<Message> = dir.list_messages(&c1).to_vec();

        assert!(!dir.mark_read(&c1, &me).unwrap());
        assert!(!dir.mark_read(&c1, &me).unwrap());
        assert_eq!(dir.list_messages(&c1), after_first.as_slice());
        assert_eq!(dir.get_conversation(&c1).unwrap().unread_count, 0);
    }

    #[test]
    fn status_never_regresses() {
        let mut dir = directory_with(&["C1"]);
        let c1 = ConversationId::from("C1");
        let msg = dir
            .append_message(&c1, NewMessage::text("current", "You", "x"))
            .unwrap();

        assert!(dir.advance_status(&c1, &msg.id, DeliveryStatus::Delivered).unwrap());
        assert!(!dir.advance_status(&c1, &msg.id, DeliveryStatus::Sent).unwrap());
        assert_eq!(
            dir.get_message(&c1, &msg.id).unwrap().status,
            DeliveryStatus::Delivered
        );

        let missing = dir.advance_status(&c1, &MessageId::from("nope"), DeliveryStatus::Sent);
        assert!(matches!(missing, Err(StoreError::UnknownMessage { .. })));
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let mut dir = directory_with(&["C1"]);
        let err = dir
            .insert_conversation(conversation("C1", Utc::now()), Vec::new())
            .unwrap_err();
        assert_eq!(err, StoreError::ConversationExists(ConversationId::from("C1")));
        assert_eq!(dir.len(), 1);
    }

    #[test]
    fn presence_updates_every_shared_conversation() {
        let mut dir = directory_with(&["A", "B"]);
        let at = Utc::now();

        let changed = dir.set_presence(&UserId::from("current"), false, at);
        assert_eq!(changed.len(), 2);
        let me = dir
            .get_conversation(&ConversationId::from("A"))
            .unwrap()
            .participants
            .iter()
            .find(|p| p.id.as_str() == "current")
            .unwrap();
        assert!(!me.online);
        assert_eq!(me.last_seen, Some(at));

        // Already offline: nothing to do.
        assert!(dir.set_presence(&UserId::from("current"), false, at).is_empty());
    }

    #[test]
    fn created_conversation_starts_empty() {
        let mut dir = ConversationDirectory::new();
        let conv = dir.create_conversation(NewConversation {
            participants: vec![Participant::new("a", "A"), Participant::new("b", "B")],
            kind: ConversationKind::Group,
            title: Some("Launch".into()),
        });

        assert_eq!(conv.unread_count, 0);
        assert!(conv.last_message.is_none());
        assert!(dir.list_messages(&conv.id).is_empty());
        assert_eq!(dir.total_unread(), 0);
    }

    #[test]
    fn batch_insert_is_all_or_nothing() {
        let base = Utc::now() - Duration::hours(1);

        let mut dir = ConversationDirectory::new();
        let err = dir
            .insert_conversations(vec![
                (conversation("A", base), Vec::new()),
                (conversation("B", base), Vec::new()),
                (conversation("A", base), Vec::new()),
            ])
            .unwrap_err();
        assert_eq!(err, StoreError::ConversationExists(ConversationId::from("A")));
        assert!(dir.is_empty());

        let mut dir = directory_with(&["B"]);
        assert!(dir
            .insert_conversations(vec![
                (conversation("A", base), Vec::new()),
                (conversation("B", base), Vec::new()),
            ])
            .is_err());
        assert_eq!(dir.len(), 1);

        assert_eq!(
            dir.insert_conversations(vec![(conversation("C", base), Vec::new())])
                .unwrap(),
            1
        );
        assert_eq!(dir.len(), 2);
    }
}

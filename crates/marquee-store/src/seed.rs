//! Demo data set: two direct conversations between the local user
//! (`"current"`) and two collaborators.

use chrono::{Duration, Utc};

use marquee_shared::constants::DEFAULT_LOCAL_USER;
use marquee_shared::{
    Conversation, ConversationId, ConversationKind, DeliveryStatus, Message, MessageId,
    MessageKind, Participant, UserId,
};

use crate::directory::ConversationDirectory;
use crate::error::Result;

const AVATAR_PLACEHOLDER: &str = "/placeholder.svg?height=40&width=40";

/// Conversations with their message history, ready for
/// [`ConversationDirectory::insert_conversation`].
pub fn sample_conversations() -> Vec<(Conversation, Vec<Message>)> {
    let now = Utc::now();
    let you = || Participant::new(DEFAULT_LOCAL_USER, "You").online();

    let john = Conversation {
        id: ConversationId::from("1"),
        participants: vec![
            Participant::new("1", "John Smith")
                .with_avatar(AVATAR_PLACEHOLDER)
                .online(),
            you(),
        ],
        last_message: None,
        // Only the latest message from John is still unread.
        unread_count: 1,
        kind: ConversationKind::Direct,
        title: None,
        created_at: now - Duration::days(1),
        updated_at: now - Duration::minutes(2),
    };

    let sarah = Conversation {
        id: ConversationId::from("2"),
        participants: vec![
            Participant::new("2", "Sarah Johnson")
                .with_avatar(AVATAR_PLACEHOLDER)
                .last_seen_at(now - Duration::hours(1)),
            you(),
        ],
        last_message: None,
        unread_count: 0,
        kind: ConversationKind::Direct,
        title: None,
        created_at: now - Duration::days(2),
        updated_at: now - Duration::hours(1),
    };

    let message = |id: &str, sender: &str, name: &str, content: &str, ago: Duration, status| {
        Message {
            id: MessageId::from(id),
            conversation_id: john.id.clone(),
            sender_id: UserId::from(sender),
            sender_name: name.to_string(),
            sender_avatar: None,
            content: content.to_string(),
            timestamp: now - ago,
            kind: MessageKind::Text,
            metadata: None,
            status,
        }
    };

    let john_messages = vec![
        message(
            "1",
            "1",
            "John Smith",
            "Hi! I wanted to discuss the video project we talked about earlier.",
            Duration::hours(2),
            DeliveryStatus::Read,
        ),
        message(
            "2",
            DEFAULT_LOCAL_USER,
            "You",
            "Of course! I'd be happy to help. What specific type of video are you looking for?",
            Duration::minutes(118),
            DeliveryStatus::Read,
        ),
        message(
            "3",
            "1",
            "John Smith",
            "Thanks for the quick turnaround on the video!",
            Duration::minutes(2),
            DeliveryStatus::Delivered,
        ),
    ];

    vec![(john, john_messages), (sarah, Vec::new())]
}

/// Load [`sample_conversations`] into `directory`.
pub fn load_sample_data(directory: &mut ConversationDirectory) -> Result<usize> {
    let loaded = directory.insert_conversations(sample_conversations())?;
    tracing::info!(conversations = loaded, "Loaded sample conversations");
    Ok(loaded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_data_loads_once() {
        let mut dir = ConversationDirectory::new();
        assert_eq!(load_sample_data(&mut dir).unwrap(), 2);

        let conversations = dir.list_conversations();
        assert_eq!(conversations[0].id, ConversationId::from("1"));
        assert_eq!(conversations[0].unread_count, 1);
        assert_eq!(
            conversations[0].last_message.as_ref().unwrap().content,
            "Thanks for the quick turnaround on the video!"
        );
        assert_eq!(dir.list_messages(&ConversationId::from("1")).len(), 3);
        assert!(dir.list_messages(&ConversationId::from("2")).is_empty());

        assert!(load_sample_data(&mut dir).is_err());
    }

    #[test]
    fn unread_counts_match_unread_peer_messages() {
        for (conversation, messages) in sample_conversations() {
            let unread = messages
                .iter()
                .filter(|m| m.sender_id.as_str() != DEFAULT_LOCAL_USER)
                .filter(|m| m.status != DeliveryStatus::Read)
                .count();
            assert_eq!(conversation.unread_count as usize, unread, "{}", conversation.id);
        }
    }
}

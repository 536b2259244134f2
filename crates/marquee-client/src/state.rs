//! Application state shared by every consumer of the messaging core.

use std::collections::HashMap;
use std::sync::Mutex;

use tracing::debug;

use marquee_shared::{Conversation, ConversationId, MessageId, NotificationKind};
use marquee_store::sync::lock;
use marquee_store::Subscription;

use crate::chat::ChatService;
use crate::notifications::NotificationService;

/// One chat service and one notification feed.
///
/// Both services are `Arc`-backed, so cloning the state is cheap and every
/// clone observes the same data.
#[derive(Clone, Default)]
pub struct AppState {
    pub chat: ChatService,
    pub notifications: NotificationService,
}

impl AppState {
    pub fn new(chat: ChatService, notifications: NotificationService) -> Self {
        Self {
            chat,
            notifications,
        }
    }

    /// Raise a `Message` notification whenever a conversation's latest
    /// message comes from someone other than the connected user.
    ///
    /// Messages already present when the bridge is installed are ignored.
    /// The bridge keeps both services alive until it is unsubscribed.
    pub fn bridge_message_notifications(&self) -> Subscription {
        let seen: Mutex<HashMap<ConversationId, MessageId>> = Mutex::new(
            self.chat
                .get_conversations()
                .into_iter()
                .filter_map(|c| c.last_message.map(|m| (c.id, m.id)))
                .collect(),
        );
        let chat = self.chat.clone();
        let notifications = self.notifications.clone();

        self.chat
            .subscribe_to_conversations(move |conversations: &[Conversation]| {
                let local_user = chat.local_user();
                let mut fresh = Vec::new();
                {
                    let mut seen = lock(&seen);
                    for conversation in conversations {
                        let Some(last) = &conversation.last_message else {
                            continue;
                        };
                        if seen.get(&conversation.id) == Some(&last.id) {
                            continue;
                        }
                        seen.insert(conversation.id.clone(), last.id.clone());
                        if local_user.as_ref() != Some(&last.sender_id) {
                            fresh.push(last.clone());
                        }
                    }
                }

                for message in fresh {
                    debug!(conversation = %message.conversation_id, "Raising message notification");
                    notifications.add_notification(
                        NotificationKind::Message,
                        format!("New message from {}", message.sender_name),
                        message.content,
                        Some(format!("/messages/{}", message.conversation_id)),
                        None,
                    );
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use marquee_shared::NewMessage;
    use marquee_store::seed;

    use super::*;

    #[test]
    fn clones_share_state() {
        let state = AppState::default();
        state.chat.load_sample_data().unwrap();
        let clone = state.clone();

        clone
            .notifications
            .add_notification(NotificationKind::System, "Maintenance", "Tonight", None, None);

        assert_eq!(state.notifications.unread_count(), 1);
        assert_eq!(clone.chat.get_conversations().len(), seed::sample_conversations().len());
    }

    #[tokio::test]
    async fn peer_messages_raise_notifications() {
        let state = AppState::default();
        state.chat.load_sample_data().unwrap();
        state.chat.connect("current");
        let _bridge = state.bridge_message_notifications();
        assert!(state.notifications.get_notifications().is_empty());

        let c1 = ConversationId::from("1");
        state.chat.send_message(&c1, "mine", "current", "You").unwrap();
        assert!(state.notifications.get_notifications().is_empty());

        state
            .chat
            .send(&c1, NewMessage::text("1", "John Smith", "Got it"))
            .unwrap();
        let feed = state.notifications.get_notifications();
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].kind, NotificationKind::Message);
        assert_eq!(feed[0].title, "New message from John Smith");
        assert_eq!(feed[0].action_url.as_deref(), Some("/messages/1"));

        state.chat.disconnect();
    }
}

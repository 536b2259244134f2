//! Flat, newest-first notification feed.

use chrono::Utc;
use tracing::debug;

use marquee_shared::{NewNotification, Notification, NotificationId};

use crate::error::{Result, StoreError};

#[derive(Default)]
pub struct NotificationStore {
    /// Newest first.
    notifications: Vec<Notification>,
}

impl NotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an unread notification and put it at the head of the feed.
    pub fn add(&mut self, new: NewNotification) -> Notification {
        let notification = Notification {
            id: NotificationId::generate(),
            kind: new.kind,
            title: new.title,
            message: new.message,
            timestamp: Utc::now(),
            read: false,
            read_at: None,
            priority: new.priority,
            action_url: new.action_url,
            metadata: new.metadata,
        };

        debug!(id = %notification.id, kind = ?notification.kind, "Added notification");
        self.notifications.insert(0, notification.clone());
        notification
    }

    pub fn list(&self) -> &[Notification] {
        &self.notifications
    }

    pub fn get(&self, id: &NotificationId) -> Option<&Notification> {
        self.notifications.iter().find(|n| &n.id == id)
    }

    pub fn unread_count(&self) -> usize {
        self.notifications.iter().filter(|n| !n.read).count()
    }

    /// Mark one notification read.  Returns `false` if it already was.
    pub fn mark_read(&mut self, id: &NotificationId) -> Result<bool> {
        let notification = self
            .notifications
            .iter_mut()
            .find(|n| &n.id == id)
            .ok_or_else(|| StoreError::UnknownNotification(id.clone()))?;

        if notification.read {
            return Ok(false);
        }
        notification.read = true;
        notification.read_at = Some(Utc::now());
        Ok(true)
    }

    /// Mark everything read, returning how many notifications changed.
    pub fn mark_all_read(&mut self) -> usize {
        let now = Utc::now();
        let mut changed = 0;
        for notification in self.notifications.iter_mut().filter(|n| !n.read) {
            notification.read = true;
            notification.read_at = Some(now);
            changed += 1;
        }
        changed
    }

    /// Remove a notification, returning it.
    pub fn delete(&mut self, id: &NotificationId) -> Result<Notification> {
        let pos = self
            .notifications
            .iter()
            .position(|n| &n.id == id)
            .ok_or_else(|| StoreError::UnknownNotification(id.clone()))?;
        Ok(self.notifications.remove(pos))
    }
}

#[cfg(test)]
mod tests {
    use marquee_shared::NotificationKind;

    use super::*;

    fn add(store: &mut NotificationStore, title: &str) -> Notification {
        store.add(NewNotification::new(NotificationKind::Payment, title, "body"))
    }

    #[test]
    fn new_notifications_are_unread_and_newest_first() {
        let mut store = NotificationStore::new();
        let first = add(&mut store, "first");
        let second = add(&mut store, "second");

        assert!(!first.read && !second.read);
        let titles: Vec<&str> = store.list().iter().map(|n| n.title.as_str()).collect();
        assert_eq!(titles, vec!["second", "first"]);
        assert_eq!(store.unread_count(), 2);
    }

    #[test]
    fn mark_read_sets_flag_once() {
        let mut store = NotificationStore::new();
        let n = add(&mut store, "payout");

        assert!(store.mark_read(&n.id).unwrap());
        assert!(!store.mark_read(&n.id).unwrap());
        let stored = store.get(&n.id).unwrap();
        assert!(stored.read);
        assert!(stored.read_at.is_some());
    }

    #[test]
    fn mark_all_read_counts_changes() {
        let mut store = NotificationStore::new();
        let a = add(&mut store, "a");
        add(&mut store, "b");
        store.mark_read(&a.id).unwrap();

        assert_eq!(store.mark_all_read(), 1);
        assert_eq!(store.mark_all_read(), 0);
        assert_eq!(store.unread_count(), 0);
    }

    #[test]
    fn delete_removes_and_unknown_ids_error() {
        let mut store = NotificationStore::new();
        let n = add(&mut store, "gone");

        assert_eq!(store.delete(&n.id).unwrap().title, "gone");
        assert!(store.list().is_empty());
        assert_eq!(
            store.delete(&n.id).unwrap_err(),
            StoreError::UnknownNotification(n.id.clone())
        );
        assert!(store.mark_read(&n.id).is_err());
    }
}

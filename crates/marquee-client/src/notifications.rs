//! Notification feed facade and the OS notification seam.

use std::sync::{Arc, Mutex};

use chrono::{Local, NaiveTime};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use marquee_shared::{
    NewNotification, Notification, NotificationId, NotificationKind, NotificationPreferences,
};
use marquee_store::subscriptions::{fan_out, subscription_for};
use marquee_store::sync::lock;
use marquee_store::{ListenerSet, NotificationStore, Result, Subscription};

const TOPIC: &str = "notifications";

/// Permission state for OS-level notifications.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationPermission {
    /// Never asked.
    #[default]
    Default,
    Granted,
    Denied,
}

/// Surfaces notifications outside the application (desktop banner, push...).
pub trait SystemNotifier: Send + Sync {
    fn permission(&self) -> NotificationPermission;

    /// Ask the user for permission.  Returns the resulting state.
    fn request_permission(&self) -> NotificationPermission;

    fn show(&self, title: &str, body: &str);
}

/// Notifier that writes a log line instead of talking to the OS.
#[derive(Debug)]
pub struct LogNotifier {
    permission: Mutex<NotificationPermission>,
    grant_on_request: bool,
}

impl LogNotifier {
    /// A notifier whose permission prompt resolves to Granted or Denied
    /// depending on `grant_on_request`.
    pub fn new(grant_on_request: bool) -> Self {
        Self {
            permission: Mutex::new(NotificationPermission::Default),
            grant_on_request,
        }
    }

    pub fn granted() -> Self {
        Self {
            permission: Mutex::new(NotificationPermission::Granted),
            grant_on_request: true,
        }
    }
}

impl Default for LogNotifier {
    fn default() -> Self {
        Self::new(true)
    }
}

impl SystemNotifier for LogNotifier {
    fn permission(&self) -> NotificationPermission {
        *lock(&self.permission)
    }

    fn request_permission(&self) -> NotificationPermission {
        let mut permission = lock(&self.permission);
        // Once answered, the prompt is not shown again.
        if *permission == NotificationPermission::Default {
            *permission = if self.grant_on_request {
                NotificationPermission::Granted
            } else {
                NotificationPermission::Denied
            };
        }
        *permission
    }

    fn show(&self, title: &str, body: &str) {
        info!(title, body, "System notification");
    }
}

/// Newest-first notification feed with change listeners.  Cheap to clone.
#[derive(Clone)]
pub struct NotificationService {
    store: Arc<Mutex<NotificationStore>>,
    listeners: Arc<Mutex<ListenerSet<[Notification]>>>,
    preferences: Arc<Mutex<NotificationPreferences>>,
    notifier: Arc<dyn SystemNotifier>,
}

impl NotificationService {
    pub fn new(notifier: Arc<dyn SystemNotifier>) -> Self {
        Self {
            store: Arc::new(Mutex::new(NotificationStore::new())),
            listeners: Arc::new(Mutex::new(ListenerSet::new())),
            preferences: Arc::new(Mutex::new(NotificationPreferences::default())),
            notifier,
        }
    }

    pub fn add_notification(
        &self,
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
        action_url: Option<String>,
        metadata: Option<serde_json::Map<String, serde_json::Value>>,
    ) -> Option<Notification> {
        let mut new = NewNotification::new(kind, title, message);
        new.action_url = action_url;
        new.metadata = metadata;
        self.add(new)
    }

    /// Insert at the head of the feed, notify listeners, then surface it
    /// through the system notifier if permission was granted and the
    /// preferences allow it.  Returns `None` when the kind is switched off.
    pub fn add(&self, new: NewNotification) -> Option<Notification> {
        self.add_at(new, Local::now().time())
    }

    fn add_at(&self, new: NewNotification, now: NaiveTime) -> Option<Notification> {
        let preferences = lock(&self.preferences).clone();
        if !preferences.accepts(new.kind) {
            debug!(kind = ?new.kind, "Notification dropped, kind disabled");
            return None;
        }

        let (notification, snapshot) = {
            let mut store = lock(&self.store);
            let notification = store.add(new);
            (notification, store.list().to_vec())
        };
        self.publish(&snapshot);

        if self.notifier.permission() != NotificationPermission::Granted {
            debug!(id = %notification.id, "System notification suppressed, no permission");
        } else if !preferences.allows_push(notification.kind, now) {
            debug!(id = %notification.id, "System notification suppressed by preferences");
        } else {
            self.notifier.show(&notification.title, &notification.message);
        }
        Some(notification)
    }

    /// Returns `false` if the notification was already read.
    pub fn mark_as_read(&self, id: &NotificationId) -> Result<bool> {
        let (changed, snapshot) = {
            let mut store = lock(&self.store);
            let changed = store.mark_read(id).map_err(|e| {
                warn!(error = %e, "Mark notification read failed");
                e
            })?;
            (changed, store.list().to_vec())
        };
        if changed {
            self.publish(&snapshot);
        }
        Ok(changed)
    }

    pub fn mark_all_as_read(&self) -> usize {
        let (changed, snapshot) = {
            let mut store = lock(&self.store);
            let changed = store.mark_all_read();
            (changed, store.list().to_vec())
        };
        if changed > 0 {
            debug!(count = changed, "Marked all notifications read");
            self.publish(&snapshot);
        }
        changed
    }

    pub fn delete_notification(&self, id: &NotificationId) -> Result<Notification> {
        let (removed, snapshot) = {
            let mut store = lock(&self.store);
            let removed = store.delete(id).map_err(|e| {
                warn!(error = %e, "Delete notification failed");
                e
            })?;
            (removed, store.list().to_vec())
        };
        self.publish(&snapshot);
        Ok(removed)
    }

    pub fn get_notifications(&self) -> Vec<Notification> {
        lock(&self.store).list().to_vec()
    }

    pub fn unread_count(&self) -> usize {
        lock(&self.store).unread_count()
    }

    pub fn preferences(&self) -> NotificationPreferences {
        lock(&self.preferences).clone()
    }

    pub fn set_preferences(&self, preferences: NotificationPreferences) {
        debug!(?preferences, "Notification preferences updated");
        *lock(&self.preferences) = preferences;
    }

    pub fn permission(&self) -> NotificationPermission {
        self.notifier.permission()
    }

    pub fn request_permission(&self) -> NotificationPermission {
        let permission = self.notifier.request_permission();
        info!(?permission, "Notification permission requested");
        permission
    }

    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&[Notification]) + Send + Sync + 'static,
    {
        let id = lock(&self.listeners).add(Arc::new(listener));
        subscription_for(&self.listeners, id, TOPIC)
    }

    fn publish(&self, snapshot: &[Notification]) {
        let listeners = lock(&self.listeners).snapshot();
        fan_out(TOPIC, &listeners, snapshot);
    }
}

impl Default for NotificationService {
    fn default() -> Self {
        Self::new(Arc::new(LogNotifier::default()))
    }
}

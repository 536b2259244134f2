//! Listener registration and change fan-out.
//!
//! A [`ListenerSet`] is an ordered list of callbacks; the
//! [`SubscriptionRegistry`] keeps one set per conversation plus a global set
//! for the conversation list.  Registration returns a [`Subscription`]
//! handle that removes exactly that registration.
//!
//! Fan-out always runs on a snapshot of the listeners taken under the lock,
//! so callbacks are free to subscribe, unsubscribe or call back into the
//! owning service.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, Weak};

use tracing::{debug, error};

use marquee_shared::{Conversation, ConversationId, Message};

use crate::error::{Result, StoreError};
use crate::sync::lock;

/// A shared callback receiving the full current state of a collection.
pub type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

pub type MessageListener = Listener<[Message]>;
pub type ConversationListener = Listener<[Conversation]>;

// ---------------------------------------------------------------------------
// ListenerSet
// ---------------------------------------------------------------------------

/// Listeners in registration order.  Every `add` is a distinct registration,
/// even for the same callback.
pub struct ListenerSet<T: ?Sized> {
    next_id: u64,
    entries: Vec<(u64, Listener<T>)>,
}

impl<T: ?Sized> Default for ListenerSet<T> {
    fn default() -> Self {
        Self {
            next_id: 1,
            entries: Vec::new(),
        }
    }
}

impl<T: ?Sized> ListenerSet<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, listener: Listener<T>) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.push((id, listener));
        id
    }

    pub fn remove(&mut self, id: u64) -> Result<()> {
        let pos = self
            .entries
            .iter()
            .position(|(entry_id, _)| *entry_id == id)
            .ok_or(StoreError::UnknownListener(id))?;
        self.entries.remove(pos);
        Ok(())
    }

    pub fn snapshot(&self) -> Vec<Listener<T>> {
        self.entries.iter().map(|(_, l)| Arc::clone(l)).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Invoke each listener in order.  A panicking listener is logged and
/// skipped; the rest still run.  Returns how many completed normally.
pub fn fan_out<T: ?Sized>(topic: &str, listeners: &[Listener<T>], value: &T) -> usize {
    let mut delivered = 0;
    for (index, listener) in listeners.iter().enumerate() {
        match panic::catch_unwind(AssertUnwindSafe(|| listener(value))) {
            Ok(()) => delivered += 1,
            Err(payload) => {
                let reason = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!(topic, listener = index, %reason, "Listener panicked");
            }
        }
    }
    delivered
}

// ---------------------------------------------------------------------------
// Subscription handle
// ---------------------------------------------------------------------------

type Remover = Box<dyn FnOnce() + Send>;

/// Revocable registration handle.  Calling [`unsubscribe`](Self::unsubscribe)
/// more than once is a no-op.  Dropping the handle does not unsubscribe.
pub struct Subscription {
    remover: Mutex<Option<Remover>>,
}

impl Subscription {
    pub fn new(remover: impl FnOnce() + Send + 'static) -> Self {
        Self {
            remover: Mutex::new(Some(Box::new(remover))),
        }
    }

    pub fn unsubscribe(&self) {
        let remover = lock(&self.remover).take();
        if let Some(remove) = remover {
            remove();
        }
    }

    /// `false` once [`unsubscribe`](Self::unsubscribe) has run.
    pub fn is_active(&self) -> bool {
        lock(&self.remover).is_some()
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

/// Build a handle that removes `id` from a shared [`ListenerSet`].
pub fn subscription_for<T: ?Sized + 'static>(
    set: &Arc<Mutex<ListenerSet<T>>>,
    id: u64,
    topic: &'static str,
) -> Subscription {
    let weak: Weak<Mutex<ListenerSet<T>>> = Arc::downgrade(set);
    Subscription::new(move || {
        let Some(set) = weak.upgrade() else {
            return;
        };
        let result = lock(&set).remove(id);
        if let Err(e) = result {
            debug!(topic, error = %e, "Unsubscribe ignored");
        }
    })
}

// ---------------------------------------------------------------------------
// Chat registry
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Registry {
    messages: HashMap<ConversationId, ListenerSet<[Message]>>,
    conversations: ListenerSet<[Conversation]>,
}

impl Registry {
    fn remove_message_listener(&mut self, conversation_id: &ConversationId, id: u64) -> Result<()> {
        let Some(set) = self.messages.get_mut(conversation_id) else {
            return Err(StoreError::UnknownListener(id));
        };
        let result = set.remove(id);
        if set.is_empty() {
            self.messages.remove(conversation_id);
        }
        result
    }
}

/// Per-conversation and global listener sets for chat.
#[derive(Clone, Default)]
pub struct SubscriptionRegistry {
    inner: Arc<Mutex<Registry>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe_to_messages(
        &self,
        conversation_id: ConversationId,
        listener: MessageListener,
    ) -> Subscription {
        let id = lock(&self.inner)
            .messages
            .entry(conversation_id.clone())
            .or_default()
            .add(listener);

        let weak = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let result = lock(&inner).remove_message_listener(&conversation_id, id);
            if let Err(e) = result {
                debug!(conversation = %conversation_id, error = %e, "Unsubscribe ignored");
            }
        })
    }

    pub fn subscribe_to_conversations(&self, listener: ConversationListener) -> Subscription {
        let id = lock(&self.inner).conversations.add(listener);

        let weak = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let result = lock(&inner).conversations.remove(id);
            if let Err(e) = result {
                debug!(error = %e, "Unsubscribe ignored");
            }
        })
    }

    pub fn message_listener_count(&self, conversation_id: &ConversationId) -> usize {
        lock(&self.inner)
            .messages
            .get(conversation_id)
            .map_or(0, ListenerSet::len)
    }

    pub fn conversation_listener_count(&self) -> usize {
        lock(&self.inner).conversations.len()
    }

    /// Deliver `messages` to the listeners of `conversation_id`.
    pub fn notify_messages(&self, conversation_id: &ConversationId, messages: &[Message]) -> usize {
        let listeners = lock(&self.inner)
            .messages
            .get(conversation_id)
            .map(ListenerSet::snapshot)
            .unwrap_or_default();
        fan_out("messages", &listeners, messages)
    }

    /// Deliver the sorted conversation list to the global listeners.
    pub fn notify_conversations(&self, conversations: &[Conversation]) -> usize {
        let listeners = lock(&self.inner).conversations.snapshot();
        fan_out("conversations", &listeners, conversations)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn counter() -> (Arc<AtomicUsize>, MessageListener) {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let listener: MessageListener = Arc::new(move |_: &[Message]| {
            h.fetch_add(1, Ordering::SeqCst);
        });
        (hits, listener)
    }

    #[test]
    fn listeners_run_in_registration_order() {
        let registry = SubscriptionRegistry::new();
        let c1 = ConversationId::from("C1");
        let order = Arc::new(Mutex::new(Vec::new()));

        for tag in 1..=3 {
            let order = Arc::clone(&order);
            let _sub = registry.subscribe_to_messages(
                c1.clone(),
                Arc::new(move |_: &[Message]| order.lock().unwrap().push(tag)),
            );
        }

        assert_eq!(registry.notify_messages(&c1, &[]), 3);
        assert_eq!(*order.lock().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn unsubscribe_removes_only_its_registration() {
        let registry = SubscriptionRegistry::new();
        let c1 = ConversationId::from("C1");
        let (removed_hits, removed) = counter();
        let (kept_hits, kept) = counter();

        let sub = registry.subscribe_to_messages(c1.clone(), removed);
        let _keep = registry.subscribe_to_messages(c1.clone(), kept);

        sub.unsubscribe();
        sub.unsubscribe();
        assert!(!sub.is_active());

        registry.notify_messages(&c1, &[]);
        assert_eq!(removed_hits.load(Ordering::SeqCst), 0);
        assert_eq!(kept_hits.load(Ordering::SeqCst), 1);
        assert_eq!(registry.message_listener_count(&c1), 1);
    }

    #[test]
    fn same_listener_subscribed_twice_fires_twice() {
        let registry = SubscriptionRegistry::new();
        let c1 = ConversationId::from("C1");
        let (hits, listener) = counter();

        let first = registry.subscribe_to_messages(c1.clone(), Arc::clone(&listener));
        let _second = registry.subscribe_to_messages(c1.clone(), listener);

        registry.notify_messages(&c1, &[]);
        assert_eq!(hits.load(Ordering::SeqCst), 2);

        first.unsubscribe();
        registry.notify_messages(&c1, &[]);
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn panicking_listener_does_not_stop_fan_out() {
        let registry = SubscriptionRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let _bad = registry.subscribe_to_conversations(Arc::new(|_: &[Conversation]| {
            panic!("listener bug");
        }));
        let h = Arc::clone(&hits);
        let _good = registry.subscribe_to_conversations(Arc::new(move |_: &[Conversation]| {
            h.fetch_add(1, Ordering::SeqCst);
        }));

        assert_eq!(registry.notify_conversations(&[]), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn listener_may_unsubscribe_during_fan_out() {
        let registry = SubscriptionRegistry::new();
        let c1 = ConversationId::from("C1");
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

        let s = Arc::clone(&slot);
        let sub = registry.subscribe_to_messages(
            c1.clone(),
            Arc::new(move |_: &[Message]| {
                if let Some(sub) = s.lock().unwrap().as_ref() {
                    sub.unsubscribe();
                }
            }),
        );
        *slot.lock().unwrap() = Some(sub);

        assert_eq!(registry.notify_messages(&c1, &[]), 1);
        assert_eq!(registry.message_listener_count(&c1), 0);
        assert_eq!(registry.notify_messages(&c1, &[]), 0);
    }

    #[test]
    fn removing_unknown_id_reports_unknown_listener() {
        let mut set: ListenerSet<[Message]> = ListenerSet::new();
        assert_eq!(set.remove(42), Err(StoreError::UnknownListener(42)));
    }

    #[test]
    fn shared_set_handle_removes_its_listener_once() {
        let set: Arc<Mutex<ListenerSet<[Message]>>> = Arc::new(Mutex::new(ListenerSet::new()));
        let (hits, listener) = counter();
        let id = set.lock().unwrap().add(listener);

        let sub = subscription_for(&set, id, "test");
        assert!(sub.is_active());
        sub.unsubscribe();
        sub.unsubscribe();

        assert!(!sub.is_active());
        assert!(set.lock().unwrap().is_empty());
        let listeners = set.lock().unwrap().snapshot();
        let empty: &[Message] = &[];
        assert_eq!(fan_out("test", &listeners, empty), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn shared_set_handle_outliving_the_set_is_harmless() {
        let set: Arc<Mutex<ListenerSet<[Message]>>> = Arc::new(Mutex::new(ListenerSet::new()));
        let (_, listener) = counter();
        let id = set.lock().unwrap().add(listener);
        let sub = subscription_for(&set, id, "test");

        drop(set);
        sub.unsubscribe();
        assert!(!sub.is_active());
    }
}

//! Subscriber registry for snapshot updates.
//!
//! The coordinator calls `notify()` after every applied poll or broadcast
//! merge. Callbacks run on the task that applied the update, so they should
//! return quickly.

use crate::api::CurrentConditions;
use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use strum::Display;

/// Which channel produced an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum UpdateSource {
    Poll,
    Broadcast,
}

/// Handle returned by [`UpdateNotifier::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback = Arc<dyn Fn(&CurrentConditions, UpdateSource) + Send + Sync>;

#[derive(Default)]
pub struct UpdateNotifier {
    next_id: AtomicU64,
    subscribers: RwLock<Vec<(SubscriptionId, Callback)>>,
}

impl UpdateNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(
        &self,
        callback: impl Fn(&CurrentConditions, UpdateSource) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.write().push((id, Arc::new(callback)));
        id
    }

    /// Returns `false` if `id` was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|(existing, _)| *existing != id);
        subscribers.len() != before
    }

    pub fn len(&self) -> usize {
        self.subscribers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.read().is_empty()
    }

    /// Invoke every subscriber.
    ///
    /// The registry lock is released before the callbacks run, so a callback
    /// may subscribe or unsubscribe.
    pub fn notify(&self, snapshot: &CurrentConditions, source: UpdateSource) {
        let callbacks: Vec<Callback> = self
            .subscribers
            .read()
            .iter()
            .map(|(_, callback)| callback.clone())
            .collect();

        for callback in callbacks {
            callback(snapshot, source);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ParseMode;
    use crate::api::conditions::fixtures;
    use std::sync::atomic::AtomicUsize;

    fn snapshot() -> CurrentConditions {
        CurrentConditions::from_json(&fixtures::weatherlink_data(), ParseMode::Strict).unwrap()
    }

    #[test]
    fn test_subscribe_and_notify() {
        let notifier = UpdateNotifier::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let id = notifier.subscribe({
            let calls = calls.clone();
            move |snapshot, source| {
                assert_eq!(snapshot.did, "001D0A7139D6");
                assert_eq!(source, UpdateSource::Poll);
                calls.fetch_add(1, Ordering::SeqCst);
            }
        });
        assert_eq!(notifier.len(), 1);

        notifier.notify(&snapshot(), UpdateSource::Poll);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert!(notifier.unsubscribe(id));
        assert!(!notifier.unsubscribe(id));
        assert!(notifier.is_empty());

        notifier.notify(&snapshot(), UpdateSource::Poll);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_callback_may_unsubscribe_itself() {
        let notifier = Arc::new(UpdateNotifier::new());
        let id = Arc::new(parking_lot::Mutex::new(None));

        let subscribed = notifier.subscribe({
            let notifier = notifier.clone();
            let id = id.clone();
            move |_, _| {
                if let Some(id) = id.lock().take() {
                    notifier.unsubscribe(id);
                }
            }
        });
        *id.lock() = Some(subscribed);

        notifier.notify(&snapshot(), UpdateSource::Broadcast);
        assert!(notifier.is_empty());
    }

    #[test]
    fn test_update_source_display() {
        assert_eq!(UpdateSource::Poll.to_string(), "poll");
        assert_eq!(UpdateSource::Broadcast.to_string(), "broadcast");
    }
}

//! Subscribable values.
//!
//! An [`Observable`] holds the current value of some piece of state and fans
//! every new value out to its observers synchronously, in publish order.
//! New observers are called with the current value immediately. Async
//! consumers can instead take a `tokio::sync::watch` receiver.
//!
//! Deliveries are serialised by a reentrant lock. Several observables may
//! share one, so an owner can order publishes across all of its feeds.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, ReentrantMutex};
use tokio::sync::watch;

type Observer<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Lock held while observers are being called.
pub type DeliveryLock = Arc<ReentrantMutex<()>>;

struct Shared<T> {
    delivery: DeliveryLock,
    observers: Mutex<Vec<(u64, Observer<T>)>>,
    next_id: AtomicU64,
    sender: watch::Sender<T>,
}

/// A value with change notifications. Clones share the same state.
pub struct Observable<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Observable<T> {
    pub fn new(initial: T) -> Self {
        Self::with_delivery_lock(initial, Arc::new(ReentrantMutex::new(())))
    }

    /// Like [`Self::new`], with deliveries serialised against every other
    /// holder of `delivery`.
    pub fn with_delivery_lock(initial: T, delivery: DeliveryLock) -> Self {
        let (sender, _) = watch::channel(initial);
        Self {
            shared: Arc::new(Shared {
                delivery,
                observers: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(0),
                sender,
            }),
        }
    }

    /// Current value.
    pub fn get(&self) -> T {
        self.shared.sender.borrow().clone()
    }

    /// Replace the value and notify every observer.
    ///
    /// Observers run on the publishing thread with the delivery lock held.
    /// They may read back from the owner and may publish again from the same
    /// thread, but must not block on another thread that publishes.
    pub fn publish(&self, value: T) {
        let _delivery = self.shared.delivery.lock();
        // Snapshot so observers may unsubscribe from inside a callback
        let observers: Vec<Observer<T>> = {
            let observers = self.shared.observers.lock();
            self.shared.sender.send_replace(value.clone());
            observers.iter().map(|(_, o)| Arc::clone(o)).collect()
        };
        for observer in observers {
            observer(&value);
        }
    }

    /// Register `observer`. It is called right away with the current value,
    /// then on every publish until the returned [`Subscription`] is dropped
    /// or unsubscribed.
    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let observer: Observer<T> = Arc::new(observer);
        let _delivery = self.shared.delivery.lock();
        let current = {
            let mut observers = self.shared.observers.lock();
            observers.push((id, Arc::clone(&observer)));
            self.get()
        };
        observer(&current);

        let weak: Weak<Shared<T>> = Arc::downgrade(&self.shared);
        Subscription {
            cancel: Some(Box::new(move || {
                if let Some(shared) = weak.upgrade() {
                    shared.observers.lock().retain(|(oid, _)| *oid != id);
                }
            })),
        }
    }

    /// Receiver for async consumers; starts at the current value.
    pub fn watch(&self) -> watch::Receiver<T> {
        self.shared.sender.subscribe()
    }

    pub fn observer_count(&self) -> usize {
        self.shared.observers.lock().len()
    }
}

/// Handle returned by [`Observable::subscribe`].
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        self.cancel_now();
    }

    fn cancel_now(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel_now();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribe_replays_current_value() {
        let observable = Observable::new(7);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _sub = observable.subscribe(move |v| sink.lock().push(*v));
        assert_eq!(*seen.lock(), vec![7]);
    }

    #[test]
    fn test_publish_fans_out_in_order() {
        let observable = Observable::new(0);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _sub = observable.subscribe(move |v| sink.lock().push(*v));

        observable.publish(1);
        observable.publish(2);
        assert_eq!(*seen.lock(), vec![0, 1, 2]);
        assert_eq!(observable.get(), 2);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let observable = Observable::new(0);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let sub = observable.subscribe(move |v| sink.lock().push(*v));
        assert_eq!(observable.observer_count(), 1);

        sub.unsubscribe();
        observable.publish(5);
        assert_eq!(*seen.lock(), vec![0]);
        assert_eq!(observable.observer_count(), 0);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let observable = Observable::new(String::from("a"));
        {
            let _sub = observable.subscribe(|_| {});
            assert_eq!(observable.observer_count(), 1);
        }
        assert_eq!(observable.observer_count(), 0);
    }

    #[test]
    fn test_subscription_outliving_observable() {
        let observable = Observable::new(1);
        let sub = observable.subscribe(|_| {});
        drop(observable);
        sub.unsubscribe();
    }

    #[test]
    fn test_subscribe_while_another_thread_publishes() {
        let observable = Observable::new(0u32);
        let publisher = observable.clone();
        let handle = std::thread::spawn(move || {
            for i in 1..=1000 {
                publisher.publish(i);
            }
        });

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _sub = observable.subscribe(move |v| sink.lock().push(*v));
        handle.join().unwrap();

        let seen = seen.lock();
        assert_eq!(seen.last(), Some(&1000));
        assert!(seen.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn test_shared_delivery_lock_allows_nested_publish() {
        let lock: DeliveryLock = Arc::new(ReentrantMutex::new(()));
        let source = Observable::with_delivery_lock(0, Arc::clone(&lock));
        let derived = Observable::with_delivery_lock(0, lock);
        let target = derived.clone();
        let _sub = source.subscribe(move |v| target.publish(*v * 10));

        source.publish(3);
        assert_eq!(derived.get(), 30);
    }

    #[tokio::test]
    async fn test_watch_receiver_sees_changes() {
        let observable = Observable::new(false);
        let mut rx = observable.watch();
        assert!(!*rx.borrow());

        observable.publish(true);
        rx.changed().await.unwrap();
        assert!(*rx.borrow_and_update());
    }
}

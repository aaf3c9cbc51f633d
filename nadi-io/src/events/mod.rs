//! Event registry: named publish channels with dynamic subscribers
//!
//! Every per-record channel delivers to its own subscribers first, in
//! registration order, then to the catch-all [`EventName::Feedback`]
//! subscribers.
//!
//! # Snapshot semantics
//!
//! `publish` copies the subscriber list under a read lock and invokes the
//! copy with no lock held. A subscription added or removed while a publish is
//! in flight takes effect from the next publish: an unsubscribed callback may
//! still receive the record being delivered, but never twice.
//!
//! # Callback contract
//!
//! Callbacks run on the dispatch thread. A slow callback delays every later
//! record, so subscribers that do real work should hand it off (e.g. over a
//! channel). A panicking callback is isolated and reported as
//! [`Diagnostic::SubscriberPanicked`].

pub mod diagnostics;

pub use diagnostics::{Diagnostic, DiagnosticsSender};

use crate::core::types::{EventName, Feedback, SensorPayload, SensorRecord};
use crate::error::Result;
use parking_lot::RwLock;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Subscriber callback; receives the channel name alongside the record
pub type Callback = dyn Fn(&Feedback) + Send + Sync;

/// Token returned by `subscribe`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    id: u64,
    event: EventName,
}

impl SubscriptionHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn event(&self) -> EventName {
        self.event
    }
}

struct Subscriber {
    id: u64,
    callback: Arc<Callback>,
}

/// Thread-safe map from [`EventName`] to ordered subscribers
pub struct EventRegistry {
    channels: RwLock<Vec<Vec<Subscriber>>>,
    next_id: AtomicU64,
    diagnostics: DiagnosticsSender,
}

impl EventRegistry {
    pub fn new(diagnostics: DiagnosticsSender) -> Self {
        Self {
            channels: RwLock::new((0..EventName::COUNT).map(|_| Vec::new()).collect()),
            next_id: AtomicU64::new(1),
            diagnostics,
        }
    }

    /// Subscribe by channel name
    ///
    /// Fails with [`Error::UnknownEvent`](crate::error::Error::UnknownEvent) for
    /// names outside the fixed set. `"Feedback"` registers a catch-all.
    pub fn subscribe<F>(&self, name: &str, callback: F) -> Result<SubscriptionHandle>
    where
        F: Fn(&Feedback) + Send + Sync + 'static,
    {
        let event = name.parse::<EventName>()?;
        Ok(self.subscribe_event(event, callback))
    }

    /// Subscribe to a known channel
    pub fn subscribe_event<F>(&self, event: EventName, callback: F) -> SubscriptionHandle
    where
        F: Fn(&Feedback) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.channels.write()[event.index()].push(Subscriber {
            id,
            callback: Arc::new(callback),
        });
        log::debug!("Subscribed #{} to {}", id, event);
        SubscriptionHandle { id, event }
    }

    /// Subscribe with a callback typed by payload
    pub fn subscribe_to<T, F>(&self, callback: F) -> SubscriptionHandle
    where
        T: SensorPayload,
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.subscribe_event(T::EVENT, move |feedback: &Feedback| {
            if let Some(payload) = T::from_record(&feedback.record) {
                callback(payload);
            }
        })
    }

    /// Subscribe to every record on every channel
    pub fn subscribe_all<F>(&self, callback: F) -> SubscriptionHandle
    where
        F: Fn(&Feedback) + Send + Sync + 'static,
    {
        self.subscribe_event(EventName::Feedback, callback)
    }

    /// Remove a subscription; returns `false` if it was already gone
    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        let mut channels = self.channels.write();
        let subscribers = &mut channels[handle.event.index()];
        match subscribers.iter().position(|s| s.id == handle.id) {
            Some(pos) => {
                subscribers.remove(pos);
                log::debug!("Unsubscribed #{} from {}", handle.id, handle.event);
                true
            }
            None => false,
        }
    }

    /// Deliver a record to its channel, then to catch-all subscribers
    ///
    /// Returns the number of callbacks that completed without panicking.
    pub fn publish(&self, record: &SensorRecord) -> usize {
        let event = record.event_name();
        let snapshot: Vec<(u64, Arc<Callback>)> = {
            let channels = self.channels.read();
            channels[event.index()]
                .iter()
                .chain(channels[EventName::Feedback.index()].iter())
                .map(|s| (s.id, Arc::clone(&s.callback)))
                .collect()
        };

        let feedback = Feedback {
            name: event,
            record: *record,
        };
        let mut delivered = 0;
        for (id, callback) in snapshot {
            match panic::catch_unwind(AssertUnwindSafe(|| callback(&feedback))) {
                Ok(()) => delivered += 1,
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    log::warn!("Subscriber #{} on {} panicked: {}", id, event, message);
                    self.diagnostics.report(Diagnostic::SubscriberPanicked {
                        event,
                        subscription: id,
                        message,
                    });
                }
            }
        }
        delivered
    }

    /// Subscribers currently registered on a channel
    pub fn subscriber_count(&self, event: EventName) -> usize {
        self.channels.read()[event.index()].len()
    }

    /// Drop every subscription
    pub fn clear(&self) {
        let mut channels = self.channels.write();
        for subscribers in channels.iter_mut() {
            subscribers.clear();
        }
        log::debug!("Event registry cleared");
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Bumper, Inertial};
    use crate::error::Error;
    use parking_lot::Mutex;
    use std::thread;

    fn registry() -> (EventRegistry, crossbeam_channel::Receiver<Diagnostic>) {
        let (tx, rx) = diagnostics::channel(16);
        (EventRegistry::new(tx), rx)
    }

    fn bumper() -> SensorRecord {
        SensorRecord::Bumper(Bumper {
            left: true,
            center: false,
            right: false,
        })
    }

    #[test]
    fn test_unknown_event_rejected() {
        let (reg, _rx) = registry();
        assert!(matches!(
            reg.subscribe("Lidar", |_| {}),
            Err(Error::UnknownEvent(name)) if name == "Lidar"
        ));
        assert!(reg.subscribe("Feedback", |_| {}).is_ok());
        assert!(reg.subscribe("CliffADC", |_| {}).is_ok());
    }

    #[test]
    fn test_registration_order_then_catch_all() {
        let (reg, _rx) = registry();
        let log = Arc::new(Mutex::new(Vec::new()));

        let l = Arc::clone(&log);
        reg.subscribe_all(move |fb| l.lock().push(format!("all:{}", fb.name)));
        for i in 1..=3 {
            let l = Arc::clone(&log);
            reg.subscribe("Bumper", move |_| l.lock().push(format!("sub{}", i)))
                .unwrap();
        }

        assert_eq!(reg.publish(&bumper()), 4);
        assert_eq!(
            *log.lock(),
            vec!["sub1", "sub2", "sub3", "all:Bumper"]
        );
    }

    #[test]
    fn test_other_channels_not_invoked() {
        let (reg, _rx) = registry();
        let hits = Arc::new(AtomicU64::new(0));
        let h = Arc::clone(&hits);
        reg.subscribe_event(EventName::Inertial, move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });

        reg.publish(&bumper());
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        reg.publish(&SensorRecord::Inertial(Inertial::default()));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_subscriber_isolated() {
        let (reg, rx) = registry();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let s = Arc::clone(&seen);
        reg.subscribe("Bumper", move |_| s.lock().push(1)).unwrap();
        let failing = reg
            .subscribe("Bumper", |_| panic!("subscriber two failed"))
            .unwrap();
        let s = Arc::clone(&seen);
        reg.subscribe("Bumper", move |_| s.lock().push(3)).unwrap();

        assert_eq!(reg.publish(&bumper()), 2);
        assert_eq!(*seen.lock(), vec![1, 3]);

        match rx.try_recv().unwrap() {
            Diagnostic::SubscriberPanicked {
                event,
                subscription,
                message,
            } => {
                assert_eq!(event, EventName::Bumper);
                assert_eq!(subscription, failing.id());
                assert_eq!(message, "subscriber two failed");
            }
            other => panic!("unexpected diagnostic: {:?}", other),
        }
    }

    #[test]
    fn test_typed_subscription() {
        let (reg, _rx) = registry();
        let left = Arc::new(AtomicU64::new(0));
        let l = Arc::clone(&left);
        reg.subscribe_to::<Bumper, _>(move |b| {
            if b.left {
                l.fetch_add(1, Ordering::SeqCst);
            }
        });

        reg.publish(&bumper());
        reg.publish(&bumper());
        assert_eq!(left.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unsubscribe_idempotent() {
        let (reg, _rx) = registry();
        let handle = reg.subscribe("Gyro", |_| {}).unwrap();
        assert_eq!(reg.subscriber_count(EventName::Gyro), 1);

        assert!(reg.unsubscribe(handle));
        assert!(!reg.unsubscribe(handle));
        assert_eq!(reg.subscriber_count(EventName::Gyro), 0);
    }

    #[test]
    fn test_unsubscribe_during_publish() {
        let (reg, _rx) = registry();
        let reg = Arc::new(reg);
        let calls = Arc::new(AtomicU64::new(0));
        let handle_slot: Arc<Mutex<Option<SubscriptionHandle>>> = Arc::new(Mutex::new(None));

        // First subscriber removes the second from inside the publish
        let r = Arc::clone(&reg);
        let slot = Arc::clone(&handle_slot);
        reg.subscribe("Bumper", move |_| {
            if let Some(h) = slot.lock().take() {
                r.unsubscribe(h);
            }
        })
        .unwrap();
        let c = Arc::clone(&calls);
        let second = reg
            .subscribe("Bumper", move |_| {
                c.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        *handle_slot.lock() = Some(second);

        // In flight: the snapshot still holds the second subscriber
        reg.publish(&bumper());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Next publish: removed
        reg.publish(&bumper());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(reg.subscriber_count(EventName::Bumper), 1);
    }

    #[test]
    fn test_concurrent_publish_and_subscribe() {
        let (reg, _rx) = registry();
        let reg = Arc::new(reg);
        let total = Arc::new(AtomicU64::new(0));

        let publishers: Vec<_> = (0..4)
            .map(|_| {
                let reg = Arc::clone(&reg);
                thread::spawn(move || {
                    for _ in 0..500 {
                        reg.publish(&bumper());
                    }
                })
            })
            .collect();

        let subscriber = {
            let reg = Arc::clone(&reg);
            let total = Arc::clone(&total);
            thread::spawn(move || {
                for _ in 0..200 {
                    let t = Arc::clone(&total);
                    let h = reg.subscribe_event(EventName::Bumper, move |_| {
                        t.fetch_add(1, Ordering::Relaxed);
                    });
                    reg.unsubscribe(h);
                }
            })
        };

        for p in publishers {
            p.join().unwrap();
        }
        subscriber.join().unwrap();
        assert_eq!(reg.subscriber_count(EventName::Bumper), 0);
    }

    #[test]
    fn test_clear() {
        let (reg, _rx) = registry();
        reg.subscribe("Bumper", |_| {}).unwrap();
        reg.subscribe_all(|_| {});
        reg.clear();
        assert_eq!(reg.subscriber_count(EventName::Bumper), 0);
        assert_eq!(reg.subscriber_count(EventName::Feedback), 0);
        assert_eq!(reg.publish(&bumper()), 0);
    }
}

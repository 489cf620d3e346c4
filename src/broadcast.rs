//! One-to-many fan-out of change events to long-lived subscribers.
//!
//! Each subscriber owns a bounded channel. Delivery is best-effort per
//! subscriber: a full queue drops the message for that subscriber only, and
//! a closed queue deregisters it — one slow or dead client never blocks the
//! rest. Per-subscriber ordering follows emission order; there is no
//! cross-subscriber ordering.

use std::sync::Arc;
use std::sync::Weak;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::events::{ChangeEvent, PushMessage};

/// Queue depth per subscriber. Beyond this, messages to that subscriber are
/// dropped; the client resyncs with a fresh read.
const SUBSCRIBER_QUEUE_CAPACITY: usize = 64;

pub struct Broadcaster {
    subscribers: DashMap<u64, mpsc::Sender<PushMessage>>,
    next_id: AtomicU64,
    /// Self-reference handed to subscriptions and the heartbeat task so
    /// neither keeps the broadcaster alive on its own.
    this: Weak<Broadcaster>,
}

impl Broadcaster {
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|this| Broadcaster {
            subscribers: DashMap::new(),
            next_id: AtomicU64::new(1),
            this: this.clone(),
        })
    }

    /// Register a new subscriber. The connection message is queued
    /// synchronously, before any event that follows the subscribe call.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE_CAPACITY);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let _ = tx.try_send(PushMessage::connection());
        self.subscribers.insert(id, tx);

        Subscription {
            id,
            rx,
            broadcaster: self.this.clone(),
        }
    }

    /// Fan a change event out to every subscriber.
    pub fn broadcast(&self, event: &ChangeEvent) {
        self.send_to_all(PushMessage::from_event(event));
    }

    /// Fan an arbitrary message out (heartbeats use this too).
    pub fn send_to_all(&self, message: PushMessage) {
        let mut dead = Vec::new();
        for entry in self.subscribers.iter() {
            match entry.value().try_send(message.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(
                        subscriber = *entry.key(),
                        "subscriber queue full, dropping message"
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    dead.push(*entry.key());
                }
            }
        }
        for id in dead {
            self.subscribers.remove(&id);
        }
    }

    /// Spawn the periodic heartbeat task. The task ends when the broadcaster
    /// is dropped.
    pub fn start_heartbeat(&self, interval: Duration) -> tokio::task::JoinHandle<()> {
        let weak = self.this.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick fires immediately; subscribers already got a
            // connection message, so skip it.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(broadcaster) = weak.upgrade() else {
                    break;
                };
                broadcaster.send_to_all(PushMessage::heartbeat());
            }
        })
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    fn unsubscribe(&self, id: u64) {
        self.subscribers.remove(&id);
    }
}

/// A live subscription. Dropping it deregisters the subscriber promptly.
pub struct Subscription {
    pub id: u64,
    rx: mpsc::Receiver<PushMessage>,
    broadcaster: Weak<Broadcaster>,
}

impl Subscription {
    /// Receive the next message; `None` when the broadcaster is gone.
    pub async fn recv(&mut self) -> Option<PushMessage> {
        self.rx.recv().await
    }

    /// Non-blocking receive for draining in tests and tight loops.
    pub fn try_recv(&mut self) -> Option<PushMessage> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(broadcaster) = self.broadcaster.upgrade() {
            broadcaster.unsubscribe(self.id);
        }
    }
}

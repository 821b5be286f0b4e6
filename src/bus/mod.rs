//! Event Bus (C4): a typed in-process broker.
//!
//! Topics are `raw.<kind>`, `processed.<kind>`, `event.<name>`, `monitoring`
//! (§4.4). Publish never blocks the publisher; the bus owns per-subscriber
//! delivery, dropping the oldest queued message on overflow and closing a
//! subscription after three consecutive seconds of sustained drops.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::domain::sample::{ProcessedFrame, RawSample, SensorKind};

/// Outbound queue depth per subscriber. Roughly 1 s of the densest topic
/// (EEG at 250 Hz arrives in ~4 batched notifications/s, well under this).
const SUBSCRIBER_QUEUE_DEPTH: usize = 256;

/// A topic a subscriber can filter on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// `raw.<kind>`.
    Raw(SensorKind),
    /// `processed.<kind>`.
    Processed(SensorKind),
    /// `event.<name>`.
    Event,
    /// `monitoring`.
    Monitoring,
}

/// One message flowing through the bus, tagged by the topic it was
/// published on.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum BusMessage {
    /// A batch of raw samples for one sensor kind.
    #[serde(rename = "raw_data")]
    RawData {
        sensor_type: SensorKind,
        timestamp: u64,
        data: Vec<RawSample>,
    },
    /// A processed frame for one sensor kind.
    #[serde(rename = "processed_data")]
    ProcessedData {
        sensor_type: SensorKind,
        timestamp: u64,
        data: ProcessedFrame,
    },
    /// A named domain event (`device.connected`, `error.frame_malformed`, ...).
    #[serde(rename = "event")]
    Event {
        event_type: String,
        timestamp: u64,
        data: Value,
    },
    /// A monitoring snapshot (§4.8).
    #[serde(rename = "monitoring_metrics")]
    Monitoring { timestamp: u64, data: Value },
}

impl BusMessage {
    fn topic(&self) -> Topic {
        match self {
            Self::RawData { sensor_type, .. } => Topic::Raw(*sensor_type),
            Self::ProcessedData { sensor_type, .. } => Topic::Processed(*sensor_type),
            Self::Event { .. } => Topic::Event,
            Self::Monitoring { .. } => Topic::Monitoring,
        }
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Helpers for building well-formed messages without repeating `now_ms()`
/// at every call site.
impl BusMessage {
    pub fn raw(sensor_type: SensorKind, data: Vec<RawSample>) -> Self {
        Self::RawData {
            sensor_type,
            timestamp: now_ms(),
            data,
        }
    }

    pub fn processed(data: ProcessedFrame) -> Self {
        Self::ProcessedData {
            sensor_type: data.kind(),
            timestamp: now_ms(),
            data,
        }
    }

    pub fn event(event_type: impl Into<String>, data: Value) -> Self {
        Self::Event {
            event_type: event_type.into(),
            timestamp: now_ms(),
            data,
        }
    }

    pub fn monitoring(data: Value) -> Self {
        Self::Monitoring {
            timestamp: now_ms(),
            data,
        }
    }
}

fn default_subscriptions() -> HashSet<Topic> {
    let mut topics = HashSet::new();
    for kind in [SensorKind::Eeg, SensorKind::Ppg, SensorKind::Acc, SensorKind::Bat] {
        topics.insert(Topic::Raw(kind));
    }
    for kind in [SensorKind::Eeg, SensorKind::Ppg, SensorKind::Acc] {
        topics.insert(Topic::Processed(kind));
    }
    topics.insert(Topic::Event);
    topics.insert(Topic::Monitoring);
    topics
}

struct DropTracker {
    current_second: u64,
    dropped_this_second: bool,
    consecutive_seconds_with_drops: u32,
}

impl DropTracker {
    fn new() -> Self {
        Self {
            current_second: now_ms() / 1000,
            dropped_this_second: false,
            consecutive_seconds_with_drops: 0,
        }
    }

    /// Record a drop; returns true once 3 consecutive seconds have each had
    /// at least one drop.
    fn record_drop(&mut self) -> bool {
        let second = now_ms() / 1000;
        if second != self.current_second {
            if second > self.current_second + 1 || !self.dropped_this_second {
                self.consecutive_seconds_with_drops = 0;
            }
            self.current_second = second;
            self.dropped_this_second = false;
        }
        if !self.dropped_this_second {
            self.dropped_this_second = true;
            self.consecutive_seconds_with_drops += 1;
        }
        self.consecutive_seconds_with_drops >= 3
    }
}

struct Subscriber {
    tx: mpsc::Sender<BusMessage>,
    topics: Mutex<HashSet<Topic>>,
    drops: Mutex<DropTracker>,
}

/// The in-process event bus. Cheaply cloneable; every clone shares the same
/// subscriber table.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Inner>,
}

struct Inner {
    subscribers: Mutex<Vec<(String, Arc<Subscriber>)>>,
    lag_drops: AtomicU64,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                subscribers: Mutex::new(Vec::new()),
                lag_drops: AtomicU64::new(0),
            }),
        }
    }

    /// Register a new subscriber with the default subscription set (§4.5:
    /// all `raw.*`, all `processed.*`, `event.*`, `monitoring`).
    pub fn register(&self, client_id: impl Into<String>) -> mpsc::Receiver<BusMessage> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE_DEPTH);
        let subscriber = Arc::new(Subscriber {
            tx,
            topics: Mutex::new(default_subscriptions()),
            drops: Mutex::new(DropTracker::new()),
        });
        self.inner.subscribers.lock().push((client_id.into(), subscriber));
        rx
    }

    pub fn unregister(&self, client_id: &str) {
        self.inner.subscribers.lock().retain(|(id, _)| id != client_id);
    }

    pub fn subscribe(&self, client_id: &str, topics: &[Topic]) {
        let subscribers = self.inner.subscribers.lock();
        if let Some((_, sub)) = subscribers.iter().find(|(id, _)| id == client_id) {
            sub.topics.lock().extend(topics.iter().copied());
        }
    }

    pub fn unsubscribe(&self, client_id: &str, topics: &[Topic]) {
        let subscribers = self.inner.subscribers.lock();
        if let Some((_, sub)) = subscribers.iter().find(|(id, _)| id == client_id) {
            let mut set = sub.topics.lock();
            for topic in topics {
                set.remove(topic);
            }
        }
    }

    /// Total number of dropped messages across every subscriber, surfaced by
    /// Monitoring (C8) as `client.lag_drops`.
    pub fn lag_drops(&self) -> u64 {
        self.inner.lag_drops.load(Ordering::Relaxed)
    }

    /// Publish to every subscriber whose subscription set includes this
    /// message's topic. Never blocks: a full queue drops its oldest entry.
    pub fn publish(&self, message: BusMessage) {
        let topic = message.topic();
        let mut to_close = Vec::new();

        {
            let subscribers = self.inner.subscribers.lock();
            for (id, sub) in subscribers.iter() {
                if !sub.topics.lock().contains(&topic) {
                    continue;
                }
                if let Err(e) = sub.tx.try_send(message.clone()) {
                    match e {
                        mpsc::error::TrySendError::Full(msg) => {
                            // Drop-oldest: make room, then retry once.
                            let _ = sub.tx.try_recv();
                            let _ = sub.tx.try_send(msg);
                            self.inner.lag_drops.fetch_add(1, Ordering::Relaxed);
                            if sub.drops.lock().record_drop() {
                                to_close.push(id.clone());
                            }
                        }
                        mpsc::error::TrySendError::Closed(_) => {
                            to_close.push(id.clone());
                        }
                    }
                }
            }
        }

        for id in to_close {
            self.unregister(&id);
            tracing::warn!(client_id = %id, "closing slow subscriber");
            // Avoid recursing into publish() for the closure notice itself
            // if every remaining subscriber is also being torn down.
            if !matches!(topic, Topic::Event) {
                self.publish(BusMessage::event(
                    "error.slow_client",
                    serde_json::json!({ "client_id": id }),
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::sample::{BatterySample};

    fn bat_sample(level: u8) -> RawSample {
        RawSample::Bat(BatterySample {
            t_host: 0,
            level_percent: level,
            voltage: None,
            charging: None,
        })
    }

    #[tokio::test]
    async fn subscriber_receives_matching_topic() {
        let bus = EventBus::new();
        let mut rx = bus.register("client-1");
        bus.publish(BusMessage::raw(SensorKind::Bat, vec![bat_sample(90)]));

        let msg = rx.recv().await.unwrap();
        assert!(matches!(msg, BusMessage::RawData { .. }));
    }

    #[tokio::test]
    async fn unsubscribed_topic_is_not_delivered() {
        let bus = EventBus::new();
        let mut rx = bus.register("client-1");
        bus.unsubscribe("client-1", &[Topic::Raw(SensorKind::Bat)]);
        bus.publish(BusMessage::raw(SensorKind::Bat, vec![bat_sample(90)]));

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn overflow_drops_oldest_and_counts_lag() {
        let bus = EventBus::new();
        let _rx = bus.register("client-1"); // never drained

        for i in 0..(SUBSCRIBER_QUEUE_DEPTH as u8 + 5) {
            bus.publish(BusMessage::raw(SensorKind::Bat, vec![bat_sample(i)]));
        }

        assert!(bus.lag_drops() > 0);
    }

    #[test]
    fn drop_tracker_requires_three_consecutive_seconds() {
        let mut tracker = DropTracker::new();
        assert!(!tracker.record_drop());
        assert!(!tracker.record_drop()); // same second, no new escalation
    }

    #[tokio::test]
    async fn unregistered_client_is_not_found_for_subscribe() {
        let bus = EventBus::new();
        // Subscribing to an unknown client id is a no-op, not a panic.
        bus.subscribe("ghost", &[Topic::Monitoring]);
    }
}

//! The transport contract: how execution events reach subscribers.
//!
//! The engine never speaks HTTP/WebSocket itself; it publishes [`Event`]s
//! through [`EventSink`], and [`BroadcastEventSink`] is the default
//! in-process implementation, good enough to drive the engine's own tests
//! and a same-process transport layer.

use crate::model::ExecutionId;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tokio::sync::broadcast;

/// Maximum number of events retained per execution for late-subscriber
/// replay.
const HISTORY_CAPACITY: usize = 512;

/// An event broadcast on a per-execution subscription channel.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type")]
pub enum Event {
    /// The execution's agent subprocess has started.
    RunStarted,
    /// A verbatim agent session-update frame, forwarded as-is.
    SessionUpdate {
        /// The raw, backend-specific update payload, serialized to JSON text.
        payload: String,
    },
    /// A persistent session has entered `waiting` between turns.
    SessionWaiting,
    /// A persistent session has been paused.
    SessionPaused,
    /// A persistent session has ended.
    SessionEnded,
    /// The execution reached a terminal status.
    RunFinished {
        /// The terminal status name.
        status: String,
    },
    /// Sync engine progress (preview computed, strategy applied, etc.).
    SyncProgress {
        /// Human-readable progress description.
        detail: String,
    },
    /// Merge-queue progress (entry dequeued, landed, failed).
    QueueProgress {
        /// Human-readable progress description.
        detail: String,
    },
    /// Cascade progress (one dependent stream processed).
    CascadeProgress {
        /// Human-readable progress description.
        detail: String,
    },
}

/// Where the engine publishes per-execution events.
///
/// Implementations must tolerate publishing to an execution with no current
/// subscribers (the event is simply retained in history for the next one).
pub trait EventSink: Send + Sync {
    /// Publish `event` on `execution_id`'s channel.
    fn publish(&self, execution_id: ExecutionId, event: Event);
    /// Subscribe to `execution_id`'s channel, returning any retained
    /// history plus a live receiver, or `None` if the stream has already
    /// ended and there is nothing more to receive.
    fn subscribe(&self, execution_id: ExecutionId) -> (Vec<Event>, Option<broadcast::Receiver<Event>>);
    /// Mark `execution_id`'s channel as ended; future `subscribe` calls
    /// return history only, with no live receiver.
    fn end(&self, execution_id: ExecutionId);
}

struct Channel {
    tx: broadcast::Sender<Event>,
    history: VecDeque<Event>,
    ended: bool,
}

impl Channel {
    fn new() -> Self {
        let (tx, _rx) = broadcast::channel(HISTORY_CAPACITY);
        Self { tx, history: VecDeque::with_capacity(HISTORY_CAPACITY), ended: false }
    }

    fn push_history(&mut self, event: Event) {
        if self.history.len() == HISTORY_CAPACITY {
            self.history.pop_front();
        }
        self.history.push_back(event);
    }
}

/// Per-execution broadcast channels with bounded history replay, the same
/// shape as a single-process task-stream manager: each execution gets its
/// own `broadcast::Sender` plus a capped ring buffer so a subscriber that
/// arrives mid-run still sees everything published so far.
#[derive(Default)]
pub struct BroadcastEventSink {
    channels: Mutex<HashMap<ExecutionId, Channel>>,
}

impl BroadcastEventSink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventSink for BroadcastEventSink {
    fn publish(&self, execution_id: ExecutionId, event: Event) {
        let mut channels = self.channels.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let channel = channels.entry(execution_id).or_insert_with(Channel::new);
        channel.push_history(event.clone());
        // A publish with no subscribers is not an error: history still
        // retains it for the next one.
        let _ = channel.tx.send(event);
    }

    fn subscribe(&self, execution_id: ExecutionId) -> (Vec<Event>, Option<broadcast::Receiver<Event>>) {
        let mut channels = self.channels.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let channel = channels.entry(execution_id).or_insert_with(Channel::new);
        let history: Vec<Event> = channel.history.iter().cloned().collect();
        if channel.ended {
            (history, None)
        } else {
            (history, Some(channel.tx.subscribe()))
        }
    }

    fn end(&self, execution_id: ExecutionId) {
        let mut channels = self.channels.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(channel) = channels.get_mut(&execution_id) {
            channel.ended = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_before_any_publish_returns_empty_history_and_live_receiver() {
        let sink = BroadcastEventSink::new();
        let (history, receiver) = sink.subscribe(ExecutionId::generate());
        assert!(history.is_empty());
        assert!(receiver.is_some());
    }

    #[test]
    fn late_subscriber_sees_prior_history() {
        let sink = BroadcastEventSink::new();
        let id = ExecutionId::generate();
        sink.publish(id, Event::RunStarted);
        sink.publish(id, Event::RunFinished { status: "completed".into() });
        let (history, _) = sink.subscribe(id);
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn ended_channel_yields_no_live_receiver() {
        let sink = BroadcastEventSink::new();
        let id = ExecutionId::generate();
        sink.publish(id, Event::RunStarted);
        sink.end(id);
        let (history, receiver) = sink.subscribe(id);
        assert_eq!(history.len(), 1);
        assert!(receiver.is_none());
    }

    #[test]
    fn history_is_capped() {
        let sink = BroadcastEventSink::new();
        let id = ExecutionId::generate();
        for _ in 0..(HISTORY_CAPACITY + 10) {
            sink.publish(id, Event::RunStarted);
        }
        let (history, _) = sink.subscribe(id);
        assert_eq!(history.len(), HISTORY_CAPACITY);
    }
}

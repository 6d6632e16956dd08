//! In-process command queue.
//!
//! Implements [`QueuePort`] with the delivery semantics of a hosted
//! message queue:
//!
//! - a received message is hidden for the visibility timeout and
//!   redelivered if it is not acknowledged in time;
//! - every receive bumps the message's receive count and issues a fresh
//!   receipt, so an ack with a stale receipt is refused;
//! - a message that reaches `max_receive_count` receives without an ack
//!   is moved to the dead-letter list instead of being redelivered;
//! - a consumer may dead-letter a message it holds, ending its delivery.
//!
//! The queue is `Sync`; producers on other threads (the host runner's
//! stdin reader, the scheduler delegate) push into it while the
//! dispatcher drains it.
//!
//! ```text
//!   send ──▶ ready ──receive──▶ in-flight ──ack──▶ (gone)
//!              ▲                   │
//!              └──── expired ──────┤
//!                                  └── receive_count ≥ max ──▶ dead letters
//! ```

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::app::ports::{Delivery, QueueError, QueuePort};
use crate::config::QueueConfig;

#[derive(Debug, Clone)]
struct Message {
    id: String,
    body: String,
    receive_count: u32,
}

#[derive(Debug)]
struct InFlight {
    message: Message,
    receipt: u64,
    visible_at: Instant,
}

#[derive(Debug, Default)]
struct QueueState {
    ready: VecDeque<Message>,
    in_flight: Vec<InFlight>,
    dead: Vec<Message>,
    next_id: u64,
    next_receipt: u64,
    closed: bool,
}

#[derive(Debug)]
pub struct MemoryQueue {
    state: Mutex<QueueState>,
    visibility_timeout: Duration,
    max_receive_count: u32,
}

impl MemoryQueue {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            visibility_timeout: Duration::from_millis(u64::from(config.visibility_timeout_ms)),
            max_receive_count: config.max_receive_count.max(1),
        }
    }

    /// Enqueue a message body.  Returns its message id.
    pub fn send(&self, body: impl Into<String>) -> Result<String, QueueError> {
        let mut state = self.lock()?;
        if state.closed {
            return Err(QueueError::Closed);
        }
        state.next_id += 1;
        let id = format!("msg-{}", state.next_id);
        state.ready.push_back(Message {
            id: id.clone(),
            body: body.into(),
            receive_count: 0,
        });
        Ok(id)
    }

    /// Refuse further sends.  Receivers see [`QueueError::Closed`] once
    /// every accepted message has been acknowledged or dead-lettered.
    pub fn close(&self) {
        if let Ok(mut state) = self.lock() {
            state.closed = true;
        }
    }

    /// Messages waiting to be received.
    pub fn ready_len(&self) -> usize {
        self.lock().map_or(0, |s| s.ready.len())
    }

    /// Messages received but not yet acknowledged.
    pub fn in_flight_len(&self) -> usize {
        self.lock().map_or(0, |s| s.in_flight.len())
    }

    /// Bodies of dead-lettered messages, oldest first.
    pub fn dead_letters(&self) -> Vec<String> {
        self.lock()
            .map(|s| s.dead.iter().map(|m| m.body.clone()).collect())
            .unwrap_or_default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, QueueState>, QueueError> {
        self.state
            .lock()
            .map_err(|_| QueueError::Unavailable("queue lock poisoned".into()))
    }

    /// Return expired in-flight messages to the front of the ready list,
    /// or dead-letter them once their receive budget is spent.
    fn reclaim_expired(&self, state: &mut QueueState, now: Instant) {
        let mut index = state.in_flight.len();
        while index > 0 {
            index -= 1;
            if state.in_flight[index].visible_at > now {
                continue;
            }
            let expired = state.in_flight.remove(index).message;
            if expired.receive_count >= self.max_receive_count {
                warn!(
                    "message {} dead-lettered after {} receives",
                    expired.id, expired.receive_count
                );
                state.dead.push(expired);
            } else {
                debug!("message {} visible again", expired.id);
                state.ready.push_front(expired);
            }
        }
    }
}

impl QueuePort for MemoryQueue {
    async fn receive(&self) -> Result<Option<Delivery>, QueueError> {
        let now = Instant::now();
        let mut state = self.lock()?;
        self.reclaim_expired(&mut state, now);

        let Some(mut message) = state.ready.pop_front() else {
            if state.closed && state.in_flight.is_empty() {
                return Err(QueueError::Closed);
            }
            return Ok(None);
        };

        message.receive_count += 1;
        state.next_receipt += 1;
        let receipt = state.next_receipt;
        let delivery = Delivery {
            receipt,
            message_id: message.id.clone(),
            body: message.body.clone(),
            receive_count: message.receive_count,
        };
        state.in_flight.push(InFlight {
            message,
            receipt,
            visible_at: now + self.visibility_timeout,
        });
        Ok(Some(delivery))
    }

    async fn ack(&self, receipt: u64) -> Result<(), QueueError> {
        let mut state = self.lock()?;
        take_in_flight(&mut state, receipt).map(|_| ())
    }

    async fn dead_letter(&self, receipt: u64) -> Result<(), QueueError> {
        let mut state = self.lock()?;
        let message = take_in_flight(&mut state, receipt)?;
        warn!(
            "message {} dead-lettered by consumer after {} receive(s)",
            message.id, message.receive_count
        );
        state.dead.push(message);
        Ok(())
    }
}

fn take_in_flight(state: &mut QueueState, receipt: u64) -> Result<Message, QueueError> {
    match state.in_flight.iter().position(|m| m.receipt == receipt) {
        Some(index) => Ok(state.in_flight.remove(index).message),
        None => Err(QueueError::Unavailable(format!("stale receipt {}", receipt))),
    }
}

//! Port traits: the hexagonal boundary between the command worker and the outside world.
//!
//! ```text
//!   QueuePort ──▶ Dispatcher ──▶ CommandHandler (CommandWorker)
//!                                      │
//!            StorePort ◀───────────────┤
//!            ActuatorPort ◀────────────┤
//!            NotifyPort ◀──────────────┤  (best-effort)
//!            RegistrarPort ◀───────────┘  (best-effort)
//! ```
//!
//! Driven adapters (store, PWM lines, clock, notification fan-out, queue)
//! implement these traits.  The worker consumes them via generics, so
//! the domain core never touches a transport directly and every
//! collaborator can be replaced by an in-memory fake.
//!
//! Async methods take `&self`; adapters use interior mutability.  The
//! runtime is a single-threaded executor, so futures need not be `Send`.

#![allow(async_fn_in_trait)]

use core::fmt;
use core::time::Duration;
use std::rc::Rc;
use std::sync::Arc;

use embedded_hal::pwm::SetDutyCycle;

use crate::error::{CommandError, HardwareFault};
use crate::interval::Interval;
use crate::state::{DeviceId, FeederPatch, FeederState};

use super::commands::Command;
use super::events::FeederNotification;
use super::service::Ack;

// ───────────────────────────────────────────────────────────────
// Feeder state store (driven adapter: domain ↔ record store)
// ───────────────────────────────────────────────────────────────

/// Keyed record store with sparse field-level writes.
///
/// `patch` applies only the fields present in the patch and returns the
/// full post-write record.  Writes of disjoint field sets must not clobber
/// each other; last-writer-wins per field is acceptable.
pub trait StorePort {
    async fn get(&self, id: &DeviceId) -> Result<FeederState, StoreError>;

    async fn patch(&self, id: &DeviceId, patch: &FeederPatch) -> Result<FeederState, StoreError>;

    /// Every record, in no particular order.
    async fn list(&self) -> Result<Vec<FeederState>, StoreError>;
}

// ───────────────────────────────────────────────────────────────
// Actuator port (driven adapter: domain → PWM hardware)
// ───────────────────────────────────────────────────────────────

/// Hands out exclusive PWM lines by pin number.
///
/// The returned line is released when dropped.  Acquiring a pin that is
/// already held elsewhere is a [`HardwareFault`].
pub trait ActuatorPort {
    type Line: SetDutyCycle;

    fn acquire(&self, pin: u8) -> Result<Self::Line, HardwareFault>;
}

// ───────────────────────────────────────────────────────────────
// Clock port
// ───────────────────────────────────────────────────────────────

pub trait ClockPort {
    /// Wall-clock time in epoch milliseconds.
    fn now_ms(&self) -> u64;

    async fn sleep(&self, duration: Duration);
}

// ───────────────────────────────────────────────────────────────
// Notification sink (driven adapter: domain → live subscribers)
// ───────────────────────────────────────────────────────────────

/// Best-effort push of a new feeder state.  Callers log and swallow errors.
pub trait NotifyPort {
    async fn publish(&self, notification: &FeederNotification) -> Result<(), NotifyError>;
}

/// An unconfigured sink is a no-op.
impl<N: NotifyPort> NotifyPort for Option<N> {
    async fn publish(&self, notification: &FeederNotification) -> Result<(), NotifyError> {
        match self {
            Some(sink) => sink.publish(notification).await,
            None => Ok(()),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Scheduler registrar (driven adapter: domain → trigger scheduler)
// ───────────────────────────────────────────────────────────────

/// Told whenever a device's feeding interval changes.
pub trait RegistrarPort {
    async fn register(&self, id: &DeviceId, interval: &Interval) -> Result<(), RegistrarError>;
}

impl<R: RegistrarPort> RegistrarPort for Rc<R> {
    async fn register(&self, id: &DeviceId, interval: &Interval) -> Result<(), RegistrarError> {
        (**self).register(id, interval).await
    }
}

// ───────────────────────────────────────────────────────────────
// Command queue (driving adapter: producers → dispatcher)
// ───────────────────────────────────────────────────────────────

/// A received, not yet acknowledged queue message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Handle for [`QueuePort::ack`]; changes on every redelivery.
    pub receipt: u64,
    /// Stable across redeliveries.
    pub message_id: String,
    pub body: String,
    /// 1 on first delivery.
    pub receive_count: u32,
}

/// At-least-once message channel.
///
/// A received message stays invisible until acknowledged or until the
/// queue's visibility window lapses, after which it is redelivered.
pub trait QueuePort {
    /// Next visible message, or `None` if nothing is ready right now.
    async fn receive(&self) -> Result<Option<Delivery>, QueueError>;

    async fn ack(&self, receipt: u64) -> Result<(), QueueError>;

    /// Give up on a received message: remove it from delivery and park
    /// it for inspection.
    async fn dead_letter(&self, receipt: u64) -> Result<(), QueueError>;
}

impl<Q: QueuePort> QueuePort for Arc<Q> {
    async fn receive(&self) -> Result<Option<Delivery>, QueueError> {
        (**self).receive().await
    }

    async fn ack(&self, receipt: u64) -> Result<(), QueueError> {
        (**self).ack(receipt).await
    }

    async fn dead_letter(&self, receipt: u64) -> Result<(), QueueError> {
        (**self).dead_letter(receipt).await
    }
}

// ───────────────────────────────────────────────────────────────
// Command handler (dispatcher → domain)
// ───────────────────────────────────────────────────────────────

/// Processes one decoded command.  The dispatcher only looks at the
/// [`Disposition`](crate::error::Disposition) of an error.
pub trait CommandHandler {
    async fn handle(&self, command: &Command) -> Result<Ack, CommandError>;
}

// ───────────────────────────────────────────────────────────────
// Scheduler delegate (decouples scheduler from the queue)
// ───────────────────────────────────────────────────────────────

/// Callback the [`FeedingScheduler`](crate::scheduler::FeedingScheduler)
/// invokes when a device's feeding time arrives.  The host runner
/// forwards it into the command queue as an `activate`.
pub trait SchedulerDelegate {
    fn on_feeding_due(&mut self, id: &DeviceId);
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`StorePort`] operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No record for the requested id.
    NotFound,
    /// Backend unreachable or write failed; worth retrying.
    Unavailable(String),
}

/// Errors from [`NotifyPort::publish`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyError {
    Unavailable(String),
}

/// Errors from [`RegistrarPort::register`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrarError {
    /// No room for another schedule.
    Full,
    Unavailable(String),
}

/// Errors from [`QueuePort`] operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// The queue will deliver nothing further.
    Closed,
    Unavailable(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "record not found"),
            Self::Unavailable(msg) => write!(f, "store unavailable: {}", msg),
        }
    }
}

impl fmt::Display for NotifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable(msg) => write!(f, "notification sink unavailable: {}", msg),
        }
    }
}

impl fmt::Display for RegistrarError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => write!(f, "schedule table full"),
            Self::Unavailable(msg) => write!(f, "registrar unavailable: {}", msg),
        }
    }
}

impl fmt::Display for QueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "queue closed"),
            Self::Unavailable(msg) => write!(f, "queue unavailable: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}
impl std::error::Error for NotifyError {}
impl std::error::Error for RegistrarError {}
impl std::error::Error for QueueError {}

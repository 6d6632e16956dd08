//! Unified error types for the feeder command pipeline.
//!
//! Every way a command can fail funnels into [`CommandError`].  The
//! dispatcher never inspects variants directly; it asks for a
//! [`Disposition`] and acknowledges or abandons the queue message
//! accordingly.

use core::fmt;

use crate::drivers::sequencer::Phase;
use crate::interval::IntervalError;
use crate::state::DeviceId;

// ---------------------------------------------------------------------------
// Disposition
// ---------------------------------------------------------------------------

/// What the dispatcher does with the queue message after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Acknowledge and drop; redelivery cannot succeed.
    Terminal,
    /// Leave unacknowledged so the queue redelivers it.
    Retry,
}

// ---------------------------------------------------------------------------
// Command errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// No record for this device in the state store.
    NotFound(DeviceId),
    /// The device has a record but no actuator entry in the registry.
    Unregistered(DeviceId),
    /// Malformed message, bad interval, or missing/illegal fields.
    Validation(ValidationError),
    /// `activate` on a disabled feeder.
    Disabled(DeviceId),
    /// `activate` with no food left.
    OutOfStock(DeviceId),
    /// Actuation aborted; the line was forced to rest.
    Hardware(HardwareFault),
    /// The state store could not be read or written.
    StoreUnavailable(String),
}

impl CommandError {
    pub fn disposition(&self) -> Disposition {
        match self {
            Self::StoreUnavailable(_) => Disposition::Retry,
            _ => Disposition::Terminal,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.disposition() == Disposition::Terminal
    }
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(id) => write!(f, "feeder {id} not found"),
            Self::Unregistered(id) => write!(f, "feeder {id} has no actuator configured"),
            Self::Validation(e) => write!(f, "validation: {e}"),
            Self::Disabled(id) => write!(f, "feeder {id} is disabled"),
            Self::OutOfStock(id) => write!(f, "feeder {id} is out of food"),
            Self::Hardware(e) => write!(f, "hardware: {e}"),
            Self::StoreUnavailable(msg) => write!(f, "store unavailable: {msg}"),
        }
    }
}

impl std::error::Error for CommandError {}

impl From<ValidationError> for CommandError {
    fn from(e: ValidationError) -> Self {
        Self::Validation(e)
    }
}

impl From<HardwareFault> for CommandError {
    fn from(e: HardwareFault) -> Self {
        Self::Hardware(e)
    }
}

// ---------------------------------------------------------------------------
// Validation errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The queue message body is not a valid command.
    Malformed(String),
    /// `update` without fields, or with every field absent.
    EmptyPatch,
    /// The patch names a different device than the command.
    IdMismatch,
    /// `estFoodPerFeeding` must be positive.
    ZeroFoodPerFeeding,
    Interval(IntervalError),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed(msg) => write!(f, "malformed command: {msg}"),
            Self::EmptyPatch => write!(f, "update requires at least one field"),
            Self::IdMismatch => write!(f, "id in fields does not match target device"),
            Self::ZeroFoodPerFeeding => write!(f, "estFoodPerFeeding must be positive"),
            Self::Interval(e) => write!(f, "interval: {e}"),
        }
    }
}

impl From<IntervalError> for ValidationError {
    fn from(e: IntervalError) -> Self {
        Self::Interval(e)
    }
}

// ---------------------------------------------------------------------------
// Hardware faults
// ---------------------------------------------------------------------------

/// An actuation that did not complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HardwareFault {
    pub pin: u8,
    /// Phase being driven when the fault hit; `None` if the line could
    /// not be acquired at all.
    pub phase: Option<Phase>,
    pub detail: String,
}

impl HardwareFault {
    pub fn acquire(pin: u8, detail: impl Into<String>) -> Self {
        Self {
            pin,
            phase: None,
            detail: detail.into(),
        }
    }

    pub fn during(pin: u8, phase: Phase, detail: impl Into<String>) -> Self {
        Self {
            pin,
            phase: Some(phase),
            detail: detail.into(),
        }
    }
}

impl fmt::Display for HardwareFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.phase {
            Some(phase) => write!(f, "pin {} failed during {:?}: {}", self.pin, phase, self.detail),
            None => write!(f, "pin {} could not be acquired: {}", self.pin, self.detail),
        }
    }
}

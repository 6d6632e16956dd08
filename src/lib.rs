//! Pet feeder command pipeline.
//!
//! Commands from the user app, voice assistant, or the local scheduler
//! arrive on an at-least-once queue.  The [`Dispatcher`](runtime::dispatcher::Dispatcher)
//! routes them onto per-device lanes; the [`CommandWorker`](app::service::CommandWorker)
//! validates each against the stored [`FeederState`](state::FeederState),
//! drives the servo through one feeding cycle when required, reconciles
//! the derived fields, writes them back, and pushes the new state to
//! live subscribers.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  MemoryQueue   FileStore/MemoryStore   SimulatedHardware       │
//! │  (QueuePort)   (StorePort)             (ActuatorPort)          │
//! │  SystemClock   LogNotifier             FeedingScheduler        │
//! │  (ClockPort)   (NotifyPort)            (RegistrarPort)         │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │       CommandWorker (rules · sequencer · ledger)       │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  Dispatcher (poll loop + per-device lanes on LocalExecutor)    │
//! └────────────────────────────────────────────────────────────────┘
//! ```

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod drivers;
pub mod error;
pub mod interval;
pub mod ledger;
pub mod registry;
pub mod runtime;
pub mod scheduler;
pub mod state;

pub use app::commands::{Action, Command, CommandId, UpdateFields};
pub use app::service::{Ack, CommandWorker};
pub use config::WorkerConfig;
pub use error::{CommandError, Disposition, HardwareFault, ValidationError};
pub use interval::Interval;
pub use state::{DeviceId, FeederPatch, FeederState, FeederStatus};

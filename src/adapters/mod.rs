//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter        | Implements     | Connects to                    |
//! |----------------|----------------|--------------------------------|
//! | `file_store`   | StorePort      | JSON state file                |
//! | `hardware`     | ActuatorPort   | Simulated PWM lines            |
//! | `log_sink`     | NotifyPort     | Log output                     |
//! | `memory_queue` | QueuePort      | In-process at-least-once queue |
//! | `memory_store` | StorePort      | In-memory map                  |
//! | `time`         | ClockPort      | Wall clock, reactor timers     |
//!
//! The in-process registrar is [`FeedingScheduler`](crate::scheduler::FeedingScheduler).

pub mod file_store;
pub mod hardware;
pub mod log_sink;
pub mod memory_queue;
pub mod memory_store;
pub mod time;

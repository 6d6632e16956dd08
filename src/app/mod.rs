//! Application core: feeder business rules behind port traits.
//!
//! This module holds the command worker state machine, the command and
//! notification payloads, and the **port traits** in [`ports`] through
//! which every store, PWM line, clock and side-effect sink is reached.
//! Nothing here opens a file or a socket, so the whole layer runs
//! against in-memory fakes.

pub mod commands;
pub mod events;
pub mod ports;
pub mod service;

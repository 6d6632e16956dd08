//! Single-threaded command pipeline runtime.
//!
//! The [`Dispatcher`](dispatcher::Dispatcher) polls the command queue and
//! fans commands out onto per-device [`lanes`], each drained by its own
//! task on an `edge-executor` `LocalExecutor`.

pub mod dispatcher;
pub mod lanes;

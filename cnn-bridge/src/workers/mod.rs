//! Worker modules for connection command processing
//!
//! This module contains the `WorkerLoop` that runs on each connection's
//! dedicated thread and executes commands against the engine.

mod worker_loop;

pub(crate) use worker_loop::WorkerLoop;

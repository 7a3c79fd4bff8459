//! Job execution engine.
//!
//! Contains the in-process FIFO queue and the single worker that drains it
//! against the engine, one job at a time.

pub mod queue;

//! Domain types shared by the generation façade.
//!
//! Holds the job model and its state machine, the job handle that
//! distinguishes real engine ids from synthetic ones, workflow template
//! classification and prompt injection, and the on-disk template
//! resolver.

pub mod error;
pub mod job;
pub mod resolver;
pub mod types;
pub mod workflow;

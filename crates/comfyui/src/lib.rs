//! ComfyUI REST client library.
//!
//! Provides the HTTP API wrapper (workflow submission, history retrieval,
//! artifact download), typed history responses, and a connectivity prober
//! with a short-lived status cache.

pub mod api;
pub mod history;
pub mod probe;

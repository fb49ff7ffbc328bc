//! Rota Session - proxy session rotation
//!
//! Cycles through a pool of proxies, holding one timed session per proxy
//! against a single media resource before moving on to the next.
//!
//! ## Features
//!
//! - Round-robin proxy pool with wrap-around
//! - Timed sessions with progress reporting and cancellation
//! - Pluggable connection attempts with retry on failure
//! - Run statistics with per-proxy usage
//! - Control API over HTTP with WebSocket and SSE event streams

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod rotation;

pub use config::Config;
pub use error::{Result, RotaError};
pub use rotation::{RotationController, RotationHandle};

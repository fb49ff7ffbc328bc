//! Control API
//!
//! REST endpoints for driving the rotation plus event streams over
//! WebSocket and SSE.

pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod websocket;

pub use server::{ApiServer, AppState};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ProxyId;

/// Events emitted by the rotation controller, in the order it processed them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RotationEvent {
    /// First start after a reset
    RunStarted { at: DateTime<Utc> },
    /// A new proxy list replaced the pool
    PoolLoaded { size: usize },
    /// A session began connecting through `proxy`
    SessionStarted {
        generation: u64,
        proxy: Option<ProxyId>,
        proxy_index: usize,
    },
    /// The connection attempt succeeded and the session timer started
    SessionActive {
        generation: u64,
        proxy: Option<ProxyId>,
        duration_secs: f64,
    },
    Progress { generation: u64, percent: f64 },
    SessionCompleted {
        generation: u64,
        proxy: Option<ProxyId>,
        proxy_index: usize,
    },
    SessionFailed {
        generation: u64,
        proxy: Option<ProxyId>,
        reason: String,
    },
    Paused,
    Resumed,
    RunReset,
}

impl RotationEvent {
    /// Session generation the event belongs to, if any
    pub fn generation(&self) -> Option<u64> {
        match self {
            RotationEvent::SessionStarted { generation, .. }
            | RotationEvent::SessionActive { generation, .. }
            | RotationEvent::Progress { generation, .. }
            | RotationEvent::SessionCompleted { generation, .. }
            | RotationEvent::SessionFailed { generation, .. } => Some(*generation),
            _ => None,
        }
    }
}

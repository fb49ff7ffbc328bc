use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ProxyId, ResourceRef};

/// Lifecycle state of the rotation controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RotationState {
    #[default]
    Idle,
    Connecting,
    Active,
    Failed,
    Paused,
}

impl RotationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RotationState::Idle => "idle",
            RotationState::Connecting => "connecting",
            RotationState::Active => "active",
            RotationState::Failed => "failed",
            RotationState::Paused => "paused",
        }
    }

    /// Whether the rotation loop is driving sessions
    pub fn is_running(&self) -> bool {
        matches!(
            self,
            RotationState::Connecting | RotationState::Active | RotationState::Failed
        )
    }
}

impl std::fmt::Display for RotationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// State of a single session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Connecting,
    Active,
    Failed,
    Completed,
}

/// One pass of binding the resource to a proxy and running it for the
/// configured duration
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    /// Generation tag; results carrying an older tag are stale
    pub generation: u64,
    pub proxy: Option<ProxyId>,
    pub proxy_index: usize,
    pub resource: ResourceRef,
    pub state: SessionState,
    pub started_at: DateTime<Utc>,
    /// 0 - 100
    pub progress: f64,
    /// Duration captured when the session turned active
    #[serde(skip)]
    pub duration: Option<Duration>,
}

impl Session {
    pub fn new(
        generation: u64,
        proxy: Option<ProxyId>,
        proxy_index: usize,
        resource: ResourceRef,
    ) -> Self {
        Self {
            generation,
            proxy,
            proxy_index,
            resource,
            state: SessionState::Connecting,
            started_at: Utc::now(),
            progress: 0.0,
            duration: None,
        }
    }
}

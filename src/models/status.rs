use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ProxyId, ResourceRef, RotationState};

/// Point-in-time view of the controller for the presentation layer
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct RotationStatus {
    pub state: RotationState,
    /// Cursor into the pool; `None` while the pool is empty
    pub active_proxy_index: Option<usize>,
    pub active_proxy: Option<ProxyId>,
    pub pool_size: usize,
    /// Progress of the current session (0 - 100)
    pub progress_percent: f64,
    pub sessions_completed: u64,
    pub elapsed_seconds: u64,
    pub last_error: Option<String>,
    pub session_duration_secs: u64,
    pub resource: Option<ResourceRef>,
    pub generation: u64,
}

/// Usage tally for one proxy
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProxyUsage {
    pub proxy: ProxyId,
    /// Sessions started on this proxy that reached completion
    pub completed: u64,
    /// Sessions on this proxy whose connection attempt failed
    pub failed: u64,
}

/// Read-only statistics derived from the event stream
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct StatsSnapshot {
    pub sessions_completed: u64,
    pub sessions_failed: u64,
    pub elapsed_seconds: u64,
    /// `HH:MM:SS`
    pub elapsed_display: String,
    pub run_started_at: Option<DateTime<Utc>>,
    /// Sorted by completed sessions, most used first
    pub proxy_usage: Vec<ProxyUsage>,
}

impl StatsSnapshot {
    /// The `n` most used proxies
    pub fn top_proxies(&self, n: usize) -> &[ProxyUsage] {
        &self.proxy_usage[..n.min(self.proxy_usage.len())]
    }
}

/// Format seconds as `HH:MM:SS`
pub fn format_hms(total_secs: u64) -> String {
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let secs = total_secs % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, secs)
}

/// Human readable duration: `1h 5m 0s`, `5m 30s` or `45s`
pub fn format_duration(total_secs: u64) -> String {
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let secs = total_secs % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, secs)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}

//! Session rotation
//!
//! This module drives the repeating cycle of binding the resource to the
//! active proxy, running the session for the configured duration, and
//! rotating to the next proxy.

mod attempt;
mod controller;
mod pool;
mod stats;
mod timer;

pub use attempt::{AttemptOutcome, ConnectionAttempt, FixedAttempt, SimulatedAttempt};
pub use controller::{RotationController, RotationHandle, EVENT_CHANNEL_CAPACITY};
pub use pool::ProxyPool;
pub use stats::StatsAggregator;
pub use timer::{progress_at, SessionTimer, TimerEvent};

use std::sync::Arc;

use crate::config::RotationConfig;

/// What happens to the proxy cursor after a failed connection attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Retry the same proxy until it connects
    #[default]
    RetrySame,
    /// Rotate to the next proxy before retrying
    SkipToNext,
}

impl FailurePolicy {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "retry_same" | "retrysame" | "retry-same" | "retry" => Some(Self::RetrySame),
            "skip" | "skip_to_next" | "skiptonext" | "skip-to-next" | "next" => {
                Some(Self::SkipToNext)
            }
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RetrySame => "retry_same",
            Self::SkipToNext => "skip_to_next",
        }
    }
}

/// Backends that can resolve a connection attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectorKind {
    /// Setup delay plus random failures
    #[default]
    Simulated,
    /// Setup delay, never fails
    DryRun,
}

impl ConnectorKind {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "simulated" | "sim" => Some(Self::Simulated),
            "dry_run" | "dryrun" | "dry-run" => Some(Self::DryRun),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Simulated => "simulated",
            Self::DryRun => "dry_run",
        }
    }
}

/// Create a connection attempt strategy from the rotation settings
pub fn create_connector(config: &RotationConfig) -> Arc<dyn ConnectionAttempt> {
    match config.connector {
        ConnectorKind::Simulated => Arc::new(SimulatedAttempt::new(
            config.connect_delay,
            config.failure_rate,
        )),
        ConnectorKind::DryRun => Arc::new(FixedAttempt::ready(config.connect_delay)),
    }
}

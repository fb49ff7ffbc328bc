//! Connection attempt strategies
//!
//! An attempt binds the resource to the active proxy before the session
//! timer starts. Implementations resolve to `Ready` or `Failed` after their
//! setup delay; the controller runs them on a separate task and drops the
//! result if the session was superseded in the meantime.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tracing::{debug, instrument};

use crate::models::{ProxyId, ResourceRef};

/// Result of binding a resource to a proxy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Proxy accepted; the session may turn active
    Ready,
    /// Proxy rejected, with a human readable reason
    Failed(String),
}

impl AttemptOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, AttemptOutcome::Ready)
    }
}

/// Trait for connection attempt strategies
#[async_trait]
pub trait ConnectionAttempt: Send + Sync {
    /// Bind `resource` to `proxy` (`None` means a direct connection)
    async fn attempt(&self, resource: &ResourceRef, proxy: Option<&ProxyId>) -> AttemptOutcome;

    /// Get the strategy name
    fn strategy_name(&self) -> &'static str;
}

/// Stand-in for a real dial: waits for the setup delay, then fails proxied
/// attempts with a fixed probability. Direct connections never fail.
#[derive(Debug, Clone)]
pub struct SimulatedAttempt {
    setup_delay: Duration,
    failure_rate: f64,
}

impl SimulatedAttempt {
    pub fn new(setup_delay: Duration, failure_rate: f64) -> Self {
        Self {
            setup_delay,
            failure_rate: failure_rate.clamp(0.0, 1.0),
        }
    }

    pub fn failure_rate(&self) -> f64 {
        self.failure_rate
    }
}

impl Default for SimulatedAttempt {
    fn default() -> Self {
        Self::new(Duration::from_secs(2), 0.2)
    }
}

#[async_trait]
impl ConnectionAttempt for SimulatedAttempt {
    #[instrument(skip(self, resource), fields(resource_id = %resource.id))]
    async fn attempt(&self, resource: &ResourceRef, proxy: Option<&ProxyId>) -> AttemptOutcome {
        tokio::time::sleep(self.setup_delay).await;

        let Some(proxy) = proxy else {
            debug!("Using direct connection");
            return AttemptOutcome::Ready;
        };

        let rejected = rand::thread_rng().gen_bool(self.failure_rate);
        if rejected {
            AttemptOutcome::Failed(format!("Failed to connect using proxy: {}", proxy))
        } else {
            debug!("Using proxy: {}", proxy);
            AttemptOutcome::Ready
        }
    }

    fn strategy_name(&self) -> &'static str {
        "simulated"
    }
}

/// Deterministic strategy: every attempt resolves to the same outcome after
/// the setup delay
#[derive(Debug, Clone)]
pub struct FixedAttempt {
    setup_delay: Duration,
    outcome: AttemptOutcome,
}

impl FixedAttempt {
    pub fn ready(setup_delay: Duration) -> Self {
        Self {
            setup_delay,
            outcome: AttemptOutcome::Ready,
        }
    }

    pub fn failing(setup_delay: Duration, reason: impl Into<String>) -> Self {
        Self {
            setup_delay,
            outcome: AttemptOutcome::Failed(reason.into()),
        }
    }
}

#[async_trait]
impl ConnectionAttempt for FixedAttempt {
    async fn attempt(&self, _resource: &ResourceRef, _proxy: Option<&ProxyId>) -> AttemptOutcome {
        tokio::time::sleep(self.setup_delay).await;
        self.outcome.clone()
    }

    fn strategy_name(&self) -> &'static str {
        "fixed"
    }
}

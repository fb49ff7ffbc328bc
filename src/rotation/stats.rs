//! Statistics projected from the controller's event stream

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use crate::models::{format_hms, ProxyId, ProxyUsage, RotationEvent, StatsSnapshot};

/// Folds [`RotationEvent`]s into run statistics.
///
/// Purely read-side: it never issues commands. Usage counts are causal, a
/// proxy's `completed` tally only grows when a session started on it
/// completes.
#[derive(Debug, Default)]
pub struct StatsAggregator {
    run_started_at: Option<Instant>,
    run_started_wall: Option<DateTime<Utc>>,
    paused_at: Option<Instant>,
    sessions_completed: u64,
    sessions_failed: u64,
    usage: Vec<ProxyUsage>,
    usage_index: HashMap<ProxyId, usize>,
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one event observed at `now`
    pub fn apply(&mut self, event: &RotationEvent, now: Instant) {
        match event {
            RotationEvent::RunStarted { at } => {
                self.run_started_at = Some(now);
                self.run_started_wall = Some(*at);
                self.paused_at = None;
            }
            RotationEvent::Paused => {
                if self.run_started_at.is_some() && self.paused_at.is_none() {
                    self.paused_at = Some(now);
                }
            }
            RotationEvent::Resumed => {
                self.paused_at = None;
            }
            RotationEvent::SessionStarted {
                proxy: Some(proxy), ..
            } => {
                self.tally(proxy);
            }
            RotationEvent::SessionCompleted { proxy, .. } => {
                self.sessions_completed += 1;
                if let Some(proxy) = proxy {
                    self.tally(proxy).completed += 1;
                }
            }
            RotationEvent::SessionFailed { proxy, .. } => {
                self.sessions_failed += 1;
                if let Some(proxy) = proxy {
                    self.tally(proxy).failed += 1;
                }
            }
            RotationEvent::RunReset => {
                *self = Self::default();
            }
            _ => {}
        }
    }

    fn tally(&mut self, proxy: &ProxyId) -> &mut ProxyUsage {
        let idx = match self.usage_index.get(proxy) {
            Some(&idx) => idx,
            None => {
                self.usage.push(ProxyUsage {
                    proxy: proxy.clone(),
                    completed: 0,
                    failed: 0,
                });
                let idx = self.usage.len() - 1;
                self.usage_index.insert(proxy.clone(), idx);
                idx
            }
        };
        &mut self.usage[idx]
    }

    pub fn sessions_completed(&self) -> u64 {
        self.sessions_completed
    }

    pub fn run_started_at(&self) -> Option<DateTime<Utc>> {
        self.run_started_wall
    }

    /// Time since the run started; frozen while paused, zero before the
    /// first start
    pub fn elapsed(&self, now: Instant) -> Duration {
        match self.run_started_at {
            Some(started) => self
                .paused_at
                .unwrap_or(now)
                .saturating_duration_since(started),
            None => Duration::ZERO,
        }
    }

    /// Usage count for a single proxy
    pub fn usage_of(&self, proxy: &ProxyId) -> Option<&ProxyUsage> {
        self.usage_index.get(proxy).map(|&idx| &self.usage[idx])
    }

    pub fn snapshot(&self, now: Instant) -> StatsSnapshot {
        let elapsed_seconds = self.elapsed(now).as_secs();

        let mut proxy_usage = self.usage.clone();
        // Stable sort keeps first-seen order among equal counts
        proxy_usage.sort_by(|a, b| b.completed.cmp(&a.completed));

        StatsSnapshot {
            sessions_completed: self.sessions_completed,
            sessions_failed: self.sessions_failed,
            elapsed_seconds,
            elapsed_display: format_hms(elapsed_seconds),
            run_started_at: self.run_started_wall,
            proxy_usage,
        }
    }
}

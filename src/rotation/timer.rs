//! Cancellable session countdown with progress reporting

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};
use tracing::debug;

/// Highest progress value reported before the deadline
const PRE_COMPLETION_CEILING: f64 = 99.99;

/// Signals produced by a running [`SessionTimer`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimerEvent {
    /// Fraction of the session elapsed, 0 - 100, non-decreasing
    Progress(f64),
    /// The full duration elapsed
    Completed,
}

/// Countdown for a single session.
///
/// Emits `Progress(0.0)` immediately, then one progress update per tick, and
/// finally `Progress(100.0)` followed by `Completed` once `duration` has
/// elapsed. Cancelling (or dropping) the timer stops emission with no
/// completion signal. The duration is captured at start.
#[derive(Debug)]
pub struct SessionTimer {
    handle: JoinHandle<()>,
    started_at: Instant,
    duration: Duration,
}

impl SessionTimer {
    /// Start a countdown. `on_event` returns `false` when the receiver is gone,
    /// which stops the timer.
    pub fn start<F>(duration: Duration, tick: Duration, mut on_event: F) -> Self
    where
        F: FnMut(TimerEvent) -> bool + Send + 'static,
    {
        let started_at = Instant::now();
        let deadline = started_at + duration;
        let tick = tick.max(Duration::from_millis(1));

        let handle = tokio::spawn(async move {
            if !on_event(TimerEvent::Progress(0.0)) {
                return;
            }

            let mut ticker = interval_at(started_at + tick, tick);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let expiry = sleep_until(deadline);
            tokio::pin!(expiry);

            loop {
                tokio::select! {
                    biased;
                    _ = &mut expiry => {
                        if on_event(TimerEvent::Progress(100.0)) {
                            on_event(TimerEvent::Completed);
                        }
                        break;
                    }
                    _ = ticker.tick() => {
                        let now = Instant::now();
                        if now >= deadline {
                            continue;
                        }
                        let percent = progress_at(started_at, duration, now);
                        if !on_event(TimerEvent::Progress(percent)) {
                            debug!("Session timer receiver gone, stopping");
                            break;
                        }
                    }
                }
            }
        });

        Self {
            handle,
            started_at,
            duration,
        }
    }

    /// Stop the countdown; no further events are emitted
    pub fn cancel(&self) {
        self.handle.abort();
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Progress as of now
    pub fn progress(&self) -> f64 {
        progress_at(self.started_at, self.duration, Instant::now())
    }

    /// True once the countdown completed or was cancelled
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for SessionTimer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Percentage of `duration` elapsed at `now`; reaches 100 only at the deadline
pub fn progress_at(started_at: Instant, duration: Duration, now: Instant) -> f64 {
    let elapsed = now.saturating_duration_since(started_at);
    if elapsed >= duration {
        return 100.0;
    }
    let ratio = elapsed.as_secs_f64() / duration.as_secs_f64();
    (ratio * 100.0).min(PRE_COMPLETION_CEILING)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn collecting_timer(
        duration: Duration,
        tick: Duration,
    ) -> (SessionTimer, mpsc::UnboundedReceiver<(Instant, TimerEvent)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let timer = SessionTimer::start(duration, tick, move |event| {
            tx.send((Instant::now(), event)).is_ok()
        });
        (timer, rx)
    }

    #[test]
    fn test_progress_at_bounds() {
        let start = Instant::now();
        let d = Duration::from_secs(10);
        assert_eq!(progress_at(start, d, start), 0.0);
        assert_eq!(progress_at(start, d, start + Duration::from_secs(5)), 50.0);
        assert_eq!(progress_at(start, d, start + d), 100.0);
        assert_eq!(progress_at(start, d, start + Duration::from_secs(60)), 100.0);
        assert!(progress_at(start, d, start + d - Duration::from_nanos(1)) < 100.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_monotonic_and_completes_on_time() {
        let duration = Duration::from_secs(5);
        let started = Instant::now();
        let (_timer, mut rx) = collecting_timer(duration, Duration::from_millis(100));

        let mut last = -1.0;
        let mut completed_at = None;
        while let Some((at, event)) = rx.recv().await {
            match event {
                TimerEvent::Progress(p) => {
                    assert!(p >= last, "progress went backwards: {} -> {}", last, p);
                    if p >= 100.0 {
                        assert!(at - started >= duration, "reached 100 early");
                    }
                    last = p;
                }
                TimerEvent::Completed => {
                    completed_at = Some(at);
                    break;
                }
            }
        }

        assert_eq!(last, 100.0);
        let completed_at = completed_at.expect("timer never completed");
        assert!(completed_at - started >= duration);
        assert!(completed_at - started < duration + Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_event_is_zero() {
        let (_timer, mut rx) = collecting_timer(Duration::from_secs(1), Duration::from_millis(250));
        let (_, first) = rx.recv().await.unwrap();
        assert_eq!(first, TimerEvent::Progress(0.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_suppresses_completion() {
        let (timer, mut rx) = collecting_timer(Duration::from_secs(2), Duration::from_millis(500));

        tokio::time::sleep(Duration::from_secs(1)).await;
        timer.cancel();
        tokio::time::sleep(Duration::from_secs(5)).await;

        let mut events = Vec::new();
        while let Ok((_, event)) = rx.try_recv() {
            events.push(event);
        }
        assert!(!events.contains(&TimerEvent::Completed));
        assert!(timer.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels() {
        let (timer, mut rx) = collecting_timer(Duration::from_secs(1), Duration::from_millis(100));
        drop(timer);
        tokio::time::sleep(Duration::from_secs(3)).await;

        while let Ok((_, event)) = rx.try_recv() {
            assert_ne!(event, TimerEvent::Completed);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_reading() {
        let timer = SessionTimer::start(Duration::from_secs(10), Duration::from_secs(1), |_| true);
        assert_eq!(timer.duration(), Duration::from_secs(10));
        tokio::time::sleep(Duration::from_millis(2500)).await;
        let p = timer.progress();
        assert!((p - 25.0).abs() < 0.001, "unexpected progress {}", p);
    }
}

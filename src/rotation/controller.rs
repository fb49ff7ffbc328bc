//! Rotation controller
//!
//! Single owner of the rotation state. Callers talk to it through a
//! [`RotationHandle`]; connection attempts, session timers and retry delays
//! run on their own tasks and report back on an internal channel, tagged with
//! the generation of the session that started them. Anything carrying an
//! older generation is discarded.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use super::attempt::{AttemptOutcome, ConnectionAttempt};
use super::pool::ProxyPool;
use super::stats::StatsAggregator;
use super::timer::{SessionTimer, TimerEvent};
use super::FailurePolicy;
use crate::config::RotationConfig;
use crate::error::{Result, RotaError};
use crate::models::{
    ResourceRef, RotationEvent, RotationState, RotationStatus, Session, SessionState,
    StatsSnapshot,
};

/// Capacity of the event broadcast channel
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

const COMMAND_CHANNEL_CAPACITY: usize = 64;

/// Longest session the controller accepts
const MAX_SESSION_DURATION: Duration = Duration::from_secs(24 * 60 * 60);

enum Command {
    Start(oneshot::Sender<Result<()>>),
    Pause(oneshot::Sender<Result<()>>),
    Reset(oneshot::Sender<Result<()>>),
    LoadPool(Vec<String>, oneshot::Sender<Result<usize>>),
    SetResource(ResourceRef, oneshot::Sender<Result<()>>),
    SetSessionDuration(Duration, oneshot::Sender<Result<()>>),
    Status(oneshot::Sender<RotationStatus>),
    Stats(oneshot::Sender<StatsSnapshot>),
    Shutdown(oneshot::Sender<()>),
}

/// Results delivered back from attempt/timer/retry tasks
#[derive(Debug)]
enum Signal {
    Attempt {
        generation: u64,
        outcome: AttemptOutcome,
    },
    Timer {
        generation: u64,
        event: TimerEvent,
    },
    RetryDue {
        generation: u64,
    },
}

impl Signal {
    fn generation(&self) -> u64 {
        match self {
            Signal::Attempt { generation, .. }
            | Signal::Timer { generation, .. }
            | Signal::RetryDue { generation } => *generation,
        }
    }
}

/// The one outstanding asynchronous step of the current session
#[derive(Debug, Default)]
enum InFlight {
    #[default]
    Nothing,
    Attempt(JoinHandle<()>),
    Timer(SessionTimer),
    Retry(JoinHandle<()>),
}

impl InFlight {
    fn cancel(&mut self) {
        match std::mem::take(self) {
            InFlight::Attempt(handle) | InFlight::Retry(handle) => handle.abort(),
            InFlight::Timer(timer) => timer.cancel(),
            InFlight::Nothing => {}
        }
    }
}

struct Mailbox {
    commands: mpsc::Receiver<Command>,
    signals: mpsc::UnboundedReceiver<Signal>,
}

/// State machine driving `Idle -> Connecting -> Active -> Connecting ...`
///
/// Pausing cancels the in-flight session immediately; resuming reconnects on
/// the same proxy from progress 0. Failed attempts are retried forever after
/// `failure_retry_delay`, on the same proxy or the next one depending on the
/// [`FailurePolicy`]. Only `reset` stops the cycle for good.
pub struct RotationController {
    config: RotationConfig,
    connector: Arc<dyn ConnectionAttempt>,
    pool: ProxyPool,
    resource: Option<ResourceRef>,
    state: RotationState,
    session: Option<Session>,
    in_flight: InFlight,
    generation: u64,
    last_error: Option<String>,
    stats: StatsAggregator,
    signal_tx: mpsc::UnboundedSender<Signal>,
    events: broadcast::Sender<RotationEvent>,
    status_tx: watch::Sender<RotationStatus>,
    mailbox: Option<Mailbox>,
}

impl RotationController {
    /// Create a controller and the handle used to drive it.
    ///
    /// The controller does nothing until [`run`](Self::run) is spawned.
    pub fn new(
        config: RotationConfig,
        connector: Arc<dyn ConnectionAttempt>,
    ) -> Result<(Self, RotationHandle)> {
        config.validate()?;

        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (status_tx, status_rx) = watch::channel(RotationStatus::default());

        let controller = Self {
            config,
            connector,
            pool: ProxyPool::new(),
            resource: None,
            state: RotationState::Idle,
            session: None,
            in_flight: InFlight::Nothing,
            generation: 0,
            last_error: None,
            stats: StatsAggregator::new(),
            signal_tx,
            events: events.clone(),
            status_tx,
            mailbox: Some(Mailbox {
                commands: command_rx,
                signals: signal_rx,
            }),
        };
        controller.publish();

        let handle = RotationHandle {
            commands: command_tx,
            status: status_rx,
            events,
        };

        Ok((controller, handle))
    }

    /// Process commands and session signals until shut down or every handle
    /// is dropped (call in a spawned task)
    #[instrument(skip(self))]
    pub async fn run(mut self) {
        let Some(mut mailbox) = self.mailbox.take() else {
            return;
        };

        info!(
            "Rotation controller started ({} connector, session duration {}s)",
            self.connector.strategy_name(),
            self.config.session_duration.as_secs()
        );

        loop {
            tokio::select! {
                command = mailbox.commands.recv() => match command {
                    Some(Command::Shutdown(reply)) => {
                        let _ = reply.send(());
                        break;
                    }
                    Some(command) => self.handle_command(command),
                    None => {
                        debug!("All rotation handles dropped");
                        break;
                    }
                },
                Some(signal) = mailbox.signals.recv() => self.handle_signal(signal),
            }
        }

        self.in_flight.cancel();
        info!("Rotation controller stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Start(reply) => {
                let _ = reply.send(self.start());
            }
            Command::Pause(reply) => {
                let _ = reply.send(self.pause());
            }
            Command::Reset(reply) => {
                self.reset();
                let _ = reply.send(Ok(()));
            }
            Command::LoadPool(entries, reply) => {
                let _ = reply.send(self.load_pool(entries));
            }
            Command::SetResource(resource, reply) => {
                info!(resource_id = %resource.id, "Resource set");
                self.resource = Some(resource);
                self.publish();
                let _ = reply.send(Ok(()));
            }
            Command::SetSessionDuration(duration, reply) => {
                let _ = reply.send(self.set_session_duration(duration));
            }
            Command::Status(reply) => {
                let _ = reply.send(self.status());
            }
            Command::Stats(reply) => {
                let _ = reply.send(self.stats.snapshot(Instant::now()));
            }
            // Handled by the run loop
            Command::Shutdown(reply) => {
                let _ = reply.send(());
            }
        }
    }

    fn start(&mut self) -> Result<()> {
        if self.state.is_running() {
            return Ok(());
        }
        if self.pool.is_empty() {
            return Err(RotaError::NotReady("proxy pool is empty".into()));
        }
        if self.resource.is_none() {
            return Err(RotaError::NotReady("no resource set".into()));
        }

        if self.stats.run_started_at().is_none() {
            self.emit(RotationEvent::RunStarted { at: Utc::now() });
            info!("Rotation started with {} proxies", self.pool.size());
        } else {
            self.emit(RotationEvent::Resumed);
            info!("Rotation resumed");
        }

        self.begin_session();
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        if !self.state.is_running() {
            debug!("Pause ignored in state {}", self.state);
            return Ok(());
        }

        self.abandon_session();
        self.state = RotationState::Paused;
        self.emit(RotationEvent::Paused);
        self.publish();
        info!("Rotation paused");
        Ok(())
    }

    fn reset(&mut self) {
        self.abandon_session();
        self.pool.rewind();
        self.state = RotationState::Idle;
        self.last_error = None;
        self.emit(RotationEvent::RunReset);
        self.publish();
        info!("Rotation reset");
    }

    fn load_pool(&mut self, entries: Vec<String>) -> Result<usize> {
        let size = self.pool.load(entries)?;
        self.emit(RotationEvent::PoolLoaded { size });
        info!("Loaded {} proxies", size);

        if self.state.is_running() {
            info!("Restarting rotation on the new pool");
            self.begin_session();
        } else {
            self.publish();
        }
        Ok(size)
    }

    fn set_session_duration(&mut self, duration: Duration) -> Result<()> {
        if duration.is_zero() || duration > MAX_SESSION_DURATION {
            return Err(RotaError::InvalidConfig(format!(
                "session duration must be between 1s and 24h, got {}s",
                duration.as_secs()
            )));
        }

        self.config.session_duration = duration;
        self.publish();
        info!(
            "Session duration set to {}s (applies from the next session)",
            duration.as_secs()
        );
        Ok(())
    }

    /// Cancel whatever the current session is waiting on and invalidate any
    /// result already in the signal queue
    fn abandon_session(&mut self) {
        self.in_flight.cancel();
        self.generation += 1;
        self.session = None;
    }

    /// Enter `Connecting` on the proxy under the cursor
    fn begin_session(&mut self) {
        self.abandon_session();

        let Some(resource) = self.resource.clone() else {
            warn!("No resource set, rotation halted");
            self.state = RotationState::Idle;
            self.publish();
            return;
        };

        let generation = self.generation;
        let proxy = self.pool.current().cloned();
        let proxy_index = self.pool.active_index().unwrap_or(0);

        self.session = Some(Session::new(
            generation,
            proxy.clone(),
            proxy_index,
            resource.clone(),
        ));
        self.state = RotationState::Connecting;
        self.emit(RotationEvent::SessionStarted {
            generation,
            proxy: proxy.clone(),
            proxy_index,
        });
        debug!(
            generation,
            proxy_index,
            "Connecting via {}",
            proxy.as_ref().map(|p| p.as_str()).unwrap_or("direct connection")
        );

        let connector = self.connector.clone();
        let tx = self.signal_tx.clone();
        let handle = tokio::spawn(async move {
            let outcome = connector.attempt(&resource, proxy.as_ref()).await;
            let _ = tx.send(Signal::Attempt {
                generation,
                outcome,
            });
        });
        self.in_flight = InFlight::Attempt(handle);
        self.publish();
    }

    fn handle_signal(&mut self, signal: Signal) {
        if signal.generation() != self.generation {
            debug!(
                stale = signal.generation(),
                current = self.generation,
                "Discarding stale session signal"
            );
            return;
        }

        match signal {
            Signal::Attempt {
                generation,
                outcome: AttemptOutcome::Ready,
            } if self.state == RotationState::Connecting => self.activate(generation),
            Signal::Attempt {
                generation,
                outcome: AttemptOutcome::Failed(reason),
            } if self.state == RotationState::Connecting => self.fail(generation, reason),
            Signal::Timer {
                generation,
                event: TimerEvent::Progress(percent),
            } if self.state == RotationState::Active => {
                if let Some(session) = self.session.as_mut() {
                    session.progress = percent;
                }
                self.emit(RotationEvent::Progress {
                    generation,
                    percent,
                });
                self.publish();
            }
            Signal::Timer {
                generation,
                event: TimerEvent::Completed,
            } if self.state == RotationState::Active => self.complete(generation),
            Signal::RetryDue { .. } if self.state == RotationState::Failed => {
                self.begin_session();
            }
            other => {
                debug!(state = %self.state, "Ignoring {:?}", other);
            }
        }
    }

    /// Connection ready: start the session timer with the current duration
    fn activate(&mut self, generation: u64) {
        let duration = self.config.session_duration;
        let proxy = self.session.as_mut().and_then(|session| {
            session.state = SessionState::Active;
            session.duration = Some(duration);
            session.progress = 0.0;
            session.proxy.clone()
        });

        self.state = RotationState::Active;
        self.last_error = None;
        self.emit(RotationEvent::SessionActive {
            generation,
            proxy,
            duration_secs: duration.as_secs_f64(),
        });
        info!(generation, "Session active for {}s", duration.as_secs());

        let tx = self.signal_tx.clone();
        let timer = SessionTimer::start(duration, self.config.progress_tick, move |event| {
            tx.send(Signal::Timer { generation, event }).is_ok()
        });
        self.in_flight = InFlight::Timer(timer);
        self.publish();
    }

    /// Connection refused: surface it and schedule the retry
    fn fail(&mut self, generation: u64, reason: String) {
        let proxy = self.session.as_mut().and_then(|session| {
            session.state = SessionState::Failed;
            session.proxy.clone()
        });

        warn!(generation, "Connection failed: {}", reason);
        self.state = RotationState::Failed;
        self.last_error = Some(reason.clone());
        self.emit(RotationEvent::SessionFailed {
            generation,
            proxy,
            reason,
        });

        if self.config.failure_policy == FailurePolicy::SkipToNext {
            self.pool.advance();
        }

        let delay = self.config.failure_retry_delay;
        let tx = self.signal_tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(Signal::RetryDue { generation });
        });
        self.in_flight = InFlight::Retry(handle);
        self.publish();
    }

    /// Session ran its full duration: count it, rotate, and go again
    fn complete(&mut self, generation: u64) {
        self.in_flight = InFlight::Nothing;

        let (proxy, proxy_index) = match self.session.as_mut() {
            Some(session) => {
                session.state = SessionState::Completed;
                session.progress = 100.0;
                (session.proxy.clone(), session.proxy_index)
            }
            None => (None, 0),
        };

        self.emit(RotationEvent::SessionCompleted {
            generation,
            proxy,
            proxy_index,
        });
        self.pool.advance();
        info!(
            generation,
            "Session complete ({} total), rotating to proxy {:?}",
            self.stats.sessions_completed(),
            self.pool.active_index()
        );

        self.begin_session();
    }

    fn emit(&mut self, event: RotationEvent) {
        self.stats.apply(&event, Instant::now());
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn publish(&self) {
        self.status_tx.send_replace(self.status());
    }

    fn status(&self) -> RotationStatus {
        RotationStatus {
            state: self.state,
            active_proxy_index: self.pool.active_index(),
            active_proxy: self.pool.current().cloned(),
            pool_size: self.pool.size(),
            progress_percent: self.session.as_ref().map(|s| s.progress).unwrap_or(0.0),
            sessions_completed: self.stats.sessions_completed(),
            elapsed_seconds: self.stats.elapsed(Instant::now()).as_secs(),
            last_error: self.last_error.clone(),
            session_duration_secs: self.config.session_duration.as_secs(),
            resource: self.resource.clone(),
            generation: self.generation,
        }
    }
}

/// Cloneable handle for commanding a running [`RotationController`]
#[derive(Clone)]
pub struct RotationHandle {
    commands: mpsc::Sender<Command>,
    status: watch::Receiver<RotationStatus>,
    events: broadcast::Sender<RotationEvent>,
}

impl RotationHandle {
    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| RotaError::ControllerUnavailable)?;
        rx.await.map_err(|_| RotaError::ControllerUnavailable)
    }

    /// Start (or resume) rotating. Fails with `NotReady` without a pool and
    /// a resource.
    pub async fn start(&self) -> Result<()> {
        self.request(Command::Start).await?
    }

    /// Stop the current session; stats are kept
    pub async fn pause(&self) -> Result<()> {
        self.request(Command::Pause).await?
    }

    /// Cancel everything and clear the run statistics
    pub async fn reset(&self) -> Result<()> {
        self.request(Command::Reset).await?
    }

    /// Replace the proxy pool; returns the number of proxies loaded
    pub async fn load_pool<I, S>(&self, entries: I) -> Result<usize>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entries: Vec<String> = entries.into_iter().map(Into::into).collect();
        self.request(|tx| Command::LoadPool(entries, tx)).await?
    }

    /// Replace the proxy pool from a newline-delimited list
    pub async fn load_pool_text(&self, text: &str) -> Result<usize> {
        self.load_pool(text.lines()).await
    }

    pub async fn set_resource(&self, resource: ResourceRef) -> Result<()> {
        self.request(|tx| Command::SetResource(resource, tx)).await?
    }

    /// Change the session duration; takes effect from the next session
    pub async fn set_session_duration(&self, duration: Duration) -> Result<()> {
        self.request(|tx| Command::SetSessionDuration(duration, tx))
            .await?
    }

    /// Fresh status computed by the controller
    pub async fn status(&self) -> Result<RotationStatus> {
        self.request(Command::Status).await
    }

    pub async fn stats(&self) -> Result<StatsSnapshot> {
        self.request(Command::Stats).await
    }

    /// Last published status, without a round trip
    pub fn latest_status(&self) -> RotationStatus {
        self.status.borrow().clone()
    }

    /// Receiver notified whenever the status changes
    pub fn watch_status(&self) -> watch::Receiver<RotationStatus> {
        self.status.clone()
    }

    /// Subscribe to the event stream
    pub fn subscribe(&self) -> broadcast::Receiver<RotationEvent> {
        self.events.subscribe()
    }

    /// Stop the controller and cancel any in-flight session
    pub async fn shutdown(&self) -> Result<()> {
        self.request(Command::Shutdown).await
    }
}

impl std::fmt::Debug for RotationHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RotationHandle")
            .field("closed", &self.commands.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use tokio_test::assert_ok;

    use super::*;
    use crate::rotation::FixedAttempt;

    fn resource() -> ResourceRef {
        ResourceRef::from_url("https://youtu.be/dQw4w9WgXcQ").unwrap()
    }

    fn test_config() -> RotationConfig {
        RotationConfig {
            session_duration: Duration::from_secs(1),
            failure_retry_delay: Duration::from_secs(3),
            connect_delay: Duration::ZERO,
            progress_tick: Duration::from_millis(100),
            ..RotationConfig::default()
        }
    }

    fn ready_controller() -> RotationController {
        let connector = Arc::new(FixedAttempt::ready(Duration::from_secs(2)));
        let (mut controller, _handle) = RotationController::new(test_config(), connector).unwrap();
        controller
            .load_pool(vec!["p1".to_string(), "p2".to_string()])
            .unwrap();
        controller.resource = Some(resource());
        controller
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = RotationConfig {
            session_duration: Duration::ZERO,
            ..RotationConfig::default()
        };
        let connector = Arc::new(FixedAttempt::ready(Duration::ZERO));
        assert!(matches!(
            RotationController::new(config, connector),
            Err(RotaError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_start_requires_pool_and_resource() {
        let connector = Arc::new(FixedAttempt::ready(Duration::ZERO));
        let (mut controller, _handle) = RotationController::new(test_config(), connector).unwrap();

        assert!(matches!(controller.start(), Err(RotaError::NotReady(_))));
        controller.load_pool(vec!["p1".to_string()]).unwrap();
        assert!(matches!(controller.start(), Err(RotaError::NotReady(_))));
        assert_eq!(controller.state, RotationState::Idle);
        assert!(controller.stats.run_started_at().is_none());

        controller.resource = Some(resource());
        controller.start().unwrap();
        assert_eq!(controller.state, RotationState::Connecting);
        assert!(controller.stats.run_started_at().is_some());
    }

    #[tokio::test]
    async fn test_stale_signals_are_discarded() {
        let mut controller = ready_controller();
        controller.start().unwrap();
        let started_generation = controller.generation;

        // An attempt result from before this session started
        controller.handle_signal(Signal::Attempt {
            generation: started_generation - 1,
            outcome: AttemptOutcome::Ready,
        });
        assert_eq!(controller.state, RotationState::Connecting);

        controller.reset();
        controller.handle_signal(Signal::Attempt {
            generation: started_generation,
            outcome: AttemptOutcome::Ready,
        });
        controller.handle_signal(Signal::Timer {
            generation: started_generation,
            event: TimerEvent::Completed,
        });
        assert_eq!(controller.state, RotationState::Idle);
        assert_eq!(controller.stats.sessions_completed(), 0);
    }

    #[tokio::test]
    async fn test_signal_flow_advances_cursor() {
        let mut controller = ready_controller();
        controller.start().unwrap();
        let generation = controller.generation;

        controller.handle_signal(Signal::Attempt {
            generation,
            outcome: AttemptOutcome::Ready,
        });
        assert_eq!(controller.state, RotationState::Active);

        controller.handle_signal(Signal::Timer {
            generation,
            event: TimerEvent::Progress(40.0),
        });
        assert_eq!(controller.status().progress_percent, 40.0);

        controller.handle_signal(Signal::Timer {
            generation,
            event: TimerEvent::Completed,
        });
        assert_eq!(controller.stats.sessions_completed(), 1);
        assert_eq!(controller.pool.active_index(), Some(1));
        assert_eq!(controller.state, RotationState::Connecting);
        assert!(controller.generation > generation);
    }

    #[tokio::test]
    async fn test_failure_policies() {
        let mut controller = ready_controller();
        controller.start().unwrap();
        controller.handle_signal(Signal::Attempt {
            generation: controller.generation,
            outcome: AttemptOutcome::Failed("refused".into()),
        });
        assert_eq!(controller.state, RotationState::Failed);
        assert_eq!(controller.last_error.as_deref(), Some("refused"));
        assert_eq!(controller.pool.active_index(), Some(0));

        controller.reset();
        controller.config.failure_policy = FailurePolicy::SkipToNext;
        controller.start().unwrap();
        controller.handle_signal(Signal::Attempt {
            generation: controller.generation,
            outcome: AttemptOutcome::Failed("refused".into()),
        });
        assert_eq!(controller.pool.active_index(), Some(1));
        assert_eq!(controller.stats.sessions_completed(), 0);
    }

    #[tokio::test]
    async fn test_set_session_duration_bounds() {
        let mut controller = ready_controller();
        assert!(controller.set_session_duration(Duration::ZERO).is_err());
        assert!(controller
            .set_session_duration(Duration::from_secs(24 * 60 * 60 + 1))
            .is_err());
        controller
            .set_session_duration(Duration::from_secs(5))
            .unwrap();
        assert_eq!(controller.status().session_duration_secs, 5);
    }

    #[tokio::test]
    async fn test_pause_when_idle_is_noop() {
        let mut controller = ready_controller();
        controller.pause().unwrap();
        assert_eq!(controller.state, RotationState::Idle);
    }

    // End-to-end runs through the handle with paused time

    fn spawn_rotation(config: RotationConfig, connector: FixedAttempt) -> RotationHandle {
        let (controller, handle) = RotationController::new(config, Arc::new(connector)).unwrap();
        tokio::spawn(controller.run());
        handle
    }

    /// Receive events until `pred` matches, failing after ten minutes of
    /// virtual time
    async fn wait_for(
        events: &mut broadcast::Receiver<RotationEvent>,
        mut pred: impl FnMut(&RotationEvent) -> bool,
    ) -> RotationEvent {
        tokio::time::timeout(Duration::from_secs(600), async {
            loop {
                let event = events.recv().await.unwrap();
                if pred(&event) {
                    return event;
                }
            }
        })
        .await
        .expect("event did not arrive")
    }

    fn is_completed(event: &RotationEvent) -> bool {
        matches!(event, RotationEvent::SessionCompleted { .. })
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_cycle_visits_every_proxy_once() {
        let handle = spawn_rotation(test_config(), FixedAttempt::ready(Duration::from_millis(200)));
        let mut events = handle.subscribe();

        assert_ok!(handle.load_pool(["p1", "p2", "p3"]).await);
        assert_ok!(handle.set_resource(resource()).await);
        assert_ok!(handle.start().await);

        let mut visited = Vec::new();
        for _ in 0..3 {
            if let RotationEvent::SessionCompleted { proxy_index, .. } =
                wait_for(&mut events, is_completed).await
            {
                visited.push(proxy_index);
            }
        }
        handle.pause().await.unwrap();

        assert_eq!(visited, vec![0, 1, 2]);

        let status = handle.status().await.unwrap();
        assert_eq!(status.active_proxy_index, Some(0));
        assert_eq!(status.sessions_completed, 3);

        let stats = handle.stats().await.unwrap();
        assert_eq!(stats.sessions_completed, 3);
        assert_eq!(stats.proxy_usage.len(), 3);
        assert!(stats.proxy_usage.iter().all(|u| u.completed == 1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_is_monotonic_within_a_session() {
        let handle = spawn_rotation(test_config(), FixedAttempt::ready(Duration::ZERO));
        let mut events = handle.subscribe();

        handle.load_pool(["p1"]).await.unwrap();
        handle.set_resource(resource()).await.unwrap();
        handle.start().await.unwrap();

        let mut last = -1.0;
        loop {
            match wait_for(&mut events, |_| true).await {
                RotationEvent::Progress { percent, .. } => {
                    assert!(percent >= last);
                    assert!((0.0..=100.0).contains(&percent));
                    last = percent;
                }
                RotationEvent::SessionCompleted { .. } => break,
                _ => {}
            }
        }
        assert_eq!(last, 100.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_proxy_keeps_retrying() {
        let handle = spawn_rotation(
            test_config(),
            FixedAttempt::failing(Duration::from_millis(500), "connection refused"),
        );
        let mut events = handle.subscribe();

        handle.load_pool(["badproxy"]).await.unwrap();
        handle.set_resource(resource()).await.unwrap();
        handle.start().await.unwrap();

        for _ in 0..3 {
            let event = wait_for(&mut events, |e| {
                matches!(e, RotationEvent::SessionFailed { .. })
            })
            .await;
            if let RotationEvent::SessionFailed { reason, .. } = event {
                assert_eq!(reason, "connection refused");
            }
        }

        let status = handle.status().await.unwrap();
        assert!(status.state.is_running());
        assert_eq!(status.sessions_completed, 0);
        assert_eq!(status.active_proxy_index, Some(0));

        let stats = handle.stats().await.unwrap();
        assert_eq!(stats.sessions_failed, 3);
        assert_eq!(stats.proxy_usage[0].failed, 3);

        handle.reset().await.unwrap();
        let status = handle.status().await.unwrap();
        assert_eq!(status.state, RotationState::Idle);
        assert_eq!(status.last_error, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_cancels_in_flight_work() {
        let handle = spawn_rotation(test_config(), FixedAttempt::ready(Duration::from_secs(2)));

        handle.load_pool(["p1", "p2"]).await.unwrap();
        handle.set_resource(resource()).await.unwrap();
        handle.start().await.unwrap();
        handle.reset().await.unwrap();

        let mut events = handle.subscribe();
        let late = tokio::time::timeout(Duration::from_secs(30), events.recv()).await;
        assert!(late.is_err(), "unexpected event after reset: {:?}", late);

        let stats = handle.stats().await.unwrap();
        assert_eq!(stats.sessions_completed, 0);
        assert_eq!(stats.elapsed_display, "00:00:00");
        assert!(stats.run_started_at.is_none());
        assert!(stats.proxy_usage.is_empty());
        assert_eq!(handle.status().await.unwrap().state, RotationState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_and_resume_keep_stats() {
        let handle = spawn_rotation(test_config(), FixedAttempt::ready(Duration::from_millis(200)));
        let mut events = handle.subscribe();

        handle.load_pool(["p1", "p2"]).await.unwrap();
        handle.set_resource(resource()).await.unwrap();
        handle.start().await.unwrap();
        wait_for(&mut events, is_completed).await;

        handle.pause().await.unwrap();
        let before = handle.stats().await.unwrap();
        let status = handle.status().await.unwrap();
        assert_eq!(status.state, RotationState::Paused);
        assert_eq!(status.active_proxy_index, Some(1));

        // Nothing moves while paused
        tokio::time::sleep(Duration::from_secs(10)).await;
        let paused = handle.stats().await.unwrap();
        assert_eq!(paused.elapsed_seconds, before.elapsed_seconds);

        handle.start().await.unwrap();
        wait_for(&mut events, |e| matches!(e, RotationEvent::Resumed)).await;
        let resumed = wait_for(&mut events, |e| {
            matches!(e, RotationEvent::SessionStarted { .. })
        })
        .await;
        assert!(matches!(
            resumed,
            RotationEvent::SessionStarted { proxy_index: 1, .. }
        ));

        let after = handle.stats().await.unwrap();
        assert_eq!(after.sessions_completed, 1);
        assert_eq!(after.run_started_at, before.run_started_at);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duration_change_applies_to_next_session() {
        let config = RotationConfig {
            session_duration: Duration::from_secs(60),
            progress_tick: Duration::from_secs(1),
            ..test_config()
        };
        let handle = spawn_rotation(config, FixedAttempt::ready(Duration::ZERO));
        let mut events = handle.subscribe();

        handle.load_pool(["p1", "p2"]).await.unwrap();
        handle.set_resource(resource()).await.unwrap();
        handle.start().await.unwrap();

        let first = wait_for(&mut events, |e| {
            matches!(e, RotationEvent::SessionActive { .. })
        })
        .await;
        let active_at = Instant::now();
        assert!(matches!(
            first,
            RotationEvent::SessionActive { duration_secs, .. } if duration_secs == 60.0
        ));

        handle
            .set_session_duration(Duration::from_secs(5))
            .await
            .unwrap();
        wait_for(&mut events, is_completed).await;
        assert!(active_at.elapsed() >= Duration::from_secs(60));

        let second = wait_for(&mut events, |e| {
            matches!(e, RotationEvent::SessionActive { .. })
        })
        .await;
        assert!(matches!(
            second,
            RotationEvent::SessionActive { duration_secs, .. } if duration_secs == 5.0
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_pool_load_leaves_state_alone() {
        let handle = spawn_rotation(test_config(), FixedAttempt::ready(Duration::ZERO));
        handle.load_pool(["p1", "p2"]).await.unwrap();
        let before = handle.status().await.unwrap();

        assert!(matches!(
            handle.load_pool(Vec::<String>::new()).await,
            Err(RotaError::EmptyPool)
        ));
        assert!(matches!(
            handle.load_pool_text("\n   \r\n").await,
            Err(RotaError::EmptyPool)
        ));
        assert_eq!(handle.status().await.unwrap(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_pool_while_running_restarts_at_first_proxy() {
        let handle = spawn_rotation(test_config(), FixedAttempt::ready(Duration::from_millis(200)));
        let mut events = handle.subscribe();

        handle.load_pool(["p1", "p2", "p3"]).await.unwrap();
        handle.set_resource(resource()).await.unwrap();
        handle.start().await.unwrap();
        wait_for(&mut events, is_completed).await;
        assert_eq!(handle.status().await.unwrap().active_proxy_index, Some(1));

        handle.load_pool(["q1", "q2"]).await.unwrap();
        let status = handle.status().await.unwrap();
        assert_eq!(status.pool_size, 2);
        assert_eq!(status.active_proxy_index, Some(0));
        assert_eq!(status.state, RotationState::Connecting);
        assert_eq!(status.active_proxy.as_ref().map(|p| p.as_str()), Some("q1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_handle_reports_stopped_controller() {
        let handle = spawn_rotation(test_config(), FixedAttempt::ready(Duration::ZERO));
        handle.shutdown().await.unwrap();

        assert!(matches!(
            handle.status().await,
            Err(RotaError::ControllerUnavailable)
        ));
    }
}

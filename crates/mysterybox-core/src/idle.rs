//! Idle session guard.
//!
//! Disconnects the wallet session after a period without user activity.
//! Two interchangeable strategies detect idleness:
//!
//! - [`NativeStrategy`] asks a host-provided [`IdleDetector`] (OS-level
//!   idle detection) and needs the user's permission.
//! - [`FallbackStrategy`] listens to pointer, key and visibility events and
//!   compares the last activity against the timeout on a fixed tick.
//!
//! The guard tries the native detector first and silently falls back on any
//! failure. Only one strategy is live at a time.
//!
//! ## State Transitions
//!
//! ```text
//! Active -> Idle -> Terminated
//! ```

use async_trait::async_trait;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};

use crate::error::IdleError;
use crate::events::{ActivityEvent, ActivitySource, HostEvents};
use crate::storage::config::IdleConfig;

/// Platforms refuse native idle thresholds below one minute.
pub const MIN_NATIVE_THRESHOLD: Duration = Duration::from_secs(60);

/// Shortest activity-check period; a zero period cannot drive an interval.
pub const MIN_FALLBACK_TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GuardState {
    Active,
    Idle,
    Terminated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    Native,
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionState {
    Granted,
    Denied,
    Prompt,
}

/// User state as reported by a native detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserIdleState {
    Active,
    Idle,
}

/// Host-provided OS idle detection.
#[async_trait]
pub trait IdleDetector: Send + Sync {
    async fn request_permission(&self) -> Result<PermissionState, IdleError>;

    /// Begin reporting user state changes. Dropping the receiver cancels
    /// detection.
    async fn start(&self, threshold: Duration) -> Result<mpsc::Receiver<UserIdleState>, IdleError>;
}

/// Ends the wallet session.
pub trait SessionDisconnect: Send + Sync {
    fn disconnect(&self);
}

impl<F> SessionDisconnect for F
where
    F: Fn() + Send + Sync,
{
    fn disconnect(&self) {
        self()
    }
}

/// One way of deciding the user went idle. Dropping a strategy stops it.
#[async_trait]
pub trait IdleStrategy: Send {
    fn kind(&self) -> StrategyKind;

    /// Resolves once the user is idle. An error means the strategy can no
    /// longer observe the user.
    async fn wait_for_idle(&mut self) -> Result<(), IdleError>;
}

pub struct NativeStrategy {
    changes: mpsc::Receiver<UserIdleState>,
}

impl NativeStrategy {
    /// Request permission and start the detector.
    ///
    /// # Errors
    /// `PermissionDenied` unless permission is granted; any detector error
    /// is passed through.
    pub async fn start(detector: &dyn IdleDetector, threshold: Duration) -> Result<Self, IdleError> {
        match detector.request_permission().await? {
            PermissionState::Granted => {}
            PermissionState::Denied | PermissionState::Prompt => {
                return Err(IdleError::PermissionDenied)
            }
        }
        let changes = detector.start(threshold.max(MIN_NATIVE_THRESHOLD)).await?;
        Ok(Self { changes })
    }
}

#[async_trait]
impl IdleStrategy for NativeStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Native
    }

    async fn wait_for_idle(&mut self) -> Result<(), IdleError> {
        loop {
            match self.changes.recv().await {
                Some(UserIdleState::Idle) => return Ok(()),
                Some(UserIdleState::Active) => {}
                None => return Err(IdleError::Detector("detector stopped reporting".into())),
            }
        }
    }
}

pub struct FallbackStrategy {
    activity: broadcast::Receiver<ActivityEvent>,
    activity_open: bool,
    last_activity: Instant,
    threshold: Duration,
    tick: Interval,
}

impl FallbackStrategy {
    pub fn start(source: &ActivitySource, threshold: Duration, tick_every: Duration) -> Self {
        let tick_every = tick_every.max(MIN_FALLBACK_TICK);
        let now = Instant::now();
        let mut tick = tokio::time::interval_at(now + tick_every, tick_every);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            activity: source.subscribe(),
            activity_open: true,
            last_activity: now,
            threshold,
            tick,
        }
    }

    fn mark_activity(&mut self) {
        self.last_activity = Instant::now();
    }
}

#[async_trait]
impl IdleStrategy for FallbackStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Fallback
    }

    async fn wait_for_idle(&mut self) -> Result<(), IdleError> {
        loop {
            tokio::select! {
                event = self.activity.recv(), if self.activity_open => match event {
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => self.mark_activity(),
                    Err(broadcast::error::RecvError::Closed) => self.activity_open = false,
                },
                _ = self.tick.tick() => {
                    if self.last_activity.elapsed() >= self.threshold {
                        return Ok(());
                    }
                }
            }
        }
    }
}

/// Watches one connected session and disconnects it when the user idles.
pub struct IdleGuard {
    state: watch::Receiver<GuardState>,
    strategy: watch::Receiver<Option<StrategyKind>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl IdleGuard {
    /// Start guarding. Must be called from within a tokio runtime.
    pub fn start(
        config: &IdleConfig,
        detector: Option<Arc<dyn IdleDetector>>,
        events: &HostEvents,
        session: Arc<dyn SessionDisconnect>,
    ) -> Self {
        let (state_tx, state) = watch::channel(GuardState::Active);
        let (strategy_tx, strategy) = watch::channel(None);
        let task = tokio::spawn(guard_loop(
            detector,
            events.activity_source(),
            config.timeout(),
            config.tick(),
            session,
            state_tx,
            strategy_tx,
        ));
        Self {
            state,
            strategy,
            task: Mutex::new(Some(task)),
        }
    }

    pub fn state(&self) -> GuardState {
        *self.state.borrow()
    }

    /// Strategy in use, once selection has finished.
    pub fn strategy(&self) -> Option<StrategyKind> {
        *self.strategy.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<GuardState> {
        self.state.clone()
    }

    /// Cancel the live strategy with its listeners and timers. Idempotent.
    pub fn teardown(&self) {
        let task = self
            .task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(task) = task {
            task.abort();
            tracing::debug!("idle guard torn down");
        }
    }
}

impl Drop for IdleGuard {
    fn drop(&mut self) {
        self.teardown();
    }
}

async fn select_strategy(
    detector: Option<&dyn IdleDetector>,
    source: &ActivitySource,
    timeout: Duration,
    tick: Duration,
) -> Box<dyn IdleStrategy> {
    let native = match detector {
        Some(detector) => NativeStrategy::start(detector, timeout).await,
        None => Err(IdleError::CapabilityUnavailable),
    };
    match native {
        Ok(native) => return Box::new(native),
        Err(reason) => {
            tracing::debug!(%reason, "native idle detection unavailable, tracking activity")
        }
    }
    Box::new(FallbackStrategy::start(source, timeout, tick))
}

async fn guard_loop(
    detector: Option<Arc<dyn IdleDetector>>,
    source: ActivitySource,
    timeout: Duration,
    tick: Duration,
    session: Arc<dyn SessionDisconnect>,
    state: watch::Sender<GuardState>,
    kind: watch::Sender<Option<StrategyKind>>,
) {
    let mut strategy = select_strategy(detector.as_deref(), &source, timeout, tick).await;
    kind.send_replace(Some(strategy.kind()));

    if let Err(reason) = strategy.wait_for_idle().await {
        // The detector went away mid-session; the old strategy is dropped
        // before activity tracking starts.
        tracing::warn!(%reason, "idle detector lost, tracking activity");
        drop(strategy);
        strategy = Box::new(FallbackStrategy::start(&source, timeout, tick));
        kind.send_replace(Some(strategy.kind()));
        // Activity tracking cannot fail.
        let _ = strategy.wait_for_idle().await;
    }

    state.send_replace(GuardState::Idle);
    session.disconnect();
    drop(strategy);
    state.send_replace(GuardState::Terminated);
    tracing::info!(timeout_secs = timeout.as_secs(), "session disconnected after inactivity");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const TIMEOUT: Duration = Duration::from_secs(300);

    async fn settle() {
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
    }

    fn counting_session() -> (Arc<AtomicUsize>, Arc<dyn SessionDisconnect>) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let session: Arc<dyn SessionDisconnect> = Arc::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        (count, session)
    }

    struct FakeDetector {
        permission: Result<PermissionState, IdleError>,
        start_error: Option<IdleError>,
        threshold: Mutex<Option<Duration>>,
        sender: Mutex<Option<mpsc::Sender<UserIdleState>>>,
        starts: AtomicUsize,
    }

    impl FakeDetector {
        fn granting() -> Self {
            Self::with_permission(Ok(PermissionState::Granted))
        }

        fn with_permission(permission: Result<PermissionState, IdleError>) -> Self {
            Self {
                permission,
                start_error: None,
                threshold: Mutex::new(None),
                sender: Mutex::new(None),
                starts: AtomicUsize::new(0),
            }
        }

        fn sender(&self) -> mpsc::Sender<UserIdleState> {
            self.sender.lock().unwrap().clone().expect("detector started")
        }
    }

    #[async_trait]
    impl IdleDetector for FakeDetector {
        async fn request_permission(&self) -> Result<PermissionState, IdleError> {
            self.permission.clone()
        }

        async fn start(
            &self,
            threshold: Duration,
        ) -> Result<mpsc::Receiver<UserIdleState>, IdleError> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            if let Some(err) = &self.start_error {
                return Err(err.clone());
            }
            let (tx, rx) = mpsc::channel(8);
            *self.threshold.lock().unwrap() = Some(threshold);
            *self.sender.lock().unwrap() = Some(tx);
            Ok(rx)
        }
    }

    fn config() -> IdleConfig {
        IdleConfig {
            timeout_secs: TIMEOUT.as_secs(),
            tick_secs: 5,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fallback_disconnects_once_after_timeout() {
        let events = HostEvents::default();
        let (count, session) = counting_session();
        let guard = IdleGuard::start(&config(), None, &events, session);
        settle().await;

        assert_eq!(guard.strategy(), Some(StrategyKind::Fallback));
        assert_eq!(events.activity_listeners(), 1);
        assert_eq!(guard.state(), GuardState::Active);

        tokio::time::sleep(Duration::from_secs(299)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(guard.state(), GuardState::Terminated);
        assert_eq!(events.activity_listeners(), 0);

        tokio::time::sleep(Duration::from_secs(3_600)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_tick_is_clamped_to_a_second() {
        let events = HostEvents::default();
        let (count, session) = counting_session();
        let zero_tick = IdleConfig {
            timeout_secs: 10,
            tick_secs: 0,
        };
        let guard = IdleGuard::start(&zero_tick, None, &events, session);
        settle().await;
        assert_eq!(guard.strategy(), Some(StrategyKind::Fallback));

        tokio::time::sleep(Duration::from_secs(9)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(guard.state(), GuardState::Terminated);
    }

    #[tokio::test(start_paused = true)]
    async fn activity_resets_idle_clock() {
        let events = HostEvents::default();
        let (count, session) = counting_session();
        let _guard = IdleGuard::start(&config(), None, &events, session);
        settle().await;

        tokio::time::sleep(Duration::from_secs(200)).await;
        events.pointer_down();
        settle().await;

        tokio::time::sleep(Duration::from_secs(200)).await;
        events.key_down();
        settle().await;

        tokio::time::sleep(Duration::from_secs(200)).await;
        events.set_visibility(crate::events::Visibility::Hidden);
        settle().await;

        // Last activity at t=600; idle at the first tick >= t=900.
        tokio::time::sleep(Duration::from_secs(299)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn native_detector_disconnects_on_idle() {
        let events = HostEvents::default();
        let (count, session) = counting_session();
        let detector = Arc::new(FakeDetector::granting());
        let guard = IdleGuard::start(
            &config(),
            Some(detector.clone() as Arc<dyn IdleDetector>),
            &events,
            session,
        );
        settle().await;

        assert_eq!(guard.strategy(), Some(StrategyKind::Native));
        assert_eq!(events.activity_listeners(), 0, "no fallback listeners");
        assert_eq!(*detector.threshold.lock().unwrap(), Some(TIMEOUT));

        let tx = detector.sender();
        tx.send(UserIdleState::Active).await.unwrap();
        settle().await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tx.send(UserIdleState::Idle).await.unwrap();
        settle().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(guard.state(), GuardState::Terminated);
        assert!(tx.is_closed(), "detector cancelled after disconnect");
        assert!(tx.send(UserIdleState::Idle).await.is_err());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn native_threshold_is_clamped_to_a_minute() {
        let events = HostEvents::default();
        let (_count, session) = counting_session();
        let detector = Arc::new(FakeDetector::granting());
        let short = IdleConfig {
            timeout_secs: 10,
            tick_secs: 5,
        };
        let _guard = IdleGuard::start(
            &short,
            Some(detector.clone() as Arc<dyn IdleDetector>),
            &events,
            session,
        );
        settle().await;

        assert_eq!(*detector.threshold.lock().unwrap(), Some(MIN_NATIVE_THRESHOLD));
    }

    #[tokio::test(start_paused = true)]
    async fn denied_permission_falls_back_silently() {
        for permission in [
            Ok(PermissionState::Denied),
            Ok(PermissionState::Prompt),
            Err(IdleError::PermissionDenied),
        ] {
            let events = HostEvents::default();
            let (count, session) = counting_session();
            let detector = Arc::new(FakeDetector::with_permission(permission));
            let guard = IdleGuard::start(
                &config(),
                Some(detector.clone() as Arc<dyn IdleDetector>),
                &events,
                session,
            );
            settle().await;

            assert_eq!(guard.strategy(), Some(StrategyKind::Fallback));
            assert_eq!(detector.starts.load(Ordering::SeqCst), 0);
            assert_eq!(events.activity_listeners(), 1);

            tokio::time::sleep(Duration::from_secs(301)).await;
            assert_eq!(count.load(Ordering::SeqCst), 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn detector_start_failure_falls_back() {
        let events = HostEvents::default();
        let (_count, session) = counting_session();
        let mut detector = FakeDetector::granting();
        detector.start_error = Some(IdleError::Detector("boom".into()));
        let guard = IdleGuard::start(&config(), Some(Arc::new(detector)), &events, session);
        settle().await;

        assert_eq!(guard.strategy(), Some(StrategyKind::Fallback));
        assert_eq!(events.activity_listeners(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn lost_detector_switches_to_activity_tracking() {
        let events = HostEvents::default();
        let (count, session) = counting_session();
        let detector = Arc::new(FakeDetector::granting());
        let guard = IdleGuard::start(
            &config(),
            Some(detector.clone() as Arc<dyn IdleDetector>),
            &events,
            session,
        );
        settle().await;
        assert_eq!(events.activity_listeners(), 0);

        detector.sender.lock().unwrap().take();
        settle().await;
        assert_eq!(guard.strategy(), Some(StrategyKind::Fallback));
        assert_eq!(events.activity_listeners(), 1);

        tokio::time::sleep(Duration::from_secs(301)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_is_idempotent_and_silences_guard() {
        let events = HostEvents::default();
        let (count, session) = counting_session();
        let guard = IdleGuard::start(&config(), None, &events, session);
        settle().await;
        assert_eq!(events.activity_listeners(), 1);

        guard.teardown();
        guard.teardown();
        settle().await;
        assert_eq!(events.activity_listeners(), 0);

        tokio::time::sleep(Duration::from_secs(3_600)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        drop(guard);
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_from_disconnect_callback_is_safe() {
        let events = HostEvents::default();
        let slot: Arc<Mutex<Option<IdleGuard>>> = Arc::new(Mutex::new(None));
        let count = Arc::new(AtomicUsize::new(0));
        let session: Arc<dyn SessionDisconnect> = {
            let slot = slot.clone();
            let count = count.clone();
            Arc::new(move || {
                count.fetch_add(1, Ordering::SeqCst);
                if let Some(guard) = slot.lock().unwrap().as_ref() {
                    guard.teardown();
                }
            })
        };
        *slot.lock().unwrap() = Some(IdleGuard::start(&config(), None, &events, session));
        settle().await;

        tokio::time::sleep(Duration::from_secs(301)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(events.activity_listeners(), 0);
    }
}

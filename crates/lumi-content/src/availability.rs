//! Availability monitor for the generative service.
//!
//! A process-wide circuit breaker with two states:
//!
//! | From          | Event            | To            |
//! |---------------|------------------|---------------|
//! | HEALTHY       | `report_error`   | COOLING_DOWN  |
//! | COOLING_DOWN  | `report_error`   | COOLING_DOWN (window restarts) |
//! | COOLING_DOWN  | tick reaches 0   | HEALTHY       |
//! | COOLING_DOWN  | `report_success` | HEALTHY       |
//!
//! The monitor is a cheap cloneable handle; every clone shares one cooldown
//! clock. Transitions are serialized through a `tokio::sync::watch` channel,
//! which also lets observers follow state changes.

use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Default cooldown window after an error.
pub const DEFAULT_COOLDOWN_SECONDS: u32 = 60;

/// Default interval between probes while cooling down.
pub const DEFAULT_PROBE_INTERVAL_SECONDS: u64 = 600;

/// Timing parameters for the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AvailabilityConfig {
    /// Seconds of cooldown set by `report_error`.
    pub cooldown_seconds: u32,
    /// Period of the countdown ticker. Each tick removes one second.
    pub tick_interval: Duration,
    /// Period of the health probe.
    pub probe_interval: Duration,
}

impl Default for AvailabilityConfig {
    fn default() -> Self {
        Self {
            cooldown_seconds: DEFAULT_COOLDOWN_SECONDS,
            tick_interval: Duration::from_secs(1),
            probe_interval: Duration::from_secs(DEFAULT_PROBE_INTERVAL_SECONDS),
        }
    }
}

/// Snapshot of the monitor.
///
/// Invariant: `healthy == (cooldown_seconds_remaining == 0)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityState {
    /// `true` when calls may be attempted.
    pub healthy: bool,
    /// Seconds until the cooldown ends.
    pub cooldown_seconds_remaining: u32,
}

impl AvailabilityState {
    const fn with_remaining(seconds: u32) -> Self {
        Self {
            healthy: seconds == 0,
            cooldown_seconds_remaining: seconds,
        }
    }

    /// Returns the named state.
    pub const fn status(&self) -> MonitorStatus {
        if self.healthy {
            MonitorStatus::Healthy
        } else {
            MonitorStatus::CoolingDown
        }
    }
}

/// Named monitor states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MonitorStatus {
    /// Calls may be attempted.
    Healthy,
    /// Calls should short-circuit to offline content.
    CoolingDown,
}

impl std::fmt::Display for MonitorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::CoolingDown => write!(f, "cooling_down"),
        }
    }
}

/// A synthetic request used to find out whether the service is back.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Returns `true` if the service produced a non-degraded answer.
    async fn probe(&self) -> bool;
}

#[derive(Debug)]
struct Inner {
    config: AvailabilityConfig,
    state: watch::Sender<AvailabilityState>,
    window_started: Arc<Notify>,
}

/// Shared handle to the availability state machine.
#[derive(Debug, Clone)]
pub struct AvailabilityMonitor {
    inner: Arc<Inner>,
}

impl Default for AvailabilityMonitor {
    fn default() -> Self {
        Self::new(AvailabilityConfig::default())
    }
}

impl AvailabilityMonitor {
    /// Creates a monitor in the HEALTHY state.
    pub fn new(config: AvailabilityConfig) -> Self {
        let (state, _) = watch::channel(AvailabilityState::with_remaining(0));
        Self {
            inner: Arc::new(Inner {
                config,
                state,
                window_started: Arc::new(Notify::new()),
            }),
        }
    }

    /// `true` iff no cooldown is active.
    pub fn is_ready(&self) -> bool {
        self.state().healthy
    }

    /// Seconds left in the current cooldown.
    pub fn cooldown_seconds_remaining(&self) -> u32 {
        self.state().cooldown_seconds_remaining
    }

    /// Current snapshot.
    pub fn state(&self) -> AvailabilityState {
        *self.inner.state.borrow()
    }

    /// Subscribes to state changes.
    pub fn subscribe(&self) -> watch::Receiver<AvailabilityState> {
        self.inner.state.subscribe()
    }

    /// Starts (or restarts) the cooldown window.
    pub fn report_error(&self) {
        let window = self.inner.config.cooldown_seconds.max(1);
        let mut was_healthy = false;
        self.inner.state.send_modify(|state| {
            was_healthy = state.healthy;
            *state = AvailabilityState::with_remaining(window);
        });
        // Stores a permit if the ticker is busy, so the restart is never lost
        self.inner.window_started.notify_one();
        if was_healthy {
            warn!(cooldown_secs = window, "Generative service marked unavailable");
        } else {
            debug!(cooldown_secs = window, "Cooldown window restarted");
        }
    }

    /// Ends any cooldown immediately.
    pub fn report_success(&self) {
        let recovered = self.inner.state.send_if_modified(|state| {
            if state.healthy {
                false
            } else {
                *state = AvailabilityState::with_remaining(0);
                true
            }
        });
        if recovered {
            info!("Generative service available again");
        }
    }

    /// Removes one second from the cooldown.
    pub fn tick(&self) -> AvailabilityState {
        let mut recovered = false;
        self.inner.state.send_if_modified(|state| {
            if state.healthy {
                return false;
            }
            *state = AvailabilityState::with_remaining(state.cooldown_seconds_remaining.saturating_sub(1));
            recovered = state.healthy;
            true
        });
        if recovered {
            info!("Cooldown elapsed; generative service available again");
        }
        self.state()
    }

    /// Spawns the countdown ticker.
    ///
    /// Every `report_error` restarts the tick grid, so a window of N seconds
    /// lasts at least N seconds wherever the error falls between ticks. The
    /// task holds a weak reference and exits once every monitor handle has
    /// been dropped.
    pub fn spawn_ticker(&self) -> JoinHandle<()> {
        let weak = Arc::downgrade(&self.inner);
        let window_started = Arc::clone(&self.inner.window_started);
        let period = self.inner.config.tick_interval;
        tokio::spawn(async move {
            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Burst);
            loop {
                tokio::select! {
                    biased;
                    () = window_started.notified() => {
                        interval.reset();
                    }
                    _ = interval.tick() => {
                        let Some(monitor) = upgrade(&weak) else {
                            break;
                        };
                        monitor.tick();
                    }
                }
            }
        })
    }

    /// Spawns the low-frequency probe loop.
    ///
    /// While cooling down, each period runs `probe` and reports success if it
    /// returned `true`. Probes are skipped while healthy.
    pub fn spawn_probe<P>(&self, probe: Arc<P>) -> JoinHandle<()>
    where
        P: HealthProbe + ?Sized + 'static,
    {
        let weak = Arc::downgrade(&self.inner);
        let period = self.inner.config.probe_interval;
        tokio::spawn(async move {
            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let Some(monitor) = upgrade(&weak) else {
                    break;
                };
                if monitor.is_ready() {
                    continue;
                }
                debug!("Probing generative service");
                if probe.probe().await {
                    monitor.report_success();
                }
            }
        })
    }
}

fn upgrade(weak: &Weak<Inner>) -> Option<AvailabilityMonitor> {
    weak.upgrade().map(|inner| AvailabilityMonitor { inner })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    use super::*;

    fn monitor(cooldown_seconds: u32) -> AvailabilityMonitor {
        AvailabilityMonitor::new(AvailabilityConfig {
            cooldown_seconds,
            ..AvailabilityConfig::default()
        })
    }

    #[test]
    fn test_initial_state_is_healthy() {
        let m = AvailabilityMonitor::default();
        assert!(m.is_ready());
        assert_eq!(m.cooldown_seconds_remaining(), 0);
        assert_eq!(m.state().status(), MonitorStatus::Healthy);
    }

    #[test]
    fn test_report_error_starts_cooldown() {
        let m = monitor(60);
        m.report_error();
        assert!(!m.is_ready());
        assert_eq!(m.cooldown_seconds_remaining(), 60);
        assert_eq!(m.state().status(), MonitorStatus::CoolingDown);
    }

    #[test]
    fn test_ticks_count_down_to_healthy() {
        let m = monitor(3);
        m.report_error();
        assert_eq!(m.tick().cooldown_seconds_remaining, 2);
        assert!(!m.tick().healthy);
        let last = m.tick();
        assert!(last.healthy);
        assert_eq!(last.cooldown_seconds_remaining, 0);
        // Ticking a healthy monitor is a no-op.
        assert_eq!(m.tick(), last);
    }

    #[test]
    fn test_report_success_clears_immediately() {
        let m = monitor(60);
        m.report_error();
        m.report_success();
        assert!(m.is_ready());
    }

    #[test]
    fn test_second_error_restarts_window() {
        let m = monitor(5);
        m.report_error();
        m.tick();
        m.tick();
        m.report_error();
        assert_eq!(m.cooldown_seconds_remaining(), 5);
    }

    #[test]
    fn test_clones_share_state() {
        let a = monitor(60);
        let b = a.clone();
        a.report_error();
        assert!(!b.is_ready());
        b.report_success();
        assert!(a.is_ready());
    }

    #[test]
    fn test_state_serialization() {
        let m = monitor(60);
        m.report_error();
        let json = serde_json::to_value(m.state()).unwrap();
        assert_eq!(json["healthy"], false);
        assert_eq!(json["cooldownSecondsRemaining"], 60);
    }

    #[tokio::test]
    async fn test_subscribers_see_transitions() {
        let m = monitor(60);
        let mut rx = m.subscribe();
        m.report_error();
        rx.changed().await.unwrap();
        assert!(!rx.borrow_and_update().healthy);
        m.report_success();
        rx.changed().await.unwrap();
        assert!(rx.borrow_and_update().healthy);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticker_never_recovers_early() {
        let m = monitor(60);
        let ticker = m.spawn_ticker();
        m.report_error();

        time::sleep(Duration::from_millis(59_500)).await;
        assert!(!m.is_ready());
        assert_eq!(m.cooldown_seconds_remaining(), 1);

        time::sleep(Duration::from_secs(1)).await;
        assert!(m.is_ready());
        ticker.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticker_restarts_grid_for_error_between_ticks() {
        let m = monitor(60);
        let ticker = m.spawn_ticker();

        time::sleep(Duration::from_millis(900)).await;
        m.report_error();

        time::sleep(Duration::from_millis(59_300)).await;
        assert!(!m.is_ready());
        assert_eq!(m.cooldown_seconds_remaining(), 1);

        time::sleep(Duration::from_millis(800)).await;
        assert!(m.is_ready());
        ticker.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_restarted_window_lasts_full_cooldown() {
        let m = monitor(5);
        let ticker = m.spawn_ticker();
        m.report_error();

        time::sleep(Duration::from_millis(3_400)).await;
        assert_eq!(m.cooldown_seconds_remaining(), 2);
        m.report_error();

        time::sleep(Duration::from_millis(4_900)).await;
        assert!(!m.is_ready());

        time::sleep(Duration::from_millis(200)).await;
        assert!(m.is_ready());
        ticker.abort();
    }

    struct FlagProbe {
        answer: AtomicBool,
        calls: AtomicU32,
    }

    #[async_trait]
    impl HealthProbe for FlagProbe {
        async fn probe(&self) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answer.load(Ordering::SeqCst)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_only_runs_while_cooling_down() {
        let m = AvailabilityMonitor::new(AvailabilityConfig {
            cooldown_seconds: 10_000,
            tick_interval: Duration::from_secs(1),
            probe_interval: Duration::from_secs(600),
        });
        let probe = Arc::new(FlagProbe {
            answer: AtomicBool::new(false),
            calls: AtomicU32::new(0),
        });
        let task = m.spawn_probe(Arc::clone(&probe));

        time::sleep(Duration::from_secs(601)).await;
        assert_eq!(probe.calls.load(Ordering::SeqCst), 0);

        m.report_error();
        time::sleep(Duration::from_secs(600)).await;
        assert_eq!(probe.calls.load(Ordering::SeqCst), 1);
        assert!(!m.is_ready());

        probe.answer.store(true, Ordering::SeqCst);
        time::sleep(Duration::from_secs(600)).await;
        assert_eq!(probe.calls.load(Ordering::SeqCst), 2);
        assert!(m.is_ready());
        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticker_stops_when_monitor_dropped() {
        let m = monitor(60);
        let ticker = m.spawn_ticker();
        drop(m);
        time::sleep(Duration::from_secs(2)).await;
        assert!(ticker.is_finished());
    }
}

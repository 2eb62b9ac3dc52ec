//! Periodic tick scheduler for the gamehub gateway.
//!
//! One scheduler drives one periodic job: the manager's keep-alive sweep,
//! or a room's game loop. The period is a plain [`Duration`], so the same
//! type covers a 50 ms room tick and a 20 s heartbeat.
//!
//! A late tick never bursts: the missed periods are counted and the next
//! deadline is set a full period after the tick that finally fired. A
//! keep-alive sent three times in a row is no better than one.
//!
//! With no period configured, [`TickScheduler::wait_for_tick`] pends
//! forever. Rooms that only react to player commands use this so their
//! `tokio::select!` loop needs no special case:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         _ = shutdown.changed() => break,
//!         info = scheduler.wait_for_tick() => {
//!             sweep(info).await;
//!             scheduler.record_tick_end();
//!         }
//!     }
//! }
//! ```

use std::time::{Duration, Instant};

use tokio::time::{self, Instant as TokioInstant};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct TickConfig {
    /// Tick period. `None` = idle (never fires).
    pub period: Option<Duration>,
    /// Fraction of the period a tick's work may use before a warning is
    /// logged.
    pub budget_warn_threshold: f64,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            period: None,
            budget_warn_threshold: 0.80,
        }
    }
}

impl TickConfig {
    /// Shortest accepted period.
    pub const MIN_PERIOD: Duration = Duration::from_millis(5);

    pub fn every(period: Duration) -> Self {
        Self {
            period: Some(period),
            ..Default::default()
        }
    }

    /// `hz` ticks per second; `0` means idle.
    pub fn with_rate(hz: u32) -> Self {
        match hz {
            0 => Self::default(),
            hz => Self::every(Duration::from_secs(1) / hz),
        }
    }

    /// Clamps out-of-range values. Called by [`TickScheduler::new`].
    pub fn validated(mut self) -> Self {
        if let Some(p) = self.period.filter(|p| *p < Self::MIN_PERIOD) {
            warn!(period_us = p.as_micros() as u64, "tick period below minimum, clamping");
            self.period = Some(Self::MIN_PERIOD);
        }
        self.budget_warn_threshold = self.budget_warn_threshold.clamp(0.0, 1.0);
        self
    }
}

// ---------------------------------------------------------------------------
// Tick info
// ---------------------------------------------------------------------------

/// Returned by [`TickScheduler::wait_for_tick`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickInfo {
    /// Starts at 1.
    pub tick: u64,
    /// The configured period.
    pub dt: Duration,
    /// How far past its deadline this tick fired.
    pub late_by: Duration,
    /// Whole periods that elapsed without a tick.
    pub missed: u64,
}

/// Counters since creation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickStats {
    pub ticks: u64,
    pub missed: u64,
    /// Longest work time reported via [`TickScheduler::record_tick_end`].
    pub slowest: Duration,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

pub struct TickScheduler {
    config: TickConfig,
    next_tick: Option<TokioInstant>,
    work_started: Option<Instant>,
    stats: TickStats,
}

impl TickScheduler {
    pub fn new(config: TickConfig) -> Self {
        let config = config.validated();
        let next_tick = config.period.map(|p| TokioInstant::now() + p);

        match config.period {
            Some(p) => debug!(period_ms = p.as_millis() as u64, "tick scheduler created"),
            None => debug!("tick scheduler created idle"),
        }

        Self {
            config,
            next_tick,
            work_started: None,
            stats: TickStats::default(),
        }
    }

    pub fn every(period: Duration) -> Self {
        Self::new(TickConfig::every(period))
    }

    /// Waits until the next tick is due.
    ///
    /// Pends forever when idle. Cancel-safe, so it can sit in a
    /// `tokio::select!` branch.
    pub async fn wait_for_tick(&mut self) -> TickInfo {
        let (Some(deadline), Some(period)) = (self.next_tick, self.config.period) else {
            return std::future::pending().await;
        };

        time::sleep_until(deadline).await;

        let now = TokioInstant::now();
        let late_by = now.saturating_duration_since(deadline);
        let missed = (late_by.as_nanos() / period.as_nanos()) as u64;

        self.next_tick = Some(now + period);
        self.work_started = Some(Instant::now());
        self.stats.ticks += 1;
        self.stats.missed += missed;

        if missed > 0 {
            warn!(
                tick = self.stats.ticks,
                missed,
                late_ms = late_by.as_millis() as u64,
                "tick late"
            );
        } else {
            trace!(tick = self.stats.ticks, "tick");
        }

        TickInfo {
            tick: self.stats.ticks,
            dt: period,
            late_by,
            missed,
        }
    }

    /// Marks the end of the work done for the current tick.
    pub fn record_tick_end(&mut self) {
        let Some(start) = self.work_started.take() else {
            return;
        };
        let elapsed = start.elapsed();
        self.stats.slowest = self.stats.slowest.max(elapsed);

        if let Some(period) = self.config.period {
            if elapsed.as_secs_f64() >= period.as_secs_f64() * self.config.budget_warn_threshold {
                warn!(
                    tick = self.stats.ticks,
                    elapsed_ms = elapsed.as_millis() as u64,
                    period_ms = period.as_millis() as u64,
                    "tick work approaching period"
                );
            }
        }
    }

    pub fn is_idle(&self) -> bool {
        self.config.period.is_none()
    }

    pub fn tick_count(&self) -> u64 {
        self.stats.ticks
    }

    pub fn stats(&self) -> &TickStats {
        &self.stats
    }

    pub fn period(&self) -> Option<Duration> {
        self.config.period
    }
}

//! Drift-corrected sampling loop.
//!
//! Each tick records its start time, runs the sampling pass, then sleeps
//! until `tick_start + interval`. Time spent sampling is therefore taken out
//! of the sleep, and the start-to-start period stays at the interval as long
//! as a pass is shorter than the interval. A longer pass is an overrun: the
//! next tick starts immediately.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::storage::SinkError;

/// Time source and sleeper.
pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

/// Wall clock backed by `std::thread::sleep`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Instant {
        (**self).now()
    }

    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Sampling,
    Idle,
}

/// How a run ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub ticks: u64,
    /// Passes that took longer than the interval.
    pub overruns: u64,
    /// `true` if the run stopped because the running flag was cleared.
    pub cancelled: bool,
}

pub struct Scheduler<C: Clock> {
    clock: C,
    interval: Duration,
    max_ticks: Option<u64>,
    state: SchedulerState,
}

impl<C: Clock> Scheduler<C> {
    /// Longest uninterrupted sleep; the running flag is checked between
    /// slices.
    const SLEEP_SLICE: Duration = Duration::from_millis(100);

    pub fn new(clock: C, interval: Duration) -> Self {
        Self {
            clock,
            interval,
            max_ticks: None,
            state: SchedulerState::Idle,
        }
    }

    /// Stops after `n` ticks.
    pub fn with_max_ticks(mut self, n: u64) -> Self {
        self.max_ticks = Some(n);
        self
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Runs `tick` every interval until `running` is cleared, the tick limit
    /// is reached, or `tick` fails. A failure ends the loop and is returned.
    pub fn run<T>(&mut self, running: &AtomicBool, mut tick: T) -> Result<RunSummary, SinkError>
    where
        T: FnMut() -> Result<(), SinkError>,
    {
        let mut summary = RunSummary::default();

        loop {
            if !running.load(Ordering::SeqCst) {
                summary.cancelled = true;
                break;
            }
            if self.max_ticks.is_some_and(|max| summary.ticks >= max) {
                break;
            }

            let tick_start = self.clock.now();
            self.state = SchedulerState::Sampling;
            tick()?;
            summary.ticks += 1;
            self.state = SchedulerState::Idle;

            if self.max_ticks.is_some_and(|max| summary.ticks >= max) {
                break;
            }

            let elapsed = self.clock.now().saturating_duration_since(tick_start);
            if elapsed >= self.interval {
                summary.overruns += 1;
                warn!(
                    "sampling pass took {:?}, longer than the {:?} interval",
                    elapsed, self.interval
                );
                continue;
            }
            self.sleep_until(tick_start + self.interval, running);
        }

        debug!(
            "scheduler stopped after {} ticks ({} overruns)",
            summary.ticks, summary.overruns
        );
        Ok(summary)
    }

    fn sleep_until(&self, deadline: Instant, running: &AtomicBool) {
        loop {
            let remaining = deadline.saturating_duration_since(self.clock.now());
            if remaining.is_zero() || !running.load(Ordering::SeqCst) {
                return;
            }
            self.clock.sleep(remaining.min(Self::SLEEP_SLICE));
        }
    }
}

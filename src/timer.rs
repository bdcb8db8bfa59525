//! Clocks and cancellable waits for periodic tasks.
//!
//! Production code waits on a shutdown channel with a timeout; tests use
//! [`ManualTicker`] and [`FixedClock`] so no wall-clock time passes.

use chrono::{DateTime, Utc};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Mutex;
use std::time::Duration;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut now) = self.now.lock() {
            if let Ok(delta) = chrono::Duration::from_std(by) {
                *now += delta;
            }
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.lock() {
            Ok(now) => *now,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tick {
    Elapsed,
    Cancelled,
}

/// Waits between two rounds of a periodic task.
pub trait Ticker {
    fn wait(&mut self, period: Duration) -> Tick;
}

/// Fires the paired [`ShutdownSignal`]. Cloneable so signal handlers can own one.
#[derive(Clone, Debug)]
pub struct ShutdownTrigger {
    tx: Sender<()>,
}

impl ShutdownTrigger {
    pub fn fire(&self) {
        let _ = self.tx.send(());
    }
}

/// Ticker that sleeps for the period unless shutdown is requested.
#[derive(Debug)]
pub struct ShutdownSignal {
    rx: Receiver<()>,
    cancelled: bool,
}

pub fn shutdown_channel() -> (ShutdownTrigger, ShutdownSignal) {
    let (tx, rx) = mpsc::channel();
    (
        ShutdownTrigger { tx },
        ShutdownSignal {
            rx,
            cancelled: false,
        },
    )
}

impl ShutdownSignal {
    pub fn is_cancelled(&mut self) -> bool {
        if !self.cancelled && self.rx.try_recv().is_ok() {
            self.cancelled = true;
        }
        self.cancelled
    }
}

impl Ticker for ShutdownSignal {
    fn wait(&mut self, period: Duration) -> Tick {
        if self.cancelled {
            return Tick::Cancelled;
        }
        match self.rx.recv_timeout(period) {
            Err(RecvTimeoutError::Timeout) => Tick::Elapsed,
            // All triggers dropped counts as shutdown too.
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                self.cancelled = true;
                Tick::Cancelled
            }
        }
    }
}

/// Ticker for tests: returns immediately, advancing an optional [`FixedClock`]
/// and cancelling after `cancel_after` waits.
#[derive(Debug, Default)]
pub struct ManualTicker<'a> {
    clock: Option<&'a FixedClock>,
    cancel_after: Option<u64>,
    waits: u64,
}

impl<'a> ManualTicker<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clock(mut self, clock: &'a FixedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn cancel_after(mut self, waits: u64) -> Self {
        self.cancel_after = Some(waits);
        self
    }

    pub fn waits(&self) -> u64 {
        self.waits
    }
}

impl Ticker for ManualTicker<'_> {
    fn wait(&mut self, period: Duration) -> Tick {
        if let Some(limit) = self.cancel_after {
            if self.waits >= limit {
                return Tick::Cancelled;
            }
        }
        self.waits += 1;
        if let Some(clock) = self.clock {
            clock.advance(period);
        }
        Tick::Elapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn shutdown_signal_times_out_then_cancels() {
        let (trigger, mut signal) = shutdown_channel();
        assert_eq!(signal.wait(Duration::from_millis(10)), Tick::Elapsed);
        assert!(!signal.is_cancelled());

        trigger.fire();
        assert_eq!(signal.wait(Duration::from_secs(3600)), Tick::Cancelled);
        assert!(signal.is_cancelled());
        assert_eq!(signal.wait(Duration::from_secs(3600)), Tick::Cancelled);
    }

    #[test]
    fn dropped_trigger_cancels() {
        let (trigger, mut signal) = shutdown_channel();
        drop(trigger);
        assert_eq!(signal.wait(Duration::from_secs(3600)), Tick::Cancelled);
    }

    #[test]
    fn manual_ticker_advances_fixed_clock() {
        let start = Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap();
        let clock = FixedClock::new(start);
        let mut ticker = ManualTicker::new().with_clock(&clock).cancel_after(2);
        assert_eq!(ticker.wait(Duration::from_secs(240)), Tick::Elapsed);
        assert_eq!(ticker.wait(Duration::from_secs(240)), Tick::Elapsed);
        assert_eq!(ticker.wait(Duration::from_secs(240)), Tick::Cancelled);
        assert_eq!(ticker.waits(), 2);
        assert_eq!(clock.now(), start + chrono::Duration::minutes(8));
    }
}

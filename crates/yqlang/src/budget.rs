//! Execution budgets: cancellation, deadlines, recursion caps, and sleep
//! accounting.
//!
//! A [`Budget`] is checked by the VM at instruction boundaries. Two
//! mechanisms can stop a run:
//!
//! - the driver's polling thread flips the shared cancel flag when wall
//!   clock exceeds `allowance + accumulated sleep` or the total allowance;
//! - synchronous hosts (REPL, tests) set a deadline instead, which `sleep`
//!   pushes forward so sleeping never consumes CPU allowance.
//!
//! Either way the VM raises [`RuntimeErrorKind::Cancelled`] at the next
//! instruction boundary and the run unwinds cleanly, keeping any actions
//! already buffered.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use crate::errors::{RunResult, RuntimeError, RuntimeErrorKind};

/// How finely `sleep` slices its waiting so cancellation stays responsive.
const SLEEP_SLICE: Duration = Duration::from_millis(10);

/// Per-run execution budget handle.
#[derive(Debug)]
pub struct Budget {
    cancel: Arc<AtomicBool>,
    sleep_ms: Arc<AtomicU64>,
    deadline: Option<Instant>,
    max_recursion_depth: usize,
}

impl Budget {
    /// A budget with no deadline; cancellation comes only through the shared
    /// flag (the driver's polling path).
    #[must_use]
    pub fn new(max_recursion_depth: usize) -> Self {
        Self {
            cancel: Arc::new(AtomicBool::new(false)),
            sleep_ms: Arc::new(AtomicU64::new(0)),
            deadline: None,
            max_recursion_depth,
        }
    }

    /// A budget that cancels itself once `allowance` of wall clock has
    /// passed, excluding time spent in `sleep` (the synchronous path).
    #[must_use]
    pub fn with_allowance(max_recursion_depth: usize, allowance: Duration) -> Self {
        Self {
            deadline: Some(Instant::now() + allowance),
            ..Self::new(max_recursion_depth)
        }
    }

    /// Shared flag the driver flips to cancel the run.
    #[must_use]
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Shared counter of milliseconds spent sleeping; the driver adds this
    /// to the allowance when deciding whether to cancel.
    #[must_use]
    pub fn sleep_handle(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.sleep_ms)
    }

    /// Checks the cancel flag and the deadline.
    #[inline]
    pub fn check(&self) -> RunResult<()> {
        if self.cancel.load(Ordering::Relaxed) {
            return Err(RuntimeError::cancelled());
        }
        if let Some(deadline) = self.deadline
            && Instant::now() >= deadline
        {
            return Err(RuntimeError::cancelled());
        }
        Ok(())
    }

    /// Checks the recursion cap before a frame push. `depth` is the current
    /// frame count.
    pub fn check_recursion(&self, depth: usize) -> RunResult<()> {
        if depth >= self.max_recursion_depth {
            Err(RuntimeError::new(RuntimeErrorKind::RecursionTooDeep {
                limit: self.max_recursion_depth,
            }))
        } else {
            Ok(())
        }
    }

    /// Blocks for `ms` milliseconds in cancellable slices, accumulating the
    /// slept time and pushing any deadline forward by the same amount so
    /// sleeping never counts against the CPU allowance.
    ///
    /// The slept time is published slice by slice; the driver reads the
    /// counter while the sleep is still in progress, so a deferred update
    /// would make it bill sleep time as CPU and cancel mid-sleep.
    pub fn sleep(&mut self, ms: i64) -> RunResult<()> {
        let total = Duration::from_millis(u64::try_from(ms).unwrap_or(0));
        let started = Instant::now();
        let mut published: u64 = 0;
        loop {
            let elapsed = started.elapsed();
            if elapsed >= total || self.cancel.load(Ordering::Relaxed) {
                break;
            }
            std::thread::sleep((total - elapsed).min(SLEEP_SLICE));
            let slept_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
            self.sleep_ms.fetch_add(slept_ms - published, Ordering::Relaxed);
            published = slept_ms;
        }
        let slept = started.elapsed();
        let slept_ms = u64::try_from(slept.as_millis()).unwrap_or(u64::MAX);
        if slept_ms > published {
            self.sleep_ms.fetch_add(slept_ms - published, Ordering::Relaxed);
        }
        if let Some(deadline) = self.deadline.as_mut() {
            *deadline += slept;
        }
        self.check()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_flag_stops_execution() {
        let budget = Budget::new(300);
        assert!(budget.check().is_ok());
        budget.cancel_handle().store(true, Ordering::Relaxed);
        assert!(budget.check().unwrap_err().is_cancelled());
    }

    #[test]
    fn deadline_expires() {
        let budget = Budget::with_allowance(300, Duration::from_millis(0));
        std::thread::sleep(Duration::from_millis(1));
        assert!(budget.check().unwrap_err().is_cancelled());
    }

    #[test]
    fn sleep_extends_deadline() {
        let mut budget = Budget::with_allowance(300, Duration::from_millis(200));
        budget.sleep(50).unwrap();
        // the slept time must not have consumed the allowance
        assert!(budget.check().is_ok());
        assert!(budget.sleep_handle().load(Ordering::Relaxed) >= 50);
    }

    #[test]
    fn recursion_cap() {
        let budget = Budget::new(10);
        assert!(budget.check_recursion(9).is_ok());
        let err = budget.check_recursion(10).unwrap_err();
        assert!(matches!(err.kind, RuntimeErrorKind::RecursionTooDeep { limit: 10 }));
    }
}

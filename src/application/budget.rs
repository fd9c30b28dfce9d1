//! Resource budget checked at the top of every growth iteration

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Why a run stopped before reaching its targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    IterationCap(usize),
    TimeCap(Duration),
    Requested,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::IterationCap(n) => write!(f, "iteration cap of {n} reached"),
            StopReason::TimeCap(d) => write!(f, "time cap of {:.1}s reached", d.as_secs_f64()),
            StopReason::Requested => f.write_str("stop requested"),
        }
    }
}

/// Limits a growth run may consume.
#[derive(Debug, Clone, Default)]
pub struct ResourceBudget {
    max_iterations: Option<usize>,
    max_duration: Option<Duration>,
    stop: Arc<AtomicBool>,
}

impl ResourceBudget {
    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn with_max_iterations(mut self, n: usize) -> Self {
        self.max_iterations = Some(n);
        self
    }

    pub fn with_max_duration(mut self, d: Duration) -> Self {
        self.max_duration = Some(d);
        self
    }

    /// Flag another thread may set to stop the run at the next iteration.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn check(&self, iterations: usize, elapsed: Duration) -> Option<StopReason> {
        if self.stop.load(Ordering::Relaxed) {
            return Some(StopReason::Requested);
        }
        if let Some(max) = self.max_iterations {
            if iterations >= max {
                return Some(StopReason::IterationCap(max));
            }
        }
        match self.max_duration {
            Some(max) if elapsed >= max => Some(StopReason::TimeCap(max)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_unlimited_budget_when_checking_then_never_stops() {
        assert_eq!(ResourceBudget::unlimited().check(1_000_000, Duration::from_secs(3600)), None);
    }

    #[test]
    fn given_stop_flag_when_set_then_requested() {
        let budget = ResourceBudget::unlimited().with_max_iterations(10);
        budget.stop_handle().store(true, Ordering::Relaxed);
        assert_eq!(budget.check(0, Duration::ZERO), Some(StopReason::Requested));
    }

    #[test]
    fn given_caps_when_reached_then_reported() {
        let budget = ResourceBudget::unlimited()
            .with_max_iterations(5)
            .with_max_duration(Duration::from_secs(1));
        assert_eq!(budget.check(5, Duration::ZERO), Some(StopReason::IterationCap(5)));
        assert_eq!(
            budget.check(1, Duration::from_secs(2)),
            Some(StopReason::TimeCap(Duration::from_secs(1)))
        );
        assert_eq!(budget.check(1, Duration::from_millis(10)), None);
    }
}

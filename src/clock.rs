//! Injected time source and cancellation primitives
//!
//! The compiler never reads the system clock directly. Callers thread a
//! [`ClockSource`] through every run so tests can pin "now" anywhere,
//! including across DST transitions.

use chrono::{DateTime, Duration, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::scheduler::error::{SchedulerError, SchedulerResult};

/// Source of the current instant
pub trait ClockSource: Send + Sync {
    /// Current UTC instant
    fn now_utc(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl ClockSource for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock pinned to a fixed instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl FixedClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self(at)
    }
}

impl ClockSource for FixedClock {
    fn now_utc(&self) -> DateTime<Utc> {
        self.0
    }
}

// ============================================================================
// Cancellation
// ============================================================================

/// Cooperative cancellation flag shared between a caller and a running compile
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Check whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Cancellation token plus an optional deadline, checked between slot resolutions
#[derive(Clone)]
pub struct RunControl {
    token: CancelToken,
    deadline: Option<DateTime<Utc>>,
    clock: Arc<dyn ClockSource>,
}

impl std::fmt::Debug for RunControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunControl")
            .field("token", &self.token)
            .field("deadline", &self.deadline)
            .finish()
    }
}

impl Default for RunControl {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl RunControl {
    /// Unbounded run measured against the given clock
    pub fn new(clock: Arc<dyn ClockSource>) -> Self {
        Self {
            token: CancelToken::new(),
            deadline: None,
            clock,
        }
    }

    /// Attach a cancellation token
    pub fn with_token(mut self, token: CancelToken) -> Self {
        self.token = token;
        self
    }

    /// Abort once `budget` has elapsed from now
    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.deadline = Some(self.clock.now_utc() + budget);
        self
    }

    /// Abort at an absolute instant
    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// The token observed by this run
    pub fn token(&self) -> &CancelToken {
        &self.token
    }

    /// Fail with `Cancelled` if the token fired or the deadline passed
    pub fn check(&self) -> SchedulerResult<()> {
        if self.token.is_cancelled() {
            return Err(SchedulerError::cancelled("cancellation requested"));
        }
        if let Some(deadline) = self.deadline {
            if self.clock.now_utc() >= deadline {
                return Err(SchedulerError::cancelled(format!(
                    "deadline {} exceeded",
                    deadline.to_rfc3339()
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_fixed_clock() {
        let at = Utc.with_ymd_and_hms(2024, 3, 10, 7, 0, 0).unwrap();
        assert_eq!(FixedClock::new(at).now_utc(), at);
    }

    #[test]
    fn test_cancel_token_shared() {
        let token = CancelToken::new();
        let control = RunControl::default().with_token(token.clone());
        assert!(control.check().is_ok());

        token.cancel();
        assert!(matches!(
            control.check(),
            Err(SchedulerError::Cancelled { .. })
        ));
    }

    #[test]
    fn test_deadline_exceeded() {
        let at = Utc.with_ymd_and_hms(2024, 3, 10, 7, 0, 0).unwrap();
        let clock = Arc::new(FixedClock::new(at));

        let expired = RunControl::new(clock.clone()).with_deadline(at);
        assert!(expired.check().is_err());

        let open = RunControl::new(clock).with_budget(Duration::seconds(5));
        assert!(open.check().is_ok());
    }
}

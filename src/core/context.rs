//! Request-scoped context.
//!
//! A [`RequestContext`] is threaded through every backend call so a slow
//! backend cannot hold a request past its deadline. The core never retries
//! and never sleeps; it only refuses to issue a call once the deadline passed.

use super::error::{StoreError, StoreResult};
use std::time::{Duration, Instant};

/// Deadline and correlation data for one protocol request.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    deadline: Option<Instant>,
    request_id: Option<String>,
}

impl RequestContext {
    /// A context without a deadline.
    pub fn background() -> Self {
        Self::default()
    }

    /// A context that expires `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Some(Instant::now() + timeout),
            request_id: None,
        }
    }

    /// A context that expires at `deadline`.
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            request_id: None,
        }
    }

    /// Attach a request identifier for log correlation.
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// The deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// The request identifier, if any.
    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    /// Time left before the deadline. `None` means unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Fail with `DeadlineExceeded` once the deadline has passed.
    pub fn check(&self) -> StoreResult<()> {
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(StoreError::DeadlineExceeded),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn background_never_expires() {
        let ctx = RequestContext::background();
        assert!(ctx.check().is_ok());
        assert!(ctx.remaining().is_none());
    }

    #[test]
    fn past_deadline_fails() {
        let ctx = RequestContext::with_deadline(Instant::now() - Duration::from_millis(1));
        assert!(matches!(ctx.check(), Err(StoreError::DeadlineExceeded)));
        assert_eq!(ctx.remaining(), Some(Duration::ZERO));
    }

    #[test]
    fn request_id_is_kept() {
        let ctx = RequestContext::with_timeout(Duration::from_secs(5)).with_request_id("req-1");
        assert_eq!(ctx.request_id(), Some("req-1"));
        assert!(ctx.check().is_ok());
    }
}

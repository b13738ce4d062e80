//! Per-request context: scope set, deadline and cancellation.
//!
//! The engine has no timeout logic of its own. It checks the context before
//! every store lookup and stops at the first boundary after the caller
//! cancelled or the deadline passed.

use crate::EngineError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shared flag a caller flips to abort an in-flight request.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    scopes: Vec<String>,
    deadline: Option<Instant>,
    cancel: CancellationFlag,
}

impl RequestContext {
    pub fn new<I, S>(scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            scopes: scopes.into_iter().map(Into::into).collect(),
            deadline: None,
            cancel: CancellationFlag::default(),
        }
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_cancellation(mut self, flag: CancellationFlag) -> Self {
        self.cancel = flag;
        self
    }

    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    pub fn cancellation(&self) -> &CancellationFlag {
        &self.cancel
    }

    /// Fail if the request was cancelled or ran past its deadline.
    pub fn checkpoint(&self) -> Result<(), EngineError> {
        if self.cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(EngineError::DeadlineExceeded),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_context_passes() {
        let ctx = RequestContext::new(["Scope1"]);
        assert!(ctx.checkpoint().is_ok());
        assert_eq!(ctx.scopes(), ["Scope1".to_string()]);
    }

    #[test]
    fn cancelled_flag_is_shared() {
        let flag = CancellationFlag::new();
        let ctx = RequestContext::new(["Scope1"]).with_cancellation(flag.clone());
        flag.cancel();
        assert!(matches!(ctx.checkpoint(), Err(EngineError::Cancelled)));
    }

    #[test]
    fn past_deadline_fails() {
        let ctx = RequestContext::new(["Scope1"]).with_deadline(Instant::now());
        assert!(matches!(ctx.checkpoint(), Err(EngineError::DeadlineExceeded)));
    }
}

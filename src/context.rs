use super::error::LedgerError;
use super::principal::Principal;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Per-request state handed to every engine operation.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub principal: Principal,
    deadline: Option<Instant>,
    cancelled: Arc<AtomicBool>,
}

/// Handle used by the caller to abort an in-flight request.
#[derive(Debug, Clone)]
pub struct CancelHandle(Arc<AtomicBool>);

impl RequestContext {
    pub fn new(principal: Principal) -> Self {
        Self {
            principal,
            deadline: None,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle(self.cancelled.clone())
    }

    /// Checked before each ledger call. Fails fast once the signal fired.
    pub fn ensure_active(&self) -> Result<(), LedgerError> {
        if self.cancelled.load(Ordering::Acquire) {
            return Err(LedgerError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(LedgerError::Cancelled),
            _ => Ok(()),
        }
    }
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }
}

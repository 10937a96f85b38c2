use crate::{EngineError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Cancellation for long rebuilds: an optional shared flag plus an optional deadline.
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    flag: Option<Arc<AtomicBool>>,
    deadline: Option<Instant>,
}

impl Interrupt {
    /// Never fires.
    pub fn none() -> Self { Self::default() }

    pub fn with_flag(flag: Arc<AtomicBool>) -> Self {
        Self { flag: Some(flag), deadline: None }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self { flag: None, deadline: Some(Instant::now() + timeout) }
    }

    pub fn deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn is_triggered(&self) -> bool {
        if let Some(flag) = &self.flag {
            if flag.load(Ordering::Relaxed) {
                return true;
            }
        }
        matches!(self.deadline, Some(d) if Instant::now() >= d)
    }

    pub fn check(&self) -> Result<()> {
        if self.is_triggered() {
            Err(EngineError::Interrupted)
        } else {
            Ok(())
        }
    }
}

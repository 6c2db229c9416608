use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A cheaply clonable cancellation flag for long running computations.
///
/// Interactive callers keep one clone and hand another to the computation;
/// the engine consults it once per outer loop iteration and returns
/// [`ComputeError::Aborted`](crate::error::ComputeError::Aborted) as soon as
/// practical, never partial results.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// A fresh, not yet cancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. All clones observe the request.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_flag() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }
}

//! Shared cancellation flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A cheaply clonable cancellation signal observed by every long-running
/// task. Once triggered it never resets; listers stop paginating, the
/// downloader pool drains its queue without fetching, and the shutdown
/// flush/save/close sequence still runs.
#[derive(Debug, Clone, Default)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal shutdown.
    pub fn trigger(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// True once shutdown has been signaled.
    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_is_visible_to_clones() {
        let flag = ShutdownFlag::new();
        let observer = flag.clone();

        assert!(!observer.is_triggered());
        flag.trigger();
        assert!(observer.is_triggered());
    }
}

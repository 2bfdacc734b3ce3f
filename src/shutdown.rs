use crate::error::{ModuleError, Result};
use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use std::cell::Cell;

/// Lifecycle of a stage instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Constructed, nothing requested yet
    Created,
    /// First pull issued
    Started,
    /// Terminal; every entry point is a no-op
    Shutdown,
}

/// The per-stage lock and the shutdown flag it guards.
///
/// `start`, delivery, timer ticks, acceptance hooks and `shutdown` all run
/// their bodies while holding this lock, so for one stage at most one of them
/// is inside its guarded section at a time. The lock is re-entrant: a host may
/// fire an acceptance hook, or deliver the next batch, on the same thread that
/// is still inside the stage.
pub struct ShutdownLatch {
    state: ReentrantMutex<Cell<Lifecycle>>,
}

/// Proof of holding the stage lock while the stage was not yet shut down
pub struct Active<'a> {
    guard: ReentrantMutexGuard<'a, Cell<Lifecycle>>,
}

impl Active<'_> {
    pub fn lifecycle(&self) -> Lifecycle {
        self.guard.get()
    }

    /// Re-check after calling out; a re-entrant caller may have shut us down
    pub fn is_shut_down(&self) -> bool {
        self.guard.get() == Lifecycle::Shutdown
    }

    /// Move to `Started` once whatever start needs has been set up.
    pub fn mark_started(&self) {
        if self.guard.get() == Lifecycle::Created {
            self.guard.set(Lifecycle::Started);
        }
    }
}

impl ShutdownLatch {
    pub fn new() -> Self {
        Self {
            state: ReentrantMutex::new(Cell::new(Lifecycle::Created)),
        }
    }

    /// Acquire the lock. Returns `None`, lock released, once shut down.
    pub fn enter(&self) -> Option<Active<'_>> {
        let guard = self.state.lock();
        if guard.get() == Lifecycle::Shutdown {
            return None;
        }
        Some(Active { guard })
    }

    /// Acquire the lock for a start. `Ok(None)` if already shut down; starting
    /// twice is a contract violation. The lifecycle is left unchanged until
    /// the caller marks the stage started.
    pub fn begin_start(&self) -> Result<Option<Active<'_>>> {
        let Some(active) = self.enter() else {
            return Ok(None);
        };
        if active.lifecycle() == Lifecycle::Started {
            return Err(ModuleError::AlreadyStarted);
        }
        Ok(Some(active))
    }

    /// Move to `Started`. `Ok(None)` if already shut down; starting twice is a
    /// contract violation.
    pub fn start(&self) -> Result<Option<Active<'_>>> {
        let active = self.begin_start()?;
        if let Some(active) = &active {
            active.mark_started();
        }
        Ok(active)
    }

    /// Mark the stage terminal. A second call is a contract violation.
    pub fn shut_down(&self) -> Result<()> {
        let guard = self.state.lock();
        if guard.get() == Lifecycle::Shutdown {
            return Err(ModuleError::AlreadyShutdown);
        }
        guard.set(Lifecycle::Shutdown);
        Ok(())
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.state.lock().get()
    }

    pub fn is_shut_down(&self) -> bool {
        self.lifecycle() == Lifecycle::Shutdown
    }
}

impl Default for ShutdownLatch {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_lifecycle_transitions() {
        let latch = ShutdownLatch::new();
        assert_eq!(latch.lifecycle(), Lifecycle::Created);
        assert!(latch.start().unwrap().is_some());
        assert_eq!(latch.lifecycle(), Lifecycle::Started);
        latch.shut_down().unwrap();
        assert!(latch.is_shut_down());
    }

    #[test]
    fn test_double_start_is_rejected() {
        let latch = ShutdownLatch::new();
        drop(latch.start().unwrap());
        assert!(matches!(latch.start(), Err(ModuleError::AlreadyStarted)));
    }

    #[test]
    fn test_unfinished_start_can_be_retried() {
        let latch = ShutdownLatch::new();
        let attempt = latch.begin_start().unwrap().unwrap();
        assert_eq!(attempt.lifecycle(), Lifecycle::Created);
        drop(attempt);

        let retry = latch.begin_start().unwrap().unwrap();
        retry.mark_started();
        assert_eq!(retry.lifecycle(), Lifecycle::Started);
        drop(retry);
        assert!(matches!(latch.begin_start(), Err(ModuleError::AlreadyStarted)));
    }

    #[test]
    fn test_double_shutdown_is_rejected() {
        let latch = ShutdownLatch::new();
        latch.shut_down().unwrap();
        assert!(matches!(
            latch.shut_down(),
            Err(ModuleError::AlreadyShutdown)
        ));
    }

    #[test]
    fn test_terminal_state_is_absorbing() {
        let latch = ShutdownLatch::new();
        latch.shut_down().unwrap();
        assert!(latch.enter().is_none());
        assert!(latch.start().unwrap().is_none());
        assert_eq!(latch.lifecycle(), Lifecycle::Shutdown);
    }

    #[test]
    fn test_reentrant_enter_sees_nested_shutdown() {
        let latch = ShutdownLatch::new();
        let outer = latch.enter().unwrap();
        assert!(latch.enter().is_some());
        latch.shut_down().unwrap();
        assert!(outer.is_shut_down());
    }

    #[test]
    fn test_guarded_sections_do_not_overlap() {
        let latch = Arc::new(ShutdownLatch::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let latch = Arc::clone(&latch);
                let inside = Arc::clone(&inside);
                thread::spawn(move || {
                    for _ in 0..200 {
                        if let Some(_active) = latch.enter() {
                            assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                            inside.fetch_sub(1, Ordering::SeqCst);
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
    }
}

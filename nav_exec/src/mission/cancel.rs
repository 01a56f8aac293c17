//! # Cancellation token

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::{
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Cooperative cancellation shared between a mission loop and its controller.
///
/// Once cancelled a token stays cancelled. Waiting on a token returns early when it is cancelled.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        let (lock, cvar) = &*self.inner;
        *lock_flag(lock) = true;
        cvar.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *lock_flag(&self.inner.0)
    }

    /// Wait for `timeout` or until the token is cancelled.
    ///
    /// Returns `true` if the token was cancelled. A timeout too long to have a deadline waits for
    /// cancellation only.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (lock, cvar) = &*self.inner;
        let deadline = Instant::now().checked_add(timeout);
        let mut cancelled = lock_flag(lock);

        while !*cancelled {
            cancelled = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        break;
                    }

                    match cvar.wait_timeout(cancelled, deadline - now) {
                        Ok((g, _)) => g,
                        Err(poisoned) => poisoned.into_inner().0,
                    }
                }
                None => cvar.wait(cancelled).unwrap_or_else(PoisonError::into_inner),
            };
        }

        *cancelled
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn lock_flag(flag: &Mutex<bool>) -> MutexGuard<'_, bool> {
    flag.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use std::thread;

    #[test]
    fn test_wait_runs_to_timeout() {
        let token = CancelToken::new();
        let start = Instant::now();
        assert!(!token.wait_timeout(Duration::from_millis(30)));
        assert!(start.elapsed() >= Duration::from_millis(30));
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_cancel_wakes_waiter() {
        let token = CancelToken::new();

        let waiter = {
            let token = token.clone();
            thread::spawn(move || {
                let start = Instant::now();
                let cancelled = token.wait_timeout(Duration::from_secs(10));
                (cancelled, start.elapsed())
            })
        };

        thread::sleep(Duration::from_millis(20));
        token.cancel();

        let (cancelled, waited) = waiter.join().unwrap();
        assert!(cancelled);
        assert!(waited < Duration::from_secs(5));

        // Stays cancelled
        assert!(token.is_cancelled());
        assert!(token.wait_timeout(Duration::from_secs(10)));
    }

    #[test]
    fn test_unbounded_wait_ends_on_cancel() {
        let token = CancelToken::new();

        let waiter = {
            let token = token.clone();
            thread::spawn(move || token.wait_timeout(Duration::MAX))
        };

        thread::sleep(Duration::from_millis(20));
        token.cancel();

        assert!(waiter.join().unwrap());
    }
}

// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Per-key leases — mutual exclusion around a voucher's read-modify-write.

use std::collections::HashSet;
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, warn};
use voucherwerk_core::error::{Result, VoucherwerkError};

/// Grants exclusive leases on string keys.
pub trait LeaseProvider: Send + Sync {
    /// Block until `key` is free or `timeout` elapses (`LeaseTimeout`).
    fn acquire(&self, key: &str, timeout: Duration) -> Result<LeaseGuard<'_>>;

    /// Release `key`. Normally called by [`LeaseGuard`] on drop.
    fn release(&self, key: &str);
}

/// Holds a lease until dropped.
#[must_use = "the lease is released as soon as the guard is dropped"]
pub struct LeaseGuard<'a> {
    provider: &'a dyn LeaseProvider,
    key: String,
}

impl<'a> LeaseGuard<'a> {
    pub fn new(provider: &'a dyn LeaseProvider, key: impl Into<String>) -> Self {
        Self {
            provider,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for LeaseGuard<'_> {
    fn drop(&mut self) {
        self.provider.release(&self.key);
    }
}

impl std::fmt::Debug for LeaseGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeaseGuard").field("key", &self.key).finish()
    }
}

fn lock_err<T>(_: PoisonError<T>) -> VoucherwerkError {
    VoucherwerkError::Storage("lease table lock poisoned".into())
}

/// In-process lease table guarded by a mutex and condition variable.
#[derive(Debug, Default)]
pub struct LocalLeaseProvider {
    held: Mutex<HashSet<String>>,
    released: Condvar,
}

impl LocalLeaseProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_held(&self, key: &str) -> bool {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(key)
    }
}

impl LeaseProvider for LocalLeaseProvider {
    fn acquire(&self, key: &str, timeout: Duration) -> Result<LeaseGuard<'_>> {
        let deadline = Instant::now() + timeout;
        let mut held = self.held.lock().map_err(lock_err)?;
        while held.contains(key) {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                warn!(key, ?timeout, "lease wait timed out");
                return Err(VoucherwerkError::LeaseTimeout(key.to_owned()));
            }
            held = self
                .released
                .wait_timeout(held, remaining)
                .map_err(lock_err)?
                .0;
        }
        held.insert(key.to_owned());
        debug!(key, "lease acquired");
        Ok(LeaseGuard::new(self, key))
    }

    fn release(&self, key: &str) {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        held.remove(key);
        self.released.notify_all();
        debug!(key, "lease released");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    use super::*;

    #[test]
    fn guard_releases_on_drop() {
        let leases = LocalLeaseProvider::new();
        {
            let guard = leases.acquire("v/a.pdf", Duration::from_millis(10)).unwrap();
            assert_eq!(guard.key(), "v/a.pdf");
            assert!(leases.is_held("v/a.pdf"));
        }
        assert!(!leases.is_held("v/a.pdf"));
    }

    #[test]
    fn contended_key_times_out() {
        let leases = LocalLeaseProvider::new();
        let _held = leases.acquire("k", Duration::from_millis(10)).unwrap();
        let err = leases.acquire("k", Duration::from_millis(20)).unwrap_err();
        assert!(matches!(err, VoucherwerkError::LeaseTimeout(key) if key == "k"));
    }

    #[test]
    fn distinct_keys_do_not_contend() {
        let leases = LocalLeaseProvider::new();
        let _a = leases.acquire("a", Duration::ZERO).unwrap();
        let _b = leases.acquire("b", Duration::ZERO).unwrap();
    }

    #[test]
    fn waiters_are_serialised() {
        let leases = Arc::new(LocalLeaseProvider::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let leases = Arc::clone(&leases);
                let inside = Arc::clone(&inside);
                let max_inside = Arc::clone(&max_inside);
                thread::spawn(move || {
                    let _guard = leases.acquire("shared", Duration::from_secs(5)).unwrap();
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max_inside.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(5));
                    inside.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    }
}

//! Reference-counted loading indicator
//!
//! Readers always see the latest visibility value through a watch channel;
//! writers serialize on an atomic counter. The indicator becomes visible on
//! the first `show` and hidden only when every `show` has been balanced by
//! a `hide`. Out-of-order hides are clamped at zero.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Clone)]
pub struct LoadingTracker {
    inner: Arc<Inner>,
}

struct Inner {
    active: AtomicUsize,
    visible: watch::Sender<bool>,
}

impl Default for LoadingTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadingTracker {
    pub fn new() -> Self {
        let (visible, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                active: AtomicUsize::new(0),
                visible,
            }),
        }
    }

    /// Mark a request as in flight.
    ///
    /// The returned guard hides again on drop, so the release side runs
    /// exactly once per `show` even when the caller abandons the request.
    pub fn show(&self) -> LoadingGuard {
        let previous = self.inner.active.fetch_add(1, Ordering::SeqCst);
        if previous == 0 {
            let _ = self.inner.visible.send(true);
        }
        LoadingGuard {
            tracker: self.clone(),
        }
    }

    fn hide(&self) {
        let mut current = self.inner.active.load(Ordering::SeqCst);
        loop {
            // Clamp at zero under out-of-order hide calls
            if current == 0 {
                return;
            }
            match self.inner.active.compare_exchange(
                current,
                current - 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => {
                    if current == 1 {
                        let _ = self.inner.visible.send(false);
                    }
                    return;
                }
                Err(actual) => current = actual,
            }
        }
    }

    pub fn visible(&self) -> bool {
        *self.inner.visible.borrow()
    }

    /// Number of requests currently in flight.
    pub fn active(&self) -> usize {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// Subscribe to visibility changes.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.inner.visible.subscribe()
    }
}

/// Balances one `show` on drop.
pub struct LoadingGuard {
    tracker: LoadingTracker,
}

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        self.tracker.hide();
    }
}

//! Single-holder exclusion token.
//!
//! Used twice: the execution coordinator holds one keyed by command id, the
//! scenario runner one keyed by script id. Release only succeeds for the
//! current holder, so a stale release never frees someone else's claim.

use std::sync::{Arc, Mutex};

use tracing::warn;

#[derive(Debug, Default)]
pub struct RunGuard {
    holder: Mutex<Option<String>>,
}

impl RunGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the slot for `id`. Fails if anyone, including `id`, holds it.
    pub fn try_acquire(&self, id: &str) -> bool {
        let Ok(mut holder) = self.holder.lock() else {
            warn!("Run guard poisoned, refusing acquire");
            return false;
        };
        if holder.is_some() {
            return false;
        }
        *holder = Some(id.to_string());
        true
    }

    /// Clear the slot if `id` holds it. Returns whether anything was released.
    pub fn release(&self, id: &str) -> bool {
        let Ok(mut holder) = self.holder.lock() else {
            return false;
        };
        if holder.as_deref() == Some(id) {
            *holder = None;
            true
        } else {
            false
        }
    }

    pub fn current(&self) -> Option<String> {
        self.holder.lock().ok().and_then(|h| h.clone())
    }

    pub fn is_busy(&self) -> bool {
        self.current().is_some()
    }

    /// Acquire and return a lease that releases on drop.
    pub fn try_lease(self: &Arc<Self>, id: &str) -> Option<GuardLease> {
        self.try_acquire(id).then(|| GuardLease {
            guard: Arc::clone(self),
            id: id.to_string(),
        })
    }
}

/// Held claim on a [`RunGuard`].
#[derive(Debug)]
pub struct GuardLease {
    guard: Arc<RunGuard>,
    id: String,
}

impl GuardLease {
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Drop for GuardLease {
    fn drop(&mut self) {
        self.guard.release(&self.id);
    }
}

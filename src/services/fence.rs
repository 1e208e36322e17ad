use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

use crate::domain::MaintenanceState;

/// Returned to fenced operations while a wipe runs, after one failed, and
/// after one completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("store is being wiped or has been wiped; operator action required")]
pub struct Fenced;

/// Gate between ordinary ledger/gate/redeem work and a full wipe.
///
/// Ordinary operations hold a shared guard for their whole duration. The
/// wipe raises the `wiping` flag (new operations fail fast), then waits for
/// the exclusive guard, which is granted once in-flight operations finish.
#[derive(Debug, Clone)]
pub struct OperationFence {
    lock: Arc<RwLock<()>>,
    wiping: Arc<AtomicBool>,
}

impl Default for OperationFence {
    fn default() -> Self {
        Self::new(MaintenanceState::Active)
    }
}

impl OperationFence {
    #[must_use]
    pub fn new(initial: MaintenanceState) -> Self {
        Self {
            lock: Arc::new(RwLock::new(())),
            wiping: Arc::new(AtomicBool::new(initial != MaintenanceState::Active)),
        }
    }

    pub async fn enter(&self) -> Result<OwnedRwLockReadGuard<()>, Fenced> {
        if self.wiping.load(Ordering::Acquire) {
            return Err(Fenced);
        }
        let guard = self.lock.clone().read_owned().await;
        if self.wiping.load(Ordering::Acquire) {
            return Err(Fenced);
        }
        Ok(guard)
    }

    /// Raises the flag and waits for exclusive access. The flag stays up until
    /// [`Self::lift`] is called. Fails if it is already up, so only one wipe
    /// can ever hold the fence.
    pub async fn close(&self) -> Result<OwnedRwLockWriteGuard<()>, Fenced> {
        if self.wiping.swap(true, Ordering::AcqRel) {
            return Err(Fenced);
        }
        Ok(self.lock.clone().write_owned().await)
    }

    pub fn lift(&self) {
        self.wiping.store(false, Ordering::Release);
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.wiping.load(Ordering::Acquire)
    }
}

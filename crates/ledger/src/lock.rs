use std::fs::{File, OpenOptions};
use std::path::Path;

use fs2::FileExt;

use trader_core::error::{Result, TraderError};

/// Exclusive cross-process advisory lock scoped to a ledger file.
///
/// The lock target is a sibling dotfile (`.{name}.lock`) rather than the data
/// file itself, so a reader holding the lock never blocks on its own append
/// handle. Acquisition blocks until the lock is free; the critical sections
/// are bounded file scans/appends, so contention is short-lived. Released on
/// drop.
pub struct LedgerLock {
    file: File,
}

impl LedgerLock {
    pub fn acquire(data_path: &Path) -> Result<Self> {
        let name = data_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                TraderError::Ledger(format!("bad ledger path: {}", data_path.display()))
            })?;
        let lock_path = data_path.with_file_name(format!(".{}.lock", name));

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&lock_path)
            .map_err(|e| {
                TraderError::Ledger(format!("cannot open lock file {}: {}", lock_path.display(), e))
            })?;
        file.lock_exclusive().map_err(|e| {
            TraderError::Ledger(format!("cannot lock {}: {}", lock_path.display(), e))
        })?;
        Ok(Self { file })
    }
}

impl Drop for LedgerLock {
    fn drop(&mut self) {
        // Best-effort; the OS releases the lock when the fd closes anyway.
        let _ = fs2::FileExt::unlock(&self.file);
    }
}

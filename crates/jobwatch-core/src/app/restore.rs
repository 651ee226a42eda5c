//! Restoration guard and report.

use std::sync::atomic::{AtomicBool, Ordering};

/// One-shot latch: restoration runs at most once per tracker instance.
#[derive(Debug, Default)]
pub struct RestorationGuard {
    restored: AtomicBool,
}

impl RestorationGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// True for the first caller only.
    pub fn try_begin(&self) -> bool {
        self.restored
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn has_run(&self) -> bool {
        self.restored.load(Ordering::Acquire)
    }
}

/// What `restore_all` did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
    /// Restoration already ran on this instance; nothing was done.
    pub skipped: bool,
    /// Jobs that got a new Poller chain.
    pub attached: usize,
    /// Non-terminal jobs that already had a live chain (seeded earlier).
    pub already_polling: usize,
    /// Terminal jobs, left alone.
    pub terminal: usize,
    /// Jobs whose chain could not be attached.
    pub failed: usize,
}

impl RestoreReport {
    pub(crate) fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }
}

//! Operator controls shared between the sync thread and the frontend.
//!
//! Everything here is a plain atomic flag. The sync loop reads them at the top
//! of each tick; the frontend only ever sets them. No lock is ever held across
//! IPC I/O.

use crate::sync::SyncStatus;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

#[derive(Debug)]
pub struct OperatorControls {
    monitoring: AtomicBool,
    suppressed: AtomicBool,
    refresh_requested: AtomicBool,
    shutdown_requested: AtomicBool,
    status: AtomicU8,
}

impl OperatorControls {
    pub fn new() -> Self {
        Self {
            monitoring: AtomicBool::new(true),
            suppressed: AtomicBool::new(false),
            refresh_requested: AtomicBool::new(false),
            shutdown_requested: AtomicBool::new(false),
            status: AtomicU8::new(SyncStatus::WaitingForTarget as u8),
        }
    }

    /// Latches "stay disconnected". Only `request_refresh` releases it.
    pub fn request_disconnect(&self) {
        self.suppressed.store(true, Ordering::SeqCst);
    }

    /// Releases the disconnect latch and asks for a fresh connection.
    pub fn request_refresh(&self) {
        self.suppressed.store(false, Ordering::SeqCst);
        self.refresh_requested.store(true, Ordering::SeqCst);
    }

    pub fn set_monitoring(&self, enabled: bool) {
        self.monitoring.store(enabled, Ordering::SeqCst);
    }

    pub fn request_shutdown(&self) {
        self.shutdown_requested.store(true, Ordering::SeqCst);
    }

    pub fn is_suppressed(&self) -> bool {
        self.suppressed.load(Ordering::SeqCst)
    }

    pub fn is_monitoring(&self) -> bool {
        self.monitoring.load(Ordering::SeqCst)
    }

    pub fn shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::SeqCst)
    }

    /// Status as of the last completed tick, for threads that do not own the
    /// sync loop.
    pub fn last_status(&self) -> SyncStatus {
        SyncStatus::from_u8(self.status.load(Ordering::SeqCst))
    }

    pub(crate) fn publish_status(&self, status: SyncStatus) {
        self.status.store(status as u8, Ordering::SeqCst);
    }

    /// Consumes a pending refresh request.
    pub fn take_refresh(&self) -> bool {
        self.refresh_requested.swap(false, Ordering::SeqCst)
    }
}

impl Default for OperatorControls {
    fn default() -> Self {
        Self::new()
    }
}

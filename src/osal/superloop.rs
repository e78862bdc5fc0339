//! The no-OSAL backend.
//!
//! Installing [`SuperloopOsal`] is optional: most of the crate checks
//! `osal::interface().is_none()` to decide whether it is running under a
//! real scheduler or a cooperative loop, and behaves correctly either way.
//! This backend exists for completeness and for callers who want a single
//! code path that always goes through the `Osal` trait (e.g. `task_delay`
//! used purely as a tick source).

use core::sync::atomic::{AtomicU32, Ordering};

use crate::status::Status;

use super::{EventConfig, Handle, Osal, SemaphoreConfig, TaskConfig, TimerConfig, WaitResult};

/// Tracks a monotonically increasing tick count the caller advances by
/// calling [`SuperloopOsal::tick`] once per loop iteration. There is no real
/// task/semaphore/timer support -- a superloop build has none of those.
pub struct SuperloopOsal {
    ticks: AtomicU32,
}

impl SuperloopOsal {
    pub const fn new() -> Self {
        SuperloopOsal {
            ticks: AtomicU32::new(0),
        }
    }

    pub fn tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }
}

impl Default for SuperloopOsal {
    fn default() -> Self {
        Self::new()
    }
}

impl Osal for SuperloopOsal {
    fn init(&self) -> Status {
        Status::Success
    }

    fn task_delay(&self, _ticks: u32) -> Status {
        // A superloop has no scheduler to yield to; delay is a no-op whose
        // cost is paid by the caller's own loop cadence.
        Status::Success
    }

    fn task_get_tick_count(&self) -> u32 {
        self.ticks.load(Ordering::Relaxed)
    }

    fn task_create(&self, _cfg: &TaskConfig) -> Result<Handle, Status> {
        Err(Status::Fail)
    }

    fn semaphore_create(&self, _cfg: &SemaphoreConfig) -> Result<Handle, Status> {
        Err(Status::Fail)
    }

    fn semaphore_take(&self, _h: Handle, _timeout_ticks: u32) -> Result<WaitResult, Status> {
        Ok(WaitResult::Acquired)
    }

    fn semaphore_give(&self, _h: Handle) -> Status {
        Status::Success
    }

    fn timer_create(&self, _cfg: &TimerConfig) -> Result<Handle, Status> {
        Err(Status::Fail)
    }

    fn event_create(&self, _cfg: &EventConfig) -> Result<Handle, Status> {
        Err(Status::Fail)
    }
}

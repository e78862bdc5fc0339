//! L1: OS Abstraction Layer.
//!
//! A vtable of task/semaphore/timer/event-group operations, installed once
//! at startup behind a cheap global dispatch cell. Concrete backends
//! (FreeRTOS, ThreadX, ...) are external collaborators and out of scope here
//! -- only the trait and the dependency-free [`superloop::SuperloopOsal`]
//! fallback live in this crate.

pub mod superloop;

use spin::Once;

use crate::status::Status;

bitflags::bitflags! {
    /// Event-group bitmask flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct EventMask: u32 {
        const NONE = 0;
    }
}

pub type TaskFn = fn(arg: *mut ());

/// Caller-visible task configuration. `static_resource` must point to
/// caller-allocated backing memory when the backend uses static allocation.
pub struct TaskConfig {
    pub name: &'static str,
    pub priority: u32,
    pub stack_size: usize,
    pub task_fn: TaskFn,
    pub argument: *mut (),
    pub static_resource: Option<*mut ()>,
}

pub struct SemaphoreConfig {
    pub max_count: u32,
    pub static_resource: Option<*mut ()>,
}

pub type TimerFn = fn(arg: *mut ());

pub struct TimerConfig {
    pub name: &'static str,
    pub period_ticks: u32,
    pub timer_fn: TimerFn,
    pub argument: *mut (),
    pub static_resource: Option<*mut ()>,
}

pub struct EventConfig {
    pub static_resource: Option<*mut ()>,
}

/// Opaque, backend-owned handle. Each `Osal` implementation decides what
/// bits it needs (an index into its own handle table, a raw RTOS handle
/// behind a pointer, ...); this crate only ever stores and returns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Handle(pub usize);

/// Result of a blocking wait: either it elapsed, or it was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitResult {
    Acquired,
    TimedOut,
}

/// The OSAL vtable contract. Every method returns `Status::Fail` with a log
/// line if the corresponding backend slot is unimplemented -- the default
/// trait methods below already do that, so a partial backend (e.g. one with
/// no timers) only has to implement what it supports.
pub trait Osal: Send + Sync {
    fn init(&self) -> Status {
        Status::Fail
    }

    fn task_create(&self, _cfg: &TaskConfig) -> Result<Handle, Status> {
        unsupported("task_create")
    }
    fn task_delete(&self, _h: Handle) -> Status {
        unsupported_unit("task_delete")
    }
    fn task_suspend(&self, _h: Handle) -> Status {
        unsupported_unit("task_suspend")
    }
    fn task_resume(&self, _h: Handle) -> Status {
        unsupported_unit("task_resume")
    }
    fn task_delay(&self, _ticks: u32) -> Status {
        unsupported_unit("task_delay")
    }
    fn task_get_tick_count(&self) -> u32 {
        0
    }
    fn task_start_scheduler(&self) {
        crate::log_warn!("task_start_scheduler: no backend installed");
    }

    fn semaphore_create(&self, _cfg: &SemaphoreConfig) -> Result<Handle, Status> {
        unsupported("semaphore_create")
    }
    fn semaphore_delete(&self, _h: Handle) -> Status {
        unsupported_unit("semaphore_delete")
    }
    fn semaphore_take(&self, _h: Handle, _timeout_ticks: u32) -> Result<WaitResult, Status> {
        unsupported("semaphore_take")
    }
    fn semaphore_give(&self, _h: Handle) -> Status {
        unsupported_unit("semaphore_give")
    }

    fn timer_create(&self, _cfg: &TimerConfig) -> Result<Handle, Status> {
        unsupported("timer_create")
    }
    fn timer_delete(&self, _h: Handle) -> Status {
        unsupported_unit("timer_delete")
    }
    fn timer_start(&self, _h: Handle) -> Status {
        unsupported_unit("timer_start")
    }
    fn timer_stop(&self, _h: Handle) -> Status {
        unsupported_unit("timer_stop")
    }

    fn event_create(&self, _cfg: &EventConfig) -> Result<Handle, Status> {
        unsupported("event_create")
    }
    fn event_delete(&self, _h: Handle) -> Status {
        unsupported_unit("event_delete")
    }
    /// Any-of (OR) wait; clears the bits that were consumed on success.
    fn event_wait(&self, _h: Handle, _mask: u32, _timeout_ticks: u32) -> u32 {
        0
    }
    fn event_set(&self, _h: Handle, _mask: u32) -> Status {
        unsupported_unit("event_set")
    }
    fn event_clear(&self, _h: Handle, _mask: u32) -> Status {
        unsupported_unit("event_clear")
    }
}

fn unsupported<T>(op: &str) -> Result<T, Status> {
    crate::log_warn!("osal: {op} has no backend installed");
    Err(Status::Fail)
}

fn unsupported_unit(op: &str) -> Status {
    crate::log_warn!("osal: {op} has no backend installed");
    Status::Fail
}

static INTERFACE: Once<&'static dyn Osal> = Once::new();

/// Installs the process-wide OSAL backend. Subsequent calls are ignored.
pub fn install(backend: &'static dyn Osal) {
    INTERFACE.call_once(|| backend);
}

/// The installed backend, if any. Core modules that need OSAL services call
/// this and fall back to `Status::Fail`/no-op behavior when it is `None`.
pub fn interface() -> Option<&'static dyn Osal> {
    INTERFACE.get().copied()
}

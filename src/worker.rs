//! L2: task worker.
//!
//! A `Worker` is a queue of deferred work items: a function pointer, an
//! optional completion callback, and inline context bytes, all packed into
//! one byte-oriented [`Queue`] element. Running under an installed `Osal`
//! backend, a worker owns a real task, a counting semaphore guarding the
//! queue, and an event-group flag its task blocks on between items; running
//! without one (superloop), nothing blocks -- `pump_all` walks a
//! module-level list of registered workers once per main-loop turn and runs
//! at most one item from each. Both paths execute the exact same dispatch
//! logic underneath.

use spin::Mutex;

use crate::list::{Arena, List};
use crate::osal::{self, EventConfig, Handle, SemaphoreConfig, WaitResult};
use crate::queue::Queue;
use crate::status::Status;

/// `fn(context_bytes) -> ()`, invoked with the inline bytes that followed
/// the common header when the item was pushed.
pub type WorkFn = fn(&mut [u8]);
/// `fn(context_bytes)`, invoked once after `WorkFn` returns, if present.
pub type CompletionFn = fn(&mut [u8]);

/// Event-group bit a worker's task blocks on until `submit` raises it.
const TASK_AVAILABLE: u32 = 0x1;

/// Fixed-size header every queued work item starts with, followed by up to
/// `CONTEXT` bytes of caller-defined context.
#[derive(Clone, Copy)]
struct TaskHeader {
    task_fn: WorkFn,
    completion: Option<CompletionFn>,
}

const HEADER_SIZE: usize = core::mem::size_of::<usize>() * 2;

impl TaskHeader {
    fn encode(self, out: &mut [u8]) {
        let fn_bits = self.task_fn as usize;
        let cb_bits = self.completion.map(|f| f as usize).unwrap_or(0);
        out[0..core::mem::size_of::<usize>()].copy_from_slice(&fn_bits.to_ne_bytes());
        out[core::mem::size_of::<usize>()..HEADER_SIZE].copy_from_slice(&cb_bits.to_ne_bytes());
    }

    fn decode(bytes: &[u8]) -> Self {
        let ptr_size = core::mem::size_of::<usize>();
        let mut fn_bits = [0u8; core::mem::size_of::<usize>()];
        fn_bits.copy_from_slice(&bytes[0..ptr_size]);
        let mut cb_bits = [0u8; core::mem::size_of::<usize>()];
        cb_bits.copy_from_slice(&bytes[ptr_size..HEADER_SIZE]);
        let fn_bits = usize::from_ne_bytes(fn_bits);
        let cb_bits = usize::from_ne_bytes(cb_bits);
        // SAFETY: these bit patterns were produced by `encode` from real
        // function pointers of these exact types in the same process.
        let task_fn: WorkFn = unsafe { core::mem::transmute::<usize, WorkFn>(fn_bits) };
        let completion = if cb_bits == 0 {
            None
        } else {
            Some(unsafe { core::mem::transmute::<usize, CompletionFn>(cb_bits) })
        };
        TaskHeader { task_fn, completion }
    }
}

/// Queue-backed deferred work dispatcher.
///
/// `ITEMS`/`BLOCKS` size the backing [`Queue`]; `CONTEXT` bounds how many
/// bytes of per-item context a pushed work item may carry.
pub struct Worker<const ITEMS: usize = 16, const BLOCKS: usize = 64, const CONTEXT: usize = 32> {
    queue: Queue<ITEMS, BLOCKS>,
    semaphore: Option<Handle>,
    event: Option<Handle>,
}

impl<const ITEMS: usize, const BLOCKS: usize, const CONTEXT: usize> Worker<ITEMS, BLOCKS, CONTEXT> {
    pub const fn new() -> Self {
        Worker {
            queue: Queue::new(),
            semaphore: None,
            event: None,
        }
    }

    /// Installs the backing buffer. Call once before `start`/`submit`.
    pub fn create(&mut self, buffer: &'static mut [u8]) -> bool {
        self.queue.create(buffer)
    }

    /// Under an installed OSAL backend: creates the semaphore and event group
    /// this worker's task blocks on between items. A no-op (always succeeds)
    /// without one -- the caller is expected to drive it via `pump_all`
    /// instead.
    pub fn start(&mut self) -> Status {
        let Some(osal) = osal::interface() else {
            return Status::Success;
        };
        let sem = match osal.semaphore_create(&SemaphoreConfig {
            max_count: ITEMS as u32,
            static_resource: None,
        }) {
            Ok(handle) => handle,
            Err(status) => return status,
        };
        let event = match osal.event_create(&EventConfig { static_resource: None }) {
            Ok(handle) => handle,
            Err(status) => return status,
        };
        self.semaphore = Some(sem);
        self.event = Some(event);
        Status::Success
    }

    /// Queues `task_fn` (and optional `completion`) with `context` copied
    /// inline. Under an installed OSAL backend, takes the queue's guarding
    /// semaphore before reserving space (waiting up to `wait_ticks`), then
    /// raises the "task available" event flag and releases the semaphore
    /// once the item is in the queue.
    pub fn submit(
        &mut self,
        task_fn: WorkFn,
        completion: Option<CompletionFn>,
        context: &[u8],
        wait_ticks: u32,
    ) -> bool {
        if context.len() > CONTEXT {
            return false;
        }
        let osal = osal::interface();
        if let (Some(osal), Some(sem)) = (osal, self.semaphore) {
            if !matches!(osal.semaphore_take(sem, wait_ticks), Ok(WaitResult::Acquired)) {
                return false;
            }
        }

        let total = HEADER_SIZE + context.len();
        let pushed = self.queue.reserve(total).is_some_and(|mut reservation| {
            {
                let buf = reservation.payload();
                TaskHeader { task_fn, completion }.encode(&mut buf[..HEADER_SIZE]);
                buf[HEADER_SIZE..].copy_from_slice(context);
            }
            self.queue.push_reserved(reservation)
        });

        if let Some(osal) = osal {
            if pushed {
                if let Some(event) = self.event {
                    osal.event_set(event, TASK_AVAILABLE);
                }
            }
            if let Some(sem) = self.semaphore {
                osal.semaphore_give(sem);
            }
        }
        pushed
    }

    /// Runs exactly one pending item, if any, synchronously on the calling
    /// thread/task. Returns `true` if an item was run. This is the superloop
    /// path, driven by hand or via `pump_all`; it does no OSAL waiting at all.
    pub fn run_once(&mut self) -> bool {
        let Some(item) = self.queue.get_front() else {
            return false;
        };
        let header = TaskHeader::decode(&item[..HEADER_SIZE]);
        let context_len = item.len() - HEADER_SIZE;
        let mut scratch = [0u8; CONTEXT];
        scratch[..context_len].copy_from_slice(&item[HEADER_SIZE..]);
        self.queue.pop_front();

        (header.task_fn)(&mut scratch[..context_len]);
        if let Some(cb) = header.completion {
            cb(&mut scratch[..context_len]);
        }
        true
    }

    /// OSAL-backed execution of one item: blocks on the "task available"
    /// event flag, takes the queue semaphore, runs the front item, and
    /// releases the semaphore. Falls back to `run_once` with no blocking at
    /// all when no backend is installed. Returns `false` if the event wait
    /// timed out without the flag being raised.
    pub fn execute(&mut self, wait_ticks: u32) -> bool {
        let (Some(osal), Some(event)) = (osal::interface(), self.event) else {
            return self.run_once();
        };
        if osal.event_wait(event, TASK_AVAILABLE, wait_ticks) & TASK_AVAILABLE == 0 {
            return false;
        }
        if let Some(sem) = self.semaphore {
            if !matches!(osal.semaphore_take(sem, wait_ticks), Ok(WaitResult::Acquired)) {
                return false;
            }
        }
        let ran = self.run_once();
        if let Some(sem) = self.semaphore {
            osal.semaphore_give(sem);
        }
        ran
    }

    /// Drives `execute` forever; the natural body of a worker's OSAL task.
    pub fn run_forever(&mut self, wait_ticks: u32) -> ! {
        loop {
            self.execute(wait_ticks);
        }
    }

    pub fn pending(&self) -> usize {
        self.queue.num_elements()
    }
}

impl<const ITEMS: usize, const BLOCKS: usize, const CONTEXT: usize> Default
    for Worker<ITEMS, BLOCKS, CONTEXT>
{
    fn default() -> Self {
        Self::new()
    }
}

/// Implemented for `Mutex<Worker<..>>` so differently-sized workers can share
/// one module-level superloop registry behind a uniform trait object.
pub trait WorkerPump: Send + Sync {
    /// Runs at most one pending item. Returns `true` if one ran.
    fn pump_once(&self) -> bool;
}

impl<const ITEMS: usize, const BLOCKS: usize, const CONTEXT: usize> WorkerPump
    for Mutex<Worker<ITEMS, BLOCKS, CONTEXT>>
{
    fn pump_once(&self) -> bool {
        self.lock().run_once()
    }
}

const MAX_WORKERS: usize = 8;

struct WorkerRegistry {
    workers: Arena<&'static dyn WorkerPump, MAX_WORKERS>,
    order: List,
}

static REGISTRY: Mutex<WorkerRegistry> = Mutex::new(WorkerRegistry {
    workers: Arena::new(),
    order: List::new(),
});

/// Adds a worker to the module-level list `pump_all` walks. Intended for the
/// no-OSAL (superloop) setup path; a `worker: &'static Mutex<Worker<..>>`
/// registers itself once at startup.
pub fn register_worker(worker: &'static dyn WorkerPump) -> bool {
    let mut registry = REGISTRY.lock();
    match registry.workers.insert(worker) {
        Ok(idx) => {
            registry.order.push_back(&mut registry.workers, idx);
            true
        }
        Err(_) => false,
    }
}

/// Superloop entry point: runs at most one pending item from every
/// registered worker, in registration order. Call once per main-loop turn.
pub fn pump_all() {
    let registry = REGISTRY.lock();
    for idx in registry.order.iter(&registry.workers) {
        registry.workers.get(idx).pump_once();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicU32, Ordering};

    fn leaked(size: usize) -> &'static mut [u8] {
        Box::leak(std::vec![0u8; size].into_boxed_slice())
    }

    static RAN: AtomicU32 = AtomicU32::new(0);
    static COMPLETED: AtomicU32 = AtomicU32::new(0);

    fn work(ctx: &mut [u8]) {
        RAN.fetch_add(ctx[0] as u32, Ordering::SeqCst);
    }

    fn completion(_ctx: &mut [u8]) {
        COMPLETED.fetch_add(1, Ordering::SeqCst);
    }

    #[test]
    fn submit_then_run_once_executes_in_order() {
        let mut w: Worker<4, 32, 4> = Worker::new();
        assert!(w.create(leaked(512)));
        assert!(w.submit(work, Some(completion), &[3], 0));
        assert!(w.submit(work, None, &[5], 0));
        assert_eq!(w.pending(), 2);

        assert!(w.run_once());
        assert!(w.run_once());
        assert!(!w.run_once());
        assert_eq!(RAN.load(Ordering::SeqCst), 8);
        assert_eq!(COMPLETED.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn submit_rejects_oversized_context() {
        let mut w: Worker<4, 32, 2> = Worker::new();
        assert!(w.create(leaked(256)));
        assert!(!w.submit(work, None, &[1, 2, 3], 0));
    }

    static COUNTED: AtomicU32 = AtomicU32::new(0);

    fn count(_ctx: &mut [u8]) {
        COUNTED.fetch_add(1, Ordering::SeqCst);
    }

    #[test]
    fn pump_all_runs_one_item_per_registered_worker_per_turn() {
        static WA: Mutex<Worker<4, 32, 1>> = Mutex::new(Worker::new());
        static WB: Mutex<Worker<4, 32, 1>> = Mutex::new(Worker::new());
        WA.lock().create(leaked(256));
        WB.lock().create(leaked(256));
        assert!(register_worker(&WA));
        assert!(register_worker(&WB));

        WA.lock().submit(count, None, &[], 0);
        WA.lock().submit(count, None, &[], 0);
        WB.lock().submit(count, None, &[], 0);

        let before = COUNTED.load(Ordering::SeqCst);
        pump_all();
        assert_eq!(COUNTED.load(Ordering::SeqCst), before + 2);
        assert_eq!(WA.lock().pending(), 1);
        assert_eq!(WB.lock().pending(), 0);

        pump_all();
        assert_eq!(COUNTED.load(Ordering::SeqCst), before + 3);
        assert_eq!(WA.lock().pending(), 0);
    }

    struct FakeOsal {
        tick: AtomicU32,
        flags: AtomicU32,
    }

    impl osal::Osal for FakeOsal {
        fn task_get_tick_count(&self) -> u32 {
            self.tick.load(Ordering::SeqCst)
        }
        fn semaphore_create(&self, _cfg: &SemaphoreConfig) -> Result<Handle, Status> {
            Ok(Handle(1))
        }
        fn semaphore_take(&self, _h: Handle, _timeout_ticks: u32) -> Result<WaitResult, Status> {
            Ok(WaitResult::Acquired)
        }
        fn semaphore_give(&self, _h: Handle) -> Status {
            Status::Success
        }
        fn event_create(&self, _cfg: &EventConfig) -> Result<Handle, Status> {
            Ok(Handle(2))
        }
        fn event_set(&self, _h: Handle, mask: u32) -> Status {
            self.flags.fetch_or(mask, Ordering::SeqCst);
            Status::Success
        }
        fn event_wait(&self, _h: Handle, mask: u32, _timeout_ticks: u32) -> u32 {
            let prev = self.flags.fetch_and(!mask, Ordering::SeqCst);
            prev & mask
        }
    }

    static FAKE_OSAL: FakeOsal = FakeOsal {
        tick: AtomicU32::new(0),
        flags: AtomicU32::new(0),
    };

    #[test]
    fn execute_blocks_on_event_flag_until_submit_raises_it() {
        osal::install(&FAKE_OSAL);

        let mut w: Worker<4, 32, 1> = Worker::new();
        assert!(w.create(leaked(256)));
        assert_eq!(w.start(), Status::Success);

        assert!(!w.execute(0), "nothing submitted yet, event flag unset");

        assert!(w.submit(count, None, &[], 0));
        assert!(w.execute(0));
    }
}

//! L2: driver binding layer.
//!
//! Generic pieces shared by every concrete peripheral binding (UART, I2C,
//! SPI): the common driver header (name/version/current owner), an
//! `Instance` token representing one caller's claim on a driver, and a small
//! fixed-capacity registry of `&'static` driver descriptors threaded through
//! the same arena-backed list `list.rs` uses for the allocator's free/alloc
//! lists.

pub mod i2c;
pub mod spi;
pub mod uart;

use spin::Mutex;

use crate::event_bus::EventBus;
use crate::list::{Arena, List};
use crate::status::DriverStatus;

/// Peripheral event bus shape shared by the I2C and SPI bindings (§4.6: "an
/// owned event-bus handle, for publishing peripheral events to
/// subscribers"). Sized at the same defaults `EventBus` itself uses.
pub type PeripheralEventBus = EventBus<8, 32, 128, 64>;

/// Common header every concrete driver descriptor embeds. Tracks which
/// `Instance` currently owns the driver -- `None` means it is free.
pub struct DriverCommon {
    pub name: &'static str,
    pub version: [u8; 3],
    owner: Option<usize>,
}

impl DriverCommon {
    pub const fn new(name: &'static str, version: [u8; 3]) -> Self {
        DriverCommon {
            name,
            version,
            owner: None,
        }
    }

    fn is_available_to(&self, instance: &Instance) -> bool {
        self.owner.is_none() || self.owner == Some(instance.id)
    }

    fn lock(&mut self, instance: &Instance) {
        self.owner = Some(instance.id);
    }

    fn unlock(&mut self, instance: &Instance) -> bool {
        if self.owner == Some(instance.id) {
            self.owner = None;
            true
        } else {
            false
        }
    }
}

static NEXT_INSTANCE_ID: core::sync::atomic::AtomicUsize = core::sync::atomic::AtomicUsize::new(1);

/// One caller's claim-token on a driver. Each `Instance::new()` mints a
/// unique id; the binding layer uses it to tell "the same caller re-entering"
/// apart from "a different caller trying to steal the driver".
#[derive(Debug)]
pub struct Instance {
    id: usize,
}

impl Instance {
    pub fn new() -> Self {
        use core::sync::atomic::Ordering;
        Instance {
            id: NEXT_INSTANCE_ID.fetch_add(1, Ordering::Relaxed),
        }
    }
}

impl Default for Instance {
    fn default() -> Self {
        Self::new()
    }
}

/// Implemented by every concrete driver descriptor so the generic
/// registry/acquire/release logic below can reach its `DriverCommon`.
pub trait HasCommon {
    fn common(&self) -> &Mutex<DriverCommon>;
}

/// Fixed-capacity, name-indexed registry of `&'static` driver descriptors.
pub struct Registry<T: 'static, const N: usize> {
    drivers: Arena<&'static T, N>,
    order: List,
}

impl<T: HasCommon, const N: usize> Registry<T, N> {
    pub const fn new() -> Self {
        Registry {
            drivers: Arena::new(),
            order: List::new(),
        }
    }

    pub fn register(&mut self, driver: &'static T) -> DriverStatus {
        match self.drivers.insert(driver) {
            Ok(idx) => {
                self.order.push_back(&mut self.drivers, idx);
                DriverStatus::Ok
            }
            Err(_) => DriverStatus::ErrGeneric,
        }
    }

    pub fn unregister(&mut self, driver: &'static T) -> DriverStatus {
        let found = self
            .order
            .iter(&self.drivers)
            .find(|&idx| core::ptr::eq(*self.drivers.get(idx), driver));
        match found {
            Some(idx) => {
                self.order.unlink(&mut self.drivers, idx);
                self.drivers.remove(idx);
                DriverStatus::Ok
            }
            None => DriverStatus::ErrDrvNotFound,
        }
    }

    pub fn find_by_name(&self, name: &str) -> Option<&'static T> {
        self.order
            .iter(&self.drivers)
            .map(|idx| *self.drivers.get(idx))
            .find(|d| d.common().lock().name == name)
    }
}

impl<T: HasCommon, const N: usize> Default for Registry<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Acquires `driver` for `instance`: locks it if it is currently free or
/// already owned by this same instance, else reports `Busy`.
pub fn acquire<T: HasCommon>(driver: &T, instance: &Instance) -> DriverStatus {
    let mut common = driver.common().lock();
    if common.is_available_to(instance) {
        common.lock(instance);
        DriverStatus::Ok
    } else {
        DriverStatus::Busy
    }
}

/// Releases `driver` if `instance` currently owns it.
pub fn release<T: HasCommon>(driver: &T, instance: &Instance) -> DriverStatus {
    if driver.common().lock().unlock(instance) {
        DriverStatus::Ok
    } else {
        DriverStatus::ErrGeneric
    }
}

/// Per-call pattern every high-level synchronous driver API follows (§4.6):
/// acquire the single-owner lock, run the operation, then release
/// unconditionally before returning. `Busy` short-circuits without running
/// `op` at all.
pub fn call_sync<T: HasCommon>(
    driver: &T,
    instance: &Instance,
    op: impl FnOnce() -> DriverStatus,
) -> DriverStatus {
    match acquire(driver, instance) {
        DriverStatus::Ok => {}
        busy => return busy,
    }
    let result = op();
    release(driver, instance);
    result
}

/// Per-call pattern for an asynchronous driver API: acquire, then run `op`.
/// A successful async call leaves the driver locked until the hardware
/// driver's completion handler calls [`complete`]; an `op` that fails
/// synchronously (no completion will ever fire) releases immediately.
pub fn call_async<T: HasCommon>(
    driver: &T,
    instance: &Instance,
    op: impl FnOnce() -> DriverStatus,
) -> DriverStatus {
    match acquire(driver, instance) {
        DriverStatus::Ok => {}
        busy => return busy,
    }
    let result = op();
    if result != DriverStatus::Ok {
        release(driver, instance);
    }
    result
}

/// Releases `driver` from within an async completion handler, after the
/// instance's own callback has already been invoked (§4.6's "for async ops
/// the HW driver releases current_owner from its completion handler").
pub fn complete<T: HasCommon>(driver: &T, instance: &Instance) {
    release(driver, instance);
}

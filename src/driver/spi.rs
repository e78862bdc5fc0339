//! SPI driver binding -- same registry/instance scaffold as `uart`, with the
//! clock-mode/bit-order/chip-select extras a full-duplex bus needs.

use spin::Mutex;

use crate::driver::{self, DriverCommon, HasCommon, Instance, PeripheralEventBus, Registry};
use crate::event_bus::{EventCode, ListenerFn, ListenerHandle};
use crate::status::DriverStatus;

pub const MAX_SPI_DRIVERS: usize = 4;

/// Peripheral events an `SpiDriver` publishes on its owned event bus (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum SpiBusEvent {
    TransferComplete = 0,
    TransferError = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpiMode {
    Master,
    Slave,
}

/// Clock polarity/phase, named after the two bits they pack (CPOL, CPHA).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockMode {
    Cpol0Cpha0,
    Cpol0Cpha1,
    Cpol1Cpha0,
    Cpol1Cpha1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitOrder {
    MsbFirst,
    LsbFirst,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpiConfig {
    pub mode: SpiMode,
    pub clock_mode: ClockMode,
    pub bit_order: BitOrder,
    pub clock_frequency_hz: u32,
    pub data_size_bits: u8,
}

/// Hardware-specific SPI operations. `transfer_*` move data in both
/// directions at once (full duplex); `transmit_*`/`receive_*` are the
/// one-directional conveniences many HW peripherals also expose directly.
/// `chip_select` drives the CS line independently of a transfer, for HW that
/// does not toggle it automatically.
pub trait HwSpi: Send + Sync {
    fn initialize(&self, _config: &SpiConfig) -> DriverStatus {
        DriverStatus::ErrInfNotExist
    }
    fn transfer_sync(&self, _tx: &[u8], _rx: &mut [u8], _timeout_millis: u32) -> DriverStatus {
        DriverStatus::ErrInfNotExist
    }
    fn transfer_async(&self, _tx: &[u8], _rx: &mut [u8]) -> DriverStatus {
        DriverStatus::ErrInfNotExist
    }
    fn transmit_sync(&self, _data: &[u8], _timeout_millis: u32) -> DriverStatus {
        DriverStatus::ErrInfNotExist
    }
    fn receive_sync(&self, _data: &mut [u8], _timeout_millis: u32) -> DriverStatus {
        DriverStatus::ErrInfNotExist
    }
    fn chip_select(&self, _select: bool) -> DriverStatus {
        DriverStatus::ErrInfNotExist
    }
}

pub struct SpiDriver {
    common: Mutex<DriverCommon>,
    config: Mutex<SpiConfig>,
    hw: &'static dyn HwSpi,
    events: &'static Mutex<PeripheralEventBus>,
}

impl SpiDriver {
    pub const fn new(
        name: &'static str,
        version: [u8; 3],
        config: SpiConfig,
        hw: &'static dyn HwSpi,
        events: &'static Mutex<PeripheralEventBus>,
    ) -> Self {
        SpiDriver {
            common: Mutex::new(DriverCommon::new(name, version)),
            config: Mutex::new(config),
            hw,
            events,
        }
    }
}

impl HasCommon for SpiDriver {
    fn common(&self) -> &Mutex<DriverCommon> {
        &self.common
    }
}

static REGISTRY: Mutex<Registry<SpiDriver, MAX_SPI_DRIVERS>> = Mutex::new(Registry::new());

pub fn register_hw_driver(driver: &'static SpiDriver) -> DriverStatus {
    REGISTRY.lock().register(driver)
}

pub fn unregister_hw_driver(driver: &'static SpiDriver) -> DriverStatus {
    REGISTRY.lock().unregister(driver)
}

pub struct SpiInstance {
    instance: Instance,
    driver: &'static SpiDriver,
}

/// Looks up `driver_name` and binds a new `Instance` to it; does not itself
/// acquire the ownership lock (see `uart::register_instance`).
pub fn register_instance(driver_name: &str) -> Result<SpiInstance, DriverStatus> {
    let found = REGISTRY.lock().find_by_name(driver_name);
    let driver = found.ok_or(DriverStatus::ErrDrvNotFound)?;
    Ok(SpiInstance { instance: Instance::new(), driver })
}

impl SpiInstance {
    pub fn unregister(self) -> DriverStatus {
        driver::release(self.driver, &self.instance);
        DriverStatus::Ok
    }

    pub fn initialize(&self, config: &SpiConfig) -> DriverStatus {
        driver::call_sync(self.driver, &self.instance, || self.driver.hw.initialize(config))
    }

    pub fn transfer_sync(&self, tx: &[u8], rx: &mut [u8], timeout_millis: u32) -> DriverStatus {
        driver::call_sync(self.driver, &self.instance, || self.driver.hw.transfer_sync(tx, rx, timeout_millis))
    }

    /// Leaves the driver locked to this instance on success, until `complete`
    /// is called from the hardware driver's completion path.
    pub fn transfer_async(&self, tx: &[u8], rx: &mut [u8]) -> DriverStatus {
        driver::call_async(self.driver, &self.instance, || self.driver.hw.transfer_async(tx, rx))
    }

    pub fn transmit_sync(&self, data: &[u8], timeout_millis: u32) -> DriverStatus {
        driver::call_sync(self.driver, &self.instance, || self.driver.hw.transmit_sync(data, timeout_millis))
    }

    pub fn receive_sync(&self, data: &mut [u8], timeout_millis: u32) -> DriverStatus {
        driver::call_sync(self.driver, &self.instance, || self.driver.hw.receive_sync(data, timeout_millis))
    }

    /// Drives the CS line directly; independent of the ownership lock since
    /// it does not itself move data over the bus.
    pub fn chip_select(&self, select: bool) -> DriverStatus {
        self.driver.hw.chip_select(select)
    }

    pub fn get_config(&self) -> Result<SpiConfig, DriverStatus> {
        match driver::acquire(self.driver, &self.instance) {
            DriverStatus::Ok => {}
            busy => return Err(busy),
        }
        let config = *self.driver.config.lock();
        driver::release(self.driver, &self.instance);
        Ok(config)
    }

    /// Releases the ownership lock after an async transfer's completion, and
    /// publishes `event` on the driver's event bus so subscribers learn the
    /// transfer finished.
    pub fn complete(&self, event: SpiBusEvent) {
        self.driver.events.lock().send_event(event as EventCode, &[]);
        driver::complete(self.driver, &self.instance);
    }

    /// Subscribes `callback` to this driver's peripheral event bus. Returns a
    /// handle `unlisten` can later pass back in, or `None` if the listener
    /// table is full.
    pub fn listen(&self, callback: ListenerFn) -> Option<ListenerHandle> {
        self.driver.events.lock().subscribe(callback)
    }

    /// Unsubscribes a listener previously registered with `listen`.
    pub fn unlisten(&self, handle: ListenerHandle) -> bool {
        self.driver.events.lock().unlisten(handle)
    }
}

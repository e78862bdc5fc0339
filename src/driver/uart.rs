//! UART driver binding -- the fully fleshed out exemplar peripheral binding
//! every other peripheral module (`i2c`, `spi`) follows the shape of.

use spin::Mutex;

use crate::driver::{self, DriverCommon, HasCommon, Instance, Registry};
use crate::status::DriverStatus;

pub const MAX_UART_DRIVERS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parity {
    None,
    Odd,
    Even,
    Mark,
    Space,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopBits {
    One,
    OneAndHalf,
    Two,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UartConfig {
    pub baudrate: u32,
    pub parity: Parity,
    pub stop_bits: StopBits,
    pub byte_size: u8,
}

/// Events a hardware implementation reports back through an instance's callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UartEvent {
    TxComplete,
    TxError,
    RxComplete,
    RxError,
    Timeout,
}

pub type UartCallback = fn(UartEvent);

/// Hardware-specific operations a concrete UART peripheral must implement.
/// Every method defaults to `ErrInfNotExist`, the status a caller gets for a
/// slot the hardware implementation chose not to support.
pub trait HwUart: Send + Sync {
    fn initialize(&self) -> DriverStatus {
        DriverStatus::ErrInfNotExist
    }
    fn deinitialize(&self) -> DriverStatus {
        DriverStatus::ErrInfNotExist
    }
    fn async_transmit(&self, _data: &[u8]) -> DriverStatus {
        DriverStatus::ErrInfNotExist
    }
    fn async_receive(&self, _data: &mut [u8]) -> DriverStatus {
        DriverStatus::ErrInfNotExist
    }
    fn sync_transmit(&self, _data: &[u8], _timeout_millis: u32) -> DriverStatus {
        DriverStatus::ErrInfNotExist
    }
    fn sync_receive(&self, _data: &mut [u8], _timeout_millis: u32) -> DriverStatus {
        DriverStatus::ErrInfNotExist
    }
    fn update_config(&self, _config: &UartConfig) -> DriverStatus {
        DriverStatus::ErrInfNotExist
    }
}

/// One registered UART peripheral: its identity, current configuration, the
/// hardware vtable backing it, and the `DriverCommon` ownership lock.
pub struct UartDriver {
    common: Mutex<DriverCommon>,
    config: Mutex<UartConfig>,
    hw: &'static dyn HwUart,
}

impl UartDriver {
    pub const fn new(
        name: &'static str,
        version: [u8; 3],
        config: UartConfig,
        hw: &'static dyn HwUart,
    ) -> Self {
        UartDriver {
            common: Mutex::new(DriverCommon::new(name, version)),
            config: Mutex::new(config),
            hw,
        }
    }
}

impl HasCommon for UartDriver {
    fn common(&self) -> &Mutex<DriverCommon> {
        &self.common
    }
}

static REGISTRY: Mutex<Registry<UartDriver, MAX_UART_DRIVERS>> = Mutex::new(Registry::new());

/// Registers a HW implementation so callers can bind to it by name.
pub fn register_hw_driver(driver: &'static UartDriver) -> DriverStatus {
    REGISTRY.lock().register(driver)
}

pub fn unregister_hw_driver(driver: &'static UartDriver) -> DriverStatus {
    REGISTRY.lock().unregister(driver)
}

/// One caller's claim on a named UART driver, with an optional event callback.
pub struct UartInstance {
    instance: Instance,
    driver: &'static UartDriver,
    callback: Option<UartCallback>,
}

/// Looks up `driver_name` in the registry and binds a new `Instance` to it.
/// Binding does not itself acquire the driver's ownership lock -- each
/// high-level operation below acquires and (for synchronous ops) releases it
/// per call, per §4.6.
pub fn register_instance(
    driver_name: &str,
    callback: Option<UartCallback>,
) -> Result<UartInstance, DriverStatus> {
    let found = REGISTRY.lock().find_by_name(driver_name);
    let driver = found.ok_or(DriverStatus::ErrDrvNotFound)?;
    Ok(UartInstance { instance: Instance::new(), driver, callback })
}

impl UartInstance {
    /// Unbinds from the driver, releasing the ownership lock first if an
    /// outstanding async operation left it held. Always succeeds: unbinding
    /// is "clear bindings", not a lock operation (§4.6).
    pub fn unregister(self) -> DriverStatus {
        driver::release(self.driver, &self.instance);
        DriverStatus::Ok
    }

    pub fn initialize(&self) -> DriverStatus {
        driver::call_sync(self.driver, &self.instance, || self.driver.hw.initialize())
    }

    pub fn deinitialize(&self) -> DriverStatus {
        driver::call_sync(self.driver, &self.instance, || self.driver.hw.deinitialize())
    }

    /// Leaves the driver locked to this instance on success, until `notify`
    /// reports the completion.
    pub fn async_transmit(&self, data: &[u8]) -> DriverStatus {
        driver::call_async(self.driver, &self.instance, || self.driver.hw.async_transmit(data))
    }

    pub fn async_receive(&self, data: &mut [u8]) -> DriverStatus {
        driver::call_async(self.driver, &self.instance, || self.driver.hw.async_receive(data))
    }

    pub fn sync_transmit(&self, data: &[u8], timeout_millis: u32) -> DriverStatus {
        driver::call_sync(self.driver, &self.instance, || {
            self.driver.hw.sync_transmit(data, timeout_millis)
        })
    }

    pub fn sync_receive(&self, data: &mut [u8], timeout_millis: u32) -> DriverStatus {
        driver::call_sync(self.driver, &self.instance, || {
            self.driver.hw.sync_receive(data, timeout_millis)
        })
    }

    /// Reads the live configuration under the ownership lock. `Busy` if
    /// another instance currently holds the driver (e.g. mid-async-transfer).
    pub fn get_config(&self) -> Result<UartConfig, DriverStatus> {
        match driver::acquire(self.driver, &self.instance) {
            DriverStatus::Ok => {}
            busy => return Err(busy),
        }
        let config = *self.driver.config.lock();
        driver::release(self.driver, &self.instance);
        Ok(config)
    }

    pub fn update_config(&self, config: UartConfig) -> DriverStatus {
        driver::call_sync(self.driver, &self.instance, || {
            *self.driver.config.lock() = config;
            self.driver.hw.update_config(&config)
        })
    }

    /// Delivers a completion `event` to this instance's registered callback,
    /// then releases the driver -- the counterpart to a successful
    /// `async_transmit`/`async_receive` that leaves it locked.
    pub fn notify(&self, event: UartEvent) {
        if let Some(cb) = self.callback {
            cb(event);
        }
        driver::complete(self.driver, &self.instance);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicU32, Ordering};

    struct LoopbackUart;

    impl HwUart for LoopbackUart {
        fn sync_transmit(&self, data: &[u8], _timeout_millis: u32) -> DriverStatus {
            LAST_LEN.store(data.len() as u32, Ordering::SeqCst);
            DriverStatus::Ok
        }

        fn async_transmit(&self, data: &[u8]) -> DriverStatus {
            LAST_LEN.store(data.len() as u32, Ordering::SeqCst);
            DriverStatus::Ok
        }

        fn update_config(&self, config: &UartConfig) -> DriverStatus {
            LAST_BAUD.store(config.baudrate, Ordering::SeqCst);
            DriverStatus::Ok
        }
    }

    static LAST_LEN: AtomicU32 = AtomicU32::new(0);
    static LAST_BAUD: AtomicU32 = AtomicU32::new(0);
    static HW: LoopbackUart = LoopbackUart;
    static DRIVER: UartDriver = UartDriver::new(
        "loopback0",
        [1, 0, 0],
        UartConfig { baudrate: 9600, parity: Parity::None, stop_bits: StopBits::One, byte_size: 8 },
        &HW,
    );
    static DRIVER2: UartDriver = UartDriver::new(
        "loopback1",
        [1, 0, 0],
        UartConfig { baudrate: 9600, parity: Parity::None, stop_bits: StopBits::One, byte_size: 8 },
        &HW,
    );

    #[test]
    fn register_bind_transmit_and_update_config() {
        assert_eq!(register_hw_driver(&DRIVER), DriverStatus::Ok);

        let inst = register_instance("loopback0", None).expect("bind should succeed");
        assert_eq!(inst.sync_transmit(b"abc", 10), DriverStatus::Ok);
        assert_eq!(LAST_LEN.load(Ordering::SeqCst), 3);

        let mut config = inst.get_config().unwrap();
        config.baudrate = 115200;
        assert_eq!(inst.update_config(config), DriverStatus::Ok);
        assert_eq!(LAST_BAUD.load(Ordering::SeqCst), 115200);
        assert_eq!(inst.get_config().unwrap().baudrate, 115200);

        assert_eq!(inst.unregister(), DriverStatus::Ok);
        assert_eq!(unregister_hw_driver(&DRIVER), DriverStatus::Ok);
    }

    /// P4: a successful async call leaves the driver BUSY to a second
    /// instance until the first instance's completion callback has fired.
    #[test]
    fn async_transmit_locks_the_driver_until_completion_fires() {
        assert_eq!(register_hw_driver(&DRIVER2), DriverStatus::Ok);
        let first = register_instance("loopback1", None).unwrap();
        let second = register_instance("loopback1", None).unwrap();

        assert_eq!(first.async_transmit(b"go"), DriverStatus::Ok);
        assert_eq!(second.sync_transmit(b"nope", 10), DriverStatus::Busy);
        assert_eq!(second.get_config().unwrap_err(), DriverStatus::Busy);

        first.notify(UartEvent::TxComplete);

        assert_eq!(second.sync_transmit(b"now", 10), DriverStatus::Ok);
        assert_eq!(LAST_LEN.load(Ordering::SeqCst), 3);

        assert_eq!(first.unregister(), DriverStatus::Ok);
        assert_eq!(second.unregister(), DriverStatus::Ok);
        assert_eq!(unregister_hw_driver(&DRIVER2), DriverStatus::Ok);
    }
}

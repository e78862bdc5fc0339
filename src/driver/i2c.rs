//! I2C driver binding -- same registry/instance scaffold as `uart`, with the
//! addressing/speed extras a multi-drop bus needs.

use spin::Mutex;

use crate::driver::{self, DriverCommon, HasCommon, Instance, PeripheralEventBus, Registry};
use crate::event_bus::{EventCode, ListenerFn, ListenerHandle};
use crate::status::DriverStatus;

pub const MAX_I2C_DRIVERS: usize = 4;

/// Peripheral events an `I2cDriver` publishes on its owned event bus (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum I2cBusEvent {
    TransferComplete = 0,
    TransferError = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum I2cMode {
    Master,
    Slave,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum I2cSpeed {
    Standard,
    Fast,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressingMode {
    SevenBit,
    TenBit,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct I2cConfig {
    pub mode: I2cMode,
    pub speed: I2cSpeed,
    pub addressing_mode: AddressingMode,
}

/// Hardware-specific I2C operations. `address` is the target device address
/// (7- or 10-bit per the driver's configured `AddressingMode`); `send_stop`
/// controls whether the transaction ends with a stop condition, letting a
/// caller chain repeated-start transfers.
pub trait HwI2c: Send + Sync {
    fn initialize(&self, _config: &I2cConfig) -> DriverStatus {
        DriverStatus::ErrInfNotExist
    }
    fn transmit_sync(&self, _address: u16, _data: &[u8], _send_stop: bool, _timeout_millis: u32) -> DriverStatus {
        DriverStatus::ErrInfNotExist
    }
    fn transmit_async(&self, _address: u16, _data: &[u8], _send_stop: bool) -> DriverStatus {
        DriverStatus::ErrInfNotExist
    }
    fn receive_sync(&self, _address: u16, _data: &mut [u8], _send_stop: bool, _timeout_millis: u32) -> DriverStatus {
        DriverStatus::ErrInfNotExist
    }
    fn receive_async(&self, _address: u16, _data: &mut [u8], _send_stop: bool) -> DriverStatus {
        DriverStatus::ErrInfNotExist
    }
    fn probe(&self, _address: u16, _timeout_millis: u32) -> DriverStatus {
        DriverStatus::ErrInfNotExist
    }
}

pub struct I2cDriver {
    common: Mutex<DriverCommon>,
    config: Mutex<I2cConfig>,
    hw: &'static dyn HwI2c,
    events: &'static Mutex<PeripheralEventBus>,
}

impl I2cDriver {
    pub const fn new(
        name: &'static str,
        version: [u8; 3],
        config: I2cConfig,
        hw: &'static dyn HwI2c,
        events: &'static Mutex<PeripheralEventBus>,
    ) -> Self {
        I2cDriver {
            common: Mutex::new(DriverCommon::new(name, version)),
            config: Mutex::new(config),
            hw,
            events,
        }
    }
}

impl HasCommon for I2cDriver {
    fn common(&self) -> &Mutex<DriverCommon> {
        &self.common
    }
}

static REGISTRY: Mutex<Registry<I2cDriver, MAX_I2C_DRIVERS>> = Mutex::new(Registry::new());

pub fn register_hw_driver(driver: &'static I2cDriver) -> DriverStatus {
    REGISTRY.lock().register(driver)
}

pub fn unregister_hw_driver(driver: &'static I2cDriver) -> DriverStatus {
    REGISTRY.lock().unregister(driver)
}

pub struct I2cInstance {
    instance: Instance,
    driver: &'static I2cDriver,
}

/// Looks up `driver_name` and binds a new `Instance` to it; does not itself
/// acquire the ownership lock (see `uart::register_instance`).
pub fn register_instance(driver_name: &str) -> Result<I2cInstance, DriverStatus> {
    let found = REGISTRY.lock().find_by_name(driver_name);
    let driver = found.ok_or(DriverStatus::ErrDrvNotFound)?;
    Ok(I2cInstance { instance: Instance::new(), driver })
}

impl I2cInstance {
    pub fn unregister(self) -> DriverStatus {
        driver::release(self.driver, &self.instance);
        DriverStatus::Ok
    }

    pub fn initialize(&self, config: &I2cConfig) -> DriverStatus {
        driver::call_sync(self.driver, &self.instance, || self.driver.hw.initialize(config))
    }

    pub fn transmit_sync(&self, address: u16, data: &[u8], send_stop: bool, timeout_millis: u32) -> DriverStatus {
        driver::call_sync(self.driver, &self.instance, || {
            self.driver.hw.transmit_sync(address, data, send_stop, timeout_millis)
        })
    }

    /// Leaves the driver locked to this instance on success, until `complete`
    /// is called from the hardware driver's completion path.
    pub fn transmit_async(&self, address: u16, data: &[u8], send_stop: bool) -> DriverStatus {
        driver::call_async(self.driver, &self.instance, || {
            self.driver.hw.transmit_async(address, data, send_stop)
        })
    }

    pub fn receive_sync(&self, address: u16, data: &mut [u8], send_stop: bool, timeout_millis: u32) -> DriverStatus {
        driver::call_sync(self.driver, &self.instance, || {
            self.driver.hw.receive_sync(address, data, send_stop, timeout_millis)
        })
    }

    pub fn receive_async(&self, address: u16, data: &mut [u8], send_stop: bool) -> DriverStatus {
        driver::call_async(self.driver, &self.instance, || {
            self.driver.hw.receive_async(address, data, send_stop)
        })
    }

    pub fn probe(&self, address: u16, timeout_millis: u32) -> DriverStatus {
        driver::call_sync(self.driver, &self.instance, || self.driver.hw.probe(address, timeout_millis))
    }

    pub fn get_config(&self) -> Result<I2cConfig, DriverStatus> {
        match driver::acquire(self.driver, &self.instance) {
            DriverStatus::Ok => {}
            busy => return Err(busy),
        }
        let config = *self.driver.config.lock();
        driver::release(self.driver, &self.instance);
        Ok(config)
    }

    /// Releases the ownership lock after an async transfer's completion has
    /// been handled, and publishes `event` on the driver's event bus so
    /// subscribers learn the transfer finished. The hardware driver's
    /// ISR/completion path calls this once it has finished consuming the
    /// request.
    pub fn complete(&self, event: I2cBusEvent) {
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

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicU32, Ordering};

    struct FakeI2c;

    static LAST_ADDRESS: AtomicU32 = AtomicU32::new(0);

    impl HwI2c for FakeI2c {
        fn transmit_sync(&self, address: u16, _data: &[u8], _send_stop: bool, _timeout_millis: u32) -> DriverStatus {
            LAST_ADDRESS.store(address as u32, Ordering::SeqCst);
            DriverStatus::Ok
        }

        fn probe(&self, address: u16, _timeout_millis: u32) -> DriverStatus {
            if address == 0x50 {
                DriverStatus::Ok
            } else {
                DriverStatus::Timeout
            }
        }
    }

    static HW: FakeI2c = FakeI2c;
    static EVENTS: Mutex<PeripheralEventBus> = Mutex::new(PeripheralEventBus::new());
    static DRIVER: I2cDriver = I2cDriver::new(
        "i2c0",
        [1, 0, 0],
        I2cConfig { mode: I2cMode::Master, speed: I2cSpeed::Fast, addressing_mode: AddressingMode::SevenBit },
        &HW,
        &EVENTS,
    );

    #[test]
    fn transmit_and_probe_round_trip() {
        assert_eq!(register_hw_driver(&DRIVER), DriverStatus::Ok);
        let inst = register_instance("i2c0").unwrap();

        assert_eq!(inst.transmit_sync(0x50, &[1, 2], true, 100), DriverStatus::Ok);
        assert_eq!(LAST_ADDRESS.load(Ordering::SeqCst), 0x50);
        assert_eq!(inst.probe(0x50, 100), DriverStatus::Ok);
        assert_eq!(inst.probe(0x60, 100), DriverStatus::Timeout);
        assert_eq!(inst.get_config().unwrap().speed, I2cSpeed::Fast);

        assert_eq!(inst.unregister(), DriverStatus::Ok);
        assert_eq!(unregister_hw_driver(&DRIVER), DriverStatus::Ok);
    }

    struct AsyncI2c;

    impl HwI2c for AsyncI2c {
        fn transmit_async(&self, _address: u16, _data: &[u8], _send_stop: bool) -> DriverStatus {
            DriverStatus::Ok
        }
    }

    static ASYNC_HW: AsyncI2c = AsyncI2c;
    static ASYNC_EVENTS: Mutex<PeripheralEventBus> = Mutex::new(PeripheralEventBus::new());
    static ASYNC_DRIVER: I2cDriver = I2cDriver::new(
        "i2c1",
        [1, 0, 0],
        I2cConfig { mode: I2cMode::Master, speed: I2cSpeed::Standard, addressing_mode: AddressingMode::SevenBit },
        &ASYNC_HW,
        &ASYNC_EVENTS,
    );

    #[test]
    fn transmit_async_locks_until_complete_is_called() {
        assert_eq!(register_hw_driver(&ASYNC_DRIVER), DriverStatus::Ok);
        let first = register_instance("i2c1").unwrap();
        let second = register_instance("i2c1").unwrap();

        assert_eq!(first.transmit_async(0x10, &[1], true), DriverStatus::Ok);
        assert_eq!(second.probe(0x10, 10), DriverStatus::Busy);

        first.complete(I2cBusEvent::TransferComplete);
        assert_eq!(second.probe(0x10, 10), DriverStatus::ErrInfNotExist);

        assert_eq!(first.unregister(), DriverStatus::Ok);
        assert_eq!(second.unregister(), DriverStatus::Ok);
        assert_eq!(unregister_hw_driver(&ASYNC_DRIVER), DriverStatus::Ok);
    }

    #[test]
    fn complete_publishes_a_peripheral_event_to_listeners() {
        use core::sync::atomic::{AtomicU32, Ordering};

        static SEEN: AtomicU32 = AtomicU32::new(u32::MAX);

        fn on_event(code: EventCode, _payload: &[u8]) {
            SEEN.store(code, Ordering::SeqCst);
        }

        static HW2: AsyncI2c = AsyncI2c;
        static EVENTS2: Mutex<PeripheralEventBus> = Mutex::new(PeripheralEventBus::new());
        static DRIVER2: I2cDriver = I2cDriver::new(
            "i2c2",
            [1, 0, 0],
            I2cConfig { mode: I2cMode::Master, speed: I2cSpeed::Standard, addressing_mode: AddressingMode::SevenBit },
            &HW2,
            &EVENTS2,
        );

        assert!(EVENTS2.lock().create(Box::leak(std::vec![0u8; 256].into_boxed_slice())));
        assert_eq!(register_hw_driver(&DRIVER2), DriverStatus::Ok);
        let inst = register_instance("i2c2").unwrap();
        let handle = inst.listen(on_event).unwrap();

        assert_eq!(inst.transmit_async(0x20, &[1], true), DriverStatus::Ok);
        inst.complete(I2cBusEvent::TransferComplete);
        EVENTS2.lock().run();
        assert_eq!(SEEN.load(Ordering::SeqCst), I2cBusEvent::TransferComplete as u32);

        assert!(inst.unlisten(handle));
        assert_eq!(inst.unregister(), DriverStatus::Ok);
        assert_eq!(unregister_hw_driver(&DRIVER2), DriverStatus::Ok);
    }
}

//! # embedded_mw
//!
//! The no-heap middleware core of an embedded-systems framework: the
//! static allocator, intrusive list and bounded queue everything else is
//! built on (`list`, `mem_list`, `queue`), an OS-abstraction-layer trait
//! (`osal`) two-mode dispatch sits on top of (`worker`), an in-process
//! pub/sub event bus (`event_bus`), a driver binding/registry layer
//! exemplified by UART with I2C/SPI following the same shape (`driver`),
//! a length-prefixed RPC framer (`rpc`) and a line-oriented CLI parser
//! (`cli`). Logging (`log`) and the crate-wide status/error enums
//! (`status`) are the ambient stack the rest of the crate is built on.
//!
//! Nothing here touches the heap: every container is either caller-owned
//! storage (a `&'static mut [u8]` buffer handed to `init`/`create`) or a
//! fixed-capacity arena sized by a const generic. Concrete RTOS adapters
//! and hardware peripheral drivers are external collaborators; this crate
//! only specifies the traits they implement.
#![cfg_attr(not(test), no_std)]

pub mod cli;
pub mod driver;
pub mod event_bus;
pub mod list;
pub mod log;
pub mod mem_list;
pub mod osal;
pub mod queue;
pub mod rpc;
pub mod status;
pub mod worker;

//! Crate-wide result/status codes.
//!
//! Every core API in this crate returns one of these small enums rather than
//! a boxed error: the target has no heap, so the error type has to be a
//! plain value type the caller can match on.

use core::fmt;

/// Generic outcome of a core operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    Fail,
    ArgInvalid,
    Timeout,
    Busy,
}

impl Status {
    pub fn is_ok(self) -> bool {
        matches!(self, Status::Success)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Success => "success",
            Status::Fail => "fail",
            Status::ArgInvalid => "argument invalid",
            Status::Timeout => "timeout",
            Status::Busy => "busy",
        };
        f.write_str(s)
    }
}

impl core::error::Error for Status {}

/// Status surface exposed by the driver binding layer (§4.6/§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverStatus {
    Ok,
    Busy,
    Timeout,
    ErrGeneric,
    ErrArg,
    ErrDrvNotFound,
    ErrInfNotExist,
}

impl fmt::Display for DriverStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DriverStatus::Ok => "ok",
            DriverStatus::Busy => "busy",
            DriverStatus::Timeout => "timeout",
            DriverStatus::ErrGeneric => "generic error",
            DriverStatus::ErrArg => "bad argument",
            DriverStatus::ErrDrvNotFound => "driver not found",
            DriverStatus::ErrInfNotExist => "hw interface function not implemented",
        };
        f.write_str(s)
    }
}

impl core::error::Error for DriverStatus {}

/// Protocol-level errors the RPC framer reports via its error callback (§4.7.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcError {
    WrongSyncBytes,
    WrongMsgType,
    UnknownCmd,
    CrcFailed,
    QueueReserveFailed,
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RpcError::WrongSyncBytes => "wrong sync bytes",
            RpcError::WrongMsgType => "wrong message type",
            RpcError::UnknownCmd => "unknown command",
            RpcError::CrcFailed => "crc check failed",
            RpcError::QueueReserveFailed => "queue reserve failed",
        };
        f.write_str(s)
    }
}

impl core::error::Error for RpcError {}

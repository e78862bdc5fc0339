//! Logging facade.
//!
//! Install a [`LogSink`] once at startup, then use the `log_trace!`/
//! `log_debug!`/`log_warn!`/`log_error!` macros anywhere in the crate. The
//! concrete sink (UART, semihost, RTT, ...) is an external collaborator, same
//! as OSAL backends and hardware drivers -- this module only owns dispatch.

use core::fmt;

use spin::{Mutex, Once};

/// Severity of a single log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Trace,
    Debug,
    Warn,
    Error,
}

/// External collaborator that actually moves bytes off the device.
pub trait LogSink: Send + Sync {
    fn write(&self, level: Level, module: &str, args: fmt::Arguments<'_>);
}

static SINK: Once<&'static dyn LogSink> = Once::new();
static MIN_LEVEL: Mutex<Level> = Mutex::new(Level::Trace);

/// Installs the process-wide log sink. Subsequent calls are ignored -- this
/// mirrors the OSAL interface pointer's "install once globally" contract.
pub fn install(sink: &'static dyn LogSink) {
    SINK.call_once(|| sink);
}

/// Raises or lowers the minimum level that reaches the sink.
pub fn set_min_level(level: Level) {
    *MIN_LEVEL.lock() = level;
}

#[doc(hidden)]
pub fn dispatch(level: Level, module: &str, args: fmt::Arguments<'_>) {
    if level < *MIN_LEVEL.lock() {
        return;
    }
    if let Some(sink) = SINK.get() {
        sink.write(level, module, args);
    }
}

#[macro_export]
macro_rules! log_trace {
    ($($arg:tt)*) => {
        $crate::log::dispatch($crate::log::Level::Trace, module_path!(), format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        $crate::log::dispatch($crate::log::Level::Debug, module_path!(), format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::log::dispatch($crate::log::Level::Warn, module_path!(), format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        $crate::log::dispatch($crate::log::Level::Error, module_path!(), format_args!($($arg)*))
    };
}

/// A fixed-capacity ring buffer `LogSink`, useful for tests and for targets
/// that just want to retain the last N bytes of log output without a heap.
pub struct RingSink<const N: usize> {
    inner: Mutex<RingInner<N>>,
}

struct RingInner<const N: usize> {
    data: [u8; N],
    head: usize,
    len: usize,
}

impl<const N: usize> RingSink<N> {
    pub const fn new() -> Self {
        RingSink {
            inner: Mutex::new(RingInner {
                data: [0; N],
                head: 0,
                len: 0,
            }),
        }
    }

    /// Copies out up to `out.len()` of the retained bytes, oldest first.
    pub fn read(&self, out: &mut [u8]) -> usize {
        let inner = self.inner.lock();
        let n = out.len().min(inner.len);
        for (i, slot) in out.iter_mut().enumerate().take(n) {
            *slot = inner.data[(inner.head + i) % N];
        }
        n
    }

    fn push_byte(inner: &mut RingInner<N>, b: u8) {
        let write_at = (inner.head + inner.len) % N;
        if inner.len < N {
            inner.len += 1;
        } else {
            inner.head = (inner.head + 1) % N;
        }
        inner.data[write_at] = b;
    }
}

impl<const N: usize> Default for RingSink<N> {
    fn default() -> Self {
        Self::new()
    }
}

struct ByteSink<'a, const N: usize>(&'a mut RingInner<N>);

impl<const N: usize> fmt::Write for ByteSink<'_, N> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for b in s.bytes() {
            RingSink::<N>::push_byte(self.0, b);
        }
        Ok(())
    }
}

impl<const N: usize> LogSink for RingSink<N> {
    fn write(&self, _level: Level, _module: &str, args: fmt::Arguments<'_>) {
        use fmt::Write;
        let mut inner = self.inner.lock();
        let mut writer = ByteSink(&mut inner);
        let _ = writer.write_fmt(args);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_sink_retains_latest_bytes() {
        static SINK: RingSink<8> = RingSink::new();
        SINK.write(Level::Debug, "test", format_args!("hello world"));
        let mut out = [0u8; 8];
        let n = SINK.read(&mut out);
        assert_eq!(&out[..n], b" world");
    }
}

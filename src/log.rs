//! Diagnostics.
//!
//! Every diagnostic goes through the `log` facade (`log::{error,warn,info,debug}!`) so a host
//! application wires in whatever sink it already uses; additionally, a volume can register its
//! own callback (`FIF_LOG_LEVEL`/`fif_log_callback` in the original) for hosts that want
//! structured access to fif's own messages without installing a global logger.

/// Severity of a diagnostic message, mirroring `FIF_LOG_LEVEL`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    fn as_log_level(self) -> log::Level {
        match self {
            Self::Debug => log::Level::Debug,
            Self::Info => log::Level::Info,
            Self::Warning => log::Level::Warn,
            Self::Error => log::Level::Error,
        }
    }
}

/// A host-supplied sink for fif's own diagnostic messages, invoked alongside the `log` facade.
pub type LogCallback = Box<dyn FnMut(LogLevel, &str) + Send>;

pub(crate) fn emit(callback: Option<&mut LogCallback>, level: LogLevel, message: &str) {
    log::log!(level.as_log_level(), "{message}");
    if let Some(callback) = callback {
        callback(level, message);
    }
}

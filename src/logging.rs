use log::info;

use crate::error::{Error, Result};

/// The process logger. Create one at the start of `main` and keep it
/// alive; dropping it flushes whatever is still buffered.
#[derive(Debug)]
#[must_use = "the log is flushed when this is dropped"]
pub struct LogContext {
    _private: (),
}

impl LogContext {
    /// sets up the file logger, fails if a logger is already installed
    pub fn init() -> Result<Self> {
        simple_file_logger::init_logger!("zzpal").map_err(|e| Error::Logger(format!("{e:?}")))?;
        info!("zzpal {} started", env!("CARGO_PKG_VERSION"));
        Ok(Self { _private: () })
    }
}

impl Drop for LogContext {
    fn drop(&mut self) {
        info!("zzpal exiting");
        log::logger().flush();
    }
}

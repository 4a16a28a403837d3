//! Process-wide logger: a single `slog::Logger` behind a `OnceCell`,
//! defaulting to a `slog-stdlog` drain so a consumer who never calls
//! `GlobalLogger::setup` still gets their log records forwarded to the
//! `log` facade.
use once_cell::sync::OnceCell;
use slog::{Drain, Logger as SlogLogger};
use slog_stdlog::StdLog;
use std::ops::Deref;

static GLOBAL_LOGGER: OnceCell<GlobalLogger> = OnceCell::new();

#[derive(Debug, Clone)]
pub struct GlobalLogger {
    inner: SlogLogger,
}

impl Deref for GlobalLogger {
    type Target = SlogLogger;

    fn deref(&self) -> &Self::Target { &self.inner }
}

impl GlobalLogger {
    fn new(logger: SlogLogger) -> Self { GlobalLogger { inner: logger } }

    /// Get the global logger, initializing it with a `slog-stdlog` drain on
    /// first access if nobody called [`GlobalLogger::setup`] first.
    pub fn get() -> &'static GlobalLogger {
        GLOBAL_LOGGER.get_or_init(|| GlobalLogger::new(SlogLogger::root(StdLog.fuse(), o!())))
    }

    /// Install a root logger. Can only be called once; returns the logger
    /// back on failure, mirroring `OnceCell::set`.
    pub fn setup(root_logger: SlogLogger) -> Result<(), SlogLogger> {
        GLOBAL_LOGGER.set(GlobalLogger::new(root_logger)).map_err(|g| g.inner)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_to_stdlog_drain() {
        let logger = GlobalLogger::get();
        debug!(logger, "smoke test"; "component" => "log");
    }
}

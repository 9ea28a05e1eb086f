//! `log4rs` setup for binaries and long experiment runs. Library code only uses the `log` macros.
use crate::error::PerturbError;
use log::LevelFilter;
use log4rs::append::console::ConsoleAppender;
use log4rs::append::file::FileAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;
use log4rs::Handle;
use std::path::Path;

const PATTERN: &str = "{d(%H:%M:%S%.3f)} {l} {t} - {m}{n}";

fn logging_error(e: impl ToString) -> PerturbError {
    PerturbError::Logging(e.to_string())
}

/// # Errors
pub fn console_config(level: LevelFilter) -> Result<Config, PerturbError> {
    let stderr = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(PATTERN)))
        .target(log4rs::append::console::Target::Stderr)
        .build();
    Config::builder()
        .appender(Appender::builder().build("stderr", Box::new(stderr)))
        .build(Root::builder().appender("stderr").build(level))
        .map_err(logging_error)
}

/// Config writing to `path`, creating parent directories as needed.
///
/// # Errors
pub fn file_config<P: AsRef<Path>>(path: P, level: LevelFilter) -> Result<Config, PerturbError> {
    let logfile = FileAppender::builder()
        .encoder(Box::new(PatternEncoder::new("{l} - {m}\n")))
        .build(path)?;
    Config::builder()
        .appender(Appender::builder().build("logfile", Box::new(logfile)))
        .build(Root::builder().appender("logfile").build(level))
        .map_err(logging_error)
}

/// Installs a stderr logger at `level` as the global logger.
///
/// # Errors
/// If a global logger is already installed.
pub fn init_console_logger(level: LevelFilter) -> Result<Handle, PerturbError> {
    log4rs::init_config(console_config(level)?).map_err(logging_error)
}

/// # Errors
/// If the file cannot be opened or a global logger is already installed.
pub fn init_file_logger<P: AsRef<Path>>(
    path: P,
    level: LevelFilter,
) -> Result<Handle, PerturbError> {
    log4rs::init_config(file_config(path, level)?).map_err(logging_error)
}

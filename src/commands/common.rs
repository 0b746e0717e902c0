//! Argument and logging plumbing shared by the mine and score commands.

use camino::Utf8PathBuf;
use clap::Args;
use clap::ValueEnum;

/// Log level for diagnostic output
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    /// No logging output
    None,
    /// Only error messages
    Error,
    /// Warning and error messages
    Warn,
    /// Info, warning, and error messages
    Info,
    /// Debug and above messages
    Debug,
    /// All messages including trace
    Trace,
}

/// Common arguments shared between the mine and score commands
#[derive(Args, Debug)]
pub struct CommonArgs {
    /// Label for the snapshot series, used as the prefix of every snapshot file name
    #[arg(long, value_name = "LABEL")]
    pub language: String,

    /// Directory where snapshot files are written and read
    #[arg(long, default_value = "snapshots", value_name = "PATH")]
    pub out: Utf8PathBuf,

    /// Set the logging level for diagnostic output
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    pub log_level: LogLevel,
}

/// Initialize logger based on log level
pub fn init_logging(log_level: LogLevel) {
    if log_level == LogLevel::None {
        return;
    }

    let level = match log_level {
        LogLevel::None => return, // Already checked above, but being explicit
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    };

    let env = env_logger::Env::default().filter_or("RUST_LOG", level);

    env_logger::Builder::from_env(env)
        .format_timestamp(None)
        .format_module_path(false)
        .format_target(matches!(log_level, LogLevel::Debug) || matches!(log_level, LogLevel::Trace))
        .init();
}

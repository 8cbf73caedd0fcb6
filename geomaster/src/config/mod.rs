//! Daemon configuration.
//!
//! # Example
//!
//! ```ignore
//! use geomaster::config::ConfigFile;
//!
//! let config = ConfigFile::load().unwrap_or_default();
//! let master_config = config.master_config();
//! let manual = config.manual.location();
//! ```

mod file;
mod parser;
mod settings;

pub use file::{config_directory, config_file_path, ConfigFileError};
pub use settings::{
    ConfigFile, ConnectivitySettings, LoggingSettings, ManualSettings, MasterSettings,
    MonitorKind, ProvidersSettings, DEFAULT_LOG_FILE, DEFAULT_POLL_INTERVAL_SECS,
    DEFAULT_PROVIDERS_DIR,
};

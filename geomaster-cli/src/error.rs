//! CLI error handling with user-friendly messages.

use std::fmt;
use std::process;

use geomaster::config::ConfigFileError;
use geomaster::descriptor::DescriptorError;
use geomaster::MasterError;

/// CLI-specific errors with user-friendly messages.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(String),
    /// Configuration file could not be loaded
    Config(ConfigFileError),
    /// Provider manifests could not be loaded
    Providers(DescriptorError),
    /// Failed to build the async runtime
    Runtime(std::io::Error),
    /// The Ctrl-C handler could not be installed
    Signal(String),
    /// The master rejected a request
    Master(MasterError),
    /// Failed to serialize output
    Output(serde_json::Error),
}

impl CliError {
    /// Exit the process with an appropriate error message and code.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        match self {
            CliError::Config(_) => {
                eprintln!();
                eprintln!("Fix the value in config.ini, or pass --config to use another file.");
            }
            CliError::Providers(_) => {
                eprintln!();
                eprintln!("Set [providers] directory in config.ini to the manifest directory.");
            }
            CliError::Master(MasterError::Location(_)) => {
                eprintln!();
                eprintln!("Run 'geomaster providers' to see which providers are installed.");
            }
            _ => {}
        }

        process::exit(1)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(msg) => write!(f, "Failed to initialize logging: {}", msg),
            CliError::Config(e) => write!(f, "Configuration error: {}", e),
            CliError::Providers(e) => write!(f, "Failed to load providers: {}", e),
            CliError::Runtime(e) => write!(f, "Failed to start runtime: {}", e),
            CliError::Signal(msg) => write!(f, "Failed to install Ctrl-C handler: {}", msg),
            CliError::Master(e) => write!(f, "Location request failed: {}", e),
            CliError::Output(e) => write!(f, "Failed to write output: {}", e),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Config(e) => Some(e),
            CliError::Providers(e) => Some(e),
            CliError::Runtime(e) => Some(e),
            CliError::Master(e) => Some(e),
            CliError::Output(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigFileError> for CliError {
    fn from(e: ConfigFileError) -> Self {
        CliError::Config(e)
    }
}

impl From<DescriptorError> for CliError {
    fn from(e: DescriptorError) -> Self {
        CliError::Providers(e)
    }
}

impl From<MasterError> for CliError {
    fn from(e: MasterError) -> Self {
        CliError::Master(e)
    }
}

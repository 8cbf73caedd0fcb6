//! CLI runner for common setup and operations.
//!
//! Encapsulates config loading, logging initialization and construction of
//! the master service so command handlers only deal with their own logic.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::runtime::Runtime;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use geomaster::backend::BuiltinConnector;
use geomaster::config::{ConfigFile, MonitorKind};
use geomaster::connectivity::{
    ConnectivityMonitor, ConnectivityStatus, ManualConnectivity, RouteMonitor, DEFAULT_ROUTE_TABLE,
};
use geomaster::logging::{init_logging, split_log_path, LoggingGuard};
use geomaster::master::Master;
use geomaster::service::{MasterHandle, MasterService};

use crate::error::CliError;

/// Global options shared by every command.
#[derive(Debug, Clone, Default)]
pub struct GlobalOptions {
    /// Config file overriding ~/.geomaster/config.ini
    pub config: Option<PathBuf>,
    /// Force debug-level logging
    pub debug: bool,
    /// Mirror log output to stdout
    pub stdout_logging: bool,
}

/// Runner that manages CLI lifecycle and common operations.
pub struct CliRunner {
    /// Logging guard - keeps logging active while runner exists
    _logging_guard: LoggingGuard,
    config: ConfigFile,
}

impl CliRunner {
    /// Load config and initialize logging.
    pub fn new(options: &GlobalOptions) -> Result<Self, CliError> {
        let config = load_config(options.config.as_deref())?;

        let (log_dir, log_file) = split_log_path(&config.logging.file);
        let logging_guard =
            init_logging(&log_dir, &log_file, options.stdout_logging, options.debug)
                .map_err(|e| CliError::LoggingInit(e.to_string()))?;

        Ok(Self {
            _logging_guard: logging_guard,
            config,
        })
    }

    /// Log startup information for a command.
    pub fn log_startup(&self, command: &str) {
        info!("Geomaster v{}", geomaster::VERSION);
        info!(
            command,
            providers = %self.config.providers.directory.display(),
            monitor = %self.config.connectivity.monitor,
            "Geomaster CLI starting"
        );
    }

    /// Build the multi-threaded runtime the service runs on.
    pub fn runtime(&self) -> Result<Runtime, CliError> {
        tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(CliError::Runtime)
    }

    /// Load manifests and start the master service.
    ///
    /// Must be called from within the runtime. The service stops when
    /// `shutdown` is cancelled.
    pub async fn start_service(
        &self,
        shutdown: &CancellationToken,
    ) -> Result<(MasterHandle, JoinHandle<()>), CliError> {
        let master = Master::load_providers(
            &self.config.providers.directory,
            self.config.master_config(),
        )?;
        if master.registry().is_empty() {
            warn!(
                directory = %self.config.providers.directory.display(),
                "No provider manifests found"
            );
        }

        let connector =
            Arc::new(BuiltinConnector::new().with_manual_location(self.config.manual.location()));
        let connectivity = self.connectivity(shutdown).await;

        Ok(MasterService::start(
            master,
            connector,
            connectivity,
            shutdown.clone(),
        ))
    }

    async fn connectivity(&self, shutdown: &CancellationToken) -> Arc<dyn ConnectivityMonitor> {
        let settings = &self.config.connectivity;
        match settings.monitor {
            MonitorKind::Route => {
                // The poll task ends with `shutdown`.
                let (monitor, _task) = RouteMonitor::start(
                    DEFAULT_ROUTE_TABLE,
                    settings.poll_interval,
                    shutdown.clone(),
                )
                .await;
                Arc::new(monitor)
            }
            MonitorKind::Online => Arc::new(ManualConnectivity::new(ConnectivityStatus::Online)),
            MonitorKind::Offline => Arc::new(ManualConnectivity::new(ConnectivityStatus::Offline)),
        }
    }
}

/// Load the config file from `path`, or from the default location.
pub fn load_config(path: Option<&Path>) -> Result<ConfigFile, CliError> {
    let config = match path {
        Some(path) => ConfigFile::load_from(path)?,
        None => ConfigFile::load()?,
    };
    Ok(config)
}

/// Cancel `token` on Ctrl-C.
pub fn cancel_on_ctrlc(token: &CancellationToken) -> Result<(), CliError> {
    let token = token.clone();
    ctrlc::set_handler(move || {
        eprintln!("\nShutting down...");
        token.cancel();
    })
    .map_err(|e| CliError::Signal(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_config_missing_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = load_config(Some(&temp_dir.path().join("absent.ini"))).unwrap();
        assert_eq!(config.connectivity.monitor, MonitorKind::Route);
    }

    #[test]
    fn test_load_config_reports_invalid_values() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.ini");
        std::fs::write(&path, "[connectivity]\nmonitor = carrier-pigeon\n").unwrap();

        let err = load_config(Some(&path)).unwrap_err();
        assert!(matches!(err, CliError::Config(_)));
    }
}

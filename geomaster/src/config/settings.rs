//! Settings structs for all configuration sections.
//!
//! Each struct represents one `[section]` of the INI config file.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::accuracy::{Accuracy, AccuracyLevel};
use crate::backend::ManualLocation;
use crate::location::Position;
use crate::master::{MasterConfig, ShutdownPolicy};

// =============================================================================
// Defaults
// =============================================================================

/// Directory scanned for provider manifests.
pub const DEFAULT_PROVIDERS_DIR: &str = "/usr/share/geomaster/providers";

/// Seconds between route table polls.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Log file name inside the config directory.
pub const DEFAULT_LOG_FILE: &str = "geomaster.log";

// =============================================================================
// Settings
// =============================================================================

/// Complete configuration loaded from config.ini.
#[derive(Debug, Clone, Default)]
pub struct ConfigFile {
    pub providers: ProvidersSettings,
    pub master: MasterSettings,
    pub connectivity: ConnectivitySettings,
    pub logging: LoggingSettings,
    /// Location served by the built-in manual backend
    pub manual: ManualSettings,
}

#[derive(Debug, Clone)]
pub struct ProvidersSettings {
    /// Manifest directory
    pub directory: PathBuf,
}

impl Default for ProvidersSettings {
    fn default() -> Self {
        Self {
            directory: PathBuf::from(DEFAULT_PROVIDERS_DIR),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MasterSettings {
    /// Stop provider backends once no client is subscribed
    pub stop_idle_providers: bool,
}

impl Default for MasterSettings {
    fn default() -> Self {
        Self {
            stop_idle_providers: true,
        }
    }
}

/// Source of connectivity status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MonitorKind {
    /// Poll the kernel routing table for a default route.
    #[default]
    Route,
    /// Always online.
    Online,
    /// Always offline.
    Offline,
}

impl MonitorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MonitorKind::Route => "route",
            MonitorKind::Online => "online",
            MonitorKind::Offline => "offline",
        }
    }
}

impl fmt::Display for MonitorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MonitorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "route" => Ok(MonitorKind::Route),
            "online" => Ok(MonitorKind::Online),
            "offline" => Ok(MonitorKind::Offline),
            other => Err(format!("unknown monitor '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConnectivitySettings {
    pub monitor: MonitorKind,
    /// Route table poll period
    pub poll_interval: Duration,
}

impl Default for ConnectivitySettings {
    fn default() -> Self {
        Self {
            monitor: MonitorKind::Route,
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    /// Log file path
    pub file: PathBuf,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            file: super::config_directory().join(DEFAULT_LOG_FILE),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ManualSettings {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude: Option<f64>,
    /// Accuracy reported for the position
    pub accuracy: AccuracyLevel,
    /// Address details keyed by address field name
    pub address: BTreeMap<String, String>,
}

// =============================================================================
// Conversions
// =============================================================================

impl ConfigFile {
    /// Library-side master configuration.
    pub fn master_config(&self) -> MasterConfig {
        let policy = if self.master.stop_idle_providers {
            ShutdownPolicy::StopWhenIdle
        } else {
            ShutdownPolicy::KeepRunning
        };
        MasterConfig::default().with_shutdown_policy(policy)
    }
}

impl ManualSettings {
    /// Location for the manual backend. Empty if nothing was configured.
    pub fn location(&self) -> ManualLocation {
        let position = match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => {
                let position = Position::new_2d(lat, lon, Accuracy::from_level(self.accuracy));
                Some(match self.altitude {
                    Some(alt) => position.with_altitude(alt),
                    None => position,
                })
            }
            _ => None,
        };
        let address = (!self.address.is_empty())
            .then(|| ManualLocation::address_from_details(self.address.clone()));

        ManualLocation { position, address }
    }
}

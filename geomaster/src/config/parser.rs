//! INI parsing logic for converting `Ini` → `ConfigFile`.
//!
//! This is the single place where INI key names are mapped to struct fields.

use std::path::PathBuf;
use std::time::Duration;

use ini::Ini;

use super::file::ConfigFileError;
use super::settings::ConfigFile;
use crate::accuracy::AccuracyLevel;
use crate::location::address_keys;

const ACCURACY_CHOICES: &str =
    "must be one of: none, country, region, locality, postalcode, street, detailed";

/// Parse an `Ini` object into a `ConfigFile`.
///
/// Starts from `ConfigFile::default()` and overlays any values found in the INI.
pub(super) fn parse_ini(ini: &Ini) -> Result<ConfigFile, ConfigFileError> {
    let mut config = ConfigFile::default();

    // [providers] section
    if let Some(section) = ini.section(Some("providers")) {
        if let Some(v) = section.get("directory") {
            let v = v.trim();
            if !v.is_empty() {
                config.providers.directory = expand_tilde(v);
            }
        }
    }

    // [master] section
    if let Some(section) = ini.section(Some("master")) {
        if let Some(v) = section.get("stop_idle_providers") {
            config.master.stop_idle_providers = parse_bool(v);
        }
    }

    // [connectivity] section
    if let Some(section) = ini.section(Some("connectivity")) {
        if let Some(v) = section.get("monitor") {
            config.connectivity.monitor = v.parse().map_err(|_| ConfigFileError::InvalidValue {
                section: "connectivity".to_string(),
                key: "monitor".to_string(),
                value: v.to_string(),
                reason: "must be one of: route, online, offline".to_string(),
            })?;
        }
        if let Some(v) = section.get("poll_interval") {
            let secs: u64 = v
                .trim()
                .parse()
                .ok()
                .filter(|secs| *secs > 0)
                .ok_or_else(|| ConfigFileError::InvalidValue {
                    section: "connectivity".to_string(),
                    key: "poll_interval".to_string(),
                    value: v.to_string(),
                    reason: "must be a positive integer (seconds)".to_string(),
                })?;
            config.connectivity.poll_interval = Duration::from_secs(secs);
        }
    }

    // [logging] section
    if let Some(section) = ini.section(Some("logging")) {
        if let Some(v) = section.get("file") {
            let v = v.trim();
            if !v.is_empty() {
                config.logging.file = expand_tilde(v);
            }
        }
    }

    // [manual] section
    if let Some(section) = ini.section(Some("manual")) {
        let manual = &mut config.manual;
        manual.latitude = parse_coordinate(section.get("latitude"), "latitude", 90.0)?;
        manual.longitude = parse_coordinate(section.get("longitude"), "longitude", 180.0)?;

        if manual.latitude.is_some() != manual.longitude.is_some() {
            let (key, value) = match manual.latitude {
                Some(lat) => ("latitude", lat.to_string()),
                None => ("longitude", manual.longitude.unwrap_or_default().to_string()),
            };
            return Err(ConfigFileError::InvalidValue {
                section: "manual".to_string(),
                key: key.to_string(),
                value,
                reason: "latitude and longitude must be set together".to_string(),
            });
        }

        if let Some(v) = section.get("altitude") {
            manual.altitude = Some(v.trim().parse().map_err(|_| ConfigFileError::InvalidValue {
                section: "manual".to_string(),
                key: "altitude".to_string(),
                value: v.to_string(),
                reason: "must be a number (meters)".to_string(),
            })?);
        }
        if let Some(v) = section.get("accuracy") {
            manual.accuracy = v.parse::<AccuracyLevel>().map_err(|_| {
                ConfigFileError::InvalidValue {
                    section: "manual".to_string(),
                    key: "accuracy".to_string(),
                    value: v.to_string(),
                    reason: ACCURACY_CHOICES.to_string(),
                }
            })?;
        }
        for key in address_keys::ALL {
            if let Some(v) = section.get(key) {
                let v = v.trim();
                if !v.is_empty() {
                    manual.address.insert(key.to_string(), v.to_string());
                }
            }
        }
    }

    Ok(config)
}

fn parse_coordinate(
    value: Option<&str>,
    key: &str,
    limit: f64,
) -> Result<Option<f64>, ConfigFileError> {
    let Some(v) = value else {
        return Ok(None);
    };
    match v.trim().parse::<f64>() {
        Ok(n) if n.is_finite() && n.abs() <= limit => Ok(Some(n)),
        _ => Err(ConfigFileError::InvalidValue {
            section: "manual".to_string(),
            key: key.to_string(),
            value: v.to_string(),
            reason: format!("must be a number between -{} and {}", limit, limit),
        }),
    }
}

/// Parse a boolean value from a config string.
/// Accepts: true/false, yes/no, 1/0, on/off (case-insensitive)
pub(super) fn parse_bool(value: &str) -> bool {
    let v = value.trim().to_lowercase();
    v == "true" || v == "1" || v == "yes" || v == "on"
}

/// Expand ~ to home directory in paths.
pub(super) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MonitorKind;
    use tempfile::TempDir;

    fn load(content: &str) -> Result<ConfigFile, ConfigFileError> {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.ini");
        std::fs::write(&config_path, content).unwrap();
        ConfigFile::load_from(&config_path)
    }

    #[test]
    fn test_full_config() {
        let config = load(
            r#"
[providers]
directory = /opt/geomaster/providers

[master]
stop_idle_providers = no

[connectivity]
monitor = offline
poll_interval = 30

[logging]
file = /var/log/geomaster.log

[manual]
latitude = 60.1699
longitude = 24.9384
accuracy = street
locality = Helsinki
countrycode = FI
"#,
        )
        .unwrap();

        assert_eq!(
            config.providers.directory,
            PathBuf::from("/opt/geomaster/providers")
        );
        assert!(!config.master.stop_idle_providers);
        assert_eq!(config.connectivity.monitor, MonitorKind::Offline);
        assert_eq!(config.connectivity.poll_interval, Duration::from_secs(30));
        assert_eq!(config.logging.file, PathBuf::from("/var/log/geomaster.log"));
        assert_eq!(config.manual.latitude, Some(60.1699));
        assert_eq!(config.manual.accuracy, AccuracyLevel::Street);
        assert_eq!(config.manual.address.len(), 2);
        assert_eq!(config.manual.address["countrycode"], "FI");
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config = load(
            r#"
[connectivity]
monitor = online
"#,
        )
        .unwrap();

        assert_eq!(config.connectivity.monitor, MonitorKind::Online);
        assert!(config.master.stop_idle_providers);
        assert_eq!(
            config.connectivity.poll_interval,
            Duration::from_secs(crate::config::DEFAULT_POLL_INTERVAL_SECS)
        );
    }

    #[test]
    fn test_invalid_monitor() {
        let err = load("[connectivity]\nmonitor = wifi\n").unwrap_err();
        assert!(err.to_string().contains("connectivity.monitor"));
        assert!(err.to_string().contains("route, online, offline"));
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        let err = load("[connectivity]\npoll_interval = 0\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigFileError::InvalidValue { ref key, .. } if key == "poll_interval"
        ));
    }

    #[test]
    fn test_latitude_out_of_range() {
        let err = load("[manual]\nlatitude = 91\nlongitude = 0\n").unwrap_err();
        assert!(err.to_string().contains("manual.latitude"));
    }

    #[test]
    fn test_latitude_without_longitude() {
        let err = load("[manual]\nlatitude = 45\n").unwrap_err();
        assert!(err.to_string().contains("set together"));
    }

    #[test]
    fn test_invalid_accuracy() {
        let err = load("[manual]\naccuracy = precise\n").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("manual.accuracy"));
        assert!(message.contains("postalcode, street, detailed"));
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("Yes"));
        assert!(parse_bool(" on "));
        assert!(parse_bool("1"));
        assert!(!parse_bool("off"));
        assert!(!parse_bool("maybe"));
    }

    #[test]
    fn test_expand_tilde() {
        let path = expand_tilde("~/providers");
        if let Some(home) = dirs::home_dir() {
            assert_eq!(path, home.join("providers"));
        }
        assert_eq!(expand_tilde("/absolute"), PathBuf::from("/absolute"));
    }
}

//! Manifest parsing.
//!
//! Manifests are INI-style files:
//!
//! ```ini
//! [Location Provider]
//! Name=Hostip
//! Service=org.freedesktop.Geoclue.Providers.Hostip
//! Path=/org/freedesktop/Geoclue/Providers/Hostip
//! Accuracy=Locality
//! Requires=RequiresNetwork
//! Provides=ProvidesCacheableOnConnection
//! Interfaces=org.freedesktop.Geoclue.Position;org.freedesktop.Geoclue.Address
//! ```
//!
//! The legacy `[Geoclue Provider]` group name is accepted as well.

use std::path::{Path, PathBuf};

use ini::Ini;
use tracing::{debug, warn};

use super::{DescriptorError, ProviderDescriptor};
use crate::accuracy::AccuracyLevel;
use crate::location::{Interfaces, Provides, Resources};

/// File extension of provider manifests.
pub const MANIFEST_EXTENSION: &str = "provider";

const GROUPS: [&str; 2] = ["Location Provider", "Geoclue Provider"];

/// Parse manifest text into a validated descriptor.
pub fn parse_manifest(content: &str) -> Result<ProviderDescriptor, DescriptorError> {
    let ini = Ini::load_from_str(content).map_err(|e| DescriptorError::Read {
        path: PathBuf::new(),
        reason: e.to_string(),
    })?;
    from_ini(&ini)
}

/// Read and parse a single manifest file.
pub fn read_manifest(path: &Path) -> Result<ProviderDescriptor, DescriptorError> {
    let ini = Ini::load_from_file(path).map_err(|e| DescriptorError::Read {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let mut descriptor = from_ini(&ini)?;
    descriptor.source = Some(path.to_path_buf());
    Ok(descriptor)
}

/// Parse every `*.provider` file in `dir`.
///
/// Malformed manifests are logged and skipped. A missing directory yields
/// no descriptors. Results are sorted by file name so load order is stable.
pub fn scan_manifests(dir: &Path) -> Result<Vec<ProviderDescriptor>, DescriptorError> {
    let pattern = format!(
        "{}/*.{}",
        glob::Pattern::escape(&dir.to_string_lossy()),
        MANIFEST_EXTENSION
    );

    let mut paths: Vec<PathBuf> = glob::glob(&pattern)?
        .filter_map(|entry| match entry {
            Ok(path) => Some(path),
            Err(e) => {
                warn!(error = %e, "Unreadable manifest directory entry");
                None
            }
        })
        .collect();
    paths.sort();

    let mut descriptors = Vec::with_capacity(paths.len());
    for path in paths {
        match read_manifest(&path) {
            Ok(descriptor) => {
                debug!(
                    provider = %descriptor.name,
                    path = %path.display(),
                    "Loaded provider manifest"
                );
                descriptors.push(descriptor);
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping malformed provider manifest");
            }
        }
    }

    Ok(descriptors)
}

fn from_ini(ini: &Ini) -> Result<ProviderDescriptor, DescriptorError> {
    let section = GROUPS
        .iter()
        .find_map(|group| ini.section(Some(*group)))
        .ok_or(DescriptorError::MissingGroup)?;

    let required = |key: &'static str| -> Result<String, DescriptorError> {
        section
            .get(key)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .ok_or(DescriptorError::MissingKey(key))
    };

    let name = required("Name")?;
    let service = required("Service")?;
    let path = section.get("Path").map(str::trim).unwrap_or("").to_string();
    let description = section
        .get("Description")
        .map(str::trim)
        .unwrap_or("")
        .to_string();

    let accuracy = match section.get("Accuracy").map(str::trim) {
        None | Some("") => AccuracyLevel::None,
        Some(v) => v.parse().map_err(|e: crate::accuracy::ParseAccuracyLevelError| {
            DescriptorError::InvalidValue {
                key: "Accuracy",
                value: v.to_string(),
                reason: e.to_string(),
            }
        })?,
    };

    let mut requires = Resources::empty();
    for token in tokens(section.get("Requires")) {
        requires |= Resources::from_token(token).ok_or_else(|| DescriptorError::InvalidValue {
            key: "Requires",
            value: token.to_string(),
            reason: "must be one of: RequiresNetwork, RequiresCell, RequiresGPS".to_string(),
        })?;
    }

    let mut provides = Provides::empty();
    for token in tokens(section.get("Provides")) {
        provides |= Provides::from_token(token).ok_or_else(|| DescriptorError::InvalidValue {
            key: "Provides",
            value: token.to_string(),
            reason: "must be one of: ProvidesUpdates, ProvidesCacheableOnConnection".to_string(),
        })?;
    }

    // Interfaces the master does not arbitrate are not an error
    let mut interfaces = Interfaces::empty();
    for token in tokens(section.get("Interfaces")) {
        match Interfaces::from_token(token) {
            Some(flag) => interfaces |= flag,
            None => debug!(provider = %name, interface = token, "Ignoring unknown interface"),
        }
    }

    let descriptor = ProviderDescriptor {
        name,
        description,
        service,
        path,
        accuracy,
        requires,
        provides,
        interfaces,
        source: None,
    };
    descriptor.validate()?;
    Ok(descriptor)
}

fn tokens(value: Option<&str>) -> impl Iterator<Item = &str> {
    value
        .unwrap_or("")
        .split([';', ','])
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

//! Provider descriptors.
//!
//! A [`ProviderDescriptor`] is the static metadata for one provider, read
//! from a `.provider` manifest when the master starts. Descriptors never
//! change after loading.

mod manifest;

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::accuracy::AccuracyLevel;
use crate::location::{Capability, Interfaces, Provides, Resources};

pub use manifest::{parse_manifest, read_manifest, scan_manifests, MANIFEST_EXTENSION};

/// Errors raised while loading a provider manifest.
#[derive(Debug, Error)]
pub enum DescriptorError {
    /// The manifest file could not be read or is not valid INI.
    #[error("Failed to read manifest {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    /// The manifest has no provider group.
    #[error("Manifest has no [Location Provider] group")]
    MissingGroup,

    /// A mandatory key is missing or empty.
    #[error("Manifest is missing required key '{0}'")]
    MissingKey(&'static str),

    /// A key holds a value that cannot be parsed.
    #[error("Invalid manifest value {key} = '{value}': {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },

    /// The manifest declares no interface the master knows.
    #[error("Provider '{0}' declares no capabilities")]
    NoCapabilities(String),

    /// The manifest directory pattern is invalid.
    #[error("Invalid manifest directory pattern: {0}")]
    Pattern(#[from] glob::PatternError),
}

/// Static metadata for one provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderDescriptor {
    pub name: String,
    pub description: String,
    /// Service identifier used to reach the backend.
    pub service: String,
    /// Object path of the backend within its service.
    pub path: String,
    pub accuracy: AccuracyLevel,
    pub requires: Resources,
    pub provides: Provides,
    pub interfaces: Interfaces,
    /// Manifest the descriptor was read from, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<PathBuf>,
}

impl ProviderDescriptor {
    /// Start building a descriptor.
    pub fn builder(name: impl Into<String>) -> ProviderDescriptorBuilder {
        ProviderDescriptorBuilder::new(name)
    }

    /// Returns true if the provider implements `capability`.
    pub fn supports(&self, capability: Capability) -> bool {
        self.interfaces.contains(capability.interface())
    }

    /// Returns true if the provider emits change notifications.
    pub fn provides_updates(&self) -> bool {
        self.provides.contains(Provides::UPDATES)
    }

    /// Returns true if one fetch per connectivity session is enough.
    pub fn is_cacheable(&self) -> bool {
        self.provides.contains(Provides::CACHEABLE_ON_CONNECTION)
    }

    /// Returns true if the provider needs the network.
    pub fn requires_network(&self) -> bool {
        self.requires.contains(Resources::NETWORK)
    }

    /// Returns true if the provider must follow connectivity changes.
    pub fn watches_connectivity(&self) -> bool {
        self.requires_network() || self.is_cacheable()
    }

    /// Reject descriptors the master cannot use.
    pub fn validate(&self) -> Result<(), DescriptorError> {
        if self.name.trim().is_empty() {
            return Err(DescriptorError::MissingKey("Name"));
        }
        if self.service.trim().is_empty() {
            return Err(DescriptorError::MissingKey("Service"));
        }
        if self.interfaces.is_empty() {
            return Err(DescriptorError::NoCapabilities(self.name.clone()));
        }
        Ok(())
    }
}

/// Builder for [`ProviderDescriptor`], mostly used by tests and built-in providers.
#[derive(Debug, Clone)]
pub struct ProviderDescriptorBuilder {
    descriptor: ProviderDescriptor,
}

impl ProviderDescriptorBuilder {
    fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            descriptor: ProviderDescriptor {
                service: format!("org.geomaster.Provider.{}", name),
                path: format!("/org/geomaster/Provider/{}", name),
                name,
                description: String::new(),
                accuracy: AccuracyLevel::None,
                requires: Resources::empty(),
                provides: Provides::empty(),
                interfaces: Interfaces::empty(),
                source: None,
            },
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.descriptor.description = description.into();
        self
    }

    pub fn service(mut self, service: impl Into<String>) -> Self {
        self.descriptor.service = service.into();
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.descriptor.path = path.into();
        self
    }

    pub fn accuracy(mut self, accuracy: AccuracyLevel) -> Self {
        self.descriptor.accuracy = accuracy;
        self
    }

    pub fn requires(mut self, requires: Resources) -> Self {
        self.descriptor.requires = requires;
        self
    }

    pub fn provides(mut self, provides: Provides) -> Self {
        self.descriptor.provides = provides;
        self
    }

    pub fn interfaces(mut self, interfaces: Interfaces) -> Self {
        self.descriptor.interfaces = interfaces;
        self
    }

    pub fn build(self) -> ProviderDescriptor {
        self.descriptor
    }
}

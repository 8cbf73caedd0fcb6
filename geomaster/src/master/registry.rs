//! Registry of master providers.

use std::path::Path;

use tracing::info;

use super::{MasterProvider, ProviderId, Requirements};
use crate::descriptor::{scan_manifests, DescriptorError, ProviderDescriptor};
use crate::location::Capability;

/// Every provider known to the master, indexed by [`ProviderId`].
///
/// Built once at startup; providers are never added or removed afterwards.
#[derive(Default)]
pub struct Registry {
    providers: Vec<MasterProvider>,
}

impl Registry {
    pub fn from_descriptors(descriptors: impl IntoIterator<Item = ProviderDescriptor>) -> Self {
        let providers = descriptors
            .into_iter()
            .enumerate()
            .map(|(i, descriptor)| MasterProvider::new(ProviderId(i), descriptor))
            .collect();
        Self { providers }
    }

    /// Scan `dir` for manifests and build a registry from the valid ones.
    pub fn load(dir: &Path) -> Result<Self, DescriptorError> {
        let descriptors = scan_manifests(dir)?;
        info!(
            directory = %dir.display(),
            count = descriptors.len(),
            "Loaded provider manifests"
        );
        Ok(Self::from_descriptors(descriptors))
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn get(&self, id: ProviderId) -> Option<&MasterProvider> {
        self.providers.get(id.0)
    }

    pub fn get_mut(&mut self, id: ProviderId) -> Option<&mut MasterProvider> {
        self.providers.get_mut(id.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MasterProvider> {
        self.providers.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut MasterProvider> {
        self.providers.iter_mut()
    }

    /// Look up a provider by manifest name.
    pub fn find(&self, name: &str) -> Option<&MasterProvider> {
        self.providers.iter().find(|p| p.name() == name)
    }

    /// Providers satisfying `requirements` for `capability`, in registry order.
    pub fn get_candidates(
        &self,
        capability: Capability,
        requirements: &Requirements,
    ) -> Vec<ProviderId> {
        self.providers
            .iter()
            .filter(|p| p.is_good_for(capability, requirements))
            .map(MasterProvider::id)
            .collect()
    }
}

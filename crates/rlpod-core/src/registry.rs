//! Process-wide pod registry
//!
//! The registry is an explicit value created by the caller and shared by
//! reference. Pods are stored behind `Arc`, so a reload swaps the entry in
//! one step and readers holding the previous pod keep a complete value.

use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::RuntimeConfig;
use crate::connector::ConnectorRegistry;
use crate::pod::Pod;
use crate::table::MergedTable;
use crate::{PodError, Result};

/// Loaded pods keyed by name
#[derive(Debug, Default)]
pub struct PodRegistry {
    pods: DashMap<String, Arc<Pod>>,
}

impl PodRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `pod`, replacing any pod of the same name
    ///
    /// Returns the replaced pod. A fetch still running against it completes
    /// into its own cache, which is dropped with the last reference.
    pub fn create_or_update_pod(&self, pod: impl Into<Arc<Pod>>) -> Option<Arc<Pod>> {
        let pod = pod.into();
        let name = pod.name().to_string();
        let previous = self.pods.insert(name.clone(), pod);
        match &previous {
            Some(old) => info!(pod = %name, old_hash = %old.hash(), "Replaced pod"),
            None => info!(pod = %name, "Registered pod"),
        }
        previous
    }

    /// Look up a pod by name
    pub fn get_pod(&self, name: &str) -> Result<Arc<Pod>> {
        self.pods
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| PodError::NotFound(format!("pod '{name}'")))
    }

    /// Remove a pod; returns it if it was registered
    pub fn remove_pod(&self, name: &str) -> Option<Arc<Pod>> {
        let removed = self.pods.remove(name).map(|(_, pod)| pod);
        if removed.is_some() {
            info!(pod = %name, "Removed pod");
        }
        removed
    }

    /// Registered pod names, sorted
    #[must_use]
    pub fn pods(&self) -> Vec<String> {
        let mut names: Vec<String> = self.pods.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    /// Number of registered pods
    #[must_use]
    pub fn len(&self) -> usize {
        self.pods.len()
    }

    /// Check if no pod is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pods.is_empty()
    }

    /// Load a manifest and register the resulting pod
    pub fn load_pod(&self, path: impl AsRef<Path>, config: &RuntimeConfig) -> Result<Arc<Pod>> {
        let pod = Arc::new(Pod::load(path, config)?);
        self.create_or_update_pod(Arc::clone(&pod));
        Ok(pod)
    }

    /// Fetch new data for a registered pod
    pub async fn fetch(&self, name: &str, connectors: &ConnectorRegistry) -> Result<MergedTable> {
        let pod = self.get_pod(name)?;
        pod.fetch_new_data(connectors).await
    }
}

/// First `.yml` / `.yaml` file in `dir`, by file name
pub fn find_first_manifest_path(dir: impl AsRef<Path>) -> Result<Option<PathBuf>> {
    let dir = dir.as_ref();
    let mut manifests = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_manifest = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext == "yml" || ext == "yaml");
        if is_manifest && path.is_file() {
            manifests.push(path);
        }
    }
    manifests.sort();
    debug!(dir = %dir.display(), found = manifests.len(), "Scanned for manifests");
    Ok(manifests.into_iter().next())
}

//! Saved cluster settings for token renewal (~/.kubedconf)

use crate::cluster::ClusterSpec;
use crate::error::{KubedError, Result};
use crate::kubeconfig::write_file_atomic;
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// One JSON object keyed by cluster name
pub struct ClusterStore {
    path: PathBuf,
}

impl ClusterStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, ClusterSpec>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(source) => {
                return Err(KubedError::Settings {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&content).map_err(|source| KubedError::InvalidSettings {
            path: self.path.clone(),
            source,
        })
    }

    /// Load the saved spec for `name`
    pub fn load(&self, name: &str) -> Result<ClusterSpec> {
        self.read_all()?
            .remove(name)
            .ok_or_else(|| KubedError::ClusterNotFound(name.to_string()))
    }

    /// Save `spec`, replacing any earlier record with the same name
    pub fn save(&self, spec: &ClusterSpec) -> Result<()> {
        let mut all = self.read_all()?;
        all.insert(spec.name.clone(), spec.clone());

        let json = serde_json::to_string_pretty(&all).map_err(|source| {
            KubedError::InvalidSettings {
                path: self.path.clone(),
                source,
            }
        })?;
        write_file_atomic(&self.path, json.as_bytes()).map_err(|source| KubedError::Settings {
            path: self.path.clone(),
            source,
        })?;
        tracing::debug!(name = %spec.name, path = %self.path.display(), "saved cluster settings");
        Ok(())
    }

    /// Names of all saved clusters, sorted
    pub fn names(&self) -> Result<Vec<String>> {
        Ok(self.read_all()?.into_keys().collect())
    }
}

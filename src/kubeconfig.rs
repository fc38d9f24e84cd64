//! Kubeconfig file parsing, merging, and atomic writes

use crate::error::{KubedError, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use serde_yaml_ng::{Mapping, Value as Yaml};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;

/// Kubeconfig file structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct KubeConfig {
    #[serde(rename = "apiVersion", skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferences: Option<Yaml>,
    #[serde(default)]
    pub clusters: Vec<NamedItem>,
    #[serde(
        default,
        rename = "current-context",
        skip_serializing_if = "Option::is_none"
    )]
    pub current_context: Option<String>,
    #[serde(default)]
    pub contexts: Vec<NamedItem>,
    #[serde(default)]
    pub users: Vec<NamedItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Yaml>,
}

/// Named item in kubeconfig (context, cluster, user)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct NamedItem {
    pub name: String,
    #[serde(default, flatten)]
    pub rest: Yaml,
}

/// What to do with `current-context` when merging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContextPolicy {
    #[default]
    Switch,
    Keep,
}

impl ContextPolicy {
    pub fn from_keep_flag(keep_context: bool) -> Self {
        if keep_context {
            ContextPolicy::Keep
        } else {
            ContextPolicy::Switch
        }
    }
}

/// Cluster, user and context for one logical cluster, all sharing `name`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KubeConfigEntry {
    pub name: String,
    pub server: String,
    /// Raw PEM (or DER) bytes, base64-encoded on write
    pub certificate_authority_data: Option<Vec<u8>>,
    pub token: String,
    pub namespace: Option<String>,
}

impl KubeConfig {
    /// Ensure required fields have defaults
    pub fn ensure_defaults(&mut self) {
        if self.api_version.is_none() {
            self.api_version = Some("v1".to_string());
        }
        if self.kind.is_none() {
            self.kind = Some("Config".to_string());
        }
        if self.preferences.is_none() {
            self.preferences = Some(Yaml::Mapping(Default::default()));
        }
    }

    /// Find a context by name
    pub fn find_context(&self, name: &str) -> Option<&NamedItem> {
        self.contexts.iter().find(|c| c.name == name)
    }

    /// Find a cluster by name
    pub fn find_cluster(&self, name: &str) -> Option<&NamedItem> {
        self.clusters.iter().find(|c| c.name == name)
    }

    /// Find a user by name
    pub fn find_user(&self, name: &str) -> Option<&NamedItem> {
        self.users.iter().find(|u| u.name == name)
    }
}

/// Wrap `inner` as `{ <key>: inner }`, the shape of every named item body
fn section(key: &str, inner: Mapping) -> Yaml {
    let mut map = Mapping::new();
    map.insert(Yaml::from(key), Yaml::Mapping(inner));
    Yaml::Mapping(map)
}

/// Read the namespace out of a context item's body
pub fn context_namespace(rest: &Yaml) -> Option<String> {
    let Yaml::Mapping(map) = rest else {
        return None;
    };
    let Yaml::Mapping(inner) = map.get(Yaml::from("context"))? else {
        return None;
    };
    match inner.get(Yaml::from("namespace")) {
        Some(Yaml::String(s)) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

impl KubeConfigEntry {
    fn cluster_item(&self) -> NamedItem {
        let mut cluster = Mapping::new();
        cluster.insert(Yaml::from("server"), Yaml::from(self.server.as_str()));
        if let Some(ca) = &self.certificate_authority_data {
            cluster.insert(
                Yaml::from("certificate-authority-data"),
                Yaml::from(STANDARD.encode(ca)),
            );
        }
        NamedItem {
            name: self.name.clone(),
            rest: section("cluster", cluster),
        }
    }

    fn user_item(&self) -> NamedItem {
        let mut user = Mapping::new();
        user.insert(Yaml::from("token"), Yaml::from(self.token.as_str()));
        NamedItem {
            name: self.name.clone(),
            rest: section("user", user),
        }
    }

    fn context_item(&self, previous_namespace: Option<String>) -> NamedItem {
        let mut context = Mapping::new();
        context.insert(Yaml::from("cluster"), Yaml::from(self.name.as_str()));
        context.insert(Yaml::from("user"), Yaml::from(self.name.as_str()));
        if let Some(ns) = self.namespace.clone().or(previous_namespace) {
            context.insert(Yaml::from("namespace"), Yaml::from(ns));
        }
        NamedItem {
            name: self.name.clone(),
            rest: section("context", context),
        }
    }
}

/// Replace the item with the same name in place, or append it
fn upsert(items: &mut Vec<NamedItem>, item: NamedItem) {
    match items.iter_mut().find(|i| i.name == item.name) {
        Some(existing) => *existing = item,
        None => items.push(item),
    }
}

/// Insert or update the cluster/user/context triple for `entry`.
///
/// An omitted namespace keeps whatever namespace the replaced context had.
pub fn merge_entry(cfg: &mut KubeConfig, entry: &KubeConfigEntry, policy: ContextPolicy) {
    tracing::debug!(
        name = %entry.name,
        cluster_exists = cfg.find_cluster(&entry.name).is_some(),
        user_exists = cfg.find_user(&entry.name).is_some(),
        "merging kubeconfig entry"
    );
    let previous_namespace = cfg
        .find_context(&entry.name)
        .and_then(|c| context_namespace(&c.rest));

    upsert(&mut cfg.clusters, entry.cluster_item());
    upsert(&mut cfg.users, entry.user_item());
    upsert(&mut cfg.contexts, entry.context_item(previous_namespace));

    if policy == ContextPolicy::Switch {
        cfg.current_context = Some(entry.name.clone());
    }
    cfg.ensure_defaults();
}

/// Load a kubeconfig, or start an empty one if the file does not exist
pub fn load_or_default(path: &Path) -> Result<KubeConfig> {
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(KubeConfig::default()),
        Err(source) => {
            return Err(KubedError::Kubeconfig {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    if content.trim().is_empty() {
        return Ok(KubeConfig::default());
    }
    serde_yaml_ng::from_str(&content).map_err(|source| KubedError::InvalidKubeconfig {
        path: path.to_path_buf(),
        source,
    })
}

/// Replace `path` with `contents` via a temp file in the same directory.
///
/// Readers see either the old file or the new one, never a partial write.
/// The temp file is created 0600 on unix and keeps that mode after rename.
/// A symlinked `path` is followed, so the link survives and its target is
/// the file replaced.
pub(crate) fn write_file_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let resolved = match fs::canonicalize(path) {
        Ok(p) => p,
        Err(e) if e.kind() == ErrorKind::NotFound => path.to_path_buf(),
        Err(e) => return Err(e),
    };
    let path = resolved.as_path();
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Serialize `cfg` and atomically write it to `path`
pub fn write_atomic(path: &Path, cfg: &KubeConfig) -> Result<()> {
    let yaml = serde_yaml_ng::to_string(cfg)?;
    write_file_atomic(path, yaml.as_bytes()).map_err(|source| KubedError::Kubeconfig {
        path: path.to_path_buf(),
        source,
    })
}

/// Merge `entry` into the kubeconfig at `path` (already ~-expanded)
pub fn apply(path: &Path, entry: &KubeConfigEntry, policy: ContextPolicy) -> Result<()> {
    let mut cfg = load_or_default(path)?;
    let existed = cfg.find_context(&entry.name).is_some();
    merge_entry(&mut cfg, entry, policy);
    write_atomic(path, &cfg)?;
    tracing::info!(
        context = %entry.name,
        path = %path.display(),
        updated = existed,
        "kubeconfig written"
    );
    Ok(())
}

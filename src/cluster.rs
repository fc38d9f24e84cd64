//! Connection parameters for one named cluster

use crate::error::{KubedError, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_AUTH_URL: &str = "https://auth.dataporten.no/oauth/authorization";

fn default_auth_url() -> String {
    DEFAULT_AUTH_URL.to_string()
}

/// Everything needed to (re)provision credentials for a cluster.
///
/// `name` doubles as the cluster, user and context name in the kubeconfig,
/// so running again for the same name updates entries in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSpec {
    pub name: String,
    pub api_server: String,
    pub issuer_url: String,
    pub client_id: String,
    /// Kubeconfig path as given, `~` is expanded at merge time
    pub kube_config: String,
    #[serde(default)]
    pub keep_context: bool,
    pub port: u16,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub manual_input: bool,
    #[serde(default = "default_auth_url")]
    pub auth_url: String,
}

impl ClusterSpec {
    /// Check that required parameters are present and well formed
    pub fn validate(&self) -> Result<()> {
        let missing: Vec<&'static str> = [
            ("--name", &self.name),
            ("--api-server", &self.api_server),
            ("--issuer", &self.issuer_url),
            ("--client-id", &self.client_id),
        ]
        .into_iter()
        .filter(|(_, v)| v.trim().is_empty())
        .map(|(flag, _)| flag)
        .collect();

        if !missing.is_empty() {
            return Err(KubedError::MissingParameter(missing));
        }

        check_url("api-server", &self.api_server)?;
        check_url("issuer", &self.issuer_url)?;
        check_url("auth-url", &self.auth_url)?;

        if self.port == 0 {
            return Err(KubedError::InvalidParameter {
                name: "port",
                reason: "must be between 1 and 65535".into(),
            });
        }
        if self.kube_config.trim().is_empty() {
            return Err(KubedError::InvalidParameter {
                name: "kube-config",
                reason: "path is empty".into(),
            });
        }
        Ok(())
    }
}

fn check_url(name: &'static str, value: &str) -> Result<()> {
    let parsed = url::Url::parse(value).map_err(|e| KubedError::InvalidParameter {
        name,
        reason: format!("'{}': {}", value, e),
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(KubedError::InvalidParameter {
            name,
            reason: format!("unsupported scheme '{}'", other),
        }),
    }
}

#[cfg(test)]
pub(crate) fn sample(name: &str) -> ClusterSpec {
    ClusterSpec {
        name: name.to_string(),
        api_server: "https://10.0.0.1:6443".to_string(),
        issuer_url: "https://issuer.example".to_string(),
        client_id: "client-123".to_string(),
        kube_config: "~/.kube/config".to_string(),
        keep_context: false,
        port: 49999,
        namespace: None,
        manual_input: false,
        auth_url: DEFAULT_AUTH_URL.to_string(),
    }
}

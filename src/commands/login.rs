//! Login pipeline: access token -> JWT -> kubeconfig -> saved settings

use crate::capture::TokenSource;
use crate::cluster::ClusterSpec;
use crate::config::Config;
use crate::error::Result;
use crate::issuer::IssuerClient;
use crate::kubeconfig::{self, ContextPolicy, KubeConfigEntry};
use crate::store::ClusterStore;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Where the cluster parameters for a run come from
#[derive(Debug, Clone)]
pub enum LoginRequest {
    /// Parameters given on the command line, saved after a successful run
    Fresh(ClusterSpec),
    /// Name of a previously saved cluster
    Renew(String),
}

#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub context_name: String,
    pub kubeconfig_path: PathBuf,
    pub ca_installed: bool,
    pub renewed: bool,
}

fn resolve(request: LoginRequest, store: &ClusterStore) -> Result<(ClusterSpec, bool)> {
    match request {
        LoginRequest::Fresh(spec) => {
            spec.validate()?;
            // The store is rewritten at the end; fail now if it is unreadable
            let known = store.names()?;
            debug!(saved = known.len(), path = %store.path().display(), "settings file readable");
            Ok((spec, false))
        }
        LoginRequest::Renew(name) => {
            let spec = store.load(&name).inspect_err(|_| {
                if let Ok(known) = store.names() {
                    if !known.is_empty() {
                        warn!(saved = %known.join(", "), "no saved settings for '{}'", name);
                    }
                }
            })?;
            info!(cluster = %name, path = %store.path().display(), "loaded saved cluster settings");
            spec.validate()?;
            Ok((spec, true))
        }
    }
}

/// Run one login end to end
pub fn run(
    request: LoginRequest,
    config: &Config,
    store: &ClusterStore,
    source: &dyn TokenSource,
) -> Result<LoginOutcome> {
    let (spec, renewed) = resolve(request, store)?;

    info!(cluster = %spec.name, "requesting access token");
    let access_token = source.access_token(&spec)?;

    info!(issuer = %spec.issuer_url, "requesting JWT");
    let issuer = IssuerClient::new(&spec.issuer_url, config.http_timeout)?;
    let credential = issuer.fetch_credential(&access_token)?;
    let ca_installed = credential.ca_certificate.is_some();

    let kubeconfig_path = config.expand_home(&spec.kube_config);
    let entry = KubeConfigEntry {
        name: spec.name.clone(),
        server: spec.api_server.clone(),
        certificate_authority_data: credential.ca_certificate,
        token: credential.jwt,
        namespace: spec.namespace.clone(),
    };
    kubeconfig::apply(
        &kubeconfig_path,
        &entry,
        ContextPolicy::from_keep_flag(spec.keep_context),
    )?;

    if !renewed {
        store.save(&spec)?;
    }

    Ok(LoginOutcome {
        context_name: spec.name,
        kubeconfig_path,
        ca_installed,
        renewed,
    })
}

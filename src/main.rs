//! kubed - kubeconfig provisioning through an OAuth login
//!
//! Opens a browser login, exchanges the access token for a JWT at the token
//! issuer, and merges the credentials into the kubeconfig.

mod capture;
mod cli;
mod cluster;
mod commands;
mod config;
mod error;
mod issuer;
mod kubeconfig;
mod store;
#[cfg(test)]
mod logcapture;

use crate::capture::Interactive;
use crate::cli::Cli;
use crate::cluster::ClusterSpec;
use crate::commands::{LoginOutcome, LoginRequest};
use crate::config::Config;
use crate::error::{KubedError, Result};
use crate::store::ClusterStore;

use clap::{CommandFactory, Parser};
use clap_complete::{generate, shells};
use colored::Colorize;
use std::io;
use std::time::Duration;

/// Initialize tracing subscriber based on verbosity level
fn init_tracing(verbosity: u8) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = match verbosity {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Some(shell) = cli.completions.as_deref() {
        generate_completions(shell)?;
        return Ok(());
    }

    let config = Config::detect(Duration::from_secs(cli.timeout))?;
    let store = ClusterStore::new(config.store_path.clone());
    let source = Interactive {
        timeout: config.capture_timeout,
    };

    let outcome = commands::run(login_request(cli), &config, &store, &source).map_err(|e| {
        let phase = e.phase();
        anyhow::Error::new(e).context(format!("{} failed", phase))
    })?;

    print_summary(&outcome);
    Ok(())
}

/// Turn parsed flags into a fresh login or a renewal
fn login_request(cli: Cli) -> LoginRequest {
    if let Some(name) = cli.renew {
        return LoginRequest::Renew(name);
    }
    LoginRequest::Fresh(ClusterSpec {
        name: cli.name.unwrap_or_default(),
        api_server: cli.api_server.unwrap_or_default(),
        issuer_url: cli.issuer_url.unwrap_or_default(),
        client_id: cli.client_id.unwrap_or_default(),
        kube_config: cli.kube_config,
        keep_context: cli.keep_context,
        port: cli.port,
        namespace: cli.namespace.filter(|ns| !ns.trim().is_empty()),
        manual_input: cli.manual_input,
        auth_url: cli.auth_url,
    })
}

fn print_summary(outcome: &LoginOutcome) {
    let program = std::env::args()
        .next()
        .unwrap_or_else(|| env!("CARGO_PKG_NAME").to_string());

    println!(
        "{} Kubernetes configuration saved in \"{}\" with context \"{}\"",
        "✓".green(),
        outcome.kubeconfig_path.display(),
        outcome.context_name.bold()
    );
    if !outcome.ca_installed {
        println!(
            "  {}",
            "No CA certificate from the issuer, relying on the system trust store".yellow()
        );
    }
    if !outcome.renewed {
        println!("  Cluster settings saved for renewal");
    }
    println!(
        "To renew the JWT for this cluster run: {}",
        format!("{} --renew {}", program, outcome.context_name).cyan()
    );
}

/// Generate shell completions
fn generate_completions(shell: &str) -> Result<()> {
    let mut cmd = Cli::command();
    let mut stdout = io::stdout();
    let bin = env!("CARGO_PKG_NAME");

    match shell {
        "bash" => generate(shells::Bash, &mut cmd, bin, &mut stdout),
        "zsh" => generate(shells::Zsh, &mut cmd, bin, &mut stdout),
        "fish" => generate(shells::Fish, &mut cmd, bin, &mut stdout),
        "elvish" => generate(shells::Elvish, &mut cmd, bin, &mut stdout),
        "powershell" => generate(shells::PowerShell, &mut cmd, bin, &mut stdout),
        other => {
            return Err(KubedError::InvalidParameter {
                name: "completions",
                reason: format!(
                    "unsupported shell '{}' (use bash, zsh, fish, elvish, or powershell)",
                    other
                ),
            })
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["kubed", "--name", "prod"]);
        assert_eq!(cli.kube_config, "~/.kube/config");
        assert_eq!(cli.port, 49999);
        assert_eq!(cli.timeout, 300);
        assert_eq!(cli.auth_url, cluster::DEFAULT_AUTH_URL);
        assert!(!cli.keep_context);
        assert!(!cli.manual_input);
        assert!(cli.renew.is_none());
    }

    #[test]
    fn test_cli_fresh_request() {
        let cli = Cli::parse_from([
            "kubed",
            "--name",
            "prod",
            "--api-server",
            "https://10.0.0.1:6443",
            "--issuer",
            "https://issuer.example",
            "--client-id",
            "abc",
            "--keep-context",
            "--namespace",
            "team-a",
            "--port",
            "50000",
        ]);
        match login_request(cli) {
            LoginRequest::Fresh(spec) => {
                assert_eq!(spec.name, "prod");
                assert_eq!(spec.api_server, "https://10.0.0.1:6443");
                assert_eq!(spec.issuer_url, "https://issuer.example");
                assert_eq!(spec.client_id, "abc");
                assert!(spec.keep_context);
                assert_eq!(spec.namespace.as_deref(), Some("team-a"));
                assert_eq!(spec.port, 50000);
                assert!(spec.validate().is_ok());
            }
            other => panic!("expected Fresh request, got {:?}", other),
        }
    }

    #[test]
    fn test_cli_renew_request() {
        let cli = Cli::parse_from(["kubed", "--renew", "prod"]);
        match login_request(cli) {
            LoginRequest::Renew(name) => assert_eq!(name, "prod"),
            other => panic!("expected Renew request, got {:?}", other),
        }
    }

    #[test]
    fn test_cli_renew_conflicts_with_name() {
        assert!(Cli::try_parse_from(["kubed", "--renew", "prod", "--name", "dev"]).is_err());
    }

    #[test]
    fn test_cli_rejects_port_zero() {
        assert!(Cli::try_parse_from(["kubed", "--port", "0"]).is_err());
        assert!(Cli::try_parse_from(["kubed", "--port", "70000"]).is_err());
    }

    #[test]
    fn test_cli_missing_flags_reported_by_validate() {
        let cli = Cli::parse_from(["kubed", "--name", "prod", "--namespace", " "]);
        match login_request(cli) {
            LoginRequest::Fresh(spec) => {
                assert!(spec.namespace.is_none());
                assert!(matches!(
                    spec.validate(),
                    Err(KubedError::MissingParameter(ref flags)) if flags.len() == 3
                ));
            }
            other => panic!("expected Fresh request, got {:?}", other),
        }
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }
}

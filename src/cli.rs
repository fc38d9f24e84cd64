//! Command line interface definitions

use clap::Parser;

#[derive(Parser)]
#[command(
    name = "kubed",
    version,
    about = "Provision kubeconfig credentials from an OAuth login",
    long_about = "kubed logs you in through the browser, exchanges the OAuth access token for a JWT \
                  at the token issuer, and merges the cluster, user and context into your kubeconfig.\n\n\
                  Examples:\n  \
                  kubed --name prod --api-server https://10.0.0.1:6443 \\\n        \
                  --issuer https://issuer.example --client-id abc123\n  \
                  kubed --renew prod    # Renew the token for a saved cluster"
)]
pub struct Cli {
    /// Name of this Kubernetes cluster, used for the user and context as well
    #[arg(long, value_name = "NAME", conflicts_with = "renew")]
    pub name: Option<String>,

    /// Address of the Kubernetes API server
    #[arg(long, value_name = "URL", conflicts_with = "renew")]
    pub api_server: Option<String>,

    /// Address of the JWT token issuer
    #[arg(long = "issuer", value_name = "URL", conflicts_with = "renew")]
    pub issuer_url: Option<String>,

    /// OAuth client ID registered for kubed
    #[arg(long, value_name = "ID", conflicts_with = "renew")]
    pub client_id: Option<String>,

    /// Kubeconfig file to update
    #[arg(long = "kube-config", value_name = "PATH", default_value = "~/.kube/config")]
    pub kube_config: String,

    /// Keep the current context instead of switching to the new one
    #[arg(long)]
    pub keep_context: bool,

    /// Local port the OAuth provider redirects to
    #[arg(
        long,
        value_name = "PORT",
        default_value_t = 49999,
        value_parser = clap::value_parser!(u16).range(1..)
    )]
    pub port: u16,

    /// Default namespace for the context
    #[arg(long, value_name = "NS")]
    pub namespace: Option<String>,

    /// Paste the redirect URL instead of starting a local listener (no local browser)
    #[arg(long)]
    pub manual_input: bool,

    /// OAuth authorization endpoint
    #[arg(
        long,
        value_name = "URL",
        default_value = "https://auth.dataporten.no/oauth/authorization"
    )]
    pub auth_url: String,

    /// Name of a saved cluster to renew the JWT for
    #[arg(long, value_name = "NAME")]
    pub renew: Option<String>,

    /// Seconds to wait for the browser login to complete
    #[arg(long, value_name = "SECS", default_value_t = 300)]
    pub timeout: u64,

    /// Print shell completions and exit (bash, zsh, fish, elvish, powershell)
    #[arg(long, value_name = "SHELL")]
    pub completions: Option<String>,

    /// Enable verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

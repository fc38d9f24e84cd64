//! Custom error types for kubed

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Stage of a run an error belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Configuration,
    Capture,
    Exchange,
    Merge,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Configuration => "configuration",
            Phase::Capture => "token capture",
            Phase::Exchange => "token exchange",
            Phase::Merge => "kubeconfig merge",
        };
        f.write_str(name)
    }
}

/// Main error type for kubed operations
#[derive(Error, Debug)]
pub enum KubedError {
    #[error("missing required parameter(s): {}\n\n  Run 'kubed --help' for usage", .0.join(", "))]
    MissingParameter(Vec<&'static str>),

    #[error("invalid {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("cluster '{0}' not found in saved settings\n\n  Run kubed once with --name {0} and the other required flags to register it")]
    ClusterNotFound(String),

    #[error("cannot resolve home directory\n\n  HOME environment variable may not be set")]
    NoHomeDir,

    #[error("invalid settings file {path}: {source}")]
    InvalidSettings {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("settings file {path}: {source}")]
    Settings {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot listen on localhost:{port}: {source}\n\n  Another process may hold the port. Use --port to pick a different one")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to open browser: {0}\n\n  Use --manual-input to paste the redirect URL instead")]
    BrowserLaunch(String),

    #[error("no access token received within {}s\n\n  Finish the login in the browser sooner or raise --timeout", .0.as_secs())]
    CaptureTimeout(Duration),

    #[error("cannot extract access token: {0}")]
    TokenExtraction(String),

    #[error("cannot read the redirect URL from stdin: {0}")]
    ReadInput(#[source] std::io::Error),

    #[error("input cancelled")]
    Cancelled,

    #[error("request to issuer {url} failed: {source}")]
    IssuerRequest {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("issuer {url} returned HTTP {status}: {body}")]
    IssuerStatus {
        url: String,
        status: u16,
        body: String,
    },

    #[error("issuer {0} returned an empty token")]
    EmptyJwt(String),

    #[error("invalid CA certificate from issuer: {0}")]
    InvalidCaCertificate(String),

    #[error("invalid kubeconfig {path}: {source}\n\n  Fix or move the file; it was left untouched")]
    InvalidKubeconfig {
        path: PathBuf,
        #[source]
        source: serde_yaml_ng::Error,
    },

    #[error("kubeconfig {path}: {source}")]
    Kubeconfig {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}

impl KubedError {
    /// Phase of the run that produced this error
    pub fn phase(&self) -> Phase {
        match self {
            KubedError::MissingParameter(_)
            | KubedError::InvalidParameter { .. }
            | KubedError::ClusterNotFound(_)
            | KubedError::NoHomeDir
            | KubedError::InvalidSettings { .. }
            | KubedError::Settings { .. } => Phase::Configuration,
            KubedError::Bind { .. }
            | KubedError::BrowserLaunch(_)
            | KubedError::CaptureTimeout(_)
            | KubedError::TokenExtraction(_)
            | KubedError::ReadInput(_)
            | KubedError::Cancelled => Phase::Capture,
            KubedError::IssuerRequest { .. }
            | KubedError::IssuerStatus { .. }
            | KubedError::EmptyJwt(_)
            | KubedError::InvalidCaCertificate(_) => Phase::Exchange,
            KubedError::InvalidKubeconfig { .. }
            | KubedError::Kubeconfig { .. }
            | KubedError::Yaml(_) => Phase::Merge,
        }
    }
}

/// Result type alias for kubed operations
pub type Result<T> = std::result::Result<T, KubedError>;

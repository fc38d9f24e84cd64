//! Client for the JWT token issuer

use crate::error::{KubedError, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::blocking::{Client, Response};
use std::time::Duration;
use tracing::{debug, warn};

/// Credentials handed out by the issuer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedCredential {
    pub jwt: String,
    /// CA certificate for the API server; `None` means use system trust
    pub ca_certificate: Option<Vec<u8>>,
}

pub struct IssuerClient {
    http: Client,
    base_url: String,
}

impl IssuerClient {
    pub fn new(issuer_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = issuer_url.trim_end_matches('/').to_string();
        let http = Client::builder()
            .user_agent(concat!("kubed/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|source| KubedError::IssuerRequest {
                url: base_url.clone(),
                source,
            })?;
        Ok(Self { http, base_url })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Exchange an OAuth access token for a JWT. Not retried.
    pub fn exchange_jwt(&self, access_token: &str) -> Result<String> {
        let url = self.endpoint("token");
        debug!(%url, "requesting JWT");
        let response = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .map_err(|source| KubedError::IssuerRequest {
                url: url.clone(),
                source,
            })?;

        let body = success_body(&url, response)?;
        let jwt = String::from_utf8_lossy(&body).trim().to_string();
        if jwt.is_empty() {
            return Err(KubedError::EmptyJwt(url));
        }
        Ok(jwt)
    }

    /// Fetch the cluster CA certificate published by the issuer
    pub fn fetch_ca_certificate(&self) -> Result<Vec<u8>> {
        let url = self.endpoint("ca");
        debug!(%url, "requesting CA certificate");
        let response = self
            .http
            .get(&url)
            .send()
            .map_err(|source| KubedError::IssuerRequest {
                url: url.clone(),
                source,
            })?;
        decode_ca(&success_body(&url, response)?)
    }

    /// Exchange the token, then try to add the CA certificate.
    ///
    /// A failed CA fetch is logged and leaves `ca_certificate` unset.
    pub fn fetch_credential(&self, access_token: &str) -> Result<IssuedCredential> {
        let jwt = self.exchange_jwt(access_token)?;
        let ca_certificate = match self.fetch_ca_certificate() {
            Ok(ca) => Some(ca),
            Err(e) => {
                warn!(
                    error = %e,
                    "no custom CA certificate provided, assuming the API server uses a publicly trusted certificate"
                );
                None
            }
        };
        Ok(IssuedCredential {
            jwt,
            ca_certificate,
        })
    }
}

fn success_body(url: &str, response: Response) -> Result<Vec<u8>> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().unwrap_or_default();
        let body: String = body.trim().chars().take(200).collect();
        return Err(KubedError::IssuerStatus {
            url: url.to_string(),
            status: status.as_u16(),
            body,
        });
    }
    response
        .bytes()
        .map(|b| b.to_vec())
        .map_err(|source| KubedError::IssuerRequest {
            url: url.to_string(),
            source,
        })
}

/// PEM is kept verbatim; anything else must be base64
fn decode_ca(body: &[u8]) -> Result<Vec<u8>> {
    let text = String::from_utf8_lossy(body);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(KubedError::InvalidCaCertificate("empty response".into()));
    }
    if trimmed.starts_with("-----BEGIN") {
        return Ok(body.to_vec());
    }
    let compact: String = trimmed.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD
        .decode(compact)
        .map_err(|e| KubedError::InvalidCaCertificate(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logcapture;
    use mockito::{Matcher, Server};

    const PEM: &str = "-----BEGIN CERTIFICATE-----\nMIIB\n-----END CERTIFICATE-----\n";

    fn client(url: &str) -> IssuerClient {
        IssuerClient::new(url, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_exchange_sends_bearer_token() {
        let mut server = Server::new();
        let token = server
            .mock("GET", "/token")
            .match_header("authorization", "Bearer access-1")
            .with_body("abc.def.ghi\n")
            .expect(1)
            .create();

        let jwt = client(&format!("{}/", server.url()))
            .exchange_jwt("access-1")
            .unwrap();
        assert_eq!(jwt, "abc.def.ghi");
        token.assert();
    }

    #[test]
    fn test_exchange_non_success_is_error() {
        let mut server = Server::new();
        let token = server
            .mock("GET", "/token")
            .with_status(401)
            .with_body("invalid token")
            .expect(1)
            .create();

        match client(&server.url()).exchange_jwt("bad") {
            Err(KubedError::IssuerStatus { status, body, .. }) => {
                assert_eq!(status, 401);
                assert_eq!(body, "invalid token");
            }
            other => panic!("expected IssuerStatus, got {:?}", other),
        }
        // Exactly one request, no retry
        token.assert();
    }

    #[test]
    fn test_error_body_is_truncated() {
        let mut server = Server::new();
        server
            .mock("GET", "/token")
            .with_status(502)
            .with_body("x".repeat(500))
            .create();

        match client(&server.url()).exchange_jwt("t") {
            Err(KubedError::IssuerStatus { status, body, .. }) => {
                assert_eq!(status, 502);
                assert_eq!(body.chars().count(), 200);
            }
            other => panic!("expected IssuerStatus, got {:?}", other),
        }
    }

    #[test]
    fn test_exchange_empty_body_is_error() {
        let mut server = Server::new();
        server.mock("GET", "/token").with_body("  \n").create();
        assert!(matches!(
            client(&server.url()).exchange_jwt("t"),
            Err(KubedError::EmptyJwt(_))
        ));
    }

    #[test]
    fn test_exchange_unreachable_is_transport_error() {
        // Bind then drop to get a port nothing listens on
        let addr = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap();
        let err = client(&format!("http://{}", addr))
            .exchange_jwt("t")
            .unwrap_err();
        assert!(matches!(err, KubedError::IssuerRequest { .. }));
        assert_eq!(err.phase(), crate::error::Phase::Exchange);
    }

    #[test]
    fn test_fetch_ca_pem_and_base64() {
        let mut server = Server::new();
        server.mock("GET", "/ca").with_body(PEM).create();
        assert_eq!(
            client(&server.url()).fetch_ca_certificate().unwrap(),
            PEM.as_bytes()
        );

        let encoded = STANDARD.encode(PEM);
        assert_eq!(decode_ca(encoded.as_bytes()).unwrap(), PEM.as_bytes());
        assert!(matches!(
            decode_ca(b"not base64 at all!"),
            Err(KubedError::InvalidCaCertificate(_))
        ));
        assert!(decode_ca(b"\n").is_err());
    }

    #[test]
    fn test_credential_with_ca() {
        let mut server = Server::new();
        server.mock("GET", "/token").with_body("jwt-1").create();
        let ca = server
            .mock("GET", "/ca")
            .match_header("authorization", Matcher::Missing)
            .with_body(PEM)
            .expect(1)
            .create();

        let cred = client(&server.url()).fetch_credential("t").unwrap();
        assert_eq!(cred.jwt, "jwt-1");
        assert_eq!(cred.ca_certificate.as_deref(), Some(PEM.as_bytes()));
        ca.assert();
    }

    #[test]
    fn test_credential_without_ca_is_not_fatal() {
        let mut server = Server::new();
        server.mock("GET", "/token").with_body("jwt-1").create();
        server.mock("GET", "/ca").with_status(404).create();

        let (cred, logs) = logcapture::capture(|| client(&server.url()).fetch_credential("t"));
        let cred = cred.unwrap();
        assert_eq!(cred.jwt, "jwt-1");
        assert_eq!(cred.ca_certificate, None);
        assert!(logs.contains("WARN"));
        assert!(logs.contains("no custom CA certificate"));
    }

    #[test]
    fn test_failed_exchange_skips_ca() {
        let mut server = Server::new();
        server
            .mock("GET", "/token")
            .with_status(500)
            .with_body("boom")
            .create();
        let ca = server.mock("GET", "/ca").with_body(PEM).expect(0).create();

        assert!(client(&server.url()).fetch_credential("t").is_err());
        ca.assert();
    }
}

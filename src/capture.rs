//! Access token capture from the OAuth implicit-flow redirect
//!
//! The identity provider redirects the browser to `http://localhost:<port>/`
//! with the access token in the URL fragment. Browsers never send fragments to
//! the server, so the landing page reads `location.hash` in a small script and
//! forwards the token to `/token?access_token=...`, which hands it to the
//! waiting process.

use crate::cluster::ClusterSpec;
use crate::error::{KubedError, Result};
use std::io::{self, BufRead, BufReader, IsTerminal, Write};
use std::net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// How long a single browser connection may sit idle before it is dropped
const CONNECTION_READ_TIMEOUT: Duration = Duration::from_secs(5);

const LANDING_PAGE: &str = r#"<!DOCTYPE html>
<html><head><meta charset="utf-8"><title>kubed</title></head>
<body style="font-family: sans-serif; text-align: center; padding: 50px;">
<p id="status">Completing login...</p>
<script>
  var params = new URLSearchParams(window.location.hash.substring(1));
  var token = params.get("access_token");
  if (token) {
    window.location.replace("/token?access_token=" + encodeURIComponent(token));
  } else {
    var reason = params.get("error_description") || params.get("error") || "no access_token in redirect";
    document.getElementById("status").textContent = "Login failed: " + reason;
  }
</script>
</body></html>"#;

const DONE_PAGE: &str = r#"<!DOCTYPE html>
<html><head><meta charset="utf-8"><title>kubed</title></head>
<body style="font-family: sans-serif; text-align: center; padding: 50px;">
<h1>Login complete</h1>
<p>You can close this window and return to the terminal.</p>
</body></html>"#;

/// Build the implicit-flow authorization URL for `client_id`
pub fn authorization_url(auth_url: &str, client_id: &str) -> Result<String> {
    let url = Url::parse_with_params(
        auth_url,
        &[("response_type", "token"), ("client_id", client_id)],
    )
    .map_err(|e| KubedError::InvalidParameter {
        name: "auth-url",
        reason: e.to_string(),
    })?;
    Ok(url.into())
}

/// Pull `access_token` out of a pasted redirect URL fragment
pub fn extract_access_token(redirect_url: &str) -> Result<String> {
    let (_, fragment) = redirect_url
        .trim()
        .split_once('#')
        .ok_or_else(|| KubedError::TokenExtraction("redirect URL has no '#' fragment".into()))?;

    let token = url::form_urlencoded::parse(fragment.as_bytes())
        .find(|(key, _)| key == "access_token")
        .map(|(_, value)| value.into_owned())
        .ok_or_else(|| {
            KubedError::TokenExtraction("redirect URL fragment has no access_token".into())
        })?;

    if token.is_empty() {
        return Err(KubedError::TokenExtraction("access_token is empty".into()));
    }
    Ok(token)
}

/// Produces the access token for a run
pub trait TokenSource {
    fn access_token(&self, spec: &ClusterSpec) -> Result<String>;
}

/// Browser login through the local listener, or a pasted URL with manual input
pub struct Interactive {
    pub timeout: Duration,
}

impl TokenSource for Interactive {
    fn access_token(&self, spec: &ClusterSpec) -> Result<String> {
        let auth_url = authorization_url(&spec.auth_url, &spec.client_id)?;
        if spec.manual_input {
            return read_pasted_token(&auth_url);
        }

        let server = CaptureServer::bind(spec.port)?;
        println!("Opening browser to log in. If it does not open, visit:\n  {}", auth_url);

        let spinner = waiting_spinner(server.port());
        let result = server.run(&auth_url, self.timeout, |url| open::that(url));
        if let Some(pb) = spinner {
            pb.finish_and_clear();
        }
        result
    }
}

fn waiting_spinner(port: u16) -> Option<indicatif::ProgressBar> {
    use indicatif::{ProgressBar, ProgressStyle};

    if !io::stderr().is_terminal() {
        return None;
    }
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(format!("Waiting for login callback on localhost:{}...", port));
    pb.enable_steady_tick(Duration::from_millis(100));
    Some(pb)
}

fn read_pasted_token(auth_url: &str) -> Result<String> {
    println!("Open a browser and navigate to {}", auth_url);
    println!("After authentication you are redirected to a URL that may not load. Copy/paste it below.");

    if !io::stdin().is_terminal() {
        return read_redirect_line(io::stdin().lock());
    }
    let pasted = inquire::Text::new("Redirected URL:")
        .prompt()
        .map_err(|_| KubedError::Cancelled)?;
    extract_access_token(&pasted)
}

/// Piped input: the first line is the redirect URL
fn read_redirect_line(mut input: impl BufRead) -> Result<String> {
    let mut line = String::new();
    input.read_line(&mut line).map_err(KubedError::ReadInput)?;
    extract_access_token(&line)
}

/// What the waiting side can be told
#[derive(Debug)]
enum CaptureEvent {
    Token(String),
    BrowserFailed(String),
}

/// How the listener answers one request target
#[derive(Debug, PartialEq, Eq)]
enum Route {
    Landing,
    Captured(String),
    MissingToken,
    NotFound,
}

fn route(target: &str) -> Route {
    let Ok(url) = Url::parse(&format!("http://localhost{}", target)) else {
        return Route::NotFound;
    };
    match url.path() {
        "/token" => url
            .query_pairs()
            .find(|(k, _)| k == "access_token")
            .map(|(_, v)| v.into_owned())
            .filter(|t| !t.is_empty())
            .map(Route::Captured)
            .unwrap_or(Route::MissingToken),
        "/favicon.ico" => Route::NotFound,
        _ => Route::Landing,
    }
}

/// Short-lived HTTP listener bound to the loopback interface
pub struct CaptureServer {
    listener: TcpListener,
    addr: SocketAddr,
}

impl CaptureServer {
    pub fn bind(port: u16) -> Result<Self> {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, port))
            .map_err(|source| KubedError::Bind { port, source })?;
        let addr = listener
            .local_addr()
            .map_err(|source| KubedError::Bind { port, source })?;
        Ok(Self { listener, addr })
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Launch the browser and block until a token arrives, the launcher
    /// fails, or `timeout` passes. The listener is shut down in every case.
    pub fn run<F>(self, auth_url: &str, timeout: Duration, launcher: F) -> Result<String>
    where
        F: FnOnce(&str) -> io::Result<()> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let stop = Arc::new(AtomicBool::new(false));
        let addr = self.addr;
        let accept_loop = self.spawn_accept_loop(tx.clone(), Arc::clone(&stop));

        info!(port = addr.port(), "waiting for browser callback");
        let url = auth_url.to_string();
        thread::spawn(move || {
            if let Err(e) = launcher(&url) {
                let _ = tx.send(CaptureEvent::BrowserFailed(e.to_string()));
            }
        });

        let result = match rx.recv_timeout(timeout) {
            Ok(CaptureEvent::Token(token)) => Ok(token),
            Ok(CaptureEvent::BrowserFailed(reason)) => Err(KubedError::BrowserLaunch(reason)),
            Err(RecvTimeoutError::Timeout) => Err(KubedError::CaptureTimeout(timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(KubedError::BrowserLaunch(
                "listener stopped before a token arrived".into(),
            )),
        };

        stop.store(true, Ordering::SeqCst);
        // Wake the blocking accept so it sees the stop flag
        let _ = TcpStream::connect(addr);
        let _ = accept_loop.join();
        result
    }

    fn spawn_accept_loop(self, tx: Sender<CaptureEvent>, stop: Arc<AtomicBool>) -> JoinHandle<()> {
        thread::spawn(move || {
            for stream in self.listener.incoming() {
                if stop.load(Ordering::SeqCst) {
                    break;
                }
                match stream {
                    Ok(stream) => {
                        let tx = tx.clone();
                        thread::spawn(move || {
                            if let Err(e) = handle_connection(stream, &tx) {
                                debug!(error = %e, "callback connection failed");
                            }
                        });
                    }
                    Err(e) => debug!(error = %e, "accept failed"),
                }
            }
        })
    }
}

fn handle_connection(mut stream: TcpStream, tx: &Sender<CaptureEvent>) -> io::Result<()> {
    stream.set_read_timeout(Some(CONNECTION_READ_TIMEOUT))?;
    let mut reader = BufReader::new(stream.try_clone()?);

    let mut request_line = String::new();
    if reader.read_line(&mut request_line)? == 0 {
        return Ok(());
    }
    // Drain headers
    let mut line = String::new();
    while reader.read_line(&mut line)? > 0 && !line.trim().is_empty() {
        line.clear();
    }

    let target = request_line.split_whitespace().nth(1).unwrap_or("/");
    debug!(method = request_line.split_whitespace().next().unwrap_or(""), path = %target.split('?').next().unwrap_or(""), "callback request");

    let (status, body) = match route(target) {
        Route::Landing => ("200 OK", LANDING_PAGE),
        Route::Captured(token) => {
            let _ = tx.send(CaptureEvent::Token(token));
            ("200 OK", DONE_PAGE)
        }
        Route::MissingToken => ("400 Bad Request", "missing access_token"),
        Route::NotFound => ("404 Not Found", "not found"),
    };

    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nCache-Control: no-store\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    );
    stream.write_all(response.as_bytes())?;
    stream.flush()
}

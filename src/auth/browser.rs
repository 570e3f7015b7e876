//! Browser-mediated authentication step.
//!
//! Credential entry always happens in an external user agent, never inside
//! this process; the trait below is the seam between the flow and whatever
//! opens the URL. The default implementation launches the OS browser and
//! catches the redirect on a loopback listener, the native-app equivalent of
//! the mobile deep link (RFC 8252).

use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use super::error::AuthError;

/// Result of handing an authorization URL to the user agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowserOutcome {
    /// The agent returned to the redirect URI; carries the full callback URL.
    Redirect(String),
    /// The user explicitly aborted the sign-in.
    Cancelled,
    /// The agent went away without completing (window closed, timeout).
    Dismissed,
}

/// External user agent that performs the credential-entry step.
#[async_trait]
pub trait UserAgent: Send + Sync {
    /// Open `url` and wait until the agent lands on `return_url_prefix`,
    /// is cancelled, or gives up.
    async fn open(&self, url: &str, return_url_prefix: &str)
        -> Result<BrowserOutcome, AuthError>;
}

/// Default user agent: OS browser plus a one-shot loopback redirect catcher.
#[derive(Debug, Clone)]
pub struct SystemBrowser {
    /// How long to wait for the user to finish at the IdP.
    pub wait_timeout: Duration,
}

impl Default for SystemBrowser {
    fn default() -> Self {
        Self {
            wait_timeout: Duration::from_secs(5 * 60),
        }
    }
}

#[async_trait]
impl UserAgent for SystemBrowser {
    async fn open(
        &self,
        url: &str,
        return_url_prefix: &str,
    ) -> Result<BrowserOutcome, AuthError> {
        let (bind_addr, callback_path) = split_loopback_prefix(return_url_prefix)?;
        // Bind before launching the browser so the redirect cannot race us.
        let listener = TcpListener::bind(bind_addr.as_str()).await?;

        if !try_open_browser(url) {
            tracing::debug!("no system browser available; waiting for manual navigation");
        }

        match tokio::time::timeout(
            self.wait_timeout,
            wait_for_callback(&listener, return_url_prefix, &callback_path),
        )
        .await
        {
            Ok(result) => result,
            Err(_elapsed) => Ok(BrowserOutcome::Dismissed),
        }
    }
}

/// Accept loopback connections until one requests the callback path.
async fn wait_for_callback(
    listener: &TcpListener,
    return_url_prefix: &str,
    callback_path: &str,
) -> Result<BrowserOutcome, AuthError> {
    loop {
        let (mut stream, _) = listener.accept().await?;
        let mut buf = vec![0u8; 8192];
        let read = stream.read(&mut buf).await?;
        let request = String::from_utf8_lossy(&buf[..read]).into_owned();

        let Some(target) = request_target(&request) else {
            let _ = stream.write_all(plain_response(400, "bad request").as_bytes()).await;
            continue;
        };

        // Browsers also probe /favicon.ico and friends; only the callback
        // path ends the wait.
        if target != callback_path && !target.starts_with(&format!("{callback_path}?")) {
            let _ = stream.write_all(plain_response(404, "not found").as_bytes()).await;
            continue;
        }

        let _ = stream.write_all(callback_page_response().as_bytes()).await;
        let _ = stream.flush().await;

        let base = return_url_prefix
            .split_once(callback_path)
            .map(|(base, _)| base)
            .unwrap_or(return_url_prefix);
        return Ok(BrowserOutcome::Redirect(format!("{base}{target}")));
    }
}

/// Extract `(bind address, path)` from a loopback redirect URI such as
/// `http://127.0.0.1:8732/callback`.
fn split_loopback_prefix(prefix: &str) -> Result<(String, String), AuthError> {
    let rest = prefix.strip_prefix("http://").ok_or_else(|| {
        AuthError::Invalid(format!(
            "redirect URI `{prefix}` must be a plain-http loopback address"
        ))
    })?;
    let (host_port, path) = match rest.find('/') {
        Some(index) => (&rest[..index], &rest[index..]),
        None => (rest, "/"),
    };
    if host_port.is_empty() {
        return Err(AuthError::Invalid(format!(
            "redirect URI `{prefix}` is missing a host"
        )));
    }
    Ok((host_port.to_string(), path.to_string()))
}

/// First-line request target of a raw HTTP request, if well-formed.
fn request_target(request: &str) -> Option<&str> {
    let line = request.lines().next()?;
    let mut parts = line.split_whitespace();
    let method = parts.next()?;
    let target = parts.next()?;
    if method != "GET" {
        return None;
    }
    Some(target)
}

fn plain_response(status: u16, body: &str) -> String {
    let reason = match status {
        400 => "Bad Request",
        404 => "Not Found",
        _ => "OK",
    };
    format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    )
}

fn callback_page_response() -> String {
    let body = "<!doctype html><html><head><title>mercato</title></head>\
                <body><p>You can close this tab and return to the terminal.</p>\
                </body></html>";
    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    )
}

/// Best-effort browser launcher used by `mercato login` and logout.
pub fn try_open_browser(url: &str) -> bool {
    #[cfg(target_os = "macos")]
    {
        // macOS standard browser launcher.
        return std::process::Command::new("open")
            .arg(url)
            .status()
            .is_ok_and(|status| status.success());
    }
    #[cfg(target_os = "windows")]
    {
        // Windows shell launcher.
        return std::process::Command::new("cmd")
            .args(["/C", "start", "", url])
            .status()
            .is_ok_and(|status| status.success());
    }
    #[cfg(all(unix, not(target_os = "macos")))]
    {
        // Linux/BSD desktop launcher.
        return std::process::Command::new("xdg-open")
            .arg(url)
            .status()
            .is_ok_and(|status| status.success());
    }
    #[allow(unreachable_code)]
    false
}

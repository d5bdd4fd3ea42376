//! HTTPS (CONNECT) tunnel negotiation through an upstream proxy.
//!
//! Implements the client side of the HTTP CONNECT handshake: send the
//! request, validate the status-line prefix, then discard the remaining
//! response headers so the stream is positioned at the first tunnelled
//! byte.

use super::validate_target;
use crate::config::UpstreamAuthConfig;
use crate::{Error, Result};
use base64::Engine;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Span covering "HTTP/1.x NNN " in a status line.
const STATUS_PREFIX_LEN: usize = 13;

/// CONNECT-method tunnel negotiator
#[derive(Debug, Clone, Default)]
pub struct HttpsConnector {
    username: Option<String>,
    password: Option<String>,
}

impl HttpsConnector {
    pub fn new() -> Self {
        HttpsConnector::default()
    }

    pub fn with_auth(auth: &UpstreamAuthConfig) -> Self {
        HttpsConnector {
            username: auth.username.clone(),
            password: auth.password.clone(),
        }
    }

    pub fn with_credentials(
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        HttpsConnector {
            username: Some(username.into()),
            password: Some(password.into()),
        }
    }

    /// Negotiate a tunnel to `host:port`, occupying the calling task until
    /// the handshake resolves.
    ///
    /// Each `.await` below is one resumption point of the handshake state
    /// machine; `begin_negotiate` drives the identical future from a
    /// spawned task, so both forms accept and reject identical wire input.
    pub async fn negotiate<S>(&self, stream: &mut S, host: &str, port: u16) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        validate_target(host, port)?;

        let request = self.connect_bytes(host, port);
        stream
            .write_all(&request)
            .await
            .map_err(|e| Error::connection(format!("failed to send CONNECT request: {}", e)))?;
        stream.flush().await?;

        // The 13-byte prefix is the smallest span that pins down the
        // version token and the 3-digit status code.
        let mut head = [0u8; STATUS_PREFIX_LEN];
        let mut received = 0;
        while received < head.len() {
            let n = stream.read(&mut head[received..]).await?;
            if n == 0 {
                return Err(Error::connection(
                    "connection closed while reading CONNECT status",
                ));
            }
            received += n;
        }
        verify_status(&head)?;

        discard_headers(stream).await?;

        debug!("CONNECT tunnel to {}:{} established", host, port);
        Ok(())
    }

    /// Non-blocking form: runs the same handshake on a spawned task and
    /// hands the stream back through `on_complete`, invoked exactly once
    /// with the outcome.
    pub fn begin_negotiate<S, F>(&self, mut stream: S, host: String, port: u16, on_complete: F)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
        F: FnOnce(Result<S>) + Send + 'static,
    {
        let connector = self.clone();
        tokio::spawn(async move {
            let outcome = connector.negotiate(&mut stream, &host, port).await;
            on_complete(outcome.map(|()| stream));
        });
    }

    fn connect_bytes(&self, host: &str, port: u16) -> Vec<u8> {
        let mut request = format!(
            "CONNECT {}:{} HTTP/1.1\r\nHost: {}:{}\r\n",
            host, port, host, port
        );
        if let Some(username) = &self.username {
            let password = self.password.as_deref().unwrap_or("");
            let credentials = format!("{}:{}", username, password);
            let encoded = base64::engine::general_purpose::STANDARD.encode(credentials);
            request.push_str(&format!("Proxy-Authorization: Basic {}\r\n", encoded));
        }
        request.push_str("\r\n");
        request.into_bytes()
    }
}

fn verify_status(head: &[u8; STATUS_PREFIX_LEN]) -> Result<()> {
    let version_ok = head[..9].eq_ignore_ascii_case(b"HTTP/1.1 ")
        || head[..9].eq_ignore_ascii_case(b"HTTP/1.0 ");
    if !version_ok || head[12] != b' ' {
        return Err(Error::protocol("malformed CONNECT status line"));
    }

    let code = &head[9..12];
    if code != b"200" {
        return Err(Error::rejected(format!(
            "status code {}",
            String::from_utf8_lossy(code)
        )));
    }
    Ok(())
}

/// Discard response headers by scanning single bytes for the `\r\n\r\n`
/// terminator.
///
/// The scan is a 4-state counter: a byte matching the expected `\r`/`\n`
/// alternation advances it; a mismatching `\r` restarts a terminator at
/// state 1; anything else resets to 0.
pub(crate) async fn discard_headers<S>(stream: &mut S) -> Result<()>
where
    S: AsyncRead + Unpin,
{
    let mut newline_chars = 0u8;
    let mut byte = [0u8; 1];
    while newline_chars < 4 {
        let n = stream.read(&mut byte).await?;
        if n == 0 {
            return Err(Error::connection(
                "connection closed while discarding CONNECT headers",
            ));
        }

        let expected = if newline_chars % 2 == 0 { b'\r' } else { b'\n' };
        if byte[0] == expected {
            newline_chars += 1;
        } else if byte[0] == b'\r' {
            newline_chars = 1;
        } else {
            newline_chars = 0;
        }
    }
    Ok(())
}

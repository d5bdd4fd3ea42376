//! SOCKS5 tunnel negotiation through an upstream proxy (RFC 1928).

use super::validate_target;
use crate::config::UpstreamAuthConfig;
use crate::{Error, Result};
use std::net::{Ipv4Addr, Ipv6Addr};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

const SOCKS5_VERSION: u8 = 0x05;

const AUTH_NONE: u8 = 0x00;
const AUTH_PASSWORD: u8 = 0x02;
const AUTH_NO_ACCEPTABLE: u8 = 0xFF;

const CMD_CONNECT: u8 = 0x01;

const ATYP_IPV4: u8 = 0x01;
const ATYP_DOMAIN: u8 = 0x03;
const ATYP_IPV6: u8 = 0x04;

const REP_SUCCESS: u8 = 0x00;
const REP_GENERAL_FAILURE: u8 = 0x01;
const REP_CONNECTION_NOT_ALLOWED: u8 = 0x02;
const REP_NETWORK_UNREACHABLE: u8 = 0x03;
const REP_HOST_UNREACHABLE: u8 = 0x04;
const REP_CONNECTION_REFUSED: u8 = 0x05;
const REP_TTL_EXPIRED: u8 = 0x06;
const REP_COMMAND_NOT_SUPPORTED: u8 = 0x07;
const REP_ADDRESS_TYPE_NOT_SUPPORTED: u8 = 0x08;

/// SOCKS5 client-role tunnel negotiator
#[derive(Debug, Clone, Default)]
pub struct Socks5Connector {
    username: Option<String>,
    password: Option<String>,
}

impl Socks5Connector {
    pub fn new() -> Self {
        Socks5Connector::default()
    }

    pub fn with_auth(auth: &UpstreamAuthConfig) -> Self {
        Socks5Connector {
            username: auth.username.clone(),
            password: auth.password.clone(),
        }
    }

    pub fn with_credentials(
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Socks5Connector {
            username: Some(username.into()),
            password: Some(password.into()),
        }
    }

    /// Negotiate a tunnel to `host:port` over the connected upstream
    /// stream, consuming the whole reply so the stream is positioned at
    /// the first tunnelled byte.
    pub async fn negotiate<S>(&self, stream: &mut S, host: &str, port: u16) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        validate_target(host, port)?;

        let mut greeting = vec![SOCKS5_VERSION];
        if self.username.is_some() && self.password.is_some() {
            greeting.push(2);
            greeting.push(AUTH_NONE);
            greeting.push(AUTH_PASSWORD);
        } else {
            greeting.push(1);
            greeting.push(AUTH_NONE);
        }
        stream
            .write_all(&greeting)
            .await
            .map_err(|e| Error::connection(format!("failed to send SOCKS5 greeting: {}", e)))?;

        let mut choice = [0u8; 2];
        stream.read_exact(&mut choice).await.map_err(|e| {
            Error::connection(format!("failed to read SOCKS5 method choice: {}", e))
        })?;
        if choice[0] != SOCKS5_VERSION {
            return Err(Error::protocol("invalid SOCKS5 version in method choice"));
        }

        match choice[1] {
            AUTH_NONE => {}
            AUTH_PASSWORD => self.authenticate_password(stream).await?,
            AUTH_NO_ACCEPTABLE => {
                return Err(Error::auth("no acceptable authentication method"))
            }
            method => {
                return Err(Error::protocol(format!(
                    "unsupported authentication method: {}",
                    method
                )))
            }
        }

        let mut request = vec![SOCKS5_VERSION, CMD_CONNECT, 0x00];
        if let Ok(ip) = host.parse::<Ipv4Addr>() {
            request.push(ATYP_IPV4);
            request.extend_from_slice(&ip.octets());
        } else if let Ok(ip) = host.parse::<Ipv6Addr>() {
            request.push(ATYP_IPV6);
            request.extend_from_slice(&ip.octets());
        } else {
            request.push(ATYP_DOMAIN);
            request.push(host.len() as u8);
            request.extend_from_slice(host.as_bytes());
        }
        request.extend_from_slice(&port.to_be_bytes());

        stream.write_all(&request).await.map_err(|e| {
            Error::connection(format!("failed to send SOCKS5 connect request: {}", e))
        })?;

        let mut reply = [0u8; 4];
        stream.read_exact(&mut reply).await.map_err(|e| {
            Error::connection(format!("failed to read SOCKS5 reply: {}", e))
        })?;
        if reply[0] != SOCKS5_VERSION {
            return Err(Error::protocol("invalid SOCKS5 version in reply"));
        }
        if reply[1] != REP_SUCCESS {
            return Err(Error::rejected(reply_error_message(reply[1])));
        }

        // Consume the bound address so no reply bytes leak into the tunnel.
        match reply[3] {
            ATYP_IPV4 => {
                let mut buf = [0u8; 6];
                stream.read_exact(&mut buf).await?;
            }
            ATYP_IPV6 => {
                let mut buf = [0u8; 18];
                stream.read_exact(&mut buf).await?;
            }
            ATYP_DOMAIN => {
                let mut len = [0u8; 1];
                stream.read_exact(&mut len).await?;
                let mut buf = vec![0u8; len[0] as usize + 2];
                stream.read_exact(&mut buf).await?;
            }
            atyp => {
                return Err(Error::protocol(format!(
                    "invalid address type in reply: {}",
                    atyp
                )))
            }
        }

        debug!("SOCKS5 tunnel to {}:{} established", host, port);
        Ok(())
    }

    /// Non-blocking form; same contract as
    /// [`HttpsConnector::begin_negotiate`](super::HttpsConnector::begin_negotiate).
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

    /// RFC 1929 username/password sub-negotiation.
    async fn authenticate_password<S>(&self, stream: &mut S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let username = self
            .username
            .as_ref()
            .ok_or_else(|| Error::auth("username required for authentication"))?;
        let password = self
            .password
            .as_ref()
            .ok_or_else(|| Error::auth("password required for authentication"))?;
        if username.len() > 255 || password.len() > 255 {
            return Err(Error::auth("username or password too long"));
        }

        let mut record = vec![0x01];
        record.push(username.len() as u8);
        record.extend_from_slice(username.as_bytes());
        record.push(password.len() as u8);
        record.extend_from_slice(password.as_bytes());
        stream.write_all(&record).await?;

        let mut response = [0u8; 2];
        stream.read_exact(&mut response).await?;
        if response[1] != 0x00 {
            return Err(Error::auth("upstream rejected the credentials"));
        }
        Ok(())
    }
}

fn reply_error_message(code: u8) -> String {
    match code {
        REP_GENERAL_FAILURE => "general SOCKS server failure".to_string(),
        REP_CONNECTION_NOT_ALLOWED => "connection not allowed by ruleset".to_string(),
        REP_NETWORK_UNREACHABLE => "network unreachable".to_string(),
        REP_HOST_UNREACHABLE => "host unreachable".to_string(),
        REP_CONNECTION_REFUSED => "connection refused".to_string(),
        REP_TTL_EXPIRED => "TTL expired".to_string(),
        REP_COMMAND_NOT_SUPPORTED => "command not supported".to_string(),
        REP_ADDRESS_TYPE_NOT_SUPPORTED => "address type not supported".to_string(),
        _ => format!("unknown reply code: {}", code),
    }
}

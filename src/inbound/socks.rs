//! SOCKS4/SOCKS5 inbound acceptor.
//!
//! Server-role state machine for a newly accepted connection: classify the
//! protocol from the first chunk, negotiate methods and credentials, and
//! yield the requested tunnel target. Responsibility ends there; relaying
//! the tunnel belongs to the owning pipeline.

use crate::common::auth::{
    AuthResult, SharedBasicAuthenticator, SharedSchemeAuthenticator, SCHEME_IP_ADDRESS,
};
use crate::common::buffer::BufferPool;
use crate::common::session::NegotiationSession;
use crate::config::SocksAcceptorConfig;
use crate::{Error, Result};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

pub const SOCKS4_VERSION: u8 = 0x04;
pub const SOCKS5_VERSION: u8 = 0x05;

const CMD_CONNECT: u8 = 0x01;

const AUTH_NO_AUTH: u8 = 0x00;
const AUTH_USERNAME_PASSWORD: u8 = 0x02;
const AUTH_NO_ACCEPTABLE: u8 = 0xFF;

const ATYP_IPV4: u8 = 0x01;
const ATYP_DOMAIN: u8 = 0x03;
const ATYP_IPV6: u8 = 0x04;

const SOCKS4_GRANTED: u8 = 90;
const SOCKS4_REJECTED: u8 = 91;

/// Smallest initial chunk worth looking at; anything shorter is dropped
/// without a reply.
const MIN_INITIAL_READ: usize = 3;

/// Tunnel target extracted from a successful handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelRequest {
    pub host: String,
    pub port: u16,
}

/// SOCKS4/SOCKS5 server-role acceptor
pub struct SocksAcceptor {
    pool: Arc<BufferPool>,
    ip_auth: bool,
    scheme_auth: Option<SharedSchemeAuthenticator>,
    basic_auth: Option<SharedBasicAuthenticator>,
}

impl SocksAcceptor {
    pub fn new(config: &SocksAcceptorConfig, pool: Arc<BufferPool>) -> Self {
        SocksAcceptor {
            pool,
            ip_auth: config.ip_auth_enabled(),
            scheme_auth: None,
            basic_auth: None,
        }
    }

    pub fn with_scheme_authenticator(mut self, auth: SharedSchemeAuthenticator) -> Self {
        self.scheme_auth = Some(auth);
        self
    }

    pub fn with_basic_authenticator(mut self, auth: SharedBasicAuthenticator) -> Self {
        self.basic_auth = Some(auth);
        self
    }

    /// Negotiate an inbound connection whose first chunk has already been
    /// read by the accept loop.
    ///
    /// Every reply is written back on `stream` before any further read.
    /// Errors mean the connection must be closed; variants distinguish
    /// silent drops from negative replies already sent.
    pub async fn accept<S>(
        &self,
        initial: &[u8],
        stream: &mut S,
        peer: SocketAddr,
    ) -> Result<TunnelRequest>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut session = NegotiationSession::new(&self.pool, peer);
        session.record_read(initial.len());

        if initial.len() < MIN_INITIAL_READ {
            return Err(Error::protocol("initial chunk below handshake minimum"));
        }

        match initial[0] {
            SOCKS4_VERSION => self.accept_socks4(initial, stream, &mut session).await,
            SOCKS5_VERSION => self.accept_socks5(initial, stream, &mut session).await,
            version => Err(Error::unsupported(format!(
                "unknown SOCKS version: {}",
                version
            ))),
        }
    }

    async fn accept_socks4<S>(
        &self,
        initial: &[u8],
        stream: &mut S,
        session: &mut NegotiationSession,
    ) -> Result<TunnelRequest>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        if initial.len() < 9 || initial[1] != CMD_CONNECT {
            return Err(Error::protocol("not a SOCKS4 CONNECT request"));
        }

        let port = u16::from_be_bytes([initial[2], initial[3]]);
        let host =
            Ipv4Addr::new(initial[4], initial[5], initial[6], initial[7]).to_string();

        // SOCKS4 carries no credentials; address trust is the only scheme
        // that can apply here.
        let mut status = SOCKS4_GRANTED;
        if self.ip_auth {
            if let Some(auth) = &self.scheme_auth {
                if auth.authenticate(session, SCHEME_IP_ADDRESS, "").await
                    != AuthResult::Success
                {
                    status = SOCKS4_REJECTED;
                }
            }
        }

        let mut reply = [0u8; 8];
        reply[1] = status;
        stream.write_all(&reply).await?;

        if status != SOCKS4_GRANTED {
            return Err(Error::auth("address trust rejected the client"));
        }

        debug!("SOCKS4 CONNECT {} -> {}:{}", session.peer(), host, port);
        session.set_target(host.clone(), port);
        Ok(TunnelRequest { host, port })
    }

    async fn accept_socks5<S>(
        &self,
        initial: &[u8],
        stream: &mut S,
        session: &mut NegotiationSession,
    ) -> Result<TunnelRequest>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let method_count = initial[1] as usize;
        if initial.len() < method_count + 2 {
            return Err(Error::protocol("truncated SOCKS5 greeting"));
        }

        let mut chosen = AUTH_NO_ACCEPTABLE;
        for &method in &initial[2..2 + method_count] {
            match method {
                AUTH_NO_AUTH => {
                    let mut granted = true;
                    if self.ip_auth {
                        if let Some(auth) = &self.scheme_auth {
                            granted = auth
                                .authenticate(session, SCHEME_IP_ADDRESS, "")
                                .await
                                == AuthResult::Success;
                        }
                    }
                    if granted {
                        chosen = AUTH_NO_AUTH;
                        break;
                    }
                    // address trust failed; keep scanning for a credential
                    // method the client also offers
                }
                AUTH_USERNAME_PASSWORD => {
                    chosen = AUTH_USERNAME_PASSWORD;
                    break;
                }
                _ => {}
            }
        }

        session.set_chosen_method(chosen);
        stream.write_all(&[SOCKS5_VERSION, chosen]).await?;

        if chosen == AUTH_NO_ACCEPTABLE {
            return Err(Error::auth("no acceptable authentication method"));
        }

        if chosen == AUTH_USERNAME_PASSWORD {
            self.verify_credentials(stream, session).await?;
        }

        let n = stream.read(session.buffer_mut()).await?;
        session.record_read(n);

        let (host, port, request_len) = {
            let buf = &session.buffer()[..n];
            if n < 10 {
                return Err(Error::protocol("truncated SOCKS5 request"));
            }
            if buf[0] != SOCKS5_VERSION {
                return Err(Error::protocol("bad SOCKS5 request version"));
            }
            if buf[1] != CMD_CONNECT {
                return Err(Error::unsupported(format!(
                    "SOCKS5 command not supported: {}",
                    buf[1]
                )));
            }

            let port_idx = match buf[3] {
                ATYP_IPV4 => 8,
                ATYP_DOMAIN => 5 + buf[4] as usize,
                ATYP_IPV6 => 20,
                atyp => {
                    return Err(Error::unsupported(format!(
                        "unknown address type: {}",
                        atyp
                    )))
                }
            };
            if n < port_idx + 2 {
                return Err(Error::protocol("truncated SOCKS5 request"));
            }

            let port = u16::from_be_bytes([buf[port_idx], buf[port_idx + 1]]);
            let host = match buf[3] {
                ATYP_IPV4 => Ipv4Addr::new(buf[4], buf[5], buf[6], buf[7]).to_string(),
                ATYP_DOMAIN => {
                    let len = buf[4] as usize;
                    String::from_utf8_lossy(&buf[5..5 + len]).into_owned()
                }
                _ => {
                    let mut octets = [0u8; 16];
                    octets.copy_from_slice(&buf[4..20]);
                    Ipv6Addr::from(octets).to_string()
                }
            };
            (host, port, n)
        };

        // The success reply echoes the client's own request bytes with the
        // reply field forced to "succeeded"; peers accept this in place of
        // the bound-address form.
        session.buffer_mut()[1] = 0x00;
        stream.write_all(&session.buffer()[..request_len]).await?;

        debug!("SOCKS5 CONNECT {} -> {}:{}", session.peer(), host, port);
        session.set_target(host.clone(), port);
        Ok(TunnelRequest { host, port })
    }

    /// RFC 1929 username/password sub-negotiation, driven by the injected
    /// basic authenticator.
    async fn verify_credentials<S>(
        &self,
        stream: &mut S,
        session: &mut NegotiationSession,
    ) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let n = stream.read(session.buffer_mut()).await?;
        session.record_read(n);

        let (username, password) = {
            let buf = &session.buffer()[..n];
            if n < 3 || buf[0] != 0x01 {
                return Err(Error::protocol("bad username/password record version"));
            }

            let user_len = buf[1] as usize;
            if n < 3 + user_len {
                return Err(Error::protocol("truncated username"));
            }
            let username = String::from_utf8_lossy(&buf[2..2 + user_len]).into_owned();

            let pass_len = buf[2 + user_len] as usize;
            if n < 3 + user_len + pass_len {
                return Err(Error::protocol("truncated password"));
            }
            let password =
                String::from_utf8_lossy(&buf[3 + user_len..3 + user_len + pass_len])
                    .into_owned();
            (username, password)
        };

        let mut granted = true;
        if let Some(auth) = &self.basic_auth {
            granted = auth.authenticate(session, &username, &password).await;
        }

        stream
            .write_all(&[0x01, if granted { 0x00 } else { 0x01 }])
            .await?;

        if !granted {
            return Err(Error::auth("invalid credentials"));
        }
        Ok(())
    }
}

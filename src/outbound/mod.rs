//! Outbound (client-role) tunnel negotiation
//!
//! Both connectors operate on an already-connected stream to the upstream
//! proxy and leave the stream positioned at the first tunnelled byte.

mod https;
mod socks5;

pub use https::HttpsConnector;
pub use socks5::Socks5Connector;

use crate::{Error, Result};

/// Target checks shared by the connectors; violations are reported before
/// any I/O is attempted.
pub(crate) fn validate_target(host: &str, port: u16) -> Result<()> {
    if host.is_empty() {
        return Err(Error::address("empty target host"));
    }
    if host.len() > 255 {
        return Err(Error::address("target host longer than 255 bytes"));
    }
    if port == 0 {
        return Err(Error::address("target port must be non-zero"));
    }
    Ok(())
}

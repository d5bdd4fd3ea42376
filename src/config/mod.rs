//! Configuration types for the negotiation layer.
//!
//! Plain data structs; loading them from a file, CLI, or environment
//! belongs to the embedding proxy, not this crate.

use crate::common::auth::SCHEME_IP_ADDRESS;
use serde::{Deserialize, Serialize};

/// Inbound SOCKS acceptor configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SocksAcceptorConfig {
    /// Active authentication schemes ("IP-Address" enables address trust)
    #[serde(rename = "auth-schemes")]
    pub auth_schemes: Vec<String>,
}

impl SocksAcceptorConfig {
    pub fn ip_auth_enabled(&self) -> bool {
        self.auth_schemes
            .iter()
            .any(|s| s.eq_ignore_ascii_case(SCHEME_IP_ADDRESS))
    }
}

/// Credentials for client-role negotiation through an upstream proxy
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct UpstreamAuthConfig {
    /// Username
    pub username: Option<String>,

    /// Password
    pub password: Option<String>,
}

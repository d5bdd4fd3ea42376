//! Injected authentication contracts.
//!
//! The negotiation layer never owns credentials or policy; the embedding
//! proxy hands in capability values and the acceptor only invokes them and
//! interprets the result. A failure is terminal for the session and is
//! never retried here.

use super::session::NegotiationSession;
use async_trait::async_trait;
use std::sync::Arc;

/// Scheme name for address-based client trust.
pub const SCHEME_IP_ADDRESS: &str = "IP-Address";

/// Outcome of a scheme authentication attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthResult {
    Success,
    Failure,
    NotApplicable,
}

/// Scheme-based authenticator.
///
/// Invoked with an empty credential for address-trust schemes, where the
/// peer address on the session is all there is to judge.
#[async_trait]
pub trait SchemeAuthenticator: Send + Sync {
    async fn authenticate(
        &self,
        session: &NegotiationSession,
        scheme: &str,
        credential: &str,
    ) -> AuthResult;
}

/// Username/password authenticator
#[async_trait]
pub trait BasicAuthenticator: Send + Sync {
    async fn authenticate(
        &self,
        session: &NegotiationSession,
        username: &str,
        password: &str,
    ) -> bool;
}

pub type SharedSchemeAuthenticator = Arc<dyn SchemeAuthenticator>;
pub type SharedBasicAuthenticator = Arc<dyn BasicAuthenticator>;

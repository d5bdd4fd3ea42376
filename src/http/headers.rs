//! Interned HTTP header names.
//!
//! Header-name comparison sits on the per-header hot path of request
//! parsing; canonical names are interned once for the process so equality
//! never allocates.

use std::fmt;

/// A well-known header name interned for the process lifetime.
///
/// The canonical text and its byte encoding are two views of the same
/// static allocation. Comparisons are ASCII-case-insensitive and do not
/// allocate.
#[derive(Debug, Clone, Copy)]
pub struct HeaderName {
    text: &'static str,
}

impl HeaderName {
    pub const fn new(text: &'static str) -> Self {
        HeaderName { text }
    }

    /// Canonical text form.
    pub fn as_str(&self) -> &'static str {
        self.text
    }

    /// Canonical byte form.
    pub fn as_bytes(&self) -> &'static [u8] {
        self.text.as_bytes()
    }

    /// Case-insensitive match against a raw byte span.
    pub fn eq_bytes(&self, other: &[u8]) -> bool {
        self.text.as_bytes().eq_ignore_ascii_case(other)
    }

    /// Case-insensitive match against a string.
    pub fn eq_str(&self, other: &str) -> bool {
        self.text.eq_ignore_ascii_case(other)
    }
}

impl fmt::Display for HeaderName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text)
    }
}

impl PartialEq for HeaderName {
    fn eq(&self, other: &Self) -> bool {
        self.text.eq_ignore_ascii_case(other.text)
    }
}

impl Eq for HeaderName {}

/// Canonical names registered at startup
pub mod known {
    use super::HeaderName;

    pub static ACCEPT: HeaderName = HeaderName::new("Accept");
    pub static ACCEPT_ENCODING: HeaderName = HeaderName::new("Accept-Encoding");
    pub static AUTHORIZATION: HeaderName = HeaderName::new("Authorization");
    pub static CONNECTION: HeaderName = HeaderName::new("Connection");
    pub static CONTENT_ENCODING: HeaderName = HeaderName::new("Content-Encoding");
    pub static CONTENT_LENGTH: HeaderName = HeaderName::new("Content-Length");
    pub static CONTENT_TYPE: HeaderName = HeaderName::new("Content-Type");
    pub static COOKIE: HeaderName = HeaderName::new("Cookie");
    pub static EXPECT: HeaderName = HeaderName::new("Expect");
    pub static HOST: HeaderName = HeaderName::new("Host");
    pub static KEEP_ALIVE: HeaderName = HeaderName::new("Keep-Alive");
    pub static LOCATION: HeaderName = HeaderName::new("Location");
    pub static PROXY_AUTHENTICATE: HeaderName = HeaderName::new("Proxy-Authenticate");
    pub static PROXY_AUTHORIZATION: HeaderName = HeaderName::new("Proxy-Authorization");
    pub static PROXY_CONNECTION: HeaderName = HeaderName::new("Proxy-Connection");
    pub static SET_COOKIE: HeaderName = HeaderName::new("Set-Cookie");
    pub static TRAILER: HeaderName = HeaderName::new("Trailer");
    pub static TRANSFER_ENCODING: HeaderName = HeaderName::new("Transfer-Encoding");
    pub static UPGRADE: HeaderName = HeaderName::new("Upgrade");
    pub static VIA: HeaderName = HeaderName::new("Via");
    pub static WWW_AUTHENTICATE: HeaderName = HeaderName::new("WWW-Authenticate");
}

/// Registered names, for reverse lookup of incoming bytes.
pub static KNOWN_HEADERS: &[&HeaderName] = &[
    &known::ACCEPT,
    &known::ACCEPT_ENCODING,
    &known::AUTHORIZATION,
    &known::CONNECTION,
    &known::CONTENT_ENCODING,
    &known::CONTENT_LENGTH,
    &known::CONTENT_TYPE,
    &known::COOKIE,
    &known::EXPECT,
    &known::HOST,
    &known::KEEP_ALIVE,
    &known::LOCATION,
    &known::PROXY_AUTHENTICATE,
    &known::PROXY_AUTHORIZATION,
    &known::PROXY_CONNECTION,
    &known::SET_COOKIE,
    &known::TRAILER,
    &known::TRANSFER_ENCODING,
    &known::UPGRADE,
    &known::VIA,
    &known::WWW_AUTHENTICATE,
];

/// Find the interned form of an incoming header name, if registered.
pub fn lookup(name: &[u8]) -> Option<&'static HeaderName> {
    KNOWN_HEADERS.iter().copied().find(|h| h.eq_bytes(name))
}

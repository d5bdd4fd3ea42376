//! Inbound (server-role) protocol negotiation

mod socks;

pub use socks::{SocksAcceptor, TunnelRequest};

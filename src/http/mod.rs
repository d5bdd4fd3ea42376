//! HTTP support services

pub mod headers;

pub use headers::HeaderName;

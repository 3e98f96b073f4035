//! Web variant: the wire protocol, the per-connection session engine,
//! and the framed TCP listener the browser-facing transports wrap.

pub mod protocol;
pub mod server;
pub mod session;

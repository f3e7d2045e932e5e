//! Chrome DevTools Protocol plumbing
//!
//! Custom minimal CDP implementation: transport, connection/session
//! management, and hand-written types.

pub mod connection;
pub mod transport;
pub mod types;

pub use connection::{Connection, Session};
pub use transport::{launch_chrome, CdpMessage, Transport};

//! Server session manager: accept, handshake, fan-out, client table.

mod manager;

pub use manager::{ChatServer, ClientId, ServerConfig, ServerEvent};

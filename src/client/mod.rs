//! Client session orchestration.

mod session;

pub use session::{ChatClient, ClientConfig, ClientEvent};

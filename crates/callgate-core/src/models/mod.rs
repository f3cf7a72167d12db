//! Domain models shared across the gateway

pub mod identity;
pub mod intent;

pub use identity::Identity;
pub use intent::{Action, ClientIntent};

//! HTTP request handlers

pub mod health;
pub mod help;
pub mod sockets;
pub mod ws;

pub use health::configure as configure_health;
pub use help::{configure as configure_help, HelpPage};
pub use sockets::configure as configure_sockets;
pub use ws::{configure as configure_ws, WsSink};

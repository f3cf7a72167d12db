//! API layer for Callgate
//!
//! Subscriber websockets, the diagnostics listing, the help page, and a
//! health check. Handlers reach gateway state only through the
//! [`HubHandle`](callgate_services::HubHandle) registered as app data.

#![forbid(unsafe_code)]

pub mod handlers;

use actix_web::web;

pub use handlers::{
    configure_health, configure_help, configure_sockets, configure_ws, HelpPage, WsSink,
};

/// Mount every gateway route
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.configure(configure_health)
        .configure(configure_sockets)
        .configure(configure_ws)
        .configure(configure_help);
}

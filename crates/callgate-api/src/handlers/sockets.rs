//! Diagnostics listing of connected subscribers

use actix_web::{web, HttpResponse};
use callgate_core::GatewayError;
use callgate_services::HubHandle;
use tracing::{debug, instrument};

/// List active sessions in registration order
///
/// GET /sockets
#[instrument(skip(hub))]
pub async fn list_sockets(hub: web::Data<HubHandle>) -> Result<HttpResponse, GatewayError> {
    let sessions = hub.sessions().await?;
    debug!(count = sessions.len(), "Listing sockets");
    Ok(HttpResponse::Ok().json(sessions))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/sockets", web::get().to(list_sockets));
}

//! Subscriber websocket gateway
//!
//! A subscriber connects to `/ws/<identity>`. The identity is validated
//! before the upgrade, so a bad path never creates a session. Once attached,
//! text frames are parsed as client intents and handed to the hub; the hub
//! pushes admitted events back through a [`WsSink`].

use actix_web::{web, HttpRequest, HttpResponse};
use actix_ws::{Message, MessageStream, Session};
use async_trait::async_trait;
use callgate_core::{ClientIntent, GatewayError, GatewayResult, Identity};
use callgate_services::{HubHandle, SessionSink};
use futures::StreamExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Hub-side push handle for one websocket
pub struct WsSink {
    session: Session,
    identity: Identity,
}

impl WsSink {
    pub fn new(session: Session, identity: Identity) -> Self {
        Self { session, identity }
    }
}

#[async_trait]
impl SessionSink for WsSink {
    async fn push(&mut self, text: String) -> GatewayResult<()> {
        self.session
            .text(text)
            .await
            .map_err(|_| GatewayError::TransportClosed(self.identity.to_string()))
    }
}

/// WebSocket connection handler
///
/// GET /ws/{identity}
pub async fn ws_handler(
    req: HttpRequest,
    body: web::Payload,
    path: web::Path<String>,
    hub: web::Data<HubHandle>,
) -> Result<HttpResponse, actix_web::Error> {
    let identity = Identity::parse(&path.into_inner()).map_err(|e| {
        warn!(path = %req.path(), "Rejecting WebSocket");
        e
    })?;

    let (response, session, msg_stream) = actix_ws::handle(&req, body)?;

    let remote_addr = req
        .connection_info()
        .realip_remote_addr()
        .unwrap_or("unknown")
        .to_string();

    let sink = WsSink::new(session.clone(), identity.clone());
    let id = hub.attach(identity.clone(), remote_addr, Box::new(sink))?;

    let hub = hub.get_ref().clone();
    actix_web::rt::spawn(async move {
        ws_session(hub, id, identity, session, msg_stream).await;
    });

    Ok(response)
}

/// Read client frames until the socket closes, then detach
async fn ws_session(
    hub: HubHandle,
    id: Uuid,
    identity: Identity,
    mut session: Session,
    mut msg_stream: MessageStream,
) {
    while let Some(msg) = msg_stream.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                debug!(identity = %identity, "Text Message : {}", text);
                match ClientIntent::from_json(&text) {
                    Ok(intent) => {
                        if let Err(e) = hub.dispatch_intent(id, intent) {
                            warn!(identity = %identity, error = %e, "Hub unavailable");
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(identity = %identity, error = %e, "Ignoring client message");
                    }
                }
            }
            Ok(Message::Ping(bytes)) => {
                if session.pong(&bytes).await.is_err() {
                    break;
                }
            }
            Ok(Message::Close(reason)) => {
                info!(identity = %identity, "Client closed connection: {:?}", reason);
                break;
            }
            Ok(Message::Binary(_)) => {
                debug!(identity = %identity, "Ignoring binary message");
            }
            Ok(_) => {}
            Err(e) => {
                warn!(identity = %identity, error = %e, "WebSocket error");
                break;
            }
        }
    }

    if let Err(e) = hub.detach(id) {
        warn!(identity = %identity, error = %e, "Hub unavailable");
    }
    let _ = session.close(None).await;
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/ws/{identity}", web::get().to(ws_handler));
}

//! Connected subscriber sessions

use async_trait::async_trait;
use callgate_core::{GatewayError, GatewayResult, Identity};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::ownership::OwnedLegs;

/// Transport used to push text frames to one subscriber.
///
/// An error from `push` means the subscriber is gone; the hub removes the
/// session and never retries.
#[async_trait]
pub trait SessionSink: Send + 'static {
    async fn push(&mut self, text: String) -> GatewayResult<()>;
}

/// Queue in front of one session's [`SessionSink`]
///
/// The hub only ever calls [`SessionOutbox::send`], which never waits on the
/// subscriber. A writer task drains the queue into the sink in order. When a
/// push fails the writer reports the session id on `failed` and stops; the
/// hub then removes the session. Dropping the outbox stops the writer.
pub struct SessionOutbox {
    tx: mpsc::UnboundedSender<String>,
    writer: JoinHandle<()>,
}

impl SessionOutbox {
    pub fn spawn(
        id: Uuid,
        mut sink: Box<dyn SessionSink>,
        failed: mpsc::UnboundedSender<Uuid>,
    ) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();

        let writer = tokio::spawn(async move {
            while let Some(text) = rx.recv().await {
                if let Err(e) = sink.push(text).await {
                    warn!(session = %id, error = %e, "Push failed");
                    if failed.send(id).is_err() {
                        debug!(session = %id, "Hub gone before push failure was reported");
                    }
                    break;
                }
            }
        });

        Self { tx, writer }
    }

    /// Queue a text frame for the subscriber
    pub fn send(&self, text: String) -> GatewayResult<()> {
        self.tx
            .send(text)
            .map_err(|_| GatewayError::TransportClosed("session writer stopped".to_string()))
    }
}

impl Drop for SessionOutbox {
    fn drop(&mut self) {
        self.writer.abort();
    }
}

/// One connected subscriber
pub struct SubscriberSession<S> {
    pub id: Uuid,
    pub identity: Identity,
    pub remote_addr: String,
    pub connected_at: DateTime<Utc>,
    pub legs: OwnedLegs,
    pub sink: S,
}

impl<S> SubscriberSession<S> {
    pub fn new(identity: Identity, remote_addr: impl Into<String>, sink: S) -> Self {
        Self::with_id(Uuid::new_v4(), identity, remote_addr, sink)
    }

    pub fn with_id(id: Uuid, identity: Identity, remote_addr: impl Into<String>, sink: S) -> Self {
        Self {
            id,
            identity,
            remote_addr: remote_addr.into(),
            connected_at: Utc::now(),
            legs: OwnedLegs::new(),
            sink,
        }
    }

    /// Read-only view for diagnostics
    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            path: self.identity.clone(),
            remote_address: self.remote_addr.clone(),
            connected_at: self.connected_at,
            legs: self.legs.clone(),
        }
    }
}

/// Diagnostics entry for one session
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub path: Identity,
    pub remote_address: String,
    pub connected_at: DateTime<Utc>,
    pub legs: OwnedLegs,
}

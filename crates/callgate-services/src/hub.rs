//! Gateway hub
//!
//! One task owns the [`OwnershipRegistry`]. Websocket handlers and the
//! control-link reader talk to it through a [`HubHandle`]; messages are
//! handled strictly in arrival order, so admission decisions never race.
//!
//! The hub never waits on a subscriber. Admitted events go into each
//! session's [`SessionOutbox`]; a session whose writer reports a failed push
//! is removed on the hub task like any other detach.

use callgate_core::{ClientIntent, GatewayError, GatewayResult, Identity};
use callgate_esl::constants::{CONTENT_TYPE_API_RESPONSE, CONTENT_TYPE_REPLY};
use callgate_esl::{CommandSender, EventRecord};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::commands::CommandTranslator;
use crate::ownership::OwnershipRegistry;
use crate::session::{SessionInfo, SessionOutbox, SessionSink, SubscriberSession};

/// Messages accepted by the hub
pub enum HubCommand {
    Attach {
        id: Uuid,
        identity: Identity,
        remote_addr: String,
        sink: Box<dyn SessionSink>,
    },
    Detach {
        id: Uuid,
    },
    Event(EventRecord),
    Intent {
        id: Uuid,
        intent: ClientIntent,
    },
    Sessions {
        reply: oneshot::Sender<Vec<SessionInfo>>,
    },
}

/// Cloneable handle to a running hub
#[derive(Clone)]
pub struct HubHandle {
    tx: mpsc::UnboundedSender<HubCommand>,
}

impl HubHandle {
    fn send(&self, command: HubCommand) -> GatewayResult<()> {
        self.tx
            .send(command)
            .map_err(|_| GatewayError::Internal("gateway hub stopped".to_string()))
    }

    /// Register a new subscriber session and return its id
    pub fn attach(
        &self,
        identity: Identity,
        remote_addr: impl Into<String>,
        sink: Box<dyn SessionSink>,
    ) -> GatewayResult<Uuid> {
        let id = Uuid::new_v4();
        self.send(HubCommand::Attach {
            id,
            identity,
            remote_addr: remote_addr.into(),
            sink,
        })?;
        Ok(id)
    }

    pub fn detach(&self, id: Uuid) -> GatewayResult<()> {
        self.send(HubCommand::Detach { id })
    }

    /// Hand an event from the control link to the hub
    pub fn publish(&self, event: EventRecord) -> GatewayResult<()> {
        self.send(HubCommand::Event(event))
    }

    pub fn dispatch_intent(&self, id: Uuid, intent: ClientIntent) -> GatewayResult<()> {
        self.send(HubCommand::Intent { id, intent })
    }

    /// Snapshot of connected sessions in registration order
    pub async fn sessions(&self) -> GatewayResult<Vec<SessionInfo>> {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::Sessions { reply })?;
        rx.await
            .map_err(|_| GatewayError::Internal("gateway hub stopped".to_string()))
    }
}

/// Serialized owner of sessions and call-leg ownership
pub struct GatewayHub {
    registry: OwnershipRegistry<SessionOutbox>,
    translator: CommandTranslator,
    commands: CommandSender,
    rx: mpsc::UnboundedReceiver<HubCommand>,
    failed_tx: mpsc::UnboundedSender<Uuid>,
    failed_rx: mpsc::UnboundedReceiver<Uuid>,
}

impl GatewayHub {
    pub fn new(translator: CommandTranslator, commands: CommandSender) -> (Self, HubHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (failed_tx, failed_rx) = mpsc::unbounded_channel();
        let hub = Self {
            registry: OwnershipRegistry::new(),
            translator,
            commands,
            rx,
            failed_tx,
            failed_rx,
        };
        (hub, HubHandle { tx })
    }

    /// Create a hub and run it on its own task
    pub fn spawn(
        translator: CommandTranslator,
        commands: CommandSender,
    ) -> (HubHandle, JoinHandle<()>) {
        let (hub, handle) = Self::new(translator, commands);
        (handle, tokio::spawn(hub.run()))
    }

    /// Process messages until every handle is dropped
    pub async fn run(mut self) {
        info!("Gateway hub started");

        loop {
            tokio::select! {
                command = self.rx.recv() => match command {
                    Some(command) => self.handle(command),
                    None => break,
                },
                Some(id) = self.failed_rx.recv() => self.detach(id),
            }
        }

        info!("Gateway hub stopped");
    }

    fn handle(&mut self, command: HubCommand) {
        match command {
            HubCommand::Attach {
                id,
                identity,
                remote_addr,
                sink,
            } => self.attach(id, identity, remote_addr, sink),
            HubCommand::Detach { id } => self.detach(id),
            HubCommand::Event(event) => self.handle_event(event),
            HubCommand::Intent { id, intent } => self.handle_intent(id, intent),
            HubCommand::Sessions { reply } => {
                if reply.send(self.registry.snapshot()).is_err() {
                    debug!("Session snapshot requester went away");
                }
            }
        }
    }

    fn attach(
        &mut self,
        id: Uuid,
        identity: Identity,
        remote_addr: String,
        sink: Box<dyn SessionSink>,
    ) {
        let outbox = SessionOutbox::spawn(id, sink, self.failed_tx.clone());
        self.registry
            .register(SubscriberSession::with_id(id, identity, remote_addr, outbox));

        if let Some(session) = self.registry.get(id) {
            info!(
                identity = %session.identity,
                remote = %session.remote_addr,
                session = %id,
                sessions = self.registry.len(),
                "Adding WebSocket"
            );
        }
    }

    fn detach(&mut self, id: Uuid) {
        if let Some(session) = self.registry.remove(id) {
            info!(
                identity = %session.identity,
                session = %id,
                legs = session.legs.len(),
                "Removing WebSocket"
            );
        }
    }

    #[instrument(skip_all, fields(event = event.event_name().unwrap_or_default()))]
    fn handle_event(&mut self, event: EventRecord) {
        debug!("Event : {}", event);

        if matches!(
            event.content_type(),
            Some(CONTENT_TYPE_REPLY) | Some(CONTENT_TYPE_API_RESPONSE)
        ) {
            debug!(body = event.body().unwrap_or_default(), "ESL reply");
        }

        let recipients = self.registry.route(&event);
        if recipients.is_empty() {
            return;
        }

        let json = match event.to_json() {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "Failed to serialize event");
                return;
            }
        };

        let mut failed = Vec::new();
        for id in recipients {
            let Some(session) = self.registry.get(id) else {
                continue;
            };

            if let Err(e) = session.sink.send(json.clone()) {
                warn!(identity = %session.identity, session = %id, error = %e, "Outbox closed");
                failed.push(id);
            }
        }

        for id in failed {
            self.detach(id);
        }
    }

    #[instrument(skip_all, fields(session = %id))]
    fn handle_intent(&mut self, id: Uuid, intent: ClientIntent) {
        let Some(session) = self.registry.get(id) else {
            let err = GatewayError::SessionNotFound(id.to_string());
            warn!(error = %err, "Intent ignored");
            return;
        };

        let command = match self
            .translator
            .translate(&session.identity, &session.legs, &intent)
        {
            Ok(command) => command,
            Err(e) => {
                warn!(
                    identity = %session.identity,
                    action = %intent.action,
                    error = %e,
                    "Intent rejected"
                );
                return;
            }
        };

        if let Err(e) = self.commands.send(command) {
            warn!(identity = %session.identity, error = %e, "Command not sent");
        }
    }
}

//! Control link to FreeSWITCH
//!
//! One outbound TCP connection per process. `connect` performs the
//! greeting/auth/subscribe handshake; `start` splits the connection into a
//! reader task that normalizes frames into [`EventRecord`]s and a writer task
//! that is the only writer of outbound commands.

use callgate_core::config::EslConfig;
use callgate_core::{GatewayError, GatewayResult};
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::codec::Framed;
use tracing::{debug, error, info};

use crate::constants::{AUTH_COMMAND, CONTENT_TYPE_AUTH, CONTENT_TYPE_REPLY};
use crate::event::EventRecord;
use crate::events::{subscription_command, SUBSCRIBED_EVENTS};
use crate::frame::{header_value, EslCodec};

/// Handle for queueing outbound commands on the link
#[derive(Debug, Clone)]
pub struct CommandSender {
    tx: mpsc::UnboundedSender<String>,
}

impl CommandSender {
    /// Create a sender and the receiver the writer task drains
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queue a command. The delimiter is added by the codec.
    pub fn send(&self, command: String) -> GatewayResult<()> {
        info!("Text Command : {}", command);
        self.tx.send(command).map_err(|_| GatewayError::LinkClosed)
    }
}

/// Authenticated, subscribed connection to FreeSWITCH
pub struct ControlLink {
    framed: Framed<TcpStream, EslCodec>,
    server_id: String,
    authenticated: bool,
}

impl ControlLink {
    /// Connect, authenticate, and subscribe.
    ///
    /// # Errors
    ///
    /// Any failure here is fatal to the gateway: connection refused, a bad
    /// greeting, a rejected secret, a rejected subscription, or running past
    /// `connect_timeout_secs`.
    pub async fn connect(config: &EslConfig) -> GatewayResult<Self> {
        let server_id = format!("{}:{}", config.host, config.port);
        info!("Connecting to FreeSWITCH ESL: {}", server_id);

        let limit = Duration::from_secs(config.connect_timeout_secs);
        timeout(limit, Self::establish(server_id.clone(), config))
            .await
            .map_err(|_| {
                GatewayError::EslConnection(format!("timed out connecting to {}", server_id))
            })?
    }

    async fn establish(server_id: String, config: &EslConfig) -> GatewayResult<Self> {
        let stream = TcpStream::connect(&server_id)
            .await
            .map_err(|e| GatewayError::EslConnection(format!("{}: {}", server_id, e)))?;

        let mut link = Self {
            framed: Framed::new(stream, EslCodec::new(config.framing)),
            server_id,
            authenticated: false,
        };

        let greeting = link.read_frame().await?;
        if header_value(&greeting, "Content-Type") != Some(CONTENT_TYPE_AUTH) {
            return Err(GatewayError::EslConnection(
                "Invalid greeting from FreeSWITCH".to_string(),
            ));
        }

        debug!("Received auth request from {}", link.server_id);

        link.framed
            .send(format!("{} {}", AUTH_COMMAND, config.password))
            .await?;

        let reply = link.read_reply().await?;
        if !reply.starts_with("+OK") {
            return Err(GatewayError::EslAuth(reply));
        }
        link.authenticated = true;

        info!("Authenticated to FreeSWITCH: {}", link.server_id);

        link.framed.send(subscription_command()).await?;

        let reply = link.read_reply().await?;
        if !reply.starts_with("+OK") {
            return Err(GatewayError::EslConnection(format!(
                "event subscription rejected: {}",
                reply
            )));
        }

        info!(events = ?SUBSCRIBED_EVENTS, "Subscribed to events: {}", link.server_id);

        Ok(link)
    }

    async fn read_frame(&mut self) -> GatewayResult<String> {
        match self.framed.next().await {
            Some(frame) => frame,
            None => Err(GatewayError::LinkClosed),
        }
    }

    /// `Reply-Text` of the next command reply, skipping anything else
    async fn read_reply(&mut self) -> GatewayResult<String> {
        loop {
            let frame = self.read_frame().await?;

            if header_value(&frame, "Content-Type") == Some(CONTENT_TYPE_REPLY) {
                return Ok(header_value(&frame, "Reply-Text")
                    .unwrap_or_default()
                    .to_string());
            }

            debug!("Skipping frame while waiting for command reply");
        }
    }

    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Event kinds this link is subscribed to
    pub fn subscriptions(&self) -> &'static [&'static str] {
        SUBSCRIBED_EVENTS
    }

    /// Split into reader and writer tasks.
    ///
    /// Every frame read is normalized and passed to `on_event` in arrival
    /// order. Commands are written in the order they were queued.
    pub fn start<F>(
        self,
        mut commands: mpsc::UnboundedReceiver<String>,
        mut on_event: F,
    ) -> LinkTasks
    where
        F: FnMut(EventRecord) + Send + 'static,
    {
        let server_id = self.server_id;
        let (mut sink, mut stream) = self.framed.split();

        let writer = tokio::spawn(async move {
            while let Some(command) = commands.recv().await {
                sink.send(command).await?;
            }
            Ok::<(), GatewayError>(())
        });

        let reader = tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                let frame = frame?;
                debug!("ESL frame : {:?}", frame);
                on_event(EventRecord::parse(&frame));
            }
            Err::<(), GatewayError>(GatewayError::LinkClosed)
        });

        LinkTasks {
            server_id,
            reader,
            writer,
        }
    }
}

/// Running reader and writer of a started link
pub struct LinkTasks {
    server_id: String,
    reader: JoinHandle<GatewayResult<()>>,
    writer: JoinHandle<GatewayResult<()>>,
}

impl LinkTasks {
    /// Resolves when either direction stops, with the reason
    pub async fn closed(self) -> GatewayError {
        let LinkTasks {
            server_id,
            mut reader,
            mut writer,
        } = self;

        let outcome = tokio::select! {
            result = &mut reader => result,
            result = &mut writer => result,
        };
        reader.abort();
        writer.abort();

        let err = match outcome {
            Ok(Ok(())) => GatewayError::LinkClosed,
            Ok(Err(e)) => e,
            Err(join) => GatewayError::Internal(join.to_string()),
        };

        error!("FreeSWITCH ESL link {} stopped: {}", server_id, err);
        err
    }
}

// tests/control_link_test.rs
//! Control link against a simulated FreeSWITCH event socket
//!
//! The simulator accepts one connection on a loopback port and plays the
//! server side of the handshake, so the link can be exercised without a
//! real switch.

use callgate_core::config::{EslConfig, FramingMode};
use callgate_core::GatewayError;
use callgate_esl::{CommandSender, ControlLink, EventRecord};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};

/// Builds `text/event-plain` frames the way the switch sends them
struct EslEventBuilder {
    headers: Vec<(String, String)>,
}

impl EslEventBuilder {
    fn new(event_name: &str) -> Self {
        Self {
            headers: vec![("Event-Name".to_string(), event_name.to_string())],
        }
    }

    fn header(mut self, key: &str, value: &str) -> Self {
        self.headers.push((key.to_string(), value.to_string()));
        self
    }

    /// Header block announcing the body length, followed by the body
    fn build(&self) -> String {
        let mut body = String::new();
        for (key, value) in &self.headers {
            body.push_str(&format!("{}: {}\n", key, value));
        }
        body.push('\n');

        format!(
            "Content-Length: {}\nContent-Type: text/event-plain\n\n{}",
            body.len(),
            body
        )
    }
}

fn reply(text: &str) -> String {
    format!("Content-Type: command/reply\nReply-Text: {}\n\n", text)
}

/// Read one command up to and excluding the blank-line delimiter
async fn read_command(stream: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut byte = [0u8; 1];
    while !buf.ends_with(b"\n\n") {
        let n = stream.read(&mut byte).await.unwrap();
        assert!(n > 0, "client closed before completing a command");
        buf.push(byte[0]);
    }
    buf.truncate(buf.len() - 2);
    String::from_utf8(buf).unwrap()
}

async fn listen() -> (TcpListener, EslConfig) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let config = EslConfig {
        host: "127.0.0.1".to_string(),
        port,
        password: "ClueCon".to_string(),
        framing: FramingMode::ContentLength,
        connect_timeout_secs: 5,
    };
    (listener, config)
}

/// Accept, greet, and answer auth and subscribe with `+OK`
async fn accept_and_handshake(listener: &TcpListener) -> (TcpStream, Vec<String>) {
    let (mut stream, _) = listener.accept().await.unwrap();
    stream
        .write_all(b"Content-Type: auth/request\n\n")
        .await
        .unwrap();

    let auth = read_command(&mut stream).await;
    stream.write_all(reply("+OK accepted").as_bytes()).await.unwrap();

    let subscribe = read_command(&mut stream).await;
    stream
        .write_all(reply("+OK event listener enabled plain").as_bytes())
        .await
        .unwrap();

    (stream, vec![auth, subscribe])
}

#[tokio::test]
async fn test_handshake_sends_auth_and_subscription() {
    let (listener, config) = listen().await;
    let (seen_tx, seen_rx) = oneshot::channel();

    tokio::spawn(async move {
        let (_stream, commands) = accept_and_handshake(&listener).await;
        seen_tx.send(commands).unwrap();
    });

    let link = ControlLink::connect(&config).await.unwrap();
    assert!(link.is_authenticated());
    assert_eq!(link.server_id(), config_addr(&config));
    assert!(link.subscriptions().contains(&"CHANNEL_HANGUP_COMPLETE"));

    let commands = seen_rx.await.unwrap();
    assert_eq!(commands[0], "auth ClueCon");
    assert_eq!(
        commands[1],
        "event text CHANNEL_PARK CHANNEL_ANSWER DTMF PLAYBACK_START PLAYBACK_STOP \
         CHANNEL_HANGUP CHANNEL_HANGUP_COMPLETE"
    );
}

fn config_addr(config: &EslConfig) -> String {
    format!("{}:{}", config.host, config.port)
}

#[tokio::test]
async fn test_events_are_normalized_and_commands_delimited() {
    let (listener, config) = listen().await;
    let (command_tx, command_rx) = oneshot::channel();

    tokio::spawn(async move {
        let (mut stream, _) = accept_and_handshake(&listener).await;

        let park = EslEventBuilder::new("CHANNEL_PARK")
            .header("Unique-ID", "leg-1")
            .header("Call-Direction", "inbound")
            .header("variable_sip_history_info", "%3Csip%3A%2B15550001%40host%3E")
            .header("Channel-Read-Codec-Name", "PCMU")
            .build();
        stream.write_all(park.as_bytes()).await.unwrap();

        let command = read_command(&mut stream).await;
        command_tx.send(command).unwrap();

        // Hold the socket open until the client is done
        let mut rest = Vec::new();
        let _ = stream.read_to_end(&mut rest).await;
    });

    let link = ControlLink::connect(&config).await.unwrap();
    let (commands, rx) = CommandSender::channel();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<EventRecord>();
    let _tasks = link.start(rx, move |record| {
        let _ = event_tx.send(record);
    });

    let record = event_rx.recv().await.unwrap();
    assert_eq!(record.event_name(), Some("CHANNEL_PARK"));
    assert_eq!(record.unique_id(), Some("leg-1"));
    assert_eq!(record.caller_history_number(), Some("+15550001"));
    assert_eq!(record.get("Channel-Read-Codec-Name"), None);

    commands.send("api uuid_answer leg-1".to_string()).unwrap();
    assert_eq!(command_rx.await.unwrap(), "api uuid_answer leg-1");
}

#[tokio::test]
async fn test_rejected_secret_is_auth_error() {
    let (listener, mut config) = listen().await;
    config.password = "wrong".to_string();

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        stream
            .write_all(b"Content-Type: auth/request\n\n")
            .await
            .unwrap();
        let _ = read_command(&mut stream).await;
        stream.write_all(reply("-ERR invalid").as_bytes()).await.unwrap();
    });

    let err = ControlLink::connect(&config).await.err().unwrap();
    assert!(matches!(err, GatewayError::EslAuth(ref text) if text == "-ERR invalid"));
    assert!(err.is_fatal());
}

#[tokio::test]
async fn test_unexpected_greeting_is_rejected() {
    let (listener, config) = listen().await;

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        stream
            .write_all(b"Content-Type: text/disconnect-notice\n\n")
            .await
            .unwrap();
    });

    let err = ControlLink::connect(&config).await.err().unwrap();
    assert_eq!(err.error_code(), "esl_connection_error");
}

#[tokio::test]
async fn test_refused_connection_is_fatal() {
    let (listener, config) = listen().await;
    drop(listener);

    let err = ControlLink::connect(&config).await.err().unwrap();
    assert!(matches!(err, GatewayError::EslConnection(_)));
    assert!(err.is_fatal());
}

#[tokio::test]
async fn test_peer_close_stops_link() {
    let (listener, config) = listen().await;

    tokio::spawn(async move {
        let (stream, _) = accept_and_handshake(&listener).await;
        drop(stream);
    });

    let link = ControlLink::connect(&config).await.unwrap();
    let (_commands, rx) = CommandSender::channel();
    let tasks = link.start(rx, |_| {});

    let err = tasks.closed().await;
    assert!(err.is_fatal());
}

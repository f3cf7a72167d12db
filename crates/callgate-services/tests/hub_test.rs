// tests/hub_test.rs
//! Hub behaviour end to end: events in, pushes and commands out

use async_trait::async_trait;
use callgate_core::{ClientIntent, GatewayError, GatewayResult, Identity};
use callgate_esl::{CommandSender, EventRecord};
use callgate_services::{CommandTranslator, GatewayHub, HubHandle, SessionSink};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use uuid::Uuid;

/// Forwards every push to a channel the test reads
struct RecordingSink(mpsc::UnboundedSender<String>);

#[async_trait]
impl SessionSink for RecordingSink {
    async fn push(&mut self, text: String) -> GatewayResult<()> {
        self.0
            .send(text)
            .map_err(|_| GatewayError::TransportClosed("recording".to_string()))
    }
}

/// A subscriber whose transport is already gone
struct BrokenSink;

#[async_trait]
impl SessionSink for BrokenSink {
    async fn push(&mut self, _text: String) -> GatewayResult<()> {
        Err(GatewayError::TransportClosed("broken".to_string()))
    }
}

/// A subscriber that stopped reading: pushes never complete
struct StalledSink;

#[async_trait]
impl SessionSink for StalledSink {
    async fn push(&mut self, _text: String) -> GatewayResult<()> {
        std::future::pending::<()>().await;
        Ok(())
    }
}

struct Harness {
    hub: HubHandle,
    commands: mpsc::UnboundedReceiver<String>,
}

impl Harness {
    fn start() -> Self {
        let (sender, commands) = CommandSender::channel();
        let (hub, _task) =
            GatewayHub::spawn(CommandTranslator::new("/opt/sounds/", "mss"), sender);
        Self { hub, commands }
    }

    fn subscribe(&self, identity: &str) -> (Uuid, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self
            .hub
            .attach(
                Identity::parse(identity).unwrap(),
                "127.0.0.1:40000",
                Box::new(RecordingSink(tx)),
            )
            .unwrap();
        (id, rx)
    }

    fn intent(&self, id: Uuid, json: &str) {
        self.hub
            .dispatch_intent(id, ClientIntent::from_json(json).unwrap())
            .unwrap();
    }

    /// Wait until every earlier message has been handled
    async fn settle(&self) {
        self.hub.sessions().await.unwrap();
    }

    /// Wait for the session count to reach `count`
    async fn expect_sessions(&self, count: usize) {
        for _ in 0..200 {
            if self.hub.sessions().await.unwrap().len() == count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("session count never reached {}", count);
    }
}

fn inbound_park(leg: &str, number: &str) -> EventRecord {
    EventRecord::parse(&format!(
        "Content-Type: text/event-plain\nEvent-Name: CHANNEL_PARK\nUnique-ID: {}\n\
         Call-Direction: inbound\nvariable_sip_history_info: %3Csip%3A{}%40pbx.example%3E",
        leg,
        number.replace('+', "%2B")
    ))
}

fn leg_event(kind: &str, leg: &str) -> EventRecord {
    EventRecord::parse(&format!("Event-Name: {}\nUnique-ID: {}", kind, leg))
}

/// Next event pushed to a subscriber, failing after two seconds
async fn next_pushed(rx: &mut mpsc::UnboundedReceiver<String>) -> Value {
    let text = timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("no push within 2s")
        .expect("sink dropped");
    serde_json::from_str(&text).unwrap()
}

#[tokio::test]
async fn test_park_claims_and_hangup_releases() {
    let mut harness = Harness::start();
    let (id, mut rx) = harness.subscribe("+15550001");

    harness.hub.publish(inbound_park("leg-1", "+15550001")).unwrap();

    let park = next_pushed(&mut rx).await;
    assert_eq!(park["Event-Name"], "CHANNEL_PARK");
    assert_eq!(park["Caller-History-Number"], "+15550001");
    assert!(park.get("variable_sip_history_info").is_none());

    let sessions = harness.hub.sessions().await.unwrap();
    assert_eq!(sessions[0].legs.iter().collect::<Vec<_>>(), vec!["leg-1"]);

    harness
        .hub
        .publish(leg_event("CHANNEL_HANGUP_COMPLETE", "leg-1"))
        .unwrap();

    let hangup = next_pushed(&mut rx).await;
    assert_eq!(hangup["Event-Name"], "CHANNEL_HANGUP_COMPLETE");
    let sessions = harness.hub.sessions().await.unwrap();
    assert!(sessions[0].legs.is_empty());

    // After release, control of the leg is gone too
    harness.intent(id, r#"{"uuid":"leg-1","action":"answer"}"#);
    harness.settle().await;
    assert!(harness.commands.try_recv().is_err());
}

#[tokio::test]
async fn test_events_only_reach_owner() {
    let harness = Harness::start();
    let (_alice, mut alice_rx) = harness.subscribe("+15550001");
    let (_bob, mut bob_rx) = harness.subscribe("+15550002");

    harness.hub.publish(inbound_park("leg-1", "+15550002")).unwrap();
    harness.hub.publish(leg_event("DTMF", "leg-1")).unwrap();
    harness.hub.publish(leg_event("DTMF", "leg-unknown")).unwrap();

    assert_eq!(next_pushed(&mut bob_rx).await["Event-Name"], "CHANNEL_PARK");
    assert_eq!(next_pushed(&mut bob_rx).await["Event-Name"], "DTMF");

    harness.settle().await;
    tokio::task::yield_now().await;
    assert!(alice_rx.try_recv().is_err());
    assert!(bob_rx.try_recv().is_err());
}

#[tokio::test]
async fn test_unowned_playback_sends_nothing() {
    let mut harness = Harness::start();
    let (id, _rx) = harness.subscribe("+15550001");

    harness.intent(id, r#"{"uuid":"leg-foreign","action":"playback","file":"a.wav"}"#);
    harness.intent(id, r#"{"action":"dance"}"#);
    harness.settle().await;
    assert!(harness.commands.try_recv().is_err());

    harness.hub.publish(inbound_park("leg-1", "+15550001")).unwrap();
    harness.intent(id, r#"{"uuid":"leg-1","action":"playback","file":"a.wav"}"#);
    harness.settle().await;

    assert_eq!(
        harness.commands.try_recv().unwrap(),
        "api uuid_broadcast leg-1 playback::/opt/sounds/+15550001/a.wav"
    );
    assert!(harness.commands.try_recv().is_err());
}

#[tokio::test]
async fn test_call_intent_translates_to_originate() {
    let mut harness = Harness::start();
    let (id, _rx) = harness.subscribe("+1555");

    harness.intent(id, r#"{"action":"call","destination":"555"}"#);
    harness.settle().await;

    assert_eq!(
        harness.commands.try_recv().unwrap(),
        "api originate {origination_caller_id_number=+1555}sofia/gateway/mss/555 &park()"
    );
}

#[tokio::test]
async fn test_failed_push_removes_session() {
    let harness = Harness::start();
    let (_healthy, mut healthy_rx) = harness.subscribe("+15550001");
    harness
        .hub
        .attach(
            Identity::parse("+15550002").unwrap(),
            "127.0.0.1:40001",
            Box::new(BrokenSink),
        )
        .unwrap();
    assert_eq!(harness.hub.sessions().await.unwrap().len(), 2);

    // Not admitted for the broken session: it stays
    harness.hub.publish(inbound_park("leg-1", "+15550001")).unwrap();
    next_pushed(&mut healthy_rx).await;
    assert_eq!(harness.hub.sessions().await.unwrap().len(), 2);

    // Admitted, push fails: removed
    harness.hub.publish(inbound_park("leg-2", "+15550002")).unwrap();
    harness.expect_sessions(1).await;
    let sessions = harness.hub.sessions().await.unwrap();
    assert_eq!(sessions[0].path.as_str(), "+15550001");
}

#[tokio::test]
async fn test_stalled_subscriber_does_not_block_others() {
    let harness = Harness::start();
    harness
        .hub
        .attach(
            Identity::parse("+15550001").unwrap(),
            "127.0.0.1:40001",
            Box::new(StalledSink),
        )
        .unwrap();
    let (_healthy, mut healthy_rx) = harness.subscribe("+15550002");

    // Far more than any transport buffer holds
    harness.hub.publish(inbound_park("leg-1", "+15550001")).unwrap();
    for _ in 0..100 {
        harness.hub.publish(leg_event("DTMF", "leg-1")).unwrap();
    }
    harness.hub.publish(inbound_park("leg-2", "+15550002")).unwrap();

    assert_eq!(next_pushed(&mut healthy_rx).await["Unique-ID"], "leg-2");

    let sessions = timeout(Duration::from_secs(1), harness.hub.sessions())
        .await
        .expect("hub answered within 1s")
        .unwrap();
    assert_eq!(sessions.len(), 2);
}

#[tokio::test]
async fn test_detach_releases_everything() {
    let harness = Harness::start();
    let (id, _rx) = harness.subscribe("+15550001");
    harness.hub.publish(inbound_park("leg-1", "+15550001")).unwrap();
    harness.hub.detach(id).unwrap();

    assert!(harness.hub.sessions().await.unwrap().is_empty());
}

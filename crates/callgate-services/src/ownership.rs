//! Call-leg ownership
//!
//! A session owns a call leg from the moment an event establishes it as the
//! owner until the leg's terminal event. Events reach a session only while
//! it owns the leg (or the event itself establishes ownership).
//!
//! Admission is evaluated per session, in this order:
//!
//! 1. `CHANNEL_PARK`, inbound, `Caller-History-Number` equals the identity:
//!    claim the leg.
//! 2. `CHANNEL_ANSWER`, outbound, `Caller-Caller-ID-Number` equals the
//!    identity: claim the leg.
//! 3. Leg already owned: deliver, and release it on `CHANNEL_HANGUP_COMPLETE`.
//! 4. Anything else is denied and changes nothing.
//!
//! Sessions are keyed by their own id, not by identity. Several sockets may
//! connect with the same identity (a second browser tab, a reconnect racing
//! the old socket's close). Each runs admission on its own, so all of them
//! claim a matching leg, receive its events, and may control it. Nothing is
//! evicted when a duplicate connects.

use callgate_core::Identity;
use callgate_esl::events::{CHANNEL_ANSWER, CHANNEL_PARK, DIRECTION_INBOUND, DIRECTION_OUTBOUND};
use callgate_esl::EventRecord;
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::constants::RELEASE_EVENT;
use crate::session::{SessionInfo, SubscriberSession};

/// Ordered, duplicate-free set of call-leg identifiers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct OwnedLegs(Vec<String>);

impl OwnedLegs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a leg; returns false if it was already owned
    pub fn insert(&mut self, leg: &str) -> bool {
        if self.contains(leg) {
            return false;
        }
        self.0.push(leg.to_string());
        true
    }

    /// Remove a leg; returns false if it was not owned
    pub fn remove(&mut self, leg: &str) -> bool {
        match self.0.iter().position(|owned| owned == leg) {
            Some(index) => {
                self.0.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, leg: &str) -> bool {
        self.0.iter().any(|owned| owned == leg)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

/// Outcome of admitting one event for one session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The event established ownership
    Claimed,
    /// The leg was already owned
    Owned,
    /// The leg was owned and the event ended it
    Released,
    Denied,
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        !matches!(self, Admission::Denied)
    }
}

/// Decide whether `event` is delivered to the session named `identity`,
/// updating its owned legs. A denied event leaves `legs` untouched.
pub fn admit(identity: &Identity, legs: &mut OwnedLegs, event: &EventRecord) -> Admission {
    let leg = event.unique_id();

    if claims(identity, event) {
        if let Some(leg) = leg {
            legs.insert(leg);
        }
        return Admission::Claimed;
    }

    match leg {
        Some(leg) if legs.contains(leg) => {
            if event.is_kind(RELEASE_EVENT) {
                legs.remove(leg);
                Admission::Released
            } else {
                Admission::Owned
            }
        }
        _ => Admission::Denied,
    }
}

fn claims(identity: &Identity, event: &EventRecord) -> bool {
    let identity = Some(identity.as_str());

    if event.is_kind(CHANNEL_PARK) {
        return event.direction() == Some(DIRECTION_INBOUND)
            && event.caller_history_number() == identity;
    }

    if event.is_kind(CHANNEL_ANSWER) {
        return event.direction() == Some(DIRECTION_OUTBOUND) && event.caller_number() == identity;
    }

    false
}

/// Connected sessions in registration order
pub struct OwnershipRegistry<S> {
    sessions: Vec<SubscriberSession<S>>,
}

impl<S> OwnershipRegistry<S> {
    pub fn new() -> Self {
        Self {
            sessions: Vec::new(),
        }
    }

    pub fn register(&mut self, session: SubscriberSession<S>) {
        debug!(identity = %session.identity, session = %session.id, "Registering session");
        self.sessions.push(session);
    }

    /// Remove a session, releasing every leg it owned
    pub fn remove(&mut self, id: Uuid) -> Option<SubscriberSession<S>> {
        let index = self.sessions.iter().position(|s| s.id == id)?;
        Some(self.sessions.remove(index))
    }

    pub fn get(&self, id: Uuid) -> Option<&SubscriberSession<S>> {
        self.sessions.iter().find(|s| s.id == id)
    }

    /// Run admission for every session and return the ids of those the
    /// event must be delivered to, in registration order.
    pub fn route(&mut self, event: &EventRecord) -> Vec<Uuid> {
        self.sessions
            .iter_mut()
            .filter_map(|session| {
                let admission = admit(&session.identity, &mut session.legs, event);
                if admission.is_admitted() {
                    debug!(
                        identity = %session.identity,
                        uuid = event.unique_id().unwrap_or_default(),
                        ?admission,
                        "Event admitted"
                    );
                    Some(session.id)
                } else {
                    None
                }
            })
            .collect()
    }

    pub fn snapshot(&self) -> Vec<SessionInfo> {
        self.sessions.iter().map(SubscriberSession::info).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl<S> Default for OwnershipRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}

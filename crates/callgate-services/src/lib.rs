//! Call ownership and session fan-out for Callgate
//!
//! This crate decides which subscriber sees which event and which commands a
//! subscriber may issue.
//!
//! # Architecture
//!
//! All mutable state lives in one [`GatewayHub`] task:
//! - The [`OwnershipRegistry`] holds every connected session and the call
//!   legs it owns
//! - The [`CommandTranslator`] turns an authorized intent into an ESL command
//! - Other tasks talk to the hub only through a cloneable [`HubHandle`]
//!
//! # Services
//!
//! - `admit` - Per-session event admission state machine
//! - `OwnershipRegistry` - Session collection with per-event routing
//! - `CommandTranslator` - Client intent to `api ...` command string
//! - `GatewayHub` - Serialized owner of registry mutations and fan-out

pub mod commands;
pub mod hub;
pub mod ownership;
pub mod session;

pub use commands::CommandTranslator;
pub use hub::{GatewayHub, HubCommand, HubHandle};
pub use ownership::{admit, Admission, OwnedLegs, OwnershipRegistry};
pub use session::{SessionInfo, SessionOutbox, SessionSink, SubscriberSession};

/// Call-control constants
pub mod constants {
    use callgate_esl::events::CHANNEL_HANGUP_COMPLETE;

    /// Event kind that releases ownership of a leg
    pub const RELEASE_EVENT: &str = CHANNEL_HANGUP_COMPLETE;

    /// Hangup cause sent with `uuid_kill`
    pub const HANGUP_CAUSE: &str = "CALL_REJECTED";

    /// Sofia endpoint prefix for outbound calls
    pub const SOFIA_GATEWAY: &str = "sofia/gateway";

    /// Dialplan application for a plain outbound call
    pub const PARK_APPLICATION: &str = "&park()";
}

//! FreeSWITCH Event Socket Layer (ESL) plumbing for Callgate
//!
//! This crate owns the single outbound connection to FreeSWITCH and turns
//! its byte stream into normalized event records.
//!
//! # Architecture
//!
//! ```text
//! FreeSWITCH ESL Server
//!         |
//!         v
//!  ControlLink (TCP, auth, subscribe)
//!         |
//!         v
//!    EslCodec (blank-line frames + Content-Length bodies)
//!         |
//!         v
//!   EventRecord (allow-listed headers, derived fields, body)
//!         |
//!         v
//!   Gateway hub (ownership, fan-out)
//! ```
//!
//! Outbound commands travel the other way through a [`CommandSender`],
//! drained by one writer task so command bytes never interleave.

pub mod event;
pub mod frame;
pub mod link;

pub use event::EventRecord;
pub use frame::EslCodec;
pub use link::{CommandSender, ControlLink, LinkTasks};

/// ESL protocol constants
pub mod constants {
    /// Authentication command
    pub const AUTH_COMMAND: &str = "auth";

    /// Event subscription command (text format)
    pub const EVENT_COMMAND: &str = "event text";

    /// API command prefix
    pub const API_COMMAND: &str = "api";

    /// Frame delimiter: one blank line
    pub const DELIMITER: &[u8] = b"\n\n";

    /// Line terminator inside a frame
    pub const LINE_TERMINATOR: char = '\n';

    /// Header name/value separator
    pub const SEPARATOR: char = ':';

    /// Authentication request content type (server greeting)
    pub const CONTENT_TYPE_AUTH: &str = "auth/request";

    /// Command/Reply content type
    pub const CONTENT_TYPE_REPLY: &str = "command/reply";

    /// API response content type
    pub const CONTENT_TYPE_API_RESPONSE: &str = "api/response";

    /// Largest frame accepted before the link is considered desynchronized
    pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;
}

/// ESL events we subscribe to
pub mod events {
    /// Call leg parked (inbound call waiting for control)
    pub const CHANNEL_PARK: &str = "CHANNEL_PARK";

    /// Call leg answered
    pub const CHANNEL_ANSWER: &str = "CHANNEL_ANSWER";

    /// DTMF digit received
    pub const DTMF: &str = "DTMF";

    /// Media playback started
    pub const PLAYBACK_START: &str = "PLAYBACK_START";

    /// Media playback stopped
    pub const PLAYBACK_STOP: &str = "PLAYBACK_STOP";

    /// Call leg hung up
    pub const CHANNEL_HANGUP: &str = "CHANNEL_HANGUP";

    /// Call leg fully torn down; last event for a leg
    pub const CHANNEL_HANGUP_COMPLETE: &str = "CHANNEL_HANGUP_COMPLETE";

    /// All events the gateway subscribes to
    pub const SUBSCRIBED_EVENTS: &[&str] = &[
        CHANNEL_PARK,
        CHANNEL_ANSWER,
        DTMF,
        PLAYBACK_START,
        PLAYBACK_STOP,
        CHANNEL_HANGUP,
        CHANNEL_HANGUP_COMPLETE,
    ];

    /// Inbound call direction value
    pub const DIRECTION_INBOUND: &str = "inbound";

    /// Outbound call direction value
    pub const DIRECTION_OUTBOUND: &str = "outbound";

    /// Subscription command line, without the delimiter
    pub fn subscription_command() -> String {
        format!(
            "{} {}",
            super::constants::EVENT_COMMAND,
            SUBSCRIBED_EVENTS.join(" ")
        )
    }
}

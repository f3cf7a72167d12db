//! Client intents received over a subscriber websocket

use crate::error::GatewayError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Call-control action a subscriber may request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Answer,
    Playback,
    Hangup,
    Call,
    Conference,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Answer => "answer",
            Action::Playback => "playback",
            Action::Hangup => "hangup",
            Action::Call => "call",
            Action::Conference => "conference",
        }
    }
}

impl FromStr for Action {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "answer" => Ok(Action::Answer),
            "playback" => Ok(Action::Playback),
            "hangup" => Ok(Action::Hangup),
            "call" => Ok(Action::Call),
            "conference" => Ok(Action::Conference),
            other => Err(GatewayError::UnknownAction(other.to_string())),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// JSON command sent by a subscriber
///
/// ```json
/// { "uuid": "…", "action": "playback", "file": "greeting.wav" }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientIntent {
    /// Call-leg identifier the action applies to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,

    pub action: String,

    /// Media file name (playback only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    /// Dialed number (call and conference only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
}

impl ClientIntent {
    /// Deserialize an intent from a websocket text frame
    pub fn from_json(text: &str) -> Result<Self, GatewayError> {
        serde_json::from_str(text).map_err(|e| GatewayError::InvalidIntent(e.to_string()))
    }

    pub fn action(&self) -> Result<Action, GatewayError> {
        self.action.parse()
    }
}

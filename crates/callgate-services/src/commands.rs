//! Client intent to ESL command translation
//!
//! | action | leg | command |
//! |---|---|---|
//! | answer | yes | `api uuid_answer <leg>` |
//! | playback | yes | `api uuid_broadcast <leg> playback::<root><identity>/<file>` |
//! | hangup | yes | `api uuid_kill <leg> CALL_REJECTED` |
//! | call | no | `api originate {origination_caller_id_number=<identity>}sofia/gateway/<route>/<destination> &park()` |
//! | conference | no | `api originate {origination_caller_id_number=<identity>}sofia/gateway/<route>/<destination> &conference(<digits>)` |

use callgate_core::{Action, ClientIntent, GatewayConfig, GatewayError, GatewayResult, Identity};
use callgate_esl::constants::API_COMMAND;

use crate::constants::{HANGUP_CAUSE, PARK_APPLICATION, SOFIA_GATEWAY};
use crate::ownership::OwnedLegs;

/// Builds outbound commands for authorized intents
#[derive(Debug, Clone)]
pub struct CommandTranslator {
    media_root: String,
    route: String,
}

impl CommandTranslator {
    pub fn new(media_root: impl Into<String>, route: impl Into<String>) -> Self {
        Self {
            media_root: media_root.into(),
            route: route.into(),
        }
    }

    pub fn from_config(config: &GatewayConfig) -> Self {
        Self::new(config.media.root.clone(), config.gateway.route.clone())
    }

    /// Validate `intent` for the session `identity` owning `legs` and build
    /// the command line, without the delimiter.
    ///
    /// # Errors
    ///
    /// - `UnknownAction` for an action outside the fixed set
    /// - `UnownedLeg` when a supplied `uuid` is not owned, for any action
    /// - `MissingField` / `InvalidParameter` for absent or unsafe parameters
    pub fn translate(
        &self,
        identity: &Identity,
        legs: &OwnedLegs,
        intent: &ClientIntent,
    ) -> GatewayResult<String> {
        let action = intent.action()?;

        let leg = match intent.uuid.as_deref() {
            Some(uuid) => {
                let uuid = parameter("uuid", Some(uuid))?;
                if !legs.contains(uuid) {
                    return Err(GatewayError::UnownedLeg(uuid.to_string()));
                }
                Some(uuid)
            }
            None => None,
        };

        let command = match action {
            Action::Answer => {
                let leg = parameter("uuid", leg)?;
                format!("{} uuid_answer {}", API_COMMAND, leg)
            }
            Action::Playback => {
                let leg = parameter("uuid", leg)?;
                let file = media_file(intent.file.as_deref())?;
                format!(
                    "{} uuid_broadcast {} playback::{}{}/{}",
                    API_COMMAND, leg, self.media_root, identity, file
                )
            }
            Action::Hangup => {
                let leg = parameter("uuid", leg)?;
                format!("{} uuid_kill {} {}", API_COMMAND, leg, HANGUP_CAUSE)
            }
            Action::Call => {
                let destination = parameter("destination", intent.destination.as_deref())?;
                format!(
                    "{} {}",
                    self.originate(identity, destination),
                    PARK_APPLICATION
                )
            }
            Action::Conference => {
                let destination = parameter("destination", intent.destination.as_deref())?;
                format!(
                    "{} &conference({})",
                    self.originate(identity, destination),
                    identity.without_plus()
                )
            }
        };

        Ok(command)
    }

    fn originate(&self, identity: &Identity, destination: &str) -> String {
        format!(
            "{} originate {{origination_caller_id_number={}}}{}/{}/{}",
            API_COMMAND, identity, SOFIA_GATEWAY, self.route, destination
        )
    }
}

/// Present, non-empty, and free of whitespace and control characters
fn parameter<'a>(field: &'static str, value: Option<&'a str>) -> GatewayResult<&'a str> {
    let value = value.ok_or(GatewayError::MissingField(field))?;

    if value.is_empty() || value.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(GatewayError::InvalidParameter {
            field,
            value: value.to_string(),
        });
    }

    Ok(value)
}

/// Media file relative to the subscriber's directory
fn media_file(value: Option<&str>) -> GatewayResult<&str> {
    let file = parameter("file", value)?;

    if file.split('/').any(|segment| segment == "..") {
        return Err(GatewayError::InvalidParameter {
            field: "file",
            value: file.to_string(),
        });
    }

    Ok(file)
}

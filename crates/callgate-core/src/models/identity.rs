//! Subscriber identity
//!
//! A subscriber is named by a phone-number-like string: a leading `+`
//! followed by one or more digits. It arrives as the last segment of the
//! websocket path `/ws/<identity>`.

use crate::error::GatewayError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::fmt;

static IDENTITY_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+\d+$").expect("identity regex is valid"));

/// Validated subscriber identity (e.g. `+15550001`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Validate a raw identity string
    pub fn parse(raw: &str) -> Result<Self, GatewayError> {
        if IDENTITY_PATTERN.is_match(raw) {
            Ok(Self(raw.to_string()))
        } else {
            Err(GatewayError::UnknownSubscriber(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Digits only, used as a conference room name
    pub fn without_plus(&self) -> &str {
        self.0.trim_start_matches('+')
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

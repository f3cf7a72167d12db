//! ESL event parsing and normalization
//!
//! A frame is split into lines. A line that splits on `:` into exactly two
//! parts (after dropping trailing empty parts) is a header; every other line
//! is body text. Only allow-listed headers survive, their values are
//! percent-decoded, and a few fields are derived from others before the
//! record is handed to the gateway.
//!
//! Values whose colons were not percent-encoded (for example a raw SIP URI)
//! split into three or more parts and therefore land in the body. That is
//! what decides which lines reach subscribers as structured fields.

use crate::constants::{LINE_TERMINATOR, SEPARATOR};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use tracing::warn;

/// Header names used by the gateway
pub mod headers {
    pub const CONTENT_TYPE: &str = "Content-Type";
    pub const EVENT_NAME: &str = "Event-Name";
    pub const UNIQUE_ID: &str = "Unique-ID";
    pub const CALL_DIRECTION: &str = "Call-Direction";
    pub const CALLER_NUMBER: &str = "Caller-Caller-ID-Number";
    pub const DESTINATION_NUMBER: &str = "Caller-Destination-Number";
    pub const PLAYBACK_FILE_PATH: &str = "Playback-File-Path";
    pub const DTMF_DIGIT: &str = "DTMF-Digit";
    pub const CONFERENCE_NAME_VAR: &str = "variable_conference_name";
    pub const SIP_HISTORY_INFO: &str = "variable_sip_history_info";

    // Derived
    pub const CALLER_HISTORY_NUMBER: &str = "Caller-History-Number";
    pub const CONFERENCE_NAME: &str = "Conference-Name";
    pub const PLAYBACK_FILE: &str = "Playback-File";

    /// Property name of the body in the outbound JSON object
    pub const BODY: &str = "Body";

    /// Headers retained from a frame; everything else is dropped
    pub const ALLOWED: &[&str] = &[
        CONTENT_TYPE,
        EVENT_NAME,
        UNIQUE_ID,
        CALL_DIRECTION,
        CALLER_NUMBER,
        DESTINATION_NUMBER,
        PLAYBACK_FILE_PATH,
        DTMF_DIGIT,
        CONFERENCE_NAME_VAR,
        SIP_HISTORY_INFO,
    ];
}

use headers::*;

/// User part of the first `sip:` URI whose user starts with `+`
static SIP_USER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<sip:(\+[^@]*?)@").expect("sip user regex is valid"));

/// One tokenized frame line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Line<'a> {
    Header { name: &'a str, value: &'a str },
    Body(&'a str),
}

/// Classify a single line.
///
/// Exactly two parts after splitting on `:` and discarding trailing empty
/// parts makes a header. `Name:` (nothing after the colon) and
/// `Name: a:b` are both body lines.
pub fn tokenize(line: &str) -> Line<'_> {
    let mut parts: Vec<&str> = line.split(SEPARATOR).collect();
    while parts.last().is_some_and(|p| p.is_empty()) {
        parts.pop();
    }

    match parts[..] {
        [name, value] => Line::Header { name, value },
        _ => Line::Body(line),
    }
}

/// Split a frame into lines, dropping trailing empty lines
fn frame_lines(frame: &str) -> Vec<&str> {
    let mut lines: Vec<&str> = frame.split(LINE_TERMINATOR).collect();
    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    lines
}

/// Percent-decode a header value. `+` is kept literally.
fn decode_value(raw: &str) -> Option<String> {
    urlencoding::decode(raw).map(|v| v.into_owned()).ok()
}

/// Normalized ESL event
///
/// Serializes to a flat JSON object of string properties, plus `Body` when
/// the frame carried non-header lines.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EventRecord {
    #[serde(flatten)]
    fields: BTreeMap<String, String>,

    #[serde(rename = "Body", skip_serializing_if = "Option::is_none")]
    body: Option<String>,
}

impl EventRecord {
    /// Create a new empty record
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and normalize one frame
    pub fn parse(frame: &str) -> Self {
        let mut record = Self::new();
        let mut body = String::new();

        for line in frame_lines(frame) {
            match tokenize(line) {
                Line::Header { name, value } => {
                    let name = name.trim();
                    if !ALLOWED.contains(&name) {
                        continue;
                    }

                    let value = value.trim();
                    match decode_value(value) {
                        Some(decoded) => {
                            record.fields.insert(name.to_string(), decoded);
                        }
                        None => {
                            warn!(header = %name, value = %value, "Dropping undecodable header");
                        }
                    }
                }
                Line::Body(text) => {
                    body.push_str(text);
                    body.push(LINE_TERMINATOR);
                }
            }
        }

        if !body.is_empty() {
            record.body = Some(body);
        }

        record.derive();
        record
    }

    /// Apply field derivations. Each consumes its source field; a record
    /// without the source is left untouched.
    pub fn derive(&mut self) {
        let history_number = self
            .fields
            .get(SIP_HISTORY_INFO)
            .and_then(|history| SIP_USER_PATTERN.captures(history))
            .and_then(|captures| captures.get(1))
            .map(|user| user.as_str().to_string());
        if let Some(number) = history_number {
            self.fields.remove(SIP_HISTORY_INFO);
            self.fields.insert(CALLER_HISTORY_NUMBER.to_string(), number);
        }

        if let Some(name) = self.fields.remove(CONFERENCE_NAME_VAR) {
            self.fields.insert(CONFERENCE_NAME.to_string(), name);
        }

        if let Some(path) = self.fields.remove(PLAYBACK_FILE_PATH) {
            let file = path.rsplit('/').next().unwrap_or_default().to_string();
            self.fields.insert(PLAYBACK_FILE.to_string(), file);
        }
    }

    /// Get a field value by name
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// Set a field
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(name.into(), value.into());
    }

    /// Builder-style `set`
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    /// All allow-listed and derived fields
    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    /// Non-header lines of the frame, each terminated by `\n`
    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }

    pub fn event_name(&self) -> Option<&str> {
        self.get(EVENT_NAME)
    }

    /// Whether this record is an event of the given kind
    pub fn is_kind(&self, kind: &str) -> bool {
        self.event_name() == Some(kind)
    }

    /// Call-leg identifier
    pub fn unique_id(&self) -> Option<&str> {
        self.get(UNIQUE_ID)
    }

    pub fn direction(&self) -> Option<&str> {
        self.get(CALL_DIRECTION)
    }

    pub fn caller_number(&self) -> Option<&str> {
        self.get(CALLER_NUMBER)
    }

    pub fn destination_number(&self) -> Option<&str> {
        self.get(DESTINATION_NUMBER)
    }

    /// Number derived from the SIP history of a diverted inbound call
    pub fn caller_history_number(&self) -> Option<&str> {
        self.get(CALLER_HISTORY_NUMBER)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.get(CONTENT_TYPE)
    }

    /// Serialize to the flat JSON object pushed to subscribers
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl fmt::Display for EventRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventRecord {{")?;

        if let Some(event_name) = self.event_name() {
            write!(f, " Event-Name: {}", event_name)?;
        }

        if let Some(uuid) = self.unique_id() {
            write!(f, ", UUID: {}", uuid)?;
        }

        if let Some(caller) = self.caller_number() {
            write!(f, ", Caller: {}", caller)?;
        }

        if let Some(dest) = self.destination_number() {
            write!(f, ", Destination: {}", dest)?;
        }

        write!(f, ", Fields: {} }}", self.fields.len())
    }
}

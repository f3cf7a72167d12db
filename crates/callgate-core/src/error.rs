//! Unified error handling for Callgate
//!
//! Every failure in the gateway is expressed as a `GatewayError`. The
//! control-link variants are fatal to the process; the intent and subscriber
//! variants are local and only ever logged. It implements `ResponseError`
//! so HTTP handlers can return it directly.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

/// Main gateway error type
#[derive(Error, Debug)]
pub enum GatewayError {
    // ==================== Subscriber Errors ====================
    #[error("Unknown subscriber path: {0}")]
    UnknownSubscriber(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Subscriber transport closed: {0}")]
    TransportClosed(String),

    // ==================== Intent Errors ====================
    #[error("Invalid intent: {0}")]
    InvalidIntent(String),

    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid parameter {field}: {value:?}")]
    InvalidParameter { field: &'static str, value: String },

    #[error("Call leg {0} is not owned by this session")]
    UnownedLeg(String),

    // ==================== Control Link Errors ====================
    #[error("ESL connection error: {0}")]
    EslConnection(String),

    #[error("ESL authentication failed: {0}")]
    EslAuth(String),

    #[error("ESL protocol error: {0}")]
    EslProtocol(String),

    #[error("ESL link closed")]
    LinkClosed,

    // ==================== Internal Errors ====================
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            GatewayError::InvalidIntent(_)
            | GatewayError::UnknownAction(_)
            | GatewayError::MissingField(_)
            | GatewayError::InvalidParameter { .. } => StatusCode::BAD_REQUEST,

            // 403 Forbidden
            GatewayError::UnownedLeg(_) => StatusCode::FORBIDDEN,

            // 404 Not Found
            GatewayError::UnknownSubscriber(_) | GatewayError::SessionNotFound(_) => {
                StatusCode::NOT_FOUND
            }

            // 502 Bad Gateway
            GatewayError::EslConnection(_)
            | GatewayError::EslAuth(_)
            | GatewayError::EslProtocol(_)
            | GatewayError::LinkClosed => StatusCode::BAD_GATEWAY,

            // 500 Internal Server Error
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            GatewayError::UnknownSubscriber(_) => "unknown_subscriber",
            GatewayError::SessionNotFound(_) => "session_not_found",
            GatewayError::TransportClosed(_) => "transport_closed",
            GatewayError::InvalidIntent(_) => "invalid_intent",
            GatewayError::UnknownAction(_) => "unknown_action",
            GatewayError::MissingField(_) => "missing_field",
            GatewayError::InvalidParameter { .. } => "invalid_parameter",
            GatewayError::UnownedLeg(_) => "unowned_leg",
            GatewayError::EslConnection(_) => "esl_connection_error",
            GatewayError::EslAuth(_) => "esl_auth_error",
            GatewayError::EslProtocol(_) => "esl_protocol_error",
            GatewayError::LinkClosed => "esl_link_closed",
            GatewayError::Config(_) => "config_error",
            GatewayError::Serialization(_) => "serialization_error",
            GatewayError::Internal(_) => "internal_error",
        }
    }

    /// Whether the gateway can keep serving subscribers after this error.
    ///
    /// Losing the control link leaves sessions without an event source.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            GatewayError::EslConnection(_)
                | GatewayError::EslAuth(_)
                | GatewayError::EslProtocol(_)
                | GatewayError::LinkClosed
                | GatewayError::Config(_)
        )
    }
}

impl ResponseError for GatewayError {
    fn status_code(&self) -> StatusCode {
        GatewayError::status_code(self)
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let body = json!({
            "error": self.error_code(),
            "message": self.to_string(),
            "status": status.as_u16(),
        });

        HttpResponse::build(status).json(body)
    }
}

// ==================== From implementations ====================

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(err: std::io::Error) -> Self {
        GatewayError::EslConnection(err.to_string())
    }
}

impl From<config::ConfigError> for GatewayError {
    fn from(err: config::ConfigError) -> Self {
        GatewayError::Config(err.to_string())
    }
}

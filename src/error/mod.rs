//! Application error types for robust error handling.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Errors raised by the live harness core (connection, registry, acks, scenarios).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HarnessError {
    #[error("not connected: cannot {operation}")]
    NotConnected { operation: String },

    #[error("Invalid channel name: {0}")]
    InvalidChannel(String),

    #[error("ack timeout for {message_id}")]
    AckTimeout { message_id: String },

    #[error("unknown scenario: {0}")]
    UnknownScenario(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("scenario {scenario} failed at {step}: {source}")]
    Scenario {
        scenario: String,
        step: ScenarioStep,
        #[source]
        source: Box<HarnessError>,
    },
}

impl HarnessError {
    pub fn not_connected(operation: impl Into<String>) -> Self {
        HarnessError::NotConnected {
            operation: operation.into(),
        }
    }
}

/// Step of a scenario run that produced a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioStep {
    Connect,
    Subscribe,
    Publish,
}

impl std::fmt::Display for ScenarioStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ScenarioStep::Connect => "connect",
            ScenarioStep::Subscribe => "subscribe",
            ScenarioStep::Publish => "publish",
        };
        f.write_str(name)
    }
}

pub type HarnessResult<T> = Result<T, HarnessError>;

/// Application-level errors.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Harness(#[from] HarnessError),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<validator::ValidationErrors> for AppError {
    fn from(e: validator::ValidationErrors) -> Self {
        AppError::Validation(e.to_string())
    }
}

fn harness_status(err: &HarnessError) -> StatusCode {
    match err {
        HarnessError::NotConnected { .. } => StatusCode::CONFLICT,
        HarnessError::InvalidChannel(_) => StatusCode::BAD_REQUEST,
        HarnessError::AckTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        HarnessError::UnknownScenario(_) => StatusCode::NOT_FOUND,
        HarnessError::Transport(_) => StatusCode::BAD_GATEWAY,
        HarnessError::Scenario { source, .. } => harness_status(source),
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Config(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            AppError::Redis(e) => (
                StatusCode::SERVICE_UNAVAILABLE,
                format!("Redis error: {}", e),
            ),
            AppError::Db(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Database error: {}", e),
            ),
            AppError::Serialization(e) => (
                StatusCode::BAD_REQUEST,
                format!("Invalid payload: {}", e),
            ),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
            AppError::Harness(e) => (harness_status(e), e.to_string()),
            AppError::Internal(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Internal error: {}", e),
            ),
        };

        let body = Json(json!({ "error": message }));
        (status, body).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_error_uses_inner_status() {
        let err = HarnessError::Scenario {
            scenario: "basic-echo".to_string(),
            step: ScenarioStep::Subscribe,
            source: Box::new(HarnessError::not_connected("subscribe")),
        };
        assert_eq!(harness_status(&err), StatusCode::CONFLICT);
        assert_eq!(
            err.to_string(),
            "scenario basic-echo failed at subscribe: not connected: cannot subscribe"
        );
    }

    #[test]
    fn unknown_scenario_is_not_found() {
        let resp = AppError::from(HarnessError::UnknownScenario("nope".into())).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}

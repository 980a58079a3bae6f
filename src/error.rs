//! Error types and the crate-wide result alias.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Crate result type alias
pub type Result<T> = std::result::Result<T, AppError>;

/// A controller declaration that cannot be bound to the router.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeclarationError {
    #[error("{member}: unknown HTTP verb `{verb}`")]
    UnknownVerb { member: String, verb: String },

    #[error("{member}: invalid route path `{path}`: {reason}")]
    InvalidPath {
        member: String,
        path: String,
        reason: &'static str,
    },

    #[error("{member}: route declared but the controller has no handler for it")]
    MissingHandler { member: String },

    #[error("{member}: {verb} {path} is already bound to {existing}")]
    DuplicateRoute {
        member: String,
        verb: String,
        path: String,
        existing: String,
    },

    #[error("{member}: {path} names a path parameter differently from {existing_path} of {existing}")]
    ConflictingRoute {
        member: String,
        path: String,
        existing: String,
        existing_path: String,
    },
}

/// Failure while assembling the OpenAPI document.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerateError {
    #[error("schema name `{name}` is used by both `{first}` and `{second}`")]
    SchemaNameCollision {
        name: String,
        first: &'static str,
        second: &'static str,
    },
}

/// Application error types.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Validation failed: {}", .0.join(", "))]
    Validation(Vec<String>),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{} invalid route declaration(s): {}", .0.len(), join_errors(.0))]
    Declaration(Vec<DeclarationError>),

    #[error("OpenAPI generation failed: {0}")]
    Generate(#[from] GenerateError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

fn join_errors(errors: &[DeclarationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::BadRequest(_) | Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Config(_)
            | Self::Declaration(_)
            | Self::Generate(_)
            | Self::Io(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Client-facing message. Server-side details stay in the logs.
    fn message(&self) -> serde_json::Value {
        match self {
            Self::NotFound(msg)
            | Self::Conflict(msg)
            | Self::BadRequest(msg)
            | Self::Unavailable(msg) => json!(msg),
            Self::Validation(errors) => json!(errors),
            Self::Config(_)
            | Self::Declaration(_)
            | Self::Generate(_)
            | Self::Io(_)
            | Self::Internal(_) => json!("Internal server error"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, "request rejected");
        }

        let body = Json(json!({
            "statusCode": status.as_u16(),
            "error": status.canonical_reason().unwrap_or("Error"),
            "message": self.message(),
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(AppError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::Conflict("x".into()).status(), StatusCode::CONFLICT);
        assert_eq!(AppError::Validation(vec![]).status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            AppError::Unavailable("x".into()).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            AppError::Internal("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_internal_details_are_hidden() {
        let error = AppError::Internal("connection string leaked".into());
        assert_eq!(error.message(), json!("Internal server error"));
    }

    #[test]
    fn test_declaration_errors_are_listed_together() {
        let error = AppError::Declaration(vec![
            DeclarationError::UnknownVerb {
                member: "Users::find".into(),
                verb: "fetch".into(),
            },
            DeclarationError::MissingHandler {
                member: "Users::remove".into(),
            },
        ]);
        let text = error.to_string();
        assert!(text.starts_with("2 invalid route declaration(s)"));
        assert!(text.contains("unknown HTTP verb `fetch`"));
        assert!(text.contains("Users::remove"));
    }
}

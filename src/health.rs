//! Health check endpoints for Kubernetes readiness and liveness probes.
//!
//! This module provides three endpoints:
//! - `/health` - Basic health check (always returns 200 OK)
//! - `/health/ready` - Readiness probe (pings the user store, 503 when it is down)
//! - `/health/live` - Liveness probe (always returns 200 OK)

use std::sync::Arc;

use axum::{Json, http::StatusCode};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::binder::RouteHandler;
use crate::declare::{ApiOperation, ApiProperty, ApiResponse, ApiSchema, ControllerDecl, SchemaDecl};
use crate::traits::Controller;
use crate::users::UserStore;

/// Health status enum
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    #[serde(rename = "healthy")]
    Healthy,
    #[serde(rename = "unhealthy")]
    Unhealthy,
}

/// Database connection status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum DatabaseStatus {
    #[serde(rename = "connected")]
    Connected,
    #[serde(rename = "disconnected")]
    Disconnected,
    #[serde(rename = "error")]
    Error { message: String },
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
}

/// Detailed health check response with component checks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetailedHealthResponse {
    pub status: HealthStatus,
    pub checks: Checks,
}

/// Component health checks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checks {
    pub database: DatabaseStatus,
}

impl ApiSchema for HealthResponse {
    fn declare(schema: &mut SchemaDecl<'_>) {
        schema.untyped(
            "status",
            ApiProperty::new().enum_values(["healthy", "unhealthy"]),
        );
    }
}

impl ApiSchema for DatabaseStatus {
    fn declare(schema: &mut SchemaDecl<'_>) {
        schema
            .untyped(
                "status",
                ApiProperty::new().enum_values(["connected", "disconnected", "error"]),
            )
            .property::<String>(
                "message",
                ApiProperty::optional().description("Present when status is `error`"),
            );
    }
}

impl ApiSchema for Checks {
    fn declare(schema: &mut SchemaDecl<'_>) {
        schema.dto::<DatabaseStatus>("database", ApiProperty::new());
    }
}

impl ApiSchema for DetailedHealthResponse {
    fn declare(schema: &mut SchemaDecl<'_>) {
        schema
            .untyped(
                "status",
                ApiProperty::new().enum_values(["healthy", "unhealthy"]),
            )
            .dto::<Checks>("checks", ApiProperty::new());
    }
}

/// Probe endpoints, mounted outside the global API prefix.
pub struct HealthController {
    store: Arc<dyn UserStore>,
}

impl HealthController {
    pub fn new(store: Arc<dyn UserStore>) -> Self {
        Self { store }
    }

    /// Basic health check. Always healthy while the process serves requests.
    pub async fn health(&self) -> Json<HealthResponse> {
        Json(HealthResponse {
            status: HealthStatus::Healthy,
        })
    }

    /// Liveness probe. Kubernetes restarts the container when it fails.
    pub async fn live(&self) -> Json<HealthResponse> {
        Json(HealthResponse {
            status: HealthStatus::Healthy,
        })
    }

    /// Readiness probe.
    ///
    /// - **200 OK**: the user store answers
    /// - **503 Service Unavailable**: the user store is disconnected or failing
    pub async fn ready(&self) -> (StatusCode, Json<DetailedHealthResponse>) {
        match self.store.ping().await {
            Ok(()) => (
                StatusCode::OK,
                Json(DetailedHealthResponse {
                    status: HealthStatus::Healthy,
                    checks: Checks {
                        database: DatabaseStatus::Connected,
                    },
                }),
            ),
            Err(e) => {
                warn!(error = %e, "readiness check failed");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(DetailedHealthResponse {
                        status: HealthStatus::Unhealthy,
                        checks: Checks {
                            database: DatabaseStatus::Error {
                                message: e.to_string(),
                            },
                        },
                    }),
                )
            }
        }
    }
}

impl Controller for HealthController {
    fn base_path() -> &'static str {
        "/health"
    }

    fn use_global_prefix() -> bool {
        false
    }

    fn declare(api: &mut ControllerDecl<'_>) {
        api.tags(["Health"]);

        api.method("health")
            .get("")
            .operation(ApiOperation::new("Basic health check"))
            .response(ApiResponse::ok("Service is healthy").body::<HealthResponse>());

        api.method("live")
            .get("/live")
            .operation(ApiOperation::new("Liveness probe"))
            .response(ApiResponse::ok("Service is alive").body::<HealthResponse>());

        api.method("ready")
            .get("/ready")
            .operation(ApiOperation::new("Readiness probe"))
            .response(ApiResponse::ok("Service is ready").body::<DetailedHealthResponse>())
            .response(
                ApiResponse::new(503, "Service is not ready").body::<DetailedHealthResponse>(),
            );
    }

    fn handlers(self: Arc<Self>) -> Vec<RouteHandler> {
        let health = Arc::clone(&self);
        let live = Arc::clone(&self);
        let ready = self;

        vec![
            RouteHandler::new("health", move || {
                let this = Arc::clone(&health);
                async move { this.health().await }
            }),
            RouteHandler::new("live", move || {
                let this = Arc::clone(&live);
                async move { this.live().await }
            }),
            RouteHandler::new("ready", move || {
                let this = Arc::clone(&ready);
                async move { this.ready().await }
            }),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::InMemoryUserStore;

    #[test]
    fn test_health_response_serialization() {
        let response = HealthResponse {
            status: HealthStatus::Healthy,
        };
        let json = serde_json::to_string(&response).unwrap();
        assert_eq!(json, r#"{"status":"healthy"}"#);
    }

    #[test]
    fn test_detailed_health_response_serialization() {
        let response = DetailedHealthResponse {
            status: HealthStatus::Healthy,
            checks: Checks {
                database: DatabaseStatus::Connected,
            },
        };
        let json = serde_json::to_string(&response).unwrap();
        assert_eq!(
            json,
            r#"{"status":"healthy","checks":{"database":{"status":"connected"}}}"#
        );
    }

    #[test]
    fn test_database_status_error_serialization() {
        let status = DatabaseStatus::Error {
            message: "connection refused".to_string(),
        };
        let json = serde_json::to_string(&status).unwrap();
        assert_eq!(json, r#"{"status":"error","message":"connection refused"}"#);
    }

    #[tokio::test]
    async fn test_ready_follows_store_connection() {
        let store = Arc::new(InMemoryUserStore::new());
        let health = HealthController::new(store.clone());

        let (status, Json(body)) = health.ready().await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body.status, HealthStatus::Unhealthy);
        assert!(matches!(body.checks.database, DatabaseStatus::Error { .. }));

        store.connect().await.unwrap();
        let (status, Json(body)) = health.ready().await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.checks.database, DatabaseStatus::Connected);
    }
}

//! # keel-axum
//!
//! A CRUD service framework for Axum. Controllers declare their routes and
//! documentation once; the framework binds the routes and generates an
//! OpenAPI 3.0.3 document from the same declarations.
//!
//! ## Features
//!
//! - **Declared routes**: verb, path and handler chain recorded per controller member
//! - **Generated OpenAPI**: operations, parameters, bodies, responses and DTO components
//! - **Scalar UI**: Interactive API documentation at `/scalar`
//! - **Swagger UI**: Alternative OpenAPI documentation at `/swagger` (with `swagger-ui` feature)
//! - **Health Checks**: Kubernetes-ready liveness and readiness probes
//! - **Request Context**: Correlation ID and language propagation
//! - **Request Logging**: Structured logging through `tracing`
//! - **Validation**: `validator`-backed body and query checks per route
//!
//! ## Quick Start
//!
//! ```ignore
//! use keel_axum::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config: AppConfig = KeelConfig::load()?;
//!     let store: Arc<dyn UserStore> = Arc::new(InMemoryUserStore::new());
//!     store.connect().await?;
//!
//!     KeelApp::new(config)
//!         .request_context()
//!         .health_checks(store.clone())
//!         .mount(UsersController::new(store))
//!         .serve("0.0.0.0:3000")
//!         .await?;
//!     Ok(())
//! }
//! ```

mod app;
pub mod binder;
pub mod config;
pub mod declare;
pub mod docs;
pub mod error;
mod health;
pub mod logging;
pub mod metadata;
pub mod middleware;
pub mod openapi;
pub mod pagination;
mod traits;
pub mod users;

pub use app::{App, KeelApp};
pub use traits::*;

// Re-export health check types
pub use health::{Checks, DatabaseStatus, DetailedHealthResponse, HealthController, HealthResponse, HealthStatus};

// Re-export middleware types
pub use middleware::{Middleware, RequestContext, request_context_middleware_fn, validate_body, validate_query};

pub use binder::{HttpVerb, RouteHandler};
pub use config::{AppConfig, KeelConfig};
pub use declare::{
    ApiBody, ApiOperation, ApiParam, ApiProperty, ApiResponse, ApiSchema, ApiType, ControllerDecl,
    MethodDecl, SchemaDecl,
};
pub use docs::{DocumentConfig, DocumentGenerator, RecordedRoute};
pub use error::{AppError, DeclarationError, GenerateError, Result};
pub use metadata::MetadataStore;
pub use pagination::{PaginationMeta, PaginationQuery};

// Re-export Swagger UI when feature is enabled
#[cfg(feature = "swagger-ui")]
pub use utoipa_swagger_ui::SwaggerUi;

// Re-export common dependencies
pub use axum::{
    self,
    extract::{Extension, Json, Path, Query, Request, State},
    response::{IntoResponse, Response},
};
pub use serde::{Deserialize, Serialize};
pub use serde_json::{self, json};
pub use tokio;
pub use tracing::{debug, error, info, instrument, warn};
pub use validator::{self, Validate};

/// Prelude for easy importing
pub mod prelude {
    pub use super::{
        ApiBody,
        ApiOperation,
        ApiParam,
        ApiProperty,
        ApiResponse,
        ApiSchema,
        AppConfig,
        AppError,
        Controller,
        ControllerDecl,
        Deserialize,
        Extension,
        HealthController,
        IntoResponse,
        Json,
        KeelApp,
        KeelConfig,
        PaginationMeta,
        PaginationQuery,
        Path,
        Query,
        Request,
        RequestContext,
        Response,
        Result,
        RouteHandler,
        SchemaDecl,
        Serialize,
        Validate,
        debug,
        error,
        info,
        json,
        validate_body,
        validate_query,
        warn,
    };
    pub use crate::users::{InMemoryUserStore, UserStore, UsersController};
    pub use std::sync::Arc;
    pub use uuid::Uuid;
}

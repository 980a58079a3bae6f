//! Middleware for request context, structured logging and per-route chains.
//!
//! This module provides:
//! - `RequestContext` - Request metadata propagation (correlation ID, language)
//! - `request_context_middleware_fn` - Axum middleware for context extraction
//! - `request_logging_middleware` - Tower-http TraceLayer for structured logging
//! - `Middleware` - A handler-chain step attached to a single declared route
//! - `validate_body` / `validate_query` - Request validation chain steps

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Query, Request},
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
    routing::MethodRouter,
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::Instrument;
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use crate::error::AppError;

/// Largest request body the validation middleware buffers.
pub const MAX_VALIDATED_BODY: usize = 1024 * 1024;

/// Request context propagated through the entire request lifecycle.
///
/// Extracted from incoming request headers and made available to handlers
/// via Axum's Extension extractor.
///
/// # Fields
///
/// - `correlation_id` - Unique identifier for tracking the request across services.
///   Extracted from `X-Correlation-ID` header or generated as a new UUID.
/// - `language` - Content language from `Accept-Language` header (defaults to "en").
/// - `request_id` - Unique identifier for this specific request (always generated).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestContext {
    /// Correlation ID from X-Correlation-ID header or generated
    pub correlation_id: Uuid,

    /// Content language from Accept-Language header (default: "en")
    pub language: String,

    /// Unique request ID (always generated)
    pub request_id: Uuid,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self {
            correlation_id: Uuid::new_v4(),
            language: "en".to_string(),
            request_id: Uuid::new_v4(),
        }
    }
}

/// Extract correlation ID from headers or generate a new one.
fn extract_correlation_id(headers: &HeaderMap) -> Uuid {
    headers
        .get("x-correlation-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
        .unwrap_or_else(Uuid::new_v4)
}

/// Extract language from Accept-Language header or default to "en".
fn extract_language(headers: &HeaderMap) -> String {
    headers
        .get("accept-language")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("en")
        .to_string()
}

/// Axum middleware function for request context propagation.
///
/// This middleware:
/// 1. Extracts `X-Correlation-ID` header or generates a new UUID
/// 2. Extracts `Accept-Language` header or defaults to "en"
/// 3. Generates a unique `request_id`
/// 4. Inserts `RequestContext` as an Axum Extension
/// 5. Runs the rest of the stack inside a `request` span carrying both ids,
///    so every log line emitted by the handler is bound to the request
/// 6. Adds `X-Correlation-ID` to the response headers
pub async fn request_context_middleware_fn(mut req: Request, next: Next) -> Response {
    let ctx = RequestContext {
        correlation_id: extract_correlation_id(req.headers()),
        language: extract_language(req.headers()),
        request_id: Uuid::new_v4(),
    };
    let correlation_id = ctx.correlation_id;

    let span = tracing::info_span!(
        "request",
        request_id = %ctx.request_id,
        correlation_id = %ctx.correlation_id,
    );
    req.extensions_mut().insert(ctx);

    let mut response = next.run(req).instrument(span).await;

    if let Ok(header_value) = HeaderValue::from_str(&correlation_id.to_string()) {
        response
            .headers_mut()
            .insert("x-correlation-id", header_value);
    }

    response
}

/// Request logging middleware using tower-http's TraceLayer.
///
/// # Example Log Output
///
/// ```text
/// request{request_id=.. correlation_id=..}: finished processing request latency=45 ms status=200
/// ```
pub fn request_logging_middleware() -> tower_http::trace::TraceLayer<
    tower_http::classify::SharedClassifier<tower_http::classify::ServerErrorsAsFailures>,
    tower_http::trace::DefaultMakeSpan,
> {
    tower_http::trace::TraceLayer::new_for_http().on_response(
        tower_http::trace::DefaultOnResponse::new()
            .level(tracing::Level::INFO)
            .latency_unit(tower_http::LatencyUnit::Millis),
    )
}

type MiddlewareFuture = Pin<Box<dyn Future<Output = Response> + Send>>;
type MiddlewareFn = dyn Fn(Request, Next) -> MiddlewareFuture + Send + Sync;

/// One step of a route's handler chain.
///
/// Declared on a route with `MethodDecl::route_with`; the route binder
/// inserts the chain ahead of the handler, first element running first.
#[derive(Clone)]
pub struct Middleware {
    name: String,
    func: Arc<MiddlewareFn>,
}

impl Middleware {
    pub fn from_fn<F, Fut>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(move |req: Request, next: Next| -> MiddlewareFuture {
                Box::pin(func(req, next))
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wrap `route` so this step runs before it.
    pub(crate) fn wrap(&self, route: MethodRouter) -> MethodRouter {
        let func = Arc::clone(&self.func);
        route.layer(axum::middleware::from_fn(move |req: Request, next: Next| {
            func(req, next)
        }))
    }
}

impl fmt::Debug for Middleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Middleware").field(&self.name).finish()
    }
}

/// Flatten validator errors into sorted `field: message` lines.
pub fn validation_messages(errors: &ValidationErrors) -> Vec<String> {
    let mut messages: Vec<String> = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, errors)| {
            errors.iter().map(move |error| {
                let message = error
                    .message
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_else(|| error.code.to_string());
                format!("{field}: {message}")
            })
        })
        .collect();
    messages.sort();
    messages
}

/// Reject requests whose JSON body does not deserialize into `T` or fails
/// `T`'s validation rules. The buffered body is handed on unchanged.
pub fn validate_body<T>() -> Middleware
where
    T: DeserializeOwned + Validate + Send + 'static,
{
    Middleware::from_fn(
        format!("validate_body<{}>", std::any::type_name::<T>()),
        |req: Request, next: Next| async move {
            let (parts, body) = req.into_parts();
            let bytes = match axum::body::to_bytes(body, MAX_VALIDATED_BODY).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    return AppError::BadRequest(format!("Unreadable request body: {e}"))
                        .into_response();
                }
            };
            let value: T = match serde_json::from_slice(&bytes) {
                Ok(value) => value,
                Err(e) => {
                    return AppError::BadRequest(format!("Invalid JSON body: {e}")).into_response();
                }
            };
            if let Err(errors) = value.validate() {
                return AppError::Validation(validation_messages(&errors)).into_response();
            }
            next.run(Request::from_parts(parts, Body::from(bytes))).await
        },
    )
}

/// Reject requests whose query string does not deserialize into `T` or
/// fails `T`'s validation rules.
pub fn validate_query<T>() -> Middleware
where
    T: DeserializeOwned + Validate + Send + 'static,
{
    Middleware::from_fn(
        format!("validate_query<{}>", std::any::type_name::<T>()),
        |req: Request, next: Next| async move {
            let query = match Query::<T>::try_from_uri(req.uri()) {
                Ok(Query(query)) => query,
                Err(e) => {
                    return AppError::BadRequest(format!("Invalid query string: {e}"))
                        .into_response();
                }
            };
            if let Err(errors) = query.validate() {
                return AppError::Validation(validation_messages(&errors)).into_response();
            }
            next.run(req).await
        },
    )
}

//! KeelApp builder: mounts controllers and serves them with generated OpenAPI docs.

use std::sync::Arc;

use axum::{
    Router, ServiceExt,
    extract::Request,
    http::header,
    routing::get,
};
use tokio::net::TcpListener;
use tower::Layer;
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, limit::RequestBodyLimitLayer,
    normalize_path::NormalizePathLayer,
};
use tracing::{info, warn};
#[cfg(feature = "scalar")]
use utoipa_scalar::{Scalar, Servable};

use crate::binder::{self, RouteTable, normalize_path};
use crate::config::AppConfig;
use crate::declare::{ControllerDecl, JSON_CONTENT_TYPE};
use crate::docs::{DocumentGenerator, join_paths};
use crate::error::{AppError, DeclarationError};
use crate::health::HealthController;
use crate::metadata::{MetadataStore, TypeKey};
use crate::middleware::{request_context_middleware_fn, request_logging_middleware};
use crate::openapi::OpenApi;
use crate::traits::{Controller, RouteSource};
use crate::users::UserStore;
use crate::Result;

/// Builder for keel applications.
///
/// Each `mount` runs the controller's declarations, binds its routes and
/// registers it with the documentation generator. Problems are collected and
/// reported together by `build`, which refuses to produce a router while any
/// declaration is malformed.
///
/// # Example
/// ```ignore
/// use keel_axum::prelude::*;
///
/// KeelApp::new(config)
///     .request_context()
///     .request_logging()
///     .health_checks(store.clone())
///     .mount(UsersController::new(store))
///     .serve("0.0.0.0:3000")
///     .await?;
/// ```
pub struct KeelApp {
    config: AppConfig,
    store: MetadataStore,
    generator: DocumentGenerator,
    api: Option<Router>,
    root: Router,
    errors: Vec<DeclarationError>,
    /// Externally visible routes of every mounted controller.
    bound: RouteTable,
    compression: bool,
    body_limit: Option<usize>,
    cors: Option<CorsLayer>,
    request_context: bool,
    request_logging: bool,
}

/// A built application: its router and the document describing it.
pub struct App {
    pub router: Router,
    pub openapi: Arc<OpenApi>,
}

impl KeelApp {
    pub fn new(config: AppConfig) -> Self {
        let generator = DocumentGenerator::new(config.document());
        Self {
            config,
            store: MetadataStore::new(),
            generator,
            api: None,
            root: Router::new(),
            errors: Vec::new(),
            bound: RouteTable::new(),
            compression: false,
            body_limit: None,
            cors: None,
            request_context: false,
            request_logging: false,
        }
    }

    /// Metadata recorded so far.
    pub fn metadata(&self) -> &MetadataStore {
        &self.store
    }

    /// Mount a controller.
    ///
    /// This automatically:
    /// 1. Records the controller's declarations in the metadata store
    /// 2. Binds its declared routes under its base path
    /// 3. Registers it with the OpenAPI generator
    pub fn mount<C: Controller>(mut self, controller: C) -> Self {
        let owner = TypeKey::of::<C>();
        C::declare(&mut ControllerDecl::new(&mut self.store, owner));

        let base_path = match normalize_path(C::base_path()) {
            Ok(path) => path,
            Err(reason) => {
                self.errors.push(DeclarationError::InvalidPath {
                    member: owner.short_name().to_string(),
                    path: C::base_path().to_string(),
                    reason,
                });
                return self;
            }
        };

        let bound = match binder::bind(Arc::new(controller), &self.store) {
            Ok(bound) => bound,
            Err(errors) => {
                self.errors.extend(errors);
                return self;
            }
        };

        let tags = self.store.tags(owner).join(", ");
        let mut conflicts = Vec::new();
        for route in bound.docs.recorded() {
            let path = self.generator.external_path(&bound.docs, &route.path);
            if let Err(e) = self.bound.claim(route.verb, &path, route.key.to_string()) {
                conflicts.push(e);
                continue;
            }
            info!("📍 {} {} [{}]", route.verb, path, tags);
        }
        if !conflicts.is_empty() {
            self.errors.extend(conflicts);
            return self;
        }

        let router = if base_path == "/" {
            bound.router
        } else {
            Router::new().nest(&base_path, bound.router)
        };
        if C::use_global_prefix() {
            self.api = Some(match self.api.take() {
                Some(api) => api.merge(router),
                None => router,
            });
        } else {
            self.root = self.root.merge(router);
        }
        self.generator.register(bound.docs);
        self
    }

    /// Add routes to the document that are served by something else.
    pub fn source(mut self, source: impl RouteSource + 'static) -> Self {
        self.generator.register(source);
        self
    }

    /// Add health check endpoints for Kubernetes probes.
    ///
    /// Adds three endpoints, outside the global prefix:
    /// - `/health` - Basic health check (always returns 200 OK)
    /// - `/health/ready` - Readiness probe (pings the store)
    /// - `/health/live` - Liveness probe (always returns 200 OK)
    pub fn health_checks(self, store: Arc<dyn UserStore>) -> Self {
        self.mount(HealthController::new(store))
    }

    /// Enable response compression using gzip, deflate, and brotli.
    ///
    /// Automatically compresses responses based on Accept-Encoding header.
    pub fn compression(mut self) -> Self {
        self.compression = true;
        self
    }

    /// Reject request bodies larger than `bytes` with 413.
    pub fn body_limit(mut self, bytes: usize) -> Self {
        self.body_limit = Some(bytes);
        self
    }

    pub fn cors(mut self, layer: CorsLayer) -> Self {
        self.cors = Some(layer);
        self
    }

    /// Enable structured request logging through tower-http's `TraceLayer`.
    ///
    /// Logs HTTP method, path, status code, and latency inside the request span
    /// when `.request_context()` is enabled too.
    pub fn request_logging(mut self) -> Self {
        self.request_logging = true;
        self
    }

    /// Enable request context propagation (correlation ID, language).
    ///
    /// Extracts request metadata from headers and makes it available to handlers
    /// via `Extension<RequestContext>`.
    ///
    /// # Example
    /// ```ignore
    /// use keel_axum::middleware::RequestContext;
    ///
    /// async fn handler(Extension(ctx): Extension<RequestContext>) -> String {
    ///     info!("Handling request {}", ctx.correlation_id);
    ///     ctx.language
    /// }
    /// ```
    pub fn request_context(mut self) -> Self {
        self.request_context = true;
        self
    }

    /// Generate the document and assemble the final router.
    ///
    /// Fails with every malformed declaration found while mounting, or when
    /// the document cannot be generated.
    pub fn build(self) -> Result<App> {
        if !self.errors.is_empty() {
            return Err(AppError::Declaration(self.errors));
        }

        let openapi = self.generator.generate(&self.store)?;
        info!("📚 API: {} v{}", openapi.info.title, openapi.info.version);
        for (path, verb, _) in openapi.operations() {
            tracing::debug!("   {} {}", verb.to_uppercase(), path);
        }

        let mut router = self.root;
        if let Some(api) = self.api {
            let prefix = join_paths(&[&self.config.api.prefix]);
            router = if prefix == "/" {
                router.merge(api)
            } else {
                router.nest(&prefix, api)
            };
        }

        let spec = serde_json::to_value(&openapi)
            .map_err(|e| AppError::Internal(format!("failed to serialize OpenAPI document: {e}")))?;
        let docs = &self.config.docs;

        #[cfg(not(feature = "swagger-ui"))]
        {
            let body = spec.to_string();
            router = router.route(
                &docs.json_path,
                get(move || {
                    let body = body.clone();
                    async move { ([(header::CONTENT_TYPE, JSON_CONTENT_TYPE)], body) }
                }),
            );
        }
        // Swagger UI serves the JSON document itself.
        #[cfg(feature = "swagger-ui")]
        {
            use utoipa_swagger_ui::SwaggerUi;
            router = router.merge(
                SwaggerUi::new("/swagger").external_url_unchecked(docs.json_path.clone(), spec.clone()),
            );
        }
        #[cfg(feature = "scalar")]
        {
            router = router.merge(Scalar::with_url(docs.ui_path.clone(), spec));
        }

        if let Some(bytes) = self.body_limit {
            router = router.layer(RequestBodyLimitLayer::new(bytes));
        }
        if self.compression {
            router = router.layer(CompressionLayer::new());
        }
        if self.request_logging {
            router = router.layer(request_logging_middleware());
        }
        if let Some(cors) = self.cors {
            router = router.layer(cors);
        }
        if self.request_context {
            router = router.layer(axum::middleware::from_fn(request_context_middleware_fn));
        }

        Ok(App {
            router,
            openapi: Arc::new(openapi),
        })
    }

    /// Build and serve until Ctrl-C or SIGTERM.
    pub async fn serve(self, addr: &str) -> Result<()> {
        let json_path = self.config.docs.json_path.clone();
        let ui_path = self.config.docs.ui_path.clone();
        let App { router, .. } = self.build()?;

        let listener = TcpListener::bind(addr).await?;
        info!("🚀 Server listening on http://{}", addr);

        info!("📚 Available endpoints:");
        info!("   - OpenAPI: http://{}{}", addr, json_path);
        #[cfg(feature = "scalar")]
        info!("   - Scalar: http://{}{}", addr, ui_path);
        #[cfg(not(feature = "scalar"))]
        let _ = ui_path;
        #[cfg(feature = "swagger-ui")]
        info!("   - Swagger UI: http://{}/swagger", addr);

        // Trailing slashes are trimmed before routing, so it wraps the router.
        let service = NormalizePathLayer::trim_trailing_slash().layer(router);
        axum::serve(listener, ServiceExt::<Request>::into_make_service(service))
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("👋 Server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}

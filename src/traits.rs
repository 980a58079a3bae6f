//! Common traits for the keel-axum controller framework.

use std::sync::Arc;

use crate::binder::RouteHandler;
use crate::declare::ControllerDecl;
use crate::docs::RecordedRoute;
use crate::Result;

/// A group of handlers mounted under one base path.
///
/// `declare` runs once per process, before the controller is bound, and
/// records the controller's routes and documentation in the metadata store.
/// `handlers` hands out the controller's methods bound to the instance; the
/// route binder matches them to the declared routes by member name.
pub trait Controller: Send + Sync + Sized + 'static {
    /// Returns the URL prefix for this controller.
    fn base_path() -> &'static str {
        ""
    }

    /// Whether the application's global prefix (e.g. `/api`) applies.
    fn use_global_prefix() -> bool {
        true
    }

    fn declare(api: &mut ControllerDecl<'_>);

    fn handlers(self: Arc<Self>) -> Vec<RouteHandler>;
}

/// Something that can report routes to the documentation generator.
pub trait RouteSource: Send + Sync {
    /// Name used in diagnostics.
    fn name(&self) -> &str;

    fn base_path(&self) -> &str;

    fn use_global_prefix(&self) -> bool {
        true
    }

    fn routes(&self) -> Result<Vec<RecordedRoute>>;
}

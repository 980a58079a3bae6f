//! Route binder: wires a controller's declared routes into an axum router.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use axum::Router;
use axum::handler::Handler;
use axum::routing::{MethodFilter, MethodRouter};
use tracing::{debug, error};

use crate::docs::{ControllerDocs, RecordedRoute};
use crate::error::DeclarationError;
use crate::metadata::{MemberKey, MetadataStore, TypeKey};
use crate::traits::Controller;

/// HTTP verbs a route can be declared with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HttpVerb {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpVerb {
    /// Lower-case name, as used for OpenAPI path item keys.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Post => "post",
            Self::Put => "put",
            Self::Patch => "patch",
            Self::Delete => "delete",
        }
    }

    fn filter(self) -> MethodFilter {
        match self {
            Self::Get => MethodFilter::GET,
            Self::Post => MethodFilter::POST,
            Self::Put => MethodFilter::PUT,
            Self::Patch => MethodFilter::PATCH,
            Self::Delete => MethodFilter::DELETE,
        }
    }
}

impl fmt::Display for HttpVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str().to_uppercase())
    }
}

impl FromStr for HttpVerb {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "get" => Ok(Self::Get),
            "post" => Ok(Self::Post),
            "put" => Ok(Self::Put),
            "patch" => Ok(Self::Patch),
            "delete" => Ok(Self::Delete),
            _ => Err(()),
        }
    }
}

/// A controller method bound to its instance, ready to be routed.
pub struct RouteHandler {
    member: &'static str,
    bind: Box<dyn FnOnce(MethodFilter) -> MethodRouter + Send>,
}

impl RouteHandler {
    pub fn new<H, T>(member: &'static str, handler: H) -> Self
    where
        H: Handler<T, ()>,
        T: 'static,
    {
        Self {
            member,
            bind: Box::new(move |filter| axum::routing::on(filter, handler)),
        }
    }

    pub fn member(&self) -> &'static str {
        self.member
    }
}

impl fmt::Debug for RouteHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteHandler")
            .field("member", &self.member)
            .finish_non_exhaustive()
    }
}

/// Router and route record of one controller.
#[derive(Debug)]
pub struct BoundController {
    pub router: Router,
    pub docs: ControllerDocs,
}

/// Normalize a declared `:param` style path. The empty path is the
/// controller root.
pub fn normalize_path(path: &str) -> Result<String, &'static str> {
    let path = path.trim();
    if path.is_empty() || path == "/" {
        return Ok("/".to_string());
    }
    if !path.starts_with('/') {
        return Err("path must start with `/`");
    }
    let trimmed = path.trim_end_matches('/');
    for segment in trimmed.split('/').skip(1) {
        if segment.is_empty() {
            return Err("path contains an empty segment");
        }
        if segment.contains(['{', '}', '*']) {
            return Err("use `:name` for path parameters");
        }
        if let Some(name) = segment.strip_prefix(':') {
            if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err("path parameter names must be alphanumeric");
            }
        }
    }
    Ok(trimmed.to_string())
}

/// Convert `:name` segments to `{name}`.
pub fn brace_path(path: &str) -> String {
    path.split('/')
        .map(|segment| match segment.strip_prefix(':') {
            Some(name) => format!("{{{name}}}"),
            None => segment.to_string(),
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn param_name(segment: &str) -> Option<&str> {
    segment
        .strip_prefix(':')
        .or_else(|| segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')))
}

/// Routes claimed so far, compared by shape: parameter names are erased, so
/// `/:id` and `/:postId` are the same route.
///
/// axum also refuses two parameters with different names at the same
/// position, whatever their verbs, so those are reported as conflicts.
/// Accepts both `:name` and `{name}` paths.
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: HashMap<(HttpVerb, String), String>,
    /// Shape prefix ending in a parameter -> (parameter name, path, member).
    params: HashMap<String, (String, String, String)>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `verb path` for `member`. Nothing is recorded when the claim
    /// fails.
    pub fn claim(&mut self, verb: HttpVerb, path: &str, member: String) -> Result<(), DeclarationError> {
        let segments: Vec<&str> = path.split('/').collect();
        let shape = segments
            .iter()
            .map(|&segment| if param_name(segment).is_some() { ":" } else { segment })
            .collect::<Vec<_>>()
            .join("/");

        if let Some(existing) = self.routes.get(&(verb, shape.clone())) {
            return Err(DeclarationError::DuplicateRoute {
                member,
                verb: verb.to_string(),
                path: path.to_string(),
                existing: existing.clone(),
            });
        }

        let mut params = Vec::new();
        for (i, segment) in segments.iter().enumerate() {
            let Some(name) = param_name(segment) else {
                continue;
            };
            let prefix = shape.split('/').take(i + 1).collect::<Vec<_>>().join("/");
            if let Some((existing_name, existing_path, existing)) = self.params.get(&prefix) {
                if existing_name != name {
                    return Err(DeclarationError::ConflictingRoute {
                        member,
                        path: path.to_string(),
                        existing: existing.clone(),
                        existing_path: existing_path.clone(),
                    });
                }
                continue;
            }
            params.push((prefix, name.to_string()));
        }

        for (prefix, name) in params {
            self.params.insert(prefix, (name, path.to_string(), member.clone()));
        }
        self.routes.insert((verb, shape), member);
        Ok(())
    }
}

/// Register every declared route of `controller` on a fresh router.
///
/// Handlers without a route declaration are not routes and are skipped.
/// Every malformed declaration is reported; nothing is bound when any is
/// found.
pub fn bind<C: Controller>(
    controller: Arc<C>,
    store: &MetadataStore,
) -> Result<BoundController, Vec<DeclarationError>> {
    let owner = TypeKey::of::<C>();
    let mut router = Router::new();
    let mut docs = ControllerDocs::new(owner, C::base_path(), C::use_global_prefix());
    let mut errors = Vec::new();
    let mut table = RouteTable::new();
    let mut members = HashSet::new();

    for handler in controller.handlers() {
        let key = MemberKey::new(owner, handler.member());
        let Some(fact) = store.route(&key) else {
            debug!(member = %key, "handler has no route declaration, skipping");
            continue;
        };
        members.insert(handler.member());

        let Ok(verb) = fact.verb.parse::<HttpVerb>() else {
            errors.push(DeclarationError::UnknownVerb {
                member: key.to_string(),
                verb: fact.verb.clone(),
            });
            continue;
        };
        let path = match normalize_path(&fact.path) {
            Ok(path) => path,
            Err(reason) => {
                errors.push(DeclarationError::InvalidPath {
                    member: key.to_string(),
                    path: fact.path.clone(),
                    reason,
                });
                continue;
            }
        };
        if let Err(e) = table.claim(verb, &path, key.to_string()) {
            errors.push(e);
            continue;
        }

        let mut method_router = (handler.bind)(verb.filter());
        for middleware in fact.middleware.iter().rev() {
            method_router = middleware.wrap(method_router);
        }
        router = router.route(&brace_path(&path), method_router);

        debug!(member = %key, %verb, %path, chain = fact.middleware.len(), "route bound");
        docs.record(RecordedRoute { key, verb, path });
    }

    for fact in store.routes_of(owner) {
        if !members.contains(fact.key.member) {
            errors.push(DeclarationError::MissingHandler {
                member: fact.key.to_string(),
            });
        }
    }

    if errors.is_empty() {
        Ok(BoundController { router, docs })
    } else {
        for e in &errors {
            error!(controller = owner.short_name(), "{e}");
        }
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::declare::ControllerDecl;
    use crate::middleware::Middleware;
    use crate::traits::RouteSource;
    use axum::extract::{Path, Request};
    use axum::middleware::Next;
    use axum_test::TestServer;
    use std::sync::Mutex;

    fn declare<C: Controller>(store: &mut MetadataStore) {
        C::declare(&mut ControllerDecl::new(store, TypeKey::of::<C>()));
    }

    struct Items;

    impl Controller for Items {
        fn base_path() -> &'static str {
            "/items"
        }

        fn declare(api: &mut ControllerDecl<'_>) {
            api.method("list").get("");
            api.method("find_one").get("/:id");
            api.method("create").post("/");
        }

        fn handlers(self: Arc<Self>) -> Vec<RouteHandler> {
            vec![
                RouteHandler::new("list", || async { "list" }),
                RouteHandler::new("find_one", |Path(id): Path<u32>| async move {
                    format!("item {id}")
                }),
                RouteHandler::new("create", || async { "created" }),
                RouteHandler::new("helper", || async { "not routed" }),
            ]
        }
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("").unwrap(), "/");
        assert_eq!(normalize_path("/").unwrap(), "/");
        assert_eq!(normalize_path("/:id/").unwrap(), "/:id");
        assert!(normalize_path("users").is_err());
        assert!(normalize_path("/a//b").is_err());
        assert!(normalize_path("/{id}").is_err());
        assert!(normalize_path("/:").is_err());
    }

    #[test]
    fn test_brace_path() {
        assert_eq!(brace_path("/users/:id/posts/:postId"), "/users/{id}/posts/{postId}");
        assert_eq!(brace_path("/"), "/");
    }

    #[test]
    fn test_verb_parsing_is_case_insensitive() {
        assert_eq!("GET".parse::<HttpVerb>(), Ok(HttpVerb::Get));
        assert_eq!("Patch".parse::<HttpVerb>(), Ok(HttpVerb::Patch));
        assert!("fetch".parse::<HttpVerb>().is_err());
        assert_eq!(HttpVerb::Delete.as_str(), "delete");
    }

    #[tokio::test]
    async fn test_bind_registers_declared_routes() {
        let mut store = MetadataStore::new();
        declare::<Items>(&mut store);

        let bound = bind(Arc::new(Items), &store).unwrap();
        let routes = bound.docs.routes().unwrap();
        assert_eq!(routes.len(), 3);
        assert_eq!(routes[1].path, "/:id");
        assert_eq!(routes[1].verb, HttpVerb::Get);

        let server = TestServer::new(bound.router).unwrap();
        server.get("/").await.assert_text("list");
        server.get("/7").await.assert_text("item 7");
        server.post("/").await.assert_text("created");
    }

    struct Broken;

    impl Controller for Broken {
        fn declare(api: &mut ControllerDecl<'_>) {
            api.method("fetch").route("fetch", "/");
            api.method("relative").get("relative");
            api.method("first").get("/same");
            api.method("second").get("/same/");
            api.method("orphan").delete("/:id");
        }

        fn handlers(self: Arc<Self>) -> Vec<RouteHandler> {
            vec![
                RouteHandler::new("fetch", || async {}),
                RouteHandler::new("relative", || async {}),
                RouteHandler::new("first", || async {}),
                RouteHandler::new("second", || async {}),
            ]
        }
    }

    #[test]
    fn test_bind_reports_every_bad_declaration() {
        let mut store = MetadataStore::new();
        declare::<Broken>(&mut store);

        let errors = bind(Arc::new(Broken), &store).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(matches!(&errors[0], DeclarationError::UnknownVerb { verb, .. } if verb == "fetch"));
        assert!(matches!(&errors[1], DeclarationError::InvalidPath { path, .. } if path == "relative"));
        assert!(matches!(&errors[2], DeclarationError::DuplicateRoute { existing, .. } if existing == "Broken::first"));
        assert!(matches!(&errors[3], DeclarationError::MissingHandler { member } if member == "Broken::orphan"));
    }

    struct Posts;

    impl Controller for Posts {
        fn base_path() -> &'static str {
            "/posts"
        }

        fn declare(api: &mut ControllerDecl<'_>) {
            api.method("find_one").get("/:id");
            api.method("comments").get("/:id/comments");
            api.method("update").patch("/:postId");
            api.method("by_slug").get("/:slug");
            api.method("likes").get("/:postId/likes");
        }

        fn handlers(self: Arc<Self>) -> Vec<RouteHandler> {
            vec![
                RouteHandler::new("find_one", || async {}),
                RouteHandler::new("comments", || async {}),
                RouteHandler::new("update", || async {}),
                RouteHandler::new("by_slug", || async {}),
                RouteHandler::new("likes", || async {}),
            ]
        }
    }

    #[test]
    fn test_bind_reports_renamed_path_parameters() {
        let mut store = MetadataStore::new();
        declare::<Posts>(&mut store);

        let errors = bind(Arc::new(Posts), &store).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(matches!(
            &errors[0],
            DeclarationError::ConflictingRoute { member, existing_path, .. }
                if member == "Posts::update" && existing_path == "/:id"
        ));
        assert!(matches!(
            &errors[1],
            DeclarationError::DuplicateRoute { existing, .. } if existing == "Posts::find_one"
        ));
        assert!(matches!(
            &errors[2],
            DeclarationError::ConflictingRoute { member, .. } if member == "Posts::likes"
        ));
    }

    #[test]
    fn test_route_table_compares_shapes() {
        let mut table = RouteTable::new();
        table.claim(HttpVerb::Get, "/users/{id}", "a".into()).unwrap();
        table.claim(HttpVerb::Delete, "/users/{id}", "b".into()).unwrap();
        table.claim(HttpVerb::Get, "/users/{id}/posts", "c".into()).unwrap();
        table.claim(HttpVerb::Get, "/users/me", "d".into()).unwrap();

        assert!(matches!(
            table.claim(HttpVerb::Get, "/users/:userId", "e".into()),
            Err(DeclarationError::DuplicateRoute { existing, .. }) if existing == "a"
        ));
        assert!(matches!(
            table.claim(HttpVerb::Put, "/users/{userId}", "f".into()),
            Err(DeclarationError::ConflictingRoute { existing, .. }) if existing == "a"
        ));
        // failed claims leave nothing behind
        table.claim(HttpVerb::Put, "/users/{id}", "g".into()).unwrap();
    }

    struct Empty;

    impl Controller for Empty {
        fn declare(_api: &mut ControllerDecl<'_>) {}

        fn handlers(self: Arc<Self>) -> Vec<RouteHandler> {
            Vec::new()
        }
    }

    #[test]
    fn test_controller_without_routes_is_valid() {
        let store = MetadataStore::new();
        let bound = bind(Arc::new(Empty), &store).unwrap();
        assert!(bound.docs.routes().unwrap().is_empty());
    }

    static TRACE: Mutex<Vec<&'static str>> = Mutex::new(Vec::new());

    fn tracing_step(label: &'static str) -> Middleware {
        Middleware::from_fn(label, move |req: Request, next: Next| async move {
            TRACE.lock().unwrap().push(label);
            next.run(req).await
        })
    }

    struct Chained;

    impl Controller for Chained {
        fn declare(api: &mut ControllerDecl<'_>) {
            api.method("run")
                .route_with("get", "/", vec![tracing_step("first"), tracing_step("second")]);
        }

        fn handlers(self: Arc<Self>) -> Vec<RouteHandler> {
            vec![RouteHandler::new("run", || async {
                TRACE.lock().unwrap().push("handler");
            })]
        }
    }

    #[tokio::test]
    async fn test_middleware_chain_runs_in_declared_order() {
        let mut store = MetadataStore::new();
        declare::<Chained>(&mut store);

        let bound = bind(Arc::new(Chained), &store).unwrap();
        let server = TestServer::new(bound.router).unwrap();
        server.get("/").await.assert_status_ok();

        assert_eq!(*TRACE.lock().unwrap(), ["first", "second", "handler"]);
    }
}

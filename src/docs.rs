//! OpenAPI document generation from recorded routes and declared facts.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use tracing::{debug, warn};

use crate::binder::{HttpVerb, brace_path};
use crate::declare::JSON_CONTENT_TYPE;
use crate::error::GenerateError;
use crate::metadata::{InlineSchema, MemberKey, MetadataStore, ParameterFact, SchemaNode, TypeKey};
use crate::openapi::{
    Header, Info, MediaType, OpenApi, Operation, Parameter, ParameterLocation, RequestBody,
    Response, Schema, Server, Tag,
};
use crate::traits::RouteSource;
use crate::Result;

/// A route as bound by the route binder.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRoute {
    pub key: MemberKey,
    pub verb: HttpVerb,
    /// Normalized `:param` style path relative to the controller.
    pub path: String,
}

/// Routes recorded for one controller while it was bound.
#[derive(Debug, Clone)]
pub struct ControllerDocs {
    owner: TypeKey,
    base_path: String,
    use_global_prefix: bool,
    routes: Vec<RecordedRoute>,
}

impl ControllerDocs {
    pub fn new(owner: TypeKey, base_path: &str, use_global_prefix: bool) -> Self {
        Self {
            owner,
            base_path: base_path.to_string(),
            use_global_prefix,
            routes: Vec::new(),
        }
    }

    pub fn record(&mut self, route: RecordedRoute) {
        self.routes.push(route);
    }

    pub fn recorded(&self) -> &[RecordedRoute] {
        &self.routes
    }
}

impl RouteSource for ControllerDocs {
    fn name(&self) -> &str {
        self.owner.short_name()
    }

    fn base_path(&self) -> &str {
        &self.base_path
    }

    fn use_global_prefix(&self) -> bool {
        self.use_global_prefix
    }

    fn routes(&self) -> Result<Vec<RecordedRoute>> {
        Ok(self.routes.clone())
    }
}

/// Document-level settings.
#[derive(Debug, Clone)]
pub struct DocumentConfig {
    pub info: Info,
    pub servers: Vec<Server>,
    /// Prefix applied before every controller mount path, e.g. `/api`.
    pub global_prefix: String,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            info: Info {
                title: "API".to_string(),
                version: "1.0.0".to_string(),
                description: None,
            },
            servers: Vec::new(),
            global_prefix: String::new(),
        }
    }
}

/// Join path pieces, ignoring empty and root pieces. Always starts with `/`.
pub fn join_paths(pieces: &[&str]) -> String {
    let joined: String = pieces
        .iter()
        .map(|piece| piece.trim_matches('/'))
        .filter(|piece| !piece.is_empty())
        .map(|piece| format!("/{piece}"))
        .collect();
    if joined.is_empty() { "/".to_string() } else { joined }
}

/// Merges every registered route source into one OpenAPI document.
pub struct DocumentGenerator {
    config: DocumentConfig,
    sources: Vec<Box<dyn RouteSource>>,
}

impl DocumentGenerator {
    pub fn new(config: DocumentConfig) -> Self {
        Self {
            config,
            sources: Vec::new(),
        }
    }

    pub fn register(&mut self, source: impl RouteSource + 'static) {
        self.sources.push(Box::new(source));
    }

    /// Externally visible path of a route: global prefix, mount path, then
    /// the route path unless it is the controller root.
    pub fn external_path(&self, source: &dyn RouteSource, route_path: &str) -> String {
        let prefix = if source.use_global_prefix() {
            self.config.global_prefix.as_str()
        } else {
            ""
        };
        brace_path(&join_paths(&[prefix, source.base_path(), route_path]))
    }

    /// Build the document. Reads the store only; calling it twice without new
    /// declarations yields the same document.
    pub fn generate(&self, store: &MetadataStore) -> std::result::Result<OpenApi, GenerateError> {
        let mut doc = OpenApi::new(self.config.info.clone());
        doc.servers = self.config.servers.clone();

        let mut refs = SchemaRefs::default();
        let mut tags: Vec<String> = Vec::new();

        for source in &self.sources {
            let routes = match source.routes() {
                Ok(routes) => routes,
                Err(e) => {
                    warn!(source = source.name(), error = %e, "skipping route source");
                    continue;
                }
            };

            for route in routes {
                let path = self.external_path(source.as_ref(), &route.path);
                let operation = build_operation(store, &route, &mut refs);
                for tag in &operation.tags {
                    if !tags.contains(tag) {
                        tags.push(tag.clone());
                    }
                }

                let item = doc.paths.entry(path.clone()).or_default();
                let Some(slot) = item.slot_mut(route.verb.as_str()) else {
                    continue;
                };
                if slot.is_some() {
                    warn!(
                        %path,
                        verb = %route.verb,
                        member = %route.key,
                        "operation already documented, keeping the first"
                    );
                } else {
                    *slot = Some(operation);
                }
            }
        }

        doc.tags = tags
            .into_iter()
            .map(|name| Tag {
                name,
                description: None,
            })
            .collect();
        doc.components.schemas = build_components(store, refs)?;

        debug!(
            paths = doc.paths.len(),
            schemas = doc.components.schemas.len(),
            "OpenAPI document generated"
        );
        Ok(doc)
    }
}

/// DTO identities referenced so far, in first-seen order.
#[derive(Default)]
struct SchemaRefs {
    seen: HashSet<TypeKey>,
    queue: VecDeque<TypeKey>,
}

impl SchemaRefs {
    fn note(&mut self, key: TypeKey) {
        if self.seen.insert(key) {
            self.queue.push_back(key);
        }
    }
}

/// Convert a declared schema, replacing DTO identities with `$ref`s.
fn to_schema(node: &SchemaNode, store: &MetadataStore, refs: &mut SchemaRefs) -> Schema {
    match node {
        SchemaNode::Dto(key) => {
            refs.note(*key);
            Schema::reference(store.schema_name(*key))
        }
        SchemaNode::Inline(inline) => inline_schema(inline, store, refs),
    }
}

fn inline_schema(inline: &InlineSchema, store: &MetadataStore, refs: &mut SchemaRefs) -> Schema {
    let properties = (!inline.properties.is_empty()).then(|| {
        inline
            .properties
            .iter()
            .map(|(name, node)| (name.clone(), to_schema(node, store, refs)))
            .collect()
    });
    Schema {
        ref_path: None,
        schema_type: inline.schema_type,
        format: inline.format.clone(),
        description: inline.description.clone(),
        example: inline.example.clone(),
        enum_values: inline.enum_values.clone(),
        minimum: inline.minimum,
        maximum: inline.maximum,
        min_length: inline.min_length,
        max_length: inline.max_length,
        pattern: inline.pattern.clone(),
        nullable: inline.nullable.then_some(true),
        items: inline
            .items
            .as_ref()
            .map(|items| Box::new(to_schema(items, store, refs))),
        properties,
        required: inline.required.clone(),
    }
}

fn parameter(fact: &ParameterFact, store: &MetadataStore, refs: &mut SchemaRefs) -> Parameter {
    Parameter {
        name: fact.name.clone(),
        location: fact.location,
        required: fact.required,
        description: fact.description.clone(),
        schema: to_schema(&fact.schema, store, refs),
        example: fact.example.clone(),
    }
}

fn default_responses() -> BTreeMap<String, Response> {
    let content = BTreeMap::from([(
        JSON_CONTENT_TYPE.to_string(),
        MediaType {
            schema: Schema::object(),
        },
    )]);
    BTreeMap::from([(
        "200".to_string(),
        Response {
            description: "Successful response".to_string(),
            headers: BTreeMap::new(),
            content,
        },
    )])
}

fn build_operation(store: &MetadataStore, route: &RecordedRoute, refs: &mut SchemaRefs) -> Operation {
    let key = &route.key;
    let fact = store.operation(key).cloned().unwrap_or_default();

    let mut tags: Vec<String> = Vec::new();
    for tag in store.tags(key.owner).iter().chain(&fact.tags) {
        if !tags.contains(tag) {
            tags.push(tag.clone());
        }
    }

    let params = store.parameters(key);
    let parameters = params
        .iter()
        .filter(|p| p.location == ParameterLocation::Path)
        .chain(params.iter().filter(|p| p.location == ParameterLocation::Query))
        .map(|p| parameter(p, store, refs))
        .collect();

    let request_body = store.request_body(key).map(|body| RequestBody {
        description: body.description.clone(),
        required: body.required,
        content: body
            .content
            .iter()
            .map(|(content_type, node)| {
                (
                    content_type.clone(),
                    MediaType {
                        schema: to_schema(node, store, refs),
                    },
                )
            })
            .collect(),
    });

    let responses = match store.responses(key) {
        Some(declared) if !declared.is_empty() => declared
            .iter()
            .map(|(status, response)| {
                let content = response
                    .content
                    .as_ref()
                    .map(|node| {
                        BTreeMap::from([(
                            response.content_type.clone(),
                            MediaType {
                                schema: to_schema(node, store, refs),
                            },
                        )])
                    })
                    .unwrap_or_default();
                let headers = response
                    .headers
                    .iter()
                    .map(|header| {
                        (
                            header.name.clone(),
                            Header {
                                description: header.description.clone(),
                                schema: to_schema(&header.schema, store, refs),
                            },
                        )
                    })
                    .collect();
                (
                    status.to_string(),
                    Response {
                        description: response.description.clone(),
                        headers,
                        content,
                    },
                )
            })
            .collect(),
        _ => default_responses(),
    };

    Operation {
        tags,
        summary: fact.summary.or_else(|| Some(key.member.to_string())),
        description: fact.description,
        operation_id: Some(
            fact.operation_id
                .unwrap_or_else(|| format!("{}_{}", key.owner.short_name(), key.member)),
        ),
        parameters,
        request_body,
        responses,
        deprecated: fact.deprecated.then_some(true),
    }
}

/// Emit one component per referenced DTO, following references between DTOs.
fn build_components(
    store: &MetadataStore,
    mut refs: SchemaRefs,
) -> std::result::Result<BTreeMap<String, Schema>, GenerateError> {
    let mut schemas = BTreeMap::new();
    let mut owners: HashMap<String, TypeKey> = HashMap::new();

    while let Some(key) = refs.queue.pop_front() {
        let name = store.schema_name(key).to_string();
        if let Some(first) = owners.insert(name.clone(), key) {
            return Err(GenerateError::SchemaNameCollision {
                name,
                first: first.type_name(),
                second: key.type_name(),
            });
        }

        let properties = store.properties(key);
        if properties.is_empty() {
            warn!(schema = %name, "schema has no declared properties, its references will dangle");
            continue;
        }

        let mut schema = Schema::object();
        schema.properties = Some(
            properties
                .iter()
                .map(|(field, fact)| (field.clone(), to_schema(&fact.schema, store, &mut refs)))
                .collect(),
        );
        schema.required = properties
            .iter()
            .filter(|(_, fact)| fact.required)
            .map(|(field, _)| field.clone())
            .collect();
        schemas.insert(name, schema);
    }

    Ok(schemas)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::declare::{ApiOperation, ApiParam, ApiProperty, ApiResponse, ApiSchema, ControllerDecl, SchemaDecl};
    use crate::error::AppError;
    use crate::metadata::MemberKey;
    use serde_json::json;

    struct Users;
    struct Orphans;

    struct Item;

    impl ApiSchema for Item {
        fn declare(schema: &mut SchemaDecl<'_>) {
            schema.property::<String>("id", ApiProperty::new());
        }
    }

    struct ItemList;

    impl ApiSchema for ItemList {
        fn declare(schema: &mut SchemaDecl<'_>) {
            schema.dto_array::<Item>("data", ApiProperty::new());
        }
    }

    struct Marker;

    impl ApiSchema for Marker {
        fn declare(_schema: &mut SchemaDecl<'_>) {}
    }

    mod other {
        use crate::declare::{ApiProperty, ApiSchema, SchemaDecl};

        pub struct Item;

        impl ApiSchema for Item {
            fn declare(schema: &mut SchemaDecl<'_>) {
                schema.property::<i64>("id", ApiProperty::new());
            }
        }
    }

    fn route(owner: TypeKey, member: &'static str, verb: HttpVerb, path: &str) -> RecordedRoute {
        RecordedRoute {
            key: MemberKey::new(owner, member),
            verb,
            path: path.to_string(),
        }
    }

    fn generator(sources: Vec<ControllerDocs>) -> DocumentGenerator {
        let mut generator = DocumentGenerator::new(DocumentConfig {
            global_prefix: "/api".to_string(),
            ..DocumentConfig::default()
        });
        for source in sources {
            generator.register(source);
        }
        generator
    }

    fn users_docs(routes: &[(&'static str, HttpVerb, &str)]) -> ControllerDocs {
        let owner = TypeKey::of::<Users>();
        let mut docs = ControllerDocs::new(owner, "/users", true);
        for (member, verb, path) in routes {
            docs.record(route(owner, member, *verb, path));
        }
        docs
    }

    #[test]
    fn test_join_paths() {
        assert_eq!(join_paths(&["/api", "/users", "/"]), "/api/users");
        assert_eq!(join_paths(&["", "", "/"]), "/");
        assert_eq!(join_paths(&["/api/", "users", "/:id"]), "/api/users/:id");
    }

    #[test]
    fn test_path_parameters_use_brace_syntax() {
        let store = MetadataStore::new();
        let doc = generator(vec![users_docs(&[
            ("find_all", HttpVerb::Get, "/"),
            ("find_one", HttpVerb::Get, "/:id"),
        ])])
        .generate(&store)
        .unwrap();

        let paths: Vec<_> = doc.paths.keys().map(String::as_str).collect();
        assert_eq!(paths, ["/api/users", "/api/users/{id}"]);
    }

    #[test]
    fn test_undeclared_responses_default_to_ok() {
        let store = MetadataStore::new();
        let doc = generator(vec![users_docs(&[("find_all", HttpVerb::Get, "/")])])
            .generate(&store)
            .unwrap();

        let operation = doc.paths["/api/users"].get.as_ref().unwrap();
        assert_eq!(operation.operation_id.as_deref(), Some("Users_find_all"));
        assert_eq!(
            serde_json::to_value(&operation.responses).unwrap(),
            json!({
                "200": {
                    "description": "Successful response",
                    "content": { "application/json": { "schema": { "type": "object" } } }
                }
            })
        );
    }

    #[test]
    fn test_path_parameters_precede_query_parameters() {
        let mut store = MetadataStore::new();
        ControllerDecl::new(&mut store, TypeKey::of::<Users>())
            .method("posts")
            .param(ApiParam::query("page"))
            .param(ApiParam::path("id"))
            .param(ApiParam::query("limit"));
        let doc = generator(vec![users_docs(&[("posts", HttpVerb::Get, "/:id/posts")])])
            .generate(&store)
            .unwrap();

        let params: Vec<_> = doc.paths["/api/users/{id}/posts"]
            .get
            .as_ref()
            .unwrap()
            .parameters
            .iter()
            .map(|p| (p.name.as_str(), p.location, p.required))
            .collect();
        assert_eq!(
            params,
            [
                ("id", ParameterLocation::Path, true),
                ("page", ParameterLocation::Query, false),
                ("limit", ParameterLocation::Query, false),
            ]
        );
    }

    #[test]
    fn test_array_response_references_component() {
        let mut store = MetadataStore::new();
        ControllerDecl::new(&mut store, TypeKey::of::<Users>())
            .method("find_all")
            .response(ApiResponse::ok("Items").body::<Item>().is_array(true));
        let doc = generator(vec![users_docs(&[("find_all", HttpVerb::Get, "")])])
            .generate(&store)
            .unwrap();

        let schema = &doc.paths["/api/users"].get.as_ref().unwrap().responses["200"].content
            ["application/json"]
            .schema;
        assert_eq!(
            serde_json::to_value(schema).unwrap(),
            json!({ "type": "array", "items": { "$ref": "#/components/schemas/Item" } })
        );
        assert!(doc.components.schemas.contains_key("Item"));
    }

    #[test]
    fn test_nested_dtos_are_emitted_transitively() {
        let mut store = MetadataStore::new();
        ControllerDecl::new(&mut store, TypeKey::of::<Users>())
            .method("find_all")
            .response(ApiResponse::ok("Items").body::<ItemList>());
        let doc = generator(vec![users_docs(&[("find_all", HttpVerb::Get, "")])])
            .generate(&store)
            .unwrap();

        let names: Vec<_> = doc.components.schemas.keys().map(String::as_str).collect();
        assert_eq!(names, ["Item", "ItemList"]);
        assert_eq!(
            serde_json::to_value(&doc.components.schemas["ItemList"]).unwrap(),
            json!({
                "type": "object",
                "properties": {
                    "data": { "type": "array", "items": { "$ref": "#/components/schemas/Item" } }
                },
                "required": ["data"]
            })
        );
    }

    #[test]
    fn test_schema_without_properties_leaves_dangling_reference() {
        let mut store = MetadataStore::new();
        ControllerDecl::new(&mut store, TypeKey::of::<Users>())
            .method("ping")
            .response(ApiResponse::ok("Marker").body::<Marker>());
        let doc = generator(vec![users_docs(&[("ping", HttpVerb::Get, "/ping")])])
            .generate(&store)
            .unwrap();

        assert!(doc.components.schemas.is_empty());
        let schema = &doc.paths["/api/users/ping"].get.as_ref().unwrap().responses["200"].content
            ["application/json"]
            .schema;
        assert_eq!(schema.ref_path.as_deref(), Some("#/components/schemas/Marker"));
    }

    #[test]
    fn test_schema_name_collision_fails() {
        let mut store = MetadataStore::new();
        ControllerDecl::new(&mut store, TypeKey::of::<Users>())
            .method("a")
            .response(ApiResponse::ok("a").body::<Item>());
        ControllerDecl::new(&mut store, TypeKey::of::<Users>())
            .method("b")
            .response(ApiResponse::ok("b").body::<other::Item>());
        let result = generator(vec![users_docs(&[
            ("a", HttpVerb::Get, "/a"),
            ("b", HttpVerb::Get, "/b"),
        ])])
        .generate(&store);

        assert!(matches!(
            result,
            Err(GenerateError::SchemaNameCollision { ref name, .. }) if name == "Item"
        ));
    }

    #[test]
    fn test_tags_are_collected_in_first_seen_order() {
        let mut store = MetadataStore::new();
        let mut api = ControllerDecl::new(&mut store, TypeKey::of::<Users>());
        api.tags(["Users"]);
        api.method("find_all")
            .operation(ApiOperation::new("List").tag("Admin").tag("Users"));
        let mut orphan_api = ControllerDecl::new(&mut store, TypeKey::of::<Orphans>());
        orphan_api.tags(["Orphans", "Admin"]);

        let owner = TypeKey::of::<Orphans>();
        let mut orphans = ControllerDocs::new(owner, "/orphans", true);
        orphans.record(route(owner, "list", HttpVerb::Get, ""));
        let doc = generator(vec![users_docs(&[("find_all", HttpVerb::Get, "")]), orphans])
            .generate(&store)
            .unwrap();

        let tags: Vec<_> = doc.tags.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(tags, ["Users", "Admin", "Orphans"]);
        assert_eq!(doc.paths["/api/users"].get.as_ref().unwrap().tags, ["Users", "Admin"]);
    }

    struct FailingSource;

    impl RouteSource for FailingSource {
        fn name(&self) -> &str {
            "failing"
        }

        fn base_path(&self) -> &str {
            "/broken"
        }

        fn routes(&self) -> Result<Vec<RecordedRoute>> {
            Err(AppError::Internal("route listing failed".into()))
        }
    }

    #[test]
    fn test_failing_source_does_not_abort_generation() {
        let store = MetadataStore::new();
        let mut generator = generator(Vec::new());
        generator.register(FailingSource);
        generator.register(users_docs(&[("find_all", HttpVerb::Get, "")]));

        let doc = generator.generate(&store).unwrap();
        assert_eq!(doc.paths.len(), 1);
        assert!(doc.paths.contains_key("/api/users"));
    }

    #[test]
    fn test_conflicting_operations_keep_the_first() {
        let mut store = MetadataStore::new();
        ControllerDecl::new(&mut store, TypeKey::of::<Users>())
            .method("first")
            .operation(ApiOperation::new("First"));
        let owner = TypeKey::of::<Orphans>();
        let mut orphans = ControllerDocs::new(owner, "/users", true);
        orphans.record(route(owner, "second", HttpVerb::Get, ""));
        let doc = generator(vec![users_docs(&[("first", HttpVerb::Get, "")]), orphans])
            .generate(&store)
            .unwrap();

        let operation = doc.paths["/api/users"].get.as_ref().unwrap();
        assert_eq!(operation.summary.as_deref(), Some("First"));
    }

    #[test]
    fn test_source_outside_global_prefix() {
        let store = MetadataStore::new();
        let owner = TypeKey::of::<Orphans>();
        let mut health = ControllerDocs::new(owner, "/health", false);
        health.record(route(owner, "live", HttpVerb::Get, "/live"));
        let doc = generator(vec![health]).generate(&store).unwrap();

        assert!(doc.paths.contains_key("/health/live"));
    }

    #[test]
    fn test_generation_is_idempotent() {
        let mut store = MetadataStore::new();
        ControllerDecl::new(&mut store, TypeKey::of::<Users>())
            .method("find_all")
            .param(ApiParam::query("page"))
            .response(ApiResponse::ok("Items").body::<ItemList>());
        let generator = generator(vec![users_docs(&[
            ("find_all", HttpVerb::Get, ""),
            ("find_one", HttpVerb::Get, "/:id"),
        ])]);

        let first = serde_json::to_string(&generator.generate(&store).unwrap()).unwrap();
        let second = serde_json::to_string(&generator.generate(&store).unwrap()).unwrap();
        assert_eq!(first, second);
    }
}

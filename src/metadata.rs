//! Process-scoped registry of declared API facts.
//!
//! Facts are keyed by type identity ([`TypeKey`]) for class-level facts (tags,
//! DTO properties) and by [`MemberKey`] for method-level facts (route,
//! operation, parameters, request body, responses). The store is written
//! while controllers and DTOs declare themselves at startup and is only read
//! afterwards.

use std::any::TypeId;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::{Hash, Hasher};

use serde_json::Value;
use tracing::{debug, warn};

use crate::declare::{ApiSchema, SchemaDecl};
use crate::middleware::Middleware;
use crate::openapi::{ParameterLocation, SchemaType};

/// Identity of a Rust type, plus its name for diagnostics and schema naming.
#[derive(Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// Fully qualified type name, e.g. `keel_axum::users::dto::UserResponseDto`.
    pub fn type_name(&self) -> &'static str {
        self.name
    }

    /// Last path segment without generic arguments, e.g. `UserResponseDto`.
    pub fn short_name(&self) -> &'static str {
        let base = self.name.split('<').next().unwrap_or(self.name);
        base.rsplit("::").next().unwrap_or(base)
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// A member (handler method) of a controller type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemberKey {
    pub owner: TypeKey,
    pub member: &'static str,
}

impl MemberKey {
    pub fn new(owner: TypeKey, member: &'static str) -> Self {
        Self { owner, member }
    }
}

impl fmt::Display for MemberKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.owner.short_name(), self.member)
    }
}

/// Schema tree as declared, before DTO identities are turned into names.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaNode {
    /// Reference to a registered DTO by identity.
    Dto(TypeKey),
    Inline(Box<InlineSchema>),
}

impl SchemaNode {
    pub fn inline(schema: InlineSchema) -> Self {
        Self::Inline(Box::new(schema))
    }

    /// Array whose items are `self`.
    pub fn into_array(self) -> Self {
        Self::inline(InlineSchema {
            items: Some(self),
            ..InlineSchema::typed(SchemaType::Array)
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InlineSchema {
    pub schema_type: Option<SchemaType>,
    pub format: Option<String>,
    pub description: Option<String>,
    pub example: Option<Value>,
    pub enum_values: Vec<Value>,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub pattern: Option<String>,
    pub nullable: bool,
    pub items: Option<SchemaNode>,
    pub properties: Vec<(String, SchemaNode)>,
    pub required: Vec<String>,
}

impl InlineSchema {
    pub fn typed(schema_type: SchemaType) -> Self {
        Self {
            schema_type: Some(schema_type),
            ..Self::default()
        }
    }

    pub fn formatted(schema_type: SchemaType, format: &str) -> Self {
        Self {
            format: Some(format.to_string()),
            ..Self::typed(schema_type)
        }
    }
}

/// Verb and path binding of one controller member.
#[derive(Debug, Clone)]
pub struct RouteFact {
    pub key: MemberKey,
    /// Verb as declared; parsed by the route binder.
    pub verb: String,
    /// Path template as declared, `:name` parameters.
    pub path: String,
    /// Runs ahead of the handler, first element outermost.
    pub middleware: Vec<Middleware>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OperationFact {
    pub summary: Option<String>,
    pub description: Option<String>,
    pub operation_id: Option<String>,
    pub tags: Vec<String>,
    pub deprecated: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParameterFact {
    pub name: String,
    pub location: ParameterLocation,
    pub required: bool,
    pub description: Option<String>,
    pub example: Option<Value>,
    pub schema: SchemaNode,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RequestBodyFact {
    /// Content type -> schema, in declaration order.
    pub content: Vec<(String, SchemaNode)>,
    pub required: bool,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HeaderFact {
    pub name: String,
    pub description: Option<String>,
    pub schema: SchemaNode,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResponseFact {
    pub description: String,
    pub content_type: String,
    pub content: Option<SchemaNode>,
    pub headers: Vec<HeaderFact>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PropertyFact {
    pub schema: SchemaNode,
    pub required: bool,
}

/// Keyed storage for every declared fact.
#[derive(Debug, Default)]
pub struct MetadataStore {
    routes: HashMap<MemberKey, RouteFact>,
    operations: HashMap<MemberKey, OperationFact>,
    parameters: HashMap<MemberKey, Vec<ParameterFact>>,
    request_bodies: HashMap<MemberKey, RequestBodyFact>,
    responses: HashMap<MemberKey, BTreeMap<u16, ResponseFact>>,
    properties: HashMap<TypeKey, Vec<(String, PropertyFact)>>,
    tags: HashMap<TypeKey, Vec<String>>,
    schemas: HashMap<TypeKey, String>,
}

impl MetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define_route(&mut self, fact: RouteFact) {
        if let Some(previous) = self.routes.get(&fact.key) {
            warn!(
                member = %fact.key,
                previous = %format!("{} {}", previous.verb, previous.path),
                "route redeclared, keeping the latest declaration"
            );
        }
        self.routes.insert(fact.key, fact);
    }

    pub fn define_operation(&mut self, key: MemberKey, fact: OperationFact) {
        self.operations.insert(key, fact);
    }

    /// Parameters accumulate in declaration order.
    pub fn push_parameter(&mut self, key: MemberKey, fact: ParameterFact) {
        self.parameters.entry(key).or_default().push(fact);
    }

    pub fn define_request_body(&mut self, key: MemberKey, fact: RequestBodyFact) {
        self.request_bodies.insert(key, fact);
    }

    pub fn define_response(&mut self, key: MemberKey, status: u16, fact: ResponseFact) {
        self.responses.entry(key).or_default().insert(status, fact);
    }

    /// Replaces a redeclared field in place, keeping its original position.
    pub fn define_property(&mut self, owner: TypeKey, field: &str, fact: PropertyFact) {
        let fields = self.properties.entry(owner).or_default();
        match fields.iter_mut().find(|(name, _)| name == field) {
            Some((_, existing)) => *existing = fact,
            None => fields.push((field.to_string(), fact)),
        }
    }

    pub fn define_tags(&mut self, owner: TypeKey, tags: Vec<String>) {
        self.tags.insert(owner, tags);
    }

    /// Register a DTO type, running its declarations the first time it is seen.
    pub fn register_schema<T: ApiSchema>(&mut self) -> TypeKey {
        let key = TypeKey::of::<T>();
        if self.schemas.contains_key(&key) {
            return key;
        }
        let name = T::schema_name();
        debug!(schema = %name, type_name = key.type_name(), "registering schema");
        // Marked before declaring so self-referencing DTOs terminate.
        self.schemas.insert(key, name);
        T::declare(&mut SchemaDecl::new(self, key));
        key
    }

    pub fn route(&self, key: &MemberKey) -> Option<&RouteFact> {
        self.routes.get(key)
    }

    /// Every route fact declared on `owner`, sorted by member name.
    pub fn routes_of(&self, owner: TypeKey) -> Vec<&RouteFact> {
        let mut routes: Vec<_> = self
            .routes
            .values()
            .filter(|fact| fact.key.owner == owner)
            .collect();
        routes.sort_by_key(|fact| fact.key.member);
        routes
    }

    pub fn operation(&self, key: &MemberKey) -> Option<&OperationFact> {
        self.operations.get(key)
    }

    pub fn parameters(&self, key: &MemberKey) -> &[ParameterFact] {
        self.parameters.get(key).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn request_body(&self, key: &MemberKey) -> Option<&RequestBodyFact> {
        self.request_bodies.get(key)
    }

    /// Responses by status code, ascending.
    pub fn responses(&self, key: &MemberKey) -> Option<&BTreeMap<u16, ResponseFact>> {
        self.responses.get(key)
    }

    pub fn properties(&self, owner: TypeKey) -> &[(String, PropertyFact)] {
        self.properties
            .get(&owner)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn tags(&self, owner: TypeKey) -> &[String] {
        self.tags.get(&owner).map(Vec::as_slice).unwrap_or_default()
    }

    /// Schema name of a registered DTO, falling back to its short type name.
    pub fn schema_name(&self, key: TypeKey) -> &str {
        self.schemas
            .get(&key)
            .map(String::as_str)
            .unwrap_or_else(|| key.short_name())
    }

    pub fn has_schema(&self, key: TypeKey) -> bool {
        self.schemas.contains_key(&key)
    }
}

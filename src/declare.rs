//! Declaration layer: option builders that normalize into metadata facts.
//!
//! Controllers describe their members inside [`Controller::declare`] and DTOs
//! describe their fields inside [`ApiSchema::declare`]. Every builder call
//! writes straight into the [`MetadataStore`], so declarations can be stacked
//! in any order on a member.
//!
//! ```ignore
//! impl Controller for UsersController {
//!     fn base_path() -> &'static str { "/users" }
//!
//!     fn declare(api: &mut ControllerDecl<'_>) {
//!         api.tags(["Users"]);
//!         api.method("find_one")
//!             .get("/:id")
//!             .operation(ApiOperation::new("Get a user"))
//!             .param(ApiParam::path("id").format("uuid"))
//!             .response(ApiResponse::ok("The user").body::<UserResponseDto>());
//!     }
//!     // ...
//! }
//! ```
//!
//! [`Controller::declare`]: crate::traits::Controller::declare

use std::collections::{BTreeMap, HashMap};

use serde_json::Value;
use tracing::warn;

use crate::metadata::{
    HeaderFact, InlineSchema, MemberKey, MetadataStore, OperationFact, ParameterFact,
    PropertyFact, RequestBodyFact, ResponseFact, RouteFact, SchemaNode, TypeKey,
};
use crate::middleware::Middleware;
use crate::openapi::{ParameterLocation, SchemaType};

pub const JSON_CONTENT_TYPE: &str = "application/json";

/// A DTO whose fields are documented as a component schema.
pub trait ApiSchema: 'static {
    /// Component schema name. Defaults to the bare type name.
    fn schema_name() -> String {
        TypeKey::of::<Self>().short_name().to_string()
    }

    fn declare(schema: &mut SchemaDecl<'_>);
}

/// Rust types whose schema can be inferred for a field or parameter.
pub trait ApiType {
    fn describe() -> InlineSchema;
}

macro_rules! api_type {
    ($schema_type:expr, $format:expr => $($ty:ty),+) => {
        $(
            impl ApiType for $ty {
                fn describe() -> InlineSchema {
                    match $format {
                        Some(format) => InlineSchema::formatted($schema_type, format),
                        None => InlineSchema::typed($schema_type),
                    }
                }
            }
        )+
    };
}

api_type!(SchemaType::String, None::<&str> => String, str, char);
api_type!(SchemaType::Boolean, None::<&str> => bool);
api_type!(SchemaType::Integer, Some("int32") => i8, i16, i32, u8, u16, u32);
api_type!(SchemaType::Integer, Some("int64") => i64, isize, u64, usize);
api_type!(SchemaType::Number, Some("float") => f32);
api_type!(SchemaType::Number, Some("double") => f64);
api_type!(SchemaType::String, Some("uuid") => uuid::Uuid);
api_type!(SchemaType::String, Some("date") => chrono::NaiveDate);
api_type!(SchemaType::String, Some("date-time") => chrono::NaiveDateTime);
api_type!(SchemaType::Object, None::<&str> => Value);

impl<Tz: chrono::TimeZone> ApiType for chrono::DateTime<Tz> {
    fn describe() -> InlineSchema {
        InlineSchema::formatted(SchemaType::String, "date-time")
    }
}

impl<T: ApiType + ?Sized> ApiType for &T {
    fn describe() -> InlineSchema {
        T::describe()
    }
}

impl<T: ApiType> ApiType for Vec<T> {
    fn describe() -> InlineSchema {
        InlineSchema {
            items: Some(SchemaNode::inline(T::describe())),
            ..InlineSchema::typed(SchemaType::Array)
        }
    }
}

impl<T: ApiType> ApiType for [T] {
    fn describe() -> InlineSchema {
        Vec::<T>::describe()
    }
}

impl<T: ApiType> ApiType for Option<T> {
    fn describe() -> InlineSchema {
        InlineSchema {
            nullable: true,
            ..T::describe()
        }
    }
}

impl<K, V> ApiType for HashMap<K, V> {
    fn describe() -> InlineSchema {
        InlineSchema::typed(SchemaType::Object)
    }
}

impl<K, V> ApiType for BTreeMap<K, V> {
    fn describe() -> InlineSchema {
        InlineSchema::typed(SchemaType::Object)
    }
}

impl InlineSchema {
    /// Lay explicitly declared options over an inferred schema.
    fn overlay(mut self, over: InlineSchema) -> Self {
        if over.schema_type.is_some() && over.schema_type != self.schema_type {
            // A different explicit type invalidates the inferred format and items.
            self.format = None;
            self.items = None;
            self.schema_type = over.schema_type;
        }
        self.format = over.format.or(self.format);
        self.description = over.description.or(self.description);
        self.example = over.example.or(self.example);
        if !over.enum_values.is_empty() {
            self.enum_values = over.enum_values;
        }
        self.minimum = over.minimum.or(self.minimum);
        self.maximum = over.maximum.or(self.maximum);
        self.min_length = over.min_length.or(self.min_length);
        self.max_length = over.max_length.or(self.max_length);
        self.pattern = over.pattern.or(self.pattern);
        self.nullable |= over.nullable;
        self.items = over.items.or(self.items);
        self
    }

    fn or_string(mut self) -> Self {
        self.schema_type.get_or_insert(SchemaType::String);
        self
    }
}

macro_rules! schema_setters {
    ($ty:ty) => {
        impl $ty {
            pub fn schema_type(mut self, schema_type: SchemaType) -> Self {
                self.schema.schema_type = Some(schema_type);
                self
            }

            pub fn format(mut self, format: impl Into<String>) -> Self {
                self.schema.format = Some(format.into());
                self
            }

            pub fn description(mut self, description: impl Into<String>) -> Self {
                self.schema.description = Some(description.into());
                self
            }

            pub fn example(mut self, example: impl Into<Value>) -> Self {
                self.schema.example = Some(example.into());
                self
            }

            pub fn enum_values<I, V>(mut self, values: I) -> Self
            where
                I: IntoIterator<Item = V>,
                V: Into<Value>,
            {
                self.schema.enum_values = values.into_iter().map(Into::into).collect();
                self
            }

            pub fn minimum(mut self, minimum: f64) -> Self {
                self.schema.minimum = Some(minimum);
                self
            }

            pub fn maximum(mut self, maximum: f64) -> Self {
                self.schema.maximum = Some(maximum);
                self
            }

            pub fn min_length(mut self, min_length: usize) -> Self {
                self.schema.min_length = Some(min_length);
                self
            }

            pub fn max_length(mut self, max_length: usize) -> Self {
                self.schema.max_length = Some(max_length);
                self
            }

            pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
                self.schema.pattern = Some(pattern.into());
                self
            }

            pub fn nullable(mut self) -> Self {
                self.schema.nullable = true;
                self
            }

            pub fn required(mut self, required: bool) -> Self {
                self.required = Some(required);
                self
            }
        }
    };
}

/// Field options of a DTO property.
#[derive(Debug, Clone, Default)]
pub struct ApiProperty {
    schema: InlineSchema,
    required: Option<bool>,
}

schema_setters!(ApiProperty);

impl ApiProperty {
    /// A required property.
    pub fn new() -> Self {
        Self::default()
    }

    /// A property with `required` forced to `false`.
    pub fn optional() -> Self {
        Self::default().required(false)
    }

    fn into_fact(self, inferred: InlineSchema) -> PropertyFact {
        PropertyFact {
            schema: SchemaNode::inline(inferred.overlay(self.schema).or_string()),
            required: self.required.unwrap_or(true),
        }
    }
}

/// A path or query parameter.
#[derive(Debug, Clone)]
pub struct ApiParam {
    name: String,
    location: ParameterLocation,
    inferred: InlineSchema,
    schema: InlineSchema,
    required: Option<bool>,
}

schema_setters!(ApiParam);

impl ApiParam {
    /// Path parameter, required unless overridden.
    pub fn path(name: impl Into<String>) -> Self {
        Self::new(name, ParameterLocation::Path)
    }

    /// Query parameter, optional unless overridden.
    pub fn query(name: impl Into<String>) -> Self {
        Self::new(name, ParameterLocation::Query)
    }

    fn new(name: impl Into<String>, location: ParameterLocation) -> Self {
        Self {
            name: name.into(),
            location,
            inferred: InlineSchema::default(),
            schema: InlineSchema::default(),
            required: None,
        }
    }

    /// Infer the parameter schema from a Rust type.
    pub fn of<T: ApiType + ?Sized>(mut self) -> Self {
        self.inferred = T::describe();
        self
    }

    fn into_fact(self) -> ParameterFact {
        let mut schema = self.inferred.overlay(self.schema).or_string();
        let description = schema.description.take();
        let example = schema.example.take();
        ParameterFact {
            name: self.name,
            location: self.location,
            required: self
                .required
                .unwrap_or(self.location == ParameterLocation::Path),
            description,
            example,
            schema: SchemaNode::inline(schema),
        }
    }
}

/// Where a body or response schema comes from.
#[derive(Debug, Clone)]
enum SchemaSource {
    Dto(fn(&mut MetadataStore) -> TypeKey),
    Inline(InlineSchema),
}

impl SchemaSource {
    fn dto<T: ApiSchema>() -> Self {
        Self::Dto(MetadataStore::register_schema::<T>)
    }

    fn resolve(self, store: &mut MetadataStore, is_array: bool) -> SchemaNode {
        let node = match self {
            Self::Dto(register) => SchemaNode::Dto(register(store)),
            Self::Inline(schema) => SchemaNode::inline(schema),
        };
        if is_array { node.into_array() } else { node }
    }
}

/// Request body of an operation.
#[derive(Debug, Clone)]
pub struct ApiBody {
    source: SchemaSource,
    is_array: bool,
    content_type: String,
    required: bool,
    description: Option<String>,
}

impl ApiBody {
    pub fn dto<T: ApiSchema>() -> Self {
        Self::from_source(SchemaSource::dto::<T>())
    }

    pub fn schema(schema: InlineSchema) -> Self {
        Self::from_source(SchemaSource::Inline(schema))
    }

    fn from_source(source: SchemaSource) -> Self {
        Self {
            source,
            is_array: false,
            content_type: JSON_CONTENT_TYPE.to_string(),
            required: true,
            description: None,
        }
    }

    pub fn is_array(mut self, is_array: bool) -> Self {
        self.is_array = is_array;
        self
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// One response of an operation, keyed by its status code.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    status: u16,
    description: String,
    source: Option<SchemaSource>,
    is_array: bool,
    content_type: String,
    headers: Vec<(String, Option<String>)>,
}

impl ApiResponse {
    pub fn new(status: u16, description: impl Into<String>) -> Self {
        Self {
            status,
            description: description.into(),
            source: None,
            is_array: false,
            content_type: JSON_CONTENT_TYPE.to_string(),
            headers: Vec::new(),
        }
    }

    pub fn ok(description: impl Into<String>) -> Self {
        Self::new(200, description)
    }

    pub fn created(description: impl Into<String>) -> Self {
        Self::new(201, description)
    }

    pub fn no_content(description: impl Into<String>) -> Self {
        Self::new(204, description)
    }

    pub fn bad_request(description: impl Into<String>) -> Self {
        Self::new(400, description)
    }

    pub fn not_found(description: impl Into<String>) -> Self {
        Self::new(404, description)
    }

    pub fn conflict(description: impl Into<String>) -> Self {
        Self::new(409, description)
    }

    pub fn body<T: ApiSchema>(mut self) -> Self {
        self.source = Some(SchemaSource::dto::<T>());
        self
    }

    pub fn schema(mut self, schema: InlineSchema) -> Self {
        self.source = Some(SchemaSource::Inline(schema));
        self
    }

    pub fn is_array(mut self, is_array: bool) -> Self {
        self.is_array = is_array;
        self
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    pub fn header(mut self, name: impl Into<String>, description: impl Into<String>) -> Self {
        self.headers.push((name.into(), Some(description.into())));
        self
    }
}

/// Summary, description and grouping of an operation.
#[derive(Debug, Clone, Default)]
pub struct ApiOperation {
    fact: OperationFact,
}

impl ApiOperation {
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            fact: OperationFact {
                summary: Some(summary.into()),
                ..OperationFact::default()
            },
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.fact.description = Some(description.into());
        self
    }

    pub fn operation_id(mut self, operation_id: impl Into<String>) -> Self {
        self.fact.operation_id = Some(operation_id.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.fact.tags.push(tag.into());
        self
    }

    pub fn deprecated(mut self) -> Self {
        self.fact.deprecated = true;
        self
    }
}

/// Declarations scoped to one controller type.
pub struct ControllerDecl<'a> {
    store: &'a mut MetadataStore,
    owner: TypeKey,
}

impl<'a> ControllerDecl<'a> {
    pub fn new(store: &'a mut MetadataStore, owner: TypeKey) -> Self {
        Self { store, owner }
    }

    /// Class-level tags, applied to every operation of the controller.
    pub fn tags<I, S>(&mut self, tags: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.store
            .define_tags(self.owner, tags.into_iter().map(Into::into).collect());
        self
    }

    pub fn method(&mut self, member: &'static str) -> MethodDecl<'_> {
        MethodDecl {
            store: &mut *self.store,
            key: MemberKey::new(self.owner, member),
        }
    }
}

/// Declarations scoped to one controller member.
pub struct MethodDecl<'a> {
    store: &'a mut MetadataStore,
    key: MemberKey,
}

impl MethodDecl<'_> {
    /// Bind the member to `verb` and a `:param` style path.
    pub fn route(self, verb: &str, path: &str) -> Self {
        self.route_with(verb, path, Vec::new())
    }

    /// Like [`route`](Self::route), running `middleware` ahead of the handler
    /// in the given order.
    pub fn route_with(self, verb: &str, path: &str, middleware: Vec<Middleware>) -> Self {
        self.store.define_route(RouteFact {
            key: self.key,
            verb: verb.to_string(),
            path: path.to_string(),
            middleware,
        });
        self
    }

    pub fn get(self, path: &str) -> Self {
        self.route("get", path)
    }

    pub fn post(self, path: &str) -> Self {
        self.route("post", path)
    }

    pub fn put(self, path: &str) -> Self {
        self.route("put", path)
    }

    pub fn patch(self, path: &str) -> Self {
        self.route("patch", path)
    }

    pub fn delete(self, path: &str) -> Self {
        self.route("delete", path)
    }

    pub fn operation(self, operation: ApiOperation) -> Self {
        self.store.define_operation(self.key, operation.fact);
        self
    }

    pub fn param(self, param: ApiParam) -> Self {
        self.store.push_parameter(self.key, param.into_fact());
        self
    }

    pub fn body(self, body: ApiBody) -> Self {
        let schema = body.source.resolve(self.store, body.is_array);
        self.store.define_request_body(
            self.key,
            RequestBodyFact {
                content: vec![(body.content_type, schema)],
                required: body.required,
                description: body.description,
            },
        );
        self
    }

    pub fn response(self, response: ApiResponse) -> Self {
        let content = response
            .source
            .map(|source| source.resolve(self.store, response.is_array));
        let headers = response
            .headers
            .into_iter()
            .map(|(name, description)| HeaderFact {
                name,
                description,
                schema: SchemaNode::inline(InlineSchema::typed(SchemaType::String)),
            })
            .collect();
        self.store.define_response(
            self.key,
            response.status,
            ResponseFact {
                description: response.description,
                content_type: response.content_type,
                content,
                headers,
            },
        );
        self
    }
}

/// Field declarations of one DTO type.
pub struct SchemaDecl<'a> {
    store: &'a mut MetadataStore,
    owner: TypeKey,
}

impl<'a> SchemaDecl<'a> {
    pub fn new(store: &'a mut MetadataStore, owner: TypeKey) -> Self {
        Self { store, owner }
    }

    /// Field whose schema is inferred from `T`, refined by `options`.
    pub fn property<T: ApiType + ?Sized>(&mut self, name: &str, options: ApiProperty) -> &mut Self {
        let fact = options.into_fact(T::describe());
        self.store.define_property(self.owner, name, fact);
        self
    }

    /// [`property`](Self::property) with `required` forced to `false`.
    pub fn property_optional<T: ApiType + ?Sized>(&mut self, name: &str, options: ApiProperty) -> &mut Self {
        self.property::<T>(name, options.required(false))
    }

    /// Field without a Rust type to infer from; string unless `options` say otherwise.
    pub fn untyped(&mut self, name: &str, options: ApiProperty) -> &mut Self {
        let fact = options.into_fact(InlineSchema::default());
        self.store.define_property(self.owner, name, fact);
        self
    }

    /// Field holding another DTO.
    ///
    /// The field is documented as a bare `$ref`, which OpenAPI 3.0 forbids
    /// siblings on: only `required` is taken from `options`. Any other option
    /// is dropped with a warning.
    pub fn dto<T: ApiSchema>(&mut self, name: &str, options: ApiProperty) -> &mut Self {
        self.dto_field::<T>(name, options, false)
    }

    /// Field holding an array of another DTO. `options` describe the array
    /// itself (description, example, nullable and so on).
    pub fn dto_array<T: ApiSchema>(&mut self, name: &str, options: ApiProperty) -> &mut Self {
        self.dto_field::<T>(name, options, true)
    }

    fn dto_field<T: ApiSchema>(&mut self, name: &str, options: ApiProperty, is_array: bool) -> &mut Self {
        let ApiProperty { schema: mut facets, required } = options;
        facets.schema_type = None;
        facets.items = None;

        let schema = match SchemaSource::dto::<T>().resolve(self.store, is_array) {
            SchemaNode::Inline(array) => SchemaNode::inline(array.overlay(facets)),
            node => {
                if facets != InlineSchema::default() {
                    warn!(
                        owner = self.owner.short_name(),
                        field = name,
                        "options other than `required` are ignored on DTO fields"
                    );
                }
                node
            }
        };
        let fact = PropertyFact {
            schema,
            required: required.unwrap_or(true),
        };
        self.store.define_property(self.owner, name, fact);
        self
    }
}

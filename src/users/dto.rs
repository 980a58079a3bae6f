//! Request and response DTOs of the users resource.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::declare::{ApiProperty, ApiSchema, SchemaDecl};
use crate::pagination::PaginationMeta;

use super::store::User;

const EMAIL_EXAMPLE: &str = "jane.doe@example.com";

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserDto {
    #[validate(email(message = "email must be a valid email address"))]
    pub email: String,

    #[validate(length(min = 1, max = 100, message = "name must be 1 to 100 characters"))]
    pub name: Option<String>,
}

impl ApiSchema for CreateUserDto {
    fn declare(schema: &mut SchemaDecl<'_>) {
        schema
            .property::<String>(
                "email",
                ApiProperty::new()
                    .format("email")
                    .description("Unique email address")
                    .example(EMAIL_EXAMPLE),
            )
            .property::<Option<String>>(
                "name",
                ApiProperty::optional()
                    .description("Display name")
                    .min_length(1)
                    .max_length(100)
                    .example("Jane Doe"),
            );
    }
}

/// Partial update; absent fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserDto {
    #[validate(email(message = "email must be a valid email address"))]
    pub email: Option<String>,

    #[validate(length(min = 1, max = 100, message = "name must be 1 to 100 characters"))]
    pub name: Option<String>,

    pub is_active: Option<bool>,
}

impl ApiSchema for UpdateUserDto {
    fn declare(schema: &mut SchemaDecl<'_>) {
        schema
            .property_optional::<String>(
                "email",
                ApiProperty::new().format("email").example(EMAIL_EXAMPLE),
            )
            .property_optional::<String>("name", ApiProperty::new().min_length(1).max_length(100))
            .property_optional::<bool>(
                "isActive",
                ApiProperty::new().description("Whether the user can sign in"),
            );
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponseDto {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<User> for UserResponseDto {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            name: user.name,
            is_active: user.is_active,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

impl ApiSchema for UserResponseDto {
    fn declare(schema: &mut SchemaDecl<'_>) {
        schema
            .property::<Uuid>("id", ApiProperty::new().description("User identifier"))
            .property::<String>("email", ApiProperty::new().format("email").example(EMAIL_EXAMPLE))
            .property::<Option<String>>("name", ApiProperty::optional().example("Jane Doe"))
            .property::<bool>("isActive", ApiProperty::new().example(true))
            .property::<DateTime<Utc>>("createdAt", ApiProperty::new())
            .property::<DateTime<Utc>>("updatedAt", ApiProperty::new());
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserListResponseDto {
    pub data: Vec<UserResponseDto>,
    pub meta: PaginationMeta,
}

impl ApiSchema for UserListResponseDto {
    fn declare(schema: &mut SchemaDecl<'_>) {
        schema
            .dto_array::<UserResponseDto>("data", ApiProperty::new())
            .dto::<PaginationMeta>("meta", ApiProperty::new());
    }
}

/// Shape of every error body produced by `AppError`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponseDto {
    pub status_code: u16,
    pub error: String,
    pub message: serde_json::Value,
}

impl ApiSchema for ErrorResponseDto {
    fn declare(schema: &mut SchemaDecl<'_>) {
        schema
            .property::<u16>("statusCode", ApiProperty::new().example(404))
            .property::<String>("error", ApiProperty::new().example("Not Found"))
            .untyped(
                "message",
                ApiProperty::new().description("Error message, or the list of validation errors"),
            );
    }
}

//! CRUD endpoints of the users resource.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query},
    http::StatusCode,
};
use tracing::info;
use uuid::Uuid;

use crate::binder::RouteHandler;
use crate::declare::{ApiBody, ApiOperation, ApiParam, ApiResponse, ControllerDecl};
use crate::error::AppError;
use crate::middleware::{validate_body, validate_query};
use crate::pagination::{PaginationMeta, PaginationQuery};
use crate::traits::Controller;
use crate::Result;

use super::dto::{
    CreateUserDto, ErrorResponseDto, UpdateUserDto, UserListResponseDto, UserResponseDto,
};
use super::store::{NewUser, UserChanges, UserStore};

pub struct UsersController {
    store: Arc<dyn UserStore>,
}

impl UsersController {
    pub fn new(store: Arc<dyn UserStore>) -> Self {
        Self { store }
    }

    pub async fn find_all(&self, query: PaginationQuery) -> Result<UserListResponseDto> {
        let users = self.store.find_many(query.skip(), query.limit).await?;
        let total = self.store.count().await?;
        Ok(UserListResponseDto {
            data: users.into_iter().map(UserResponseDto::from).collect(),
            meta: PaginationMeta::new(query, total),
        })
    }

    pub async fn find_one(&self, id: Uuid) -> Result<UserResponseDto> {
        self.store
            .find_unique(id)
            .await?
            .map(UserResponseDto::from)
            .ok_or_else(|| AppError::NotFound(format!("User with ID {id} not found")))
    }

    pub async fn create(&self, dto: CreateUserDto) -> Result<UserResponseDto> {
        if self.store.find_by_email(&dto.email).await?.is_some() {
            return Err(AppError::Conflict(format!(
                "User with email {} already exists",
                dto.email
            )));
        }
        let user = self
            .store
            .create(NewUser {
                email: dto.email,
                name: dto.name,
            })
            .await?;
        info!(user_id = %user.id, "user created");
        Ok(user.into())
    }

    pub async fn update(&self, id: Uuid, dto: UpdateUserDto) -> Result<UserResponseDto> {
        let user = self.find_one(id).await?;
        if let Some(email) = dto.email.as_deref().filter(|email| *email != user.email) {
            if self.store.find_by_email(email).await?.is_some() {
                return Err(AppError::Conflict(format!(
                    "User with email {email} already exists"
                )));
            }
        }
        let user = self
            .store
            .update(
                id,
                UserChanges {
                    email: dto.email,
                    name: dto.name,
                    is_active: dto.is_active,
                },
            )
            .await?;
        Ok(user.into())
    }

    pub async fn remove(&self, id: Uuid) -> Result<()> {
        self.find_one(id).await?;
        self.store.delete(id).await?;
        info!(user_id = %id, "user deleted");
        Ok(())
    }
}

fn parse_id(id: &str) -> Result<Uuid> {
    Uuid::parse_str(id)
        .map_err(|_| AppError::BadRequest("Validation failed (uuid is expected)".to_string()))
}

fn id_param() -> ApiParam {
    ApiParam::path("id").of::<Uuid>().description("User identifier")
}

impl Controller for UsersController {
    fn base_path() -> &'static str {
        "/users"
    }

    fn declare(api: &mut ControllerDecl<'_>) {
        api.tags(["Users"]);

        PaginationQuery::declare_params(
            api.method("find_all")
                .route_with("get", "", vec![validate_query::<PaginationQuery>()]),
        )
        .operation(
            ApiOperation::new("List users")
                .description("Returns one page of users, oldest first."),
        )
        .response(ApiResponse::ok("A page of users").body::<UserListResponseDto>())
        .response(ApiResponse::bad_request("Invalid pagination").body::<ErrorResponseDto>());

        api.method("find_one")
            .get("/:id")
            .operation(ApiOperation::new("Get a user by ID"))
            .param(id_param())
            .response(ApiResponse::ok("The user").body::<UserResponseDto>())
            .response(ApiResponse::bad_request("Malformed ID").body::<ErrorResponseDto>())
            .response(ApiResponse::not_found("User not found").body::<ErrorResponseDto>());

        api.method("create")
            .route_with("post", "", vec![validate_body::<CreateUserDto>()])
            .operation(ApiOperation::new("Create a user"))
            .body(ApiBody::dto::<CreateUserDto>())
            .response(ApiResponse::created("The created user").body::<UserResponseDto>())
            .response(ApiResponse::bad_request("Invalid input").body::<ErrorResponseDto>())
            .response(ApiResponse::conflict("Email already in use").body::<ErrorResponseDto>());

        api.method("update")
            .route_with("patch", "/:id", vec![validate_body::<UpdateUserDto>()])
            .operation(
                ApiOperation::new("Update a user")
                    .description("Only the fields present in the body are changed."),
            )
            .param(id_param())
            .body(ApiBody::dto::<UpdateUserDto>())
            .response(ApiResponse::ok("The updated user").body::<UserResponseDto>())
            .response(ApiResponse::bad_request("Invalid input").body::<ErrorResponseDto>())
            .response(ApiResponse::not_found("User not found").body::<ErrorResponseDto>())
            .response(ApiResponse::conflict("Email already in use").body::<ErrorResponseDto>());

        api.method("remove")
            .delete("/:id")
            .operation(ApiOperation::new("Delete a user"))
            .param(id_param())
            .response(ApiResponse::no_content("User deleted"))
            .response(ApiResponse::not_found("User not found").body::<ErrorResponseDto>());
    }

    fn handlers(self: Arc<Self>) -> Vec<RouteHandler> {
        let list = Arc::clone(&self);
        let one = Arc::clone(&self);
        let create = Arc::clone(&self);
        let update = Arc::clone(&self);
        let remove = self;

        vec![
            RouteHandler::new("find_all", move |Query(query): Query<PaginationQuery>| {
                let this = Arc::clone(&list);
                async move { this.find_all(query).await.map(Json) }
            }),
            RouteHandler::new("find_one", move |Path(id): Path<String>| {
                let this = Arc::clone(&one);
                async move { this.find_one(parse_id(&id)?).await.map(Json) }
            }),
            RouteHandler::new("create", move |Json(dto): Json<CreateUserDto>| {
                let this = Arc::clone(&create);
                async move {
                    let user = this.create(dto).await?;
                    Ok::<_, AppError>((StatusCode::CREATED, Json(user)))
                }
            }),
            RouteHandler::new(
                "update",
                move |Path(id): Path<String>, Json(dto): Json<UpdateUserDto>| {
                    let this = Arc::clone(&update);
                    async move { this.update(parse_id(&id)?, dto).await.map(Json) }
                },
            ),
            RouteHandler::new("remove", move |Path(id): Path<String>| {
                let this = Arc::clone(&remove);
                async move {
                    this.remove(parse_id(&id)?).await?;
                    Ok::<_, AppError>(StatusCode::NO_CONTENT)
                }
            }),
        ]
    }
}

//! The users resource: DTOs, storage and the CRUD controller.

pub mod controller;
pub mod dto;
pub mod store;

pub use controller::UsersController;
pub use dto::{CreateUserDto, ErrorResponseDto, UpdateUserDto, UserListResponseDto, UserResponseDto};
pub use store::{InMemoryUserStore, NewUser, User, UserChanges, UserStore};

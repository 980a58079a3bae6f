//! Data access for users.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::AppError;
use crate::Result;

/// A stored user record.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub name: Option<String>,
}

/// Field changes of an update; `None` leaves the field as is.
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub email: Option<String>,
    pub name: Option<String>,
    pub is_active: Option<bool>,
}

/// Persistence of users. Emails are unique.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn connect(&self) -> Result<()>;

    async fn disconnect(&self) -> Result<()>;

    /// Fails with `AppError::Unavailable` when the store cannot serve queries.
    async fn ping(&self) -> Result<()>;

    /// Users ordered by creation time, oldest first.
    async fn find_many(&self, skip: u64, take: u64) -> Result<Vec<User>>;

    async fn count(&self) -> Result<u64>;

    async fn find_unique(&self, id: Uuid) -> Result<Option<User>>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;

    async fn create(&self, user: NewUser) -> Result<User>;

    async fn update(&self, id: Uuid, changes: UserChanges) -> Result<User>;

    async fn delete(&self, id: Uuid) -> Result<()>;
}

/// Process-local store, used by the binary and the tests.
#[derive(Debug, Default)]
pub struct InMemoryUserStore {
    users: RwLock<Vec<User>>,
    connected: AtomicBool,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.connected.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(AppError::Unavailable("user store is not connected".to_string()))
        }
    }
}

fn email_taken(email: &str) -> AppError {
    AppError::Conflict(format!("User with email {email} already exists"))
}

fn user_not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("User with ID {id} not found"))
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn connect(&self) -> Result<()> {
        self.connected.store(true, Ordering::Release);
        info!("user store connected");
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.connected.store(false, Ordering::Release);
        info!("user store disconnected");
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        self.ensure_connected()
    }

    async fn find_many(&self, skip: u64, take: u64) -> Result<Vec<User>> {
        self.ensure_connected()?;
        let users = self.users.read().await;
        let skip = usize::try_from(skip).unwrap_or(usize::MAX);
        let take = usize::try_from(take).unwrap_or(usize::MAX);
        Ok(users.iter().skip(skip).take(take).cloned().collect())
    }

    async fn count(&self) -> Result<u64> {
        self.ensure_connected()?;
        Ok(self.users.read().await.len() as u64)
    }

    async fn find_unique(&self, id: Uuid) -> Result<Option<User>> {
        self.ensure_connected()?;
        let users = self.users.read().await;
        Ok(users.iter().find(|user| user.id == id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        self.ensure_connected()?;
        let users = self.users.read().await;
        Ok(users.iter().find(|user| user.email == email).cloned())
    }

    async fn create(&self, user: NewUser) -> Result<User> {
        self.ensure_connected()?;
        let mut users = self.users.write().await;
        if users.iter().any(|existing| existing.email == user.email) {
            return Err(email_taken(&user.email));
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            email: user.email,
            name: user.name,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        users.push(user.clone());
        debug!(user_id = %user.id, "user created");
        Ok(user)
    }

    async fn update(&self, id: Uuid, changes: UserChanges) -> Result<User> {
        self.ensure_connected()?;
        let mut users = self.users.write().await;
        if let Some(email) = &changes.email {
            if users.iter().any(|user| user.id != id && &user.email == email) {
                return Err(email_taken(email));
            }
        }

        let user = users
            .iter_mut()
            .find(|user| user.id == id)
            .ok_or_else(|| user_not_found(id))?;
        if let Some(email) = changes.email {
            user.email = email;
        }
        if let Some(name) = changes.name {
            user.name = Some(name);
        }
        if let Some(is_active) = changes.is_active {
            user.is_active = is_active;
        }
        user.updated_at = Utc::now();
        debug!(user_id = %id, "user updated");
        Ok(user.clone())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        self.ensure_connected()?;
        let mut users = self.users.write().await;
        let index = users
            .iter()
            .position(|user| user.id == id)
            .ok_or_else(|| user_not_found(id))?;
        users.remove(index);
        debug!(user_id = %id, "user deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn connected() -> InMemoryUserStore {
        let store = InMemoryUserStore::new();
        store.connect().await.unwrap();
        store
    }

    fn new_user(email: &str) -> NewUser {
        NewUser {
            email: email.to_string(),
            name: None,
        }
    }

    #[tokio::test]
    async fn test_queries_fail_until_connected() {
        let store = InMemoryUserStore::new();
        assert!(matches!(store.ping().await, Err(AppError::Unavailable(_))));
        assert!(matches!(store.count().await, Err(AppError::Unavailable(_))));

        store.connect().await.unwrap();
        store.ping().await.unwrap();

        store.disconnect().await.unwrap();
        assert!(store.ping().await.is_err());
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate_email() {
        let store = connected().await;
        let user = store.create(new_user("a@example.com")).await.unwrap();
        assert!(user.is_active);

        let duplicate = store.create(new_user("a@example.com")).await;
        assert!(matches!(duplicate, Err(AppError::Conflict(_))));
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_find_many_pages_in_insertion_order() {
        let store = connected().await;
        for i in 0..5 {
            store.create(new_user(&format!("u{i}@example.com"))).await.unwrap();
        }

        let page: Vec<_> = store
            .find_many(2, 2)
            .await
            .unwrap()
            .into_iter()
            .map(|user| user.email)
            .collect();
        assert_eq!(page, ["u2@example.com", "u3@example.com"]);
        assert!(store.find_many(10, 2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_applies_only_given_fields() {
        let store = connected().await;
        let user = store.create(new_user("a@example.com")).await.unwrap();

        let updated = store
            .update(
                user.id,
                UserChanges {
                    name: Some("Ada".to_string()),
                    ..UserChanges::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name.as_deref(), Some("Ada"));
        assert_eq!(updated.email, "a@example.com");
        assert!(updated.updated_at >= user.updated_at);
    }

    #[tokio::test]
    async fn test_update_to_taken_email_conflicts() {
        let store = connected().await;
        store.create(new_user("a@example.com")).await.unwrap();
        let other = store.create(new_user("b@example.com")).await.unwrap();

        let result = store
            .update(
                other.id,
                UserChanges {
                    email: Some("a@example.com".to_string()),
                    ..UserChanges::default()
                },
            )
            .await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_delete_missing_user_is_not_found() {
        let store = connected().await;
        let user = store.create(new_user("a@example.com")).await.unwrap();

        store.delete(user.id).await.unwrap();
        assert!(store.find_unique(user.id).await.unwrap().is_none());
        assert!(matches!(store.delete(user.id).await, Err(AppError::NotFound(_))));
    }
}

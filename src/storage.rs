use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::{tasks::repo_types::Task, users::repo_types::User};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("email already registered")]
    DuplicateEmail,
    #[error("record not found")]
    NotFound,
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Keyed user collection. Every call is atomic for the one record it touches.
///
/// `save` inserts a whole record, but on an existing one it only rewrites the
/// profile columns (name, email, age, updated_at). The password hash, avatar
/// and token set each change through their own narrow call, so a request
/// holding an older copy of the user never rolls those back.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn save(&self, user: &User) -> Result<(), StoreError>;
    async fn set_password_hash(&self, id: Uuid, hash: &str) -> Result<(), StoreError>;
    async fn set_avatar(&self, id: Uuid, avatar: Option<&[u8]>) -> Result<(), StoreError>;
    async fn push_token(&self, id: Uuid, token: &str) -> Result<(), StoreError>;
    async fn pull_token(&self, id: Uuid, token: &str) -> Result<(), StoreError>;
    async fn clear_tokens(&self, id: Uuid) -> Result<(), StoreError>;
    /// Removes the record only. Fails while the user still owns tasks.
    async fn delete(&self, id: Uuid) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Fails when `task.owner` is not a stored user.
    async fn insert(&self, task: &Task) -> anyhow::Result<()>;
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Task>>;
    async fn list_by_owner(&self, owner: Uuid, limit: i64, offset: i64) -> anyhow::Result<Vec<Task>>;
    /// Deletes every task whose owner is `owner`, returning how many went.
    async fn delete_by_owner(&self, owner: Uuid) -> anyhow::Result<u64>;
}

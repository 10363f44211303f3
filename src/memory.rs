use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    storage::{StoreError, TaskStore, UserStore},
    tasks::repo_types::Task,
    users::repo_types::User,
};

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    tasks: HashMap<Uuid, Task>,
}

impl Tables {
    fn user_mut(&mut self, id: Uuid) -> Result<&mut User, StoreError> {
        self.users.get_mut(&id).ok_or(StoreError::NotFound)
    }
}

/// Process-local users and tasks, used when no database is configured and in tests.
///
/// Both collections sit behind one lock so the task owner reference holds the
/// same way the `tasks.owner` foreign key does in Postgres.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.users.values().find(|u| u.email == email).cloned())
    }

    async fn save(&self, user: &User) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if tables.users.values().any(|u| u.email == user.email && u.id != user.id) {
            return Err(StoreError::DuplicateEmail);
        }
        match tables.users.get_mut(&user.id) {
            Some(stored) => {
                stored.name = user.name.clone();
                stored.email = user.email.clone();
                stored.age = user.age;
                stored.updated_at = user.updated_at;
            }
            None => {
                let mut record = user.clone();
                record.pending_password = None;
                record.tokens.clear();
                tables.users.insert(user.id, record);
            }
        }
        Ok(())
    }

    async fn set_password_hash(&self, id: Uuid, hash: &str) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let user = tables.user_mut(id)?;
        user.password_hash = hash.to_string();
        user.updated_at = OffsetDateTime::now_utc();
        Ok(())
    }

    async fn set_avatar(&self, id: Uuid, avatar: Option<&[u8]>) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let user = tables.user_mut(id)?;
        user.avatar = avatar.map(<[u8]>::to_vec);
        user.updated_at = OffsetDateTime::now_utc();
        Ok(())
    }

    async fn push_token(&self, id: Uuid, token: &str) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        tables.user_mut(id)?.tokens.push(token.to_string());
        Ok(())
    }

    async fn pull_token(&self, id: Uuid, token: &str) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        tables.user_mut(id)?.tokens.retain(|t| t != token);
        Ok(())
    }

    async fn clear_tokens(&self, id: Uuid) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        tables.user_mut(id)?.tokens.clear();
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        if tables.tasks.values().any(|t| t.owner == id) {
            return Err(StoreError::Backend(anyhow::anyhow!("user {id} still owns tasks")));
        }
        Ok(tables.users.remove(&id).is_some())
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn insert(&self, task: &Task) -> anyhow::Result<()> {
        let mut tables = self.tables.write().await;
        anyhow::ensure!(tables.users.contains_key(&task.owner), "owner {} does not exist", task.owner);
        anyhow::ensure!(!tables.tasks.contains_key(&task.id), "task {} already exists", task.id);
        tables.tasks.insert(task.id, task.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Task>> {
        Ok(self.tables.read().await.tasks.get(&id).cloned())
    }

    async fn list_by_owner(&self, owner: Uuid, limit: i64, offset: i64) -> anyhow::Result<Vec<Task>> {
        let tables = self.tables.read().await;
        let mut owned: Vec<Task> = tables.tasks.values().filter(|t| t.owner == owner).cloned().collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(owned
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn delete_by_owner(&self, owner: Uuid) -> anyhow::Result<u64> {
        let mut tables = self.tables.write().await;
        let before = tables.tasks.len();
        tables.tasks.retain(|_, t| t.owner != owner);
        Ok((before - tables.tasks.len()) as u64)
    }
}

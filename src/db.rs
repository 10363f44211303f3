use anyhow::Context;
use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    storage::{StoreError, TaskStore, UserStore},
    tasks::repo_types::Task,
    users::repo_types::User,
};

pub async fn connect(config: &AppConfig, database_url: &str) -> anyhow::Result<PgPool> {
    let db = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(database_url)
        .await
        .context("connect to database")?;

    sqlx::migrate!("./migrations")
        .run(&db)
        .await
        .context("run migrations")?;
    Ok(db)
}

fn backend(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            return StoreError::DuplicateEmail;
        }
    }
    StoreError::Backend(e.into())
}

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    async fn update_tokens(&self, sql: &str, id: Uuid, token: Option<&str>) -> Result<(), StoreError> {
        let mut query = sqlx::query(sql).bind(id);
        if let Some(token) = token {
            query = query.bind(token);
        }
        let done = query.execute(&self.db).await.map_err(backend)?;
        if done.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

const USER_COLUMNS: &str =
    "id, name, email, password_hash, age, tokens, avatar, created_at, updated_at";

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await
            .map_err(backend)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(&self.db)
            .await
            .map_err(backend)
    }

    async fn save(&self, user: &User) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, name, email, password_hash, age, avatar, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO UPDATE
               SET name = EXCLUDED.name,
                   email = EXCLUDED.email,
                   age = EXCLUDED.age,
                   updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.age)
        .bind(user.avatar.as_deref())
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.db)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn set_password_hash(&self, id: Uuid, hash: &str) -> Result<(), StoreError> {
        let done = sqlx::query("UPDATE users SET password_hash = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(hash)
            .execute(&self.db)
            .await
            .map_err(backend)?;
        if done.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn set_avatar(&self, id: Uuid, avatar: Option<&[u8]>) -> Result<(), StoreError> {
        let done = sqlx::query("UPDATE users SET avatar = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(avatar)
            .execute(&self.db)
            .await
            .map_err(backend)?;
        if done.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn push_token(&self, id: Uuid, token: &str) -> Result<(), StoreError> {
        self.update_tokens(
            "UPDATE users SET tokens = array_append(tokens, $2) WHERE id = $1",
            id,
            Some(token),
        )
        .await
    }

    async fn pull_token(&self, id: Uuid, token: &str) -> Result<(), StoreError> {
        self.update_tokens(
            "UPDATE users SET tokens = array_remove(tokens, $2) WHERE id = $1",
            id,
            Some(token),
        )
        .await
    }

    async fn clear_tokens(&self, id: Uuid) -> Result<(), StoreError> {
        self.update_tokens("UPDATE users SET tokens = '{}' WHERE id = $1", id, None)
            .await
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let done = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await
            .map_err(backend)?;
        Ok(done.rows_affected() > 0)
    }
}

#[derive(Clone)]
pub struct PgTaskStore {
    db: PgPool,
}

impl PgTaskStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TaskStore for PgTaskStore {
    async fn insert(&self, task: &Task) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO tasks (id, description, completed, owner, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(task.id)
        .bind(&task.description)
        .bind(task.completed)
        .bind(task.owner)
        .bind(task.created_at)
        .bind(task.updated_at)
        .execute(&self.db)
        .await
        .context("insert task")?;
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Task>> {
        let task = sqlx::query_as::<_, Task>(
            r#"
            SELECT id, description, completed, owner, created_at, updated_at
              FROM tasks
             WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("find task")?;
        Ok(task)
    }

    async fn list_by_owner(&self, owner: Uuid, limit: i64, offset: i64) -> anyhow::Result<Vec<Task>> {
        let rows = sqlx::query_as::<_, Task>(
            r#"
            SELECT id, description, completed, owner, created_at, updated_at
              FROM tasks
             WHERE owner = $1
             ORDER BY created_at DESC
             LIMIT $2 OFFSET $3
            "#,
        )
        .bind(owner)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db)
        .await
        .context("list tasks by owner")?;
        Ok(rows)
    }

    async fn delete_by_owner(&self, owner: Uuid) -> anyhow::Result<u64> {
        let done = sqlx::query("DELETE FROM tasks WHERE owner = $1")
            .bind(owner)
            .execute(&self.db)
            .await
            .context("delete tasks by owner")?;
        Ok(done.rows_affected())
    }
}

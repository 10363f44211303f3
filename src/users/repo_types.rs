use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// User record as persisted. Never serialized; responses go through [`PublicUser`].
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: String, // argon2 PHC string
    pub age: i32,
    pub tokens: Vec<String>,
    pub avatar: Option<Vec<u8>>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    /// Plain text set since load; hashed and cleared by `save`.
    #[sqlx(skip)]
    pub(crate) pending_password: Option<String>,
}

impl User {
    pub fn new(name: &str, email: &str, password: &str) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: email.to_string(),
            password_hash: String::new(),
            age: 0,
            tokens: Vec::new(),
            avatar: None,
            created_at: now,
            updated_at: now,
            pending_password: Some(password.to_string()),
        }
    }

    pub fn set_password(&mut self, plain: &str) {
        self.pending_password = Some(plain.to_string());
    }

    pub fn has_token(&self, token: &str) -> bool {
        self.tokens.iter().any(|t| t == token)
    }
}

/// Client-facing view of a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub age: i32,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<&User> for PublicUser {
    fn from(u: &User) -> Self {
        Self {
            id: u.id,
            name: u.name.clone(),
            email: u.email.clone(),
            age: u.age,
            created_at: u.created_at,
            updated_at: u.updated_at,
        }
    }
}

use serde_json::{Map, Value};
use time::OffsetDateTime;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{repo_types::User, validation};
use crate::{
    auth::{password::hash_password, tokens},
    errors::{AccountError, FieldError},
    mail,
    state::AppState,
};

/// The only fields a profile update may touch.
pub const ALLOWED_UPDATES: [&str; 4] = ["name", "email", "password", "age"];

#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
    pub age: Option<i32>,
}

fn text_field(body: &Map<String, Value>, field: &'static str, errors: &mut Vec<FieldError>) -> String {
    match body.get(field) {
        None | Some(Value::Null) => String::new(),
        Some(v) => validation::string_value(field, v).unwrap_or_else(|e| {
            errors.push(e);
            String::new()
        }),
    }
}

impl NewUser {
    /// Reads a registration body. Missing fields are left empty for `save` to
    /// report; values of the wrong type are reported here, per field.
    pub fn from_json(body: &Map<String, Value>) -> Result<Self, AccountError> {
        let mut errors = Vec::new();
        let name = text_field(body, "name", &mut errors);
        let email = text_field(body, "email", &mut errors);
        let password = text_field(body, "password", &mut errors);
        let age = match body.get("age") {
            None | Some(Value::Null) => None,
            Some(v) => validation::age_value(v).map_err(|e| errors.push(e)).ok(),
        };
        if !errors.is_empty() {
            return Err(AccountError::ValidationFailed(errors));
        }
        Ok(Self { name, email, password, age })
    }
}

/// Normalizes, validates, hashes a changed password and persists the record.
/// Nothing is written when any field is rejected.
pub async fn save(st: &AppState, user: &mut User) -> Result<(), AccountError> {
    validation::normalize(user);
    let mut errors = validation::check(user);

    if !errors.iter().any(|e| e.field == "email") {
        if let Some(other) = st.users.find_by_email(&user.email).await? {
            if other.id != user.id {
                errors.push(FieldError::new("email", "is already registered"));
            }
        }
    }
    if !errors.is_empty() {
        warn!(user_id = %user.id, fields = ?errors.iter().map(|e| e.field).collect::<Vec<_>>(), "user rejected");
        return Err(AccountError::ValidationFailed(errors));
    }

    // a stored user always has a hash; an empty one means this is the first insert
    let inserting = user.password_hash.is_empty();
    let rehashed = match user.pending_password.take() {
        Some(plain) => {
            user.password_hash = hash_password(&plain)?;
            true
        }
        None => false,
    };
    user.updated_at = OffsetDateTime::now_utc();
    st.users.save(user).await?;
    if rehashed && !inserting {
        st.users.set_password_hash(user.id, &user.password_hash).await?;
    }
    Ok(())
}

pub async fn register(st: &AppState, new: NewUser) -> Result<(User, String), AccountError> {
    let mut user = User::new(&new.name, &new.email, &new.password);
    if let Some(age) = new.age {
        user.age = age;
    }
    save(st, &mut user).await?;

    mail::dispatch(st.mailer.clone(), mail::welcome(&user.email, &user.name));

    let token = tokens::issue(st, &mut user).await?;
    info!(user_id = %user.id, "user registered");
    Ok((user, token))
}

/// Applies a client patch. Any key outside [`ALLOWED_UPDATES`] rejects the
/// whole patch before a single field is changed.
pub async fn update_profile(
    st: &AppState,
    mut user: User,
    patch: &Map<String, Value>,
) -> Result<User, AccountError> {
    let invalid: Vec<String> = patch
        .keys()
        .filter(|k| !ALLOWED_UPDATES.contains(&k.as_str()))
        .cloned()
        .collect();
    if !invalid.is_empty() {
        warn!(user_id = %user.id, ?invalid, "update with disallowed fields");
        return Err(AccountError::InvalidUpdateFields(invalid));
    }

    let mut errors = Vec::new();
    for (key, value) in patch {
        let applied = match key.as_str() {
            "name" => validation::string_value("name", value).map(|v| user.name = v),
            "email" => validation::string_value("email", value).map(|v| user.email = v),
            "password" => validation::string_value("password", value).map(|v| user.set_password(&v)),
            "age" => validation::age_value(value).map(|v| user.age = v),
            _ => Ok(()),
        };
        if let Err(e) = applied {
            errors.push(e);
        }
    }
    // `user` is a local copy; nothing above reaches the store
    if !errors.is_empty() {
        return Err(AccountError::ValidationFailed(errors));
    }

    save(st, &mut user).await?;
    info!(user_id = %user.id, fields = ?patch.keys().collect::<Vec<_>>(), "profile updated");
    Ok(user)
}

/// Removes every task owned by `user`, then the user record.
///
/// If the tasks cannot be removed the user is left untouched. A failure after
/// the tasks are gone leaves the user in place, and retrying finishes the job.
pub async fn delete_user_and_tasks(st: &AppState, user: &User) -> Result<(), AccountError> {
    let removed = st.tasks.delete_by_owner(user.id).await.map_err(|e| {
        error!(error = %e, user_id = %user.id, "owned task deletion failed");
        AccountError::CascadeDeleteFailed(format!("{e:#}"))
    })?;

    if !st.users.delete(user.id).await? {
        return Err(AccountError::UserNotFound);
    }
    info!(user_id = %user.id, tasks = removed, "user and owned tasks deleted");
    Ok(())
}

/// Account deletion as seen by the client: cascade, then a best-effort goodbye.
pub async fn delete_account(st: &AppState, user: User) -> Result<User, AccountError> {
    delete_user_and_tasks(st, &user).await?;
    mail::dispatch(st.mailer.clone(), mail::goodbye(&user.email, &user.name));
    Ok(user)
}

pub async fn set_avatar(st: &AppState, user: &User, png: Vec<u8>) -> Result<(), AccountError> {
    st.users.set_avatar(user.id, Some(&png)).await?;
    info!(user_id = %user.id, bytes = png.len(), "avatar stored");
    Ok(())
}

pub async fn clear_avatar(st: &AppState, user: &User) -> Result<(), AccountError> {
    st.users.set_avatar(user.id, None).await?;
    info!(user_id = %user.id, "avatar cleared");
    Ok(())
}

pub async fn avatar_of(st: &AppState, id: Uuid) -> Result<Vec<u8>, AccountError> {
    st.users
        .find_by_id(id)
        .await?
        .and_then(|u| u.avatar)
        .ok_or(AccountError::NotFound)
}

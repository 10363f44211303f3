use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use tracing::warn;

use super::tokens;
use crate::{errors::AccountError, state::AppState, users::repo_types::User};

/// Authenticated caller: the user record plus the exact token presented.
pub struct AuthUser {
    pub user: User,
    pub token: String,
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AccountError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Some(presented) = bearer_token(&parts.headers) else {
            warn!("missing or malformed Authorization header");
            return Err(AccountError::InvalidToken);
        };
        let (user, token) = tokens::validate(state, presented).await?;
        Ok(AuthUser { user, token })
    }
}

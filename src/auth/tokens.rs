//! Session tokens: stateless to verify, stateful to revoke.
//!
//! A token is accepted only when its signature verifies and the exact string is
//! still listed in the owner's active-token set.

use tracing::{debug, info};

use crate::{errors::AccountError, state::AppState, users::repo_types::User};

/// Signs a new token for `user` and appends it to the user's active set.
pub async fn issue(st: &AppState, user: &mut User) -> Result<String, AccountError> {
    let token = st.jwt.sign(user.id)?;
    st.users.push_token(user.id, &token).await?;
    user.tokens.push(token.clone());
    info!(user_id = %user.id, sessions = user.tokens.len(), "session issued");
    Ok(token)
}

/// Resolves a presented token to its user; returns the token alongside so the
/// caller can revoke that one session.
pub async fn validate(st: &AppState, token: &str) -> Result<(User, String), AccountError> {
    let claims = st.jwt.verify(token).map_err(|e| {
        debug!(error = %e, "token failed verification");
        AccountError::InvalidToken
    })?;

    let user = st
        .users
        .find_by_id(claims.sub)
        .await?
        .ok_or(AccountError::UserNotFound)?;

    if !user.has_token(token) {
        debug!(user_id = %user.id, "token no longer active");
        return Err(AccountError::TokenRevoked);
    }
    Ok((user, token.to_string()))
}

/// Removes one token; unknown tokens are ignored.
pub async fn revoke(st: &AppState, user: &mut User, token: &str) -> Result<(), AccountError> {
    st.users.pull_token(user.id, token).await?;
    user.tokens.retain(|t| t != token);
    info!(user_id = %user.id, "session revoked");
    Ok(())
}

pub async fn revoke_all(st: &AppState, user: &mut User) -> Result<(), AccountError> {
    st.users.clear_tokens(user.id).await?;
    user.tokens.clear();
    info!(user_id = %user.id, "all sessions revoked");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::services::save;

    async fn stored_user(st: &AppState) -> User {
        let mut user = User::new("Ada", "ada@x.com", "supersecret1");
        save(st, &mut user).await.expect("save");
        user
    }

    #[tokio::test]
    async fn each_issue_yields_a_distinct_valid_token() {
        let st = AppState::fake();
        let mut user = stored_user(&st).await;

        let a = issue(&st, &mut user).await.unwrap();
        let b = issue(&st, &mut user).await.unwrap();
        assert_ne!(a, b);

        let (by_a, echoed) = validate(&st, &a).await.unwrap();
        assert_eq!(by_a.id, user.id);
        assert_eq!(echoed, a);
        assert_eq!(validate(&st, &b).await.unwrap().0.id, user.id);
    }

    #[tokio::test]
    async fn revoke_only_affects_the_given_token() {
        let st = AppState::fake();
        let mut user = stored_user(&st).await;
        let a = issue(&st, &mut user).await.unwrap();
        let b = issue(&st, &mut user).await.unwrap();

        revoke(&st, &mut user, &a).await.unwrap();

        assert!(matches!(validate(&st, &a).await, Err(AccountError::TokenRevoked)));
        assert!(validate(&st, &b).await.is_ok());
    }

    #[tokio::test]
    async fn revoking_an_absent_token_is_a_no_op() {
        let st = AppState::fake();
        let mut user = stored_user(&st).await;
        let a = issue(&st, &mut user).await.unwrap();

        revoke(&st, &mut user, "never-issued").await.unwrap();
        revoke(&st, &mut user, "never-issued").await.unwrap();

        assert!(validate(&st, &a).await.is_ok());
    }

    #[tokio::test]
    async fn revoke_all_invalidates_every_session() {
        let st = AppState::fake();
        let mut user = stored_user(&st).await;
        let tokens = vec![
            issue(&st, &mut user).await.unwrap(),
            issue(&st, &mut user).await.unwrap(),
            issue(&st, &mut user).await.unwrap(),
        ];

        revoke_all(&st, &mut user).await.unwrap();

        for t in tokens {
            assert!(matches!(validate(&st, &t).await, Err(AccountError::TokenRevoked)));
        }
    }

    #[tokio::test]
    async fn garbage_and_foreign_tokens_are_invalid() {
        let st = AppState::fake();
        assert!(matches!(validate(&st, "not.a.jwt").await, Err(AccountError::InvalidToken)));

        let other = crate::auth::jwt::JwtKeys::from_config(&crate::config::JwtConfig {
            secret: "someone-else".into(),
            issuer: "test".into(),
            audience: "test".into(),
            ttl_minutes: 5,
        });
        let forged = other.sign(uuid::Uuid::new_v4()).unwrap();
        assert!(matches!(validate(&st, &forged).await, Err(AccountError::InvalidToken)));
    }

    #[tokio::test]
    async fn expired_token_fails_like_a_forged_one() {
        let st = AppState::fake();
        let user = stored_user(&st).await;
        let issued = time::OffsetDateTime::now_utc() - time::Duration::days(1);
        let expired = st.jwt.sign_at(user.id, issued).unwrap();
        st.users.push_token(user.id, &expired).await.unwrap();

        assert!(matches!(validate(&st, &expired).await, Err(AccountError::InvalidToken)));
    }

    #[tokio::test]
    async fn token_of_deleted_user_reports_user_not_found() {
        let st = AppState::fake();
        let mut user = stored_user(&st).await;
        let token = issue(&st, &mut user).await.unwrap();
        st.users.delete(user.id).await.unwrap();

        assert!(matches!(validate(&st, &token).await, Err(AccountError::UserNotFound)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_logins_keep_both_tokens() {
        let st = AppState::fake();
        let user = stored_user(&st).await;

        let (mut u1, mut u2) = (user.clone(), user.clone());
        let (s1, s2) = (st.clone(), st.clone());
        let h1 = tokio::spawn(async move { issue(&s1, &mut u1).await });
        let h2 = tokio::spawn(async move { issue(&s2, &mut u2).await });
        let t1 = h1.await.unwrap().unwrap();
        let t2 = h2.await.unwrap().unwrap();

        let stored = st.users.find_by_id(user.id).await.unwrap().unwrap();
        assert!(stored.has_token(&t1));
        assert!(stored.has_token(&t2));
    }
}

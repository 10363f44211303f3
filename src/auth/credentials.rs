use tracing::warn;

use super::password::verify_password;
use crate::{errors::AccountError, state::AppState, users::repo_types::User, users::validation};

/// Looks up the user behind an email/password pair.
///
/// Unknown email and wrong password fail the same way so the response does not
/// reveal which accounts exist.
pub async fn find_by_credentials(
    st: &AppState,
    email: &str,
    password: &str,
) -> Result<User, AccountError> {
    let email = validation::normalize_email(email);

    let Some(user) = st.users.find_by_email(&email).await? else {
        warn!("login for unknown email");
        return Err(AccountError::AuthenticationFailed);
    };

    if !verify_password(password, &user.password_hash)? {
        warn!(user_id = %user.id, "login with wrong password");
        return Err(AccountError::AuthenticationFailed);
    }

    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::services::{register, NewUser};

    async fn seeded() -> AppState {
        let st = AppState::fake();
        register(
            &st,
            NewUser {
                name: "Ada".into(),
                email: "ada@x.com".into(),
                password: "supersecret1".into(),
                age: None,
            },
        )
        .await
        .expect("register");
        st
    }

    #[tokio::test]
    async fn matching_credentials_return_the_user() {
        let st = seeded().await;
        let user = find_by_credentials(&st, "  ADA@x.com ", "supersecret1").await.unwrap();
        assert_eq!(user.name, "Ada");
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_email_fail_identically() {
        let st = seeded().await;
        let wrong_pw = find_by_credentials(&st, "ada@x.com", "nope-nope").await.unwrap_err();
        let unknown = find_by_credentials(&st, "eve@x.com", "supersecret1").await.unwrap_err();
        assert!(matches!(wrong_pw, AccountError::AuthenticationFailed));
        assert!(matches!(unknown, AccountError::AuthenticationFailed));
        assert_eq!(wrong_pw.to_string(), unknown.to_string());
    }
}

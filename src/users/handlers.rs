use axum::{
    extract::{
        multipart::MultipartError, rejection::JsonRejection, DefaultBodyLimit, Multipart, Path, State,
    },
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::{Map, Value};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::{
    dto::{AuthResponse, LoginRequest},
    repo_types::PublicUser,
    services::{self, NewUser},
};
use crate::{
    auth::{credentials::find_by_credentials, extractors::AuthUser, tokens},
    errors::AccountError,
    images::services::{check_upload, normalize_avatar, MAX_AVATAR_BYTES},
    state::AppState,
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", post(register))
        .route("/users/login", post(login))
        .route("/users/logout", post(logout))
        .route("/users/logoutAll", post(logout_all))
        .route("/users/me", get(get_me).patch(update_me).delete(delete_me))
        .route(
            "/users/me/avatar",
            post(upload_avatar)
                .delete(delete_avatar)
                // leave room for multipart framing so oversize files hit the explicit check
                .layer(DefaultBodyLimit::max(2 * MAX_AVATAR_BYTES)),
        )
        .route("/users/:id/avatar", get(get_avatar))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<Map<String, Value>>, JsonRejection>,
) -> Result<(StatusCode, Json<AuthResponse>), AccountError> {
    let Json(body) = payload?;
    let (user, token) = services::register(&state, NewUser::from_json(&body)?).await?;
    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            user: PublicUser::from(&user),
            token,
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>, AccountError> {
    let Json(payload) = payload?;
    let mut user = find_by_credentials(&state, &payload.email, &payload.password).await?;
    let token = tokens::issue(&state, &mut user).await?;
    info!(user_id = %user.id, "user logged in");
    Ok(Json(AuthResponse {
        user: PublicUser::from(&user),
        token,
    }))
}

#[instrument(skip_all)]
pub async fn logout(
    State(state): State<AppState>,
    AuthUser { mut user, token }: AuthUser,
) -> Result<StatusCode, AccountError> {
    tokens::revoke(&state, &mut user, &token).await?;
    Ok(StatusCode::OK)
}

#[instrument(skip_all)]
pub async fn logout_all(
    State(state): State<AppState>,
    AuthUser { mut user, .. }: AuthUser,
) -> Result<StatusCode, AccountError> {
    tokens::revoke_all(&state, &mut user).await?;
    Ok(StatusCode::OK)
}

pub async fn get_me(AuthUser { user, .. }: AuthUser) -> Json<PublicUser> {
    Json(PublicUser::from(&user))
}

#[instrument(skip_all)]
pub async fn update_me(
    State(state): State<AppState>,
    AuthUser { user, .. }: AuthUser,
    patch: Result<Json<Map<String, Value>>, JsonRejection>,
) -> Result<Json<PublicUser>, AccountError> {
    let Json(patch) = patch?;
    let user = services::update_profile(&state, user, &patch).await?;
    Ok(Json(PublicUser::from(&user)))
}

#[instrument(skip_all)]
pub async fn delete_me(
    State(state): State<AppState>,
    AuthUser { user, .. }: AuthUser,
) -> Result<Json<PublicUser>, AccountError> {
    let user = services::delete_account(&state, user).await?;
    Ok(Json(PublicUser::from(&user)))
}

fn rejected_multipart(e: MultipartError) -> AccountError {
    warn!(error = %e, "unreadable avatar upload");
    AccountError::UploadRejected(e.body_text())
}

/// POST /users/me/avatar, multipart field `avatar`.
#[instrument(skip_all)]
pub async fn upload_avatar(
    State(state): State<AppState>,
    AuthUser { user, .. }: AuthUser,
    mut multipart: Multipart,
) -> Result<&'static str, AccountError> {
    let mut upload = None;
    while let Some(field) = multipart.next_field().await.map_err(rejected_multipart)? {
        if field.name() != Some("avatar") {
            continue;
        }
        let file_name = field.file_name().map(str::to_owned);
        let data = field.bytes().await.map_err(rejected_multipart)?;
        upload = Some((file_name, data));
        break;
    }
    let Some((file_name, data)) = upload else {
        return Err(AccountError::UploadRejected("Please upload an avatar".into()));
    };

    if let Err(e) = check_upload(file_name.as_deref(), data.len()) {
        warn!(user_id = %user.id, file_name = ?file_name, size = data.len(), "avatar rejected");
        return Err(e);
    }
    let png = normalize_avatar(data).await?;
    services::set_avatar(&state, &user, png).await?;
    Ok("File uploaded")
}

#[instrument(skip_all)]
pub async fn delete_avatar(
    State(state): State<AppState>,
    AuthUser { user, .. }: AuthUser,
) -> Result<StatusCode, AccountError> {
    services::clear_avatar(&state, &user).await?;
    Ok(StatusCode::OK)
}

#[instrument(skip(state))]
pub async fn get_avatar(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AccountError> {
    let id = Uuid::parse_str(&id).map_err(|_| AccountError::NotFound)?;
    let png = services::avatar_of(&state, id).await?;
    Ok(([(header::CONTENT_TYPE, "image/png")], png))
}

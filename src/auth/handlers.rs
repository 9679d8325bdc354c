use axum::{
    extract::{
        multipart::MultipartRejection,
        rejection::{JsonRejection, PathRejection},
        DefaultBodyLimit, FromRef, Multipart, Path, State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::{
    dto::{LoginRequest, ProfileImageResponse, ProfileResponse, SessionPayload, SignupRequest},
    email::normalize_email,
    extractors::AuthUser,
    jwt::JwtKeys,
    password::{hash_password, verify_password},
    services::{create_account, session_for},
};
use crate::{
    error::{AppError, AppResult, Envelope},
    state::AppState,
    store::{AuthProvider, NewUser},
};

const MIN_PASSWORD_LEN: usize = 8;
const MAX_USERNAME_LEN: usize = 64;
const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
}

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users/:user_id", get(get_user_info))
        .route(
            "/users/:user_id/profile_image",
            post(update_profile_image).put(update_profile_image),
        )
        .layer(DefaultBodyLimit::max(MAX_IMAGE_BYTES))
}

/// Serves uploaded profile images at the URL stored on the user record.
pub fn static_routes() -> Router<AppState> {
    Router::new().route(
        "/server/static/:user_id/profile_image.png",
        get(profile_image_file),
    )
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn invalid_email(e: impl std::fmt::Display) -> AppError {
    AppError::bad_request(format!("Invalid email: {}", e))
}

#[instrument(skip(state, payload))]
pub async fn signup(
    State(state): State<AppState>,
    payload: Result<Json<SignupRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<Envelope<SessionPayload>>)> {
    let Json(payload) = payload?;
    let (Some(email), Some(password), Some(username)) = (
        present(payload.email),
        present(payload.password),
        present(payload.username),
    ) else {
        warn!("signup with missing fields");
        return Err(AppError::bad_request(
            "Email and password and username are required",
        ));
    };

    let email = normalize_email(&email).map_err(|e| {
        warn!(error = %e, "invalid email");
        invalid_email(e)
    })?;

    let username = username.trim();
    if username.chars().count() > MAX_USERNAME_LEN {
        return Err(AppError::bad_request("Username too long"));
    }
    if password.len() < MIN_PASSWORD_LEN {
        warn!("password too short");
        return Err(AppError::bad_request("Password too short"));
    }

    if state.store.find_user_by_email(&email).await?.is_some() {
        warn!(email = %email, "email already registered");
        return Err(AppError::Conflict("Email already exists".into()));
    }

    let hash = hash_password(&password)?;
    let user = create_account(
        &state,
        NewUser {
            id: Uuid::new_v4(),
            username,
            email: &email,
            password_hash: Some(&hash),
            provider: AuthProvider::Password,
        },
    )
    .await?;

    let session = session_for(&JwtKeys::from_ref(&state), &user)?;
    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok((
        StatusCode::CREATED,
        Envelope::ok("User added successfully", session),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> AppResult<Json<Envelope<SessionPayload>>> {
    let Json(payload) = payload?;
    let (Some(email), Some(password)) = (present(payload.email), present(payload.password)) else {
        return Err(AppError::bad_request("Email and password are required"));
    };

    let email = normalize_email(&email).map_err(|e| {
        warn!(error = %e, "invalid email");
        invalid_email(e)
    })?;

    let Some(user) = state.store.find_user_by_email(&email).await? else {
        warn!(email = %email, "login unknown email");
        return Err(AppError::NotFound("User not found".into()));
    };

    let Some(stored_hash) = user.password_hash.as_deref() else {
        warn!(user_id = %user.id, provider = %user.provider, "password login on federated account");
        return Err(AppError::unauthorized(
            "This account signs in with Google",
        ));
    };

    if !verify_password(&password, stored_hash)? {
        warn!(email = %email, user_id = %user.id, "login invalid password");
        return Err(AppError::unauthorized("Invalid credentials"));
    }

    let session = session_for(&JwtKeys::from_ref(&state), &user)?;
    info!(user_id = %user.id, email = %user.email, "user logged in");
    Ok(Envelope::ok("Login successful", session))
}

#[instrument(skip(state))]
pub async fn get_user_info(
    State(state): State<AppState>,
    user_id: Result<Path<Uuid>, PathRejection>,
) -> AppResult<Json<Envelope<ProfileResponse>>> {
    let Path(user_id) = user_id?;
    let user = state
        .store
        .find_user_by_id(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    Ok(Envelope::ok(
        "Data retrieval successful",
        ProfileResponse {
            username: user.username,
            email: user.email,
            image_url: user.image_url,
        },
    ))
}

/// Multipart upload, field `profile_image`. Only the owner may replace it.
#[instrument(skip(state, multipart))]
pub async fn update_profile_image(
    State(state): State<AppState>,
    AuthUser(current_user): AuthUser,
    user_id: Result<Path<Uuid>, PathRejection>,
    multipart: Result<Multipart, MultipartRejection>,
) -> AppResult<Json<Envelope<ProfileImageResponse>>> {
    let Path(user_id) = user_id?;
    if current_user != user_id {
        warn!(%current_user, target = %user_id, "profile image update for another user");
        return Err(AppError::Forbidden(
            "You can only update your own profile image".into(),
        ));
    }

    let mut multipart = multipart?;
    let mut image = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some("profile_image") {
            image = Some(field.bytes().await?);
            break;
        }
    }
    let image = image
        .filter(|b| !b.is_empty())
        .ok_or_else(|| AppError::bad_request("profile_image is required"))?;

    let image_url = state.storage.put_profile_image(user_id, image).await?;
    if !state.store.set_image_url(user_id, &image_url).await? {
        return Err(AppError::NotFound("User not found".into()));
    }

    info!(%user_id, "profile image updated");
    Ok(Envelope::ok(
        "Image updated successfully",
        ProfileImageResponse { image_url },
    ))
}

#[instrument(skip(state))]
pub async fn profile_image_file(
    State(state): State<AppState>,
    user_id: Result<Path<Uuid>, PathRejection>,
) -> AppResult<Response> {
    let Path(user_id) = user_id?;
    let body = state
        .storage
        .read_profile_image(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Image not found".into()))?;
    Ok(([(header::CONTENT_TYPE, "image/png")], body).into_response())
}

//! Login, token verification and password change.

use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::error::HttpError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct UserView {
    pub id: i64,
    pub username: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserView,
}

/// `POST /api/auth/login`
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, HttpError> {
    if req.username.is_empty() || req.password.is_empty() {
        return Err(HttpError::BadRequest(
            "Username and password required".to_string(),
        ));
    }

    let user = state
        .users
        .verify(&req.username, &req.password)
        .await?
        .ok_or_else(|| HttpError::Unauthorized("Invalid credentials".to_string()))?;

    let token = state.auth.issue(&user)?;
    Ok(Json(LoginResponse {
        token,
        user: UserView {
            id: user.id,
            username: user.username,
        },
    }))
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub user: crate::auth::Claims,
}

/// `GET /api/auth/verify`
pub async fn verify(AuthUser(claims): AuthUser) -> Json<VerifyResponse> {
    Json(VerifyResponse { user: claims })
}

#[derive(Debug, Deserialize)]
pub struct PasswordChangeRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Serialize)]
pub struct OkResponse {
    pub success: bool,
}

/// `POST /api/auth/password`
pub async fn change_password(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Json(req): Json<PasswordChangeRequest>,
) -> Result<Json<OkResponse>, HttpError> {
    if req.current_password.is_empty() || req.new_password.is_empty() {
        return Err(HttpError::BadRequest(
            "Current and new password required".to_string(),
        ));
    }

    let changed = state
        .users
        .change_password(claims.user_id, &req.current_password, &req.new_password)
        .await?;
    if !changed {
        return Err(HttpError::BadRequest(
            "Current password is incorrect".to_string(),
        ));
    }
    Ok(Json(OkResponse { success: true }))
}

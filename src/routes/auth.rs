use axum::{
    extract::State,
    http::{header::SET_COOKIE, HeaderMap, HeaderValue, StatusCode},
    Json,
};
use diesel::{prelude::*, result::DatabaseErrorKind};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::{
    auth::{password, AuthenticatedUser, AUTH_COOKIE_NAME, ROLES},
    error::{AppError, AppResult},
    models::{NewUser, User},
    schema::users,
    state::AppState,
};

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub role: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct SessionUser {
    pub id: Uuid,
    pub username: String,
    pub role: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub user: SessionUser,
    pub message: &'static str,
}

pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    if payload.username.trim().is_empty() || payload.password.is_empty() {
        return Err(AppError::bad_request("please fill in all required fields"));
    }
    if !ROLES.contains(&payload.role.as_str()) {
        return Err(AppError::bad_request(format!(
            "invalid role '{}'. Allowed roles: {}",
            payload.role,
            ROLES.join(", ")
        )));
    }

    let mut conn = state.db()?;
    let new_user = NewUser {
        id: Uuid::new_v4(),
        username: payload.username.trim().to_string(),
        password_hash: password::hash_password(&payload.password)?,
        role: payload.role,
        first_name: None,
        last_name: None,
    };

    match diesel::insert_into(users::table)
        .values(&new_user)
        .execute(&mut conn)
    {
        Ok(_) => {}
        Err(diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
            return Err(AppError::conflict("user already exists"));
        }
        Err(err) => return Err(AppError::from(err)),
    }

    info!(username = %new_user.username, "user registered");
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "User created successfully" })),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<(HeaderMap, Json<LoginResponse>)> {
    let mut conn = state.db()?;

    let user: User = users::table
        .filter(users::username.eq(&payload.username))
        .first(&mut conn)
        .optional()?
        .ok_or_else(AppError::unauthorized)?;

    let valid = password::verify_password(&payload.password, &user.password_hash)
        .map_err(|_| AppError::unauthorized())?;
    if !valid {
        return Err(AppError::unauthorized());
    }

    let token = state.jwt.generate_token(user.id, &user.role)?;

    let mut headers = HeaderMap::new();
    headers.insert(SET_COOKIE, build_auth_cookie(&state, &token));

    info!(username = %user.username, role = %user.role, "login succeeded");
    Ok((
        headers,
        Json(LoginResponse {
            user: SessionUser {
                id: user.id,
                username: user.username,
                role: user.role,
            },
            message: "Logged in successfully",
        }),
    ))
}

pub async fn logout(State(state): State<AppState>) -> AppResult<(HeaderMap, Json<Value>)> {
    let mut headers = HeaderMap::new();
    headers.insert(SET_COOKIE, build_clear_auth_cookie(&state));
    Ok((headers, Json(json!({ "message": "Logged out successfully" }))))
}

pub async fn verify(user: AuthenticatedUser) -> Json<Value> {
    Json(json!({ "user": { "id": user.user_id, "role": user.role } }))
}

pub async fn me(user: AuthenticatedUser) -> Json<Value> {
    Json(json!({ "user": { "id": user.user_id, "role": user.role } }))
}

fn build_auth_cookie(state: &AppState, token: &str) -> HeaderValue {
    let max_age = state.jwt.expiry_seconds();

    let mut parts = vec![format!("{}={}", AUTH_COOKIE_NAME, token)];
    parts.push("Path=/".into());
    parts.push("HttpOnly".into());
    parts.push("SameSite=Strict".into());
    parts.push(format!("Max-Age={}", max_age));
    if state.config.auth_cookie_secure {
        parts.push("Secure".into());
    }
    if let Some(domain) = &state.config.auth_cookie_domain {
        parts.push(format!("Domain={}", domain));
    }

    HeaderValue::from_str(&parts.join("; ")).expect("valid auth cookie")
}

fn build_clear_auth_cookie(state: &AppState) -> HeaderValue {
    let mut parts = vec![format!("{}=", AUTH_COOKIE_NAME)];
    parts.push("Path=/".into());
    parts.push("HttpOnly".into());
    parts.push("SameSite=Strict".into());
    parts.push("Max-Age=0".into());
    parts.push("Expires=Thu, 01 Jan 1970 00:00:00 GMT".into());
    if state.config.auth_cookie_secure {
        parts.push("Secure".into());
    }
    if let Some(domain) = &state.config.auth_cookie_domain {
        parts.push(format!("Domain={}", domain));
    }

    HeaderValue::from_str(&parts.join("; ")).expect("valid auth cookie")
}

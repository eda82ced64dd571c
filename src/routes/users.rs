use axum::extract::{Json, Path, State};
use axum::http::StatusCode;
use chrono::Utc;
use diesel::{dsl::count_star, prelude::*, result::DatabaseErrorKind};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{password, AuthenticatedUser, ROLES};
use crate::error::{AppError, AppResult};
use crate::models::{NewUser, User};
use crate::schema::users;
use crate::state::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: Uuid,
    pub username: String,
    pub role: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            role: user.role,
            first_name: user.first_name,
            last_name: user.last_name,
        }
    }
}

#[derive(Serialize)]
pub struct UserEnvelope {
    pub message: &'static str,
    pub user: UserResponse,
}

#[derive(Serialize)]
pub struct CountResponse {
    pub count: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub username: String,
    pub password: String,
    pub role: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub username: Option<String>,
    pub role: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

fn validate_role(role: &str) -> AppResult<()> {
    if ROLES.contains(&role) {
        Ok(())
    } else {
        Err(AppError::bad_request(format!(
            "invalid role '{role}'. Allowed roles: {}",
            ROLES.join(", ")
        )))
    }
}

pub async fn list_users(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<UserResponse>>> {
    user.require_admin()?;
    let mut conn = state.db()?;

    // password hashes never leave the directory
    let all: Vec<User> = users::table.order(users::username.asc()).load(&mut conn)?;
    Ok(Json(all.into_iter().map(UserResponse::from).collect()))
}

pub async fn count_users(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<CountResponse>> {
    user.require_admin()?;
    let mut conn = state.db()?;
    let count: i64 = users::table.select(count_star()).first(&mut conn)?;
    Ok(Json(CountResponse { count }))
}

pub async fn create_user(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateUserRequest>,
) -> AppResult<(StatusCode, Json<UserEnvelope>)> {
    user.require_admin()?;

    if payload.username.trim().is_empty() || payload.password.is_empty() {
        return Err(AppError::bad_request("username and password are required"));
    }
    validate_role(&payload.role)?;

    let mut conn = state.db()?;
    let new_user = NewUser {
        id: Uuid::new_v4(),
        username: payload.username.trim().to_string(),
        password_hash: password::hash_password(&payload.password)?,
        role: payload.role,
        first_name: payload.first_name.filter(|v| !v.trim().is_empty()),
        last_name: payload.last_name.filter(|v| !v.trim().is_empty()),
    };

    match diesel::insert_into(users::table)
        .values(&new_user)
        .execute(&mut conn)
    {
        Ok(_) => {}
        Err(diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
            return Err(AppError::conflict("username already exists"));
        }
        Err(err) => return Err(AppError::from(err)),
    }

    let created: User = users::table.find(new_user.id).first(&mut conn)?;
    Ok((
        StatusCode::CREATED,
        Json(UserEnvelope {
            message: "User created successfully",
            user: created.into(),
        }),
    ))
}

pub async fn update_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    user: AuthenticatedUser,
    Json(payload): Json<UpdateUserRequest>,
) -> AppResult<Json<UserEnvelope>> {
    user.require_admin()?;
    let mut conn = state.db()?;

    let existing: User = users::table.find(user_id).first(&mut conn)?;

    // provided-or-keep semantics; empty strings are treated as absent
    let username = payload
        .username
        .filter(|v| !v.trim().is_empty())
        .map(|v| v.trim().to_string())
        .unwrap_or(existing.username);
    let role = match payload.role.filter(|v| !v.trim().is_empty()) {
        Some(role) => {
            validate_role(&role)?;
            role
        }
        None => existing.role,
    };
    let first_name = payload
        .first_name
        .filter(|v| !v.trim().is_empty())
        .or(existing.first_name);
    let last_name = payload
        .last_name
        .filter(|v| !v.trim().is_empty())
        .or(existing.last_name);

    let update_result = diesel::update(users::table.find(user_id)).set((
        users::username.eq(&username),
        users::role.eq(&role),
        users::first_name.eq(&first_name),
        users::last_name.eq(&last_name),
        users::updated_at.eq(Utc::now().naive_utc()),
    ));

    match update_result.execute(&mut conn) {
        Ok(_) => {}
        Err(diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
            return Err(AppError::conflict("username already exists"));
        }
        Err(err) => return Err(AppError::from(err)),
    }

    let updated: User = users::table.find(user_id).first(&mut conn)?;
    Ok(Json(UserEnvelope {
        message: "User updated successfully",
        user: updated.into(),
    }))
}

pub async fn delete_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<Json<serde_json::Value>> {
    user.require_admin()?;
    let mut conn = state.db()?;

    // no cascade: work orders submitted by this user keep their weak reference
    let deleted = diesel::delete(users::table.find(user_id)).execute(&mut conn)?;
    if deleted == 0 {
        return Err(AppError::not_found());
    }

    Ok(Json(
        serde_json::json!({ "message": "User deleted successfully" }),
    ))
}

pub mod jwt;
pub mod password;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use axum_extra::headers::Cookie;
use axum_extra::TypedHeader;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{error::AppError, state::AppState};

pub const AUTH_COOKIE_NAME: &str = "token";

pub const ROLE_ADMIN: &str = "Admin";
pub const ROLE_TECHNICIAN: &str = "Technician";
pub const ROLE_TENANT: &str = "Tenant";

pub const ROLES: &[&str] = &[ROLE_ADMIN, ROLE_TECHNICIAN, ROLE_TENANT];

/// Principal extracted from the HTTP-only session cookie.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub role: String,
}

impl AuthenticatedUser {
    /// Admins pass every gate; everyone else must be in the allow list.
    pub fn require_role(&self, allowed: &[&str]) -> Result<(), AppError> {
        if self.role == ROLE_ADMIN || allowed.contains(&self.role.as_str()) {
            Ok(())
        } else {
            Err(AppError::forbidden())
        }
    }

    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.role == ROLE_ADMIN {
            Ok(())
        } else {
            Err(AppError::forbidden())
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(cookies) = TypedHeader::<Cookie>::from_request_parts(parts, state)
            .await
            .map_err(|_| AppError::unauthorized())?;

        let token = cookies
            .get(AUTH_COOKIE_NAME)
            .ok_or_else(AppError::unauthorized)?;

        let claims = state
            .jwt
            .verify_token(token)
            .map_err(|_| AppError::unauthorized())?;

        Ok(AuthenticatedUser {
            user_id: claims.sub,
            role: claims.role,
        })
    }
}

use axum::{extract::FromRequestParts, http::request::Parts};
use axum_extra::headers::{authorization::Bearer, Authorization};
use axum_extra::TypedHeader;
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::state::AppState;

pub const ADMIN_ROLE: &str = "ADMIN";

// ============================================================================
// JWT Claims
// ============================================================================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Numeric user id of the caller.
    pub sub: String,
    pub role: String,
    pub exp: usize,
}

/// Authenticated identity of the caller, taken from a bearer JWT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user_id: i64,
    pub role: String,
}

impl Caller {
    pub fn is_admin(&self) -> bool {
        self.role == ADMIN_ROLE
    }

    /// Admins act on any booking; everyone else only on their own.
    pub fn ensure_owner(&self, owner_id: i64) -> Result<(), AppError> {
        if self.is_admin() || self.user_id == owner_id {
            Ok(())
        } else {
            Err(AppError::AuthorizationError("Booking belongs to another user".to_string()))
        }
    }

    pub fn ensure_admin(&self) -> Result<(), AppError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(AppError::AuthorizationError("Admin role required".to_string()))
        }
    }
}

impl FromRequestParts<AppState> for Caller {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(caller) = parts.extensions.get::<Caller>() {
            return Ok(caller.clone());
        }

        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| AppError::AuthenticationError("Missing bearer token".to_string()))?;

        let token_data = decode::<Claims>(
            bearer.token(),
            &DecodingKey::from_secret(state.auth.secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|e| AppError::AuthenticationError(e.to_string()))?;

        let user_id = token_data
            .claims
            .sub
            .parse::<i64>()
            .map_err(|_| AppError::AuthenticationError("Subject is not a user id".to_string()))?;

        let caller = Caller {
            user_id,
            role: token_data.claims.role,
        };
        parts.extensions.insert(caller.clone());
        Ok(caller)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ownership_rules() {
        let guest = Caller { user_id: 5, role: "CUSTOMER".to_string() };
        let admin = Caller { user_id: 1, role: ADMIN_ROLE.to_string() };

        assert!(guest.ensure_owner(5).is_ok());
        assert!(guest.ensure_owner(6).is_err());
        assert!(guest.ensure_admin().is_err());
        assert!(admin.ensure_owner(6).is_ok());
        assert!(admin.ensure_admin().is_ok());
    }
}

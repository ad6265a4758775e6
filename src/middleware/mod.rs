use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, StatusCode},
};
use base64::{engine::general_purpose, Engine as _};
use std::sync::Arc;
use tracing::{error, warn};

use crate::models::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Manager,
    Admin,
}

impl Role {
    fn parse(raw: &str) -> Self {
        match raw {
            "admin" => Role::Admin,
            "manager" => Role::Manager,
            _ => Role::User,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: UserId,
    pub email: String,
    pub role: Role,
}

impl AuthUser {
    /// 403 unless the user holds one of `roles`.
    pub fn require(&self, roles: &[Role]) -> Result<(), StatusCode> {
        if roles.contains(&self.role) {
            Ok(())
        } else {
            Err(StatusCode::FORBIDDEN)
        }
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    email: String,
    password_hash: String,
    role: String,
}

/// Splits a `Basic` authorization header into (email, password).
fn basic_credentials(header_value: &str) -> Option<(String, String)> {
    let encoded = header_value.strip_prefix("Basic ")?;
    let decoded = general_purpose::STANDARD.decode(encoded).ok()?;
    let credentials = String::from_utf8(decoded).ok()?;
    let (email, password) = credentials.split_once(':')?;
    Some((email.to_string(), password.to_string()))
}

/// Runs the bcrypt check on the blocking pool. A stored hash bcrypt cannot
/// parse counts as a mismatch.
async fn password_matches(password: String, hash: String) -> Result<bool, StatusCode> {
    let outcome = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| {
            error!("password check task failed: {:?}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    match outcome {
        Ok(matches) => Ok(matches),
        Err(e) => {
            warn!("unreadable password hash: {}", e);
            Ok(false)
        }
    }
}

// Basic Auth extractor
impl FromRequestParts<Arc<crate::AppState>> for AuthUser {
    type Rejection = StatusCode;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<crate::AppState>,
    ) -> Result<Self, Self::Rejection> {
        let (email, password) = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(basic_credentials)
            .ok_or(StatusCode::UNAUTHORIZED)?;

        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, email, password_hash, role
             FROM users
             WHERE email = $1 AND is_active = true",
        )
        .bind(&email)
        .fetch_optional(&state.db.pool)
        .await
        .map_err(|e| {
            error!("auth lookup failed for {}: {:?}", email, e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

        let user = row.ok_or(StatusCode::UNAUTHORIZED)?;
        if !password_matches(password, user.password_hash).await? {
            return Err(StatusCode::UNAUTHORIZED);
        }

        Ok(AuthUser {
            user_id: user.id,
            email: user.email,
            role: Role::parse(&user.role),
        })
    }
}

/// Authenticated admin or manager.
pub struct StaffUser(pub AuthUser);

impl FromRequestParts<Arc<crate::AppState>> for StaffUser {
    type Rejection = StatusCode;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<crate::AppState>,
    ) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        user.require(&[Role::Admin, Role::Manager])?;
        Ok(StaffUser(user))
    }
}

pub struct AdminUser(pub AuthUser);

impl FromRequestParts<Arc<crate::AppState>> for AdminUser {
    type Rejection = StatusCode;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<crate::AppState>,
    ) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        user.require(&[Role::Admin])?;
        Ok(AdminUser(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_basic_credentials() {
        let header = format!("Basic {}", general_purpose::STANDARD.encode("ann@example.com:pa:ss"));
        assert_eq!(
            basic_credentials(&header),
            Some(("ann@example.com".to_string(), "pa:ss".to_string()))
        );
        assert_eq!(basic_credentials("Bearer abc"), None);
        assert_eq!(basic_credentials("Basic !!!"), None);
    }

    #[tokio::test]
    async fn passwords_are_checked_against_bcrypt_hashes() {
        let hash = bcrypt::hash("s3cret", 4).unwrap();
        assert_eq!(password_matches("s3cret".into(), hash.clone()).await, Ok(true));
        assert_eq!(password_matches("S3cret".into(), hash).await, Ok(false));
        assert_eq!(password_matches("s3cret".into(), "s3cret".into()).await, Ok(false));
    }

    #[test]
    fn role_gate() {
        let user = AuthUser { user_id: 1, email: "m@example.com".into(), role: Role::Manager };
        assert!(user.require(&[Role::Admin, Role::Manager]).is_ok());
        assert_eq!(user.require(&[Role::Admin]), Err(StatusCode::FORBIDDEN));
        assert_eq!(Role::parse("something"), Role::User);
    }
}

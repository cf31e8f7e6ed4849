//! Authentication and authorization.
//!
//! Two credential flavors coexist because deployed mobile clients cannot be
//! force-upgraded: Basic (email/password verified against the users table,
//! used by the legacy v1 sync protocol) and Bearer JWT (issued by the login
//! endpoint, accepted by the v2 protocol). Both reduce to an authenticated
//! identity plus a per-clinic capability set.

use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, SaltString};
use argon2::{Argon2, PasswordVerifier};
use axum::http::{header, HeaderMap};
use base64::Engine as _;
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::entities::{user, user_clinic_permission};
use crate::errors::ServiceError;

/// Claim structure for JWT tokens
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
}

const TOKEN_ISSUER: &str = "carebase-api";

/// The caller identity every protected handler works with.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: String,
}

/// Per-clinic capabilities, one column each on user_clinic_permissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    ManageInventory,
    ViewReports,
    Sync,
    ClinicAdmin,
}

/// Which credential flavors an endpoint accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialPolicy {
    /// Legacy protocol: Basic only.
    BasicOnly,
    /// Newer protocol: Bearer token, with Basic still honored.
    TokenOrBasic,
}

/// Resolve the Authorization header into a user, per the endpoint's policy.
pub async fn authenticate_request(
    db: &DatabaseConnection,
    config: &AppConfig,
    headers: &HeaderMap,
    policy: CredentialPolicy,
) -> Result<AuthenticatedUser, ServiceError> {
    let header_value = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            ServiceError::AuthError("Authorization header missing or invalid".to_string())
        })?;

    if let Some(encoded) = header_value.strip_prefix("Basic ") {
        return authenticate_basic(db, encoded).await;
    }

    if let Some(token) = header_value.strip_prefix("Bearer ") {
        if policy == CredentialPolicy::BasicOnly {
            return Err(ServiceError::AuthError(
                "this endpoint accepts Basic credentials only".to_string(),
            ));
        }
        return authenticate_token(db, config, token).await;
    }

    Err(ServiceError::AuthError(
        "unsupported Authorization scheme".to_string(),
    ))
}

async fn authenticate_basic(
    db: &DatabaseConnection,
    encoded: &str,
) -> Result<AuthenticatedUser, ServiceError> {
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|_| ServiceError::AuthError("invalid Basic credentials encoding".to_string()))?;
    let decoded = String::from_utf8(decoded)
        .map_err(|_| ServiceError::AuthError("invalid Basic credentials encoding".to_string()))?;

    let (email, password) = decoded
        .split_once(':')
        .ok_or_else(|| ServiceError::AuthError("invalid credentials format".to_string()))?;
    if email.is_empty() || password.is_empty() {
        return Err(ServiceError::AuthError(
            "invalid credentials format".to_string(),
        ));
    }

    sign_in(db, email, password).await
}

async fn authenticate_token(
    db: &DatabaseConnection,
    config: &AppConfig,
    token: &str,
) -> Result<AuthenticatedUser, ServiceError> {
    let mut validation = Validation::default();
    validation.set_issuer(&[TOKEN_ISSUER]);

    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &validation,
    )
    .map_err(|e| ServiceError::AuthError(format!("invalid token: {}", e)))?;

    let user_id = Uuid::parse_str(&data.claims.sub)
        .map_err(|_| ServiceError::AuthError("invalid token subject".to_string()))?;

    let record = user::Entity::find_by_id(user_id)
        .filter(user::Column::IsDeleted.eq(false))
        .one(db)
        .await?
        .ok_or_else(|| ServiceError::AuthError("user no longer exists".to_string()))?;

    Ok(AuthenticatedUser {
        id: record.id,
        email: record.email,
        name: record.name,
        role: record.role,
    })
}

/// Verify email/password against the users table.
pub async fn sign_in(
    db: &DatabaseConnection,
    email: &str,
    password: &str,
) -> Result<AuthenticatedUser, ServiceError> {
    let record = user::Entity::find()
        .filter(user::Column::Email.eq(email))
        .filter(user::Column::IsDeleted.eq(false))
        .one(db)
        .await?
        .ok_or_else(|| ServiceError::AuthError("invalid credentials".to_string()))?;

    let parsed = PasswordHash::new(&record.hashed_password)
        .map_err(|_| ServiceError::InternalError("corrupt password hash".to_string()))?;

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|_| ServiceError::AuthError("invalid credentials".to_string()))?;

    debug!(user = %record.id, "credentials verified");

    Ok(AuthenticatedUser {
        id: record.id,
        email: record.email,
        name: record.name,
        role: record.role,
    })
}

/// Issue a Bearer token for the v2 protocol.
pub fn issue_token(config: &AppConfig, user: &AuthenticatedUser) -> Result<String, ServiceError> {
    let now = Utc::now().timestamp();
    let claims = Claims {
        sub: user.id.to_string(),
        email: user.email.clone(),
        iat: now,
        exp: now + config.jwt_expiration as i64,
        iss: TOKEN_ISSUER.to_string(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .map_err(|e| ServiceError::InternalError(format!("failed to sign token: {}", e)))
}

/// Hash a password for storage. Used by user provisioning and test seeding.
pub fn hash_password(password: &str) -> Result<String, ServiceError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| ServiceError::InternalError(format!("failed to hash password: {}", e)))
}

/// Clinic ids where the user holds the capability.
pub async fn clinic_ids_with_capability(
    db: &DatabaseConnection,
    user_id: Uuid,
    capability: Capability,
) -> Result<Vec<Uuid>, ServiceError> {
    let column = match capability {
        Capability::ManageInventory => user_clinic_permission::Column::CanManageInventory,
        Capability::ViewReports => user_clinic_permission::Column::CanViewReports,
        Capability::Sync => user_clinic_permission::Column::CanSync,
        Capability::ClinicAdmin => user_clinic_permission::Column::IsClinicAdmin,
    };

    let rows = user_clinic_permission::Entity::find()
        .filter(user_clinic_permission::Column::UserId.eq(user_id))
        .filter(column.eq(true))
        .all(db)
        .await?;

    Ok(rows.into_iter().map(|r| r.clinic_id).collect())
}

/// Fail unless the user holds the capability for the clinic.
pub async fn require_clinic_capability(
    db: &DatabaseConnection,
    user: &AuthenticatedUser,
    clinic_id: Uuid,
    capability: Capability,
) -> Result<(), ServiceError> {
    let clinic_ids = clinic_ids_with_capability(db, user.id, capability).await?;
    if clinic_ids.contains(&clinic_id) {
        Ok(())
    } else {
        Err(ServiceError::Unauthorized(format!(
            "no {:?} permission for clinic {}",
            capability, clinic_id
        )))
    }
}

/// Fail unless the user holds the capability somewhere. Sync is not scoped
/// to a single clinic, so holding it for any clinic suffices.
pub async fn require_any_clinic_capability(
    db: &DatabaseConnection,
    user: &AuthenticatedUser,
    capability: Capability,
) -> Result<(), ServiceError> {
    let clinic_ids = clinic_ids_with_capability(db, user.id, capability).await?;
    if clinic_ids.is_empty() {
        Err(ServiceError::Unauthorized(format!(
            "no {:?} permission on any clinic",
            capability
        )))
    } else {
        Ok(())
    }
}

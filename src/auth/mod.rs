/*!
 * # Authentication and Authorization Module
 *
 * HS256 JWT bearer tokens carrying the user's role and permission grants,
 * argon2 password storage, and router extensions that gate route groups by
 * permission or role.
 */

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryFilter,
    Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::config::AppConfig;
use crate::entities::{user, UserRole};
use crate::errors::ServiceError;
use crate::services::customers::{insert_customer, CreateCustomerRequest};
use crate::services::Actor;

pub mod password;
mod permissions;

pub use password::{hash_password, verify_password};
pub use permissions::*;

/// Claim structure for JWT tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,              // Subject (user ID)
    pub name: Option<String>,     // User's name
    pub email: Option<String>,    // User's email
    pub roles: Vec<String>,       // User's roles
    pub permissions: Vec<String>, // Grants derived from the role
    pub jti: String,              // JWT ID
    pub iat: i64,                 // Issued at time
    pub exp: i64,                 // Expiration time
    pub nbf: i64,                 // Not valid before time
    pub iss: String,              // Issuer
    pub aud: String,              // Audience
}

/// Authenticated user data extracted from the JWT token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub name: Option<String>,
    pub email: Option<String>,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
    pub token_id: String,
}

impl AuthUser {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// Wildcard grants such as `orders:*` are honoured.
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions
            .iter()
            .any(|grant| grant_covers(grant, permission))
    }

    pub fn is_admin(&self) -> bool {
        self.has_role("admin")
    }

    /// Attribution for history rows and payments.
    pub fn actor(&self) -> Actor {
        Actor {
            id: Some(self.user_id),
            name: self.name.clone().or_else(|| self.email.clone()),
        }
    }
}

impl TryFrom<Claims> for AuthUser {
    type Error = AuthError;

    fn try_from(claims: Claims) -> Result<Self, Self::Error> {
        Ok(Self {
            user_id: Uuid::parse_str(&claims.sub).map_err(|_| AuthError::InvalidToken)?,
            name: claims.name,
            email: claims.email,
            roles: claims.roles,
            permissions: claims.permissions,
            token_id: claims.jti,
        })
    }
}

/// Authentication configuration
#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_audience: String,
    pub jwt_issuer: String,
    pub access_token_expiration: Duration,
}

impl AuthConfig {
    pub fn new(jwt_secret: String, access_token_expiration: Duration) -> Self {
        Self {
            jwt_secret,
            jwt_audience: "tailortrack-api".to_string(),
            jwt_issuer: "tailortrack-auth".to_string(),
            access_token_expiration,
        }
    }

    pub fn from_app_config(config: &AppConfig) -> Self {
        Self::new(
            config.jwt_secret.clone(),
            Duration::from_secs(config.jwt_expiration as u64),
        )
    }
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
    #[validate(length(min = 5, max = 32))]
    pub phone: String,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserView {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: UserRole,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<user::Model> for UserView {
    fn from(u: user::Model) -> Self {
        Self {
            id: u.id,
            email: u.email,
            name: u.name,
            role: u.role,
            phone: u.phone,
            created_at: u.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub user: UserView,
}

/// Issues and validates tokens and manages login accounts.
#[derive(Debug, Clone)]
pub struct AuthService {
    pub config: AuthConfig,
    pub db: Arc<DatabaseConnection>,
}

impl AuthService {
    pub fn new(config: AuthConfig, db: Arc<DatabaseConnection>) -> Self {
        Self { config, db }
    }

    /// Signs an access token for the given identity.
    pub fn issue_token(
        &self,
        user_id: Uuid,
        name: &str,
        email: &str,
        role: UserRole,
    ) -> Result<String, AuthError> {
        let now = Utc::now();
        let exp = now
            + ChronoDuration::from_std(self.config.access_token_expiration)
                .map_err(|_| AuthError::InternalError("Invalid token duration".to_string()))?;

        let claims = Claims {
            sub: user_id.to_string(),
            name: Some(name.to_string()),
            email: Some(email.to_string()),
            roles: vec![role.to_string()],
            permissions: role_permissions(role),
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
            nbf: now.timestamp(),
            iss: self.config.jwt_issuer.clone(),
            aud: self.config.jwt_audience.clone(),
        };

        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.config.jwt_secret.as_bytes()),
        )
        .map_err(|e| AuthError::TokenCreation(e.to_string()))
    }

    fn token_response(&self, account: user::Model) -> Result<TokenResponse, AuthError> {
        let access_token =
            self.issue_token(account.id, &account.name, &account.email, account.role)?;
        Ok(TokenResponse {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: self.config.access_token_expiration.as_secs() as i64,
            user: account.into(),
        })
    }

    /// Validate a JWT token and extract the claims
    pub fn validate_token(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[self.config.jwt_audience.as_str()]);
        validation.set_issuer(&[self.config.jwt_issuer.as_str()]);

        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.config.jwt_secret.as_bytes()),
            &validation,
        )
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::InvalidToken,
        })
    }

    /// Customer self-registration: a login account plus its linked customer
    /// profile, written together.
    #[instrument(skip(self, request), fields(email = %request.email))]
    pub async fn register(&self, request: RegisterRequest) -> Result<TokenResponse, ServiceError> {
        request.validate()?;
        let email = request.email.trim().to_ascii_lowercase();
        let password_hash = hash_password(&request.password)?;
        let now = Utc::now();

        let txn = self.db.begin().await?;
        let result = async {
            let account = user::ActiveModel {
                id: Set(Uuid::new_v4()),
                email: Set(email.clone()),
                name: Set(request.name.trim().to_string()),
                password_hash: Set(password_hash),
                role: Set(UserRole::Customer),
                phone: Set(Some(request.phone.clone())),
                is_active: Set(true),
                created_at: Set(now),
                updated_at: Set(now),
            }
            .insert(&txn)
            .await
            .map_err(|e| ServiceError::from_write(e, "account with this email"))?;

            insert_customer(
                &txn,
                &CreateCustomerRequest {
                    name: account.name.clone(),
                    phone: request.phone.clone(),
                    email: Some(email.clone()),
                    address: None,
                    measurements: None,
                },
                Some(account.id),
            )
            .await?;
            Ok::<_, ServiceError>(account)
        }
        .await;

        let account = match result {
            Ok(account) => {
                txn.commit().await?;
                account
            }
            Err(e) => {
                let _ = txn.rollback().await;
                return Err(e);
            }
        };

        info!(user_id = %account.id, "Customer account registered");
        Ok(self.token_response(account)?)
    }

    #[instrument(skip(self, request), fields(email = %request.email))]
    pub async fn login(&self, request: LoginRequest) -> Result<TokenResponse, ServiceError> {
        request.validate()?;
        let email = request.email.trim().to_ascii_lowercase();

        let account = user::Entity::find()
            .filter(user::Column::Email.eq(email.as_str()))
            .one(&*self.db)
            .await?;

        let account = match account {
            Some(account) if account.is_active => account,
            Some(_) => {
                warn!("Login attempt for inactive account");
                return Err(ServiceError::Unauthorized("invalid credentials".into()));
            }
            None => {
                debug!("Login attempt for unknown email");
                return Err(ServiceError::Unauthorized("invalid credentials".into()));
            }
        };

        if !verify_password(&request.password, &account.password_hash) {
            warn!(user_id = %account.id, "Login failed");
            return Err(ServiceError::Unauthorized("invalid credentials".into()));
        }

        info!(user_id = %account.id, "Login succeeded");
        Ok(self.token_response(account)?)
    }

    pub async fn current_user(&self, user_id: Uuid) -> Result<UserView, ServiceError> {
        user::Entity::find_by_id(user_id)
            .one(&*self.db)
            .await?
            .map(UserView::from)
            .ok_or_else(|| ServiceError::NotFound(format!("user {}", user_id)))
    }

    /// Creates or updates a staff/admin account. Used by the seed binary.
    pub async fn upsert_staff(
        &self,
        email: &str,
        password: &str,
        name: &str,
        role: UserRole,
    ) -> Result<UserView, ServiceError> {
        let email = email.trim().to_ascii_lowercase();
        let password_hash = hash_password(password)?;
        let now = Utc::now();

        let existing = user::Entity::find()
            .filter(user::Column::Email.eq(email.as_str()))
            .one(&*self.db)
            .await?;

        let saved = match existing {
            Some(account) => {
                let mut active = account.into_active_model();
                active.name = Set(name.to_string());
                active.password_hash = Set(password_hash);
                active.role = Set(role);
                active.is_active = Set(true);
                active.updated_at = Set(now);
                active.update(&*self.db).await?
            }
            None => {
                user::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    email: Set(email.clone()),
                    name: Set(name.to_string()),
                    password_hash: Set(password_hash),
                    role: Set(role),
                    phone: Set(None),
                    is_active: Set(true),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(&*self.db)
                .await?
            }
        };
        Ok(saved.into())
    }
}

/// Authentication error types
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing authentication")]
    MissingAuth,
    #[error("Invalid token")]
    InvalidToken,
    #[error("Token has expired")]
    TokenExpired,
    #[error("Token creation failed: {0}")]
    TokenCreation(String),
    #[error("Insufficient permissions")]
    InsufficientPermissions,
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<AuthError> for ServiceError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InsufficientPermissions => ServiceError::Forbidden(err.to_string()),
            AuthError::TokenCreation(_) | AuthError::InternalError(_) => {
                ServiceError::InternalError(err.to_string())
            }
            _ => ServiceError::Unauthorized(err.to_string()),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, error_code, error_message): (StatusCode, &str, String) = match &self {
            Self::MissingAuth => (
                StatusCode::UNAUTHORIZED,
                "AUTH_MISSING",
                "Authentication required".to_string(),
            ),
            Self::InvalidToken => (
                StatusCode::UNAUTHORIZED,
                "AUTH_INVALID_TOKEN",
                "Invalid authentication token".to_string(),
            ),
            Self::TokenExpired => (
                StatusCode::UNAUTHORIZED,
                "AUTH_TOKEN_EXPIRED",
                "Token has expired".to_string(),
            ),
            Self::TokenCreation(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "AUTH_TOKEN_CREATION_FAILED",
                "Token creation failed".to_string(),
            ),
            Self::InsufficientPermissions => (
                StatusCode::FORBIDDEN,
                "AUTH_INSUFFICIENT_PERMISSIONS",
                "Insufficient permissions".to_string(),
            ),
            Self::InternalError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "AUTH_INTERNAL_ERROR",
                "Internal error".to_string(),
            ),
        };

        let body = Json(serde_json::json!({
            "error": {
                "code": error_code,
                "message": error_message,
            }
        }));

        (status, body).into_response()
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or(AuthError::MissingAuth)
    }
}

/// Permission middleware to check if a user has the required permission
pub async fn permission_middleware(
    State(required_permission): State<String>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let user = request
        .extensions()
        .get::<AuthUser>()
        .ok_or(AuthError::MissingAuth)?;

    if !user.is_admin() && !user.has_permission(&required_permission) {
        debug!(user_id = %user.user_id, permission = %required_permission, "Permission denied");
        return Err(AuthError::InsufficientPermissions);
    }

    Ok(next.run(request).await)
}

/// Role middleware to check if a user has the required role
pub async fn role_middleware(
    State(required_role): State<String>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let user = request
        .extensions()
        .get::<AuthUser>()
        .ok_or(AuthError::MissingAuth)?;

    if !user.has_role(&required_role) {
        return Err(AuthError::InsufficientPermissions);
    }

    Ok(next.run(request).await)
}

/// Authentication middleware that validates the bearer token.
///
/// Expects an `Arc<AuthService>` in the request extensions.
pub async fn auth_middleware(mut request: Request, next: Next) -> Response {
    let auth_service = match request.extensions().get::<Arc<AuthService>>() {
        Some(service) => service.clone(),
        None => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Authentication service not available",
            )
                .into_response();
        }
    };

    match extract_auth_from_headers(request.headers(), &auth_service) {
        Ok(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

fn extract_auth_from_headers(
    headers: &HeaderMap,
    auth_service: &AuthService,
) -> Result<AuthUser, AuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or(AuthError::MissingAuth)?;
    let token = value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::MissingAuth)?;
    AuthUser::try_from(auth_service.validate_token(token)?)
}

/// Extension methods for Router to add auth middleware
pub trait AuthRouterExt {
    fn with_auth(self) -> Self;
    fn with_permission(self, permission: &str) -> Self;
    fn with_role(self, role: &str) -> Self;
}

impl<S> AuthRouterExt for axum::Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn with_auth(self) -> Self {
        self.layer(axum::middleware::from_fn(auth_middleware))
    }

    fn with_permission(self, permission: &str) -> Self {
        self.layer(axum::middleware::from_fn_with_state(
            permission.to_string(),
            permission_middleware,
        ))
        .with_auth()
    }

    fn with_role(self, role: &str) -> Self {
        self.layer(axum::middleware::from_fn_with_state(
            role.to_string(),
            role_middleware,
        ))
        .with_auth()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn service() -> AuthService {
        AuthService::new(
            AuthConfig::new(
                "unit_test_secret_that_is_long_enough_123".into(),
                Duration::from_secs(600),
            ),
            Arc::new(DatabaseConnection::Disconnected),
        )
    }

    #[test]
    fn issued_token_validates_and_carries_grants() {
        let auth = service();
        let id = Uuid::new_v4();
        let token = auth
            .issue_token(id, "Meera", "meera@example.com", UserRole::Staff)
            .unwrap();
        let user = AuthUser::try_from(auth.validate_token(&token).unwrap()).unwrap();
        assert_eq!(user.user_id, id);
        assert!(user.has_role("staff"));
        assert!(user.has_permission(consts::ORDERS_UPDATE));
        assert!(!user.has_permission(consts::NOTIFICATIONS_BROADCAST));
        assert_eq!(user.actor().name.as_deref(), Some("Meera"));
    }

    #[test]
    fn token_from_other_secret_is_rejected() {
        let token = service()
            .issue_token(Uuid::new_v4(), "x", "x@example.com", UserRole::Admin)
            .unwrap();
        let other = AuthService::new(
            AuthConfig::new(
                "a_completely_different_secret_value_456".into(),
                Duration::from_secs(600),
            ),
            Arc::new(DatabaseConnection::Disconnected),
        );
        assert_matches!(other.validate_token(&token), Err(AuthError::InvalidToken));
    }

    #[test]
    fn missing_bearer_prefix_is_missing_auth() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Token abc".parse().unwrap());
        assert_matches!(
            extract_auth_from_headers(&headers, &service()),
            Err(AuthError::MissingAuth)
        );
    }

    #[tokio::test]
    async fn register_validates_before_database() {
        let err = service()
            .register(RegisterRequest {
                name: "A".into(),
                email: "not-an-email".into(),
                password: "longenough".into(),
                phone: "9876543210".into(),
            })
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::ValidationError(_));
    }
}

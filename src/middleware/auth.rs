//! Bearer-token authentication and role checks.
//!
//! Access tokens are JWTs issued by the realm's OIDC provider. The service only
//! validates them (signature, expiry, optional issuer/audience) and reads role claims;
//! it never talks to the identity provider. Handlers declare the role they need by
//! taking a [`RequireRole`] extractor as their first argument, so unauthenticated or
//! unauthorized requests are rejected before any body parsing or database work.

use std::collections::{BTreeSet, HashMap};
use std::marker::PhantomData;

use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use thiserror::Error;

use crate::config::AuthConfig;
use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing bearer token")]
    MissingToken,
    #[error("malformed authorization header")]
    MalformedHeader,
    #[error("invalid token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),
    #[error("missing required role '{0}'")]
    MissingRole(String),
    #[error("invalid auth configuration: {0}")]
    Config(String),
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingRole(_) => AppError::Forbidden(err.to_string()),
            AuthError::Config(msg) => AppError::Internal(anyhow::anyhow!(msg)),
            other => AppError::Unauthorized(other.to_string()),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RoleList {
    #[serde(default)]
    roles: Vec<String>,
}

/// The subset of access-token claims the service reads.
#[derive(Debug, Deserialize)]
pub struct Claims {
    pub sub: Option<String>,
    #[serde(default)]
    pub preferred_username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    realm_access: RoleList,
    #[serde(default)]
    resource_access: HashMap<String, RoleList>,
    #[serde(default)]
    roles: Vec<String>,
}

impl Claims {
    /// Union of realm, client and top-level role claims.
    pub fn roles(&self) -> BTreeSet<String> {
        self.realm_access
            .roles
            .iter()
            .chain(self.resource_access.values().flat_map(|r| r.roles.iter()))
            .chain(self.roles.iter())
            .cloned()
            .collect()
    }

    /// Name written to audit columns.
    pub fn username(&self) -> String {
        self.preferred_username
            .clone()
            .or_else(|| self.email.clone())
            .or_else(|| self.sub.clone())
            .unwrap_or_else(|| "unknown".to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    View,
    Create,
}

/// The authenticated caller.
#[derive(Debug, Clone)]
pub struct UserInfo {
    pub username: String,
    pub roles: BTreeSet<String>,
}

/// Validates access tokens and resolves configured role names.
pub struct TokenValidator {
    key: DecodingKey,
    validation: Validation,
    view_role: String,
    create_role: String,
    admin_role: String,
}

impl TokenValidator {
    pub fn from_config(cfg: &AuthConfig) -> Result<Self, AuthError> {
        let (key, algorithm) = match cfg.algorithm.as_str() {
            "HS256" => {
                let secret = cfg
                    .secret
                    .as_deref()
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| AuthError::Config("auth.secret is required for HS256".into()))?;
                (DecodingKey::from_secret(secret.as_bytes()), Algorithm::HS256)
            }
            "RS256" => {
                let pem = cfg
                    .public_key_pem
                    .as_deref()
                    .ok_or_else(|| AuthError::Config("auth.public_key_pem is required for RS256".into()))?;
                let key = DecodingKey::from_rsa_pem(pem.as_bytes())
                    .map_err(|e| AuthError::Config(format!("invalid RSA public key: {}", e)))?;
                (key, Algorithm::RS256)
            }
            other => return Err(AuthError::Config(format!("unsupported algorithm {}", other))),
        };

        let mut validation = Validation::new(algorithm);
        match &cfg.issuer {
            Some(iss) => validation.set_issuer(&[iss.as_str()]),
            None => validation.iss = None,
        }
        match &cfg.audience {
            Some(aud) => validation.set_audience(&[aud.as_str()]),
            None => validation.validate_aud = false,
        }

        Ok(Self {
            key,
            validation,
            view_role: cfg.view_role.clone(),
            create_role: cfg.create_role.clone(),
            admin_role: cfg.admin_role.clone(),
        })
    }

    pub fn validate(&self, token: &str) -> Result<UserInfo, AuthError> {
        let data = decode::<Claims>(token, &self.key, &self.validation)?;
        Ok(UserInfo { username: data.claims.username(), roles: data.claims.roles() })
    }

    pub fn role_name(&self, role: Role) -> &str {
        match role {
            Role::View => &self.view_role,
            Role::Create => &self.create_role,
        }
    }

    /// Admin implies every role; create implies view.
    pub fn check(&self, user: &UserInfo, role: Role) -> Result<(), AuthError> {
        let has = |name: &str| user.roles.contains(name);
        let allowed = has(&self.admin_role)
            || match role {
                Role::View => has(&self.view_role) || has(&self.create_role),
                Role::Create => has(&self.create_role),
            };
        if allowed {
            Ok(())
        } else {
            Err(AuthError::MissingRole(self.role_name(role).to_string()))
        }
    }
}

pub fn bearer_token(parts: &Parts) -> Result<&str, AuthError> {
    let value = parts.headers.get(header::AUTHORIZATION).ok_or(AuthError::MissingToken)?;
    let value = value.to_str().map_err(|_| AuthError::MalformedHeader)?;
    match value.split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() => {
            Ok(token.trim())
        }
        _ => Err(AuthError::MalformedHeader),
    }
}

/// Marker for the role a handler requires.
pub trait RoleRequirement {
    const ROLE: Role;
}

pub struct ViewRole;
pub struct CreateRole;

impl RoleRequirement for ViewRole {
    const ROLE: Role = Role::View;
}

impl RoleRequirement for CreateRole {
    const ROLE: Role = Role::Create;
}

/// Extractor for any caller holding a valid token, whatever its roles.
pub struct AuthenticatedUser(pub UserInfo);

impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?;
        let user = state.auth.validate(token).map_err(|e| {
            tracing::debug!("Rejected bearer token: {}", e);
            e
        })?;
        Ok(AuthenticatedUser(user))
    }
}

/// Extractor that authenticates the caller and enforces `R`.
pub struct RequireRole<R> {
    pub user: UserInfo,
    _role: PhantomData<R>,
}

impl<R> RequireRole<R> {
    pub fn username(&self) -> &str {
        &self.user.username
    }
}

impl<R> FromRequestParts<AppState> for RequireRole<R>
where
    R: RoleRequirement + Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let AuthenticatedUser(user) = AuthenticatedUser::from_request_parts(parts, state).await?;
        if let Err(e) = state.auth.check(&user, R::ROLE) {
            tracing::warn!(user = %user.username, "{}", e);
            return Err(e.into());
        }
        Ok(RequireRole { user, _role: PhantomData })
    }
}

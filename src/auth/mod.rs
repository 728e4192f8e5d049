//! Authorization
//!
//! Resolves bearer tokens into a [`Principal`] carrying a role. Handlers
//! take `Principal` as an extractor and call [`Principal::require`].

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::ApiError;

// == Roles ==
/// Ordered so that `Admin` satisfies any requirement `Operator` does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Viewer,
    Operator,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Viewer => "viewer",
            Role::Operator => "operator",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "viewer" => Ok(Role::Viewer),
            "operator" => Ok(Role::Operator),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Missing bearer token")]
    Missing,

    #[error("Invalid bearer token")]
    Invalid,

    #[error("Requires {required} role")]
    Forbidden { required: Role },
}

/// Authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub subject: String,
    pub role: Role,
    pub claims: BTreeMap<String, String>,
}

impl Principal {
    pub fn new(subject: impl Into<String>, role: Role) -> Self {
        let subject = subject.into();
        let mut claims = BTreeMap::new();
        claims.insert("sub".to_string(), subject.clone());
        claims.insert("role".to_string(), role.to_string());
        Self {
            subject,
            role,
            claims,
        }
    }

    pub fn require(&self, required: Role) -> Result<(), AuthError> {
        if self.role >= required {
            Ok(())
        } else {
            Err(AuthError::Forbidden { required })
        }
    }
}

/// Token verification collaborator.
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn authorize(&self, token: &str) -> Result<Principal, AuthError>;
}

// == Static Tokens ==
/// Fixed token table, loaded once at startup.
#[derive(Debug, Default)]
pub struct StaticTokenAuthorizer {
    tokens: HashMap<String, Principal>,
}

impl StaticTokenAuthorizer {
    /// Builds the table from `token:subject:role` entries. Malformed entries
    /// are skipped with a warning.
    pub fn from_tokens(entries: &[String]) -> Self {
        let mut tokens = HashMap::new();

        for entry in entries {
            let mut parts = entry.splitn(3, ':');
            let parsed = match (parts.next(), parts.next(), parts.next()) {
                (Some(token), Some(subject), Some(role)) if !token.is_empty() && !subject.is_empty() => {
                    role.parse::<Role>().map(|role| (token, Principal::new(subject, role)))
                }
                _ => Err("expected token:subject:role".to_string()),
            };

            match parsed {
                Ok((token, principal)) => {
                    tokens.insert(token.to_string(), principal);
                }
                Err(reason) => warn!(reason = %reason, "Ignoring malformed API token entry"),
            }
        }

        Self { tokens }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait]
impl Authorizer for StaticTokenAuthorizer {
    async fn authorize(&self, token: &str) -> Result<Principal, AuthError> {
        self.tokens.get(token).cloned().ok_or(AuthError::Invalid)
    }
}

/// Pulls the token out of an `Authorization: Bearer <token>` value.
pub fn bearer_token(header: &str) -> Result<&str, AuthError> {
    let token = header
        .strip_prefix("Bearer ")
        .ok_or(AuthError::Invalid)?
        .trim();
    if token.is_empty() {
        return Err(AuthError::Missing);
    }
    Ok(token)
}

#[async_trait]
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
    Arc<dyn Authorizer>: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or(AuthError::Missing)?;

        let token = bearer_token(header)?;
        let authorizer = Arc::<dyn Authorizer>::from_ref(state);
        let principal = authorizer.authorize(token).await?;

        debug!(subject = %principal.subject, role = %principal.role, "Authorized request");
        Ok(principal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_role_ordering() {
        assert!(Role::Admin > Role::Operator);
        assert!(Role::Operator > Role::Viewer);
        assert_eq!("ADMIN".parse::<Role>(), Ok(Role::Admin));
        assert!("driver".parse::<Role>().is_err());
    }

    #[test]
    fn test_require() {
        let operator = Principal::new("dispatch", Role::Operator);
        assert!(operator.require(Role::Viewer).is_ok());
        assert!(operator.require(Role::Operator).is_ok());
        assert_eq!(
            operator.require(Role::Admin),
            Err(AuthError::Forbidden {
                required: Role::Admin
            })
        );
    }

    #[test]
    fn test_principal_claims() {
        let principal = Principal::new("ops", Role::Admin);
        assert_eq!(principal.claims.get("sub").map(String::as_str), Some("ops"));
        assert_eq!(principal.claims.get("role").map(String::as_str), Some("admin"));
    }

    #[tokio::test]
    async fn test_static_tokens() {
        let authorizer = StaticTokenAuthorizer::from_tokens(&entries(&[
            "t-admin:ops:admin",
            "t-op:dispatch:operator",
            "broken",
            "t-x:someone:driver",
        ]));

        assert_eq!(authorizer.len(), 2);
        assert_eq!(authorizer.authorize("t-admin").await.unwrap().role, Role::Admin);
        assert_eq!(authorizer.authorize("t-op").await.unwrap().subject, "dispatch");
        assert_eq!(authorizer.authorize("nope").await, Err(AuthError::Invalid));
    }

    #[test]
    fn test_bearer_token() {
        assert_eq!(bearer_token("Bearer abc123"), Ok("abc123"));
        assert_eq!(bearer_token("Basic abc123"), Err(AuthError::Invalid));
        assert_eq!(bearer_token("Bearer   "), Err(AuthError::Missing));
    }
}

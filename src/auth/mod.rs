//! Authentication module
//!
//! Inbound callers authenticate with a static bearer token.

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

pub mod bearer;

pub use bearer::BearerTokenAuthenticator;

/// Authentication errors
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Missing authentication")]
    MissingAuth,

    #[error("Invalid token")]
    InvalidToken,
}

/// Authentication result
#[derive(Debug, Clone)]
pub struct AuthResult {
    pub subject: String,
}

/// Authenticator trait
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Authenticate a request
    async fn authenticate(&self, request: &AuthRequest) -> Result<AuthResult, AuthError>;
}

/// Authentication request context
#[derive(Debug, Default)]
pub struct AuthRequest {
    /// Header names are lowercase
    pub headers: HashMap<String, String>,
    pub method: String,
    pub path: String,
}

impl AuthRequest {
    /// Build from a hyper-style header map
    pub fn from_parts(method: &str, path: &str, headers: &hyper::HeaderMap) -> Self {
        let headers = headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_lowercase(), v.to_string()))
            })
            .collect();

        Self {
            headers,
            method: method.to_string(),
            path: path.to_string(),
        }
    }
}

//! Static bearer-token authentication
//!
//! Callers send `Authorization: Bearer <token>`; the token must equal the
//! configured `auth.api_token`.

use super::{AuthError, AuthRequest, AuthResult, Authenticator};
use async_trait::async_trait;
use sha2::{Digest, Sha256};

/// Bearer token authenticator
///
/// # Example
///
/// ```
/// use b2_relay::auth::{Authenticator, AuthRequest, BearerTokenAuthenticator};
///
/// # async fn example() {
/// let auth = BearerTokenAuthenticator::new("my-token");
/// let mut request = AuthRequest::default();
/// request
///     .headers
///     .insert("authorization".into(), "Bearer my-token".into());
/// assert!(auth.authenticate(&request).await.is_ok());
/// # }
/// ```
pub struct BearerTokenAuthenticator {
    expected: [u8; 32],
}

impl BearerTokenAuthenticator {
    pub fn new(token: &str) -> Self {
        Self {
            expected: Sha256::digest(token.as_bytes()).into(),
        }
    }

    /// Extract token from the Authorization header
    fn extract_token(request: &AuthRequest) -> Option<&str> {
        let header = request.headers.get("authorization")?;
        let (scheme, token) = header.trim().split_once(' ')?;
        if !scheme.eq_ignore_ascii_case("bearer") {
            return None;
        }
        let token = token.trim();
        (!token.is_empty()).then_some(token)
    }

    /// Compare digests so timing does not depend on where the tokens differ
    fn matches(&self, token: &str) -> bool {
        let presented: [u8; 32] = Sha256::digest(token.as_bytes()).into();
        presented
            .iter()
            .zip(self.expected.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

#[async_trait]
impl Authenticator for BearerTokenAuthenticator {
    async fn authenticate(&self, request: &AuthRequest) -> Result<AuthResult, AuthError> {
        let token = Self::extract_token(request).ok_or(AuthError::MissingAuth)?;

        if !self.matches(token) {
            return Err(AuthError::InvalidToken);
        }

        Ok(AuthResult {
            subject: "api-token".to_string(),
        })
    }
}

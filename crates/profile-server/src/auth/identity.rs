//! Identity provider integration.
//!
//! Passwords never reach the database: the server either verifies an ID token
//! the client already obtained from Firebase, or exchanges the credentials for
//! one through the Firebase REST API and verifies that.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::jwk::{Jwk, JwkSet};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::AppError;

const SIGN_IN_URL: &str = "https://identitytoolkit.googleapis.com/v1/accounts:signInWithPassword";
const JWKS_URL: &str =
    "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com";
const KEY_CACHE_TTL: Duration = Duration::from_secs(3600);

/// A user the identity provider vouched for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    pub uid: String,
    pub email: String,
    pub name: Option<String>,
    pub picture: Option<String>,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Exchanges email and password for a provider ID token.
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<String, AppError>;

    async fn verify_id_token(&self, id_token: &str) -> Result<VerifiedIdentity, AppError>;
}

#[derive(Debug, Deserialize)]
struct IdTokenClaims {
    sub: String,
    email: Option<String>,
    name: Option<String>,
    picture: Option<String>,
}

impl TryFrom<IdTokenClaims> for VerifiedIdentity {
    type Error = AppError;

    fn try_from(claims: IdTokenClaims) -> Result<Self, Self::Error> {
        if claims.sub.is_empty() {
            return Err(AppError::Unauthorized);
        }
        let email = claims.email.ok_or(AppError::Unauthorized)?;

        Ok(VerifiedIdentity {
            uid: claims.sub,
            email,
            name: claims.name,
            picture: claims.picture,
        })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignInRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInResponse {
    id_token: String,
}

struct CachedKeys {
    set: JwkSet,
    fetched_at: Instant,
}

pub struct FirebaseIdentity {
    http: reqwest::Client,
    api_key: String,
    project_id: String,
    sign_in_url: String,
    jwks_url: String,
    keys: RwLock<Option<CachedKeys>>,
}

impl FirebaseIdentity {
    pub fn new(api_key: &str, project_id: &str) -> Self {
        Self::with_endpoints(api_key, project_id, SIGN_IN_URL, JWKS_URL)
    }

    pub fn with_endpoints(api_key: &str, project_id: &str, sign_in_url: &str, jwks_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.to_string(),
            project_id: project_id.to_string(),
            sign_in_url: sign_in_url.to_string(),
            jwks_url: jwks_url.to_string(),
            keys: RwLock::new(None),
        }
    }

    fn issuer(&self) -> String {
        format!("https://securetoken.google.com/{}", self.project_id)
    }

    async fn fetch_keys(&self) -> Result<JwkSet, AppError> {
        let response = self
            .http
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| AppError::Identity(format!("Failed to fetch signing keys: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::Identity(format!(
                "Signing key endpoint returned {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::Identity(format!("Malformed signing keys: {}", e)))
    }

    /// Looks up `kid`, refetching the key set when it is stale or lacks the key.
    async fn key(&self, kid: &str) -> Result<Jwk, AppError> {
        {
            let cached = self.keys.read().await;
            if let Some(cached) = cached.as_ref() {
                if cached.fetched_at.elapsed() < KEY_CACHE_TTL {
                    if let Some(jwk) = cached.set.find(kid) {
                        return Ok(jwk.clone());
                    }
                }
            }
        }

        let set = self.fetch_keys().await?;
        let jwk = set.find(kid).cloned();
        *self.keys.write().await = Some(CachedKeys {
            set,
            fetched_at: Instant::now(),
        });

        jwk.ok_or_else(|| {
            tracing::debug!(kid, "ID token signed with unknown key");
            AppError::Unauthorized
        })
    }
}

#[async_trait]
impl IdentityProvider for FirebaseIdentity {
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<String, AppError> {
        let response = self
            .http
            .post(&self.sign_in_url)
            .query(&[("key", self.api_key.as_str())])
            .json(&SignInRequest {
                email,
                password,
                return_secure_token: true,
            })
            .send()
            .await
            .map_err(|e| AppError::Identity(format!("Sign-in request failed: {}", e)))?;

        let status = response.status();
        if status == reqwest::StatusCode::BAD_REQUEST {
            // INVALID_PASSWORD, EMAIL_NOT_FOUND, USER_DISABLED, ...
            let text = response.text().await.unwrap_or_default();
            tracing::debug!("Provider rejected credentials: {}", text);
            return Err(AppError::Unauthorized);
        }
        if !status.is_success() {
            return Err(AppError::Identity(format!("Sign-in returned {}", status)));
        }

        let body: SignInResponse = response
            .json()
            .await
            .map_err(|e| AppError::Identity(format!("Malformed sign-in response: {}", e)))?;

        Ok(body.id_token)
    }

    async fn verify_id_token(&self, id_token: &str) -> Result<VerifiedIdentity, AppError> {
        let header = decode_header(id_token).map_err(|e| {
            tracing::debug!("Malformed ID token: {}", e);
            AppError::Unauthorized
        })?;

        if header.alg != Algorithm::RS256 {
            return Err(AppError::Unauthorized);
        }
        let kid = header.kid.ok_or(AppError::Unauthorized)?;

        let jwk = self.key(&kid).await?;
        let key = DecodingKey::from_jwk(&jwk)
            .map_err(|e| AppError::Identity(format!("Unusable signing key: {}", e)))?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[&self.project_id]);
        validation.set_issuer(&[self.issuer()]);

        let data = decode::<IdTokenClaims>(id_token, &key, &validation).map_err(|e| {
            tracing::debug!("ID token verification failed: {}", e);
            AppError::Unauthorized
        })?;

        data.claims.try_into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(sub: &str, email: Option<&str>) -> IdTokenClaims {
        IdTokenClaims {
            sub: sub.to_string(),
            email: email.map(str::to_string),
            name: Some("Asha".to_string()),
            picture: None,
        }
    }

    #[test]
    fn test_identity_from_claims() {
        let identity = VerifiedIdentity::try_from(claims("uid-1", Some("a@example.com"))).unwrap();
        assert_eq!(identity.uid, "uid-1");
        assert_eq!(identity.email, "a@example.com");
        assert_eq!(identity.name.as_deref(), Some("Asha"));
    }

    #[test]
    fn test_identity_requires_subject_and_email() {
        assert!(matches!(
            VerifiedIdentity::try_from(claims("", Some("a@example.com"))),
            Err(AppError::Unauthorized)
        ));
        assert!(matches!(
            VerifiedIdentity::try_from(claims("uid-1", None)),
            Err(AppError::Unauthorized)
        ));
    }

    #[test]
    fn test_issuer_uses_project_id() {
        let firebase = FirebaseIdentity::new("key", "demo-project");
        assert_eq!(firebase.issuer(), "https://securetoken.google.com/demo-project");
    }

    #[tokio::test]
    async fn test_malformed_token_rejected_before_key_lookup() {
        // Unroutable endpoints: reaching the network would fail with Identity.
        let firebase =
            FirebaseIdentity::with_endpoints("key", "demo", "http://127.0.0.1:9/", "http://127.0.0.1:9/");
        assert!(matches!(
            firebase.verify_id_token("not-a-jwt").await,
            Err(AppError::Unauthorized)
        ));
    }
}

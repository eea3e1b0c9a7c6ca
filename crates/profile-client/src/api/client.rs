use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use profile_shared::{
    api::{AuthResponse, LoginRequest, UpdateProfileRequest},
    FieldError, User,
};
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use super::auth::StoredSession;

/// JWT payload claims we need for expiry checking
#[derive(Deserialize)]
struct JwtClaims {
    exp: i64,
}

/// Body of a 422 response
#[derive(Deserialize)]
struct InvalidFieldsBody {
    #[serde(default)]
    fields: Vec<FieldError>,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Not authenticated")]
    Unauthorized,
    #[error("Access forbidden")]
    Forbidden,
    #[error("Resource not found")]
    NotFound,
    #[error("Invalid fields: {}", describe(.0))]
    InvalidFields(Vec<FieldError>),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Server error: {0}")]
    Server(String),
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

fn describe(fields: &[FieldError]) -> String {
    fields
        .iter()
        .map(|f| format!("{}: {}", f.field, f.message))
        .collect::<Vec<_>>()
        .join("; ")
}

pub struct ApiClient {
    client: Client,
    base_url: String,
    session: Option<StoredSession>,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            session: None,
        }
    }

    /// Load the session from disk
    pub fn load_session(&mut self) -> anyhow::Result<bool> {
        self.session = StoredSession::load()?;
        Ok(self.session.is_some())
    }

    pub fn session(&self) -> Option<&StoredSession> {
        self.session.as_ref()
    }

    /// True when a session exists and has not expired.
    pub fn has_valid_session(&self) -> bool {
        match &self.session {
            Some(session) => !is_token_expired(&session.access_token, chrono::Utc::now().timestamp()),
            None => false,
        }
    }

    /// Build URL for endpoint
    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.base_url, path)
    }

    /// Authorization header for the current session
    fn auth_header(&self) -> Result<String, ApiError> {
        if !self.has_valid_session() {
            return Err(ApiError::Unauthorized);
        }
        self.session
            .as_ref()
            .map(|s| format!("Bearer {}", s.access_token))
            .ok_or(ApiError::Unauthorized)
    }

    /// Handle API response
    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let status = response.status();

        match status {
            StatusCode::OK | StatusCode::CREATED => {
                response.json().await.map_err(ApiError::Network)
            }
            StatusCode::UNAUTHORIZED => Err(ApiError::Unauthorized),
            StatusCode::FORBIDDEN => Err(ApiError::Forbidden),
            StatusCode::NOT_FOUND => Err(ApiError::NotFound),
            StatusCode::UNPROCESSABLE_ENTITY => {
                let text = response.text().await.unwrap_or_default();
                match serde_json::from_str::<InvalidFieldsBody>(&text) {
                    Ok(body) if !body.fields.is_empty() => Err(ApiError::InvalidFields(body.fields)),
                    _ => Err(ApiError::Validation(text)),
                }
            }
            StatusCode::BAD_REQUEST => {
                let text = response.text().await.unwrap_or_default();
                Err(ApiError::Validation(text))
            }
            StatusCode::CONFLICT => {
                let text = response.text().await.unwrap_or_default();
                Err(ApiError::Conflict(text))
            }
            _ => {
                let text = response.text().await.unwrap_or_default();
                Err(ApiError::Server(format!("{}: {}", status, text)))
            }
        }
    }

    // ============ Auth ============

    pub async fn login(
        &mut self,
        email: &str,
        password: &str,
        id_token: Option<&str>,
    ) -> Result<User, ApiError> {
        let req = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
            id_token: id_token.map(|t| t.to_string()),
        };

        // Same rules the server applies; saves a round trip
        req.check().map_err(ApiError::InvalidFields)?;

        let response = self
            .client
            .post(self.url("/auth/login"))
            .json(&req)
            .send()
            .await?;

        let auth: AuthResponse = self.handle_response(response).await?;

        let session = StoredSession {
            access_token: auth.access_token,
            user_id: auth.user.id,
            role: auth.user.role,
        };
        session.save().map_err(ApiError::Other)?;
        self.session = Some(session);

        Ok(auth.user)
    }

    /// Sessions are stateless on the server, so logging out only forgets the token.
    pub fn logout(&mut self) -> Result<(), ApiError> {
        self.session = None;
        StoredSession::delete().map_err(ApiError::Other)?;
        Ok(())
    }

    pub async fn me(&self) -> Result<User, ApiError> {
        let response = self
            .client
            .get(self.url("/auth/me"))
            .header("Authorization", self.auth_header()?)
            .send()
            .await?;
        self.handle_response(response).await
    }

    // ============ Profile ============

    pub async fn get_profile(&self) -> Result<User, ApiError> {
        let response = self
            .client
            .get(self.url("/profile"))
            .header("Authorization", self.auth_header()?)
            .send()
            .await?;
        self.handle_response(response).await
    }

    pub async fn update_profile(&self, req: &UpdateProfileRequest) -> Result<User, ApiError> {
        req.check().map_err(ApiError::InvalidFields)?;

        let response = self
            .client
            .patch(self.url("/profile"))
            .header("Authorization", self.auth_header()?)
            .json(req)
            .send()
            .await?;
        self.handle_response(response).await
    }
}

/// Decode JWT payload and extract expiration time
fn decode_token_exp(token: &str) -> Option<i64> {
    // JWT format: header.payload.signature
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return None;
    }

    let payload = URL_SAFE_NO_PAD.decode(parts[1]).ok()?;
    let claims: JwtClaims = serde_json::from_slice(&payload).ok()?;

    Some(claims.exp)
}

/// Undecodable tokens count as expired; the server would reject them anyway.
fn is_token_expired(token: &str, now: i64) -> bool {
    match decode_token_exp(token) {
        Some(exp) => exp <= now,
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_with_exp(exp: i64) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"x","exp":{}}}"#, exp));
        format!("{}.{}.signature", header, payload)
    }

    #[test]
    fn test_decode_token_exp() {
        assert_eq!(decode_token_exp(&token_with_exp(1_700_000_000)), Some(1_700_000_000));
        assert_eq!(decode_token_exp("only.two"), None);
        assert_eq!(decode_token_exp("a.!!!.c"), None);
    }

    #[test]
    fn test_token_expiry() {
        let now = 1_700_000_000;
        assert!(!is_token_expired(&token_with_exp(now + 60), now));
        assert!(is_token_expired(&token_with_exp(now), now));
        assert!(is_token_expired("garbage", now));
    }

    #[test]
    fn test_url_trims_trailing_slash() {
        let client = ApiClient::new("http://localhost:3000/");
        assert_eq!(client.url("/profile"), "http://localhost:3000/api/v1/profile");
    }

    #[tokio::test]
    async fn test_requests_without_session_fail_locally() {
        let client = ApiClient::new("http://127.0.0.1:9");
        assert!(!client.has_valid_session());
        assert!(matches!(client.me().await, Err(ApiError::Unauthorized)));
    }

    #[tokio::test]
    async fn test_invalid_update_is_caught_before_sending() {
        let client = ApiClient::new("http://127.0.0.1:9");
        let req = UpdateProfileRequest {
            phone_number: Some("+44 7911 123456".to_string()),
            ..Default::default()
        };
        match client.update_profile(&req).await {
            Err(ApiError::InvalidFields(fields)) => assert_eq!(fields[0].field, "phoneNumber"),
            other => panic!("expected InvalidFields, got {:?}", other.map(|u| u.id)),
        }
    }
}

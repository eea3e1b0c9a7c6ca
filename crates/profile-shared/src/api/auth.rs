use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::User;
use crate::validation::{check, FieldError};

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    #[validate(email(message = "A valid email address is required"))]
    pub email: String,
    /// The identity provider refuses passwords shorter than six characters.
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
}

impl LoginRequest {
    pub fn check(&self) -> Result<(), Vec<FieldError>> {
        check(self)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub access_token: String,
    /// Session lifetime in seconds.
    pub expires_in: i64,
    pub user: User,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn login(email: &str, password: &str) -> LoginRequest {
        LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
            id_token: None,
        }
    }

    #[test]
    fn test_password_length_boundary() {
        let errors = login("a@example.com", "12345").check().unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "password");
        assert_eq!(errors[0].code, "length");

        assert!(login("a@example.com", "123456").check().is_ok());
    }

    #[test]
    fn test_email_required_and_shaped() {
        let errors = login("", "secret1").check().unwrap_err();
        assert_eq!(errors[0].field, "email");

        let errors = login("not-an-email", "secret1").check().unwrap_err();
        assert_eq!(errors[0].field, "email");
        assert_eq!(errors[0].code, "email");
    }

    #[test]
    fn test_reports_every_invalid_field() {
        let errors = login("nope", "123").check().unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["email", "password"]);
    }

    #[test]
    fn test_id_token_is_optional_on_the_wire() {
        let req: LoginRequest =
            serde_json::from_str(r#"{"email":"a@example.com","password":"secret1"}"#).unwrap();
        assert!(req.id_token.is_none());

        let req: LoginRequest = serde_json::from_str(
            r#"{"email":"a@example.com","password":"secret1","idToken":"tok"}"#,
        )
        .unwrap();
        assert_eq!(req.id_token.as_deref(), Some("tok"));
    }
}

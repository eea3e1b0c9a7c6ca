use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::validation::{check, FieldError, INDIAN_PHONE};

/// Partial profile update. Only the listed fields are accepted; any other key
/// fails deserialization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateProfileRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 50, message = "Username must be at most 50 characters"))]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(email(message = "Email must be a valid email address"))]
    pub email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(regex(path = *INDIAN_PHONE, message = "Phone number must be a valid Indian mobile number"))]
    pub phone_number: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(url(message = "Profile picture URL must be a valid URL"))]
    pub profile_picture_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 100, message = "Display name must be at most 100 characters"))]
    pub display_name: Option<String>,
}

impl UpdateProfileRequest {
    pub fn check(&self) -> Result<(), Vec<FieldError>> {
        check(self)
    }

    pub fn is_empty(&self) -> bool {
        self.username.is_none()
            && self.email.is_none()
            && self.phone_number.is_none()
            && self.profile_picture_url.is_none()
            && self.display_name.is_none()
    }
}

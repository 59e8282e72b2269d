use serde::Deserialize;

use crate::error::VibeError;
use crate::models::{Profile, validate_name, validate_status};

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub name: String,
    pub status: Option<String>,
    pub avatar_url: Option<String>,
}

impl UpdateProfileRequest {
    /// Validated row for `user_id`.
    pub fn into_profile(self, user_id: &str) -> Result<Profile, VibeError> {
        let status = match self.status {
            Some(status) => Some(validate_status(&status)?),
            None => None,
        };

        Ok(Profile {
            user_id: user_id.to_string(),
            name: Some(validate_name(&self.name)?),
            status,
            avatar_url: self.avatar_url.filter(|url| !url.trim().is_empty()),
        })
    }
}

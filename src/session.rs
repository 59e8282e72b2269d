use crate::config::Config;
use crate::error::VibeError;
use crate::utils::verify_token;

/// The signed-in user, derived from the backend session token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: String,
    pub email: Option<String>,
    pub access_token: String,
}

impl Session {
    pub fn from_token(token: &str, jwt_secret: Option<&str>) -> Result<Self, VibeError> {
        let claims = verify_token(token, jwt_secret).map_err(|e| {
            tracing::warn!("Rejected session token: {}", e);
            VibeError::Unauthenticated
        })?;

        Ok(Self {
            user_id: claims.sub,
            email: claims.email,
            access_token: token.to_string(),
        })
    }

    /// `None` runs the daemon as a guest.
    pub fn from_config(config: &Config) -> Result<Option<Self>, VibeError> {
        match &config.access_token {
            Some(token) => Self::from_token(token, config.jwt_secret.as_deref()).map(Some),
            None => Ok(None),
        }
    }
}

use axum::Json;
use axum::http::{HeaderMap, header};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use tracing;

use crate::error::VibeError;
use crate::result::ApiResponse;

/// Coarse, privacy-preserving label for an approximate distance.
pub fn distance_label(meters: f64) -> String {
    if meters < 75.0 {
        "50m away".to_string()
    } else if meters < 150.0 {
        "same block".to_string()
    } else if meters < 300.0 {
        "2 streets over".to_string()
    } else if meters < 600.0 {
        format!("{}m away", ((meters / 100.0).round() * 100.0) as i64)
    } else {
        format!("{:.1}km away", meters / 1000.0)
    }
}

/// Claims carried by the backend's session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // 用户ID
    pub exp: i64,    // 过期时间
    #[serde(default)]
    pub email: Option<String>,
}

/// 解析会话令牌
///
/// The signature is only checked when the project's JWT secret is known; the
/// expiry is always enforced.
pub fn verify_token(
    token: &str,
    jwt_secret: Option<&str>,
) -> Result<Claims, jsonwebtoken::errors::Error> {
    let mut validation = Validation::new(Algorithm::HS256);
    // Supabase 令牌的 aud 为 "authenticated"，这里不做限制
    validation.validate_aud = false;

    let key = match jwt_secret {
        Some(secret) => DecodingKey::from_secret(secret.as_bytes()),
        None => {
            tracing::debug!("No JWT secret configured, decoding session token without verification");
            validation.insecure_disable_signature_validation();
            DecodingKey::from_secret(&[])
        }
    };

    let token_data = decode::<Claims>(token, &key, &validation)?;
    Ok(token_data.claims)
}

/// 原始请求体上传的图片类型，缺省为 jpeg
pub fn image_content_type(headers: &HeaderMap) -> Result<String, VibeError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("image/jpeg");
    if !content_type.starts_with("image/") {
        return Err(VibeError::Validation(format!(
            "Unsupported content type {content_type}"
        )));
    }
    Ok(content_type.to_string())
}

pub fn success_to_api_response<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse::success(data))
}

pub fn error_to_api_response<T>(code: i32, msg: String) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        code,
        msg,
        resp_data: None,
    })
}

pub mod error_codes {
    pub const SUCCESS: i32 = 0;
    pub const VALIDATION_ERROR: i32 = 1000;
    pub const AUTH_FAILED: i32 = 1002;
    pub const PERMISSION_DENIED: i32 = 1003;
    pub const LOCATION_ERROR: i32 = 1006;
    pub const BACKEND_ERROR: i32 = 2000;
    pub const INTERNAL_ERROR: i32 = 5000;
}

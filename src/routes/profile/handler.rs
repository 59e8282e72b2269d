use axum::{Extension, Json, body::Bytes, extract::State, http::HeaderMap};
use chrono::Utc;

use crate::{
    AppState,
    error::VibeError,
    models::{Profile, VIBE_STATUSES},
    result::ApiResponse,
    session::Session,
    utils::{image_content_type, success_to_api_response},
};

pub const AVATAR_BUCKET: &str = "avatars";

use super::model::UpdateProfileRequest;

// 还没有资料时返回空资料，客户端据此进入引导
async fn load_or_empty(state: &AppState, user_id: &str) -> Result<Profile, VibeError> {
    Ok(state
        .services
        .social
        .load_profile(user_id)
        .await?
        .unwrap_or_else(|| Profile {
            user_id: user_id.to_string(),
            ..Profile::default()
        }))
}

pub async fn get_profile(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Result<Json<ApiResponse<Profile>>, VibeError> {
    let profile = load_or_empty(&state, &session.user_id).await?;
    Ok(success_to_api_response(profile))
}

/// Uploads the raw body as the avatar and stores its public URL on the profile.
pub async fn upload_avatar(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ApiResponse<Profile>>, VibeError> {
    let content_type = image_content_type(&headers)?;
    if body.is_empty() {
        return Err(VibeError::Validation("Image is empty".to_string()));
    }

    let key = format!("{}/{}.jpg", session.user_id, Utc::now().timestamp_millis());
    let url = state
        .services
        .social
        .upload_object(AVATAR_BUCKET, &key, body.to_vec(), &content_type)
        .await?;

    let mut profile = load_or_empty(&state, &session.user_id).await?;
    profile.avatar_url = Some(url);
    state.services.social.save_profile(&profile).await?;
    tracing::info!("Avatar updated for {}", session.user_id);
    Ok(success_to_api_response(profile))
}

pub async fn update_profile(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<ApiResponse<Profile>>, VibeError> {
    let profile = req.into_profile(&session.user_id)?;
    state.services.social.save_profile(&profile).await?;
    tracing::info!("Profile saved for {}", session.user_id);
    Ok(success_to_api_response(profile))
}

pub async fn list_statuses() -> Json<ApiResponse<Vec<&'static str>>> {
    success_to_api_response(VIBE_STATUSES.to_vec())
}

use axum::{Json, extract::State};

use crate::{
    AppState,
    error::VibeError,
    result::ApiResponse,
    utils::success_to_api_response,
};

use super::model::{DiscoverView, VibeRequest};

fn view(state: &AppState, snapshot: &crate::discovery::DiscoverySnapshot) -> DiscoverView {
    DiscoverView::new(
        snapshot,
        state.config.discovery_radius,
        &state.config.map_tile_url,
    )
}

// 获取发现页状态，没有运行中的实例时挂载一个
pub async fn discover(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<DiscoverView>>, VibeError> {
    let snapshot = state.discovery_snapshot().await?;
    Ok(success_to_api_response(view(&state, &snapshot)))
}

pub async fn refresh(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<DiscoverView>>, VibeError> {
    let coordinator = state.discovery().await?;
    coordinator.refresh();
    Ok(success_to_api_response(view(&state, &coordinator.snapshot())))
}

pub async fn send_vibe(
    State(state): State<AppState>,
    Json(req): Json<VibeRequest>,
) -> Result<Json<ApiResponse<()>>, VibeError> {
    let target_id = req.target_id.trim();
    if target_id.is_empty() {
        return Err(VibeError::Validation("target_id is required".to_string()));
    }

    let coordinator = state.discovery().await?;
    coordinator.send_vibe(target_id).await?;
    tracing::info!("Vibe sent to {}", target_id);
    Ok(success_to_api_response(()))
}

use axum::{
    Json,
    extract::State,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::Utc;

use crate::{AppState, result::ApiResponse, utils::error_codes};

use super::model::{EnvFlags, HealthReport};

// 健康检查，后端不可用时返回 500
pub async fn health(State(state): State<AppState>) -> Response {
    let backend = state.services.social.health().await;
    let healthy = backend.connected;

    let report = HealthReport {
        status: if healthy { "healthy" } else { "unhealthy" },
        timestamp: Utc::now(),
        env_vars: EnvFlags {
            supabase_url: !state.config.supabase_url.is_empty(),
            supabase_key: !state.config.supabase_anon_key.is_empty(),
            map_tile_url: !state.config.map_tile_url.is_empty(),
            signed_in: state.session.is_some(),
        },
        backend,
    };

    let (status, body) = if healthy {
        (StatusCode::OK, ApiResponse::success(report))
    } else {
        tracing::warn!("Backend unhealthy: {:?}", report.backend.error);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            ApiResponse {
                code: error_codes::BACKEND_ERROR,
                msg: "Backend unreachable".to_string(),
                resp_data: Some(report),
            },
        )
    };

    let mut response = (status, Json(body)).into_response();
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    response
}

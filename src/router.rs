use axum::{
    Router,
    routing::{delete, get, post, put},
};

use crate::{
    AppState,
    middleware::{auth_guard, log_errors},
    routes,
};

/// Local API consumed by the UI shell.
pub fn create_router(state: AppState) -> Router {
    let public_routes = Router::new().route("/health", get(routes::health::health));

    let protected_routes = Router::new()
        // 发现页
        .route("/discover", get(routes::discover::discover))
        .route("/discover/refresh", post(routes::discover::refresh))
        .route("/vibes", post(routes::discover::send_vibe))
        // 聊天
        .route("/chats", get(routes::chat::list_chats))
        .route(
            "/chat/{id}/messages",
            get(routes::chat::list_messages).post(routes::chat::send_message),
        )
        .route("/chat/{id}/images", post(routes::chat::send_image))
        .route("/chat/{id}/typing", put(routes::chat::set_typing))
        .route("/chat/{id}", delete(routes::chat::close_chat))
        // 个人资料
        .route(
            "/profile",
            get(routes::profile::get_profile).put(routes::profile::update_profile),
        )
        .route("/profile/avatar", put(routes::profile::upload_avatar))
        .route("/profile/statuses", get(routes::profile::list_statuses))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth_guard,
        ));

    let router = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(axum::middleware::from_fn(log_errors));

    // 根据编译模式决定是否添加CORS
    #[cfg(debug_assertions)]
    let router = {
        tracing::debug!("Adding CORS layer for development mode");
        router.layer(tower_http::cors::CorsLayer::permissive())
    };

    router.with_state(state)
}

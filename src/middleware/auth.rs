use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::{
    AppState,
    utils::{error_codes, error_to_api_response},
};

/// Rejects requests while the daemon has no signed-in session.
pub async fn auth_guard(State(state): State<AppState>, mut req: Request<Body>, next: Next) -> Response {
    match state.session.clone() {
        Some(session) => {
            // 供处理函数通过 Extension 读取
            req.extensions_mut().insert(session);
            next.run(req).await
        }
        None => {
            tracing::debug!("Rejecting {} {}: not signed in", req.method(), req.uri().path());
            (
                StatusCode::UNAUTHORIZED,
                error_to_api_response::<()>(error_codes::AUTH_FAILED, "Not signed in".to_string()),
            )
                .into_response()
        }
    }
}

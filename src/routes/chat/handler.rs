use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
};

use crate::{
    AppState,
    error::VibeError,
    models::ConversationSummary,
    result::ApiResponse,
    utils::{image_content_type, success_to_api_response},
};

use super::model::{ChatView, SendMessageRequest, TypingRequest};

pub async fn list_chats(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<ConversationSummary>>>, VibeError> {
    let conversations = state.services.social.list_conversations().await?;
    Ok(success_to_api_response(conversations))
}

pub async fn list_messages(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
) -> Result<Json<ApiResponse<ChatView>>, VibeError> {
    let chat = state.chat(&conversation_id).await?;
    let session = chat.lock().await;
    Ok(success_to_api_response(ChatView::from(&*session)))
}

pub async fn send_message(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    Json(req): Json<SendMessageRequest>,
) -> Result<Json<ApiResponse<ChatView>>, VibeError> {
    let chat = state.chat(&conversation_id).await?;
    let mut session = chat.lock().await;
    session.send_text(&req.content).await?;
    Ok(success_to_api_response(ChatView::from(&*session)))
}

// 图片以原始请求体上传
pub async fn send_image(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ApiResponse<ChatView>>, VibeError> {
    let content_type = image_content_type(&headers)?;
    let chat = state.chat(&conversation_id).await?;
    let mut session = chat.lock().await;
    session.send_image(body.to_vec(), &content_type).await?;
    Ok(success_to_api_response(ChatView::from(&*session)))
}

pub async fn set_typing(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    Json(req): Json<TypingRequest>,
) -> Result<Json<ApiResponse<bool>>, VibeError> {
    let chat = state.chat(&conversation_id).await?;
    let mut session = chat.lock().await;
    session.set_typing(req.typing);
    Ok(success_to_api_response(session.others_typing()))
}

pub async fn close_chat(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
) -> Json<ApiResponse<bool>> {
    let closed = state.close_chat(&conversation_id).await;
    success_to_api_response(closed)
}

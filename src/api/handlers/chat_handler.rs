use axum::{
    Json,
    body::Body,
    extract::{Path, State},
    http::{HeaderValue, header},
    response::{IntoResponse, Response},
};
use futures_util::TryStreamExt;
use tracing::debug;

use crate::{
    api::{app_state::AppState, dto::chat_dto::*, dto::operation_dto::*},
    error::AppError,
};

pub async fn list_chats(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.store.list_summaries())
}

pub async fn get_history(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<impl IntoResponse, AppError> {
    debug!("Getting history of chat {}", id);

    let history = state.store.history(id).await?;
    Ok(Json(history))
}

pub async fn remove_chat(State(state): State<AppState>, Path(id): Path<u64>) -> Response {
    debug!("Removing chat {}", id);

    let result = state.store.remove(id).await;
    OperationResponse::from_result(result, format!("remove chat {}", id))
}

/// 流式生成
///
/// 响应体为纯文本，每个片段占一行；会话 id 在响应头 `X-Chat-Id` 中返回。
pub async fn stream(
    State(state): State<AppState>,
    Json(request): Json<StreamRequest>,
) -> Result<Response, AppError> {
    let session_id = request.session_id()?;
    debug!("Streaming answer for chat {:?}", session_id);

    let handle = state.orchestrator.start(&request.text, session_id).await?;
    let body = Body::from_stream(
        handle
            .fragments
            .map_ok(|fragment| format!("{}\n", fragment)),
    );

    let mut response = Response::new(body);
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    headers.insert(CHAT_ID_HEADER, HeaderValue::from(handle.chat_id));
    Ok(response)
}

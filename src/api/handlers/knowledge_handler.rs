use axum::{Json, extract::State, response::IntoResponse, response::Response};
use tracing::debug;

use crate::api::{app_state::AppState, dto::knowledge_dto::*, dto::operation_dto::*};

pub async fn list_sources(State(state): State<AppState>) -> impl IntoResponse {
    Json(KnowledgeStatusResponse {
        data: state.registry.status(),
    })
}

pub async fn activate_source(
    State(state): State<AppState>,
    Json(request): Json<SourceNameRequest>,
) -> Response {
    debug!("Activating knowledge source: {}", request.name);

    let result = state.registry.set_active(&request.name, true);
    OperationResponse::from_result(result, format!("activate {}", request.name))
}

pub async fn deactivate_source(
    State(state): State<AppState>,
    Json(request): Json<SourceNameRequest>,
) -> Response {
    debug!("Deactivating knowledge source: {}", request.name);

    let result = state.registry.set_active(&request.name, false);
    OperationResponse::from_result(result, format!("deactivate {}", request.name))
}

pub async fn rename_source(
    State(state): State<AppState>,
    Json(request): Json<RenameSourceRequest>,
) -> Response {
    debug!(
        "Renaming knowledge source: {} -> {}",
        request.old_name, request.new_name
    );

    let result = state
        .registry
        .rename(&request.old_name, &request.new_name)
        .await;
    OperationResponse::from_result(
        result,
        format!("rename {} -> {}", request.old_name, request.new_name),
    )
}

pub async fn remove_source(
    State(state): State<AppState>,
    Json(request): Json<SourceNameRequest>,
) -> Response {
    debug!("Removing knowledge source: {}", request.name);

    let result = state.registry.remove(&request.name).await;
    OperationResponse::from_result(result, format!("remove {}", request.name))
}

pub async fn append_text(
    State(state): State<AppState>,
    Json(request): Json<AppendTextRequest>,
) -> Response {
    debug!(
        "Appending {} characters to knowledge source {}",
        request.text.chars().count(),
        request.name
    );

    let result = state.registry.append_text(&request.name, &request.text).await;
    OperationResponse::from_result(result, format!("append text to {}", request.name))
}

pub async fn append_document(
    State(state): State<AppState>,
    Json(request): Json<DocumentRequest>,
) -> Response {
    debug!(
        "Appending document {} to knowledge source {}",
        request.document_path.display(),
        request.name
    );

    let result = state
        .registry
        .append_document(&request.name, &request.document_path)
        .await;
    OperationResponse::from_result(
        result,
        format!(
            "append {} to {}",
            request.document_path.display(),
            request.name
        ),
    )
}

pub async fn create_source(
    State(state): State<AppState>,
    Json(request): Json<DocumentRequest>,
) -> Response {
    debug!(
        "Creating knowledge source {} from {}",
        request.name,
        request.document_path.display()
    );

    let result = state
        .registry
        .create_from_document(&request.name, &request.document_path)
        .await;
    OperationResponse::from_result(
        result,
        format!(
            "create {} from {}",
            request.name,
            request.document_path.display()
        ),
    )
}

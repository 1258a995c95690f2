use axum::{Json, extract::State, response::IntoResponse};
use tracing::debug;

use crate::{
    api::{app_state::AppState, dto::params_dto::*},
    error::AppError,
    models::params::ModelParametersUpdate,
};

pub async fn set_params(
    State(state): State<AppState>,
    Json(request): Json<ModelParametersUpdate>,
) -> Result<impl IntoResponse, AppError> {
    debug!("Updating model parameters: {:?}", request);

    let params = state.orchestrator.set_parameters(&request)?;

    Ok(Json(SetParamsResponse {
        params_set: true,
        params,
    }))
}

pub async fn get_params(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.orchestrator.parameters())
}

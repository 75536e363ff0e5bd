use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use mcm_kubevirt::Credentials;
use tracing::info;

use crate::dto::{
    CreateMachineRequest, ListMachinesRequest, ListMachinesResponse, MachineRequest,
    ProviderIdResponse,
};
use crate::error::ApiError;
use crate::state::AppState;

fn credentials(secret: &k8s_openapi::api::core::v1::Secret) -> Result<Credentials, ApiError> {
    let credentials = Credentials::from_secret(secret);
    credentials.validate()?;
    Ok(credentials)
}

fn require_name(name: &str) -> Result<(), ApiError> {
    if name.trim().is_empty() {
        return Err(ApiError::BadRequest("machine name is required".into()));
    }
    Ok(())
}

pub async fn create_machine(
    State(state): State<AppState>,
    Json(req): Json<CreateMachineRequest>,
) -> Result<(StatusCode, Json<ProviderIdResponse>), ApiError> {
    require_name(&req.machine_name)?;
    req.provider_spec.validate()?;
    let credentials = credentials(&req.secret)?;

    let provider_id = state
        .driver
        .create_machine(&req.machine_name, &req.provider_spec, &credentials)
        .await?;

    info!(machine = %req.machine_name, provider_id = %provider_id, "machine created");
    Ok((StatusCode::CREATED, Json(ProviderIdResponse { provider_id })))
}

pub async fn delete_machine(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<MachineRequest>,
) -> Result<Json<ProviderIdResponse>, ApiError> {
    require_name(&name)?;
    let credentials = credentials(&req.secret)?;

    let provider_id = state.driver.delete_machine(&name, &credentials).await?;

    info!(machine = %name, provider_id = %provider_id, "machine deleted");
    Ok(Json(ProviderIdResponse { provider_id }))
}

pub async fn machine_status(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<MachineRequest>,
) -> Result<Json<ProviderIdResponse>, ApiError> {
    require_name(&name)?;
    let credentials = credentials(&req.secret)?;

    let provider_id = state.driver.get_machine_status(&name, &credentials).await?;
    Ok(Json(ProviderIdResponse { provider_id }))
}

pub async fn shutdown_machine(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<MachineRequest>,
) -> Result<Json<ProviderIdResponse>, ApiError> {
    require_name(&name)?;
    let credentials = credentials(&req.secret)?;

    let provider_id = state.driver.shutdown_machine(&name, &credentials).await?;

    info!(machine = %name, provider_id = %provider_id, "machine shut down");
    Ok(Json(ProviderIdResponse { provider_id }))
}

pub async fn list_machines(
    State(state): State<AppState>,
    Json(req): Json<ListMachinesRequest>,
) -> Result<Json<ListMachinesResponse>, ApiError> {
    let credentials = credentials(&req.secret)?;

    let machines = state
        .driver
        .list_machines(&req.provider_spec, &credentials)
        .await?;
    Ok(Json(ListMachinesResponse { machines }))
}

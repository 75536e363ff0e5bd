use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Secret;
use mcm_kubevirt::MachineSpec;
use serde::{Deserialize, Serialize};

// ── Requests ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMachineRequest {
    pub machine_name: String,
    pub provider_spec: MachineSpec,
    pub secret: Secret,
}

/// Body of the per-machine operations: delete, status, shutdown.
#[derive(Debug, Deserialize)]
pub struct MachineRequest {
    pub secret: Secret,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListMachinesRequest {
    #[serde(default)]
    pub provider_spec: MachineSpec,
    pub secret: Secret,
}

// ── Responses ──────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderIdResponse {
    pub provider_id: String,
}

#[derive(Debug, Serialize)]
pub struct ListMachinesResponse {
    /// Provider ID to machine name.
    pub machines: BTreeMap<String, String>,
}

use k8s_openapi::api::core::v1::PersistentVolumeClaimSpec;
use kube::CustomResource;
use serde::{Deserialize, Serialize};

// ── DataVolume ───────────────────────────────────────────────────────

/// A CDI DataVolume: a PVC plus the recipe for populating it.
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[kube(
    group = "cdi.kubevirt.io",
    version = "v1beta1",
    kind = "DataVolume",
    plural = "datavolumes",
    namespaced,
    schema = "disabled",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct DataVolumeSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<DataVolumeSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pvc: Option<PersistentVolumeClaimSpec>,
}

/// Where a DataVolume's content comes from. Exactly one field is set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataVolumeSource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http: Option<HttpSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pvc: Option<PvcSource>,
}

impl DataVolumeSource {
    /// Import an image from an HTTP(S) URL.
    pub fn http(url: impl Into<String>) -> Self {
        Self {
            http: Some(HttpSource { url: url.into() }),
            pvc: None,
        }
    }

    /// Clone an existing PVC.
    pub fn clone_pvc(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            http: None,
            pvc: Some(PvcSource {
                name: name.into(),
                namespace: namespace.into(),
            }),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HttpSource {
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PvcSource {
    pub name: String,
    pub namespace: String,
}

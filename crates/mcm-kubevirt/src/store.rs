use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::{Client, ResourceExt};
use kubevirt_api::{DataVolume, VirtualMachine};

#[cfg(test)]
use mockall::automock;

/// Field manager recorded on writes made by the driver.
const FIELD_MANAGER: &str = "mcm-kubevirt";

/// Failure of a single call against the cluster API.
///
/// Not-found and conflict are split out because callers treat them
/// differently from every other failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("{0}")]
    Api(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

impl From<kube::Error> for StoreError {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(ae) if ae.code == 404 => Self::NotFound,
            kube::Error::Api(ae) if ae.code == 409 => Self::Conflict(ae.message),
            other => Self::Api(other.to_string()),
        }
    }
}

/// Typed CRUD against the namespaced objects the driver manages.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get_virtual_machine(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<VirtualMachine, StoreError>;

    /// List VMs in `namespace` whose labels contain every entry of `labels`.
    /// An empty map lists the whole namespace.
    async fn list_virtual_machines(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<VirtualMachine>, StoreError>;

    /// Create a VM in the namespace set on its metadata. Returns the stored
    /// object, including server-assigned fields such as its UID.
    async fn create_virtual_machine(
        &self,
        vm: &VirtualMachine,
    ) -> Result<VirtualMachine, StoreError>;

    /// Set only the running flag of a VM. With a resource version the write
    /// is conditional and fails with [`StoreError::Conflict`] when stale.
    async fn set_virtual_machine_running(
        &self,
        namespace: &str,
        name: &str,
        resource_version: Option<String>,
        running: bool,
    ) -> Result<VirtualMachine, StoreError>;

    async fn delete_virtual_machine(&self, namespace: &str, name: &str) -> Result<(), StoreError>;

    async fn get_data_volume(&self, namespace: &str, name: &str)
        -> Result<DataVolume, StoreError>;

    async fn create_secret(&self, secret: &Secret) -> Result<Secret, StoreError>;
}

/// Render `labels` as an equality-based label selector.
pub fn label_selector(labels: &BTreeMap<String, String>) -> Option<String> {
    if labels.is_empty() {
        return None;
    }
    Some(
        labels
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(","),
    )
}

/// Merge patch touching `spec.running` and nothing else. The resource
/// version, when given, makes the API server reject a stale write.
pub fn running_patch(resource_version: Option<&str>, running: bool) -> serde_json::Value {
    let mut patch = serde_json::json!({ "spec": { "running": running } });
    if let Some(rv) = resource_version {
        patch["metadata"] = serde_json::json!({ "resourceVersion": rv });
    }
    patch
}

/// [`ObjectStore`] backed by a `kube::Client`.
#[derive(Clone)]
pub struct KubeObjectStore {
    client: Client,
}

impl KubeObjectStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn namespace_of<K: ResourceExt>(obj: &K) -> Result<String, StoreError> {
        obj.namespace()
            .ok_or_else(|| StoreError::Api(format!("{} has no namespace", obj.name_any())))
    }
}

#[async_trait]
impl ObjectStore for KubeObjectStore {
    async fn get_virtual_machine(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<VirtualMachine, StoreError> {
        let api: Api<VirtualMachine> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get(name).await?)
    }

    async fn list_virtual_machines(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<VirtualMachine>, StoreError> {
        let api: Api<VirtualMachine> = Api::namespaced(self.client.clone(), namespace);
        let mut params = ListParams::default();
        if let Some(selector) = label_selector(labels) {
            params = params.labels(&selector);
        }
        Ok(api.list(&params).await?.items)
    }

    async fn create_virtual_machine(
        &self,
        vm: &VirtualMachine,
    ) -> Result<VirtualMachine, StoreError> {
        let namespace = Self::namespace_of(vm)?;
        let api: Api<VirtualMachine> = Api::namespaced(self.client.clone(), &namespace);
        Ok(api.create(&PostParams::default(), vm).await?)
    }

    async fn set_virtual_machine_running(
        &self,
        namespace: &str,
        name: &str,
        resource_version: Option<String>,
        running: bool,
    ) -> Result<VirtualMachine, StoreError> {
        let api: Api<VirtualMachine> = Api::namespaced(self.client.clone(), namespace);
        let patch = running_patch(resource_version.as_deref(), running);
        Ok(api
            .patch(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
            .await?)
    }

    async fn delete_virtual_machine(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        let api: Api<VirtualMachine> = Api::namespaced(self.client.clone(), namespace);
        api.delete(name, &DeleteParams::default()).await?;
        Ok(())
    }

    async fn get_data_volume(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<DataVolume, StoreError> {
        let api: Api<DataVolume> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get(name).await?)
    }

    async fn create_secret(&self, secret: &Secret) -> Result<Secret, StoreError> {
        let namespace = Self::namespace_of(secret)?;
        let api: Api<Secret> = Api::namespaced(self.client.clone(), &namespace);
        Ok(api.create(&PostParams::default(), secret).await?)
    }
}

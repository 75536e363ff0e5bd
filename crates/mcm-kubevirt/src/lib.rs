//! Machine lifecycle driver for KubeVirt.
//!
//! Translates the five machine-controller operations (create, delete,
//! get status, list, shut down) into calls against a KubeVirt cluster.
//! The cluster is reached through two injected collaborators, a
//! [`ClientFactory`] and a [`ServerVersionFactory`], so the driver itself
//! holds no state between calls.

pub mod affinity;
pub mod cloud_init;
pub mod driver;
pub mod factory;
pub mod network;
pub mod provider_id;
pub mod retry;
pub mod store;
pub mod types;

use std::collections::BTreeMap;

use async_trait::async_trait;

pub use driver::KubeVirtDriver;
pub use factory::{ClientFactory, KubeconfigClientFactory, ServerVersionFactory};
pub use store::{KubeObjectStore, ObjectStore, StoreError};
pub use types::{Credentials, MachineSpec, NetworkSpec};

/// Name this driver registers under; also the provider ID scheme.
pub const PROVIDER_NAME: &str = "kubevirt";

/// Label carrying the machine class name. A DataVolume with that name in the
/// VM's namespace is used as a pre-staged boot image.
pub const MACHINE_CLASS_LABEL: &str = "mcm.gardener.cloud/machineclass";

/// Label set on every VM (and its VMI template) to the machine name.
pub const VM_NAME_LABEL: &str = "kubevirt.io/vm";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to create client: {0}")]
    Client(String),

    #[error("failed to get server version: {0}")]
    ServerVersion(String),

    #[error("machine {name} not found")]
    MachineNotFound { name: String },

    #[error("failed to get {kind} {name}: {source}")]
    Get {
        kind: &'static str,
        name: String,
        source: StoreError,
    },

    #[error("failed to create {kind} {name}: {source}")]
    Create {
        kind: &'static str,
        name: String,
        source: StoreError,
    },

    #[error("failed to update {kind} {name}: {source}")]
    Update {
        kind: &'static str,
        name: String,
        source: StoreError,
    },

    #[error("failed to delete {kind} {name}: {source}")]
    Delete {
        kind: &'static str,
        name: String,
        source: StoreError,
    },

    #[error("failed to list VirtualMachines in namespace {namespace}: {source}")]
    List {
        namespace: String,
        source: StoreError,
    },

    #[error("failed to add ssh keys to cloud-init: {0}")]
    UserData(String),

    #[error("failed to render network data: {0}")]
    NetworkData(String),

    #[error("invalid provider spec: {0}")]
    InvalidSpec(String),

    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("invalid provider id: {0}")]
    InvalidProviderId(String),
}

impl Error {
    /// True when the machine named in the request does not exist.
    pub fn is_machine_not_found(&self) -> bool {
        matches!(self, Self::MachineNotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// The lifecycle operations a machine controller drives.
///
/// Every call carries the credentials for the target cluster; nothing is
/// cached between calls. Each operation returns the provider ID of the
/// machine it acted on.
#[async_trait]
pub trait MachineDriver: Send + Sync + 'static {
    /// Create the VM, its boot volume and its cloud-init secret.
    async fn create_machine(
        &self,
        name: &str,
        spec: &MachineSpec,
        credentials: &Credentials,
    ) -> Result<String>;

    /// Delete the VM. Returns an empty ID if it was already gone.
    async fn delete_machine(&self, name: &str, credentials: &Credentials) -> Result<String>;

    /// Resolve the provider ID of an existing VM.
    async fn get_machine_status(&self, name: &str, credentials: &Credentials) -> Result<String>;

    /// Map provider ID to machine name for every VM matching `spec.tags`.
    async fn list_machines(
        &self,
        spec: &MachineSpec,
        credentials: &Credentials,
    ) -> Result<BTreeMap<String, String>>;

    /// Stop the VM by clearing its running flag.
    async fn shutdown_machine(&self, name: &str, credentials: &Credentials) -> Result<String>;
}

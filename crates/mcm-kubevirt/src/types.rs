use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{PodDNSConfig, Secret};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kubevirt_api::vm::{Cpu, Memory, ResourceRequirements};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Secret key holding the kubeconfig of the KubeVirt cluster.
pub const KUBECONFIG_KEY: &str = "kubeconfig";

/// Secret key holding the cloud-init user data for new machines.
pub const USER_DATA_KEY: &str = "userData";

/// Provider-specific part of a machine class.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MachineSpec {
    /// Image imported into the boot volume when no pre-staged volume exists.
    #[serde(rename = "sourceURL")]
    pub source_url: String,
    pub storage_class_name: String,
    pub pvc_size: Quantity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu: Option<Cpu>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<Memory>,
    pub resources: ResourceRequirements,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dns_policy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dns_config: Option<PodDNSConfig>,
    pub region: String,
    pub zone: String,
    #[serde(rename = "sshKeys", skip_serializing_if = "Vec::is_empty")]
    pub ssh_keys: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub networks: Vec<NetworkSpec>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
}

/// A secondary network to attach, by multus network attachment name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkSpec {
    pub name: String,
    /// Use this network instead of the pod network as the default route.
    #[serde(default)]
    pub default: bool,
}

impl MachineSpec {
    /// Reject specs a VM cannot be created from.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        if self.source_url.trim().is_empty() {
            problems.push("sourceURL is required".to_string());
        }
        if self.storage_class_name.trim().is_empty() {
            problems.push("storageClassName is required".to_string());
        }
        if self.pvc_size.0.trim().is_empty() {
            problems.push("pvcSize is required".to_string());
        }
        if !self.resources.requests.contains_key("memory") {
            problems.push("resources.requests.memory is required".to_string());
        }
        for (i, key) in self.ssh_keys.iter().enumerate() {
            if key.trim().is_empty() {
                problems.push(format!("sshKeys[{i}] is empty"));
            }
        }
        for (i, net) in self.networks.iter().enumerate() {
            if net.name.trim().is_empty() {
                problems.push(format!("networks[{i}].name is required"));
            }
        }
        if self.networks.iter().filter(|n| n.default).count() > 1 {
            problems.push("at most one network may be default".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(Error::InvalidSpec(problems.join("; ")))
        }
    }
}

/// Opaque credential blob handed to the client factories.
///
/// Mirrors the data map of the machine class secret. Only the factories
/// interpret the kubeconfig; the driver itself reads the user data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Credentials {
    data: BTreeMap<String, Vec<u8>>,
}

impl Credentials {
    pub fn new(data: BTreeMap<String, Vec<u8>>) -> Self {
        Self { data }
    }

    pub fn from_secret(secret: &Secret) -> Self {
        let data = secret
            .data
            .iter()
            .flatten()
            .map(|(k, v)| (k.clone(), v.0.clone()))
            .collect();
        Self { data }
    }

    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.data.get(key).map(Vec::as_slice)
    }

    pub fn kubeconfig(&self) -> Option<&[u8]> {
        self.get(KUBECONFIG_KEY)
    }

    /// Cloud-init user data, or an empty document when absent.
    pub fn user_data(&self) -> String {
        self.get(USER_DATA_KEY)
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .unwrap_or_default()
    }

    /// Check both required entries are present and non-empty.
    pub fn validate(&self) -> Result<()> {
        for key in [KUBECONFIG_KEY, USER_DATA_KEY] {
            match self.get(key) {
                Some(v) if !v.is_empty() => {}
                _ => return Err(Error::InvalidCredentials(format!("secret is missing {key:?}"))),
            }
        }
        Ok(())
    }
}

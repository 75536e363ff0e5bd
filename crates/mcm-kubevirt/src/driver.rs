use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::ByteString;
use k8s_openapi::api::core::v1::{
    LocalObjectReference, PersistentVolumeClaimSpec, Secret, VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::{Resource, ResourceExt};
use kubevirt_api::cdi::{DataVolumeSource, DataVolumeSpec};
use kubevirt_api::vm::{
    CloudInitNoCloudSource, DataVolumeTemplateSpec, Devices, Disk, DiskTarget, DomainSpec,
    VirtualMachineInstanceSpec, VirtualMachineInstanceTemplateSpec, VirtualMachineSpec, Volume,
};
use kubevirt_api::VirtualMachine;
use tracing::{debug, info};

use crate::affinity::build_affinity;
use crate::cloud_init::add_ssh_keys;
use crate::factory::{ClientFactory, ServerVersionFactory};
use crate::network::{NetworkLayout, build_networks};
use crate::provider_id;
use crate::retry::{RetryConfig, retry_on_conflict};
use crate::store::{ObjectStore, StoreError};
use crate::types::{Credentials, MachineSpec};
use crate::{Error, MACHINE_CLASS_LABEL, MachineDriver, Result, VM_NAME_LABEL};

const VIRTUAL_MACHINE: &str = "VirtualMachine";
const DATA_VOLUME: &str = "DataVolume";
const SECRET: &str = "Secret";

const BOOT_DISK: &str = "datavolumedisk";
const CLOUD_INIT_DISK: &str = "cloudinitdisk";
const DISK_BUS: &str = "virtio";
const TERMINATION_GRACE_PERIOD_SECONDS: i64 = 30;
const BOOT_VOLUME_ACCESS_MODE: &str = "ReadWriteOnce";

/// Key of the cloud-init payload inside the per-machine user data secret.
const USER_DATA_SECRET_KEY: &str = "userdata";

/// [`MachineDriver`] for KubeVirt clusters.
///
/// Each call resolves a fresh object store from the credentials, so one
/// driver serves any number of clusters.
pub struct KubeVirtDriver {
    clients: Arc<dyn ClientFactory>,
    versions: Arc<dyn ServerVersionFactory>,
    retry: RetryConfig,
}

impl KubeVirtDriver {
    pub fn new(clients: Arc<dyn ClientFactory>, versions: Arc<dyn ServerVersionFactory>) -> Self {
        Self {
            clients,
            versions,
            retry: RetryConfig::default(),
        }
    }

    /// Override the conflict retry budget used by shutdown.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    async fn get_vm(store: &dyn ObjectStore, namespace: &str, name: &str) -> Result<VirtualMachine> {
        store
            .get_virtual_machine(namespace, name)
            .await
            .map_err(|source| match source {
                StoreError::NotFound => Error::MachineNotFound {
                    name: name.to_string(),
                },
                source => Error::Get {
                    kind: VIRTUAL_MACHINE,
                    name: name.to_string(),
                    source,
                },
            })
    }

    /// Name of the pre-staged boot volume for `machine_class`, if one exists.
    async fn pre_staged_volume(
        store: &dyn ObjectStore,
        namespace: &str,
        machine_class: Option<&str>,
    ) -> Result<Option<String>> {
        let Some(name) = machine_class.filter(|n| !n.is_empty()) else {
            return Ok(None);
        };

        match store.get_data_volume(namespace, name).await {
            Ok(dv) => Ok(Some(dv.name_any())),
            Err(StoreError::NotFound) => Ok(None),
            Err(source) => Err(Error::Get {
                kind: DATA_VOLUME,
                name: name.to_string(),
                source,
            }),
        }
    }
}

/// Everything needed to render the VirtualMachine object of a new machine.
struct VirtualMachinePlan<'a> {
    name: &'a str,
    namespace: &'a str,
    spec: &'a MachineSpec,
    labels: BTreeMap<String, String>,
    networks: NetworkLayout,
    affinity: Option<k8s_openapi::api::core::v1::Affinity>,
    boot_source: DataVolumeSource,
    user_data_secret: &'a str,
}

impl VirtualMachinePlan<'_> {
    fn render(self) -> VirtualMachine {
        let boot_volume = DataVolumeTemplateSpec {
            metadata: ObjectMeta {
                name: Some(self.name.to_string()),
                namespace: Some(self.namespace.to_string()),
                ..Default::default()
            },
            spec: DataVolumeSpec {
                source: Some(self.boot_source),
                pvc: Some(PersistentVolumeClaimSpec {
                    storage_class_name: Some(self.spec.storage_class_name.clone()),
                    access_modes: Some(vec![BOOT_VOLUME_ACCESS_MODE.to_string()]),
                    resources: Some(VolumeResourceRequirements {
                        requests: Some(BTreeMap::from([(
                            "storage".to_string(),
                            self.spec.pvc_size.clone(),
                        )])),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
            },
        };

        let disk = |name: &str| Disk {
            name: name.to_string(),
            disk: Some(DiskTarget {
                bus: DISK_BUS.to_string(),
            }),
        };

        let instance = VirtualMachineInstanceSpec {
            domain: DomainSpec {
                cpu: self.spec.cpu.clone(),
                memory: self.spec.memory.clone(),
                resources: self.spec.resources.clone(),
                devices: Devices {
                    disks: vec![disk(BOOT_DISK), disk(CLOUD_INIT_DISK)],
                    interfaces: self.networks.interfaces,
                },
            },
            termination_grace_period_seconds: Some(TERMINATION_GRACE_PERIOD_SECONDS),
            volumes: vec![
                Volume {
                    name: BOOT_DISK.to_string(),
                    data_volume: Some(kubevirt_api::vm::DataVolumeSource {
                        name: self.name.to_string(),
                    }),
                    cloud_init_no_cloud: None,
                },
                Volume {
                    name: CLOUD_INIT_DISK.to_string(),
                    data_volume: None,
                    cloud_init_no_cloud: Some(CloudInitNoCloudSource {
                        user_data_secret_ref: Some(LocalObjectReference {
                            name: self.user_data_secret.to_string(),
                        }),
                        network_data: self.networks.network_data,
                    }),
                },
            ],
            networks: self.networks.networks,
            affinity: self.affinity,
            dns_policy: self.spec.dns_policy.clone(),
            dns_config: self.spec.dns_config.clone(),
        };

        let mut vm = VirtualMachine::new(
            self.name,
            VirtualMachineSpec {
                running: Some(true),
                template: VirtualMachineInstanceTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(BTreeMap::from([(
                            VM_NAME_LABEL.to_string(),
                            self.name.to_string(),
                        )])),
                        ..Default::default()
                    }),
                    spec: instance,
                },
                data_volume_templates: vec![boot_volume],
            },
        );
        vm.metadata.namespace = Some(self.namespace.to_string());
        vm.metadata.labels = Some(self.labels);
        vm
    }
}

/// Tags first, then the fixed VM name label on top.
fn machine_labels(name: &str, tags: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    let mut labels = tags.clone();
    labels.insert(VM_NAME_LABEL.to_string(), name.to_string());
    labels
}

fn user_data_secret_name(machine_name: &str) -> String {
    format!("userdata-{machine_name}-{}", chrono::Utc::now().timestamp())
}

#[async_trait]
impl MachineDriver for KubeVirtDriver {
    async fn create_machine(
        &self,
        name: &str,
        spec: &MachineSpec,
        credentials: &Credentials,
    ) -> Result<String> {
        let (store, namespace) = self.clients.client(credentials).await?;

        let secret_name = user_data_secret_name(name);
        let networks = build_networks(&spec.networks)?;

        let server_version = self.versions.server_version(credentials).await?;
        let affinity = build_affinity(&spec.region, &spec.zone, &server_version);

        let mut user_data = credentials.user_data();
        if !spec.ssh_keys.is_empty() {
            user_data = add_ssh_keys(&user_data, &spec.ssh_keys)?;
        }

        let labels = machine_labels(name, &spec.tags);
        let machine_class = labels.get(MACHINE_CLASS_LABEL).map(String::as_str);
        let boot_source = match Self::pre_staged_volume(&*store, &namespace, machine_class).await? {
            Some(volume) => {
                debug!(machine = %name, volume = %volume, "kubevirt: cloning pre-staged boot volume");
                DataVolumeSource::clone_pvc(volume, namespace.as_str())
            }
            None => DataVolumeSource::http(spec.source_url.as_str()),
        };

        let vm = VirtualMachinePlan {
            name,
            namespace: &namespace,
            spec,
            labels,
            networks,
            affinity,
            boot_source,
            user_data_secret: &secret_name,
        }
        .render();

        let created = store
            .create_virtual_machine(&vm)
            .await
            .map_err(|source| Error::Create {
                kind: VIRTUAL_MACHINE,
                name: name.to_string(),
                source,
            })?;
        info!(machine = %name, namespace = %namespace, "kubevirt: virtual machine created");

        // The VM is not rolled back if this fails.
        let secret = Secret {
            metadata: ObjectMeta {
                name: Some(secret_name.clone()),
                namespace: created.namespace().or_else(|| Some(namespace.clone())),
                owner_references: created.controller_owner_ref(&()).map(|owner| vec![owner]),
                ..Default::default()
            },
            data: Some(BTreeMap::from([(
                USER_DATA_SECRET_KEY.to_string(),
                ByteString(user_data.into_bytes()),
            )])),
            ..Default::default()
        };
        store
            .create_secret(&secret)
            .await
            .map_err(|source| Error::Create {
                kind: SECRET,
                name: secret_name.clone(),
                source,
            })?;
        debug!(machine = %name, secret = %secret_name, "kubevirt: user data secret created");

        Ok(provider_id::encode(name))
    }

    async fn delete_machine(&self, name: &str, credentials: &Credentials) -> Result<String> {
        let (store, namespace) = self.clients.client(credentials).await?;

        let vm = match Self::get_vm(&*store, &namespace, name).await {
            Ok(vm) => vm,
            Err(e) if e.is_machine_not_found() => {
                info!(machine = %name, "kubevirt: virtual machine already gone, skipping delete");
                return Ok(String::new());
            }
            Err(e) => return Err(e),
        };

        let vm_name = vm.name_any();
        match store.delete_virtual_machine(&namespace, &vm_name).await {
            Ok(()) => info!(machine = %vm_name, namespace = %namespace, "kubevirt: virtual machine deleted"),
            Err(StoreError::NotFound) => {
                debug!(machine = %vm_name, "kubevirt: virtual machine vanished during delete");
            }
            Err(source) => {
                return Err(Error::Delete {
                    kind: VIRTUAL_MACHINE,
                    name: vm_name,
                    source,
                });
            }
        }

        Ok(provider_id::encode(&vm_name))
    }

    async fn get_machine_status(&self, name: &str, credentials: &Credentials) -> Result<String> {
        let (store, namespace) = self.clients.client(credentials).await?;
        let vm = Self::get_vm(&*store, &namespace, name).await?;
        Ok(provider_id::encode(&vm.name_any()))
    }

    async fn list_machines(
        &self,
        spec: &MachineSpec,
        credentials: &Credentials,
    ) -> Result<BTreeMap<String, String>> {
        let (store, namespace) = self.clients.client(credentials).await?;

        let vms = store
            .list_virtual_machines(&namespace, &spec.tags)
            .await
            .map_err(|source| Error::List {
                namespace: namespace.clone(),
                source,
            })?;
        debug!(namespace = %namespace, count = vms.len(), "kubevirt: listed virtual machines");

        Ok(vms
            .iter()
            .map(|vm| {
                let name = vm.name_any();
                (provider_id::encode(&name), name)
            })
            .collect())
    }

    async fn shutdown_machine(&self, name: &str, credentials: &Credentials) -> Result<String> {
        let (store, namespace) = self.clients.client(credentials).await?;
        let vm = Self::get_vm(&*store, &namespace, name).await?;
        let vm_name = vm.name_any();

        // First attempt uses the version we just read; retries re-read it.
        let mut current = Some(vm.resource_version());
        retry_on_conflict(&self.retry, "shutdown machine", StoreError::is_conflict, || {
            let store = store.clone();
            let namespace = namespace.clone();
            let vm_name = vm_name.clone();
            let cached = current.take();
            async move {
                let resource_version = match cached {
                    Some(rv) => rv,
                    None => store
                        .get_virtual_machine(&namespace, &vm_name)
                        .await?
                        .resource_version(),
                };
                store
                    .set_virtual_machine_running(&namespace, &vm_name, resource_version, false)
                    .await
            }
        })
        .await
        .map_err(|source| Error::Update {
            kind: VIRTUAL_MACHINE,
            name: vm_name.clone(),
            source,
        })?;
        info!(machine = %vm_name, namespace = %namespace, "kubevirt: virtual machine stopped");

        Ok(provider_id::encode(&vm_name))
    }
}

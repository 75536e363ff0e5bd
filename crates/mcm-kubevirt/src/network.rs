//! Translation of machine class networks into VMI interfaces and networks.

use std::collections::BTreeMap;

use kubevirt_api::vm::{Interface, Network};
use serde::Serialize;

use crate::types::NetworkSpec;
use crate::{Error, Result};

/// Name of the pod network attachment added when no spec network is default.
pub const POD_NETWORK_NAME: &str = "default";

/// Interfaces, networks and cloud-init network data for a VMI.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetworkLayout {
    pub interfaces: Vec<Interface>,
    pub networks: Vec<Network>,
    /// Cloud-init network config v2, `None` when only the pod network is attached.
    pub network_data: Option<String>,
}

#[derive(Serialize)]
struct NetworkConfig {
    version: u8,
    ethernets: BTreeMap<String, Ethernet>,
}

#[derive(Serialize)]
struct Ethernet {
    dhcp4: bool,
}

pub fn build_networks(specs: &[NetworkSpec]) -> Result<NetworkLayout> {
    if specs.is_empty() {
        return Ok(NetworkLayout {
            interfaces: vec![Interface::masquerade(POD_NETWORK_NAME)],
            networks: vec![Network::pod(POD_NETWORK_NAME)],
            network_data: None,
        });
    }

    let mut layout = NetworkLayout::default();

    if !specs.iter().any(|s| s.default) {
        layout.interfaces.push(Interface::masquerade(POD_NETWORK_NAME));
        layout.networks.push(Network::pod(POD_NETWORK_NAME));
    }

    for (i, spec) in specs.iter().enumerate() {
        let name = format!("net{i}");
        layout.interfaces.push(Interface::bridge(&name));
        layout.networks.push(Network::multus(&name, &spec.name, spec.default));
    }

    // NICs appear in the guest in interface order.
    let ethernets = (0..layout.interfaces.len())
        .map(|i| (format!("eth{i}"), Ethernet { dhcp4: true }))
        .collect();
    let config = NetworkConfig {
        version: 2,
        ethernets,
    };
    layout.network_data = Some(render_network_data(&config)?);

    Ok(layout)
}

fn render_network_data(config: &impl Serialize) -> Result<String> {
    serde_yaml::to_string(config).map_err(|e| Error::NetworkData(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn net(name: &str, default: bool) -> NetworkSpec {
        NetworkSpec {
            name: name.into(),
            default,
        }
    }

    #[test]
    fn no_networks_attaches_only_the_pod_network() {
        let layout = build_networks(&[]).unwrap();
        assert_eq!(layout.interfaces, vec![Interface::masquerade("default")]);
        assert_eq!(layout.networks, vec![Network::pod("default")]);
        assert_eq!(layout.network_data, None);
    }

    #[test]
    fn secondary_networks_keep_the_pod_network_first() {
        let layout = build_networks(&[net("vms/storage", false)]).unwrap();
        assert_eq!(
            layout.interfaces,
            vec![Interface::masquerade("default"), Interface::bridge("net0")]
        );
        assert_eq!(
            layout.networks,
            vec![Network::pod("default"), Network::multus("net0", "vms/storage", false)]
        );

        let data: serde_yaml::Value =
            serde_yaml::from_str(layout.network_data.as_deref().unwrap()).unwrap();
        assert_eq!(data["version"].as_u64(), Some(2));
        assert_eq!(data["ethernets"]["eth0"]["dhcp4"].as_bool(), Some(true));
        assert_eq!(data["ethernets"]["eth1"]["dhcp4"].as_bool(), Some(true));
    }

    #[test]
    fn default_multus_network_replaces_the_pod_network() {
        let layout = build_networks(&[net("vms/br0", true), net("vms/storage", false)]).unwrap();
        assert_eq!(
            layout.networks,
            vec![
                Network::multus("net0", "vms/br0", true),
                Network::multus("net1", "vms/storage", false),
            ]
        );
        assert_eq!(layout.interfaces.len(), 2);
        assert!(layout.interfaces.iter().all(|i| i.bridge.is_some()));
    }

    struct Unrenderable;

    impl Serialize for Unrenderable {
        fn serialize<S: serde::Serializer>(&self, _: S) -> std::result::Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("unsupported value"))
        }
    }

    #[test]
    fn render_failures_are_reported() {
        let err = render_network_data(&Unrenderable).unwrap_err();
        assert!(matches!(err, Error::NetworkData(ref msg) if msg.contains("unsupported value")));
    }
}

//! Node affinity pinning a VM to the region and zone of its machine class.

use k8s_openapi::api::core::v1::{
    Affinity, NodeAffinity, NodeSelector, NodeSelectorRequirement, NodeSelectorTerm,
};

pub const REGION_LABEL: &str = "topology.kubernetes.io/region";
pub const ZONE_LABEL: &str = "topology.kubernetes.io/zone";
pub const LEGACY_REGION_LABEL: &str = "failure-domain.beta.kubernetes.io/region";
pub const LEGACY_ZONE_LABEL: &str = "failure-domain.beta.kubernetes.io/zone";

/// First Kubernetes minor release labelling nodes with `topology.kubernetes.io/*`.
const TOPOLOGY_LABELS_SINCE: (u32, u32) = (1, 17);

/// Build the affinity for `region`/`zone` on a cluster running `server_version`.
///
/// Returns `None` unless both region and zone are set.
pub fn build_affinity(region: &str, zone: &str, server_version: &str) -> Option<Affinity> {
    if region.is_empty() || zone.is_empty() {
        return None;
    }

    let (region_label, zone_label) = if uses_legacy_topology_labels(server_version) {
        (LEGACY_REGION_LABEL, LEGACY_ZONE_LABEL)
    } else {
        (REGION_LABEL, ZONE_LABEL)
    };

    Some(Affinity {
        node_affinity: Some(NodeAffinity {
            required_during_scheduling_ignored_during_execution: Some(NodeSelector {
                node_selector_terms: vec![NodeSelectorTerm {
                    match_expressions: Some(vec![
                        label_in(region_label, region),
                        label_in(zone_label, zone),
                    ]),
                    match_fields: None,
                }],
            }),
            preferred_during_scheduling_ignored_during_execution: None,
        }),
        ..Default::default()
    })
}

fn label_in(key: &str, value: &str) -> NodeSelectorRequirement {
    NodeSelectorRequirement {
        key: key.to_string(),
        operator: "In".to_string(),
        values: Some(vec![value.to_string()]),
    }
}

/// True for servers older than 1.17.
///
/// Unparseable versions are treated as current.
pub fn uses_legacy_topology_labels(server_version: &str) -> bool {
    match parse_major_minor(server_version) {
        Some(version) => version < TOPOLOGY_LABELS_SINCE,
        None => false,
    }
}

/// Parse `v1.16.4`, `1.18+`, `v1.20.1-gke.3` and friends into `(major, minor)`.
fn parse_major_minor(version: &str) -> Option<(u32, u32)> {
    let version = version.trim().trim_start_matches('v');
    let mut parts = version.split('.');
    let major = leading_number(parts.next()?)?;
    let minor = leading_number(parts.next()?)?;
    Some((major, minor))
}

fn leading_number(s: &str) -> Option<u32> {
    let digits: String = s.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}

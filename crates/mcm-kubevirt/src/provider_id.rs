//! Provider IDs: `kubevirt://<machine name>`.
//!
//! The VM name is the only identity a machine has on the cluster side, so
//! the ID is just the name behind a fixed scheme prefix.

use crate::{Error, PROVIDER_NAME, Result};

fn prefix() -> String {
    format!("{PROVIDER_NAME}://")
}

pub fn encode(machine_name: &str) -> String {
    format!("{}{machine_name}", prefix())
}

/// Recover the machine name from a provider ID produced by [`encode`].
pub fn decode(provider_id: &str) -> Result<String> {
    provider_id
        .strip_prefix(&prefix())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .ok_or_else(|| Error::InvalidProviderId(provider_id.to_string()))
}

//! Cloud-init user data manipulation.

use serde_yaml::{Mapping, Value};

use crate::{Error, Result};

const CLOUD_CONFIG_HEADER: &str = "#cloud-config";
const SSH_AUTHORIZED_KEYS: &str = "ssh_authorized_keys";

/// Append `keys` (whitespace-trimmed) to the `ssh_authorized_keys` list of a
/// `#cloud-config` document, keeping every other entry as is.
///
/// Empty user data starts a fresh document. Anything else must carry the
/// `#cloud-config` header and hold a YAML mapping.
pub fn add_ssh_keys(user_data: &str, keys: &[String]) -> Result<String> {
    let mut config = if user_data.trim().is_empty() {
        Mapping::new()
    } else {
        parse_cloud_config(user_data)?
    };

    let added = keys.iter().map(|k| Value::from(k.trim()));
    match config.get_mut(SSH_AUTHORIZED_KEYS) {
        Some(Value::Sequence(existing)) => existing.extend(added),
        Some(slot) if slot.is_null() => *slot = Value::Sequence(added.collect()),
        Some(_) => {
            return Err(Error::UserData(format!("{SSH_AUTHORIZED_KEYS} is not a list")));
        }
        None => {
            config.insert(
                Value::from(SSH_AUTHORIZED_KEYS),
                Value::Sequence(added.collect()),
            );
        }
    }

    let body = serde_yaml::to_string(&config).map_err(|e| Error::UserData(e.to_string()))?;
    Ok(format!("{CLOUD_CONFIG_HEADER}\n{body}"))
}

fn parse_cloud_config(user_data: &str) -> Result<Mapping> {
    if !user_data.trim_start().starts_with(CLOUD_CONFIG_HEADER) {
        return Err(Error::UserData(format!(
            "user data does not start with {CLOUD_CONFIG_HEADER}"
        )));
    }

    match serde_yaml::from_str::<Value>(user_data) {
        Ok(Value::Mapping(map)) => Ok(map),
        Ok(Value::Null) => Ok(Mapping::new()),
        Ok(_) => Err(Error::UserData("cloud-config is not a mapping".into())),
        Err(e) => Err(Error::UserData(format!("invalid cloud-config: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn authorized_keys(doc: &str) -> Vec<String> {
        let value: Value = serde_yaml::from_str(doc).unwrap();
        value[SSH_AUTHORIZED_KEYS]
            .as_sequence()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn appends_trimmed_keys_to_existing_list() {
        let out = add_ssh_keys(
            "#cloud-config\nssh_authorized_keys: []\n",
            &["k1".into(), "  k2\n".into()],
        )
        .unwrap();

        assert!(out.starts_with("#cloud-config\n"));
        assert_eq!(authorized_keys(&out), vec!["k1", "k2"]);
    }

    #[test]
    fn keeps_existing_keys_and_other_entries() {
        let user_data = "#cloud-config\nhostname: worker\nssh_authorized_keys:\n  - old\nruncmd:\n  - [systemctl, start, kubelet]\n";
        let out = add_ssh_keys(user_data, &["new".into()]).unwrap();

        assert_eq!(authorized_keys(&out), vec!["old", "new"]);
        let value: Value = serde_yaml::from_str(&out).unwrap();
        assert_eq!(value["hostname"].as_str(), Some("worker"));
        assert_eq!(value["runcmd"][0][2].as_str(), Some("kubelet"));
    }

    #[test]
    fn adds_list_when_document_has_none() {
        let out = add_ssh_keys("#cloud-config\npackages: [curl]\n", &["k1".into()]).unwrap();
        assert_eq!(authorized_keys(&out), vec!["k1"]);
    }

    #[test]
    fn empty_user_data_starts_a_new_document() {
        let out = add_ssh_keys("", &["k1".into()]).unwrap();
        assert_eq!(out, "#cloud-config\nssh_authorized_keys:\n- k1\n");
    }

    #[test]
    fn rejects_shell_scripts_and_malformed_documents() {
        let err = add_ssh_keys("#!/bin/bash\necho hi\n", &["k1".into()]).unwrap_err();
        assert!(matches!(err, Error::UserData(_)));

        let err = add_ssh_keys("#cloud-config\n- just\n- a list\n", &["k1".into()]).unwrap_err();
        assert!(err.to_string().contains("not a mapping"));

        let err = add_ssh_keys("#cloud-config\nssh_authorized_keys: k0\n", &["k1".into()]).unwrap_err();
        assert!(err.to_string().contains("not a list"));

        assert!(add_ssh_keys("#cloud-config\nkey: [unclosed\n", &["k1".into()]).is_err());
    }
}

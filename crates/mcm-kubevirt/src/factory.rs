use std::sync::Arc;

use async_trait::async_trait;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use tracing::debug;

use crate::store::{KubeObjectStore, ObjectStore};
use crate::types::{Credentials, KUBECONFIG_KEY};
use crate::{Error, Result};

#[cfg(test)]
use mockall::automock;

/// Resolves a cluster handle from the credentials of a machine class.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClientFactory: Send + Sync {
    /// Returns the object store plus the namespace machines live in.
    async fn client(&self, credentials: &Credentials) -> Result<(Arc<dyn ObjectStore>, String)>;
}

/// Reports the Kubernetes version of the cluster behind the credentials.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ServerVersionFactory: Send + Sync {
    async fn server_version(&self, credentials: &Credentials) -> Result<String>;
}

/// Production factory: builds a `kube::Client` from the `kubeconfig` entry
/// of the credentials. The namespace is the current context's namespace,
/// falling back to `default`.
#[derive(Clone, Default)]
pub struct KubeconfigClientFactory {
    options: KubeConfigOptions,
}

impl KubeconfigClientFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin the kubeconfig context instead of using its `current-context`.
    pub fn with_context(context: impl Into<String>) -> Self {
        Self {
            options: KubeConfigOptions {
                context: Some(context.into()),
                ..Default::default()
            },
        }
    }

    async fn config(&self, credentials: &Credentials) -> Result<Config> {
        let raw = credentials
            .kubeconfig()
            .ok_or_else(|| Error::Client(format!("secret is missing {KUBECONFIG_KEY:?}")))?;
        let yaml = std::str::from_utf8(raw)
            .map_err(|e| Error::Client(format!("kubeconfig is not UTF-8: {e}")))?;
        let kubeconfig =
            Kubeconfig::from_yaml(yaml).map_err(|e| Error::Client(format!("parse kubeconfig: {e}")))?;

        Config::from_custom_kubeconfig(kubeconfig, &self.options)
            .await
            .map_err(|e| Error::Client(format!("load kubeconfig: {e}")))
    }

    async fn kube_client(&self, credentials: &Credentials) -> Result<(Client, String)> {
        let config = self.config(credentials).await?;
        let namespace = config.default_namespace.clone();
        let client = Client::try_from(config).map_err(|e| Error::Client(e.to_string()))?;
        Ok((client, namespace))
    }
}

#[async_trait]
impl ClientFactory for KubeconfigClientFactory {
    async fn client(&self, credentials: &Credentials) -> Result<(Arc<dyn ObjectStore>, String)> {
        let (client, namespace) = self.kube_client(credentials).await?;
        debug!(namespace = %namespace, "kubevirt: client ready");
        Ok((Arc::new(KubeObjectStore::new(client)), namespace))
    }
}

#[async_trait]
impl ServerVersionFactory for KubeconfigClientFactory {
    async fn server_version(&self, credentials: &Credentials) -> Result<String> {
        let (client, _) = self
            .kube_client(credentials)
            .await
            .map_err(|e| Error::ServerVersion(e.to_string()))?;
        let info = client
            .apiserver_version()
            .await
            .map_err(|e| Error::ServerVersion(e.to_string()))?;
        Ok(info.git_version)
    }
}

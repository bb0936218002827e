//! CaravanCluster Custom Resource Definition
//!
//! A cluster descriptor: the API endpoint, TLS policy, and identity-secret
//! reference for one remote cluster. Descriptors are dereferenced through
//! the local client on every use — never cached — so endpoint changes and
//! token rotation take effect on the next advancement.

use kube::api::Api;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config, CustomResource};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::ObjectRef;
use crate::kube_utils::get_optional;
use crate::{Error, Result};

/// Specification for a CaravanCluster
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "caravan.dev",
    version = "v1alpha1",
    kind = "CaravanCluster",
    plural = "caravanclusters",
    shortname = "cvc",
    namespaced,
    printcolumn = r#"{"name":"URL","type":"string","jsonPath":".spec.apiUrl"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct CaravanClusterSpec {
    /// API server endpoint, e.g. `https://api.east.example.com:6443`
    pub api_url: String,
    /// Skip TLS verification of the API server
    #[serde(default)]
    pub insecure: bool,
    /// Base64-encoded PEM bundle for the API server CA
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_bundle: Option<String>,
    /// Secret holding the service-account token used by the controller
    pub service_account_secret_ref: ObjectRef,
}

impl CaravanCluster {
    /// Resolve a cluster descriptor through the local client
    pub async fn get(client: &Client, cluster_ref: &ObjectRef) -> Result<CaravanCluster> {
        let api: Api<CaravanCluster> = Api::namespaced(client.clone(), &cluster_ref.namespace);
        get_optional(&api, &cluster_ref.name)
            .await?
            .ok_or_else(|| Error::ClusterNotFound {
                name: cluster_ref.name.clone(),
                namespace: cluster_ref.namespace.clone(),
            })
    }

    /// Build an authenticated client for this cluster from a bearer token
    ///
    /// The client is constructed fresh on every call from an in-memory
    /// kubeconfig; nothing is cached, so a rotated token is picked up by the
    /// next caller.
    pub async fn build_client(&self, token: &str) -> Result<Client> {
        let name = self
            .metadata
            .name
            .clone()
            .unwrap_or_else(|| "remote".to_string());

        let mut cluster = serde_json::json!({
            "server": self.spec.api_url,
        });
        if self.spec.insecure {
            cluster["insecure-skip-tls-verify"] = serde_json::json!(true);
        }
        if let Some(ca) = &self.spec.ca_bundle {
            cluster["certificate-authority-data"] = serde_json::json!(ca);
        }
        let doc = serde_json::json!({
            "apiVersion": "v1",
            "kind": "Config",
            "clusters": [{"name": name, "cluster": cluster}],
            "users": [{"name": name, "user": {"token": token}}],
            "contexts": [{"name": name, "context": {"cluster": name, "user": name}}],
            "current-context": name,
        });

        let yaml =
            serde_yaml::to_string(&doc).map_err(|e| Error::remote_config(&name, e))?;
        let kubeconfig =
            Kubeconfig::from_yaml(&yaml).map_err(|e| Error::remote_config(&name, e))?;
        let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
            .await
            .map_err(|e| Error::remote_config(&name, e))?;
        Client::try_from(config).map_err(|e| Error::remote_config(&name, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ObjectMeta;

    fn sample_cluster() -> CaravanCluster {
        CaravanCluster {
            metadata: ObjectMeta {
                name: Some("east".to_string()),
                namespace: Some("caravan-system".to_string()),
                ..Default::default()
            },
            spec: CaravanClusterSpec {
                api_url: "https://api.east.example.com:6443".to_string(),
                insecure: false,
                ca_bundle: None,
                service_account_secret_ref: ObjectRef::new("east-sa-token", "caravan-system"),
            },
        }
    }

    #[tokio::test]
    async fn test_build_client_from_token() {
        let cluster = sample_cluster();
        let client = cluster.build_client("a-bearer-token").await;
        assert!(client.is_ok());
    }

    #[tokio::test]
    async fn test_build_client_insecure() {
        let mut cluster = sample_cluster();
        cluster.spec.insecure = true;
        assert!(cluster.build_client("token").await.is_ok());
    }

    #[test]
    fn test_cluster_spec_serialization() {
        let cluster = sample_cluster();
        let json = serde_json::to_value(&cluster.spec).unwrap();
        assert_eq!(json["apiUrl"], "https://api.east.example.com:6443");
        assert_eq!(json["serviceAccountSecretRef"]["name"], "east-sa-token");
        assert!(json.get("caBundle").is_none());
    }
}

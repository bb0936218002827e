//! CaravanToken Custom Resource Definition
//!
//! A token binds a bearer-token secret to a cluster descriptor and,
//! optionally, to the controller resource the token holder must be allowed
//! to `use`. Token validity is never cached: the secret is re-read on every
//! remote client construction.

use k8s_openapi::api::core::v1::Secret;
use kube::api::Api;
use kube::{Client, CustomResource};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{Conditions, ObjectRef};
use crate::kube_utils::get_optional;
use crate::{Error, Result};

/// Controller name a token must be allowed to `use` when none is referenced
pub const DEFAULT_CONTROLLER_NAME: &str = "migration-controller";

/// Namespace of the default controller
pub const DEFAULT_CONTROLLER_NAMESPACE: &str = "openshift-migration";

/// Status of a CaravanToken
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CaravanTokenStatus {
    /// Validation conditions
    #[serde(default, skip_serializing_if = "Conditions::is_empty")]
    pub conditions: Conditions,
}

/// Specification for a CaravanToken
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "caravan.dev",
    version = "v1alpha1",
    kind = "CaravanToken",
    plural = "caravantokens",
    shortname = "cvt",
    namespaced,
    status = "CaravanTokenStatus",
    printcolumn = r#"{"name":"Cluster","type":"string","jsonPath":".spec.clusterRef.name"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct CaravanTokenSpec {
    /// Secret holding the bearer token in its `token` entry
    pub secret_ref: ObjectRef,
    /// Cluster the token authenticates against
    pub cluster_ref: ObjectRef,
    /// Controller resource the holder must be allowed to `use`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller_ref: Option<ObjectRef>,
}

impl CaravanToken {
    /// Extract the bearer token from an already-fetched secret
    ///
    /// The secret must carry a non-empty `token` entry in valid UTF-8.
    pub fn token_from_secret(&self, secret: &Secret) -> Result<String> {
        let missing = || Error::TokenMissing {
            name: self.spec.secret_ref.name.clone(),
            namespace: self.spec.secret_ref.namespace.clone(),
        };
        let data = secret.data.as_ref().ok_or_else(missing)?;
        let bytes = data.get("token").ok_or_else(missing)?;
        let token = String::from_utf8(bytes.0.clone()).map_err(|_| missing())?;
        if token.is_empty() {
            return Err(missing());
        }
        Ok(token)
    }

    /// Read the bearer token through the local client
    pub async fn token(&self, client: &Client) -> Result<String> {
        let api: Api<Secret> = Api::namespaced(client.clone(), &self.spec.secret_ref.namespace);
        let secret = get_optional(&api, &self.spec.secret_ref.name)
            .await?
            .ok_or_else(|| Error::TokenMissing {
                name: self.spec.secret_ref.name.clone(),
                namespace: self.spec.secret_ref.namespace.clone(),
            })?;
        self.token_from_secret(&secret)
    }

    /// The controller resource this token must be allowed to `use`
    pub fn controller(&self) -> ObjectRef {
        self.spec.controller_ref.clone().unwrap_or_else(|| {
            ObjectRef::new(DEFAULT_CONTROLLER_NAME, DEFAULT_CONTROLLER_NAMESPACE)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::ByteString;
    use kube::core::ObjectMeta;
    use std::collections::BTreeMap;

    fn sample_token() -> CaravanToken {
        CaravanToken {
            metadata: ObjectMeta {
                name: Some("east-admin".to_string()),
                namespace: Some("caravan-system".to_string()),
                ..Default::default()
            },
            spec: CaravanTokenSpec {
                secret_ref: ObjectRef::new("east-admin-token", "caravan-system"),
                cluster_ref: ObjectRef::new("east", "caravan-system"),
                controller_ref: None,
            },
            status: None,
        }
    }

    fn secret_with(data: Option<BTreeMap<String, ByteString>>) -> Secret {
        Secret {
            metadata: ObjectMeta {
                name: Some("east-admin-token".to_string()),
                namespace: Some("caravan-system".to_string()),
                ..Default::default()
            },
            data,
            ..Default::default()
        }
    }

    #[test]
    fn test_token_from_secret() {
        let token = sample_token();
        let mut data = BTreeMap::new();
        data.insert("token".to_string(), ByteString(b"sa-token-value".to_vec()));
        let value = token.token_from_secret(&secret_with(Some(data))).unwrap();
        assert_eq!(value, "sa-token-value");
    }

    #[test]
    fn test_token_entry_absent() {
        let token = sample_token();
        let err = token
            .token_from_secret(&secret_with(Some(BTreeMap::new())))
            .unwrap_err();
        assert!(matches!(err, Error::TokenMissing { .. }));
    }

    #[test]
    fn test_token_entry_empty() {
        let token = sample_token();
        let mut data = BTreeMap::new();
        data.insert("token".to_string(), ByteString(Vec::new()));
        let err = token.token_from_secret(&secret_with(Some(data))).unwrap_err();
        assert!(matches!(err, Error::TokenMissing { .. }));
    }

    #[test]
    fn test_token_secret_without_data() {
        let token = sample_token();
        let err = token.token_from_secret(&secret_with(None)).unwrap_err();
        assert!(matches!(err, Error::TokenMissing { .. }));
    }

    #[test]
    fn test_controller_defaults() {
        let token = sample_token();
        let controller = token.controller();
        assert_eq!(controller.name, DEFAULT_CONTROLLER_NAME);
        assert_eq!(controller.namespace, DEFAULT_CONTROLLER_NAMESPACE);
    }

    #[test]
    fn test_controller_override() {
        let mut token = sample_token();
        token.spec.controller_ref = Some(ObjectRef::new("edge-controller", "edge-system"));
        let controller = token.controller();
        assert_eq!(controller.name, "edge-controller");
        assert_eq!(controller.namespace, "edge-system");
    }
}

//! Remote cluster access
//!
//! Builds an authenticated [`KubeClusterApi`] from a cluster reference and a
//! token secret. Resolution happens on every call — descriptor, secret, and
//! client are never cached, so endpoint changes and token rotation are
//! picked up by the next advancement.

use k8s_openapi::api::core::v1::Secret;
use kube::api::Api;
use kube::Client;

use caravan_common::crd::{CaravanCluster, CaravanToken, ObjectRef};
use caravan_common::kube_utils::get_optional;
use caravan_common::{Error, Result};

use crate::api::KubeClusterApi;

/// Read a bearer token from a secret's `token` entry
///
/// Fails with [`Error::TokenMissing`] when the secret or the entry is
/// absent, empty, or not UTF-8.
pub async fn read_bearer_token(local: &Client, secret_ref: &ObjectRef) -> Result<String> {
    let missing = || Error::TokenMissing {
        name: secret_ref.name.clone(),
        namespace: secret_ref.namespace.clone(),
    };
    let api: Api<Secret> = Api::namespaced(local.clone(), &secret_ref.namespace);
    let secret = get_optional(&api, &secret_ref.name)
        .await?
        .ok_or_else(missing)?;
    let data = secret.data.as_ref().ok_or_else(missing)?;
    let bytes = data.get("token").ok_or_else(missing)?;
    let token = String::from_utf8(bytes.0.clone()).map_err(|_| missing())?;
    if token.is_empty() {
        return Err(missing());
    }
    Ok(token)
}

/// Connect to a cluster using an explicit token secret
///
/// The spec §4.1 flow: resolve the descriptor, read the token, build the
/// client from the advertised endpoint and TLS policy.
pub async fn connect(
    local: &Client,
    cluster_ref: &ObjectRef,
    token_secret_ref: &ObjectRef,
) -> Result<KubeClusterApi> {
    let cluster = CaravanCluster::get(local, cluster_ref).await?;
    let token = read_bearer_token(local, token_secret_ref).await?;
    let client = cluster.build_client(&token).await?;
    Ok(KubeClusterApi::new(client))
}

/// Connect to a cluster with the controller's own service-account identity
pub async fn connect_service_account(
    local: &Client,
    cluster_ref: &ObjectRef,
) -> Result<KubeClusterApi> {
    let cluster = CaravanCluster::get(local, cluster_ref).await?;
    let token =
        read_bearer_token(local, &cluster.spec.service_account_secret_ref.clone()).await?;
    let client = cluster.build_client(&token).await?;
    Ok(KubeClusterApi::new(client))
}

/// Connect to the cluster a token is bound to, as the token's identity
pub async fn connect_with_token(local: &Client, token: &CaravanToken) -> Result<KubeClusterApi> {
    connect(local, &token.spec.cluster_ref, &token.spec.secret_ref).await
}

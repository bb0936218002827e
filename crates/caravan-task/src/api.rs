//! Remote cluster API seam
//!
//! [`ClusterApi`] captures everything the engine needs from a remote
//! cluster: typed get/list/create/delete over the Velero resources, access
//! and token review submission, and a discovery endpoint with per-resource
//! dynamic operations. The trait exists so the state machine can be driven
//! against mock clusters in tests; [`KubeClusterApi`] is the production
//! implementation over `kube::Client`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::authentication::v1::{TokenReview, TokenReviewSpec};
use k8s_openapi::api::authorization::v1::{
    ResourceAttributes, SelfSubjectAccessReview, SelfSubjectAccessReviewSpec,
};
use kube::api::{Api, DeleteParams, DynamicObject, ListParams, PostParams};
use kube::discovery::{verbs, ApiResource, Discovery, Scope};
use kube::{Client, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;

#[cfg(test)]
use mockall::automock;

use caravan_common::kube_utils::selector_string;
use caravan_common::{Error, Result};

use crate::velero::{
    Backup, BackupStorageLocation, DeleteBackupRequest, HasApiResource, PodVolumeBackup,
    PodVolumeRestore, Restore, VolumeSnapshotLocation, VELERO_NAMESPACE,
};

/// One (verb, group, resource, namespace, name) authorization probe
///
/// Empty `name` means any name, empty `group` means the core group, and
/// empty `namespace` means cluster scope.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AccessRequest {
    /// Verb to probe (get, create, update, delete, use, …)
    pub verb: String,
    /// API group; empty for the core group
    pub group: String,
    /// Plural resource name
    pub resource: String,
    /// Namespace; empty for cluster scope
    pub namespace: String,
    /// Resource name; empty for any
    pub name: String,
}

/// A (group, version, resource) triple advertised by a cluster
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteResource {
    /// API group; empty for the core group
    pub group: String,
    /// API version
    pub version: String,
    /// Plural resource name
    pub resource: String,
    /// Resource kind
    pub kind: String,
    /// Whether the resource is namespaced
    pub namespaced: bool,
}

impl RemoteResource {
    /// Build the dynamic API descriptor for this resource
    pub fn api_resource(&self) -> ApiResource {
        let api_version = if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        };
        ApiResource {
            group: self.group.clone(),
            version: self.version.clone(),
            api_version,
            kind: self.kind.clone(),
            plural: self.resource.clone(),
        }
    }
}

impl std::fmt::Display for RemoteResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}/{}", self.version, self.resource)
        } else {
            write!(f, "{}/{}/{}", self.group, self.version, self.resource)
        }
    }
}

/// Typed object store on one remote cluster
///
/// Velero resources live in the fixed `velero` namespace; gets take an
/// explicit namespace because replication checks address backups by the
/// `(namespace, name)` observed on the source.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Get a backup by namespace and name; None when it does not exist
    async fn get_backup(&self, namespace: &str, name: &str) -> Result<Option<Backup>>;

    /// List backups matching a label selector
    async fn list_backups(&self, selector: &BTreeMap<String, String>) -> Result<Vec<Backup>>;

    /// Submit a backup; the returned object carries the server-assigned name
    async fn create_backup(&self, backup: Backup) -> Result<Backup>;

    /// Submit a backup deletion request
    async fn create_delete_backup_request(&self, request: DeleteBackupRequest) -> Result<()>;

    /// List restores matching a label selector
    async fn list_restores(&self, selector: &BTreeMap<String, String>) -> Result<Vec<Restore>>;

    /// Submit a restore; the returned object carries the server-assigned name
    async fn create_restore(&self, restore: Restore) -> Result<Restore>;

    /// Delete a restore; NotFound surfaces as an error the caller may ignore
    async fn delete_restore(&self, name: &str) -> Result<()>;

    /// List pod-volume backups matching a label selector
    async fn list_pod_volume_backups(
        &self,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<PodVolumeBackup>>;

    /// List pod-volume restores matching a label selector
    async fn list_pod_volume_restores(
        &self,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<PodVolumeRestore>>;

    /// List backup storage locations matching a label selector
    async fn list_storage_locations(
        &self,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<BackupStorageLocation>>;

    /// List volume snapshot locations matching a label selector
    async fn list_snapshot_locations(
        &self,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<VolumeSnapshotLocation>>;

    /// Whether the current identity is allowed the probed operation
    async fn access_allowed(&self, request: AccessRequest) -> Result<bool>;

    /// Whether the cluster authenticates the given bearer token
    async fn token_authenticated(&self, token: &str) -> Result<bool>;

    /// All listable resources the cluster advertises
    async fn server_resources(&self) -> Result<Vec<RemoteResource>>;

    /// Delete a labeled collection of one resource type in one namespace
    async fn delete_collection(
        &self,
        resource: &RemoteResource,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> Result<()>;

    /// Names of labeled objects of one resource type in one namespace
    async fn list_names(
        &self,
        resource: &RemoteResource,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<String>>;

    /// Delete one object by name
    async fn delete_by_name(
        &self,
        resource: &RemoteResource,
        namespace: &str,
        name: &str,
    ) -> Result<()>;
}

/// Production [`ClusterApi`] over a kube client
#[derive(Clone)]
pub struct KubeClusterApi {
    client: Client,
}

impl KubeClusterApi {
    /// Wrap an authenticated client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn velero_api<T: HasApiResource>(&self) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), VELERO_NAMESPACE, &T::api_resource())
    }

    fn dynamic_api(&self, resource: &RemoteResource, namespace: &str) -> Api<DynamicObject> {
        if resource.namespaced {
            Api::namespaced_with(self.client.clone(), namespace, &resource.api_resource())
        } else {
            Api::all_with(self.client.clone(), &resource.api_resource())
        }
    }

    async fn list_velero<T>(&self, selector: &BTreeMap<String, String>) -> Result<Vec<T>>
    where
        T: HasApiResource + DeserializeOwned,
    {
        let params = ListParams::default().labels(&selector_string(selector));
        let list = self.velero_api::<T>().list(&params).await?;
        list.items.iter().map(from_dynamic).collect()
    }

    async fn create_velero<T>(&self, obj: &T) -> Result<T>
    where
        T: HasApiResource + Serialize + DeserializeOwned,
    {
        let created = self
            .velero_api::<T>()
            .create(&PostParams::default(), &to_dynamic(obj)?)
            .await?;
        from_dynamic(&created)
    }
}

fn to_dynamic<T: Serialize + HasApiResource>(obj: &T) -> Result<DynamicObject> {
    let value = serde_json::to_value(obj).map_err(|e| Error::serialization(T::KIND, e))?;
    serde_json::from_value(value).map_err(|e| Error::serialization(T::KIND, e))
}

fn from_dynamic<T: DeserializeOwned + HasApiResource>(obj: &DynamicObject) -> Result<T> {
    let value = serde_json::to_value(obj).map_err(|e| Error::serialization(T::KIND, e))?;
    serde_json::from_value(value).map_err(|e| Error::serialization(T::KIND, e))
}

#[async_trait]
impl ClusterApi for KubeClusterApi {
    async fn get_backup(&self, namespace: &str, name: &str) -> Result<Option<Backup>> {
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), namespace, &Backup::api_resource());
        match api.get(name).await {
            Ok(obj) => Ok(Some(from_dynamic(&obj)?)),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_backups(&self, selector: &BTreeMap<String, String>) -> Result<Vec<Backup>> {
        self.list_velero(selector).await
    }

    async fn create_backup(&self, backup: Backup) -> Result<Backup> {
        self.create_velero(&backup).await
    }

    async fn create_delete_backup_request(&self, request: DeleteBackupRequest) -> Result<()> {
        self.create_velero(&request).await.map(|_: DeleteBackupRequest| ())
    }

    async fn list_restores(&self, selector: &BTreeMap<String, String>) -> Result<Vec<Restore>> {
        self.list_velero(selector).await
    }

    async fn create_restore(&self, restore: Restore) -> Result<Restore> {
        self.create_velero(&restore).await
    }

    async fn delete_restore(&self, name: &str) -> Result<()> {
        self.velero_api::<Restore>()
            .delete(name, &DeleteParams::default())
            .await?;
        Ok(())
    }

    async fn list_pod_volume_backups(
        &self,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<PodVolumeBackup>> {
        self.list_velero(selector).await
    }

    async fn list_pod_volume_restores(
        &self,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<PodVolumeRestore>> {
        self.list_velero(selector).await
    }

    async fn list_storage_locations(
        &self,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<BackupStorageLocation>> {
        self.list_velero(selector).await
    }

    async fn list_snapshot_locations(
        &self,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<VolumeSnapshotLocation>> {
        self.list_velero(selector).await
    }

    async fn access_allowed(&self, request: AccessRequest) -> Result<bool> {
        let review = SelfSubjectAccessReview {
            spec: SelfSubjectAccessReviewSpec {
                resource_attributes: Some(ResourceAttributes {
                    verb: Some(request.verb),
                    group: Some(request.group),
                    resource: Some(request.resource),
                    namespace: Some(request.namespace),
                    name: Some(request.name),
                    ..Default::default()
                }),
                ..Default::default()
            },
            ..Default::default()
        };
        let api: Api<SelfSubjectAccessReview> = Api::all(self.client.clone());
        let created = api.create(&PostParams::default(), &review).await?;
        Ok(created.status.map(|s| s.allowed).unwrap_or(false))
    }

    async fn token_authenticated(&self, token: &str) -> Result<bool> {
        let review = TokenReview {
            spec: TokenReviewSpec {
                token: Some(token.to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let api: Api<TokenReview> = Api::all(self.client.clone());
        let created = api.create(&PostParams::default(), &review).await?;
        Ok(created
            .status
            .and_then(|s| s.authenticated)
            .unwrap_or(false))
    }

    async fn server_resources(&self) -> Result<Vec<RemoteResource>> {
        let discovery = Discovery::new(self.client.clone()).run().await?;
        let mut resources = Vec::new();
        for group in discovery.groups() {
            for (ar, caps) in group.recommended_resources() {
                if !caps.supports_operation(verbs::LIST) {
                    continue;
                }
                resources.push(RemoteResource {
                    group: ar.group,
                    version: ar.version,
                    resource: ar.plural,
                    kind: ar.kind,
                    namespaced: matches!(caps.scope, Scope::Namespaced),
                });
            }
        }
        Ok(resources)
    }

    async fn delete_collection(
        &self,
        resource: &RemoteResource,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> Result<()> {
        let params = ListParams::default().labels(&selector_string(selector));
        self.dynamic_api(resource, namespace)
            .delete_collection(&DeleteParams::default(), &params)
            .await?;
        Ok(())
    }

    async fn list_names(
        &self,
        resource: &RemoteResource,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<String>> {
        let params = ListParams::default().labels(&selector_string(selector));
        let list = self.dynamic_api(resource, namespace).list(&params).await?;
        Ok(list.items.iter().map(|obj| obj.name_any()).collect())
    }

    async fn delete_by_name(
        &self,
        resource: &RemoteResource,
        namespace: &str,
        name: &str,
    ) -> Result<()> {
        self.dynamic_api(resource, namespace)
            .delete(name, &DeleteParams::default())
            .await?;
        Ok(())
    }
}

//! Authorization probes against a remote cluster
//!
//! All probes run as the connected identity via self-subject access
//! reviews. Per-namespace summaries answer two questions for the UI and the
//! plan validator: can this token see the namespaces at all, and can it
//! move workloads out of them.

use std::collections::BTreeMap;

use caravan_common::crd::CaravanToken;
use caravan_common::{Result, API_GROUP};

use crate::api::{AccessRequest, ClusterApi};

/// Per-namespace authorization summary
pub type Authorized = BTreeMap<String, bool>;

/// Workload resources probed by [`has_migrate_permission`], as
/// `group/resource` pairs; an empty group is the core group.
const MIGRATE_RESOURCES: [&str; 7] = [
    "/pods",
    "apps/deployments",
    "apps.openshift.io/deploymentconfigs",
    "apps/daemonsets",
    "apps/replicasets",
    "apps/statefulsets",
    "/persistentvolumeclaims",
];

/// Verbs probed by [`has_migrate_permission`]
const MIGRATE_VERBS: [&str; 4] = ["get", "create", "update", "delete"];

/// Resource plural for the controller `use` probe
const CONTROLLER_RESOURCE: &str = "migrationcontrollers";

/// Whether the connected identity may `verb` on `group/resource`
///
/// Empty `name` means any name, empty `group` means the core group, empty
/// `namespace` means cluster scope.
pub async fn can_i(
    api: &dyn ClusterApi,
    verb: &str,
    group: &str,
    resource: &str,
    namespace: &str,
    name: &str,
) -> Result<bool> {
    api.access_allowed(AccessRequest {
        verb: verb.to_string(),
        group: group.to_string(),
        resource: resource.to_string(),
        namespace: namespace.to_string(),
        name: name.to_string(),
    })
    .await
}

/// Whether the identity can read each of the given namespaces
pub async fn has_read_permission(
    api: &dyn ClusterApi,
    namespaces: &[String],
) -> Result<Authorized> {
    let mut authorized = Authorized::new();
    for namespace in namespaces {
        let allowed = can_i(api, "get", "", "namespaces", namespace, namespace).await?;
        authorized.insert(namespace.clone(), allowed);
    }
    Ok(authorized)
}

/// Whether the identity can migrate workloads out of each namespace
///
/// Probes the cross product of verbs and workload resources, short-circuiting
/// to `false` at the first denial so a namespace costs at most
/// `4 verbs × 7 resources` reviews.
pub async fn has_migrate_permission(
    api: &dyn ClusterApi,
    namespaces: &[String],
) -> Result<Authorized> {
    let mut authorized = Authorized::new();
    for namespace in namespaces {
        authorized.insert(namespace.clone(), true);
        'resources: for entry in MIGRATE_RESOURCES {
            let (group, resource) = entry.split_once('/').unwrap_or(("", entry));
            for verb in MIGRATE_VERBS {
                let allowed = can_i(api, verb, group, resource, namespace, "").await?;
                if !allowed {
                    authorized.insert(namespace.clone(), false);
                    break 'resources;
                }
            }
        }
    }
    Ok(authorized)
}

/// Whether the token may `use` its controller resource
///
/// The controller reference defaults to the well-known controller when the
/// token does not name one.
pub async fn has_use_permission(api: &dyn ClusterApi, token: &CaravanToken) -> Result<bool> {
    let controller = token.controller();
    can_i(
        api,
        "use",
        API_GROUP,
        CONTROLLER_RESOURCE,
        &controller.namespace,
        &controller.name,
    )
    .await
}

/// Whether the remote cluster accepts the bearer token
pub async fn authenticate(api: &dyn ClusterApi, token_value: &str) -> Result<bool> {
    api.token_authenticated(token_value).await
}

/// Resolve a token's cluster and verify the cluster accepts the token
///
/// The review is submitted with the controller's own identity so an invalid
/// user token cannot block its own validation.
pub async fn authenticate_token(local: &kube::Client, token: &CaravanToken) -> Result<bool> {
    let value = token.token(local).await?;
    let api = crate::remote::connect_service_account(local, &token.spec.cluster_ref).await?;
    authenticate(&api, &value).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MockClusterApi;
    use caravan_common::crd::{CaravanTokenSpec, ObjectRef};
    use kube::core::ObjectMeta;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

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

    #[tokio::test]
    async fn test_can_i_passes_attributes() {
        let mut api = MockClusterApi::new();
        api.expect_access_allowed()
            .withf(|request| {
                request.verb == "get"
                    && request.group == "apps"
                    && request.resource == "deployments"
                    && request.namespace == "ns1"
                    && request.name.is_empty()
            })
            .times(1)
            .returning(|_| Ok(true));

        assert!(can_i(&api, "get", "apps", "deployments", "ns1", "")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_has_read_permission_per_namespace() {
        let mut api = MockClusterApi::new();
        api.expect_access_allowed()
            .times(2)
            .returning(|request| Ok(request.namespace == "ns1"));

        let namespaces = vec!["ns1".to_string(), "ns2".to_string()];
        let authorized = has_read_permission(&api, &namespaces).await.unwrap();
        assert_eq!(authorized.get("ns1"), Some(&true));
        assert_eq!(authorized.get("ns2"), Some(&false));
    }

    #[tokio::test]
    async fn test_has_migrate_permission_short_circuits() {
        // ns2 is denied `delete pods`, the fourth probe for that namespace;
        // ns1 is fully allowed and costs the whole 4×7 matrix.
        let probes = Arc::new(AtomicUsize::new(0));
        let ns2_probes = Arc::new(AtomicUsize::new(0));

        let mut api = MockClusterApi::new();
        let probes_in = probes.clone();
        let ns2_in = ns2_probes.clone();
        api.expect_access_allowed().returning(move |request| {
            probes_in.fetch_add(1, Ordering::SeqCst);
            if request.namespace == "ns2" {
                ns2_in.fetch_add(1, Ordering::SeqCst);
                return Ok(!(request.verb == "delete" && request.resource == "pods"));
            }
            Ok(true)
        });

        let namespaces = vec!["ns1".to_string(), "ns2".to_string()];
        let authorized = has_migrate_permission(&api, &namespaces).await.unwrap();

        assert_eq!(authorized.get("ns1"), Some(&true));
        assert_eq!(authorized.get("ns2"), Some(&false));
        assert_eq!(ns2_probes.load(Ordering::SeqCst), 4);
        assert_eq!(probes.load(Ordering::SeqCst), 4 * 7 + 4);
    }

    #[tokio::test]
    async fn test_has_use_permission_defaults() {
        let mut api = MockClusterApi::new();
        api.expect_access_allowed()
            .withf(|request| {
                request.verb == "use"
                    && request.group == API_GROUP
                    && request.resource == "migrationcontrollers"
                    && request.namespace == "openshift-migration"
                    && request.name == "migration-controller"
            })
            .times(1)
            .returning(|_| Ok(true));

        assert!(has_use_permission(&api, &sample_token()).await.unwrap());
    }

    #[tokio::test]
    async fn test_has_use_permission_override() {
        let mut token = sample_token();
        token.spec.controller_ref = Some(ObjectRef::new("edge-controller", "edge-system"));

        let mut api = MockClusterApi::new();
        api.expect_access_allowed()
            .withf(|request| {
                request.namespace == "edge-system" && request.name == "edge-controller"
            })
            .times(1)
            .returning(|_| Ok(false));

        assert!(!has_use_permission(&api, &token).await.unwrap());
    }

    #[tokio::test]
    async fn test_authenticate() {
        let mut api = MockClusterApi::new();
        api.expect_token_authenticated()
            .withf(|token| token == "bearer-value")
            .times(1)
            .returning(|_| Ok(true));
        assert!(authenticate(&api, "bearer-value").await.unwrap());
    }
}

//! Find-or-create for task-owned remote children
//!
//! Backups and restores are created at most once per role per task UID.
//! Discovery is by the owner correlation labels plus a role label; the
//! pre-create list is the engine's defense against double-creation by two
//! racing controllers. A list returning more than one item is a protocol
//! violation by the collaborator — candidates are sorted by name so every
//! run observes the same child.

use std::collections::BTreeMap;
use std::future::Future;

use async_trait::async_trait;

use caravan_common::Result;

use crate::api::ClusterApi;
use crate::velero::{Backup, Restore};

/// The four roles a task-owned child can have
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Role {
    /// Full backup taken at the start of a migration
    InitialBackup,
    /// Volumes-and-stage-pods backup
    StageBackup,
    /// Restore of a stage backup
    StageRestore,
    /// Restore of the initial backup
    FinalRestore,
}

impl Role {
    /// Label key whose value is the task UID
    pub(crate) fn label(&self) -> &'static str {
        match self {
            Self::InitialBackup => caravan_common::labels::INITIAL_BACKUP_LABEL,
            Self::StageBackup => caravan_common::labels::STAGE_BACKUP_LABEL,
            Self::StageRestore => caravan_common::labels::STAGE_RESTORE_LABEL,
            Self::FinalRestore => caravan_common::labels::FINAL_RESTORE_LABEL,
        }
    }
}

/// A child resource discoverable and creatable through [`ClusterApi`]
#[async_trait]
pub(crate) trait OwnedChild: Sized + Send {
    /// Server-assigned name
    fn name(&self) -> &str;
    /// List children matching the selector
    async fn list(api: &dyn ClusterApi, selector: &BTreeMap<String, String>) -> Result<Vec<Self>>;
    /// Submit a new child, returning it with its assigned name
    async fn submit(api: &dyn ClusterApi, obj: Self) -> Result<Self>;
}

#[async_trait]
impl OwnedChild for Backup {
    fn name(&self) -> &str {
        &self.metadata.name
    }

    async fn list(api: &dyn ClusterApi, selector: &BTreeMap<String, String>) -> Result<Vec<Self>> {
        api.list_backups(selector).await
    }

    async fn submit(api: &dyn ClusterApi, obj: Self) -> Result<Self> {
        api.create_backup(obj).await
    }
}

#[async_trait]
impl OwnedChild for Restore {
    fn name(&self) -> &str {
        &self.metadata.name
    }

    async fn list(api: &dyn ClusterApi, selector: &BTreeMap<String, String>) -> Result<Vec<Self>> {
        api.list_restores(selector).await
    }

    async fn submit(api: &dyn ClusterApi, obj: Self) -> Result<Self> {
        api.create_restore(obj).await
    }
}

/// Selector for children of one owner with one role
pub(crate) fn owned_selector(
    owner_labels: &BTreeMap<String, String>,
    role: Role,
    uid: &str,
) -> BTreeMap<String, String> {
    let mut selector = owner_labels.clone();
    selector.insert(role.label().to_string(), uid.to_string());
    selector
}

/// Find the child of one role owned by one task, if any
pub(crate) async fn find_owned<T: OwnedChild>(
    api: &dyn ClusterApi,
    owner_labels: &BTreeMap<String, String>,
    role: Role,
    uid: &str,
) -> Result<Option<T>> {
    let selector = owned_selector(owner_labels, role, uid);
    let mut owned = T::list(api, &selector).await?;
    owned.sort_by(|a, b| a.name().cmp(b.name()));
    Ok(owned.into_iter().next())
}

/// Return the existing owned child of one role, or build and submit one
pub(crate) async fn ensure_owned<T, F, Fut>(
    api: &dyn ClusterApi,
    owner_labels: &BTreeMap<String, String>,
    role: Role,
    uid: &str,
    build: F,
) -> Result<T>
where
    T: OwnedChild,
    F: FnOnce() -> Fut + Send,
    Fut: Future<Output = Result<T>> + Send,
{
    if let Some(existing) = find_owned(api, owner_labels, role, uid).await? {
        return Ok(existing);
    }
    T::submit(api, build().await?).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MockClusterApi;
    use crate::velero::ObjectMeta;
    use caravan_common::labels::correlation_labels;

    fn named_backup(name: &str) -> Backup {
        Backup::new(
            ObjectMeta {
                name: name.to_string(),
                namespace: "velero".to_string(),
                ..Default::default()
            },
            Default::default(),
        )
    }

    #[tokio::test]
    async fn test_ensure_owned_reuses_existing() {
        let mut api = MockClusterApi::new();
        api.expect_list_backups()
            .withf(|selector| {
                selector.get("caravan.dev/initial-backup") == Some(&"T1".to_string())
                    && selector.get("caravan.dev/caravanmigration-uid") == Some(&"T1".to_string())
            })
            .times(1)
            .returning(|_| Ok(vec![named_backup("m1-abc")]));
        // No expect_create_backup: a create would panic the mock.

        let labels = correlation_labels("CaravanMigration", "T1");
        let backup: Backup = ensure_owned(&api, &labels, Role::InitialBackup, "T1", || async {
            Ok(named_backup("m1-fresh"))
        })
        .await
        .unwrap();
        assert_eq!(backup.metadata.name, "m1-abc");
    }

    #[tokio::test]
    async fn test_ensure_owned_creates_when_absent() {
        let mut api = MockClusterApi::new();
        api.expect_list_backups().times(1).returning(|_| Ok(vec![]));
        api.expect_create_backup().times(1).returning(|mut backup| {
            backup.metadata.name = "m1-generated".to_string();
            Ok(backup)
        });

        let labels = correlation_labels("CaravanMigration", "T1");
        let backup: Backup = ensure_owned(&api, &labels, Role::InitialBackup, "T1", || async {
            Ok(named_backup(""))
        })
        .await
        .unwrap();
        assert_eq!(backup.metadata.name, "m1-generated");
    }

    #[tokio::test]
    async fn test_multi_match_selects_first_by_name() {
        // Two children with the same role label is a protocol violation;
        // selection must still be deterministic.
        let mut api = MockClusterApi::new();
        api.expect_list_backups()
            .times(2)
            .returning(|_| Ok(vec![named_backup("m1-zzz"), named_backup("m1-aaa")]));

        let labels = correlation_labels("CaravanMigration", "T1");
        for _ in 0..2 {
            let found: Option<Backup> = find_owned(&api, &labels, Role::StageBackup, "T1")
                .await
                .unwrap();
            assert_eq!(found.unwrap().metadata.name, "m1-aaa");
        }
    }

    #[test]
    fn test_role_labels() {
        assert_eq!(Role::InitialBackup.label(), "caravan.dev/initial-backup");
        assert_eq!(Role::StageBackup.label(), "caravan.dev/stage-backup");
        assert_eq!(Role::StageRestore.label(), "caravan.dev/stage-restore");
        assert_eq!(Role::FinalRestore.label(), "caravan.dev/final-restore");
    }
}

//! Restore operations on the destination cluster
//!
//! Each restore references the backup of the matching role: stage restores
//! consume stage backups, final restores consume initial backups. Teardown
//! of restores and already-migrated resources is idempotent so re-running a
//! migration converges.

use std::collections::BTreeMap;

use tracing::warn;

use caravan_common::crd::{Condition, ConditionCategory, OwnerKind};
use caravan_common::labels::{MIGRATED_BY_LABEL, STAGE_POD_IMAGE_ANNOTATION};
use caravan_common::{Error, Result};

use crate::ensure::{ensure_owned, find_owned, Role};
use crate::progress::restore_progress;
use crate::task::{Task, RESTIC_ERRORS_CONDITION, RESTIC_VERIFY_ERRORS_CONDITION};
use crate::velero::{
    Backup, ObjectMeta, Restore, RestoreSpec, RESTORE_NAME_LABEL, VELERO_NAMESPACE,
};

impl Task {
    /// Ensure the restore for this owner kind exists on the destination
    pub(crate) async fn ensure_restore(&self) -> Result<Restore> {
        match self.owner.kind() {
            OwnerKind::Migration => self.ensure_final_restore().await,
            OwnerKind::Stage => self.ensure_stage_restore().await,
        }
    }

    /// Ensure the stage restore exists, referencing the stage backup
    ///
    /// Stage restores carry the stage pod image annotation so restored
    /// placeholder pods pull from the destination's staging registry.
    pub async fn ensure_stage_restore(&self) -> Result<Restore> {
        let labels = self.owner.correlation_labels();
        let uid = self.owner.uid();
        let backup: Backup =
            find_owned(self.source.as_ref(), &labels, Role::StageBackup, &uid)
                .await?
                .ok_or(Error::BackupNotFound { role: "stage" })?;

        ensure_owned(
            self.destination.as_ref(),
            &labels,
            Role::StageRestore,
            &uid,
            || async {
                let mut restore = self.build_restore(&backup.metadata.name);
                self.label_child(&mut restore.metadata.labels, Role::StageRestore);
                let image = self.support.stage_pod_image().await?;
                restore
                    .metadata
                    .annotations
                    .insert(STAGE_POD_IMAGE_ANNOTATION.to_string(), image);
                Ok(restore)
            },
        )
        .await
    }

    /// Ensure the final restore exists, referencing the initial backup
    pub async fn ensure_final_restore(&self) -> Result<Restore> {
        let labels = self.owner.correlation_labels();
        let uid = self.owner.uid();
        let backup: Backup =
            find_owned(self.source.as_ref(), &labels, Role::InitialBackup, &uid)
                .await?
                .ok_or(Error::BackupNotFound { role: "initial" })?;

        ensure_owned(
            self.destination.as_ref(),
            &labels,
            Role::FinalRestore,
            &uid,
            || async {
                let mut restore = self.build_restore(&backup.metadata.name);
                self.label_child(&mut restore.metadata.labels, Role::FinalRestore);
                Ok(restore)
            },
        )
        .await
    }

    /// Build a restore as desired for the destination cluster
    fn build_restore(&self, backup_name: &str) -> Restore {
        let mapping = self.plan.namespace_mapping();
        Restore::new(
            ObjectMeta {
                generate_name: format!("{}-", self.owner.name()),
                namespace: VELERO_NAMESPACE.to_string(),
                labels: self.owner.correlation_labels(),
                annotations: self.annotations.clone(),
                ..Default::default()
            },
            RestoreSpec {
                backup_name: backup_name.to_string(),
                restore_pvs: Some(true),
                excluded_resources: self.plan.resource_list(),
                namespace_mapping: if mapping.is_empty() {
                    None
                } else {
                    Some(mapping)
                },
            },
        )
    }

    /// Recompute progress from a restore and its pod-volume children
    ///
    /// Returns the `(completed, reasons)` terminal signal; `self.progress`
    /// is overwritten as a side effect.
    pub(crate) async fn update_restore_progress(
        &mut self,
        restore: &Restore,
    ) -> Result<(bool, Vec<String>)> {
        let selector = BTreeMap::from([(
            RESTORE_NAME_LABEL.to_string(),
            restore.metadata.name.clone(),
        )]);
        let copies = self.destination.list_pod_volume_restores(&selector).await?;
        let report = restore_progress(restore, &copies);
        self.progress = report.entries;
        Ok((report.completed, report.reasons))
    }

    /// Record durable warnings for restic errors on a completed restore
    pub(crate) fn set_restic_conditions(&mut self, restore: &Restore) {
        let Some(status) = &restore.status else {
            return;
        };
        let name = &restore.metadata.name;
        if !status.pod_volume_restore_errors.is_empty() {
            let message = format!(
                "Found {} restic error(s) on restore {name}.",
                status.pod_volume_restore_errors.len(),
            );
            self.owner.set_condition(
                Condition::new(RESTIC_ERRORS_CONDITION, ConditionCategory::Warn, message)
                    .durable(),
            );
        }
        if !status.pod_volume_restore_verify_errors.is_empty() {
            let message = format!(
                "Found {} restic verify error(s) on restore {name}.",
                status.pod_volume_restore_verify_errors.len(),
            );
            self.owner.set_condition(
                Condition::new(
                    RESTIC_VERIFY_ERRORS_CONDITION,
                    ConditionCategory::Warn,
                    message,
                )
                .durable(),
            );
        }
    }

    /// Tear down every restore this owner created on the destination
    pub async fn delete_restores(&self) -> Result<()> {
        let restores = self
            .destination
            .list_restores(&self.owner.correlation_labels())
            .await?;
        for restore in restores {
            if let Err(err) = self.destination.delete_restore(&restore.metadata.name).await {
                if !err.is_not_found() {
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    fn migrated_selector(&self) -> BTreeMap<String, String> {
        BTreeMap::from([(MIGRATED_BY_LABEL.to_string(), self.owner.uid())])
    }

    /// Delete every resource this owner migrated onto the destination
    ///
    /// Collection delete is attempted first for each advertised resource in
    /// each destination namespace; servers that do not support it get a
    /// list+delete fallback. Already-gone objects are tolerated.
    pub async fn delete_migrated(&self) -> Result<()> {
        let selector = self.migrated_selector();
        let resources = self.destination.server_resources().await?;
        let namespaces = self.plan.destination_namespaces();
        for resource in resources.iter().filter(|r| r.namespaced) {
            for namespace in &namespaces {
                match self
                    .destination
                    .delete_collection(resource, namespace, &selector)
                    .await
                {
                    Ok(()) => continue,
                    Err(err) if err.is_not_found() || err.is_method_not_supported() => {}
                    Err(err) => return Err(err),
                }
                let names = self
                    .destination
                    .list_names(resource, namespace, &selector)
                    .await?;
                for name in names {
                    if let Err(err) = self
                        .destination
                        .delete_by_name(resource, namespace, &name)
                        .await
                    {
                        if err.is_not_found() || err.is_method_not_supported() {
                            continue;
                        }
                        warn!(resource = %resource, namespace = %namespace, name = %name,
                            "failed to delete migrated resource");
                        return Err(err);
                    }
                }
            }
        }
        Ok(())
    }

    /// Whether every migrated resource is gone from the destination
    ///
    /// Resources with deletion timestamps still list; `false` means deletion
    /// is in progress and the caller should check again later.
    pub async fn ensure_migrated_resources_deleted(&self) -> Result<bool> {
        let selector = self.migrated_selector();
        let resources = self.destination.server_resources().await?;
        let namespaces = self.plan.destination_namespaces();
        for resource in resources.iter().filter(|r| r.namespaced) {
            for namespace in &namespaces {
                let names = self
                    .destination
                    .list_names(resource, namespace, &selector)
                    .await?;
                if !names.is_empty() {
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::RemoteResource;
    use crate::task::testing::{
        api_error, migration_task, plan_with_namespaces, stage_task,
    };
    use crate::velero::{RestorePhase, RestoreStatus};

    fn stage_backup(name: &str) -> Backup {
        Backup::new(
            ObjectMeta {
                name: name.to_string(),
                namespace: VELERO_NAMESPACE.to_string(),
                ..Default::default()
            },
            Default::default(),
        )
    }

    fn pods_resource() -> RemoteResource {
        RemoteResource {
            group: String::new(),
            version: "v1".to_string(),
            resource: "pods".to_string(),
            kind: "Pod".to_string(),
            namespaced: true,
        }
    }

    #[tokio::test]
    async fn test_ensure_stage_restore_references_stage_backup() {
        let mut task = stage_task("T1");
        let source = task.mock_source();
        source
            .expect_list_backups()
            .withf(|selector| {
                selector.get("caravan.dev/stage-backup") == Some(&"T1".to_string())
            })
            .returning(|_| Ok(vec![stage_backup("payments-stage-abc")]));
        let destination = task.mock_destination();
        destination.expect_list_restores().returning(|_| Ok(vec![]));
        destination
            .expect_create_restore()
            .times(1)
            .returning(|mut restore| {
                restore.metadata.name = "payments-stage-rst".to_string();
                Ok(restore)
            });
        let support = task.mock_support();
        support
            .expect_stage_pod_image()
            .returning(|| Ok("registry.example.com/caravan/stage:v4".to_string()));
        let task = task.build();

        let restore = task.ensure_stage_restore().await.unwrap();

        assert_eq!(restore.spec.backup_name, "payments-stage-abc");
        assert_eq!(restore.spec.restore_pvs, Some(true));
        assert_eq!(
            restore.metadata.annotations.get(STAGE_POD_IMAGE_ANNOTATION),
            Some(&"registry.example.com/caravan/stage:v4".to_string())
        );
        assert_eq!(
            restore.metadata.labels.get("caravan.dev/stage-restore"),
            Some(&"T1".to_string())
        );
    }

    #[tokio::test]
    async fn test_ensure_stage_restore_requires_backup() {
        let mut task = stage_task("T1");
        let source = task.mock_source();
        source.expect_list_backups().returning(|_| Ok(vec![]));
        let task = task.build();

        let err = task.ensure_stage_restore().await.unwrap_err();
        assert!(matches!(err, Error::BackupNotFound { role: "stage" }));
    }

    #[tokio::test]
    async fn test_ensure_final_restore_has_no_stage_image() {
        let mut task = migration_task("T1");
        let source = task.mock_source();
        source
            .expect_list_backups()
            .withf(|selector| {
                selector.get("caravan.dev/initial-backup") == Some(&"T1".to_string())
            })
            .returning(|_| Ok(vec![stage_backup("payments-final-abc")]));
        let destination = task.mock_destination();
        destination.expect_list_restores().returning(|_| Ok(vec![]));
        destination.expect_create_restore().returning(Ok);
        let task = task.build();

        let restore = task.ensure_final_restore().await.unwrap();
        assert_eq!(restore.spec.backup_name, "payments-final-abc");
        assert!(!restore
            .metadata
            .annotations
            .contains_key(STAGE_POD_IMAGE_ANNOTATION));
        assert_eq!(
            restore.metadata.labels.get("caravan.dev/final-restore"),
            Some(&"T1".to_string())
        );
    }

    #[tokio::test]
    async fn test_ensure_restore_idempotent() {
        let mut task = stage_task("T1");
        let source = task.mock_source();
        source
            .expect_list_backups()
            .returning(|_| Ok(vec![stage_backup("payments-stage-abc")]));
        let destination = task.mock_destination();
        destination.expect_list_restores().returning(|_| {
            Ok(vec![Restore::new(
                ObjectMeta {
                    name: "payments-stage-existing".to_string(),
                    namespace: VELERO_NAMESPACE.to_string(),
                    ..Default::default()
                },
                Default::default(),
            )])
        });
        // No create_restore expectation: creating would panic the mock.
        let task = task.build();

        let restore = task.ensure_stage_restore().await.unwrap();
        assert_eq!(restore.metadata.name, "payments-stage-existing");
    }

    #[tokio::test]
    async fn test_namespace_mapping_on_restore() {
        let mut task = migration_task("T1");
        task.plan = plan_with_namespaces(&["src-a:dst-a", "shared:shared", "src-b:"]);
        let source = task.mock_source();
        source
            .expect_list_backups()
            .returning(|_| Ok(vec![stage_backup("payments-final-abc")]));
        let destination = task.mock_destination();
        destination.expect_list_restores().returning(|_| Ok(vec![]));
        destination.expect_create_restore().returning(Ok);
        let task = task.build();

        let restore = task.ensure_final_restore().await.unwrap();
        let mapping = restore.spec.namespace_mapping.unwrap();
        assert_eq!(mapping.len(), 1);
        assert_eq!(mapping.get("src-a"), Some(&"dst-a".to_string()));
    }

    #[tokio::test]
    async fn test_identity_mapping_omitted() {
        let mut task = migration_task("T1");
        task.plan = plan_with_namespaces(&["a:a", "b"]);
        let source = task.mock_source();
        source
            .expect_list_backups()
            .returning(|_| Ok(vec![stage_backup("payments-final-abc")]));
        let destination = task.mock_destination();
        destination.expect_list_restores().returning(|_| Ok(vec![]));
        destination.expect_create_restore().returning(Ok);
        let task = task.build();

        let restore = task.ensure_final_restore().await.unwrap();
        assert!(restore.spec.namespace_mapping.is_none());
    }

    #[tokio::test]
    async fn test_delete_restores_tolerates_not_found() {
        let mut task = migration_task("T1");
        let destination = task.mock_destination();
        destination.expect_list_restores().returning(|_| {
            Ok(vec![Restore::new(
                ObjectMeta {
                    name: "payments-final-rst".to_string(),
                    ..Default::default()
                },
                Default::default(),
            )])
        });
        destination
            .expect_delete_restore()
            .times(1)
            .returning(|_| Err(api_error(404)));
        let task = task.build();

        task.delete_restores().await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_migrated_falls_back_to_item_delete() {
        let mut task = migration_task("T1");
        let destination = task.mock_destination();
        destination
            .expect_server_resources()
            .returning(|| Ok(vec![pods_resource()]));
        destination
            .expect_delete_collection()
            .times(1)
            .returning(|_, _, _| Err(api_error(405)));
        destination
            .expect_list_names()
            .withf(|_, namespace, selector| {
                namespace == "ns1"
                    && selector.get("caravan.dev/migrated-by") == Some(&"T1".to_string())
            })
            .times(1)
            .returning(|_, _, _| Ok(vec!["pod-a".to_string(), "pod-b".to_string()]));
        destination
            .expect_delete_by_name()
            .times(2)
            .returning(|_, _, name| {
                if name == "pod-a" {
                    Err(api_error(404))
                } else {
                    Ok(())
                }
            });
        let task = task.build();

        task.delete_migrated().await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_migrated_skips_fallback_on_success() {
        let mut task = migration_task("T1");
        let destination = task.mock_destination();
        destination
            .expect_server_resources()
            .returning(|| Ok(vec![pods_resource()]));
        destination
            .expect_delete_collection()
            .times(1)
            .returning(|_, _, _| Ok(()));
        // No list_names/delete_by_name expectations: the fallback must not run.
        let task = task.build();

        task.delete_migrated().await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_migrated_surfaces_other_errors() {
        let mut task = migration_task("T1");
        let destination = task.mock_destination();
        destination
            .expect_server_resources()
            .returning(|| Ok(vec![pods_resource()]));
        destination
            .expect_delete_collection()
            .returning(|_, _, _| Err(api_error(500)));
        let task = task.build();

        assert!(task.delete_migrated().await.is_err());
    }

    #[tokio::test]
    async fn test_ensure_migrated_resources_deleted() {
        let mut task = migration_task("T1");
        let destination = task.mock_destination();
        destination
            .expect_server_resources()
            .returning(|| Ok(vec![pods_resource()]));
        destination
            .expect_list_names()
            .returning(|_, _, _| Ok(vec!["pod-a".to_string()]));
        let task = task.build();
        assert!(!task.ensure_migrated_resources_deleted().await.unwrap());

        let mut task = migration_task("T1");
        let destination = task.mock_destination();
        destination
            .expect_server_resources()
            .returning(|| Ok(vec![pods_resource()]));
        destination.expect_list_names().returning(|_, _, _| Ok(vec![]));
        let task = task.build();
        assert!(task.ensure_migrated_resources_deleted().await.unwrap());
    }

    #[tokio::test]
    async fn test_restic_conditions_recorded() {
        let task = migration_task("T1");
        let mut task = task.build();
        let mut restore = Restore::new(
            ObjectMeta {
                name: "payments-final-rst".to_string(),
                namespace: VELERO_NAMESPACE.to_string(),
                ..Default::default()
            },
            Default::default(),
        );
        restore.status = Some(RestoreStatus {
            phase: RestorePhase::Completed,
            pod_volume_restore_errors: vec!["restic: exit 1".to_string()],
            pod_volume_restore_verify_errors: vec![
                "verify: pv-1".to_string(),
                "verify: pv-2".to_string(),
            ],
            ..Default::default()
        });

        task.set_restic_conditions(&restore);

        let conditions = task.owner.conditions();
        let errors = conditions.find(RESTIC_ERRORS_CONDITION).unwrap();
        assert!(errors.durable);
        assert_eq!(
            errors.message,
            "Found 1 restic error(s) on restore payments-final-rst."
        );
        let verify = conditions.find(RESTIC_VERIFY_ERRORS_CONDITION).unwrap();
        assert_eq!(
            verify.message,
            "Found 2 restic verify error(s) on restore payments-final-rst."
        );
    }
}

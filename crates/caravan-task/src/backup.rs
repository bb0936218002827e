//! Backup operations on the source cluster
//!
//! Initial backups capture everything the plan does not exclude; stage
//! backups capture volumes and stage pods marked by the stage machinery.
//! Both are created at most once per task and discovered by owner+role
//! labels on re-runs.

use std::collections::BTreeMap;

use tracing::debug;

use caravan_common::crd::OwnerKind;
use caravan_common::labels::{INCLUDED_IN_STAGE_BACKUP_LABEL, QUIESCE_ANNOTATION};
use caravan_common::settings::{excluded_resources, included_resources};
use caravan_common::{Error, Result};

use crate::ensure::{ensure_owned, find_owned, Role};
use crate::progress::{backup_progress, base_raw, ProgressEntry};
use crate::task::Task;
use crate::velero::{
    Backup, BackupSpec, BackupStorageLocation, DeleteBackupRequest, LabelSelector, ObjectMeta,
    VolumeSnapshotLocation, BACKUP_NAME_LABEL, BACKUP_TTL, VELERO_NAMESPACE,
};

impl Task {
    /// Ensure the backup for this owner kind exists on the source cluster
    pub(crate) async fn ensure_backup(&self) -> Result<Backup> {
        match self.owner.kind() {
            OwnerKind::Migration => self.ensure_initial_backup().await,
            OwnerKind::Stage => self.ensure_stage_backup().await,
        }
    }

    /// Ensure the initial backup exists and has the proper settings
    pub async fn ensure_initial_backup(&self) -> Result<Backup> {
        let labels = self.owner.correlation_labels();
        let uid = self.owner.uid();
        ensure_owned(
            self.source.as_ref(),
            &labels,
            Role::InitialBackup,
            &uid,
            || async {
                let mut backup = self.build_backup().await?;
                self.label_child(
                    &mut backup.metadata.labels,
                    Role::InitialBackup,
                );
                backup.spec.included_resources = included_resources(
                    &self.defaults.initial_included,
                    &self.plan.spec.excluded_resources,
                );
                backup.spec.excluded_resources = excluded_resources(
                    &self.defaults.initial_excluded,
                    &self.plan.spec.excluded_resources,
                );
                // The initial backup must not quiesce anything; only the
                // stage flow stops workloads.
                backup.metadata.annotations.remove(QUIESCE_ANNOTATION);
                Ok(backup)
            },
        )
        .await
    }

    /// Ensure the stage backup exists and has the proper settings
    pub async fn ensure_stage_backup(&self) -> Result<Backup> {
        let labels = self.owner.correlation_labels();
        let uid = self.owner.uid();
        ensure_owned(
            self.source.as_ref(),
            &labels,
            Role::StageBackup,
            &uid,
            || async {
                let mut backup = self.build_backup().await?;
                self.label_child(&mut backup.metadata.labels, Role::StageBackup);
                backup.spec.included_resources = included_resources(
                    &self.defaults.stage_included,
                    &self.plan.spec.excluded_resources,
                );
                backup.spec.excluded_resources = excluded_resources(
                    &self.defaults.stage_excluded,
                    &self.plan.spec.excluded_resources,
                );
                backup.spec.label_selector = Some(LabelSelector {
                    match_labels: BTreeMap::from([(
                        INCLUDED_IN_STAGE_BACKUP_LABEL.to_string(),
                        self.owner.uid(),
                    )]),
                });
                Ok(backup)
            },
        )
        .await
    }

    /// Find the existing backup for this owner kind without creating one
    pub async fn find_backup(&self) -> Result<Option<Backup>> {
        let role = match self.owner.kind() {
            OwnerKind::Migration => Role::InitialBackup,
            OwnerKind::Stage => Role::StageBackup,
        };
        find_owned(
            self.source.as_ref(),
            &self.owner.correlation_labels(),
            role,
            &self.owner.uid(),
        )
        .await
    }

    /// Build a backup as desired for the source cluster
    async fn build_backup(&self) -> Result<Backup> {
        let storage = self.storage_location().await?;
        let snapshot = self.snapshot_location().await?;
        Ok(Backup::new(
            ObjectMeta {
                generate_name: format!("{}-", self.owner.name()),
                namespace: VELERO_NAMESPACE.to_string(),
                labels: self.owner.correlation_labels(),
                annotations: self.annotations.clone(),
                ..Default::default()
            },
            BackupSpec {
                included_namespaces: self.plan.source_namespaces(),
                storage_location: storage.metadata.name,
                volume_snapshot_locations: vec![snapshot.metadata.name],
                ttl: Some(BACKUP_TTL.to_string()),
                include_cluster_resources: None,
                ..Default::default()
            },
        ))
    }

    /// The plan's storage location on the source cluster
    async fn storage_location(&self) -> Result<BackupStorageLocation> {
        let selector = self.plan_correlation_labels();
        let mut locations = self.source.list_storage_locations(&selector).await?;
        locations.sort_by(|a, b| a.metadata.name.cmp(&b.metadata.name));
        locations
            .into_iter()
            .next()
            .ok_or_else(|| Error::LocationMissing {
                kind: "BackupStorageLocation",
                plan: self.plan_name(),
            })
    }

    /// The plan's volume snapshot location on the source cluster
    async fn snapshot_location(&self) -> Result<VolumeSnapshotLocation> {
        let selector = self.plan_correlation_labels();
        let mut locations = self.source.list_snapshot_locations(&selector).await?;
        locations.sort_by(|a, b| a.metadata.name.cmp(&b.metadata.name));
        locations
            .into_iter()
            .next()
            .ok_or_else(|| Error::LocationMissing {
                kind: "VolumeSnapshotLocation",
                plan: self.plan_name(),
            })
    }

    /// Recompute progress from a backup and its pod-volume children
    ///
    /// Returns the `(completed, reasons)` terminal signal; `self.progress`
    /// is overwritten as a side effect.
    pub(crate) async fn update_backup_progress(
        &mut self,
        backup: &Backup,
    ) -> Result<(bool, Vec<String>)> {
        let selector = BTreeMap::from([(
            BACKUP_NAME_LABEL.to_string(),
            backup.metadata.name.clone(),
        )]);
        let copies = self.source.list_pod_volume_backups(&selector).await?;
        let report = backup_progress(backup, &copies);
        self.progress = report.entries;
        Ok((report.completed, report.reasons))
    }

    /// Whether the backup's metadata has replicated to the destination
    ///
    /// A missing backup on the destination is not an error; it becomes the
    /// "Not replicated" progress signal while the data plane catches up.
    pub(crate) async fn check_backup_replicated(&mut self, backup: &Backup) -> Result<bool> {
        let namespace = &backup.metadata.namespace;
        let name = &backup.metadata.name;
        match self.destination.get_backup(namespace, name).await? {
            Some(_) => Ok(true),
            None => {
                let status = backup.status.clone().unwrap_or_default();
                debug!(backup = %name, "backup not replicated yet");
                self.progress = vec![ProgressEntry {
                    message: format!("Backup {namespace}/{name}: Not replicated"),
                    created_at: status.start_timestamp,
                    last_updated: status.completion_timestamp,
                    raw: base_raw("Backup", name, namespace),
                }];
                Ok(false)
            }
        }
    }

    /// Tear down every backup this owner created on the source cluster
    ///
    /// Deletion goes through DeleteBackupRequest objects; that is the data
    /// plane's GC protocol and also removes the stored backup data.
    pub async fn delete_backups(&self) -> Result<()> {
        let backups = self
            .source
            .list_backups(&self.owner.correlation_labels())
            .await?;
        for backup in backups {
            let request = DeleteBackupRequest::for_backup(&backup.metadata.name);
            self.source.create_delete_backup_request(request).await?;
        }
        Ok(())
    }
}

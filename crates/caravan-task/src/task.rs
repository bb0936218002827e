//! The migration task state machine
//!
//! A task drives one owner (migration or stage) through the ordered
//! backup → replication → restore workflow across two clusters. The phase is
//! the single source of truth for resumption: every `advance` re-reads
//! remote state, performs at most one significant step, and returns. The
//! durable state of record is the set of labeled children on the remote
//! clusters — the task object itself can be rebuilt at any time.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

#[cfg(test)]
use mockall::automock;

use caravan_common::crd::{
    CaravanPlan, Condition, ConditionCategory, MigrationOwner,
};
use caravan_common::labels::{
    correlation_labels, MIGRATION_DEBUG_LABEL, PLAN_DEBUG_LABEL,
};
use caravan_common::settings::ResourceDefaults;
use caravan_common::Result;

use crate::api::ClusterApi;
use crate::ensure::Role;
use crate::progress::ProgressEntry;
use crate::velero::{Backup, Restore};

/// Condition recorded when the backup reaches a terminal failure phase
pub const BACKUP_FAILED_CONDITION: &str = "BackupFailed";

/// Condition recorded when the restore reaches a terminal failure phase
pub const RESTORE_FAILED_CONDITION: &str = "RestoreFailed";

/// Durable warning for restic errors on a completed restore
pub const RESTIC_ERRORS_CONDITION: &str = "ResticErrors";

/// Durable warning for restic verification errors on a completed restore
pub const RESTIC_VERIFY_ERRORS_CONDITION: &str = "ResticVerifyErrors";

/// Task phases, in workflow order
///
/// Terminal backup/restore failures are recorded on the owner's condition
/// set, not as phases; the phase only tracks forward progress.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum Phase {
    /// Initial phase of a new task
    #[default]
    Started,
    /// Waiting for the file-copy daemon bounce to finish
    WaitOnResticRestart,
    /// File-copy daemon restarted and ready
    ResticRestartCompleted,
    /// Backup submitted; waiting for it to complete
    BackupStarted,
    /// Backup completed on the source cluster
    BackupCompleted,
    /// Waiting for backup metadata to appear on the destination
    WaitOnBackupReplication,
    /// Backup metadata visible on the destination
    BackupReplicated,
    /// Restore submitted; waiting for it to complete
    RestoreStarted,
    /// Restore completed on the destination cluster
    RestoreCompleted,
    /// Workflow finished
    Completed,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Started => "Started",
            Self::WaitOnResticRestart => "WaitOnResticRestart",
            Self::ResticRestartCompleted => "ResticRestartCompleted",
            Self::BackupStarted => "BackupStarted",
            Self::BackupCompleted => "BackupCompleted",
            Self::WaitOnBackupReplication => "WaitOnBackupReplication",
            Self::BackupReplicated => "BackupReplicated",
            Self::RestoreStarted => "RestoreStarted",
            Self::RestoreCompleted => "RestoreCompleted",
            Self::Completed => "Completed",
        };
        f.write_str(s)
    }
}

/// Which cluster a support operation targets
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClusterSide {
    /// The cluster workloads are migrated from
    Source,
    /// The cluster workloads are migrated to
    Destination,
}

/// External collaborators the workflow depends on but does not implement
///
/// The engine only observes post-conditions: whether the file-copy daemon
/// bounce finished, that a staging registry exists (and which annotations
/// point at it), and which image stage pods should run.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SupportServices: Send + Sync {
    /// Bounce the source cluster's file-copy daemon if needed
    ///
    /// Returns true once the restarted daemon pods are ready. The bounce is
    /// a mount-propagation workaround: volumes attached after daemon start
    /// are invisible to it until restart.
    async fn restic_restarted(&self) -> Result<bool>;

    /// Ensure the staging image registry exists on one cluster
    ///
    /// Returns the annotations (registry pointer and directory) to stamp on
    /// backups and restores.
    async fn ensure_registry(&self, side: ClusterSide) -> Result<BTreeMap<String, String>>;

    /// Image for placeholder stage pods, resolved from the destination
    async fn stage_pod_image(&self) -> Result<String>;
}

/// One migration task: the workflow instance owned by a migration or stage
///
/// Construct a task per reconciliation of the owner and call
/// [`advance`](Task::advance) once; the phase carries across constructions.
/// Remote clients are built by the caller per advancement (see
/// [`crate::remote`]) so token rotation is always picked up.
pub struct Task {
    /// The owning migration or stage resource
    pub owner: Box<dyn MigrationOwner>,
    /// The plan being executed
    pub plan: CaravanPlan,
    /// Source cluster API
    pub source: Arc<dyn ClusterApi>,
    /// Destination cluster API
    pub destination: Arc<dyn ClusterApi>,
    /// External workflow collaborators
    pub support: Arc<dyn SupportServices>,
    /// Include/exclude resource set configuration
    pub defaults: ResourceDefaults,
    /// Annotations stamped on created backups and restores
    pub annotations: BTreeMap<String, String>,
    /// Current workflow phase; the only externally mutable task state
    pub phase: Phase,
    /// Last observed backup
    pub backup: Option<Backup>,
    /// Last observed restore
    pub restore: Option<Restore>,
    /// Progress recomputed on the last advancement
    pub progress: Vec<ProgressEntry>,
}

impl Task {
    /// Create a task in the initial phase
    pub fn new(
        owner: Box<dyn MigrationOwner>,
        plan: CaravanPlan,
        source: Arc<dyn ClusterApi>,
        destination: Arc<dyn ClusterApi>,
        support: Arc<dyn SupportServices>,
    ) -> Self {
        Self {
            owner,
            plan,
            source,
            destination,
            support,
            defaults: ResourceDefaults::from_env(),
            annotations: BTreeMap::new(),
            phase: Phase::default(),
            backup: None,
            restore: None,
            progress: Vec::new(),
        }
    }

    /// The task UID; identical to the owner UID
    pub fn uid(&self) -> String {
        self.owner.uid()
    }

    /// Drive the workflow one step forward
    ///
    /// Re-reads remote state, performs at most one significant step, and
    /// returns. Call repeatedly until `phase` is [`Phase::Completed`] or a
    /// failure condition appears on the owner. Errors are transient from the
    /// engine's point of view: re-advancing picks up from observed remote
    /// state.
    pub async fn advance(&mut self) -> Result<()> {
        self.log_enter();
        let result = self.run().await;
        self.log_exit();
        result
    }

    async fn run(&mut self) -> Result<()> {
        if matches!(self.phase, Phase::Started | Phase::WaitOnResticRestart) {
            if !self.support.restic_restarted().await? {
                self.phase = Phase::WaitOnResticRestart;
                return Ok(());
            }
            self.phase = Phase::ResticRestartCompleted;
        }

        let registry = self.support.ensure_registry(ClusterSide::Source).await?;
        self.annotations.extend(registry);

        let backup = self.ensure_backup().await?;
        let (completed, reasons) = self.update_backup_progress(&backup).await?;
        self.backup = Some(backup.clone());
        if !completed || !reasons.is_empty() {
            if !reasons.is_empty() {
                self.owner.set_condition(Condition::new(
                    BACKUP_FAILED_CONDITION,
                    ConditionCategory::Error,
                    reasons.join(" "),
                ));
            }
            self.phase = Phase::BackupStarted;
            return Ok(());
        }
        self.phase = Phase::BackupCompleted;

        self.phase = Phase::WaitOnBackupReplication;
        if !self.check_backup_replicated(&backup).await? {
            return Ok(());
        }
        self.phase = Phase::BackupReplicated;

        let registry = self
            .support
            .ensure_registry(ClusterSide::Destination)
            .await?;
        self.annotations.extend(registry);

        let restore = self.ensure_restore().await?;
        let (completed, reasons) = self.update_restore_progress(&restore).await?;
        if !completed || !reasons.is_empty() {
            if !reasons.is_empty() {
                self.owner.set_condition(Condition::new(
                    RESTORE_FAILED_CONDITION,
                    ConditionCategory::Error,
                    reasons.join(" "),
                ));
            }
            self.restore = Some(restore);
            self.phase = Phase::RestoreStarted;
            return Ok(());
        }
        self.set_restic_conditions(&restore);
        self.restore = Some(restore);
        self.phase = Phase::RestoreCompleted;

        self.phase = Phase::Completed;
        Ok(())
    }

    /// Stamp role and debug labels on a child resource
    pub(crate) fn label_child(&self, labels: &mut BTreeMap<String, String>, role: Role) {
        labels.insert(role.label().to_string(), self.owner.uid());
        labels.insert(MIGRATION_DEBUG_LABEL.to_string(), self.owner.name());
        labels.insert(PLAN_DEBUG_LABEL.to_string(), self.owner.plan_name());
    }

    /// Correlation labels identifying resources owned by the plan
    pub(crate) fn plan_correlation_labels(&self) -> BTreeMap<String, String> {
        let uid = self.plan.metadata.uid.clone().unwrap_or_default();
        correlation_labels("CaravanPlan", &uid)
    }

    /// Plan name for error context
    pub(crate) fn plan_name(&self) -> String {
        self.plan.metadata.name.clone().unwrap_or_default()
    }

    fn log_enter(&self) {
        if self.phase == Phase::Started {
            info!(owner = %self.owner.name(), "task started");
        } else {
            info!(owner = %self.owner.name(), phase = %self.phase, "task resumed");
        }
    }

    fn log_exit(&self) {
        if self.phase == Phase::Completed {
            info!(owner = %self.owner.name(), "task completed");
            return;
        }
        let backup = self
            .backup
            .as_ref()
            .map(|b| b.metadata.name.as_str())
            .unwrap_or_default();
        let restore = self
            .restore
            .as_ref()
            .map(|r| r.metadata.name.as_str())
            .unwrap_or_default();
        info!(
            owner = %self.owner.name(),
            phase = %self.phase,
            backup,
            restore,
            "task interrupted"
        );
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::api::MockClusterApi;
    use crate::velero::{BackupStorageLocation, ObjectMeta, VolumeSnapshotLocation};
    use caravan_common::crd::{
        CaravanMigration, CaravanMigrationSpec, CaravanPlanSpec, CaravanStage, CaravanStageSpec,
        ObjectRef,
    };
    use caravan_common::Error;
    use kube::core::ObjectMeta as KubeObjectMeta;

    pub(crate) fn api_error(code: u16) -> Error {
        let reason = match code {
            404 => "NotFound",
            405 => "MethodNotAllowed",
            _ => "InternalError",
        };
        Error::Kube {
            source: kube::Error::Api(kube::core::ErrorResponse {
                status: "Failure".to_string(),
                message: format!("{reason} for test"),
                reason: reason.to_string(),
                code,
            }),
        }
    }

    pub(crate) fn plan_with_namespaces(namespaces: &[&str]) -> CaravanPlan {
        CaravanPlan {
            metadata: KubeObjectMeta {
                name: Some("payments".to_string()),
                namespace: Some("caravan-system".to_string()),
                uid: Some("P1".to_string()),
                ..Default::default()
            },
            spec: CaravanPlanSpec {
                src_cluster_ref: ObjectRef::new("east", "caravan-system"),
                dest_cluster_ref: ObjectRef::new("west", "caravan-system"),
                namespaces: namespaces.iter().map(|s| s.to_string()).collect(),
                excluded_resources: vec![],
                persistent_volumes: vec![],
            },
            status: None,
        }
    }

    pub(crate) fn stored_location(name: &str) -> BackupStorageLocation {
        BackupStorageLocation {
            metadata: ObjectMeta {
                name: name.to_string(),
                namespace: crate::velero::VELERO_NAMESPACE.to_string(),
                ..Default::default()
            },
        }
    }

    pub(crate) fn stored_snapshot(name: &str) -> VolumeSnapshotLocation {
        VolumeSnapshotLocation {
            metadata: ObjectMeta {
                name: name.to_string(),
                namespace: crate::velero::VELERO_NAMESPACE.to_string(),
                ..Default::default()
            },
        }
    }

    pub(crate) struct TaskFixture {
        source: MockClusterApi,
        destination: MockClusterApi,
        support: MockSupportServices,
        owner: Box<dyn MigrationOwner>,
        pub(crate) plan: CaravanPlan,
    }

    impl TaskFixture {
        pub(crate) fn mock_source(&mut self) -> &mut MockClusterApi {
            &mut self.source
        }

        pub(crate) fn mock_destination(&mut self) -> &mut MockClusterApi {
            &mut self.destination
        }

        pub(crate) fn mock_support(&mut self) -> &mut MockSupportServices {
            &mut self.support
        }

        pub(crate) fn build(self) -> Task {
            Task {
                owner: self.owner,
                plan: self.plan,
                source: Arc::new(self.source),
                destination: Arc::new(self.destination),
                support: Arc::new(self.support),
                defaults: ResourceDefaults::default(),
                annotations: BTreeMap::new(),
                phase: Phase::default(),
                backup: None,
                restore: None,
                progress: Vec::new(),
            }
        }
    }

    fn fixture(owner: Box<dyn MigrationOwner>) -> TaskFixture {
        TaskFixture {
            source: MockClusterApi::new(),
            destination: MockClusterApi::new(),
            support: MockSupportServices::new(),
            owner,
            plan: plan_with_namespaces(&["ns1"]),
        }
    }

    pub(crate) fn migration_task(uid: &str) -> TaskFixture {
        fixture(Box::new(CaravanMigration {
            metadata: KubeObjectMeta {
                name: Some("payments-final".to_string()),
                namespace: Some("caravan-system".to_string()),
                uid: Some(uid.to_string()),
                ..Default::default()
            },
            spec: CaravanMigrationSpec {
                plan_ref: ObjectRef::new("payments", "caravan-system"),
                quiesce_pods: false,
            },
            status: None,
        }))
    }

    pub(crate) fn stage_task(uid: &str) -> TaskFixture {
        fixture(Box::new(CaravanStage {
            metadata: KubeObjectMeta {
                name: Some("payments-stage".to_string()),
                namespace: Some("caravan-system".to_string()),
                uid: Some(uid.to_string()),
                ..Default::default()
            },
            spec: CaravanStageSpec {
                plan_ref: ObjectRef::new("payments", "caravan-system"),
            },
            status: None,
        }))
    }
}

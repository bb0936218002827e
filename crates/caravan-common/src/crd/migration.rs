//! Owner Custom Resource Definitions: CaravanMigration and CaravanStage
//!
//! A migration is the full workflow (initial backup, replication, final
//! restore); a stage moves volumes and stage pods only. Both own a task and
//! are abstracted behind [`MigrationOwner`] so the engine never branches on
//! concrete types.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{Condition, Conditions, ObjectRef};
use crate::labels::correlation_labels;

/// The two concrete owner kinds
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OwnerKind {
    /// Full migration: initial backup and final restore
    Migration,
    /// Stage run: stage backup and stage restore
    Stage,
}

impl OwnerKind {
    /// Kubernetes kind string for the owner
    pub fn as_kind(&self) -> &'static str {
        match self {
            Self::Migration => "CaravanMigration",
            Self::Stage => "CaravanStage",
        }
    }
}

impl std::fmt::Display for OwnerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_kind())
    }
}

/// Capability interface the task engine requires from its owner
///
/// Everything here is a pure function of the owner resource; in particular
/// [`correlation_labels`](MigrationOwner::correlation_labels) must be stable
/// across process restarts because it is the only discovery key for
/// already-created children.
pub trait MigrationOwner: Send + Sync {
    /// Owner UID; also the task UID stamped into role labels
    fn uid(&self) -> String;
    /// Owner name; used as the generate-name prefix for children
    fn name(&self) -> String;
    /// Which of the two owner kinds this is
    fn kind(&self) -> OwnerKind;
    /// Name of the referenced plan, for debug labels
    fn plan_name(&self) -> String;
    /// Correlation label set identifying every resource this owner owns
    fn correlation_labels(&self) -> BTreeMap<String, String>;
    /// Record a condition on the owner's status
    fn set_condition(&mut self, condition: Condition);
    /// The owner's current condition set
    fn conditions(&self) -> Conditions;
}

/// Status shared by both owner kinds
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CaravanMigrationStatus {
    /// Workflow conditions recorded by the task engine
    #[serde(default, skip_serializing_if = "Conditions::is_empty")]
    pub conditions: Conditions,
    /// Observed generation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

/// Status of a CaravanStage
pub type CaravanStageStatus = CaravanMigrationStatus;

/// Specification for a CaravanMigration
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "caravan.dev",
    version = "v1alpha1",
    kind = "CaravanMigration",
    plural = "caravanmigrations",
    shortname = "cvm",
    namespaced,
    status = "CaravanMigrationStatus",
    printcolumn = r#"{"name":"Plan","type":"string","jsonPath":".spec.planRef.name"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct CaravanMigrationSpec {
    /// Plan this migration executes
    pub plan_ref: ObjectRef,
    /// Quiesce workloads on the source before the final restore
    #[serde(default)]
    pub quiesce_pods: bool,
}

/// Specification for a CaravanStage
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "caravan.dev",
    version = "v1alpha1",
    kind = "CaravanStage",
    plural = "caravanstages",
    shortname = "cvs",
    namespaced,
    status = "CaravanStageStatus",
    printcolumn = r#"{"name":"Plan","type":"string","jsonPath":".spec.planRef.name"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct CaravanStageSpec {
    /// Plan this stage run executes
    pub plan_ref: ObjectRef,
}

impl MigrationOwner for CaravanMigration {
    fn uid(&self) -> String {
        self.metadata.uid.clone().unwrap_or_default()
    }

    fn name(&self) -> String {
        self.metadata.name.clone().unwrap_or_default()
    }

    fn kind(&self) -> OwnerKind {
        OwnerKind::Migration
    }

    fn plan_name(&self) -> String {
        self.spec.plan_ref.name.clone()
    }

    fn correlation_labels(&self) -> BTreeMap<String, String> {
        correlation_labels(self.kind().as_kind(), &self.uid())
    }

    fn set_condition(&mut self, condition: Condition) {
        self.status
            .get_or_insert_with(Default::default)
            .conditions
            .set(condition);
    }

    fn conditions(&self) -> Conditions {
        self.status
            .as_ref()
            .map(|s| s.conditions.clone())
            .unwrap_or_default()
    }
}

impl MigrationOwner for CaravanStage {
    fn uid(&self) -> String {
        self.metadata.uid.clone().unwrap_or_default()
    }

    fn name(&self) -> String {
        self.metadata.name.clone().unwrap_or_default()
    }

    fn kind(&self) -> OwnerKind {
        OwnerKind::Stage
    }

    fn plan_name(&self) -> String {
        self.spec.plan_ref.name.clone()
    }

    fn correlation_labels(&self) -> BTreeMap<String, String> {
        correlation_labels(self.kind().as_kind(), &self.uid())
    }

    fn set_condition(&mut self, condition: Condition) {
        self.status
            .get_or_insert_with(Default::default)
            .conditions
            .set(condition);
    }

    fn conditions(&self) -> Conditions {
        self.status
            .as_ref()
            .map(|s| s.conditions.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::types::ConditionCategory;
    use kube::core::ObjectMeta;

    fn sample_migration(uid: &str) -> CaravanMigration {
        CaravanMigration {
            metadata: ObjectMeta {
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
        }
    }

    #[test]
    fn test_correlation_labels_stable_across_instances() {
        // Two loads of the same resource must produce identical labels.
        let a = sample_migration("uid-1").correlation_labels();
        let b = sample_migration("uid-1").correlation_labels();
        assert_eq!(a, b);
        assert_eq!(
            a.get("caravan.dev/caravanmigration-uid"),
            Some(&"uid-1".to_string())
        );
    }

    #[test]
    fn test_owner_kind_dispatch() {
        let migration = sample_migration("uid-1");
        assert_eq!(migration.kind(), OwnerKind::Migration);
        assert_eq!(migration.kind().as_kind(), "CaravanMigration");
        assert_eq!(migration.plan_name(), "payments");

        let stage = CaravanStage {
            metadata: ObjectMeta {
                name: Some("payments-stage".to_string()),
                uid: Some("uid-2".to_string()),
                ..Default::default()
            },
            spec: CaravanStageSpec {
                plan_ref: ObjectRef::new("payments", "caravan-system"),
            },
            status: None,
        };
        assert_eq!(stage.kind(), OwnerKind::Stage);
        assert!(stage
            .correlation_labels()
            .contains_key("caravan.dev/caravanstage-uid"));
    }

    #[test]
    fn test_set_condition_initializes_status() {
        let mut migration = sample_migration("uid-1");
        migration.set_condition(Condition::new(
            "BackupFailed",
            ConditionCategory::Error,
            "Backup: velero/payments-final-x7k partially failed.",
        ));
        let status = migration.status.as_ref().unwrap();
        assert!(status.conditions.has("BackupFailed"));
    }
}

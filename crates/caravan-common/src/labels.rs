//! Correlation, role, and debug labels for task-owned resources
//!
//! Every child resource a task creates on a remote cluster carries the
//! owner's correlation label plus a role label whose value is the task UID.
//! Listing by that subset is the only discovery mechanism for owned
//! children, so the builders here must be pure functions of owner identity
//! and task UID — stable across process restarts.

use std::collections::BTreeMap;

use crate::API_GROUP;

/// Role label for the full backup taken at the start of a migration
pub const INITIAL_BACKUP_LABEL: &str = "caravan.dev/initial-backup";

/// Role label for the stage backup (volumes and stage pods only)
pub const STAGE_BACKUP_LABEL: &str = "caravan.dev/stage-backup";

/// Role label for the restore of a stage backup
pub const STAGE_RESTORE_LABEL: &str = "caravan.dev/stage-restore";

/// Role label for the restore of the initial backup
pub const FINAL_RESTORE_LABEL: &str = "caravan.dev/final-restore";

/// Selector label stamped on objects to be swept into a stage backup
pub const INCLUDED_IN_STAGE_BACKUP_LABEL: &str = "caravan.dev/included-in-stage-backup";

/// Label carried by every resource created on the destination cluster
pub const MIGRATED_BY_LABEL: &str = "caravan.dev/migrated-by";

/// Debug label carrying the owning migration's name
pub const MIGRATION_DEBUG_LABEL: &str = "caravan.dev/migration";

/// Debug label carrying the plan's name
pub const PLAN_DEBUG_LABEL: &str = "caravan.dev/plan";

/// Annotation pointing backups at the staging image registry
pub const REGISTRY_ANNOTATION: &str = "caravan.dev/migration-registry";

/// Annotation carrying the registry storage directory
pub const REGISTRY_DIR_ANNOTATION: &str = "caravan.dev/migration-registry-dir";

/// Annotation requesting workload quiesce; stripped from initial backups
pub const QUIESCE_ANNOTATION: &str = "caravan.dev/quiesce-pods";

/// Annotation carrying the stage pod image for stage restores
pub const STAGE_POD_IMAGE_ANNOTATION: &str = "caravan.dev/stage-pod-image";

/// Correlation label key for an owner kind
///
/// The key is derived from the kind alone so that all children of one owner,
/// across both clusters, share a single selector.
pub fn correlation_label_key(kind: &str) -> String {
    format!("{}/{}-uid", API_GROUP, kind.to_ascii_lowercase())
}

/// Correlation label set for an owner identity
pub fn correlation_labels(kind: &str, uid: &str) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(correlation_label_key(kind), uid.to_string());
    labels
}

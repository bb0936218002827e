//! Velero resource types
//!
//! Typed structs for the Velero resources the engine submits and observes
//! (Backup, Restore, their pod-volume children, delete-backup requests, and
//! the storage/snapshot location descriptors). These implement
//! [`HasApiResource`] for consistent API version handling; all remote access
//! goes through `Api<DynamicObject>` with serde conversion.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use kube::discovery::ApiResource;
use serde::{Deserialize, Serialize};

/// Velero namespace where Backup/Restore resources are created
pub const VELERO_NAMESPACE: &str = "velero";

/// TTL applied to every backup (30 days)
pub const BACKUP_TTL: &str = "720h";

/// Label Velero stamps on pod-volume backups with their parent backup name
pub const BACKUP_NAME_LABEL: &str = "velero.io/backup-name";

/// Label Velero stamps on pod-volume restores with their parent restore name
pub const RESTORE_NAME_LABEL: &str = "velero.io/restore-name";

/// Static API coordinates for a remote resource type
pub trait HasApiResource {
    /// Full apiVersion (`group/version`)
    const API_VERSION: &'static str;
    /// Resource kind
    const KIND: &'static str;
    /// Plural resource name
    const PLURAL: &'static str;

    /// Build the discovery descriptor for this type
    fn api_resource() -> ApiResource {
        let (group, version) = match Self::API_VERSION.split_once('/') {
            Some((group, version)) => (group.to_string(), version.to_string()),
            None => (String::new(), Self::API_VERSION.to_string()),
        };
        ApiResource {
            group,
            version,
            api_version: Self::API_VERSION.to_string(),
            kind: Self::KIND.to_string(),
            plural: Self::PLURAL.to_string(),
        }
    }
}

/// Object metadata carried by Velero resources
///
/// Unknown server-side fields (uid, resourceVersion, managedFields, …) are
/// dropped on deserialization; the engine never writes them back.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    /// Resource name; empty until the server resolves generateName
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Prefix for server-side name generation
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub generate_name: String,
    /// Resource namespace
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    /// Labels
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Annotations
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

/// Label selector restricting a backup to matching objects
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelector {
    /// Match labels
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub match_labels: BTreeMap<String, String>,
}

// =============================================================================
// Backup
// =============================================================================

/// Phase of a Velero Backup
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum BackupPhase {
    /// Accepted but not started
    #[default]
    #[serde(alias = "")]
    New,
    /// Running
    InProgress,
    /// Finished without errors
    Completed,
    /// Finished; nothing was backed up
    Failed,
    /// Finished with item-level errors
    PartiallyFailed,
    /// Rejected before running
    FailedValidation,
    /// Any phase this engine does not interpret
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for BackupPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::New => "New",
            Self::InProgress => "InProgress",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
            Self::PartiallyFailed => "PartiallyFailed",
            Self::FailedValidation => "FailedValidation",
            Self::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

/// Item-count progress reported on a running backup
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BackupItemProgress {
    /// Estimated total items
    #[serde(default)]
    pub total_items: i64,
    /// Items backed up so far
    #[serde(default)]
    pub items_backed_up: i64,
}

/// Velero Backup spec
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BackupSpec {
    /// Namespaces to include
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub included_namespaces: Vec<String>,
    /// Resource types to include; empty means everything
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub included_resources: Vec<String>,
    /// Resource types to exclude
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excluded_resources: Vec<String>,
    /// Restrict the backup to objects matching this selector
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_selector: Option<LabelSelector>,
    /// Storage location name
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub storage_location: String,
    /// Volume snapshot location names
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volume_snapshot_locations: Vec<String>,
    /// Backup retention
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<String>,
    /// Include cluster-scoped resources; None lets the server decide
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_cluster_resources: Option<bool>,
}

/// Velero Backup status
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BackupStatus {
    /// Current phase
    #[serde(default)]
    pub phase: BackupPhase,
    /// Item-count progress, present while running
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<BackupItemProgress>,
    /// When the backup started
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_timestamp: Option<DateTime<Utc>>,
    /// When the backup finished
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_timestamp: Option<DateTime<Utc>>,
    /// Validation failures, set with FailedValidation
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validation_errors: Vec<String>,
}

/// Velero Backup resource
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Backup {
    /// API version
    #[serde(default = "Backup::default_api_version")]
    pub api_version: String,
    /// Resource kind
    #[serde(default = "Backup::default_kind")]
    pub kind: String,
    /// Resource metadata
    pub metadata: ObjectMeta,
    /// Backup specification
    #[serde(default)]
    pub spec: BackupSpec,
    /// Backup status
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<BackupStatus>,
}

impl HasApiResource for Backup {
    const API_VERSION: &'static str = "velero.io/v1";
    const KIND: &'static str = "Backup";
    const PLURAL: &'static str = "backups";
}

impl Backup {
    fn default_api_version() -> String {
        <Self as HasApiResource>::API_VERSION.to_string()
    }
    fn default_kind() -> String {
        <Self as HasApiResource>::KIND.to_string()
    }

    /// Create a new Backup
    pub fn new(metadata: ObjectMeta, spec: BackupSpec) -> Self {
        Self {
            api_version: Self::default_api_version(),
            kind: Self::default_kind(),
            metadata,
            spec,
            status: None,
        }
    }

    /// Observed phase; New when the server has not reported status yet
    pub fn phase(&self) -> BackupPhase {
        self.status.as_ref().map(|s| s.phase).unwrap_or_default()
    }
}

// =============================================================================
// Restore
// =============================================================================

/// Phase of a Velero Restore
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum RestorePhase {
    /// Accepted but not started
    #[default]
    #[serde(alias = "")]
    New,
    /// Running
    InProgress,
    /// Finished without errors
    Completed,
    /// Finished; nothing was restored
    Failed,
    /// Finished with item-level errors
    PartiallyFailed,
    /// Rejected before running
    FailedValidation,
    /// Any phase this engine does not interpret
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for RestorePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::New => "New",
            Self::InProgress => "InProgress",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
            Self::PartiallyFailed => "PartiallyFailed",
            Self::FailedValidation => "FailedValidation",
            Self::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

/// Velero Restore spec
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RestoreSpec {
    /// Name of the backup to restore from
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub backup_name: String,
    /// Resource types to exclude
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excluded_resources: Vec<String>,
    /// Restore persistent volumes
    #[serde(default, rename = "restorePVs", skip_serializing_if = "Option::is_none")]
    pub restore_pvs: Option<bool>,
    /// Source→destination namespace renames; absent means identity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace_mapping: Option<BTreeMap<String, String>>,
}

/// Velero Restore status
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RestoreStatus {
    /// Current phase
    #[serde(default)]
    pub phase: RestorePhase,
    /// Validation failures, set with FailedValidation
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validation_errors: Vec<String>,
    /// Errors reported by pod-volume restores
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pod_volume_restore_errors: Vec<String>,
    /// Verification errors reported by pod-volume restores
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pod_volume_restore_verify_errors: Vec<String>,
}

/// Velero Restore resource
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Restore {
    /// API version
    #[serde(default = "Restore::default_api_version")]
    pub api_version: String,
    /// Resource kind
    #[serde(default = "Restore::default_kind")]
    pub kind: String,
    /// Resource metadata
    pub metadata: ObjectMeta,
    /// Restore specification
    #[serde(default)]
    pub spec: RestoreSpec,
    /// Restore status
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<RestoreStatus>,
}

impl HasApiResource for Restore {
    const API_VERSION: &'static str = "velero.io/v1";
    const KIND: &'static str = "Restore";
    const PLURAL: &'static str = "restores";
}

impl Restore {
    fn default_api_version() -> String {
        <Self as HasApiResource>::API_VERSION.to_string()
    }
    fn default_kind() -> String {
        <Self as HasApiResource>::KIND.to_string()
    }

    /// Create a new Restore
    pub fn new(metadata: ObjectMeta, spec: RestoreSpec) -> Self {
        Self {
            api_version: Self::default_api_version(),
            kind: Self::default_kind(),
            metadata,
            spec,
            status: None,
        }
    }

    /// Observed phase; New when the server has not reported status yet
    pub fn phase(&self) -> RestorePhase {
        self.status.as_ref().map(|s| s.phase).unwrap_or_default()
    }
}

// =============================================================================
// Pod-volume children
// =============================================================================

/// Phase of a pod-volume backup or restore
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum VolumeCopyPhase {
    /// Accepted but not started
    #[default]
    #[serde(alias = "")]
    New,
    /// Copying bytes
    InProgress,
    /// Finished
    Completed,
    /// Failed
    Failed,
    /// Any phase this engine does not interpret
    #[serde(other)]
    Unknown,
}

/// Byte-level progress of one pod-volume operation
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VolumeOperationProgress {
    /// Total bytes to copy
    #[serde(default)]
    pub total_bytes: i64,
    /// Bytes copied so far
    #[serde(default)]
    pub bytes_done: i64,
}

/// Status shared by pod-volume backups and restores
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VolumeCopyStatus {
    /// Current phase
    #[serde(default)]
    pub phase: VolumeCopyPhase,
    /// Byte-level progress
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<VolumeOperationProgress>,
    /// When the copy started
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_timestamp: Option<DateTime<Utc>>,
    /// When the copy finished
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_timestamp: Option<DateTime<Utc>>,
}

/// Per-pod-volume child of a Backup, carrying byte-level copy progress
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PodVolumeBackup {
    /// Resource metadata
    #[serde(default)]
    pub metadata: ObjectMeta,
    /// Copy status
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<VolumeCopyStatus>,
}

impl HasApiResource for PodVolumeBackup {
    const API_VERSION: &'static str = "velero.io/v1";
    const KIND: &'static str = "PodVolumeBackup";
    const PLURAL: &'static str = "podvolumebackups";
}

/// Per-pod-volume child of a Restore, carrying byte-level copy progress
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PodVolumeRestore {
    /// Resource metadata
    #[serde(default)]
    pub metadata: ObjectMeta,
    /// Copy status
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<VolumeCopyStatus>,
}

impl HasApiResource for PodVolumeRestore {
    const API_VERSION: &'static str = "velero.io/v1";
    const KIND: &'static str = "PodVolumeRestore";
    const PLURAL: &'static str = "podvolumerestores";
}

// =============================================================================
// DeleteBackupRequest
// =============================================================================

/// Spec of a backup deletion request
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeleteBackupRequestSpec {
    /// Name of the backup to delete
    pub backup_name: String,
}

/// Velero's protocol object for backup garbage collection
///
/// Backups are never deleted directly; a request object is created and the
/// server tears down the backup and its stored data.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeleteBackupRequest {
    /// API version
    #[serde(default = "DeleteBackupRequest::default_api_version")]
    pub api_version: String,
    /// Resource kind
    #[serde(default = "DeleteBackupRequest::default_kind")]
    pub kind: String,
    /// Resource metadata
    pub metadata: ObjectMeta,
    /// Request specification
    pub spec: DeleteBackupRequestSpec,
}

impl HasApiResource for DeleteBackupRequest {
    const API_VERSION: &'static str = "velero.io/v1";
    const KIND: &'static str = "DeleteBackupRequest";
    const PLURAL: &'static str = "deletebackuprequests";
}

impl DeleteBackupRequest {
    fn default_api_version() -> String {
        <Self as HasApiResource>::API_VERSION.to_string()
    }
    fn default_kind() -> String {
        <Self as HasApiResource>::KIND.to_string()
    }

    /// Build a deletion request for the named backup
    pub fn for_backup(backup_name: &str) -> Self {
        Self {
            api_version: Self::default_api_version(),
            kind: Self::default_kind(),
            metadata: ObjectMeta {
                generate_name: format!("{backup_name}-"),
                namespace: VELERO_NAMESPACE.to_string(),
                ..Default::default()
            },
            spec: DeleteBackupRequestSpec {
                backup_name: backup_name.to_string(),
            },
        }
    }
}

// =============================================================================
// Locations
// =============================================================================

/// Velero BackupStorageLocation resource
///
/// Only the identity matters to the engine; the storage configuration is the
/// data plane's business.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BackupStorageLocation {
    /// Resource metadata
    #[serde(default)]
    pub metadata: ObjectMeta,
}

impl HasApiResource for BackupStorageLocation {
    const API_VERSION: &'static str = "velero.io/v1";
    const KIND: &'static str = "BackupStorageLocation";
    const PLURAL: &'static str = "backupstoragelocations";
}

/// Velero VolumeSnapshotLocation resource
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSnapshotLocation {
    /// Resource metadata
    #[serde(default)]
    pub metadata: ObjectMeta,
}

impl HasApiResource for VolumeSnapshotLocation {
    const API_VERSION: &'static str = "velero.io/v1";
    const KIND: &'static str = "VolumeSnapshotLocation";
    const PLURAL: &'static str = "volumesnapshotlocations";
}

// =============================================================================
// Tests
// =============================================================================

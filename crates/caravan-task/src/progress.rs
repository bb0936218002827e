//! Progress extraction from backup/restore phases
//!
//! From a top-level Velero object plus its pod-volume children, produce an
//! ordered progress list and a terminal `(completed, reasons)` signal.
//! Progress is recomputed from live remote state on every advancement and
//! overwrites the previous list, so garbage-collected children never leave
//! stale entries behind.
//!
//! Child entries are emitted in lexicographic order of `namespace + "/" +
//! name` so external observers see a stable, monotonic list.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use caravan_common::format::{bytes_to_si, format_duration};

use crate::velero::{
    Backup, BackupPhase, PodVolumeBackup, PodVolumeRestore, Restore, RestorePhase,
    VolumeCopyPhase, VolumeCopyStatus,
};

/// One line of migration progress
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEntry {
    /// Human-readable progress message
    pub message: String,
    /// When the reported operation started
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// When this entry was last updated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
    /// Machine-readable fields: Kind, Name, Namespace, and byte counts in SI
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub raw: BTreeMap<String, String>,
}

/// Terminal signal extracted from a backup or restore
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProgressReport {
    /// Whether the operation reached a terminal phase
    pub completed: bool,
    /// Failure reasons; empty on clean completion
    pub reasons: Vec<String>,
    /// Ordered progress entries
    pub entries: Vec<ProgressEntry>,
}

/// A pod-volume child observed for progress
///
/// Backup and restore children share one extractor; the implementations
/// differ only in their kind and message vocabulary.
pub(crate) trait VolumeCopy {
    /// Resource kind in progress messages
    const KIND: &'static str;
    /// Past-tense verb ("backed up" / "restored")
    const VERB: &'static str;
    /// Noun for the waiting message ("backup" / "restore")
    const NOUN: &'static str;

    /// Child name
    fn name(&self) -> &str;
    /// Child namespace
    fn namespace(&self) -> &str;
    /// Copy status, if reported yet
    fn status(&self) -> Option<&VolumeCopyStatus>;
}

impl VolumeCopy for PodVolumeBackup {
    const KIND: &'static str = "PodVolumeBackup";
    const VERB: &'static str = "backed up";
    const NOUN: &'static str = "backup";

    fn name(&self) -> &str {
        &self.metadata.name
    }
    fn namespace(&self) -> &str {
        &self.metadata.namespace
    }
    fn status(&self) -> Option<&VolumeCopyStatus> {
        self.status.as_ref()
    }
}

impl VolumeCopy for PodVolumeRestore {
    const KIND: &'static str = "PodVolumeRestore";
    const VERB: &'static str = "restored";
    const NOUN: &'static str = "restore";

    fn name(&self) -> &str {
        &self.metadata.name
    }
    fn namespace(&self) -> &str {
        &self.metadata.namespace
    }
    fn status(&self) -> Option<&VolumeCopyStatus> {
        self.status.as_ref()
    }
}

pub(crate) fn base_raw(kind: &str, name: &str, namespace: &str) -> BTreeMap<String, String> {
    let mut raw = BTreeMap::new();
    raw.insert("Kind".to_string(), kind.to_string());
    raw.insert("Name".to_string(), name.to_string());
    raw.insert("Namespace".to_string(), namespace.to_string());
    raw
}

fn copy_entry<T: VolumeCopy>(copy: &T, message: String) -> ProgressEntry {
    let status = copy.status();
    let mut raw = base_raw(T::KIND, copy.name(), copy.namespace());
    if let Some(progress) = status.and_then(|s| s.progress.as_ref()) {
        raw.insert("TotalBytes".to_string(), bytes_to_si(progress.total_bytes));
        raw.insert("BytesDone".to_string(), bytes_to_si(progress.bytes_done));
    }
    ProgressEntry {
        message,
        created_at: status.and_then(|s| s.start_timestamp),
        last_updated: status
            .and_then(|s| s.completion_timestamp)
            .or_else(|| Some(Utc::now())),
        raw,
    }
}

fn elapsed_since(start: Option<DateTime<Utc>>) -> Duration {
    start.map(|t| Utc::now() - t).unwrap_or_else(Duration::zero)
}

fn copy_duration(status: Option<&VolumeCopyStatus>) -> Duration {
    match status {
        Some(VolumeCopyStatus {
            start_timestamp: Some(start),
            completion_timestamp: Some(end),
            ..
        }) => *end - *start,
        _ => Duration::zero(),
    }
}

/// Progress entries for a set of pod-volume children, ordered by
/// `namespace + "/" + name`
pub(crate) fn volume_copy_progress<T: VolumeCopy>(copies: &[T]) -> Vec<ProgressEntry> {
    let mut by_key: BTreeMap<String, ProgressEntry> = BTreeMap::new();
    for copy in copies {
        let key = format!("{}/{}", copy.namespace(), copy.name());
        let status = copy.status();
        let phase = status.map(|s| s.phase).unwrap_or_default();
        let progress = status.and_then(|s| s.progress.as_ref());
        let message = match phase {
            VolumeCopyPhase::InProgress => format!(
                "{} {}: {} out of {} {} ({})",
                T::KIND,
                key,
                bytes_to_si(progress.map(|p| p.bytes_done).unwrap_or_default()),
                bytes_to_si(progress.map(|p| p.total_bytes).unwrap_or_default()),
                T::VERB,
                format_duration(elapsed_since(status.and_then(|s| s.start_timestamp))),
            ),
            VolumeCopyPhase::Completed => format!(
                "{} {}: Completed, {} {} ({})",
                T::KIND,
                key,
                bytes_to_si(progress.map(|p| p.total_bytes).unwrap_or_default()),
                T::VERB,
                format_duration(copy_duration(status)),
            ),
            VolumeCopyPhase::Failed => format!(
                "{} {}: Failed ({})",
                T::KIND,
                key,
                format_duration(copy_duration(status)),
            ),
            _ => format!(
                "{} {}: Waiting for ongoing volume {}(s) to complete",
                T::KIND,
                key,
                T::NOUN,
            ),
        };
        by_key.insert(key, copy_entry(copy, message));
    }
    by_key.into_values().collect()
}

/// Extract completion and progress from a backup and its children
pub(crate) fn backup_progress(backup: &Backup, copies: &[PodVolumeBackup]) -> ProgressReport {
    let mut report = ProgressReport::default();
    let namespace = &backup.metadata.namespace;
    let name = &backup.metadata.name;
    let status = backup.status.clone().unwrap_or_default();

    match backup.phase() {
        BackupPhase::New => {
            report.entries.push(ProgressEntry {
                message: format!("Backup {namespace}/{name}: Not started yet"),
                created_at: status.start_timestamp,
                last_updated: Some(Utc::now()),
                raw: base_raw("Backup", name, namespace),
            });
        }
        BackupPhase::InProgress => {
            let progress = status.progress.unwrap_or_default();
            let mut raw = base_raw("Backup", name, namespace);
            raw.insert(
                "ItemsBackedUp".to_string(),
                progress.items_backed_up.to_string(),
            );
            raw.insert("TotalItems".to_string(), progress.total_items.to_string());
            report.entries.push(ProgressEntry {
                message: format!(
                    "Backup {namespace}/{name}: {} out of estimated total of {} objects backed up",
                    progress.items_backed_up, progress.total_items,
                ),
                created_at: status.start_timestamp,
                last_updated: Some(Utc::now()),
                raw,
            });
            report.entries.extend(volume_copy_progress(copies));
        }
        BackupPhase::Completed => {
            report.completed = true;
            let progress = status.progress.unwrap_or_default();
            let mut raw = base_raw("Backup", name, namespace);
            raw.insert(
                "ItemsBackedUp".to_string(),
                progress.items_backed_up.to_string(),
            );
            raw.insert("TotalItems".to_string(), progress.total_items.to_string());
            report.entries.push(ProgressEntry {
                message: format!("Backup {namespace}/{name}: Completed"),
                created_at: status.start_timestamp,
                last_updated: status.completion_timestamp,
                raw,
            });
            report.entries.extend(volume_copy_progress(copies));
        }
        BackupPhase::Failed => {
            report.completed = true;
            report
                .reasons
                .push(format!("Backup: {namespace}/{name} failed."));
        }
        BackupPhase::PartiallyFailed => {
            report.completed = true;
            report
                .reasons
                .push(format!("Backup: {namespace}/{name} partially failed."));
            for entry in volume_copy_progress(copies) {
                report.reasons.push(entry.message);
            }
        }
        BackupPhase::FailedValidation => {
            report.completed = true;
            report.reasons = status.validation_errors;
            report
                .reasons
                .push(format!("Backup: {namespace}/{name} validation failed."));
        }
        BackupPhase::Unknown => {}
    }
    report
}

/// Extract completion and progress from a restore and its children
pub(crate) fn restore_progress(restore: &Restore, copies: &[PodVolumeRestore]) -> ProgressReport {
    let mut report = ProgressReport::default();
    let namespace = &restore.metadata.namespace;
    let name = &restore.metadata.name;
    let status = restore.status.clone().unwrap_or_default();
    let phase = restore.phase();

    match phase {
        RestorePhase::New => {
            // A New restore intentionally carries no timestamps.
            report.entries.push(ProgressEntry {
                message: format!("Restore {namespace}/{name}: Not started yet"),
                created_at: None,
                last_updated: None,
                raw: base_raw("Restore", name, namespace),
            });
        }
        RestorePhase::InProgress => {
            let mut raw = base_raw("Restore", name, namespace);
            raw.insert("Phase".to_string(), phase.to_string());
            report.entries.push(ProgressEntry {
                message: format!("Restore {namespace}/{name}: {phase}"),
                created_at: None,
                last_updated: Some(Utc::now()),
                raw,
            });
            report.entries.extend(volume_copy_progress(copies));
        }
        RestorePhase::Completed => {
            report.completed = true;
            let mut raw = base_raw("Restore", name, namespace);
            raw.insert("Phase".to_string(), phase.to_string());
            report.entries.push(ProgressEntry {
                message: format!("Restore {namespace}/{name}: {phase}"),
                created_at: None,
                last_updated: Some(Utc::now()),
                raw,
            });
            report.entries.extend(volume_copy_progress(copies));
        }
        RestorePhase::Failed => {
            report.completed = true;
            report
                .reasons
                .push(format!("Restore: {namespace}/{name} failed."));
        }
        RestorePhase::PartiallyFailed => {
            report.completed = true;
            report
                .reasons
                .push(format!("Restore: {namespace}/{name} partially failed."));
            for entry in volume_copy_progress(copies) {
                report.reasons.push(entry.message);
            }
        }
        RestorePhase::FailedValidation => {
            report.completed = true;
            report.reasons = status.validation_errors;
            report
                .reasons
                .push(format!("Restore: {namespace}/{name} validation failed."));
        }
        RestorePhase::Unknown => {}
    }
    report
}

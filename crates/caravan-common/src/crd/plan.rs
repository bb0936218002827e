//! CaravanPlan Custom Resource Definition
//!
//! A plan is the declarative description of one migration: the two clusters,
//! the namespace set (with optional renames), resources to leave behind, and
//! per-PV handling selections. Plans are read-only to the task engine.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::ObjectRef;

/// Handling selection for one persistent volume
///
/// All attributes default to their zero value; a PV absent from the plan's
/// list behaves as if listed with an empty selection.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PvSelection {
    /// Persistent volume name
    pub name: String,
    /// Migration action (e.g. copy, move, skip)
    #[serde(default)]
    pub action: String,
    /// Destination storage class
    #[serde(default)]
    pub storage_class: String,
    /// Destination access mode
    #[serde(default)]
    pub access_mode: String,
    /// Volume copy method (e.g. filesystem, snapshot)
    #[serde(default)]
    pub copy_method: String,
    /// Verify file-system copies after restore
    #[serde(default)]
    pub verify: bool,
}

/// Status of a CaravanPlan
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CaravanPlanStatus {
    /// Resource identifiers resolved during plan validation
    ///
    /// Copied verbatim into restore excludes; the identifiers are defined by
    /// the backup collaborator and not interpreted here.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resource_list: Vec<String>,
}

/// Specification for a CaravanPlan
///
/// Namespace entries are either `"src"` (keep the name) or `"src:dest"`
/// (rename on restore). An empty destination, or a destination equal to the
/// source, also keeps the name.
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "caravan.dev",
    version = "v1alpha1",
    kind = "CaravanPlan",
    plural = "caravanplans",
    shortname = "cvp",
    namespaced,
    status = "CaravanPlanStatus",
    printcolumn = r#"{"name":"Source","type":"string","jsonPath":".spec.srcClusterRef.name"}"#,
    printcolumn = r#"{"name":"Destination","type":"string","jsonPath":".spec.destClusterRef.name"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct CaravanPlanSpec {
    /// Source cluster descriptor reference
    pub src_cluster_ref: ObjectRef,
    /// Destination cluster descriptor reference
    pub dest_cluster_ref: ObjectRef,
    /// Namespaces to migrate, as `"src"` or `"src:dest"` entries
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub namespaces: Vec<String>,
    /// Resource identifiers to leave out of backups
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excluded_resources: Vec<String>,
    /// Per-PV handling selections
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub persistent_volumes: Vec<PvSelection>,
}

impl CaravanPlan {
    /// Namespaces as they exist on the source cluster
    pub fn source_namespaces(&self) -> Vec<String> {
        self.spec
            .namespaces
            .iter()
            .map(|entry| entry.split(':').next().unwrap_or(entry).to_string())
            .collect()
    }

    /// Namespaces as they will exist on the destination cluster
    pub fn destination_namespaces(&self) -> Vec<String> {
        self.spec
            .namespaces
            .iter()
            .map(|entry| {
                let mut parts = entry.splitn(2, ':');
                let src = parts.next().unwrap_or(entry);
                match parts.next() {
                    Some(dest) if !dest.is_empty() => dest.to_string(),
                    _ => src.to_string(),
                }
            })
            .collect()
    }

    /// Source→destination renames, omitting identity and empty destinations
    ///
    /// An empty map means "identity on both sides"; callers leave the
    /// mapping field off the restore entirely in that case.
    pub fn namespace_mapping(&self) -> BTreeMap<String, String> {
        let mut mapping = BTreeMap::new();
        for entry in &self.spec.namespaces {
            let parts: Vec<&str> = entry.split(':').collect();
            if parts.len() == 2 {
                if parts[0] == parts[1] {
                    continue;
                }
                if !parts[1].is_empty() {
                    mapping.insert(parts[0].to_string(), parts[1].to_string());
                }
            }
        }
        mapping
    }

    fn pv(&self, name: &str) -> Option<&PvSelection> {
        self.spec.persistent_volumes.iter().find(|pv| pv.name == name)
    }

    /// Migration action for a PV; empty when the PV is not listed
    pub fn pv_action(&self, name: &str) -> String {
        self.pv(name).map(|pv| pv.action.clone()).unwrap_or_default()
    }

    /// Destination storage class for a PV; empty when the PV is not listed
    pub fn pv_storage_class(&self, name: &str) -> String {
        self.pv(name)
            .map(|pv| pv.storage_class.clone())
            .unwrap_or_default()
    }

    /// Destination access mode for a PV; empty when the PV is not listed
    pub fn pv_access_mode(&self, name: &str) -> String {
        self.pv(name)
            .map(|pv| pv.access_mode.clone())
            .unwrap_or_default()
    }

    /// Copy method for a PV; empty when the PV is not listed
    pub fn pv_copy_method(&self, name: &str) -> String {
        self.pv(name)
            .map(|pv| pv.copy_method.clone())
            .unwrap_or_default()
    }

    /// Verify flag for a PV; false when the PV is not listed
    pub fn pv_verify(&self, name: &str) -> bool {
        self.pv(name).map(|pv| pv.verify).unwrap_or_default()
    }

    /// Resource identifiers resolved on the plan status, verbatim
    pub fn resource_list(&self) -> Vec<String> {
        self.status
            .as_ref()
            .map(|s| s.resource_list.clone())
            .unwrap_or_default()
    }
}

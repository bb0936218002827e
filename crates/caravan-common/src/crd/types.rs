//! Supporting types shared by the Caravan CRDs

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Reference to a namespaced resource
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectRef {
    /// Resource name
    pub name: String,
    /// Resource namespace
    pub namespace: String,
}

impl ObjectRef {
    /// Create a new reference
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
        }
    }
}

impl std::fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Status of a condition (True, False, Unknown)
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    /// The condition holds
    True,
    /// The condition does not hold
    False,
    /// The condition cannot be determined
    #[default]
    Unknown,
}

/// Severity category of a condition
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionCategory {
    /// The owner cannot proceed and requires intervention
    Critical,
    /// The current step failed
    #[default]
    Error,
    /// Something degraded but the migration continues
    Warn,
    /// A prerequisite is not yet satisfied
    Required,
}

/// A single status condition on an owner resource
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Condition type (e.g. BackupFailed, ResticVerifyErrors)
    #[serde(rename = "type")]
    pub type_: String,
    /// Whether the condition holds
    pub status: ConditionStatus,
    /// Severity category
    pub category: ConditionCategory,
    /// Human-readable message
    pub message: String,
    /// Durable conditions survive re-reconciliation of the owner
    #[serde(default)]
    pub durable: bool,
    /// Last time the condition transitioned
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    /// Create a condition that holds, with the current timestamp
    pub fn new(
        type_: impl Into<String>,
        category: ConditionCategory,
        message: impl Into<String>,
    ) -> Self {
        Self {
            type_: type_.into(),
            status: ConditionStatus::True,
            category,
            message: message.into(),
            durable: false,
            last_transition_time: Utc::now(),
        }
    }

    /// Mark the condition durable
    pub fn durable(mut self) -> Self {
        self.durable = true;
        self
    }
}

/// An owner's condition set
///
/// `set` replaces any existing condition of the same type, so repeated
/// advancements do not accumulate duplicates.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(transparent)]
pub struct Conditions(pub Vec<Condition>);

impl Conditions {
    /// Set a condition, replacing any existing condition of the same type
    pub fn set(&mut self, condition: Condition) {
        if let Some(existing) = self.0.iter_mut().find(|c| c.type_ == condition.type_) {
            *existing = condition;
        } else {
            self.0.push(condition);
        }
    }

    /// Find a condition by type
    pub fn find(&self, type_: &str) -> Option<&Condition> {
        self.0.iter().find(|c| c.type_ == type_)
    }

    /// True when no conditions are set
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when a condition of the given type holds
    pub fn has(&self, type_: &str) -> bool {
        self.find(type_)
            .map(|c| c.status == ConditionStatus::True)
            .unwrap_or(false)
    }
}

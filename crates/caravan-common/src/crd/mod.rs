//! Caravan Custom Resource Definitions
//!
//! All resources live in the `caravan.dev/v1alpha1` group. The plan describes
//! what to migrate, clusters describe where, tokens carry remote identity,
//! and migrations/stages are the owner resources the task engine works for.

mod cluster;
mod migration;
mod plan;
mod token;
mod types;

pub use cluster::{CaravanCluster, CaravanClusterSpec};
pub use migration::{
    CaravanMigration, CaravanMigrationSpec, CaravanMigrationStatus, CaravanStage,
    CaravanStageSpec, CaravanStageStatus, MigrationOwner, OwnerKind,
};
pub use plan::{CaravanPlan, CaravanPlanSpec, CaravanPlanStatus, PvSelection};
pub use token::{
    CaravanToken, CaravanTokenSpec, CaravanTokenStatus, DEFAULT_CONTROLLER_NAME,
    DEFAULT_CONTROLLER_NAMESPACE,
};
pub use types::{Condition, ConditionCategory, ConditionStatus, Conditions, ObjectRef};

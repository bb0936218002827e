//! Caravan migration task engine
//!
//! A resumable, idempotent workflow driver for staged cross-cluster
//! migrations of stateful workloads. The engine reconciles Velero backup and
//! restore primitives on two remote clusters, extracts ordered progress from
//! their asynchronous phases, and enforces authorization and reference
//! integrity across a token-based multi-cluster client model.
//!
//! The engine holds no durable state of its own: the task phase plus the
//! labeled children on the remote clusters are the complete state of record,
//! so a task can resume from any point after a process restart.
//!
//! ## Driving a task
//!
//! ```ignore
//! let mut task = Task::new(Box::new(migration), plan, source, destination, support);
//! task.advance().await?;
//! match task.phase {
//!     Phase::Completed => { /* done */ }
//!     phase => { /* requeue and advance again */ }
//! }
//! ```
//!
//! The owning controller calls [`Task::advance`] once per reconciliation;
//! each call performs at most one significant step and returns. Cancellation
//! is dropping the future — no remote state is touched on the way out.

pub mod api;
pub mod auth;
mod backup;
mod ensure;
pub mod progress;
pub mod remote;
mod restore;
pub mod task;
pub mod velero;

pub use api::{AccessRequest, ClusterApi, KubeClusterApi, RemoteResource};
pub use progress::ProgressEntry;
pub use task::{ClusterSide, Phase, SupportServices, Task};

//! Common types for Caravan: CRDs, errors, labels, and formatting utilities
//!
//! Caravan stages cross-cluster migrations of stateful workloads over the
//! Velero backup/restore primitives. This crate carries everything shared
//! between the task engine and an owning controller: the `caravan.dev`
//! custom resources, the error taxonomy, correlation/role label builders,
//! progress formatting, and the configurable resource-set defaults.

#![deny(missing_docs)]

pub mod crd;
pub mod error;
pub mod format;
pub mod kube_utils;
pub mod labels;
pub mod settings;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// API group for all Caravan custom resources
pub const API_GROUP: &str = "caravan.dev";

/// Namespace where the Caravan controller and its support services run
pub const CARAVAN_SYSTEM_NAMESPACE: &str = "caravan-system";

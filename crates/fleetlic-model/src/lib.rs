//! Fleetlic data model
//!
//! Typed, request-scoped copies of what the graph store owns:
//!
//! - `attribute`: equipment attributes, typed values and the old/new
//!   attribute snapshots used by a simulation
//! - `equipment`: equipment types, the type forest (arena + index) and
//!   equipment instance chains
//! - `metric`: the four licensing metric families as a tagged variant
//! - `product`: product and named-user records used to key results
//!
//! Nothing in this crate talks to a store. The engine crate owns the lookups.

pub mod attribute;
pub mod equipment;
pub mod metric;
pub mod product;

pub use attribute::{Attribute, AttributeOverride, AttributeSnapshot, AttributeValue, DataType};
pub use equipment::{EquipmentInstance, EquipmentType, TypeForest, TypeIdx};
pub use metric::{DirectMetric, MetricDefinition, MetricFamily, NupMetric, PooledMetric};
pub use product::{ProductData, UserRecord};

use thiserror::Error;

/// Errors raised while building or validating model values.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ModelError {
    #[error("duplicate equipment type id: {0}")]
    DuplicateTypeId(String),
    #[error("duplicate equipment type name: {0}")]
    DuplicateTypeName(String),
    #[error("equipment type {child} names unknown parent {parent}")]
    UnknownParent { child: String, parent: String },
    #[error("equipment types form a cycle through {0}")]
    Cycle(String),
    #[error("invalid schema for equipment type {equip_type}: {reason}")]
    InvalidSchema { equip_type: String, reason: String },
    #[error("attribute {name} ({id}) declared as {declared} but got a {actual} value")]
    ValueTypeMismatch {
        id: String,
        name: String,
        declared: DataType,
        actual: DataType,
    },
    #[error("attribute {name} ({id}) carries no value")]
    MissingValue { id: String, name: String },
    #[error("attribute {name} ({id}) is not numeric")]
    NotNumeric { id: String, name: String },
    #[error("unsupported metric family: {0}")]
    UnsupportedFamily(String),
}

//! Fleetlic license engine
//!
//! Read-only "what-if" license computation over an equipment graph:
//!
//! ```text
//!  request ──► registry ──► resolver ──► formula (old) ─┐
//!  (metric,     (metric      (type forest  formula (new) ─┼─► simulation rows
//!   overrides)   lookup)      + chain)                    │   (per product)
//!                                       store lookups ────┘
//! ```
//!
//! - `registry`: metric family dispatch and binding of a definition to the
//!   type forest
//! - `resolver`: base-type check and equipment chain resolution
//! - `formula`: direct and pooled license formulas, NUP extension
//! - `simulation`: the controller assembling old/new/delta rows
//! - `store`: the read-only lookup seam implemented by graph stores
//! - `context`: scopes, deadline and cancellation carried by a request

pub mod context;
pub mod formula;
pub mod registry;
pub mod resolver;
pub mod simulation;
pub mod store;

pub use context::{CancellationFlag, RequestContext};
pub use registry::{bind_metric, ComputedMetric, DirectBinding, MetricRegistry, PooledBinding};
pub use resolver::{locate_type, resolve_chain, ResolvedChain};
pub use simulation::{ProductLicenseDelta, SimulationRequest, SimulationResponse, Simulator};
pub use store::{LicenseGraph, PooledLicenses, StoreError};

use fleetlic_model::{MetricFamily, ModelError};
use thiserror::Error;

/// Coarse classification of an [`EngineError`], for transports mapping
/// failures onto status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    NotFound,
    Cancelled,
    Internal,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("metric family {0} is not supported for simulation")]
    MetricFamilyUnsupported(String),
    #[error("equipment type {0} does not exist")]
    EquipmentTypeNotFound(String),
    #[error("metric {metric} can only be simulated at type {base_type}, not {requested}")]
    SimulationNotAllowedAtType {
        metric: String,
        requested: String,
        base_type: String,
    },
    #[error("metric {metric} is not computable: {reason}")]
    InvalidMetricDefinition { metric: String, reason: String },
    #[error("invalid attribute: {0}")]
    InvalidAttribute(#[source] ModelError),
    #[error("invalid equipment type forest: {0}")]
    InvalidTypeForest(#[source] ModelError),
    #[error("metric {name} of family {family} does not exist")]
    MetricNotFound { family: MetricFamily, name: String },
    #[error("{count} metrics of family {family} are named {name}")]
    AmbiguousMetric {
        family: MetricFamily,
        name: String,
        count: usize,
    },
    #[error("equipment {id} of type {equip_type} does not exist")]
    EquipmentInstanceNotFound { id: String, equip_type: String },
    #[error("request cancelled")]
    Cancelled,
    #[error("request deadline exceeded")]
    DeadlineExceeded,
    #[error("lookup {lookup} failed: {source}")]
    Store {
        lookup: &'static str,
        #[source]
        source: StoreError,
    },
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::MetricFamilyUnsupported(_)
            | EngineError::EquipmentTypeNotFound(_)
            | EngineError::SimulationNotAllowedAtType { .. }
            | EngineError::InvalidMetricDefinition { .. }
            | EngineError::InvalidAttribute(_)
            | EngineError::InvalidTypeForest(_) => ErrorKind::InvalidArgument,
            EngineError::MetricNotFound { .. } | EngineError::EquipmentInstanceNotFound { .. } => {
                ErrorKind::NotFound
            }
            EngineError::Cancelled | EngineError::DeadlineExceeded => ErrorKind::Cancelled,
            EngineError::AmbiguousMetric { .. } | EngineError::Store { .. } => ErrorKind::Internal,
        }
    }

    pub(crate) fn store(lookup: &'static str, source: StoreError) -> Self {
        EngineError::Store { lookup, source }
    }

    pub(crate) fn invalid_metric(metric: &str, reason: impl Into<String>) -> Self {
        EngineError::InvalidMetricDefinition {
            metric: metric.to_string(),
            reason: reason.into(),
        }
    }
}

//! Read-only lookups the engine needs from an equipment graph store.
//!
//! Every method is scoped by the request context. A lookup may report
//! [`StoreError::NotFound`] (the anchor node does not exist),
//! [`StoreError::NoData`] (the anchor exists but nothing hangs off it) or a
//! transport failure. The engine decides per call site which of these is
//! fatal.

use crate::context::RequestContext;
use crate::registry::{ComputedMetric, PooledBinding};
use fleetlic_model::{
    AttributeSnapshot, DirectMetric, EquipmentInstance, EquipmentType, NupMetric, PooledMetric,
    ProductData, UserRecord,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("node not found")]
    NotFound,
    #[error("no data")]
    NoData,
    #[error("backend failure: {0}")]
    Backend(String),
    #[error("malformed record: {0}")]
    Decode(String),
}

impl StoreError {
    pub fn is_no_data(&self) -> bool {
        matches!(self, StoreError::NoData)
    }
}

/// Fold [`StoreError::NoData`] into `None`, keeping every other error.
pub fn optional<T>(result: Result<T, StoreError>) -> Result<Option<T>, StoreError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(StoreError::NoData) => Ok(None),
        Err(err) => Err(err),
    }
}

/// Licenses of one aggregation pool: the ceiled total and the unrounded sum
/// of per-instance contributions it was rounded from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PooledLicenses {
    pub licenses: u64,
    pub fractional: f64,
}

pub trait LicenseGraph {
    fn equipment_types(&self, ctx: &RequestContext) -> Result<Vec<EquipmentType>, StoreError>;

    fn list_ops_metrics(&self, ctx: &RequestContext) -> Result<Vec<PooledMetric>, StoreError>;

    fn list_nup_metrics(&self, ctx: &RequestContext) -> Result<Vec<NupMetric>, StoreError>;

    fn list_ips_metrics(&self, ctx: &RequestContext) -> Result<Vec<DirectMetric>, StoreError>;

    fn list_sps_metrics(&self, ctx: &RequestContext) -> Result<Vec<DirectMetric>, StoreError>;

    /// The instance itself followed by up to `depth` ancestors, bottom-up.
    fn parents_hierarchy(
        &self,
        equip_id: &str,
        equip_type: &str,
        depth: u8,
        ctx: &RequestContext,
    ) -> Result<Vec<EquipmentInstance>, StoreError>;

    /// Products installed on equipment reachable within `depth` levels
    /// below the anchor.
    fn products_for_equipment(
        &self,
        equip_id: &str,
        equip_type: &str,
        depth: u8,
        metric: &ComputedMetric,
        ctx: &RequestContext,
    ) -> Result<Vec<ProductData>, StoreError>;

    /// Total licenses currently computed under the pooling top.
    fn computed_licenses(
        &self,
        top_id: &str,
        top_type: &str,
        metric: &PooledBinding,
        ctx: &RequestContext,
    ) -> Result<u64, StoreError>;

    /// Licenses of the pool rooted at the aggregation anchor.
    fn computed_licenses_all(
        &self,
        aggregate_id: &str,
        aggregate_type: &str,
        metric: &PooledBinding,
        ctx: &RequestContext,
    ) -> Result<PooledLicenses, StoreError>;

    /// Distinct named users of `product_tag` under the pooling top.
    #[allow(clippy::too_many_arguments)]
    fn users_for_equipment(
        &self,
        top_id: &str,
        top_type: &str,
        product_tag: &str,
        depth: u8,
        metric: &PooledBinding,
        attributes: &AttributeSnapshot,
        ctx: &RequestContext,
    ) -> Result<Vec<UserRecord>, StoreError>;
}

macro_rules! forward_license_graph {
    ($($wrapper:ty),*) => {$(
        impl<T: LicenseGraph + ?Sized> LicenseGraph for $wrapper {
            fn equipment_types(&self, ctx: &RequestContext) -> Result<Vec<EquipmentType>, StoreError> {
                (**self).equipment_types(ctx)
            }
            fn list_ops_metrics(&self, ctx: &RequestContext) -> Result<Vec<PooledMetric>, StoreError> {
                (**self).list_ops_metrics(ctx)
            }
            fn list_nup_metrics(&self, ctx: &RequestContext) -> Result<Vec<NupMetric>, StoreError> {
                (**self).list_nup_metrics(ctx)
            }
            fn list_ips_metrics(&self, ctx: &RequestContext) -> Result<Vec<DirectMetric>, StoreError> {
                (**self).list_ips_metrics(ctx)
            }
            fn list_sps_metrics(&self, ctx: &RequestContext) -> Result<Vec<DirectMetric>, StoreError> {
                (**self).list_sps_metrics(ctx)
            }
            fn parents_hierarchy(
                &self,
                equip_id: &str,
                equip_type: &str,
                depth: u8,
                ctx: &RequestContext,
            ) -> Result<Vec<EquipmentInstance>, StoreError> {
                (**self).parents_hierarchy(equip_id, equip_type, depth, ctx)
            }
            fn products_for_equipment(
                &self,
                equip_id: &str,
                equip_type: &str,
                depth: u8,
                metric: &ComputedMetric,
                ctx: &RequestContext,
            ) -> Result<Vec<ProductData>, StoreError> {
                (**self).products_for_equipment(equip_id, equip_type, depth, metric, ctx)
            }
            fn computed_licenses(
                &self,
                top_id: &str,
                top_type: &str,
                metric: &PooledBinding,
                ctx: &RequestContext,
            ) -> Result<u64, StoreError> {
                (**self).computed_licenses(top_id, top_type, metric, ctx)
            }
            fn computed_licenses_all(
                &self,
                aggregate_id: &str,
                aggregate_type: &str,
                metric: &PooledBinding,
                ctx: &RequestContext,
            ) -> Result<PooledLicenses, StoreError> {
                (**self).computed_licenses_all(aggregate_id, aggregate_type, metric, ctx)
            }
            fn users_for_equipment(
                &self,
                top_id: &str,
                top_type: &str,
                product_tag: &str,
                depth: u8,
                metric: &PooledBinding,
                attributes: &AttributeSnapshot,
                ctx: &RequestContext,
            ) -> Result<Vec<UserRecord>, StoreError> {
                (**self).users_for_equipment(top_id, top_type, product_tag, depth, metric, attributes, ctx)
            }
        }
    )*};
}

forward_license_graph!(&T, Box<T>, Arc<T>);

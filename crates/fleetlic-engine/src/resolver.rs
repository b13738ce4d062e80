//! Request type checks and equipment chain resolution.

use crate::context::RequestContext;
use crate::registry::{ComputedMetric, PooledBinding};
use crate::store::{LicenseGraph, StoreError};
use crate::EngineError;
use fleetlic_model::{EquipmentInstance, TypeForest, TypeIdx};

/// Locate the requested equipment type by name.
pub fn locate_type(forest: &TypeForest, type_name: &str) -> Result<TypeIdx, EngineError> {
    forest
        .idx_by_name(type_name)
        .ok_or_else(|| EngineError::EquipmentTypeNotFound(type_name.to_string()))
}

/// Simulation is only defined at a metric's base type.
pub fn check_base_type(metric: &ComputedMetric, requested_type: &str) -> Result<(), EngineError> {
    let base = metric.base();
    if base.type_name != requested_type {
        return Err(EngineError::SimulationNotAllowedAtType {
            metric: metric.name().to_string(),
            requested: requested_type.to_string(),
            base_type: base.type_name.clone(),
        });
    }
    Ok(())
}

/// Instances from the simulated equipment up to the pooling top.
///
/// `links[0]` is the equipment itself; `links[i]` sits `i` type levels
/// above it.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedChain {
    links: Vec<EquipmentInstance>,
    aggregate: usize,
    product_depth: u8,
}

impl ResolvedChain {
    pub fn base(&self) -> &EquipmentInstance {
        &self.links[0]
    }

    /// Root of the aggregation pool.
    pub fn aggregate(&self) -> &EquipmentInstance {
        &self.links[self.aggregate]
    }

    /// Pooling top (the end-type instance).
    pub fn top(&self) -> &EquipmentInstance {
        &self.links[self.links.len() - 1]
    }

    pub fn links(&self) -> &[EquipmentInstance] {
        &self.links
    }

    /// Depth below the top at which products and users are searched.
    pub fn product_depth(&self) -> u8 {
        self.product_depth
    }
}

/// Walk from the simulated equipment up to the metric's end type.
///
/// The store is asked for `traversal_depth` ancestors of the instance. The
/// answer must match the type forest level by level, and must reach the
/// end type, or the equipment is treated as missing.
pub fn resolve_chain<G: LicenseGraph + ?Sized>(
    graph: &G,
    ctx: &RequestContext,
    forest: &TypeForest,
    metric: &PooledBinding,
    equip_id: &str,
    equip_type: &str,
) -> Result<ResolvedChain, EngineError> {
    let missing = || EngineError::EquipmentInstanceNotFound {
        id: equip_id.to_string(),
        equip_type: equip_type.to_string(),
    };

    ctx.checkpoint()?;
    let mut links = match graph.parents_hierarchy(equip_id, equip_type, metric.traversal_depth, ctx)
    {
        Ok(links) => links,
        Err(StoreError::NotFound) | Err(StoreError::NoData) => return Err(missing()),
        Err(err) => return Err(EngineError::store("parents_hierarchy", err)),
    };

    let expected: Vec<&str> = forest
        .ancestors(metric.base_idx)
        .take(metric.top_offset + 1)
        .map(|idx| forest.get(idx).type_name.as_str())
        .collect();
    if links.len() < expected.len() {
        tracing::debug!(
            equip_id,
            found = links.len(),
            needed = expected.len(),
            "equipment chain stops below the end type"
        );
        return Err(missing());
    }
    links.truncate(expected.len());

    if links[0].id != equip_id {
        return Err(missing());
    }
    for (link, want) in links.iter().zip(&expected) {
        if link.equip_type != *want {
            return Err(EngineError::store(
                "parents_hierarchy",
                StoreError::Decode(format!(
                    "equipment {} has type {}, expected {want}",
                    link.id, link.equip_type
                )),
            ));
        }
    }

    let product_depth = metric.traversal_depth.saturating_add(1);
    Ok(ResolvedChain {
        links,
        aggregate: metric.aggregate_offset,
        product_depth,
    })
}

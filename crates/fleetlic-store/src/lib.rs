//! Fleetlic in-memory store
//!
//! A [`LicenseGraph`] over a JSON [`FleetSnapshot`]. The snapshot is indexed
//! per scope on load and kept behind a `parking_lot::RwLock`, so one store
//! serves concurrent read-only requests and can be swapped for a fresh
//! snapshot with [`MemoryGraph::reload`].

pub mod snapshot;

pub use snapshot::{EquipmentRecord, FleetSnapshot, ProductRecord, ScopeData};

use fleetlic_engine::formula::{ceil_licenses, processor_contribution};
use fleetlic_engine::{ComputedMetric, LicenseGraph, PooledBinding, PooledLicenses, RequestContext, StoreError};
use fleetlic_model::{
    AttributeSnapshot, DirectMetric, EquipmentInstance, EquipmentType, MetricDefinition,
    ModelError, NupMetric, PooledMetric, ProductData, UserRecord,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use snapshot::ScopeIndex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use thiserror::Error;

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Fleet snapshot to load
    pub snapshot_path: PathBuf,
    /// Reject snapshots whose equipment types break attribute role rules
    pub strict_schema: bool,
    /// Scopes used when a request names none
    pub default_scopes: Vec<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            snapshot_path: PathBuf::from("./fleet.json"),
            strict_schema: true,
            default_scopes: Vec::new(),
        }
    }
}

impl StoreConfig {
    pub fn from_file(path: &Path) -> Result<Self, SnapshotError> {
        let text = std::fs::read_to_string(path).map_err(|source| SnapshotError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&text)?)
    }
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("scope {scope}: invalid equipment types: {source}")]
    Types {
        scope: String,
        #[source]
        source: ModelError,
    },
    #[error("scope {scope}: {source}")]
    Schema {
        scope: String,
        #[source]
        source: ModelError,
    },
    #[error("scope {scope}: equipment {equip_id} has unknown type {equip_type}")]
    UnknownType {
        scope: String,
        equip_id: String,
        equip_type: String,
    },
    #[error("scope {scope}: equipment {equip_id} appears twice")]
    DuplicateEquipment { scope: String, equip_id: String },
}

// ============================================================================
// Store
// ============================================================================

pub struct MemoryGraph {
    config: StoreConfig,
    scopes: RwLock<HashMap<String, ScopeIndex>>,
}

impl MemoryGraph {
    /// Load the snapshot named by `config`.
    pub fn open(config: StoreConfig) -> Result<Self, SnapshotError> {
        let snapshot = read_snapshot(&config.snapshot_path)?;
        Self::from_snapshot(config, snapshot)
    }

    pub fn from_snapshot(config: StoreConfig, snapshot: FleetSnapshot) -> Result<Self, SnapshotError> {
        let scopes = index_scopes(snapshot, config.strict_schema)?;
        tracing::debug!(scopes = scopes.len(), "fleet snapshot indexed");
        Ok(Self {
            config,
            scopes: RwLock::new(scopes),
        })
    }

    /// Replace the served snapshot. On error the previous one stays live.
    pub fn reload(&self, snapshot: FleetSnapshot) -> Result<(), SnapshotError> {
        let scopes = index_scopes(snapshot, self.config.strict_schema)?;
        *self.scopes.write() = scopes;
        Ok(())
    }

    /// Re-read the configured snapshot file.
    pub fn reload_from_disk(&self) -> Result<(), SnapshotError> {
        let snapshot = read_snapshot(&self.config.snapshot_path)?;
        self.reload(snapshot)
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn scope_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.scopes.read().keys().cloned().collect();
        names.sort();
        names
    }

    fn visible<'a>(&'a self, ctx: &'a RequestContext) -> &'a [String] {
        if ctx.scopes().is_empty() {
            &self.config.default_scopes
        } else {
            ctx.scopes()
        }
    }

    /// Run `f` over each visible scope's index, in request order.
    fn each_scope<T>(
        &self,
        ctx: &RequestContext,
        mut f: impl FnMut(&ScopeIndex) -> Option<T>,
    ) -> Vec<T> {
        let scopes = self.scopes.read();
        self.visible(ctx)
            .iter()
            .filter_map(|name| scopes.get(name))
            .filter_map(&mut f)
            .collect()
    }

    /// Apply `f` to the first visible scope holding `equip_id` of `equip_type`.
    fn with_anchor<T>(
        &self,
        ctx: &RequestContext,
        equip_id: &str,
        equip_type: &str,
        f: impl FnOnce(&ScopeIndex) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let scopes = self.scopes.read();
        let index = self
            .visible(ctx)
            .iter()
            .filter_map(|name| scopes.get(name))
            .find(|index| index.find(equip_id, equip_type).is_some())
            .ok_or(StoreError::NotFound)?;
        f(index)
    }

    fn metrics(&self, ctx: &RequestContext) -> Vec<MetricDefinition> {
        self.each_scope(ctx, |index| Some(index.data.metrics.clone()))
            .into_iter()
            .flatten()
            .collect()
    }
}

fn read_snapshot(path: &Path) -> Result<FleetSnapshot, SnapshotError> {
    let text = std::fs::read_to_string(path).map_err(|source| SnapshotError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    FleetSnapshot::from_json(&text).map_err(|err| {
        tracing::warn!(path = %path.display(), error = %err, "failed to parse fleet snapshot");
        err
    })
}

fn index_scopes(
    snapshot: FleetSnapshot,
    strict_schema: bool,
) -> Result<HashMap<String, ScopeIndex>, SnapshotError> {
    snapshot
        .scopes
        .into_iter()
        .map(|(name, data)| {
            let index = ScopeIndex::build(&name, data, strict_schema)?;
            Ok((name, index))
        })
        .collect()
}

/// Unrounded contribution of every base instance under `anchor`, keyed by
/// the aggregation pool it belongs to.
fn pool_sums(
    index: &ScopeIndex,
    anchor: &str,
    metric: &PooledBinding,
) -> Result<BTreeMap<String, f64>, StoreError> {
    let mut pools = BTreeMap::new();
    for record in index.subtree(anchor, None) {
        if record.equip_type != metric.base.type_name {
            continue;
        }
        let pool = index
            .ancestor(&record.id, metric.aggregate_offset)
            .ok_or_else(|| {
                StoreError::Decode(format!(
                    "equipment {} has no {} ancestor",
                    record.id, metric.aggregate.type_name
                ))
            })?;
        let contribution = processor_contribution(metric, &record.values())
            .map_err(|err| StoreError::Decode(format!("equipment {}: {err}", record.id)))?;
        *pools.entry(pool.id.clone()).or_insert(0.0) += contribution;
    }
    Ok(pools)
}

fn products_under<'a>(
    index: &'a ScopeIndex,
    anchor: &str,
    depth: u8,
) -> impl Iterator<Item = &'a ProductRecord> {
    let reachable: HashSet<String> = index
        .subtree(anchor, Some(depth))
        .into_iter()
        .map(|r| r.id.clone())
        .collect();
    index
        .data
        .products
        .iter()
        .filter(move |p| p.equipment.iter().any(|e| reachable.contains(e)))
}

impl LicenseGraph for MemoryGraph {
    fn equipment_types(&self, ctx: &RequestContext) -> Result<Vec<EquipmentType>, StoreError> {
        let mut seen = HashSet::new();
        Ok(self
            .each_scope(ctx, |index| Some(index.data.equipment_types.clone()))
            .into_iter()
            .flatten()
            .filter(|ty| seen.insert(ty.id.clone()))
            .collect())
    }

    fn list_ops_metrics(&self, ctx: &RequestContext) -> Result<Vec<PooledMetric>, StoreError> {
        Ok(self
            .metrics(ctx)
            .into_iter()
            .filter_map(|m| match m {
                MetricDefinition::Ops(m) => Some(m),
                _ => None,
            })
            .collect())
    }

    fn list_nup_metrics(&self, ctx: &RequestContext) -> Result<Vec<NupMetric>, StoreError> {
        Ok(self
            .metrics(ctx)
            .into_iter()
            .filter_map(|m| match m {
                MetricDefinition::Nup(m) => Some(m),
                _ => None,
            })
            .collect())
    }

    fn list_ips_metrics(&self, ctx: &RequestContext) -> Result<Vec<DirectMetric>, StoreError> {
        Ok(self
            .metrics(ctx)
            .into_iter()
            .filter_map(|m| match m {
                MetricDefinition::Ips(m) => Some(m),
                _ => None,
            })
            .collect())
    }

    fn list_sps_metrics(&self, ctx: &RequestContext) -> Result<Vec<DirectMetric>, StoreError> {
        Ok(self
            .metrics(ctx)
            .into_iter()
            .filter_map(|m| match m {
                MetricDefinition::Sps(m) => Some(m),
                _ => None,
            })
            .collect())
    }

    fn parents_hierarchy(
        &self,
        equip_id: &str,
        equip_type: &str,
        depth: u8,
        ctx: &RequestContext,
    ) -> Result<Vec<EquipmentInstance>, StoreError> {
        self.with_anchor(ctx, equip_id, equip_type, |index| {
            let mut chain = Vec::new();
            let mut current = index.get(equip_id);
            while let Some(record) = current {
                chain.push(record.instance());
                if chain.len() > usize::from(depth) {
                    break;
                }
                current = record.parent_id.as_deref().and_then(|p| index.get(p));
            }
            Ok(chain)
        })
    }

    fn products_for_equipment(
        &self,
        equip_id: &str,
        equip_type: &str,
        depth: u8,
        metric: &ComputedMetric,
        ctx: &RequestContext,
    ) -> Result<Vec<ProductData>, StoreError> {
        self.with_anchor(ctx, equip_id, equip_type, |index| {
            let products: Vec<ProductData> = products_under(index, equip_id, depth)
                .filter(|p| p.licensed_under(metric.name()))
                .map(ProductRecord::data)
                .collect();
            if products.is_empty() {
                return Err(StoreError::NoData);
            }
            Ok(products)
        })
    }

    fn computed_licenses(
        &self,
        top_id: &str,
        top_type: &str,
        metric: &PooledBinding,
        ctx: &RequestContext,
    ) -> Result<u64, StoreError> {
        self.with_anchor(ctx, top_id, top_type, |index| {
            let pools = pool_sums(index, top_id, metric)?;
            Ok(pools.values().map(|&sum| ceil_licenses(sum)).sum())
        })
    }

    fn computed_licenses_all(
        &self,
        aggregate_id: &str,
        aggregate_type: &str,
        metric: &PooledBinding,
        ctx: &RequestContext,
    ) -> Result<PooledLicenses, StoreError> {
        self.with_anchor(ctx, aggregate_id, aggregate_type, |index| {
            let fractional: f64 = pool_sums(index, aggregate_id, metric)?.values().sum();
            Ok(PooledLicenses {
                licenses: ceil_licenses(fractional),
                fractional,
            })
        })
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
        self.with_anchor(ctx, top_id, top_type, |index| {
            let reachable: HashSet<&str> = index
                .subtree(top_id, Some(depth))
                .into_iter()
                .map(|r| r.id.as_str())
                .collect();
            let mut seen = HashSet::new();
            let mut users = Vec::new();
            let products = index
                .data
                .products
                .iter()
                .filter(|p| p.tag == product_tag && p.licensed_under(&metric.name));
            for product in products {
                let mut installed = false;
                for equip_id in product.equipment.iter().filter(|e| reachable.contains(e.as_str())) {
                    if installation_active(index, equip_id, metric, attributes)? {
                        installed = true;
                        break;
                    }
                }
                if installed {
                    users.extend(
                        product
                            .users
                            .iter()
                            .filter(|u| seen.insert(u.user_id.clone()))
                            .cloned(),
                    );
                }
            }
            if users.is_empty() {
                return Err(StoreError::NoData);
            }
            Ok(users)
        })
    }
}

/// Values of `record` as seen by a simulation: `attributes` replace the
/// stored ones when they carry the record's identifier value.
fn effective_values(
    record: &EquipmentRecord,
    metric: &PooledBinding,
    attributes: &AttributeSnapshot,
) -> AttributeSnapshot {
    let named = metric
        .base
        .attributes
        .iter()
        .find(|a| a.is_identifier)
        .and_then(|id_attr| {
            Some((attributes.get(&id_attr.id)?, record.attributes.get(&id_attr.id)?))
        })
        .is_some_and(|(requested, stored)| requested == stored);
    if !named {
        return record.values();
    }
    let mut values = record.attributes.clone();
    for (id, entry) in attributes.iter() {
        values.insert(id.to_string(), entry.value.clone());
    }
    AttributeSnapshot::from_values(values)
}

/// An installation counts while the base instance it runs on (itself or
/// its nearest base ancestor) still contributes processors.
fn installation_active(
    index: &ScopeIndex,
    equip_id: &str,
    metric: &PooledBinding,
    attributes: &AttributeSnapshot,
) -> Result<bool, StoreError> {
    let mut current = index.get(equip_id);
    while let Some(record) = current {
        if record.equip_type == metric.base.type_name {
            let values = effective_values(record, metric, attributes);
            let contribution = processor_contribution(metric, &values)
                .map_err(|err| StoreError::Decode(format!("equipment {}: {err}", record.id)))?;
            return Ok(contribution > 0.0);
        }
        current = record.parent_id.as_deref().and_then(|p| index.get(p));
    }
    Ok(true)
}

#[cfg(test)]
mod tests;

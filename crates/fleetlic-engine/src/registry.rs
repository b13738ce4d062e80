//! Metric lookup and binding.
//!
//! A [`MetricDefinition`] only names attributes and types by id. Binding it
//! against the request's [`TypeForest`] resolves those ids, checks the
//! anchor ordering and yields a [`ComputedMetric`] the formulas and the
//! store can work with directly.

use crate::context::RequestContext;
use crate::store::LicenseGraph;
use crate::EngineError;
use fleetlic_model::{
    Attribute, DataType, DirectMetric, EquipmentType, MetricDefinition, MetricFamily,
    PooledMetric, TypeForest, TypeIdx,
};
use serde::Serialize;

/// Parse a family tag, reporting unknown families as unsupported.
pub fn parse_family(tag: &str) -> Result<MetricFamily, EngineError> {
    tag.parse()
        .map_err(|_| EngineError::MetricFamilyUnsupported(tag.to_string()))
}

/// Metric lookups against one store.
pub struct MetricRegistry<'g, G: ?Sized> {
    graph: &'g G,
}

impl<'g, G: LicenseGraph + ?Sized> MetricRegistry<'g, G> {
    pub fn new(graph: &'g G) -> Self {
        Self { graph }
    }

    /// Parse `family_tag` and find the metric named `name` within it.
    pub fn resolve(
        &self,
        ctx: &RequestContext,
        family_tag: &str,
        name: &str,
    ) -> Result<MetricDefinition, EngineError> {
        let family = parse_family(family_tag)?;
        self.lookup(ctx, family, name)
    }

    pub fn lookup(
        &self,
        ctx: &RequestContext,
        family: MetricFamily,
        name: &str,
    ) -> Result<MetricDefinition, EngineError> {
        ctx.checkpoint()?;
        let all = self.list(ctx, family)?;
        let mut matching = all.into_iter().filter(|m| m.name() == name);
        let first = matching.next().ok_or_else(|| EngineError::MetricNotFound {
            family,
            name: name.to_string(),
        })?;
        let extra = matching.count();
        if extra > 0 {
            return Err(EngineError::AmbiguousMetric {
                family,
                name: name.to_string(),
                count: extra + 1,
            });
        }
        Ok(first)
    }

    /// All metrics of one family, tagged with their family.
    pub fn list(
        &self,
        ctx: &RequestContext,
        family: MetricFamily,
    ) -> Result<Vec<MetricDefinition>, EngineError> {
        let lookup = match family {
            MetricFamily::Ops => "list_ops_metrics",
            MetricFamily::Nup => "list_nup_metrics",
            MetricFamily::Ips => "list_ips_metrics",
            MetricFamily::Sps => "list_sps_metrics",
        };
        let found = match family {
            MetricFamily::Ops => self
                .graph
                .list_ops_metrics(ctx)
                .map(|ms| ms.into_iter().map(MetricDefinition::Ops).collect()),
            MetricFamily::Nup => self
                .graph
                .list_nup_metrics(ctx)
                .map(|ms| ms.into_iter().map(MetricDefinition::Nup).collect()),
            MetricFamily::Ips => self
                .graph
                .list_ips_metrics(ctx)
                .map(|ms| ms.into_iter().map(MetricDefinition::Ips).collect()),
            MetricFamily::Sps => self
                .graph
                .list_sps_metrics(ctx)
                .map(|ms| ms.into_iter().map(MetricDefinition::Sps).collect()),
        };
        found.map_err(|err| EngineError::store(lookup, err))
    }
}

// ============================================================================
// Bound metrics
// ============================================================================

/// A pooled metric with its anchors and attributes resolved.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PooledBinding {
    pub family: MetricFamily,
    pub name: String,
    pub start: EquipmentType,
    pub base: EquipmentType,
    pub aggregate: EquipmentType,
    pub end: EquipmentType,
    pub num_cores_attr: Attribute,
    pub num_cpu_attr: Attribute,
    pub core_factor_attr: Attribute,
    /// NUP users-per-processor threshold; `None` for plain processor metrics.
    pub number_of_users: Option<u32>,
    #[serde(skip)]
    pub(crate) base_idx: TypeIdx,
    /// Parent steps from base to aggregation level.
    pub aggregate_offset: usize,
    /// Parent steps from base to end.
    pub top_offset: usize,
    /// Parent steps from start to end.
    pub traversal_depth: u8,
}

/// A direct metric with its base type and attributes resolved.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DirectBinding {
    pub family: MetricFamily,
    pub name: String,
    pub base: EquipmentType,
    pub num_cores_attr: Attribute,
    pub core_factor_attr: Attribute,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ComputedMetric {
    Pooled(PooledBinding),
    Direct(DirectBinding),
}

impl ComputedMetric {
    pub fn family(&self) -> MetricFamily {
        match self {
            ComputedMetric::Pooled(p) => p.family,
            ComputedMetric::Direct(d) => d.family,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ComputedMetric::Pooled(p) => &p.name,
            ComputedMetric::Direct(d) => &d.name,
        }
    }

    pub fn base(&self) -> &EquipmentType {
        match self {
            ComputedMetric::Pooled(p) => &p.base,
            ComputedMetric::Direct(d) => &d.base,
        }
    }
}

/// Resolve a metric's type and attribute references against `forest`.
pub fn bind_metric(
    forest: &TypeForest,
    metric: &MetricDefinition,
) -> Result<ComputedMetric, EngineError> {
    let bound = match metric {
        MetricDefinition::Ops(m) => bind_pooled(forest, MetricFamily::Ops, m, None),
        MetricDefinition::Nup(m) => {
            bind_pooled(forest, MetricFamily::Nup, &m.pooled, Some(m.number_of_users))
        }
        MetricDefinition::Ips(m) => bind_direct(forest, MetricFamily::Ips, m),
        MetricDefinition::Sps(m) => bind_direct(forest, MetricFamily::Sps, m),
    };
    if let Err(err) = &bound {
        tracing::debug!(metric = %metric.name(), error = %err, "metric binding rejected");
    }
    bound
}

fn bind_pooled(
    forest: &TypeForest,
    family: MetricFamily,
    m: &PooledMetric,
    number_of_users: Option<u32>,
) -> Result<ComputedMetric, EngineError> {
    let anchor = |role: &str, id: &str| {
        forest
            .idx_by_id(id)
            .ok_or_else(|| EngineError::invalid_metric(&m.name, format!("{role} type {id} does not exist")))
    };
    let start = anchor("start", &m.start_type_id)?;
    let base = anchor("base", &m.base_type_id)?;
    let aggregate = anchor("aggregation", &m.aggregate_level_type_id)?;
    let end = anchor("end", &m.end_type_id)?;

    let step = |from: TypeIdx, to: TypeIdx, what: &str| {
        forest.distance(from, to).ok_or_else(|| {
            EngineError::invalid_metric(
                &m.name,
                format!(
                    "{} is not {what} {}",
                    forest.get(to).type_name,
                    forest.get(from).type_name
                ),
            )
        })
    };
    step(start, base, "an ancestor-or-self of")?;
    let aggregate_offset = step(base, aggregate, "an ancestor-or-self of")?;
    let top_offset = step(base, end, "an ancestor-or-self of")?;
    if top_offset < aggregate_offset {
        return Err(EngineError::invalid_metric(
            &m.name,
            "aggregation level lies above the end type",
        ));
    }
    let traversal = step(start, end, "reachable from")?;
    let traversal_depth = u8::try_from(traversal)
        .map_err(|_| EngineError::invalid_metric(&m.name, "type chain is too deep"))?;

    let base_ty = forest.get(base);
    Ok(ComputedMetric::Pooled(PooledBinding {
        family,
        name: m.name.clone(),
        start: forest.get(start).clone(),
        base: base_ty.clone(),
        aggregate: forest.get(aggregate).clone(),
        end: forest.get(end).clone(),
        num_cores_attr: numeric_attribute(&m.name, base_ty, &m.num_cores_attr_id)?,
        num_cpu_attr: numeric_attribute(&m.name, base_ty, &m.num_cpu_attr_id)?,
        core_factor_attr: numeric_attribute(&m.name, base_ty, &m.core_factor_attr_id)?,
        number_of_users,
        base_idx: base,
        aggregate_offset,
        top_offset,
        traversal_depth,
    }))
}

fn bind_direct(
    forest: &TypeForest,
    family: MetricFamily,
    m: &DirectMetric,
) -> Result<ComputedMetric, EngineError> {
    let base = forest.by_id(&m.base_type_id).ok_or_else(|| {
        EngineError::invalid_metric(&m.name, format!("base type {} does not exist", m.base_type_id))
    })?;
    Ok(ComputedMetric::Direct(DirectBinding {
        family,
        name: m.name.clone(),
        base: base.clone(),
        num_cores_attr: numeric_attribute(&m.name, base, &m.num_cores_attr_id)?,
        core_factor_attr: numeric_attribute(&m.name, base, &m.core_factor_attr_id)?,
    }))
}

fn numeric_attribute(
    metric: &str,
    base: &EquipmentType,
    attr_id: &str,
) -> Result<Attribute, EngineError> {
    let attr = base.attribute(attr_id).ok_or_else(|| {
        EngineError::invalid_metric(
            metric,
            format!("attribute {attr_id} is not defined on {}", base.type_name),
        )
    })?;
    if attr.data_type == DataType::String {
        return Err(EngineError::invalid_metric(
            metric,
            format!("attribute {} is not numeric", attr.name),
        ));
    }
    Ok(attr.clone())
}

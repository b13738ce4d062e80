//! Simulation controller: old/new license rows per affected product.

use crate::context::RequestContext;
use crate::formula::{self, signed};
use crate::registry::{bind_metric, parse_family, ComputedMetric, DirectBinding, MetricRegistry, PooledBinding};
use crate::resolver::{check_base_type, locate_type, resolve_chain, ResolvedChain};
use crate::store::{optional, LicenseGraph};
use crate::EngineError;
use fleetlic_model::{
    AttributeOverride, AttributeSnapshot, MetricFamily, ProductData, TypeForest, UserRecord,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationRequest {
    pub equip_type: String,
    pub equip_id: String,
    pub metric_family: String,
    pub metric_name: String,
    #[serde(default)]
    pub attributes: Vec<AttributeOverride>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductLicenseDelta {
    pub metric_name: String,
    pub old_licenses: u64,
    pub new_licenses: u64,
    pub delta: i64,
    pub product: ProductData,
}

impl ProductLicenseDelta {
    fn new(metric_name: &str, product: ProductData, old_licenses: u64, new_licenses: u64) -> Self {
        Self {
            metric_name: metric_name.to_string(),
            old_licenses,
            new_licenses,
            delta: signed(new_licenses) - signed(old_licenses),
            product,
        }
    }
}

/// Rows in the order the store returned the products.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationResponse {
    pub licenses: Vec<ProductLicenseDelta>,
}

impl SimulationResponse {
    pub fn is_empty(&self) -> bool {
        self.licenses.is_empty()
    }

    pub fn total_delta(&self) -> i64 {
        self.licenses.iter().map(|row| row.delta).sum()
    }
}

pub struct Simulator<'g, G: ?Sized> {
    graph: &'g G,
}

impl<'g, G: LicenseGraph + ?Sized> Simulator<'g, G> {
    pub fn new(graph: &'g G) -> Self {
        Self { graph }
    }

    /// Compute per-product licenses before and after applying the request's
    /// attribute overrides to one equipment instance. Nothing is written.
    pub fn simulate(
        &self,
        ctx: &RequestContext,
        request: &SimulationRequest,
    ) -> Result<SimulationResponse, EngineError> {
        let family = parse_family(&request.metric_family)?;
        let (old_attrs, new_attrs) =
            AttributeSnapshot::pair(&request.attributes).map_err(EngineError::InvalidAttribute)?;

        ctx.checkpoint()?;
        let types = self
            .graph
            .equipment_types(ctx)
            .map_err(|err| EngineError::store("equipment_types", err))?;
        let forest = TypeForest::new(types).map_err(EngineError::InvalidTypeForest)?;
        locate_type(&forest, &request.equip_type)?;

        let definition =
            MetricRegistry::new(self.graph).lookup(ctx, family, &request.metric_name)?;
        let metric = bind_metric(&forest, &definition)?;
        check_base_type(&metric, &request.equip_type)?;

        tracing::debug!(
            family = %family.short_name(),
            metric = %metric.name(),
            equip_id = %request.equip_id,
            "simulating"
        );

        let response = match &metric {
            ComputedMetric::Direct(binding) => {
                self.simulate_direct(ctx, request, &metric, binding, &old_attrs, &new_attrs)?
            }
            ComputedMetric::Pooled(binding) => {
                let chain = resolve_chain(
                    self.graph,
                    ctx,
                    &forest,
                    binding,
                    &request.equip_id,
                    &request.equip_type,
                )?;
                self.simulate_pooled(ctx, &metric, binding, &chain, &old_attrs, &new_attrs)?
            }
        };

        tracing::debug!(
            metric = %metric.name(),
            rows = response.licenses.len(),
            delta = response.total_delta(),
            "simulation complete"
        );
        Ok(response)
    }

    fn simulate_direct(
        &self,
        ctx: &RequestContext,
        request: &SimulationRequest,
        metric: &ComputedMetric,
        binding: &DirectBinding,
        old_attrs: &AttributeSnapshot,
        new_attrs: &AttributeSnapshot,
    ) -> Result<SimulationResponse, EngineError> {
        let old = formula::direct_licenses(binding, old_attrs)?;
        let new = formula::direct_licenses(binding, new_attrs)?;

        let Some(products) = self.products(ctx, &request.equip_id, &request.equip_type, 1, metric)?
        else {
            return Ok(SimulationResponse::default());
        };
        let licenses = products
            .into_iter()
            .map(|product| ProductLicenseDelta::new(&binding.name, product, old, new))
            .collect();
        Ok(SimulationResponse { licenses })
    }

    fn simulate_pooled(
        &self,
        ctx: &RequestContext,
        metric: &ComputedMetric,
        binding: &PooledBinding,
        chain: &ResolvedChain,
        old_attrs: &AttributeSnapshot,
        new_attrs: &AttributeSnapshot,
    ) -> Result<SimulationResponse, EngineError> {
        let old_contribution = formula::processor_contribution(binding, old_attrs)?;
        let new_contribution = formula::processor_contribution(binding, new_attrs)?;

        let top = chain.top();
        let Some(products) =
            self.products(ctx, &top.id, &top.equip_type, chain.product_depth(), metric)?
        else {
            return Ok(SimulationResponse::default());
        };

        ctx.checkpoint()?;
        let old_total = self
            .graph
            .computed_licenses(&top.id, &top.equip_type, binding, ctx)
            .map_err(|err| EngineError::store("computed_licenses", err))?;

        ctx.checkpoint()?;
        let aggregate = chain.aggregate();
        let pool = self
            .graph
            .computed_licenses_all(&aggregate.id, &aggregate.equip_type, binding, ctx)
            .map_err(|err| EngineError::store("computed_licenses_all", err))?;

        let pooled = formula::recalculate_pool(old_total, pool, old_contribution, new_contribution);
        tracing::debug!(
            aggregate = %aggregate.id,
            old_pool = pooled.old_pool,
            new_pool = pooled.new_pool,
            "pool re-rounded"
        );

        let Some(threshold) = binding.number_of_users.filter(|_| binding.family == MetricFamily::Nup)
        else {
            let licenses = products
                .into_iter()
                .map(|product| {
                    ProductLicenseDelta::new(&binding.name, product, pooled.old_total, pooled.new_total)
                })
                .collect();
            return Ok(SimulationResponse { licenses });
        };

        let mut licenses = Vec::with_capacity(products.len());
        for product in products {
            let old_users = self.users(ctx, chain, &product, binding, old_attrs)?;
            let new_users = self.users(ctx, chain, &product, binding, new_attrs)?;
            let (old_users, new_users) = match (old_users, new_users) {
                (Some(old_users), Some(new_users)) => (old_users, new_users),
                (None, None) => {
                    tracing::warn!(
                        product = %product.tag,
                        top = %chain.top().id,
                        "no named users, counting processors only"
                    );
                    (Vec::new(), Vec::new())
                }
                (old_users, _) => {
                    tracing::warn!(
                        product = %product.tag,
                        missing = if old_users.is_some() { "new" } else { "old" },
                        "named users on one side only, row omitted"
                    );
                    continue;
                }
            };
            let old = formula::nup_licenses(pooled.old_total, threshold, &old_users);
            let new = formula::nup_licenses(pooled.new_total, threshold, &new_users);
            licenses.push(ProductLicenseDelta::new(&binding.name, product, old, new));
        }
        Ok(SimulationResponse { licenses })
    }

    fn products(
        &self,
        ctx: &RequestContext,
        equip_id: &str,
        equip_type: &str,
        depth: u8,
        metric: &ComputedMetric,
    ) -> Result<Option<Vec<ProductData>>, EngineError> {
        ctx.checkpoint()?;
        let products = optional(
            self.graph
                .products_for_equipment(equip_id, equip_type, depth, metric, ctx),
        )
        .map_err(|err| EngineError::store("products_for_equipment", err))?;
        if products.is_none() {
            tracing::warn!(equip_id, equip_type, depth, "no products under anchor");
        }
        Ok(products)
    }

    fn users(
        &self,
        ctx: &RequestContext,
        chain: &ResolvedChain,
        product: &ProductData,
        binding: &PooledBinding,
        attributes: &AttributeSnapshot,
    ) -> Result<Option<Vec<UserRecord>>, EngineError> {
        ctx.checkpoint()?;
        let top = chain.top();
        optional(self.graph.users_for_equipment(
            &top.id,
            &top.equip_type,
            &product.tag,
            chain.product_depth(),
            binding,
            attributes,
            ctx,
        ))
        .map_err(|err| EngineError::store("users_for_equipment", err))
    }
}

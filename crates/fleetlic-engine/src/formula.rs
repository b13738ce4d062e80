//! License formulas.
//!
//! Direct families license each instance on its own:
//! `licenses = trunc(cores × core_factor)`.
//!
//! Pooled families sum unrounded per-instance contributions
//! `cores × cpu × core_factor` over an aggregation pool and round the pool
//! up once. A simulation swaps one instance's contribution inside its pool
//! and re-rounds that pool only; every other pool keeps its stored total.
//!
//! NUP extends a pooled total with named users: each distinct user counts
//! for `max(processor_licenses × users_per_processor, user_count)`.

use crate::registry::{DirectBinding, PooledBinding};
use crate::store::PooledLicenses;
use crate::EngineError;
use fleetlic_model::{Attribute, AttributeSnapshot, UserRecord};
use std::collections::HashSet;

/// Slack absorbed before rounding up, so that a pool whose fractional sum
/// is reassembled from the same contributions lands on the same integer.
pub const ROUNDING_TOLERANCE: f64 = 1e-9;

/// Round up to whole licenses; negative and non-finite values count as zero.
pub fn ceil_licenses(value: f64) -> u64 {
    if !value.is_finite() || value <= 0.0 {
        return 0;
    }
    (value - ROUNDING_TOLERANCE).ceil().max(0.0) as u64
}

/// Truncate to whole licenses; negative and non-finite values count as zero.
pub fn trunc_licenses(value: f64) -> u64 {
    if !value.is_finite() || value <= 0.0 {
        return 0;
    }
    (value + ROUNDING_TOLERANCE).trunc() as u64
}

pub fn direct_licenses(
    metric: &DirectBinding,
    attributes: &AttributeSnapshot,
) -> Result<u64, EngineError> {
    let cores = attributes
        .numeric(&metric.num_cores_attr)
        .map_err(EngineError::InvalidAttribute)?;
    let factor = attributes
        .numeric(&metric.core_factor_attr)
        .map_err(EngineError::InvalidAttribute)?;
    Ok(trunc_licenses(cores * factor))
}

/// Unrounded contribution of one base instance to its pool.
pub fn processor_contribution(
    metric: &PooledBinding,
    attributes: &AttributeSnapshot,
) -> Result<f64, EngineError> {
    let read = |attr: &Attribute| attributes.numeric(attr).map_err(EngineError::InvalidAttribute);
    let cores = read(&metric.num_cores_attr)?;
    let cpu = read(&metric.num_cpu_attr)?;
    let factor = read(&metric.core_factor_attr)?;
    Ok(cores * cpu * factor)
}

/// Old and new totals after swapping one contribution inside a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolRecalculation {
    pub old_total: u64,
    pub new_total: u64,
    pub old_pool: u64,
    pub new_pool: u64,
}

impl PoolRecalculation {
    pub fn delta(&self) -> i64 {
        signed(self.new_total) - signed(self.old_total)
    }
}

/// Re-round the simulated pool and splice it back into the stored total.
///
/// An unchanged contribution keeps the stored pool as is, even when the
/// store's ceiled pool and its fractional sum disagree.
pub fn recalculate_pool(
    old_total: u64,
    pool: PooledLicenses,
    old_contribution: f64,
    new_contribution: f64,
) -> PoolRecalculation {
    let new_pool = if (new_contribution - old_contribution).abs() <= ROUNDING_TOLERANCE {
        pool.licenses
    } else {
        ceil_licenses(pool.fractional - old_contribution + new_contribution)
    };
    let spliced = i128::from(old_total) - i128::from(pool.licenses) + i128::from(new_pool);
    PoolRecalculation {
        old_total,
        new_total: u64::try_from(spliced.max(0)).unwrap_or(u64::MAX),
        old_pool: pool.licenses,
        new_pool,
    }
}

/// NUP licenses for one product given its processor licenses and users.
///
/// Users are counted once per `user_id`. With no users the processor floor
/// alone applies.
pub fn nup_licenses(processor_licenses: u64, users_per_processor: u32, users: &[UserRecord]) -> u64 {
    let floor = processor_licenses.saturating_mul(u64::from(users_per_processor));
    let mut seen = HashSet::new();
    let mut total = 0u64;
    for user in users {
        if !seen.insert(user.user_id.as_str()) {
            continue;
        }
        let count = u64::try_from(user.user_count).unwrap_or(0);
        total = total.saturating_add(floor.max(count));
    }
    if seen.is_empty() {
        floor
    } else {
        total
    }
}

pub(crate) fn signed(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

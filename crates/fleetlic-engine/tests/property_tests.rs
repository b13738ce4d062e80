//! Property tests for the license formulas.
//!
//! 1. Swapping a contribution for itself never moves a pool
//! 2. Only the simulated pool changes the total
//! 3. Rounding is monotone in the contribution
//! 4. NUP never drops below the processor floor

use approx::assert_relative_eq;
use fleetlic_engine::formula::{
    ceil_licenses, nup_licenses, recalculate_pool, trunc_licenses,
};
use fleetlic_engine::PooledLicenses;
use fleetlic_model::UserRecord;
use proptest::prelude::*;

// ============================================================================
// Strategies
// ============================================================================

/// Per-instance contribution `cores × cpu × factor` with realistic inputs.
fn contribution_strategy() -> impl Strategy<Value = f64> {
    (1u32..=128, 1u32..=8, prop_oneof![Just(0.25), Just(0.5), Just(0.75), Just(1.0), Just(1.5)])
        .prop_map(|(cores, cpu, factor)| f64::from(cores) * f64::from(cpu) * factor)
}

/// A pool made of 1..20 contributions, plus one member to simulate.
fn pool_strategy() -> impl Strategy<Value = (Vec<f64>, usize)> {
    prop::collection::vec(contribution_strategy(), 1..20)
        .prop_flat_map(|members| {
            let len = members.len();
            (Just(members), 0..len)
        })
}

fn users_strategy() -> impl Strategy<Value = Vec<UserRecord>> {
    prop::collection::vec(0i64..500_000, 0..6).prop_map(|counts| {
        counts
            .into_iter()
            .enumerate()
            .map(|(i, n)| UserRecord::new(format!("U{i}"), format!("user-{i}"), n))
            .collect()
    })
}

fn pool_of(members: &[f64]) -> PooledLicenses {
    let fractional: f64 = members.iter().sum();
    PooledLicenses {
        licenses: ceil_licenses(fractional),
        fractional,
    }
}

// ============================================================================
// Pool recalculation
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn unchanged_contribution_keeps_total(
        (members, target) in pool_strategy(),
        other_pools in 0u64..10_000,
    ) {
        let pool = pool_of(&members);
        let total = other_pools + pool.licenses;
        let r = recalculate_pool(total, pool, members[target], members[target]);
        prop_assert_eq!(r.new_total, total);
        prop_assert_eq!(r.delta(), 0);
    }

    #[test]
    fn other_pools_are_untouched(
        (members, target) in pool_strategy(),
        replacement in contribution_strategy(),
        other_pools in 0u64..10_000,
    ) {
        let pool = pool_of(&members);
        let r = recalculate_pool(other_pools + pool.licenses, pool, members[target], replacement);

        let mut swapped = members.clone();
        swapped[target] = replacement;
        let expected_pool = ceil_licenses(swapped.iter().sum());
        prop_assert_eq!(r.new_pool, expected_pool);
        prop_assert_eq!(r.new_total, other_pools + expected_pool);
    }

    #[test]
    fn recalculation_is_deterministic(
        (members, target) in pool_strategy(),
        replacement in contribution_strategy(),
    ) {
        let pool = pool_of(&members);
        let a = recalculate_pool(500, pool, members[target], replacement);
        let b = recalculate_pool(500, pool, members[target], replacement);
        prop_assert_eq!(a, b);
    }

    #[test]
    fn rounding_is_monotone(a in 0.0f64..10_000.0, b in 0.0f64..10_000.0) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(ceil_licenses(lo) <= ceil_licenses(hi));
        prop_assert!(trunc_licenses(lo) <= trunc_licenses(hi));
        prop_assert!(trunc_licenses(hi) <= ceil_licenses(hi));
    }
}

// ============================================================================
// Named users
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn nup_respects_processor_floor(
        processors in 0u64..5_000,
        threshold in 1u32..=200,
        users in users_strategy(),
    ) {
        let floor = processors * u64::from(threshold);
        let total = nup_licenses(processors, threshold, &users);
        let per_user = floor * users.len().max(1) as u64;
        prop_assert!(total >= per_user);
    }

    #[test]
    fn nup_grows_with_processors(
        processors in 0u64..5_000,
        threshold in 1u32..=200,
        users in users_strategy(),
    ) {
        let before = nup_licenses(processors, threshold, &users);
        let after = nup_licenses(processors + 1, threshold, &users);
        prop_assert!(after >= before);
    }
}

#[test]
fn pool_fraction_of_example_pool() {
    let members = [1.0, 24.0, 75.5];
    let pool = pool_of(&members);
    assert_relative_eq!(pool.fractional, 100.5);
    assert_eq!(pool.licenses, 101);
}

use super::*;
use fleetlic_engine::{bind_metric, MetricRegistry};
use fleetlic_model::{MetricFamily, TypeForest};

const FLEET: &str = include_str!("../../../demos/fleet.json");

fn graph() -> MemoryGraph {
    let snapshot = FleetSnapshot::from_json(FLEET).unwrap();
    MemoryGraph::from_snapshot(StoreConfig::default(), snapshot).unwrap()
}

fn ctx() -> RequestContext {
    RequestContext::new(["Scope1"])
}

fn bound(graph: &MemoryGraph, family: MetricFamily, name: &str) -> ComputedMetric {
    let forest = TypeForest::new(graph.equipment_types(&ctx()).unwrap()).unwrap();
    let def = MetricRegistry::new(graph).lookup(&ctx(), family, name).unwrap();
    bind_metric(&forest, &def).unwrap()
}

fn ops(graph: &MemoryGraph) -> PooledBinding {
    match bound(graph, MetricFamily::Ops, "oracle.processor.standard") {
        ComputedMetric::Pooled(p) => p,
        other => panic!("expected pooled metric, got {other:?}"),
    }
}

#[test]
fn lists_metrics_per_family() {
    let g = graph();
    assert_eq!(g.list_ops_metrics(&ctx()).unwrap().len(), 1);
    assert_eq!(g.list_nup_metrics(&ctx()).unwrap()[0].number_of_users, 25);
    assert_eq!(g.list_ips_metrics(&ctx()).unwrap()[0].name, "ibm.pvu.standard");
    assert_eq!(g.list_sps_metrics(&ctx()).unwrap().len(), 1);
}

#[test]
fn unknown_scope_sees_nothing() {
    let g = graph();
    let other = RequestContext::new(["Scope9"]);
    assert!(g.equipment_types(&other).unwrap().is_empty());
    assert!(g.list_ops_metrics(&other).unwrap().is_empty());
    assert_eq!(
        g.parents_hierarchy("srv1", "Server", 4, &other),
        Err(StoreError::NotFound)
    );
}

#[test]
fn default_scopes_apply_to_unscoped_requests() {
    let config = StoreConfig {
        default_scopes: vec!["Scope1".into()],
        ..StoreConfig::default()
    };
    let g = MemoryGraph::from_snapshot(config, FleetSnapshot::from_json(FLEET).unwrap()).unwrap();
    let unscoped = RequestContext::default();
    assert_eq!(g.equipment_types(&unscoped).unwrap().len(), 5);
}

#[test]
fn hierarchy_walks_bottom_up_within_depth() {
    let g = graph();
    let chain = g.parents_hierarchy("srv1", "Server", 4, &ctx()).unwrap();
    let ids: Vec<&str> = chain.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, ["srv1", "cl1", "vc1", "dc1"]);

    let short = g.parents_hierarchy("srv1", "Server", 1, &ctx()).unwrap();
    assert_eq!(short.len(), 2);

    assert_eq!(
        g.parents_hierarchy("srv1", "Cluster", 4, &ctx()),
        Err(StoreError::NotFound)
    );
}

#[test]
fn products_are_filtered_by_metric_and_depth() {
    let g = graph();
    let metric = bound(&g, MetricFamily::Ops, "oracle.processor.standard");
    let tags: Vec<String> = g
        .products_for_equipment("dc1", "Datacenter", 5, &metric, &ctx())
        .unwrap()
        .into_iter()
        .map(|p| p.tag)
        .collect();
    assert_eq!(tags, ["ORA-DB", "ORA-WLS"]);

    // part1 sits four levels below dc1.
    let tags: Vec<String> = g
        .products_for_equipment("dc1", "Datacenter", 3, &metric, &ctx())
        .unwrap()
        .into_iter()
        .map(|p| p.tag)
        .collect();
    assert_eq!(tags, ["ORA-DB"]);

    let ips = bound(&g, MetricFamily::Ips, "ibm.pvu.standard");
    assert_eq!(
        g.products_for_equipment("srv4", "Server", 1, &ips, &ctx()),
        Err(StoreError::NoData)
    );
}

#[test]
fn computed_licenses_round_each_pool() {
    let g = graph();
    let metric = ops(&g);
    // cl1: 4.0 + 1.5 -> 6, cl2: 1.5 + 1.5 -> 3
    assert_eq!(g.computed_licenses("dc1", "Datacenter", &metric, &ctx()), Ok(9));

    let pool = g
        .computed_licenses_all("cl1", "Cluster", &metric, &ctx())
        .unwrap();
    assert_eq!(pool.licenses, 6);
    approx::assert_relative_eq!(pool.fractional, 5.5);
}

#[test]
fn users_are_distinct_and_scoped_to_product() {
    let g = graph();
    let nup = match bound(&g, MetricFamily::Nup, "oracle.nup.standard") {
        ComputedMetric::Pooled(p) => p,
        other => panic!("expected pooled metric, got {other:?}"),
    };
    let empty = AttributeSnapshot::default();
    let users = g
        .users_for_equipment("dc1", "Datacenter", "ORA-DB", 5, &nup, &empty, &ctx())
        .unwrap();
    assert_eq!(users.len(), 2);
    assert_eq!(
        g.users_for_equipment("dc1", "Datacenter", "ORA-WLS", 5, &nup, &empty, &ctx()),
        Err(StoreError::NoData)
    );
}

#[test]
fn users_follow_the_simulated_instance() {
    use fleetlic_model::{AttributeOverride, AttributeValue, DataType};

    // ORA-DB runs on srv1 only; switching its cores off leaves no users.
    let mut snapshot = FleetSnapshot::from_json(FLEET).unwrap();
    if let Some(scope) = snapshot.scopes.get_mut("Scope1") {
        for product in scope.products.iter_mut().filter(|p| p.tag == "ORA-DB") {
            product.equipment = vec!["srv1".into()];
        }
    }
    let g = MemoryGraph::from_snapshot(StoreConfig::default(), snapshot).unwrap();
    let nup = match bound(&g, MetricFamily::Nup, "oracle.nup.standard") {
        ComputedMetric::Pooled(p) => p,
        other => panic!("expected pooled metric, got {other:?}"),
    };
    let overrides = |code: &str| {
        vec![
            AttributeOverride::unchanged("A0", "servercode", DataType::String, AttributeValue::String(code.into())),
            AttributeOverride::simulated("A1", "numofcores", DataType::Int, AttributeValue::Int(0), AttributeValue::Int(4)),
            AttributeOverride::unchanged("A2", "numofcpu", DataType::Int, AttributeValue::Int(2)),
            AttributeOverride::unchanged("A3", "corefactor", DataType::Float, AttributeValue::Float(0.5)),
        ]
    };

    let (old, new) = AttributeSnapshot::pair(&overrides("srv1")).unwrap();
    let users = g
        .users_for_equipment("dc1", "Datacenter", "ORA-DB", 5, &nup, &old, &ctx())
        .unwrap();
    assert_eq!(users.len(), 2);
    assert_eq!(
        g.users_for_equipment("dc1", "Datacenter", "ORA-DB", 5, &nup, &new, &ctx()),
        Err(StoreError::NoData)
    );

    // The same values aimed at another server leave srv1 untouched.
    let (_, elsewhere) = AttributeSnapshot::pair(&overrides("srv3")).unwrap();
    let users = g
        .users_for_equipment("dc1", "Datacenter", "ORA-DB", 5, &nup, &elsewhere, &ctx())
        .unwrap();
    assert_eq!(users.len(), 2);
}

#[test]
fn strict_schema_rejects_type_without_identifier() {
    let mut snapshot = FleetSnapshot::from_json(FLEET).unwrap();
    if let Some(scope) = snapshot.scopes.get_mut("Scope1") {
        scope.equipment_types[4].attributes.clear();
    }
    let err = MemoryGraph::from_snapshot(StoreConfig::default(), snapshot.clone())
        .err()
        .unwrap();
    assert!(matches!(err, SnapshotError::Schema { .. }));

    let lenient = StoreConfig {
        strict_schema: false,
        ..StoreConfig::default()
    };
    assert!(MemoryGraph::from_snapshot(lenient, snapshot).is_ok());
}

#[test]
fn equipment_of_unknown_type_is_rejected() {
    let mut snapshot = FleetSnapshot::from_json(FLEET).unwrap();
    if let Some(scope) = snapshot.scopes.get_mut("Scope1") {
        scope.equipment.push(EquipmentRecord::new("rack1", "Rack"));
    }
    let err = MemoryGraph::from_snapshot(StoreConfig::default(), snapshot)
        .err()
        .unwrap();
    assert!(matches!(err, SnapshotError::UnknownType { .. }));
}

#[test]
fn reload_swaps_snapshot_and_keeps_old_on_error() {
    let g = graph();
    let mut snapshot = FleetSnapshot::from_json(FLEET).unwrap();
    if let Some(scope) = snapshot.scopes.get_mut("Scope1") {
        for record in scope.equipment.iter_mut().filter(|r| r.id == "srv2") {
            record
                .attributes
                .insert("A1".into(), fleetlic_model::AttributeValue::Int(6));
        }
    }
    g.reload(snapshot.clone()).unwrap();
    // cl1: 4.0 + 4.5 -> 9, cl2 -> 3
    assert_eq!(g.computed_licenses("dc1", "Datacenter", &ops(&g), &ctx()), Ok(12));

    if let Some(scope) = snapshot.scopes.get_mut("Scope1") {
        scope.equipment.push(EquipmentRecord::new("srv1", "Server"));
    }
    assert!(matches!(
        g.reload(snapshot),
        Err(SnapshotError::DuplicateEquipment { .. })
    ));
    assert_eq!(g.computed_licenses("dc1", "Datacenter", &ops(&g), &ctx()), Ok(12));
}

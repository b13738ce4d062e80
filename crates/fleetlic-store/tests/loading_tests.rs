use fleetlic_engine::{LicenseGraph, RequestContext};
use fleetlic_store::{FleetSnapshot, MemoryGraph, SnapshotError, StoreConfig};
use std::fs;
use tempfile::TempDir;

const FLEET: &str = include_str!("../../../demos/fleet.json");

#[test]
fn opens_snapshot_from_config_file() {
    let dir = TempDir::new().unwrap();
    let snapshot_path = dir.path().join("fleet.json");
    fs::write(&snapshot_path, FLEET).unwrap();

    let config_path = dir.path().join("fleetlic.json");
    fs::write(
        &config_path,
        format!(
            r#"{{ "snapshot_path": {:?}, "default_scopes": ["Scope1"] }}"#,
            snapshot_path.display().to_string()
        ),
    )
    .unwrap();

    let config = StoreConfig::from_file(&config_path).unwrap();
    assert!(config.strict_schema);
    assert_eq!(config.default_scopes, ["Scope1"]);

    let graph = MemoryGraph::open(config).unwrap();
    assert_eq!(graph.scope_names(), ["Scope1"]);
    let types = graph.equipment_types(&RequestContext::default()).unwrap();
    assert_eq!(types.len(), 5);
}

#[test]
fn missing_snapshot_is_an_io_error() {
    let dir = TempDir::new().unwrap();
    let config = StoreConfig {
        snapshot_path: dir.path().join("absent.json"),
        ..StoreConfig::default()
    };
    assert!(matches!(MemoryGraph::open(config), Err(SnapshotError::Io { .. })));
}

#[test]
fn malformed_snapshot_is_a_json_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("fleet.json");
    fs::write(&path, "{ \"scopes\": [").unwrap();
    let config = StoreConfig {
        snapshot_path: path,
        ..StoreConfig::default()
    };
    assert!(matches!(MemoryGraph::open(config), Err(SnapshotError::Json(_))));
}

#[test]
fn reload_from_disk_picks_up_edits() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("fleet.json");
    fs::write(&path, FLEET).unwrap();
    let graph = MemoryGraph::open(StoreConfig {
        snapshot_path: path.clone(),
        ..StoreConfig::default()
    })
    .unwrap();

    let mut snapshot = FleetSnapshot::from_json(FLEET).unwrap();
    let scope = snapshot.scopes.remove("Scope1").unwrap();
    snapshot.scopes.insert("Scope2".into(), scope);
    fs::write(&path, snapshot.to_json().unwrap()).unwrap();

    graph.reload_from_disk().unwrap();
    assert_eq!(graph.scope_names(), ["Scope2"]);
}

#[test]
fn config_defaults_fill_missing_fields() {
    let config: StoreConfig = serde_json::from_str("{}").unwrap();
    assert_eq!(config, StoreConfig::default());
}

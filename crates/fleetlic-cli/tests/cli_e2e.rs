use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};

fn repo_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../..")
}

fn fleetlic(args: &[&str]) -> Output {
    let snapshot = repo_root().join("demos/fleet.json");
    Command::new(env!("CARGO_BIN_EXE_fleetlic"))
        .arg("--snapshot")
        .arg(&snapshot)
        .args(["--scope", "Scope1"])
        .args(args)
        .env("NO_COLOR", "1")
        .output()
        .expect("run fleetlic")
}

#[test]
fn simulate_prints_json_rows() {
    let request = repo_root().join("demos/request_ops.json");
    let out = fleetlic(&[
        "simulate",
        "--request",
        request.to_str().unwrap(),
        "--format",
        "json",
    ]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    let body: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    let rows = body["licenses"].as_array().unwrap();
    assert_eq!(rows.len(), 2);
    for row in rows {
        assert_eq!(row["old_licenses"], 9);
        assert_eq!(row["new_licenses"], 13);
        assert_eq!(row["delta"], 4);
    }
    assert_eq!(rows[0]["product"]["tag"], "ORA-DB");
}

#[test]
fn simulate_rejects_non_base_type() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("req.json");
    fs::write(
        &path,
        r#"{
            "equip_type": "Cluster",
            "equip_id": "cl1",
            "metric_family": "OPS",
            "metric_name": "oracle.processor.standard",
            "attributes": []
        }"#,
    )
    .unwrap();
    let out = fleetlic(&["simulate", "--request", path.to_str().unwrap()]);
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("InvalidArgument"), "{stderr}");
}

#[test]
fn metrics_lists_each_family() {
    let out = fleetlic(&["metrics"]);
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    for name in [
        "oracle.processor.standard",
        "oracle.nup.standard",
        "ibm.pvu.standard",
        "sag.processor.standard",
    ] {
        assert!(stdout.contains(name), "missing {name} in {stdout}");
    }
}

#[test]
fn unknown_metric_family_fails() {
    let out = fleetlic(&["metrics", "--family", "NoNameMetric"]);
    assert!(!out.status.success());
}

#[test]
fn check_reports_scopes() {
    let out = fleetlic(&["check"]);
    assert!(out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("Scope1"));
}

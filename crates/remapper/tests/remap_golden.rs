use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use remapper::{MessageCatalog, RemapContext, RemapEnv, UserInfo, parse_remapper_yaml, remap};

fn fixtures_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
}

fn load_json(path: &Path) -> serde_json::Value {
    let json = fs::read_to_string(path)
        .unwrap_or_else(|_| panic!("failed to read {}", path.display()));
    serde_json::from_str(&json)
        .unwrap_or_else(|_| panic!("invalid json: {}", path.display()))
}

fn load_catalog() -> MessageCatalog {
    let path = fixtures_dir().join("messages.yaml");
    let yaml = fs::read_to_string(&path)
        .unwrap_or_else(|_| panic!("failed to read {}", path.display()));
    MessageCatalog::from_yaml_str(&yaml)
        .unwrap_or_else(|err| panic!("failed to parse {}: {}", path.display(), err))
}

fn run_fixture(name: &str) {
    let base = fixtures_dir().join(name);
    let yaml = fs::read_to_string(base.join("remapper.yaml"))
        .unwrap_or_else(|_| panic!("failed to read {}/remapper.yaml", name));
    let remapper = parse_remapper_yaml(&yaml)
        .unwrap_or_else(|err| panic!("failed to parse {}: {}", name, err));
    let input = load_json(&base.join("input.json"));
    let expected = load_json(&base.join("expected.json"));

    let env = RemapEnv::new("en", Arc::new(load_catalog()))
        .with_now(Utc.with_ymd_and_hms(2024, 5, 20, 8, 0, 0).unwrap())
        .with_user(UserInfo {
            sub: "reviewer-1".to_string(),
            name: Some("Grace".to_string()),
            email: None,
        });
    let ctx = RemapContext::new(input.clone(), Arc::new(env));
    let output = remap(&remapper, &input, &ctx).expect("remap failed");
    assert_eq!(output, Some(expected), "fixture {name}");
}

#[test]
fn golden_contact_summary() {
    run_fixture("contact_summary");
}

#[test]
fn golden_order_lines() {
    run_fixture("order_lines");
}

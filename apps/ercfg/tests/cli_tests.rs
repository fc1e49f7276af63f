//! CLI tests: argument parsing, command dispatch and the load/save cycle.

// Allow unwrap and panic in tests - these are standard for test code
#![allow(clippy::unwrap_used, clippy::panic)]

use clap::Parser;
use ercfg::cli::{self, Cli, Commands, KindArg, Toggle, apply, parse_attribute_selector};
use ercfg::document_io::{backup_path, load_store, save_store};
use ercfg::settings::Settings;
use ercfg_core::{AttributeSelector, CfgError, ConfigStore};
use std::path::{Path, PathBuf};
use tempfile::{TempDir, tempdir};

const SEED: &str = include_str!("../../../crates/ercfg-core/tests/fixtures/seed_config.json");

fn seed() -> ConfigStore {
    ercfg_core::from_str(SEED).unwrap()
}

/// A temp dir holding the seed document, plus settings pointing at it.
fn workspace() -> (TempDir, Settings) {
    let dir = tempdir().unwrap();
    let config = dir.path().join("g2config.json");
    std::fs::write(&config, SEED).unwrap();
    let settings = Settings {
        config_file: Some(config),
        mirror: Some(dir.path().join("g2config.redb")),
        backup: true,
    };
    (dir, settings)
}

fn run(store: &mut ConfigStore, args: &[&str]) -> Result<cli::Report, CfgError> {
    let mut argv = vec!["ercfg"];
    argv.extend_from_slice(args);
    let parsed = Cli::try_parse_from(argv).unwrap();
    apply(store, &parsed.command, &Settings::default())
}

// =============================================================================
// ARGUMENT PARSING
// =============================================================================

#[test]
fn test_global_flags_and_subcommand() {
    let cli = Cli::try_parse_from(["ercfg", "add-data-source", "CRM", "--config", "g2.json"]).unwrap();
    assert_eq!(cli.config, Some(PathBuf::from("g2.json")));
    assert!(!cli.json_mode);
    assert_eq!(
        cli.command,
        Commands::AddDataSource {
            args: "CRM".to_string()
        }
    );
}

#[test]
fn test_value_enums() {
    let cli = Cli::try_parse_from(["ercfg", "set-distinct", "off"]).unwrap();
    assert_eq!(cli.command, Commands::SetDistinct { state: Toggle::Off });

    let cli = Cli::try_parse_from(["ercfg", "list-functions", "comparison"]).unwrap();
    assert_eq!(
        cli.command,
        Commands::ListFunctions {
            kind: KindArg::Comparison
        }
    );

    assert!(Cli::try_parse_from(["ercfg", "set-distinct", "maybe"]).is_err());
    assert!(Cli::try_parse_from(["ercfg"]).is_err());
}

#[test]
fn test_attribute_selector_forms() {
    assert_eq!(
        parse_attribute_selector("12").unwrap(),
        AttributeSelector::Id(12)
    );
    assert_eq!(
        parse_attribute_selector("name_full").unwrap(),
        AttributeSelector::Code("name_full".to_string())
    );
    assert_eq!(
        parse_attribute_selector(r#"{"Feature": "NAME"}"#).unwrap(),
        AttributeSelector::Feature("NAME".to_string())
    );
    assert!(matches!(
        parse_attribute_selector(r#"{"feature": "NAME", "id": 1}"#),
        Err(CfgError::MalformedInput(_))
    ));
    assert!(parse_attribute_selector("{}").is_err());
}

// =============================================================================
// DISPATCH
// =============================================================================

#[test]
fn test_add_data_source_accepts_code_or_json() {
    let mut store = seed();

    let report = run(&mut store, &["add-data-source", "crm"]).unwrap();
    assert_eq!(report.data["code"], "CRM");
    assert_eq!(report.data["id"], 1000);

    let report = run(&mut store, &["add-data-source", r#"{"dataSource": "WATCHLIST", "id": 2000}"#]).unwrap();
    assert_eq!(report.data["id"], 2000);
    assert!(store.is_updated());

    let err = run(&mut store, &["add-data-source", "CRM"]).unwrap_err();
    assert!(matches!(err, CfgError::DuplicateCode { .. }));
}

#[test]
fn test_feature_commands_require_json() {
    let mut store = seed();
    let err = run(&mut store, &["add-feature", "PASSPORT"]).unwrap_err();
    assert!(matches!(err, CfgError::MalformedInput(_)));
    assert!(!store.is_updated());
}

#[test]
fn test_feature_round_trip_through_commands() {
    let mut store = seed();
    run(
        &mut store,
        &[
            "add-feature",
            r#"{"feature": "PASSPORT", "behavior": "F1ES", "elementList": ["ID_NUM"]}"#,
        ],
    )
    .unwrap();

    let report = run(&mut store, &["get-feature", "passport"]).unwrap();
    assert_eq!(report.message, "feature PASSPORT");
    assert_eq!(report.data["behavior"], "F1ES");

    let report = run(&mut store, &["delete-feature", "PASSPORT"]).unwrap();
    assert_eq!(report.data["feature"], 1);
    assert!(store.features().by_code("PASSPORT").is_none());
}

#[test]
fn test_read_only_commands_leave_store_clean() {
    let mut store = seed();
    for args in [
        vec!["list-data-sources"],
        vec!["list-entity-types"],
        vec!["list-features"],
        vec!["list-functions", "standardize"],
        vec!["get-attribute", r#"{"feature": "NAME"}"#],
        vec!["get-rule", "SF1_CNAME"],
        vec!["get-fragment", "SAME_NAME"],
        vec!["list-system-parameters"],
        vec!["verify-expression-calls"],
        vec!["check"],
    ] {
        run(&mut store, &args).unwrap();
    }
    assert!(!store.is_updated());
}

#[test]
fn test_listing_renders_one_row_per_line() {
    let mut store = seed();
    let report = run(&mut store, &["list-data-sources"]).unwrap();
    let text = report.render_text().unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "2 data sources");
    assert_eq!(lines.len(), 3);
    assert!(lines[1].contains("\"DSRC_CODE\":\"TEST\""));

    let json: serde_json::Value = serde_json::from_str(&report.render_json().unwrap()).unwrap();
    assert_eq!(json["data"].as_array().unwrap().len(), 2);
}

#[test]
fn test_single_results_render_pretty() {
    let mut store = seed();
    let report = run(&mut store, &["get-feature", "NAME"]).unwrap();

    let text = report.render_text().unwrap();
    let (first, body) = text.split_once('\n').unwrap();
    assert_eq!(first, "feature NAME");
    let data: serde_json::Value = serde_json::from_str(body).unwrap();
    assert_eq!(data, report.data);

    let json: serde_json::Value = serde_json::from_str(&report.render_json().unwrap()).unwrap();
    assert_eq!(json["message"], "feature NAME");
    assert_eq!(json["data"]["feature"], "NAME");
}

#[test]
fn test_hash_is_stable() {
    let mut store = seed();
    let first = run(&mut store, &["hash"]).unwrap();
    let second = run(&mut store, &["hash"]).unwrap();
    assert_eq!(first.message.len(), 64);
    assert_eq!(first, second);
}

#[test]
fn test_set_system_parameter() {
    let mut store = seed();
    let report = run(&mut store, &["set-system-parameter", "relationshipsBreakMatches", "Yes"]).unwrap();
    assert_eq!(report.data["relationshipsBreakMatches"], "Yes");

    let err = run(&mut store, &["set-system-parameter", "unknownParameter", "Yes"]).unwrap_err();
    assert!(!err.is_fatal());
}

// =============================================================================
// MIRROR
// =============================================================================

#[test]
fn test_mirror_commands_need_a_mirror_path() {
    let mut store = seed();
    let err = run(&mut store, &["mirror-sync"]).unwrap_err();
    assert!(matches!(err, CfgError::MalformedInput(_)));
}

#[test]
fn test_mirror_load_restores_synced_configuration() {
    let (_dir, settings) = workspace();
    let config = settings.config_path().unwrap().to_path_buf();

    let mut store = load_store(&config).unwrap();
    let report = apply(&mut store, &Commands::MirrorSync, &settings).unwrap();
    assert!(report.data["failed"].as_array().unwrap().is_empty());

    store.delete_data_source("TEST").unwrap();
    save_store(&mut store, &config, false).unwrap();

    apply(&mut store, &Commands::MirrorLoad, &settings).unwrap();
    assert!(store.data_sources().by_code("TEST").is_some());
    assert!(!store.is_updated());
    assert!(load_store(&config).unwrap().data_sources().by_code("TEST").is_some());
    assert!(backup_path(&config).exists());
}

// =============================================================================
// EXECUTE
// =============================================================================

fn write_settings(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("ercfg.toml");
    std::fs::write(&path, body).unwrap();
    path
}

#[test]
fn test_execute_saves_changes_with_backup() {
    let (dir, _) = workspace();
    let settings = write_settings(dir.path(), "config_file = \"g2config.json\"\n");

    let cli = Cli::try_parse_from([
        "ercfg",
        "--settings",
        settings.to_str().unwrap(),
        "delete-data-source",
        "TEST",
    ])
    .unwrap();
    cli::execute(cli).unwrap();

    let config = dir.path().join("g2config.json");
    assert!(load_store(&config).unwrap().data_sources().by_code("TEST").is_none());
    assert_eq!(std::fs::read_to_string(backup_path(&config)).unwrap(), SEED);
}

#[test]
fn test_execute_does_not_rewrite_unchanged_document() {
    let (dir, _) = workspace();
    let settings = write_settings(dir.path(), "config_file = \"g2config.json\"\n");

    let cli = Cli::try_parse_from([
        "ercfg",
        "--settings",
        settings.to_str().unwrap(),
        "--json-mode",
        "list-features",
    ])
    .unwrap();
    cli::execute(cli).unwrap();

    let config = dir.path().join("g2config.json");
    assert_eq!(std::fs::read_to_string(&config).unwrap(), SEED);
    assert!(!backup_path(&config).exists());
}

#[test]
fn test_execute_reports_refused_delete() {
    let (dir, _) = workspace();
    let settings = write_settings(dir.path(), "config_file = \"g2config.json\"\n");

    let cli = Cli::try_parse_from([
        "ercfg",
        "--settings",
        settings.to_str().unwrap(),
        "delete-data-source",
        "SEARCH",
    ])
    .unwrap();
    let err = cli::execute(cli).unwrap_err();
    assert!(matches!(err, CfgError::ProtectedEntity { .. }));
    assert_eq!(
        std::fs::read_to_string(dir.path().join("g2config.json")).unwrap(),
        SEED
    );
}

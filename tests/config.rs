use std::{fs, time::Duration};

use cellscript::{
    library,
    repl::{function_listing, open_blocks, Repl},
    runtime::DEFAULT_MAX_STEPS,
    CellError, EngineConfig, ExecutionLimits, Value,
};
use pretty_assertions::assert_eq;
use tempfile::tempdir;

#[test]
fn defaults_apply_when_no_file_is_given() {
    let config = EngineConfig::load_or_default(None).expect("defaults");
    assert_eq!(config, EngineConfig::default());
    assert_eq!(config.log_level, "warn");
    assert_eq!(config.limits(), ExecutionLimits::default());
    assert_eq!(config.limits().max_steps, Some(DEFAULT_MAX_STEPS));
    assert_eq!(config.limits().timeout, None);
}

#[test]
fn partial_file_keeps_remaining_defaults() {
    let config = EngineConfig::from_toml("timeout_ms = 250\n").expect("parses");
    assert_eq!(config.max_steps, Some(DEFAULT_MAX_STEPS));
    assert_eq!(config.limits().timeout, Some(Duration::from_millis(250)));
}

#[test]
fn zero_steps_disables_the_budget() {
    let config = EngineConfig::from_toml("max_steps = 0").expect("parses");
    assert_eq!(config.limits().max_steps, None);
}

#[test]
fn unknown_keys_are_rejected() {
    let err = EngineConfig::from_toml("max_step = 10").expect_err("typo");
    assert!(matches!(err, CellError::Config(_)));
    assert!(err.to_string().starts_with("invalid configuration: "));
}

#[test]
fn config_loads_from_disk() {
    let dir = tempdir().expect("create temp dir");
    let path = dir.path().join("cellscript.toml");
    fs::write(&path, "max_steps = 42\nlog_level = \"debug\"\n").expect("write config");

    let config = EngineConfig::load_or_default(Some(&path)).expect("loads");
    assert_eq!(config.max_steps, Some(42));
    assert_eq!(config.log_level, "debug");

    let missing = EngineConfig::load(&dir.path().join("absent.toml")).expect_err("no file");
    assert!(matches!(missing, CellError::Io(_)));
}

#[test]
fn repl_cells_share_context() {
    let mut repl = Repl::new(library::shared(), ExecutionLimits::default());
    assert_eq!(repl.eval_cell("let reads = [3, 5, 7]"), vec!["[\n  3,\n  5,\n  7\n]"]);
    assert_eq!(repl.eval_cell("reads |> Stats.mean()"), vec!["5"]);
    assert_eq!(
        repl.eval_cell("display(\"a\")\nprint(\"b\")"),
        vec!["a".to_string(), "b".to_string()]
    );
    assert_eq!(repl.context().get("reads").and_then(Value::as_array).map(<[Value]>::len), Some(3));
}

#[test]
fn repl_reports_errors_inline() {
    let mut repl = Repl::new(library::shared(), ExecutionLimits::default());
    assert_eq!(repl.eval_cell("1 / 0"), vec!["error: Line 1: Division by zero"]);
    assert_eq!(repl.eval_cell(""), Vec::<String>::new());
}

#[test]
fn open_blocks_tracks_unterminated_headers() {
    assert_eq!(open_blocks("let x = 1"), 0);
    assert_eq!(open_blocks("for i in [1, 2]"), 1);
    assert_eq!(open_blocks("for i in xs\n  if i > 1"), 2);
    assert_eq!(open_blocks("if x\n  y\nend"), 0);
}

#[test]
fn function_listing_names_every_namespace() {
    let listing = function_listing(&library::standard_bridge());
    assert_eq!(listing.len(), 4);
    assert_eq!(listing[3], "Align: alignDna");
    assert!(listing[1].starts_with("Seq: gcContent, reverseComplement, "));
}

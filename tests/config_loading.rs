use std::io::Write;
use std::sync::Arc;

use strand::core::config::StorageBackend;
use strand::{EngineConfig, Executor, ExecutorContext, StrandError};
use strand_core::traits::NodeRef;
use strand_core::types::{EdgeSpec, Payload};
use strand_test_utils::{registry, FnNode};

#[test]
fn test_load_full_config_from_file() {
    let toml_content = r#"
[executor]
max_iterations = 12
fail_on_branch_error = true

[storage]
backend = "sqlite"
path = "/tmp/strand-test/state.db"

[hooks]
on_node_start = ["echo starting"]
on_node_complete = []

[log]
filter = "strand=debug"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = EngineConfig::load(tmp.path()).expect("load config");

    assert_eq!(config.executor.max_iterations, 12);
    assert!(config.executor.fail_on_branch_error);
    assert_eq!(config.storage.backend, StorageBackend::Sqlite);
    assert_eq!(
        config.storage.path.as_deref(),
        Some("/tmp/strand-test/state.db")
    );
    assert_eq!(config.hooks.on_node_start, vec!["echo starting".to_string()]);
    assert!(config.hooks.on_node_complete.is_empty());
    assert_eq!(config.log.filter, "strand=debug");
}

#[test]
fn test_env_vars_expanded_on_load() {
    std::env::set_var("STRAND_TEST_DB_DIR", "/tmp/strand-env");
    let toml_content = r#"
[storage]
backend = "sqlite"
path = "${STRAND_TEST_DB_DIR}/state.db"
"#;
    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = EngineConfig::load(tmp.path()).expect("load config");
    assert_eq!(
        config.storage.path.as_deref(),
        Some("/tmp/strand-env/state.db")
    );
    std::env::remove_var("STRAND_TEST_DB_DIR");
}

#[test]
fn test_missing_file_is_config_not_found() {
    let err = EngineConfig::load(std::path::Path::new("/nonexistent/strand.toml")).unwrap_err();
    assert!(matches!(err, StrandError::ConfigNotFound(_)));
}

#[test]
fn test_invalid_values_rejected() {
    assert!(matches!(
        EngineConfig::from_toml_str("[executor]\nmax_iterations = 0\n"),
        Err(StrandError::Config(_))
    ));
    assert!(matches!(
        EngineConfig::from_toml_str("[storage]\nbackend = \"sqlite\"\n"),
        Err(StrandError::Config(_))
    ));
    assert!(matches!(
        EngineConfig::from_toml_str("[storage]\nbackend = \"redis\"\n"),
        Err(StrandError::Config(_))
    ));
}

#[tokio::test]
async fn test_context_from_config_uses_sqlite_and_limits() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db = dir.path().join("nested").join("state.db");
    let toml_content = format!(
        "[executor]\nmax_iterations = 1\n\n[storage]\nbackend = \"sqlite\"\npath = \"{}\"\n",
        db.display()
    );
    let config = EngineConfig::from_toml_str(&toml_content).expect("parse config");

    let a = NodeRef::Function(Arc::new(FnNode::echo("a").edge(EdgeSpec::to("b"))));
    let b = NodeRef::Function(Arc::new(FnNode::echo("b")));
    let ctx = ExecutorContext::from_config(registry(vec![a.clone(), b]), &config)
        .expect("build context");
    assert!(db.exists());

    let executor = Executor::start(ctx, a).expect("start");
    let err = executor.run(Payload::text("x")).await.unwrap_err();
    assert!(matches!(err, StrandError::MaxIterationsExceeded(1)));
}

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, StrandError};

/// Top-level engine configuration.
///
/// ```toml
/// [executor]
/// max_iterations = 50
/// fail_on_branch_error = false
///
/// [storage]
/// backend = "sqlite"
/// path = "~/.strand/state.db"
///
/// [hooks]
/// on_node_start = ["logger -t strand start"]
///
/// [log]
/// filter = "strand=debug"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub hooks: HooksConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Cap on steps per `run`; exceeding it aborts the run.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// Treat any failed parallel branch as a failure of the join.
    #[serde(default)]
    pub fail_on_branch_error: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            fail_on_branch_error: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    /// Database path for the sqlite backend.
    #[serde(default)]
    pub path: Option<String>,
}

impl StorageConfig {
    /// The database path with `~/` expanded.
    pub fn resolved_path(&self) -> Option<PathBuf> {
        self.path.as_deref().map(expand_home)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HooksConfig {
    #[serde(default)]
    pub on_node_start: Vec<String>,
    #[serde(default)]
    pub on_node_complete: Vec<String>,
}

impl HooksConfig {
    pub fn is_empty(&self) -> bool {
        self.on_node_start.is_empty() && self.on_node_complete.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

fn default_max_iterations() -> usize { 50 }
fn default_log_filter() -> String { "strand=info,warn".to_string() }

impl EngineConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| StrandError::ConfigNotFound(path.display().to_string()))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        // Expand ${ENV_VAR} references
        let expanded = expand_env_vars(content);

        let config: Self =
            toml::from_str(&expanded).map_err(|e| StrandError::Config(e.to_string()))?;
        if config.executor.max_iterations == 0 {
            return Err(StrandError::Config(
                "executor.max_iterations must be at least 1".into(),
            ));
        }
        if config.storage.backend == StorageBackend::Sqlite && config.storage.path.is_none() {
            return Err(StrandError::Config(
                "storage.path is required for the sqlite backend".into(),
            ));
        }
        Ok(config)
    }
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                // Keep original if env var not set
                Err(_) => result.push_str(&format!("${{{}}}", var_name)),
            }
        } else {
            result.push(c);
        }
    }
    result
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_env_vars() {
        std::env::set_var("TEST_STRAND_VAR", "hello");
        let result = expand_env_vars("key = \"${TEST_STRAND_VAR}\"");
        assert_eq!(result, "key = \"hello\"");
        std::env::remove_var("TEST_STRAND_VAR");
    }

    #[test]
    fn test_expand_env_vars_missing() {
        let result = expand_env_vars("key = \"${NONEXISTENT_STRAND_VAR}\"");
        assert_eq!(result, "key = \"${NONEXISTENT_STRAND_VAR}\"");
    }

    #[test]
    fn test_defaults_from_empty_toml() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config.executor.max_iterations, 50);
        assert!(!config.executor.fail_on_branch_error);
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert!(config.hooks.is_empty());
        assert_eq!(config.log.filter, "strand=info,warn");
    }

    #[test]
    fn test_full_config() {
        let config = EngineConfig::from_toml_str(
            r#"
[executor]
max_iterations = 5
fail_on_branch_error = true

[storage]
backend = "sqlite"
path = "/tmp/strand.db"

[hooks]
on_node_complete = ["echo done"]
"#,
        )
        .unwrap();
        assert_eq!(config.executor.max_iterations, 5);
        assert!(config.executor.fail_on_branch_error);
        assert_eq!(config.storage.backend, StorageBackend::Sqlite);
        assert_eq!(
            config.storage.resolved_path(),
            Some(PathBuf::from("/tmp/strand.db"))
        );
        assert_eq!(config.hooks.on_node_complete, vec!["echo done"]);
    }

    #[test]
    fn test_sqlite_requires_path() {
        let err = EngineConfig::from_toml_str("[storage]\nbackend = \"sqlite\"\n").unwrap_err();
        assert!(matches!(err, StrandError::Config(_)));
    }

    #[test]
    fn test_zero_iterations_rejected() {
        assert!(EngineConfig::from_toml_str("[executor]\nmax_iterations = 0\n").is_err());
    }

    #[test]
    fn test_home_expansion() {
        let config = StorageConfig {
            backend: StorageBackend::Sqlite,
            path: Some("~/state.db".into()),
        };
        let resolved = config.resolved_path().unwrap();
        assert!(resolved.ends_with("state.db"));
        assert!(!resolved.to_string_lossy().starts_with('~'));
    }

    #[test]
    fn test_missing_file() {
        let err = EngineConfig::load(Path::new("/nonexistent/strand.toml")).unwrap_err();
        assert!(matches!(err, StrandError::ConfigNotFound(_)));
    }
}

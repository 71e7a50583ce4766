use crate::error::BenchError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    /// Which store backs the sessions
    #[serde(default)]
    pub store: StoreKind,
    #[serde(default)]
    pub database: DatabaseConfig,
    /// PostgreSQL connection URL, required when `store: postgres`
    #[serde(default)]
    pub postgres_url: Option<String>,
    #[serde(default)]
    pub bench: BenchConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    Postgres,
    Memory,
}

/// Connection pool settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub max_connections: u32,
    pub acquire_timeout_ms: u64,
    /// Server-side `statement_timeout`; 0 leaves the server default
    pub statement_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            acquire_timeout_ms: 5000,
            statement_timeout_ms: 0,
        }
    }
}

/// Workload shape, threaded into the catalog, synthesizer and driver.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct BenchConfig {
    pub read_iterations: usize,
    pub write_iterations: usize,
    pub max_lines_per_order: usize,
    pub seed: u64,
    pub user_pool_size: usize,
    pub product_pool_size: usize,
    /// Independent sessions run in parallel; 1 is the sequential workload
    pub sessions: usize,
    pub recent_orders_limit: i64,
    pub top_products_limit: i64,
    pub download_base_url: String,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            read_iterations: 200,
            write_iterations: 100,
            max_lines_per_order: 4,
            seed: 123,
            user_pool_size: 1000,
            product_pool_size: 2000,
            sessions: 1,
            recent_orders_limit: 20,
            top_products_limit: 20,
            download_base_url: "https://download.example.com".to_string(),
        }
    }
}

impl BenchConfig {
    pub fn validate(&self) -> Result<(), BenchError> {
        if self.max_lines_per_order == 0 {
            return Err(BenchError::FatalSetupError(
                "bench.max_lines_per_order must be >= 1".into(),
            ));
        }
        if self.sessions == 0 {
            return Err(BenchError::FatalSetupError(
                "bench.sessions must be >= 1".into(),
            ));
        }
        if self.user_pool_size == 0 || self.product_pool_size == 0 {
            return Err(BenchError::FatalSetupError(
                "bench pool sizes must be >= 1".into(),
            ));
        }
        Ok(())
    }
}

impl AppConfig {
    /// Load `config/{env}.yaml`
    pub fn load(env: &str) -> Result<Self, BenchError> {
        Self::load_from(format!("config/{}.yaml", env))
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, BenchError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            BenchError::FatalSetupError(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, BenchError> {
        let config: AppConfig = serde_yaml::from_str(content)?;
        config.bench.validate()?;
        if config.store == StoreKind::Postgres && config.postgres_url.is_none() {
            return Err(BenchError::FatalSetupError(
                "postgres_url is required when store is postgres".into(),
            ));
        }
        // Each session pins one pooled connection for its whole loop
        if config.store == StoreKind::Postgres
            && config.bench.sessions > config.database.max_connections as usize
        {
            return Err(BenchError::FatalSetupError(format!(
                "bench.sessions ({}) exceeds database.max_connections ({})",
                config.bench.sessions, config.database.max_connections
            )));
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
log_level: info
log_dir: ./logs
log_file: bench.log
use_json: false
rotation: never
store: memory
"#;

    #[test]
    fn test_defaults_fill_bench_section() {
        let cfg = AppConfig::from_yaml(MINIMAL).unwrap();
        assert_eq!(cfg.store, StoreKind::Memory);
        assert_eq!(cfg.bench.read_iterations, 200);
        assert_eq!(cfg.bench.write_iterations, 100);
        assert_eq!(cfg.bench.max_lines_per_order, 4);
        assert_eq!(cfg.bench.sessions, 1);
        assert_eq!(cfg.database.max_connections, 10);
    }

    #[test]
    fn test_partial_bench_override() {
        let yaml = format!("{}bench:\n  seed: 7\n  sessions: 4\n", MINIMAL);
        let cfg = AppConfig::from_yaml(&yaml).unwrap();
        assert_eq!(cfg.bench.seed, 7);
        assert_eq!(cfg.bench.sessions, 4);
        assert_eq!(cfg.bench.product_pool_size, 2000);
    }

    #[test]
    fn test_postgres_requires_url() {
        let yaml = MINIMAL.replace("store: memory", "store: postgres");
        let err = AppConfig::from_yaml(&yaml).unwrap_err();
        assert_eq!(err.code(), "FATAL_SETUP_ERROR");
    }

    #[test]
    fn test_postgres_sessions_bounded_by_pool() {
        let postgres = MINIMAL.replace(
            "store: memory",
            "store: postgres\npostgres_url: postgres://bench@localhost/marketplace",
        );

        let over = format!(
            "{}database:\n  max_connections: 10\n  acquire_timeout_ms: 5000\n  statement_timeout_ms: 0\nbench:\n  sessions: 11\n",
            postgres
        );
        let err = AppConfig::from_yaml(&over).unwrap_err();
        assert_eq!(err.code(), "FATAL_SETUP_ERROR");

        let at_limit = over.replace("sessions: 11", "sessions: 10");
        assert_eq!(AppConfig::from_yaml(&at_limit).unwrap().bench.sessions, 10);

        // The in-memory store has no pool to exhaust
        let memory = format!("{}bench:\n  sessions: 64\n", MINIMAL);
        assert!(AppConfig::from_yaml(&memory).is_ok());
    }

    #[test]
    fn test_zero_max_lines_rejected() {
        let yaml = format!("{}bench:\n  max_lines_per_order: 0\n", MINIMAL);
        assert!(AppConfig::from_yaml(&yaml).is_err());
    }

    #[test]
    fn test_missing_file_is_fatal() {
        let err = AppConfig::load_from("config/does-not-exist.yaml").unwrap_err();
        assert_eq!(err.code(), "FATAL_SETUP_ERROR");
    }
}

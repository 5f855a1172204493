//! Fluent database construction

use std::path::Path;
use std::sync::Arc;

use entkit_core::Result;

use super::{Database, EngineConfig, RetryConfig};
use crate::diagnostics::{DiagnosticSink, TracingSink};

/// Builder for [`Database`]
///
/// ```ignore
/// use entkit_engine::{Database, MemorySink};
///
/// // defaults, tracing sink
/// let db = Database::ephemeral()?;
///
/// // config file plus a custom sink
/// let sink = Arc::new(MemorySink::new());
/// let db = Database::builder()
///     .config_file("entkit.toml")?
///     .diagnostics(sink.clone())
///     .open()?;
/// ```
#[derive(Clone)]
pub struct DatabaseBuilder {
    config: EngineConfig,
    diagnostics: Arc<dyn DiagnosticSink>,
}

impl DatabaseBuilder {
    /// Default config, [`TracingSink`]
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            diagnostics: Arc::new(TracingSink),
        }
    }

    /// Replace the whole config
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Load the config from a TOML file
    pub fn config_file(mut self, path: impl AsRef<Path>) -> Result<Self> {
        self.config = EngineConfig::from_file(path.as_ref())?;
        Ok(self)
    }

    /// Override the retry policy
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.config.retry = retry;
        self
    }

    /// Number of background workers
    pub fn background_workers(mut self, workers: usize) -> Self {
        self.config.background.workers = workers;
        self
    }

    /// Sink receiving operation diagnostics
    pub fn diagnostics(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.diagnostics = sink;
        self
    }

    /// The config that `open` will use
    pub fn get_config(&self) -> &EngineConfig {
        &self.config
    }

    /// Create the database
    pub fn open(self) -> Result<Arc<Database>> {
        Database::from_parts(self.config, self.diagnostics).map(Arc::new)
    }
}

impl Default for DatabaseBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DatabaseBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseBuilder")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

//! app.rs: Process-scoped context owning the shared pool and LLM client.
//!
//! Built once in `main` and passed down; the pool is closed in `shutdown`
//! and, failing that, when the context is dropped.

use std::sync::Arc;

use tracing::info;

use crate::config::AppConfig;
use crate::db::{Database, PoolOptions};
use crate::error::TranslationError;
use crate::executor::ScalarExecutor;
use crate::llm::{LlmClient, Translator};
use crate::pipeline::QueryPipeline;
use crate::schema::SCHEMA;

pub struct AppContext {
    db:       Arc<Database>,
    pipeline: Arc<QueryPipeline>,
}

impl AppContext {
    pub fn build(cfg: &AppConfig) -> Result<Self, TranslationError> {
        let translator = Arc::new(LlmClient::from_config(&cfg.llm)?);
        Ok(Self::with_translator(PoolOptions::from_config(&cfg.database), translator))
    }

    /// Wire the pipeline around any translator. The pool opens lazily.
    pub fn with_translator(options: PoolOptions, translator: Arc<dyn Translator>) -> Self {
        let db = Arc::new(Database::new(options));
        let executor = ScalarExecutor::new(Arc::clone(&db));
        let pipeline = Arc::new(QueryPipeline::new(translator, executor, &SCHEMA));
        Self { db, pipeline }
    }

    pub fn db(&self) -> &Arc<Database> {
        &self.db
    }

    pub fn pipeline(&self) -> &Arc<QueryPipeline> {
        &self.pipeline
    }

    pub fn shutdown(&self) {
        if self.db.is_connected() {
            info!("Closing database pool ({})", self.db.path().display());
            self.db.close();
        }
    }
}

impl Drop for AppContext {
    fn drop(&mut self) {
        self.shutdown();
    }
}

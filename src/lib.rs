//! Video statistics chat bot.
//!
//! Answers natural-language questions about video statistics with a single
//! number: the question is translated to SQL by an LLM, the completion is
//! sanitized down to one statement, and the statement runs against SQLite.

pub mod app;
pub mod config;
pub mod db;
pub mod error;
pub mod executor;
pub mod llm;
pub mod loader;
pub mod logging;
pub mod pipeline;
pub mod prompt;
pub mod provision;
pub mod sanitizer;
pub mod schema;
pub mod telegram;

pub use app::AppContext;
pub use error::{ExtractionFailure, QueryExecutionError, TranslationError};
pub use pipeline::QueryPipeline;
pub use sanitizer::{sanitize, sanitize_or_default, SanitizedSql};

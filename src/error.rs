//! error.rs: Typed failures for each pipeline stage.
//!
//! Translation and extraction failures are recovered inside the pipeline by
//! substituting the default statement. Execution failures reach the chat layer.

use thiserror::Error;

/// The language-model round trip failed.
#[derive(Debug, Error)]
pub enum TranslationError {
    #[error("no LLM provider configured")]
    NotConfigured,

    #[error("LLM request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("LLM HTTP {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("unexpected LLM response: {0}")]
    MalformedResponse(String),
}

/// Nothing executable could be extracted from a completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ExtractionFailure {
    #[error("completion is empty after sanitizing")]
    Empty,

    #[error("completion contains no statement keyword")]
    NoStatementKeyword,
}

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("connection pool is closed")]
    Closed,

    #[error("cannot open database {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: rusqlite::Error,
    },
}

/// The data store refused or could not run a sanitized statement.
#[derive(Debug, Error)]
pub enum QueryExecutionError {
    #[error("only read-only SELECT/WITH statements may be executed, got: {0}")]
    ReadOnlyViolation(String),

    #[error("query did not return a single scalar: {0}")]
    NotScalar(&'static str),

    #[error("SQL execution failed: {0}")]
    Database(#[from] rusqlite::Error),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error("database worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

/// Bulk JSON import failures.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid timestamp '{value}': {source}")]
    Timestamp {
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("invalid video id '{id}': {source}")]
    VideoId {
        id: String,
        #[source]
        source: uuid::Error,
    },

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error("loader worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

/// Telegram Bot API transport failures.
#[derive(Debug, Error)]
pub enum TelegramError {
    #[error("TELEGRAM_BOT_TOKEN is not set")]
    NotConfigured,

    #[error("Telegram request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Telegram API error: {0}")]
    Api(String),
}

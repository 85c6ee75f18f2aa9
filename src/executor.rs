//! executor.rs: Run one sanitized statement and return its single value as text.

use std::sync::Arc;

use rusqlite::types::Value;
use tracing::debug;

use crate::db::Database;
use crate::error::QueryExecutionError;
use crate::sanitizer::SanitizedSql;

pub struct ScalarExecutor {
    db: Arc<Database>,
}

impl ScalarExecutor {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Execute `sql`, expecting exactly one row with one column.
    ///
    /// SQL NULL is returned as `"0"`. Only SELECT / WITH statements run.
    pub async fn execute(&self, sql: &SanitizedSql) -> Result<String, QueryExecutionError> {
        if !sql.is_read_only() {
            return Err(QueryExecutionError::ReadOnlyViolation(sql.keyword()));
        }

        let mut conn = self.db.acquire().await?;
        let statement = sql.clone();

        // rusqlite is blocking; the guard moves into the worker and is
        // released there whatever the outcome.
        let value = tokio::task::spawn_blocking(move || query_scalar(&mut conn, &statement)).await??;
        debug!("Scalar result: {}", value);
        Ok(value)
    }
}

// The transaction is never committed: it only pins one read snapshot and is
// rolled back on drop.
fn query_scalar(conn: &mut rusqlite::Connection, sql: &SanitizedSql) -> Result<String, QueryExecutionError> {
    let tx = conn.transaction()?;
    let value = {
        let mut stmt = tx.prepare(sql.as_str())?;
        // A leading WITH can still front a DELETE/UPDATE/INSERT ... RETURNING.
        if !stmt.readonly() {
            return Err(QueryExecutionError::ReadOnlyViolation(format!("{} that writes", sql.keyword())));
        }
        if stmt.column_count() != 1 {
            return Err(QueryExecutionError::NotScalar("expected exactly one column"));
        }

        let mut rows = stmt.query([])?;
        let value: Value = match rows.next()? {
            Some(row) => row.get(0)?,
            None => return Err(QueryExecutionError::NotScalar("query returned no rows")),
        };
        if rows.next()?.is_some() {
            return Err(QueryExecutionError::NotScalar("query returned more than one row"));
        }
        value
    };
    drop(tx);

    Ok(value_to_string(value))
}

/// Text form of a scalar. NULL becomes "0".
pub fn value_to_string(value: Value) -> String {
    match value {
        Value::Null => "0".to_string(),
        Value::Integer(n) => n.to_string(),
        Value::Real(f) => f.to_string(),
        Value::Text(s) => s,
        Value::Blob(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
    }
}

//! Schema provisioning: create the tables and indexes described in `schema`.

use rusqlite::Connection;
use tracing::info;

use crate::schema::Schema;

/// Create every table and index. Safe to run repeatedly.
pub fn create_schema(conn: &Connection, schema: &Schema) -> rusqlite::Result<()> {
    let names: Vec<_> = schema.tables.iter().map(|t| t.name).collect();
    info!("Creating tables: {}", names.join(", "));
    conn.execute_batch(&schema.ddl())
}

/// User tables present in the database, sorted by name.
pub fn list_tables(conn: &Connection) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SCHEMA;

    #[test]
    fn test_create_schema_twice() {
        let conn = Connection::open_in_memory().unwrap();
        create_schema(&conn, &SCHEMA).unwrap();
        create_schema(&conn, &SCHEMA).unwrap();
        assert_eq!(list_tables(&conn).unwrap(), ["video_snapshots", "videos"]);
    }

    #[test]
    fn test_indexes_created() {
        let conn = Connection::open_in_memory().unwrap();
        create_schema(&conn, &SCHEMA).unwrap();
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'index' AND name LIKE 'idx_%' ORDER BY name")
            .unwrap();
        let names: Vec<String> = stmt
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<rusqlite::Result<_>>()
            .unwrap();
        assert_eq!(
            names,
            [
                "idx_snapshots_created_at",
                "idx_snapshots_video_id",
                "idx_videos_created_at",
                "idx_videos_creator_id",
            ]
        );
    }

    #[test]
    fn test_columns_match_descriptor() {
        let conn = Connection::open_in_memory().unwrap();
        create_schema(&conn, &SCHEMA).unwrap();
        for table in SCHEMA.tables {
            let stmt = conn.prepare(&format!("SELECT * FROM {}", table.name)).unwrap();
            let names: Vec<&str> = stmt.column_names();
            let expected: Vec<&str> = table.columns.iter().map(|c| c.name).collect();
            assert_eq!(names, expected);
        }
    }

    #[test]
    fn test_snapshot_requires_existing_video() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys=ON;").unwrap();
        create_schema(&conn, &SCHEMA).unwrap();
        let orphan = conn.execute(
            "INSERT INTO video_snapshots (id, video_id, created_at) VALUES ('s1', 'missing', '2025-11-28 10:00:00')",
            [],
        );
        assert!(orphan.is_err());
    }

    #[test]
    fn test_counters_default_to_zero() {
        let conn = Connection::open_in_memory().unwrap();
        create_schema(&conn, &SCHEMA).unwrap();
        conn.execute(
            "INSERT INTO videos (id, creator_id, video_created_at) VALUES ('v1', 'c1', '2025-11-01 00:00:00')",
            [],
        )
        .unwrap();
        let views: i64 = conn
            .query_row("SELECT views_count FROM videos WHERE id = 'v1'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(views, 0);
    }
}

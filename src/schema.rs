//! schema.rs: Schema descriptor for the two video statistics tables.
//!
//! One static description drives both the LLM prompt (column meanings) and
//! the provisioning DDL, so the model is never told about a column the
//! database does not have.

/// Statement substituted whenever translation or extraction yields nothing usable.
/// Valid against the schema below and always returns one scalar.
pub const DEFAULT_QUERY: &str = "SELECT COUNT(*) FROM videos";

/// Semantic column type. Storage maps onto SQLite affinities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Uuid,
    Text,
    Timestamp,
    Integer,
}

impl ColumnType {
    /// SQLite storage type used in `CREATE TABLE`.
    pub fn sql_type(&self) -> &'static str {
        match self {
            ColumnType::Uuid | ColumnType::Text | ColumnType::Timestamp => "TEXT",
            ColumnType::Integer => "INTEGER",
        }
    }

    /// Type name shown to the model.
    pub fn label(&self) -> &'static str {
        match self {
            ColumnType::Uuid => "UUID",
            ColumnType::Text => "VARCHAR",
            ColumnType::Timestamp => "TIMESTAMP",
            ColumnType::Integer => "INTEGER",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Column {
    pub name: &'static str,
    pub kind: ColumnType,
    /// Column constraint appended to the DDL, may be empty.
    pub constraint: &'static str,
    pub description: &'static str,
}

#[derive(Debug, Clone, Copy)]
pub struct Table {
    pub name: &'static str,
    pub description: &'static str,
    pub columns: &'static [Column],
    /// (index name, indexed column)
    pub indexes: &'static [(&'static str, &'static str)],
}

#[derive(Debug, Clone, Copy)]
pub struct Schema {
    pub tables: &'static [Table],
}

const fn col(
    name: &'static str,
    kind: ColumnType,
    constraint: &'static str,
    description: &'static str,
) -> Column {
    Column { name, kind, constraint, description }
}

// Timestamps are UTC text 'YYYY-MM-DD HH:MM:SS', the format CURRENT_TIMESTAMP produces.

pub const VIDEOS: Table = Table {
    name: "videos",
    description: "final statistics per video, one row per video",
    columns: &[
        col("id", ColumnType::Uuid, "PRIMARY KEY", "unique video identifier"),
        col("creator_id", ColumnType::Text, "NOT NULL", "creator identifier (string, always quote it)"),
        col("video_created_at", ColumnType::Timestamp, "NOT NULL", "when the video was published"),
        col("views_count", ColumnType::Integer, "NOT NULL DEFAULT 0", "lifetime views"),
        col("likes_count", ColumnType::Integer, "NOT NULL DEFAULT 0", "lifetime likes"),
        col("comments_count", ColumnType::Integer, "NOT NULL DEFAULT 0", "lifetime comments"),
        col("reports_count", ColumnType::Integer, "NOT NULL DEFAULT 0", "lifetime reports"),
        col("created_at", ColumnType::Timestamp, "DEFAULT CURRENT_TIMESTAMP", "row creation time"),
        col("updated_at", ColumnType::Timestamp, "DEFAULT CURRENT_TIMESTAMP", "row update time"),
    ],
    indexes: &[
        ("idx_videos_creator_id", "creator_id"),
        ("idx_videos_created_at", "video_created_at"),
    ],
};

pub const VIDEO_SNAPSHOTS: Table = Table {
    name: "video_snapshots",
    description: "hourly statistics snapshots, one row per video per hour",
    columns: &[
        col("id", ColumnType::Text, "PRIMARY KEY", "snapshot identifier"),
        col(
            "video_id",
            ColumnType::Uuid,
            "NOT NULL REFERENCES videos(id) ON DELETE CASCADE",
            "video the snapshot belongs to (videos.id); there is no creator column here",
        ),
        col("views_count", ColumnType::Integer, "NOT NULL DEFAULT 0", "views at snapshot time"),
        col("likes_count", ColumnType::Integer, "NOT NULL DEFAULT 0", "likes at snapshot time"),
        col("comments_count", ColumnType::Integer, "NOT NULL DEFAULT 0", "comments at snapshot time"),
        col("reports_count", ColumnType::Integer, "NOT NULL DEFAULT 0", "reports at snapshot time"),
        col("delta_views_count", ColumnType::Integer, "NOT NULL DEFAULT 0", "views gained during the hour, may be negative"),
        col("delta_likes_count", ColumnType::Integer, "NOT NULL DEFAULT 0", "likes gained during the hour, may be negative"),
        col("delta_comments_count", ColumnType::Integer, "NOT NULL DEFAULT 0", "comments gained during the hour, may be negative"),
        col("delta_reports_count", ColumnType::Integer, "NOT NULL DEFAULT 0", "reports gained during the hour, may be negative"),
        col("created_at", ColumnType::Timestamp, "NOT NULL", "measurement time (once per hour)"),
        col("updated_at", ColumnType::Timestamp, "DEFAULT CURRENT_TIMESTAMP", "row update time"),
    ],
    indexes: &[
        ("idx_snapshots_video_id", "video_id"),
        ("idx_snapshots_created_at", "created_at"),
    ],
};

/// The queryable schema.
pub static SCHEMA: Schema = Schema {
    tables: &[VIDEOS, VIDEO_SNAPSHOTS],
};

impl Table {
    fn create_table_sql(&self) -> String {
        let columns = self
            .columns
            .iter()
            .map(|c| {
                let mut line = format!("    {} {}", c.name, c.kind.sql_type());
                if !c.constraint.is_empty() {
                    line.push(' ');
                    line.push_str(c.constraint);
                }
                line
            })
            .collect::<Vec<_>>()
            .join(",\n");
        format!("CREATE TABLE IF NOT EXISTS {} (\n{}\n);", self.name, columns)
    }

    fn create_index_sql(&self) -> Vec<String> {
        self.indexes
            .iter()
            .map(|(index, column)| {
                format!("CREATE INDEX IF NOT EXISTS {index} ON {}({column});", self.name)
            })
            .collect()
    }

    /// Annotated listing used as model context.
    fn describe(&self) -> String {
        let mut out = format!("-- Table: {} ({})\n{} (\n", self.name, self.description, self.name);
        for c in self.columns {
            out.push_str(&format!(
                "    {:<22} {:<10} -- {}\n",
                c.name,
                c.kind.label(),
                c.description
            ));
        }
        out.push_str(");\n");
        out
    }
}

impl Schema {
    /// Schema text embedded in the system prompt.
    pub fn describe(&self) -> String {
        self.tables
            .iter()
            .map(Table::describe)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Full provisioning script: tables in dependency order, then indexes.
    pub fn ddl(&self) -> String {
        let mut statements: Vec<String> = self.tables.iter().map(Table::create_table_sql).collect();
        for table in self.tables {
            statements.extend(table.create_index_sql());
        }
        statements.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tables_in_dependency_order() {
        let names: Vec<_> = SCHEMA.tables.iter().map(|t| t.name).collect();
        assert_eq!(names, ["videos", "video_snapshots"]);
    }

    #[test]
    fn test_snapshots_have_no_creator_column() {
        let names: Vec<_> = VIDEO_SNAPSHOTS.columns.iter().map(|c| c.name).collect();
        assert!(!names.contains(&"creator_id"));
        assert!(names.contains(&"delta_views_count"));
        assert_eq!(names.len(), 12);
        assert_eq!(VIDEOS.columns.len(), 9);
    }

    #[test]
    fn test_ddl_contains_foreign_key_and_indexes() {
        let ddl = SCHEMA.ddl();
        assert!(ddl.contains("CREATE TABLE IF NOT EXISTS videos ("));
        assert!(ddl.contains("video_id TEXT NOT NULL REFERENCES videos(id) ON DELETE CASCADE"));
        assert!(ddl.contains("CREATE INDEX IF NOT EXISTS idx_snapshots_created_at ON video_snapshots(created_at);"));
    }

    #[test]
    fn test_describe_lists_every_column() {
        let text = SCHEMA.describe();
        for table in SCHEMA.tables {
            for c in table.columns {
                assert!(text.contains(c.name), "missing {}", c.name);
            }
        }
        assert!(text.contains("TIMESTAMP"));
    }
}

//! loader.rs: Bulk import of the videos JSON export.
//!
//! Input: `{ "videos": [ { ..., "snapshots": [ ... ] } ] }`. Videos are
//! written in batches, one transaction per batch; re-importing the same file
//! updates counters instead of failing on duplicate ids.

use std::path::Path;

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{params, Connection};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::db::Database;
use crate::error::LoadError;

pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Storage format for every timestamp column.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Deserialize)]
pub struct Dataset {
    #[serde(default)]
    pub videos: Vec<VideoRecord>,
}

#[derive(Debug, Deserialize)]
pub struct VideoRecord {
    pub id: String,
    pub creator_id: String,
    pub video_created_at: String,
    #[serde(default)]
    pub views_count: i64,
    #[serde(default)]
    pub likes_count: i64,
    #[serde(default)]
    pub comments_count: i64,
    #[serde(default)]
    pub reports_count: i64,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    #[serde(default)]
    pub snapshots: Vec<SnapshotRecord>,
}

#[derive(Debug, Deserialize)]
pub struct SnapshotRecord {
    pub id: String,
    pub video_id: String,
    #[serde(default)]
    pub views_count: i64,
    #[serde(default)]
    pub likes_count: i64,
    #[serde(default)]
    pub comments_count: i64,
    #[serde(default)]
    pub reports_count: i64,
    #[serde(default)]
    pub delta_views_count: i64,
    #[serde(default)]
    pub delta_likes_count: i64,
    #[serde(default)]
    pub delta_comments_count: i64,
    #[serde(default)]
    pub delta_reports_count: i64,
    pub created_at: String,
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub videos: usize,
    pub snapshots: usize,
}

/// ISO 8601 with `Z`, an offset, or no zone (read as UTC) → UTC storage text.
pub fn normalize_timestamp(value: &str) -> Result<String, LoadError> {
    let trimmed = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.with_timezone(&Utc).format(TIMESTAMP_FORMAT).to_string());
    }
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%.f"))
        .map(|naive| naive.format(TIMESTAMP_FORMAT).to_string())
        .map_err(|source| LoadError::Timestamp { value: value.to_string(), source })
}

fn normalize_optional(value: Option<&str>, fallback: &str) -> Result<String, LoadError> {
    match value {
        Some(v) => normalize_timestamp(v),
        None => Ok(fallback.to_string()),
    }
}

fn normalize_uuid(id: &str) -> Result<String, LoadError> {
    Uuid::parse_str(id.trim())
        .map(|u| u.to_string())
        .map_err(|source| LoadError::VideoId { id: id.to_string(), source })
}

pub fn read_dataset(path: &Path) -> Result<Dataset, LoadError> {
    let data = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.display().to_string(),
        source,
    })?;
    Ok(serde_json::from_str(&data)?)
}

/// Write `dataset` in batches of `batch_size` videos.
pub fn load_dataset(
    conn: &mut Connection,
    dataset: &Dataset,
    batch_size: usize,
) -> Result<LoadSummary, LoadError> {
    let total = dataset.videos.len();
    info!("Loading {} videos", total);

    let now = Utc::now().format(TIMESTAMP_FORMAT).to_string();
    let mut summary = LoadSummary::default();

    for (i, batch) in dataset.videos.chunks(batch_size.max(1)).enumerate() {
        let tx = conn.transaction()?;
        for video in batch {
            insert_video(&tx, video, &now)?;
            summary.videos += 1;
            for snapshot in &video.snapshots {
                insert_snapshot(&tx, snapshot, &now)?;
                summary.snapshots += 1;
            }
        }
        tx.commit()?;
        info!(
            "Processed {}/{} videos",
            (i * batch_size.max(1) + batch.len()).min(total),
            total
        );
    }

    info!("Load finished: {} videos, {} snapshots", summary.videos, summary.snapshots);
    Ok(summary)
}

fn insert_video(conn: &Connection, video: &VideoRecord, now: &str) -> Result<(), LoadError> {
    conn.execute(
        "INSERT INTO videos (
            id, creator_id, video_created_at, views_count,
            likes_count, comments_count, reports_count,
            created_at, updated_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
         ON CONFLICT (id) DO UPDATE SET
            views_count = excluded.views_count,
            updated_at = excluded.updated_at",
        params![
            normalize_uuid(&video.id)?,
            video.creator_id,
            normalize_timestamp(&video.video_created_at)?,
            video.views_count,
            video.likes_count,
            video.comments_count,
            video.reports_count,
            normalize_optional(video.created_at.as_deref(), now)?,
            normalize_optional(video.updated_at.as_deref(), now)?,
        ],
    )?;
    Ok(())
}

fn insert_snapshot(conn: &Connection, snapshot: &SnapshotRecord, now: &str) -> Result<(), LoadError> {
    conn.execute(
        "INSERT INTO video_snapshots (
            id, video_id, views_count, likes_count,
            comments_count, reports_count,
            delta_views_count, delta_likes_count,
            delta_comments_count, delta_reports_count,
            created_at, updated_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
         ON CONFLICT (id) DO UPDATE SET
            views_count = excluded.views_count,
            delta_views_count = excluded.delta_views_count,
            updated_at = excluded.updated_at",
        params![
            snapshot.id,
            normalize_uuid(&snapshot.video_id)?,
            snapshot.views_count,
            snapshot.likes_count,
            snapshot.comments_count,
            snapshot.reports_count,
            snapshot.delta_views_count,
            snapshot.delta_likes_count,
            snapshot.delta_comments_count,
            snapshot.delta_reports_count,
            normalize_timestamp(&snapshot.created_at)?,
            normalize_optional(snapshot.updated_at.as_deref(), now)?,
        ],
    )?;
    Ok(())
}

/// Read `path` and import it through a pooled connection.
pub async fn load_file(db: &Database, path: &Path, batch_size: usize) -> Result<LoadSummary, LoadError> {
    info!("Reading {}", path.display());
    let dataset = read_dataset(path)?;
    let mut conn = db.acquire().await?;
    tokio::task::spawn_blocking(move || load_dataset(&mut conn, &dataset, batch_size)).await?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_timestamp_formats() {
        assert_eq!(normalize_timestamp("2025-11-28T10:15:00Z").unwrap(), "2025-11-28 10:15:00");
        assert_eq!(normalize_timestamp("2025-11-28T10:15:00+03:00").unwrap(), "2025-11-28 07:15:00");
        assert_eq!(normalize_timestamp("2025-11-28T10:15:00.123456+00:00").unwrap(), "2025-11-28 10:15:00");
        assert_eq!(normalize_timestamp("2025-11-28T10:15:00").unwrap(), "2025-11-28 10:15:00");
        assert_eq!(normalize_timestamp("2025-11-28 10:15:00").unwrap(), "2025-11-28 10:15:00");
    }

    #[test]
    fn test_offset_can_change_the_date() {
        assert_eq!(normalize_timestamp("2025-11-28T01:00:00+03:00").unwrap(), "2025-11-27 22:00:00");
    }

    #[test]
    fn test_invalid_timestamp() {
        assert!(matches!(
            normalize_timestamp("28.11.2025"),
            Err(LoadError::Timestamp { .. })
        ));
    }

    #[test]
    fn test_uuid_normalized_to_hyphenated_lowercase() {
        assert_eq!(
            normalize_uuid("A1B2C3D4E5F60718293A4B5C6D7E8F90").unwrap(),
            "a1b2c3d4-e5f6-0718-293a-4b5c6d7e8f90"
        );
        assert!(matches!(normalize_uuid("nope"), Err(LoadError::VideoId { .. })));
    }

    #[test]
    fn test_dataset_defaults() {
        let data: Dataset = serde_json::from_str(
            r#"{"videos":[{"id":"a1b2c3d4-e5f6-0718-293a-4b5c6d7e8f90","creator_id":"c","video_created_at":"2025-11-01T00:00:00Z"}]}"#,
        )
        .unwrap();
        assert_eq!(data.videos.len(), 1);
        assert_eq!(data.videos[0].views_count, 0);
        assert!(data.videos[0].snapshots.is_empty());

        let empty: Dataset = serde_json::from_str("{}").unwrap();
        assert!(empty.videos.is_empty());
    }
}

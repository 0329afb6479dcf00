//! SQLite-backed version registry
//!
//! All database work runs on the blocking pool via `spawn_blocking`; version
//! creation additionally holds an async mutex so the read-increment-write
//! sequence never interleaves within this process, with a retry loop covering
//! writers in other processes sharing the database file.

use chrono::{DateTime, Utc};
use resol_core::{canonicalize_area, format_version, version_row_id, VersionRecord};
use rusqlite::OptionalExtension;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Fallback area when an incident carries none
pub const GENERAL_AREA: &str = "GENERAL";

const CREATE_RETRIES: usize = 5;

/// Version registry error
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("database error: {0}")]
    Database(String),

    #[error("version not found: {0}")]
    VersionNotFound(String),

    #[error("versions belong to different areas: {0} vs {1}")]
    AreaMismatch(String, String),

    #[error("version numbering conflict persisted after retries for area {0}")]
    NumberingConflict(String),
}

/// Request to mint a new version
#[derive(Debug, Clone)]
pub struct NewVersion {
    pub area: String,
    /// Category tag, e.g. `caso_resuelto` or `documento`
    pub kind: String,
    pub incident_id: Option<String>,
    pub description: Option<String>,
    pub lesson_learned: Option<String>,
    pub keywords: Vec<String>,
    /// `true` bumps `(major+1, 0)` instead of `(major, minor+1)`
    pub increment_major: bool,
}

impl NewVersion {
    pub fn new(area: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            area: area.into(),
            kind: kind.into(),
            incident_id: None,
            description: None,
            lesson_learned: None,
            keywords: Vec::new(),
            increment_major: false,
        }
    }
}

/// Version history for one area
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AreaHistory {
    pub area: String,
    pub total_versions: usize,
    pub current_version: Option<String>,
    pub first_version: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub last_at: Option<DateTime<Utc>>,
    /// Oldest first, showing how knowledge evolved
    pub chronological: Vec<VersionRecord>,
    /// All versions joined oldest-first with an arrow separator
    pub evolution: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AreaCount {
    pub area: String,
    pub count: u64,
    pub latest: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KindCount {
    pub kind: String,
    pub count: u64,
}

/// Registry-wide statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryStatistics {
    pub total_versions: u64,
    pub total_areas: u64,
    /// Ordered by count descending
    pub per_area: Vec<AreaCount>,
    pub per_kind: Vec<KindCount>,
    pub most_recent: Option<VersionRecord>,
}

/// Difference between two versions of the same area
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionComparison {
    pub earlier: String,
    pub later: String,
    pub area: String,
    /// e.g. `1.0 → 1.1`
    pub version_delta: String,
    pub lesson_earlier: Option<String>,
    pub lesson_later: Option<String>,
    pub days_between: i64,
}

/// SQLite-backed version registry
#[derive(Debug)]
pub struct VersionRegistry {
    path: PathBuf,
    /// Serializes the read-increment-write sequence of `create_version`
    write_lock: tokio::sync::Mutex<()>,
}

impl VersionRegistry {
    /// Open (or create) the registry database at the given path
    pub async fn new(path: PathBuf) -> Result<Self, RegistryError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| RegistryError::Database(e.to_string()))?;
        }

        let path_clone = path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&path_clone).map_err(|e| e.to_string())?;
            conn.pragma_update(None, "journal_mode", "WAL")
                .map_err(|e| e.to_string())?;
            Self::init_schema(&conn)
        })
        .await
        .map_err(|e| RegistryError::Database(e.to_string()))?
        .map_err(RegistryError::Database)?;

        info!("version registry initialized at: {:?}", path);

        Ok(Self {
            path,
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    fn init_schema(conn: &rusqlite::Connection) -> Result<(), String> {
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS versions (
                id TEXT PRIMARY KEY,
                area TEXT NOT NULL,
                major INTEGER NOT NULL,
                minor INTEGER NOT NULL,
                version_str TEXT NOT NULL,
                kind TEXT NOT NULL,
                created_at TEXT NOT NULL,
                incident_id TEXT,
                description TEXT,
                lesson_learned TEXT,
                keywords TEXT NOT NULL DEFAULT '[]',
                UNIQUE(area, major, minor)
            )
            "#,
            [],
        )
        .map_err(|e| e.to_string())?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_versions_area ON versions(area)",
            [],
        )
        .map_err(|e| e.to_string())?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_versions_created_at ON versions(created_at)",
            [],
        )
        .map_err(|e| e.to_string())?;

        Ok(())
    }

    /// Mint the next version for an area
    ///
    /// First version for an area is `1.0`; later calls bump the minor, or the
    /// major when `increment_major` is set. Case/accent variants of the same
    /// area share one counter.
    pub async fn create_version(&self, req: NewVersion) -> Result<VersionRecord, RegistryError> {
        let area = canonicalize_area(&req.area);
        let area = if area.is_empty() {
            GENERAL_AREA.to_string()
        } else {
            area
        };

        let keywords_json =
            serde_json::to_string(&req.keywords).map_err(|e| RegistryError::Database(e.to_string()))?;

        let _guard = self.write_lock.lock().await;

        for attempt in 0..CREATE_RETRIES {
            let path = self.path.clone();
            let area_c = area.clone();
            let kind = req.kind.clone();
            let incident_id = req.incident_id.clone();
            let description = req.description.clone();
            let lesson_learned = req.lesson_learned.clone();
            let keywords_json_c = keywords_json.clone();
            let increment_major = req.increment_major;
            let created_at = Utc::now();

            let inserted: Option<VersionRecord> = run_sqlite(path, move |conn| {
                let latest: Option<(u32, u32)> = conn
                    .query_row(
                        "SELECT major, minor FROM versions WHERE area = ?
                         ORDER BY major DESC, minor DESC LIMIT 1",
                        [&area_c],
                        |row| Ok((row.get(0)?, row.get(1)?)),
                    )
                    .optional()
                    .map_err(|e| e.to_string())?;

                let (major, minor) = match latest {
                    None => (1, 0),
                    Some((prev_major, _)) if increment_major => (prev_major + 1, 0),
                    Some((prev_major, prev_minor)) => (prev_major, prev_minor + 1),
                };

                let record = VersionRecord {
                    id: version_row_id(&area_c, major, minor),
                    area: area_c.clone(),
                    major,
                    minor,
                    version_str: format_version(&area_c, major, minor),
                    kind,
                    created_at,
                    incident_id,
                    description,
                    lesson_learned,
                    keywords: Vec::new(),
                };

                let result = conn.execute(
                    r#"
                    INSERT INTO versions (
                        id, area, major, minor, version_str, kind,
                        created_at, incident_id, description, lesson_learned, keywords
                    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                    rusqlite::params![
                        record.id,
                        record.area,
                        record.major,
                        record.minor,
                        record.version_str,
                        record.kind,
                        record.created_at.to_rfc3339(),
                        record.incident_id,
                        record.description,
                        record.lesson_learned,
                        keywords_json_c,
                    ],
                );

                match result {
                    Ok(_) => Ok(Some(record)),
                    Err(rusqlite::Error::SqliteFailure(e, _))
                        if e.code == rusqlite::ErrorCode::ConstraintViolation =>
                    {
                        // Another writer raced us to this number
                        Ok(None)
                    }
                    Err(e) => Err(e.to_string()),
                }
            })
            .await?;

            match inserted {
                Some(mut record) => {
                    record.keywords = req.keywords;
                    info!(version = %record.version_str, area = %record.area, "version created");
                    return Ok(record);
                }
                None => {
                    warn!(area = %area, attempt, "version numbering conflict, retrying");
                }
            }
        }

        Err(RegistryError::NumberingConflict(area))
    }

    /// Full record for a version string, `None` when unknown
    pub async fn get_version(
        &self,
        version_str: &str,
    ) -> Result<Option<VersionRecord>, RegistryError> {
        let path = self.path.clone();
        let version_str = version_str.to_string();

        run_sqlite(path, move |conn| {
            conn.query_row(
                &format!("{SELECT_RECORD} WHERE version_str = ?"),
                [&version_str],
                record_from_row,
            )
            .optional()
            .map_err(|e| e.to_string())
        })
        .await
    }

    /// Versions ordered by creation descending, optionally filtered
    pub async fn list_versions(
        &self,
        area: Option<&str>,
        kind: Option<&str>,
        limit: usize,
    ) -> Result<Vec<VersionRecord>, RegistryError> {
        let path = self.path.clone();
        let area = area.map(canonicalize_area);
        let kind = kind.map(str::to_string);

        run_sqlite(path, move |conn| {
            let mut sql = SELECT_RECORD.to_string();
            let mut clauses = Vec::new();
            let mut params: Vec<String> = Vec::new();

            if let Some(area) = area {
                clauses.push("area = ?");
                params.push(area);
            }
            if let Some(kind) = kind {
                clauses.push("kind = ?");
                params.push(kind);
            }
            if !clauses.is_empty() {
                sql.push_str(" WHERE ");
                sql.push_str(&clauses.join(" AND "));
            }
            sql.push_str(" ORDER BY created_at DESC, major DESC, minor DESC LIMIT ?");
            params.push(limit.to_string());

            let mut stmt = conn.prepare(&sql).map_err(|e| e.to_string())?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(params), record_from_row)
                .map_err(|e| e.to_string())?;

            rows.collect::<Result<Vec<_>, _>>().map_err(|e| e.to_string())
        })
        .await
    }

    /// Knowledge evolution of one area, oldest first
    pub async fn history_for_area(&self, area: &str) -> Result<AreaHistory, RegistryError> {
        let canonical = canonicalize_area(area);
        let versions = self.list_versions(Some(&canonical), None, 1000).await?;

        if versions.is_empty() {
            return Ok(AreaHistory {
                area: canonical,
                total_versions: 0,
                current_version: None,
                first_version: None,
                started_at: None,
                last_at: None,
                chronological: Vec::new(),
                evolution: String::new(),
            });
        }

        let current = versions[0].clone();
        let mut chronological = versions;
        chronological.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then(a.major.cmp(&b.major))
                .then(a.minor.cmp(&b.minor))
        });

        let evolution = chronological
            .iter()
            .map(|v| v.version_str.as_str())
            .collect::<Vec<_>>()
            .join(" → ");

        Ok(AreaHistory {
            area: canonical,
            total_versions: chronological.len(),
            current_version: Some(current.version_str),
            first_version: chronological.first().map(|v| v.version_str.clone()),
            started_at: chronological.first().map(|v| v.created_at),
            last_at: Some(current.created_at),
            chronological,
            evolution,
        })
    }

    /// Substring search over keywords, description and lesson learned
    ///
    /// OR semantics: a record matches when any keyword appears in any of the
    /// three fields.
    pub async fn search_by_keywords(
        &self,
        keywords: &[String],
        limit: usize,
    ) -> Result<Vec<VersionRecord>, RegistryError> {
        if keywords.is_empty() {
            return Ok(Vec::new());
        }

        let path = self.path.clone();
        let patterns: Vec<String> = keywords
            .iter()
            .map(|k| format!("%{}%", k.to_lowercase()))
            .collect();

        run_sqlite(path, move |conn| {
            let clause = patterns
                .iter()
                .map(|_| {
                    "(LOWER(keywords) LIKE ? OR LOWER(description) LIKE ? \
                     OR LOWER(lesson_learned) LIKE ?)"
                })
                .collect::<Vec<_>>()
                .join(" OR ");
            let sql = format!(
                "{SELECT_RECORD} WHERE {clause} ORDER BY created_at DESC LIMIT ?"
            );

            let mut params: Vec<String> = Vec::new();
            for p in &patterns {
                params.push(p.clone());
                params.push(p.clone());
                params.push(p.clone());
            }
            params.push(limit.to_string());

            let mut stmt = conn.prepare(&sql).map_err(|e| e.to_string())?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(params), record_from_row)
                .map_err(|e| e.to_string())?;

            rows.collect::<Result<Vec<_>, _>>().map_err(|e| e.to_string())
        })
        .await
    }

    /// Registry-wide statistics
    pub async fn statistics(&self) -> Result<RegistryStatistics, RegistryError> {
        let path = self.path.clone();

        run_sqlite(path, move |conn| {
            let total: u64 = conn
                .query_row("SELECT COUNT(*) FROM versions", [], |row| row.get(0))
                .map_err(|e| e.to_string())?;

            let mut stmt = conn
                .prepare(
                    "SELECT area, COUNT(*) as count, MAX(version_str) as latest
                     FROM versions GROUP BY area ORDER BY count DESC",
                )
                .map_err(|e| e.to_string())?;
            let per_area = stmt
                .query_map([], |row| {
                    Ok(AreaCount {
                        area: row.get(0)?,
                        count: row.get(1)?,
                        latest: row.get(2)?,
                    })
                })
                .map_err(|e| e.to_string())?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| e.to_string())?;

            let mut stmt = conn
                .prepare("SELECT kind, COUNT(*) as count FROM versions GROUP BY kind")
                .map_err(|e| e.to_string())?;
            let per_kind = stmt
                .query_map([], |row| {
                    Ok(KindCount {
                        kind: row.get(0)?,
                        count: row.get(1)?,
                    })
                })
                .map_err(|e| e.to_string())?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| e.to_string())?;

            let most_recent = conn
                .query_row(
                    &format!("{SELECT_RECORD} ORDER BY created_at DESC LIMIT 1"),
                    [],
                    record_from_row,
                )
                .optional()
                .map_err(|e| e.to_string())?;

            Ok(RegistryStatistics {
                total_versions: total,
                total_areas: per_area.len() as u64,
                per_area,
                per_kind,
                most_recent,
            })
        })
        .await
    }

    /// Compare two versions of the same area
    pub async fn compare(
        &self,
        version_a: &str,
        version_b: &str,
    ) -> Result<VersionComparison, RegistryError> {
        let a = self
            .get_version(version_a)
            .await?
            .ok_or_else(|| RegistryError::VersionNotFound(version_a.to_string()))?;
        let b = self
            .get_version(version_b)
            .await?
            .ok_or_else(|| RegistryError::VersionNotFound(version_b.to_string()))?;

        if a.area != b.area {
            return Err(RegistryError::AreaMismatch(a.area, b.area));
        }

        Ok(VersionComparison {
            earlier: a.version_str.clone(),
            later: b.version_str.clone(),
            area: a.area,
            version_delta: format!("{}.{} → {}.{}", a.major, a.minor, b.major, b.minor),
            lesson_earlier: a.lesson_learned,
            lesson_later: b.lesson_learned,
            days_between: (b.created_at - a.created_at).num_days(),
        })
    }

    /// Administrative delete; superseding with a new version is preferred
    pub async fn delete_version(&self, version_str: &str) -> Result<bool, RegistryError> {
        let path = self.path.clone();
        let version_str = version_str.to_string();

        let deleted = run_sqlite(path, move |conn| {
            conn.execute("DELETE FROM versions WHERE version_str = ?", [&version_str])
                .map_err(|e| e.to_string())
        })
        .await?;

        debug!(deleted, "version delete requested");
        Ok(deleted > 0)
    }
}

const SELECT_RECORD: &str = "SELECT id, area, major, minor, version_str, kind, \
     created_at, incident_id, description, lesson_learned, keywords FROM versions";

fn record_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<VersionRecord> {
    let created_raw: String = row.get(6)?;
    let created_at = DateTime::parse_from_rfc3339(&created_raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
        })?;

    let keywords_raw: String = row.get(10)?;
    let keywords: Vec<String> = serde_json::from_str(&keywords_raw).unwrap_or_default();

    Ok(VersionRecord {
        id: row.get(0)?,
        area: row.get(1)?,
        major: row.get(2)?,
        minor: row.get(3)?,
        version_str: row.get(4)?,
        kind: row.get(5)?,
        created_at,
        incident_id: row.get(7)?,
        description: row.get(8)?,
        lesson_learned: row.get(9)?,
        keywords,
    })
}

/// Helper to run blocking SQLite operations on the blocking pool
async fn run_sqlite<T, F>(path: PathBuf, f: F) -> Result<T, RegistryError>
where
    F: FnOnce(&rusqlite::Connection) -> Result<T, String> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let conn = rusqlite::Connection::open(&path).map_err(|e| e.to_string())?;
        f(&conn)
    })
    .await
    .map_err(|e| RegistryError::Database(e.to_string()))?
    .map_err(RegistryError::Database)
}

//! SQLite connection setup and the ordered-SQL migration runner.
//!
//! The schema lives in `migrations/` as numbered SQL files. The current
//! schema version is tracked with `PRAGMA user_version`; on startup every
//! file with a prefix greater than the stored version is applied in order
//! and the pragma is bumped after each one.

use crate::error::{DbError, Result};
use anyhow::Context as _;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr as _;

/// Migration files compiled into the binary. The numeric prefix is the
/// schema version the file migrates to; keep the list sorted.
const MIGRATIONS: &[(i64, &str, &str)] = &[
    (1, "001_init.sql", include_str!("../migrations/001_init.sql")),
    (2, "002_search.sql", include_str!("../migrations/002_search.sql")),
];

/// Open the database, configure WAL + foreign keys, and apply migrations.
pub async fn connect(database_path: &str) -> Result<SqlitePool> {
    if let Some(parent) = std::path::Path::new(database_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create database directory {parent:?}"))?;
        }
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite://{database_path}"))
        .map_err(|e| DbError::Connect(e))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .map_err(DbError::Connect)?;

    apply_migrations(&pool).await?;
    Ok(pool)
}

/// Apply pending migrations under `PRAGMA user_version`.
pub async fn apply_migrations(pool: &SqlitePool) -> Result<()> {
    let current: i64 = sqlx::query_scalar("PRAGMA user_version")
        .fetch_one(pool)
        .await
        .context("failed to read schema version")?;

    for (version, name, sql) in MIGRATIONS {
        if *version <= current {
            continue;
        }

        tracing::info!(migration = %name, "applying migration");

        sqlx::raw_sql(sql)
            .execute(pool)
            .await
            .map_err(|e| DbError::Migration(format!("{name}: {e}")))?;

        sqlx::raw_sql(&format!("PRAGMA user_version = {version}"))
            .execute(pool)
            .await
            .map_err(|e| DbError::Migration(format!("{name}: failed to bump version: {e}")))?;
    }

    Ok(())
}

/// Render a UTC timestamp the way the store expects it: ISO-8601 with a
/// trailing `Z` and millisecond precision, so lexicographic order matches
/// chronological order.
pub fn format_utc(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Current time in store format.
pub fn now_utc_string() -> String {
    format_utc(Utc::now())
}

/// Parse a datetime string from the store or a REST body.
///
/// Accepts `…Z`, `…+00:00`, the degenerate `…+00:00Z` tail, and naive
/// datetimes (treated as UTC). Returns a UTC-aware datetime.
pub fn parse_db_datetime(raw: &str) -> Option<DateTime<Utc>> {
    let mut s = raw.trim().to_string();
    if s.is_empty() {
        return None;
    }

    if s.contains('+') && s.ends_with('Z') {
        s.pop();
    } else if let Some(stripped) = s.strip_suffix('Z') {
        s = format!("{stripped}+00:00");
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(&s) {
        return Some(dt.with_timezone(&Utc));
    }

    // Naive datetime with no offset: treat as UTC.
    NaiveDateTime::parse_from_str(&s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Migrated in-memory pool for tests. A single connection keeps the
/// `:memory:` database alive for the pool's lifetime.
#[cfg(test)]
pub(crate) async fn test_pool() -> SqlitePool {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .unwrap()
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .unwrap();

    apply_migrations(&pool).await.unwrap();
    pool
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone as _;

    #[tokio::test]
    async fn test_migrations_apply_and_are_idempotent() {
        let pool = test_pool().await;

        let version: i64 = sqlx::query_scalar("PRAGMA user_version")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(version, 2);

        // Re-running is a no-op.
        apply_migrations(&pool).await.unwrap();

        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();

        for expected in [
            "audit_log",
            "backup_metadata",
            "events",
            "llm_jobs",
            "memories",
            "memories_fts",
            "memories_fts_meta",
            "memory_tags",
            "reminders",
            "tasks",
            "user_settings",
            "users",
        ] {
            assert!(tables.iter().any(|t| t == expected), "missing table {expected}");
        }
    }

    #[tokio::test]
    async fn test_foreign_keys_enforced() {
        let pool = test_pool().await;

        let result = sqlx::query("INSERT INTO memories (id, owner_user_id, content) VALUES ('m1', 99999, 'x')")
            .execute(&pool)
            .await;
        assert!(result.is_err(), "owner FK should reject unknown user");
    }

    #[test]
    fn test_parse_db_datetime_tails() {
        let expected = Utc.with_ymd_and_hms(2026, 3, 1, 10, 30, 0).unwrap();

        assert_eq!(parse_db_datetime("2026-03-01T10:30:00Z"), Some(expected));
        assert_eq!(parse_db_datetime("2026-03-01T10:30:00+00:00"), Some(expected));
        assert_eq!(parse_db_datetime("2026-03-01T10:30:00+00:00Z"), Some(expected));
        assert_eq!(parse_db_datetime("2026-03-01T10:30:00"), Some(expected));
        assert_eq!(parse_db_datetime("2026-03-01T10:30:00.000Z"), Some(expected));
        assert_eq!(parse_db_datetime(""), None);
        assert_eq!(parse_db_datetime("not a date"), None);
    }

    #[test]
    fn test_format_utc_round_trips() {
        let dt = Utc.with_ymd_and_hms(2026, 8, 1, 7, 5, 9).unwrap();
        let rendered = format_utc(dt);
        assert_eq!(rendered, "2026-08-01T07:05:09.000Z");
        assert_eq!(parse_db_datetime(&rendered), Some(dt));
    }
}

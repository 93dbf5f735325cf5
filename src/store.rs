use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{Connection, OpenFlags, OptionalExtension, TransactionBehavior, params};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{DIMENSION_NAMES, ScoreBounds};
use crate::error::{RatingError, RatingResult};
use crate::model::{Rating, Scores};
use crate::util::{canonical_sample_id, now_utc_string};

const DB_SCHEMA_VERSION: &str = "1.0.0";
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RaterSummary {
    pub rater_id: String,
    pub ratings: i64,
    pub needs_review: i64,
    pub last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub rows_read: usize,
    pub rows_applied: usize,
    pub rows_skipped: usize,
    pub rows_flagged: usize,
}

/// SQLite-backed store holding one row per (sample, rater).
pub struct RatingStore {
    connection: Connection,
    bounds: ScoreBounds,
}

impl RatingStore {
    pub fn open(path: &Path, bounds: ScoreBounds) -> RatingResult<Self> {
        let connection = Connection::open(path)?;
        debug!(path = %path.display(), "opened rating store");
        Self::from_connection(connection, bounds)
    }

    #[cfg(test)]
    pub fn open_in_memory(bounds: ScoreBounds) -> RatingResult<Self> {
        Self::from_connection(Connection::open_in_memory()?, bounds)
    }

    /// Opens an existing store without migrating or touching it. Used for
    /// inspection; writes through this handle fail.
    pub fn open_read_only(path: &Path, bounds: ScoreBounds) -> RatingResult<Self> {
        let connection = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        connection.busy_timeout(BUSY_TIMEOUT)?;
        let columns = table_columns(&connection, "ratings")?;
        refuse_legacy_schema(&columns)?;
        if !columns.iter().any(|column| column == "needs_review") {
            return Err(RatingError::validation(format!(
                "{} holds no current ratings table",
                path.display()
            )));
        }
        Ok(Self { connection, bounds })
    }

    fn from_connection(connection: Connection, bounds: ScoreBounds) -> RatingResult<Self> {
        connection.busy_timeout(BUSY_TIMEOUT)?;
        refuse_legacy_schema(&table_columns(&connection, "ratings")?)?;
        configure_journal(&connection)?;
        ensure_schema(&connection)?;
        Ok(Self { connection, bounds })
    }

    pub fn bounds(&self) -> ScoreBounds {
        self.bounds
    }

    pub fn upsert(
        &mut self,
        sample_id: &str,
        rater_id: &str,
        scores: Scores,
    ) -> RatingResult<UpsertOutcome> {
        self.upsert_at(sample_id, rater_id, scores, Utc::now())
    }

    /// Validates, canonicalizes the sample id and writes in one immediate
    /// transaction. Nothing is written when validation fails.
    pub fn upsert_at(
        &mut self,
        sample_id: &str,
        rater_id: &str,
        scores: Scores,
        timestamp: DateTime<Utc>,
    ) -> RatingResult<UpsertOutcome> {
        let sample_id = canonical_sample_id(sample_id)?;
        let rater_id = validate_rater_id(rater_id)?;
        validate_scores(self.bounds, scores)?;

        let tx = self
            .connection
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let existing: Option<i64> = tx
            .query_row(
                "SELECT id FROM ratings WHERE sample_id = ?1 AND rater_id = ?2",
                params![&sample_id, rater_id],
                |row| row.get(0),
            )
            .optional()?;

        tx.execute(
            "
            INSERT INTO ratings(sample_id, rater_id, image_quality, text_quality, consistency, timestamp, needs_review)
            VALUES(?1, ?2, ?3, ?4, ?5, ?6, 0)
            ON CONFLICT(sample_id, rater_id) DO UPDATE SET
              image_quality=excluded.image_quality,
              text_quality=excluded.text_quality,
              consistency=excluded.consistency,
              timestamp=excluded.timestamp,
              needs_review=0
            ",
            params![
                &sample_id,
                rater_id,
                scores.image_quality,
                scores.text_quality,
                scores.consistency,
                timestamp
            ],
        )?;
        tx.commit()?;

        let outcome = if existing.is_some() {
            UpsertOutcome::Updated
        } else {
            UpsertOutcome::Inserted
        };
        debug!(sample_id = %sample_id, rater_id, outcome = ?outcome, "stored rating");
        Ok(outcome)
    }

    pub fn list_by_rater(&self, rater_id: &str) -> RatingResult<Vec<Rating>> {
        let mut statement = self.connection.prepare(
            "
            SELECT sample_id, rater_id, image_quality, text_quality, consistency, timestamp, needs_review
            FROM ratings
            WHERE rater_id = ?1
            ORDER BY sample_id
            ",
        )?;

        let rows = statement.query_map([rater_id.trim()], |row| {
            Ok(Rating {
                sample_id: row.get(0)?,
                rater_id: row.get(1)?,
                scores: Scores::new(row.get(2)?, row.get(3)?, row.get(4)?),
                timestamp: row.get(5)?,
                needs_review: row.get::<_, i64>(6)? != 0,
            })
        })?;

        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn list_raters(&self) -> RatingResult<Vec<RaterSummary>> {
        let mut statement = self.connection.prepare(
            "
            SELECT rater_id, COUNT(*), SUM(needs_review), MAX(timestamp)
            FROM ratings
            GROUP BY rater_id
            ORDER BY rater_id
            ",
        )?;

        let rows = statement.query_map([], |row| {
            Ok(RaterSummary {
                rater_id: row.get(0)?,
                ratings: row.get(1)?,
                needs_review: row.get::<_, Option<i64>>(2)?.unwrap_or(0),
                last_updated: row.get(3)?,
            })
        })?;

        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn count_ratings(&self) -> RatingResult<i64> {
        query_count(&self.connection, "SELECT COUNT(*) FROM ratings")
    }

    pub fn count_needs_review(&self) -> RatingResult<i64> {
        query_count(
            &self.connection,
            "SELECT COUNT(*) FROM ratings WHERE needs_review != 0",
        )
    }

    /// Rewrites every row of `rater_id` through `repair`, persisting and
    /// flagging only rows whose scores change. Returns the number changed.
    pub fn repair_rows(
        &mut self,
        rater_id: &str,
        repair: impl Fn(Scores) -> Scores,
    ) -> RatingResult<usize> {
        let tx = self
            .connection
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let rows = {
            let mut statement = tx.prepare(
                "SELECT id, image_quality, text_quality, consistency FROM ratings WHERE rater_id = ?1 ORDER BY id",
            )?;
            let rows = statement.query_map([rater_id.trim()], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    Scores::new(row.get(1)?, row.get(2)?, row.get(3)?),
                ))
            })?;
            rows.collect::<Result<Vec<_>, _>>()?
        };

        let mut repaired = 0_usize;
        {
            let mut update = tx.prepare(
                "
                UPDATE ratings
                SET image_quality = ?1, text_quality = ?2, consistency = ?3, needs_review = 1
                WHERE id = ?4
                ",
            )?;
            for (id, scores) in rows {
                let fixed = repair(scores);
                if fixed == scores {
                    continue;
                }
                update.execute(params![
                    fixed.image_quality,
                    fixed.text_quality,
                    fixed.consistency,
                    id
                ])?;
                repaired += 1;
            }
        }

        tx.commit()?;
        Ok(repaired)
    }

    /// Explicit destructive reset: drops every rating and recreates the schema.
    pub fn reset(&mut self) -> RatingResult<i64> {
        let dropped = self.count_ratings()?;
        self.connection.execute_batch("DROP TABLE IF EXISTS ratings;")?;
        ensure_schema(&self.connection)?;
        warn!(dropped, "rating store reset");
        Ok(dropped)
    }

    /// Copies rows from a database written by the earlier service, whose
    /// `ratings` table keyed samples by a free-form `image_id` and allowed
    /// duplicates. Later rows win; out-of-bound values are kept as-is and
    /// flagged for review rather than reinterpreted.
    pub fn import_legacy(&mut self, legacy_path: &Path) -> RatingResult<ImportSummary> {
        let legacy = Connection::open_with_flags(legacy_path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        let columns = table_columns(&legacy, "ratings")?;
        for required in ["image_id", "rater_id"].iter().chain(DIMENSION_NAMES.iter()) {
            if !columns.iter().any(|column| column == required) {
                return Err(RatingError::validation(format!(
                    "legacy database {} has no ratings.{required} column",
                    legacy_path.display()
                )));
            }
        }
        let timestamp_column = if columns.iter().any(|column| column == "timestamp") {
            "timestamp"
        } else {
            "NULL"
        };

        let legacy_rows = {
            let sql = format!(
                "SELECT image_id, rater_id, image_quality, text_quality, consistency, {timestamp_column} FROM ratings ORDER BY rowid"
            );
            let mut statement = legacy.prepare(&sql)?;
            let rows = statement.query_map([], |row| {
                Ok(LegacyRow {
                    image_id: row.get(0)?,
                    rater_id: row.get(1)?,
                    scores: [row.get(2)?, row.get(3)?, row.get(4)?],
                    timestamp: row.get(5)?,
                })
            })?;
            rows.collect::<Result<Vec<_>, _>>()?
        };

        let imported_at = Utc::now();
        let mut summary = ImportSummary::default();
        let tx = self
            .connection
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        {
            let mut statement = tx.prepare(
                "
                INSERT INTO ratings(sample_id, rater_id, image_quality, text_quality, consistency, timestamp, needs_review)
                VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ON CONFLICT(sample_id, rater_id) DO UPDATE SET
                  image_quality=excluded.image_quality,
                  text_quality=excluded.text_quality,
                  consistency=excluded.consistency,
                  timestamp=excluded.timestamp,
                  needs_review=excluded.needs_review
                WHERE excluded.timestamp >= ratings.timestamp
                ",
            )?;

            for row in legacy_rows {
                summary.rows_read += 1;

                let sample_id = row.image_id.as_deref().map(canonical_sample_id);
                let rater_id = row.rater_id.as_deref().map(validate_rater_id);
                let (Some(Ok(sample_id)), Some(Ok(rater_id))) = (sample_id, rater_id) else {
                    warn!(image_id = ?row.image_id, rater_id = ?row.rater_id, "skipping legacy row without usable ids");
                    summary.rows_skipped += 1;
                    continue;
                };

                let scores = Scores::new(
                    row.scores[0].unwrap_or(0),
                    row.scores[1].unwrap_or(0),
                    row.scores[2].unwrap_or(0),
                );
                let needs_review = validate_scores(self.bounds, scores).is_err();
                let timestamp = row
                    .timestamp
                    .as_deref()
                    .and_then(parse_legacy_timestamp)
                    .unwrap_or(imported_at);

                let changed = statement.execute(params![
                    &sample_id,
                    rater_id,
                    scores.image_quality,
                    scores.text_quality,
                    scores.consistency,
                    timestamp,
                    needs_review
                ])?;
                if changed > 0 {
                    summary.rows_applied += 1;
                    if needs_review {
                        summary.rows_flagged += 1;
                    }
                }
            }
        }
        tx.commit()?;

        info!(
            path = %legacy_path.display(),
            rows_read = summary.rows_read,
            rows_applied = summary.rows_applied,
            rows_skipped = summary.rows_skipped,
            rows_flagged = summary.rows_flagged,
            "imported legacy ratings"
        );
        Ok(summary)
    }
}

struct LegacyRow {
    image_id: Option<String>,
    rater_id: Option<String>,
    scores: [Option<i64>; 3],
    timestamp: Option<String>,
}

pub fn validate_scores(bounds: ScoreBounds, scores: Scores) -> RatingResult<()> {
    for (name, value) in scores.named() {
        if !bounds.contains(value) {
            return Err(RatingError::validation(format!(
                "{name} must be between {} and {}, got {value}",
                bounds.min, bounds.max
            )));
        }
    }
    Ok(())
}

pub fn validate_rater_id(rater_id: &str) -> RatingResult<&str> {
    let trimmed = rater_id.trim();
    if trimmed.is_empty() {
        return Err(RatingError::validation("rater_id must not be empty"));
    }
    if trimmed.chars().any(char::is_control) {
        return Err(RatingError::validation(
            "rater_id must not contain control characters",
        ));
    }
    Ok(trimmed)
}

fn parse_legacy_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
}

fn configure_journal(connection: &Connection) -> RatingResult<()> {
    connection.pragma_update(None, "journal_mode", "WAL")?;
    connection.pragma_update(None, "synchronous", "NORMAL")?;
    Ok(())
}

/// A `ratings` table keyed by `image_id` was written by the earlier service.
/// It must be refused before anything on the connection changes the file.
fn refuse_legacy_schema(columns: &[String]) -> RatingResult<()> {
    if columns.iter().any(|column| column == "image_id")
        && !columns.iter().any(|column| column == "sample_id")
    {
        return Err(RatingError::validation(
            "database holds a legacy ratings table; import it into a fresh store with import-legacy",
        ));
    }
    Ok(())
}

fn ensure_schema(connection: &Connection) -> RatingResult<()> {
    connection.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS metadata (
          key TEXT PRIMARY KEY,
          value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS ratings (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          sample_id TEXT NOT NULL,
          rater_id TEXT NOT NULL,
          image_quality INTEGER NOT NULL,
          text_quality INTEGER NOT NULL,
          consistency INTEGER NOT NULL,
          timestamp TEXT NOT NULL
        );
        ",
    )?;

    ensure_column_exists(connection, "ratings", "needs_review INTEGER NOT NULL DEFAULT 0")?;

    connection.execute_batch(
        "
        CREATE UNIQUE INDEX IF NOT EXISTS idx_ratings_sample_rater ON ratings(sample_id, rater_id);
        CREATE INDEX IF NOT EXISTS idx_ratings_rater ON ratings(rater_id);
        ",
    )?;

    let now = now_utc_string();
    connection.execute(
        "INSERT INTO metadata(key, value) VALUES('db_schema_version', ?1)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        [DB_SCHEMA_VERSION],
    )?;
    connection.execute(
        "INSERT INTO metadata(key, value) VALUES('db_updated_at', ?1)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        [now],
    )?;

    Ok(())
}

fn table_columns(connection: &Connection, table_name: &str) -> RatingResult<Vec<String>> {
    let pragma_sql = format!("PRAGMA table_info({table_name})");
    let mut statement = connection.prepare(&pragma_sql)?;
    let names = statement.query_map([], |row| row.get::<_, String>(1))?;
    Ok(names.collect::<Result<Vec<_>, _>>()?)
}

fn ensure_column_exists(
    connection: &Connection,
    table_name: &str,
    column_definition: &str,
) -> RatingResult<()> {
    let Some(column_name) = column_definition.split_whitespace().next() else {
        return Err(RatingError::validation(format!(
            "invalid column definition: {column_definition}"
        )));
    };

    if table_columns(connection, table_name)?
        .iter()
        .any(|existing| existing == column_name)
    {
        return Ok(());
    }

    let alter_sql = format!("ALTER TABLE {table_name} ADD COLUMN {column_definition}");
    connection.execute(&alter_sql, [])?;
    info!(table = table_name, column = column_name, "added missing column");
    Ok(())
}

fn query_count(connection: &Connection, sql: &str) -> RatingResult<i64> {
    Ok(connection.query_row(sql, [], |row| row.get(0))?)
}

#[cfg(test)]
mod tests;

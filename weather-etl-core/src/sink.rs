use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, params, types::Type};
use std::{fs, path::Path};
use tracing::{debug, info};

use crate::{
    error::SinkError,
    model::{StoredObservation, WeatherRecord},
};

pub const TABLE: &str = "weather_observations";

/// Longest description stored; longer provider text is cut.
pub const MAX_DESCRIPTION_CHARS: usize = 100;

/// Destination for collected records.
pub trait Sink {
    /// Create the destination table if it does not exist yet. Safe to call every run.
    fn ensure_schema(&mut self) -> Result<(), SinkError>;

    /// Append `records` in one transaction and return how many rows were written.
    ///
    /// An empty slice performs no write at all.
    fn append(&mut self, records: &[WeatherRecord]) -> Result<usize, SinkError>;
}

/// SQLite-backed observation table.
pub struct SqliteSink {
    conn: Connection,
}

impl SqliteSink {
    /// Open (or create) the database file, creating its directory if needed.
    pub fn open(path: &Path) -> Result<Self, SinkError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| SinkError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        debug!(path = %path.display(), "opening observation database");
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, SinkError> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }

    /// Rows observed at or after `since`, newest first.
    pub fn observations_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<StoredObservation>, SinkError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, city, observed_at, temperature, humidity, pressure, wind_speed, description
             FROM weather_observations
             WHERE observed_at >= ?1
             ORDER BY observed_at DESC, id DESC",
        )?;

        let rows = stmt
            .query_map([format_timestamp(since)], |row| {
                let observed_at: String = row.get(2)?;
                let observed_at = DateTime::parse_from_rfc3339(&observed_at)
                    .map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e))
                    })?
                    .with_timezone(&Utc);

                Ok(StoredObservation {
                    id: row.get(0)?,
                    record: WeatherRecord::new(
                        row.get::<_, String>(1)?,
                        observed_at,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                        row.get(6)?,
                        row.get::<_, String>(7)?,
                    ),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }
}

impl Sink for SqliteSink {
    fn ensure_schema(&mut self) -> Result<(), SinkError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS weather_observations (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                city        TEXT    NOT NULL,
                observed_at TEXT    NOT NULL,   -- RFC 3339 UTC, fixed width
                temperature REAL    NOT NULL,
                humidity    REAL    NOT NULL,
                pressure    REAL    NOT NULL,
                wind_speed  REAL    NOT NULL,
                description TEXT    NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_weather_observations_observed_at
                ON weather_observations (observed_at);
            ",
        )?;
        Ok(())
    }

    fn append(&mut self, records: &[WeatherRecord]) -> Result<usize, SinkError> {
        if records.is_empty() {
            debug!("no records to append");
            return Ok(0);
        }

        // Dropping the transaction without commit rolls it back.
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO weather_observations
                 (city, observed_at, temperature, humidity, pressure, wind_speed, description)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for r in records {
                stmt.execute(params![
                    r.city(),
                    format_timestamp(r.observed_at()),
                    r.temperature(),
                    r.humidity(),
                    r.pressure(),
                    r.wind_speed(),
                    truncate_description(r.description()),
                ])?;
            }
        }
        tx.commit()?;

        info!(rows = records.len(), table = TABLE, "appended observations");
        Ok(records.len())
    }
}

/// Fixed-width UTC timestamp so that text order equals time order.
fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn truncate_description(description: &str) -> &str {
    match description.char_indices().nth(MAX_DESCRIPTION_CHARS) {
        Some((idx, _)) => &description[..idx],
        None => description,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn record(city: &str, observed_at: DateTime<Utc>) -> WeatherRecord {
        WeatherRecord::new(city, observed_at, 12.5, 80.0, 1009.0, 4.2, "light rain")
    }

    fn sink() -> SqliteSink {
        let mut sink = SqliteSink::open_in_memory().unwrap();
        sink.ensure_schema().unwrap();
        sink
    }

    fn total_changes(sink: &SqliteSink) -> i64 {
        sink.conn.query_row("SELECT total_changes()", [], |row| row.get(0)).unwrap()
    }

    #[test]
    fn ensure_schema_is_idempotent() {
        let mut sink = sink();
        sink.ensure_schema().unwrap();

        let tables: i64 = sink
            .conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [TABLE],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 1);

        let indexes: i64 = sink
            .conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND tbl_name = ?1",
                [TABLE],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(indexes, 1);
    }

    #[test]
    fn empty_append_writes_nothing() {
        let mut sink = sink();
        let before = total_changes(&sink);

        assert_eq!(sink.append(&[]).unwrap(), 0);
        assert_eq!(total_changes(&sink), before);
    }

    #[test]
    fn append_then_read_back_newest_first() {
        let mut sink = sink();
        let t0 = Utc.with_ymd_and_hms(2026, 10, 1, 12, 0, 0).unwrap();
        sink.append(&[record("London", t0), record("Tokyo", t0 + Duration::hours(1))]).unwrap();

        let rows = sink.observations_since(t0 - Duration::days(1)).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].record.city(), "Tokyo");
        assert_eq!(rows[1].record, record("London", t0));
        assert!(rows[0].id > rows[1].id);
    }

    #[test]
    fn observations_since_excludes_older_rows() {
        let mut sink = sink();
        let now = Utc::now();
        sink.append(&[record("London", now - Duration::days(31)), record("Tokyo", now)]).unwrap();

        let rows = sink.observations_since(now - Duration::days(30)).unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].record.city(), "Tokyo");
    }

    #[test]
    fn reappending_adds_new_rows() {
        let mut sink = sink();
        let now = Utc::now();
        sink.append(&[record("London", now)]).unwrap();
        sink.append(&[record("London", now + Duration::hours(1))]).unwrap();

        assert_eq!(sink.observations_since(now).unwrap().len(), 2);
    }

    #[test]
    fn long_descriptions_are_truncated() {
        let mut sink = sink();
        let now = Utc::now();
        let long = WeatherRecord::new("Oslo", now, 1.0, 2.0, 3.0, 4.0, "x".repeat(150));
        sink.append(&[long]).unwrap();

        let rows = sink.observations_since(now).unwrap();
        assert_eq!(rows[0].record.description().len(), MAX_DESCRIPTION_CHARS);
    }

    #[test]
    fn append_without_schema_fails() {
        let mut sink = SqliteSink::open_in_memory().unwrap();
        let err = sink.append(&[record("London", Utc::now())]).unwrap_err();
        assert!(matches!(err, SinkError::Database(_)));
    }

    #[test]
    fn open_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("weather.db");

        let mut sink = SqliteSink::open(&path).unwrap();
        sink.ensure_schema().unwrap();
        sink.append(&[record("London", Utc::now())]).unwrap();
        drop(sink);

        let reopened = SqliteSink::open(&path).unwrap();
        assert_eq!(reopened.observations_since(Utc::now() - Duration::hours(1)).unwrap().len(), 1);
    }
}

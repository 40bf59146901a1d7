//! SQLite-backed catalog store
use super::{normalize_title_key, Candidate, CatalogStore, MatchKey, SourceTag, Title};
use crate::error::StoreError;
use crate::ingest::normalize::parse_release_date;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

const SELECT_COLUMNS: &str = "id, title, media_type, year, description, release_date, rating, \
                              source, source_url, external_id, updated_at";

/// Catalog table in a SQLite database file
///
/// The connection lives behind a mutex and every call runs on the blocking pool, so a
/// slow disk never stalls the async runtime.
#[derive(Clone)]
pub struct SqliteCatalogStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCatalogStore {
    /// Open (or create) the catalog database at `path`
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::Unavailable(format!("{}: {}", parent.display(), e)))?;
            }
        }
        let conn = Connection::open(path)?;
        info!("📀 Opened catalog database: {}", path.display());
        Self::from_connection(conn)
    }

    /// Private in-memory database
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        initialize_schema(&conn)?;
        migrate(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| StoreError::Unavailable("catalog connection poisoned".to_string()))?;
            f(&guard)
        })
        .await?
    }
}

fn initialize_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS catalog_titles (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            title_key TEXT,
            media_type TEXT NOT NULL,
            year INTEGER,
            description TEXT,
            release_date TEXT,
            rating REAL,
            source TEXT NOT NULL,
            source_url TEXT,
            external_id TEXT,
            updated_at TEXT
        )",
        [],
    )?;
    Ok(())
}

/// Bring databases written by older releases up to the current columns
fn migrate(conn: &Connection) -> Result<(), StoreError> {
    let mut stmt = conn.prepare("PRAGMA table_info(catalog_titles)")?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<Vec<_>, _>>()?;

    for (column, ddl) in [
        ("title_key", "TEXT"),
        ("description", "TEXT"),
        ("release_date", "TEXT"),
        ("rating", "REAL"),
        ("source_url", "TEXT"),
        ("external_id", "TEXT"),
        ("updated_at", "TEXT"),
    ] {
        if !columns.iter().any(|c| c == column) {
            info!("🔧 Adding column catalog_titles.{}", column);
            conn.execute(&format!("ALTER TABLE catalog_titles ADD COLUMN {} {}", column, ddl), [])?;
        }
    }

    // Older rows carry no key; derive it in Rust so it matches lookups exactly
    let mut stmt = conn.prepare("SELECT id, title FROM catalog_titles WHERE title_key IS NULL")?;
    let missing = stmt
        .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    if !missing.is_empty() {
        info!("🔧 Backfilling title keys for {} rows", missing.len());
        for (id, title) in missing {
            conn.execute(
                "UPDATE catalog_titles SET title_key = ?1 WHERE id = ?2",
                params![normalize_title_key(&title), id],
            )?;
        }
    }
    conn.execute(
        "UPDATE catalog_titles SET updated_at = ?1 WHERE updated_at IS NULL",
        params![Utc::now().to_rfc3339()],
    )?;
    migrate_release_dates(conn)?;

    let unique = conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_catalog_titles_match_key
         ON catalog_titles (title_key, media_type, IFNULL(year, -1))",
        [],
    );
    if let Err(e) = unique {
        // Duplicates left by earlier merges; lookups still work, repair is out of band
        warn!("Catalog has duplicate match keys, using non-unique index: {}", e);
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_catalog_titles_match_key_loose
             ON catalog_titles (title_key, media_type, year)",
            [],
        )?;
    }
    Ok(())
}

/// Rewrite free-text release dates ("March 22, 2024") as ISO dates
///
/// Text that still does not parse is left in place; reads treat it as unknown and
/// updates never overwrite it with NULL.
fn migrate_release_dates(conn: &Connection) -> Result<(), StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, CAST(release_date AS TEXT), year FROM catalog_titles WHERE release_date IS NOT NULL",
    )?;
    let stored = stmt
        .query_map([], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?, row.get::<_, Option<i32>>(2)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut rewritten = 0;
    for (id, text, year) in stored {
        if parse_stored_date(Some(text.clone())).is_some() {
            continue;
        }
        match parse_release_date(&text, year) {
            Some(date) => {
                conn.execute(
                    "UPDATE catalog_titles SET release_date = ?1 WHERE id = ?2",
                    params![date.format("%Y-%m-%d").to_string(), id],
                )?;
                rewritten += 1;
            }
            None => debug!("Keeping unparseable release date {:?} on row {}", text, id),
        }
    }
    if rewritten > 0 {
        info!("🔧 Normalized {} legacy release dates", rewritten);
    }
    Ok(())
}

fn parse_stored_date(text: Option<String>) -> Option<NaiveDate> {
    text.and_then(|t| NaiveDate::parse_from_str(&t, "%Y-%m-%d").ok())
}

fn parse_stored_timestamp(text: Option<String>) -> DateTime<Utc> {
    text.and_then(|t| DateTime::parse_from_rfc3339(&t).ok())
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
}

fn row_to_title(row: &Row<'_>) -> rusqlite::Result<Title> {
    let media: String = row.get(2)?;
    let source: String = row.get(7)?;
    Ok(Title {
        id: row.get(0)?,
        title: row.get(1)?,
        media_type: media.parse().map_err(|e: String| {
            rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, e.into())
        })?,
        year: row.get(3)?,
        description: row.get(4)?,
        release_date: parse_stored_date(row.get(5)?),
        rating: row.get(6)?,
        source: SourceTag::from_stored(&source),
        source_url: row.get(8)?,
        external_id: row.get(9)?,
        updated_at: parse_stored_timestamp(row.get(10)?),
    })
}

fn map_constraint(err: rusqlite::Error, key: &MatchKey) -> StoreError {
    match &err {
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation => {
            StoreError::Conflict(key.to_string())
        }
        _ => StoreError::Sqlite(err),
    }
}

fn escape_like(query: &str) -> String {
    query
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[async_trait]
impl CatalogStore for SqliteCatalogStore {
    async fn lookup_by_key(&self, key: &MatchKey) -> Result<Option<Title>, StoreError> {
        let key = key.clone();
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {} FROM catalog_titles
                 WHERE title_key = ?1 AND media_type = ?2 AND year IS ?3
                 ORDER BY id LIMIT 1",
                SELECT_COLUMNS
            );
            let title = conn
                .query_row(&sql, params![key.title_key, key.media_type.as_str(), key.year], row_to_title)
                .optional()?;
            Ok(title)
        })
        .await
    }

    async fn insert(&self, candidate: Candidate) -> Result<Title, StoreError> {
        self.with_conn(move |conn| {
            let key = candidate.match_key();
            let now = Utc::now();
            conn.execute(
                "INSERT INTO catalog_titles
                 (title, title_key, media_type, year, description, release_date, rating,
                  source, source_url, external_id, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    candidate.title,
                    key.title_key,
                    candidate.media_type.as_str(),
                    candidate.year,
                    candidate.description,
                    candidate.release_date.map(|d| d.format("%Y-%m-%d").to_string()),
                    candidate.rating,
                    candidate.source.as_str(),
                    candidate.source_url,
                    candidate.external_id,
                    now.to_rfc3339(),
                ],
            )
            .map_err(|e| map_constraint(e, &key))?;

            let id = conn.last_insert_rowid();
            debug!("Inserted catalog row {}: {}", id, candidate.title);
            Ok(Title::from_candidate(id, candidate, now))
        })
        .await
    }

    /// Rewrite every column of the row with `title.id`
    ///
    /// A missing release date or an `Unknown` source keeps whatever the column holds, so
    /// legacy values this build cannot read back survive.
    async fn update(&self, title: Title) -> Result<Title, StoreError> {
        self.with_conn(move |conn| {
            let key = title.match_key();
            let changed = conn
                .execute(
                    "UPDATE catalog_titles SET
                        title = ?1, title_key = ?2, media_type = ?3, year = ?4,
                        description = ?5, release_date = COALESCE(?6, release_date),
                        rating = ?7, source = COALESCE(?8, source),
                        source_url = ?9, external_id = ?10, updated_at = ?11
                     WHERE id = ?12",
                    params![
                        title.title,
                        key.title_key,
                        title.media_type.as_str(),
                        title.year,
                        title.description,
                        title.release_date.map(|d| d.format("%Y-%m-%d").to_string()),
                        title.rating,
                        (title.source != SourceTag::Unknown).then(|| title.source.as_str()),
                        title.source_url,
                        title.external_id,
                        title.updated_at.to_rfc3339(),
                        title.id,
                    ],
                )
                .map_err(|e| map_constraint(e, &key))?;

            if changed == 0 {
                return Err(StoreError::NotFound(title.id));
            }
            Ok(title)
        })
        .await
    }

    async fn list_all(&self) -> Result<Vec<Title>, StoreError> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM catalog_titles ORDER BY title COLLATE NOCASE, id",
                SELECT_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([], row_to_title)?.collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Title>, StoreError> {
        let needle = query.trim().to_string();
        if needle.is_empty() {
            return Ok(Vec::new());
        }
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {} FROM catalog_titles
                 WHERE title LIKE '%' || ?1 || '%' ESCAPE '\\'
                 ORDER BY title COLLATE NOCASE, id LIMIT ?2",
                SELECT_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![escape_like(&needle), limit as i64], row_to_title)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    async fn count(&self) -> Result<usize, StoreError> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM catalog_titles", [], |r| r.get(0))?;
            Ok(count as usize)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MediaType;
    use tempfile::TempDir;

    fn legacy_connection() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute(
            "CREATE TABLE catalog_titles (
                id INTEGER PRIMARY KEY,
                title TEXT NOT NULL,
                media_type TEXT NOT NULL,
                year INTEGER,
                source TEXT NOT NULL,
                source_url TEXT,
                external_id TEXT,
                release_date TEXT
            )",
            [],
        )
        .unwrap();
        conn
    }

    fn dune() -> Candidate {
        let mut candidate = Candidate::new("Dune", MediaType::Movie, Some(2021), SourceTag::Wikipedia);
        candidate.release_date = NaiveDate::from_ymd_opt(2021, 10, 22);
        candidate
    }

    #[tokio::test]
    async fn test_insert_and_lookup_round_trip() {
        let store = SqliteCatalogStore::open_in_memory().unwrap();
        let inserted = store.insert(dune()).await.unwrap();

        let found = store
            .lookup_by_key(&MatchKey::new("DUNE", Some(2021), MediaType::Movie))
            .await
            .unwrap()
            .expect("row present");
        assert_eq!(found.id, inserted.id);
        assert_eq!(found.release_date, NaiveDate::from_ymd_opt(2021, 10, 22));
        assert_eq!(found.source, SourceTag::Wikipedia);
    }

    #[tokio::test]
    async fn test_null_year_matches_only_null_year() {
        let store = SqliteCatalogStore::open_in_memory().unwrap();
        store
            .insert(Candidate::new("Heat", MediaType::Movie, None, SourceTag::Imdb))
            .await
            .unwrap();

        let strict = store
            .lookup_by_key(&MatchKey::new("Heat", Some(1995), MediaType::Movie))
            .await
            .unwrap();
        assert!(strict.is_none());

        let null = store
            .lookup_by_key(&MatchKey::new("Heat", None, MediaType::Movie))
            .await
            .unwrap();
        assert!(null.is_some());

        let dup = store
            .insert(Candidate::new("heat", MediaType::Movie, None, SourceTag::Tmdb))
            .await;
        assert!(matches!(dup, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_update_persists_fields() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("catalog.db");
        let store = SqliteCatalogStore::open(&path).unwrap();

        let mut row = store.insert(dune()).await.unwrap();
        row.description = Some("A noble family...".to_string());
        row.rating = Some(8.1);
        row.source = SourceTag::Imdb;
        store.update(row.clone()).await.unwrap();

        let reopened = SqliteCatalogStore::open(&path).unwrap();
        let rows = reopened.list_all().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].description.as_deref(), Some("A noble family..."));
        assert_eq!(rows[0].rating, Some(8.1));
        assert_eq!(rows[0].source, SourceTag::Imdb);
    }

    #[tokio::test]
    async fn test_search_escapes_wildcards() {
        let store = SqliteCatalogStore::open_in_memory().unwrap();
        for name in ["100% Wolf", "Wolfwalkers", "The Wolf of Wall Street"] {
            store
                .insert(Candidate::new(name, MediaType::Movie, None, SourceTag::Wikipedia))
                .await
                .unwrap();
        }

        let all = store.search("wolf", 8).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].title, "100% Wolf");

        let literal = store.search("0% w", 8).await.unwrap();
        assert_eq!(literal.len(), 1);
        assert_eq!(store.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_migrates_legacy_table() {
        let conn = legacy_connection();
        conn.execute(
            "INSERT INTO catalog_titles (title, media_type, year, source) VALUES ('Arrival', 'movie', 2016, 'wikipedia')",
            [],
        )
        .unwrap();

        let store = SqliteCatalogStore::from_connection(conn).unwrap();
        let found = store
            .lookup_by_key(&MatchKey::new("arrival", Some(2016), MediaType::Movie))
            .await
            .unwrap()
            .expect("legacy row keyed");
        assert!(found.description.is_none());
        assert!(found.rating.is_none());
    }

    #[tokio::test]
    async fn test_legacy_text_release_dates_survive_updates() {
        let conn = legacy_connection();
        conn.execute(
            "INSERT INTO catalog_titles (title, media_type, year, source, release_date) VALUES
             ('Road House', 'movie', 2024, 'wikipedia', 'March 22, 2024'),
             ('Blade Runner 2099', 'series', NULL, 'wikipedia', 'TBA')",
            [],
        )
        .unwrap();
        let store = SqliteCatalogStore::from_connection(conn).unwrap();

        let mut road_house = store
            .lookup_by_key(&MatchKey::new("Road House", Some(2024), MediaType::Movie))
            .await
            .unwrap()
            .expect("legacy row keyed");
        assert_eq!(road_house.release_date, NaiveDate::from_ymd_opt(2024, 3, 22));

        road_house.description = Some("An ex-UFC fighter takes a job as a bouncer.".to_string());
        store.update(road_house).await.unwrap();

        let mut blade_runner = store
            .lookup_by_key(&MatchKey::new("Blade Runner 2099", None, MediaType::Series))
            .await
            .unwrap()
            .expect("legacy row keyed");
        assert!(blade_runner.release_date.is_none());
        blade_runner.rating = Some(7.0);
        store.update(blade_runner).await.unwrap();

        let rows = store.list_all().await.unwrap();
        assert_eq!(rows[1].title, "Road House");
        assert_eq!(rows[1].release_date, NaiveDate::from_ymd_opt(2024, 3, 22));
        assert!(rows[1].description.is_some());

        let conn = store.conn.lock().unwrap();
        let raw: String = conn
            .query_row(
                "SELECT release_date FROM catalog_titles WHERE title = 'Blade Runner 2099'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(raw, "TBA");
    }

    #[tokio::test]
    async fn test_rows_from_retired_sources_stay_readable() {
        let conn = legacy_connection();
        conn.execute(
            "INSERT INTO catalog_titles (title, media_type, year, source) VALUES
             ('Heat', 'movie', 1995, 'omdb'),
             ('Ronin', 'movie', 1998, 'imdb_placeholder')",
            [],
        )
        .unwrap();
        let store = SqliteCatalogStore::from_connection(conn).unwrap();

        let rows = store.list_all().await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].source, SourceTag::Omdb);
        assert_eq!(rows[1].source, SourceTag::Unknown);

        let mut ronin = rows[1].clone();
        ronin.description = Some("A team of mercenaries chases a briefcase.".to_string());
        store.update(ronin).await.unwrap();
        assert_eq!(store.search("ronin", 8).await.unwrap()[0].source, SourceTag::Unknown);

        let conn = store.conn.lock().unwrap();
        let raw: String = conn
            .query_row("SELECT source FROM catalog_titles WHERE title = 'Ronin'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(raw, "imdb_placeholder");
    }
}

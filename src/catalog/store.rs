//! Catalog store interface and in-memory implementation
use super::{Candidate, MatchKey, Title};
use crate::error::StoreError;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Row store the engine reads and writes through
///
/// Implementations do not enforce merge policy; they only persist what they are given.
/// Each call is one unit of work: a row is either fully written or not written.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Find the row with exactly this match key
    async fn lookup_by_key(&self, key: &MatchKey) -> Result<Option<Title>, StoreError>;

    /// Insert a new row, assigning id and timestamp
    async fn insert(&self, candidate: Candidate) -> Result<Title, StoreError>;

    /// Overwrite an existing row by id
    async fn update(&self, title: Title) -> Result<Title, StoreError>;

    /// All rows ordered by title
    async fn list_all(&self) -> Result<Vec<Title>, StoreError>;

    /// Case-insensitive substring match on the display title, ordered by title
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Title>, StoreError>;

    /// Number of rows; also serves as a reachability probe
    async fn count(&self) -> Result<usize, StoreError>;
}

#[derive(Debug, Default)]
struct MemoryState {
    next_id: i64,
    rows: BTreeMap<i64, Title>,
    keys: HashMap<MatchKey, i64>,
}

/// In-memory catalog, used by tests and dry runs
#[derive(Debug, Clone, Default)]
pub struct MemoryCatalogStore {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn sort_by_title(rows: &mut [Title]) {
    rows.sort_by(|a, b| {
        a.title
            .to_lowercase()
            .cmp(&b.title.to_lowercase())
            .then(a.id.cmp(&b.id))
    });
}

#[async_trait]
impl CatalogStore for MemoryCatalogStore {
    async fn lookup_by_key(&self, key: &MatchKey) -> Result<Option<Title>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .keys
            .get(key)
            .and_then(|id| state.rows.get(id))
            .cloned())
    }

    async fn insert(&self, candidate: Candidate) -> Result<Title, StoreError> {
        let key = candidate.match_key();
        let mut state = self.state.write().await;
        if state.keys.contains_key(&key) {
            return Err(StoreError::Conflict(key.to_string()));
        }

        state.next_id += 1;
        let id = state.next_id;
        let title = Title::from_candidate(id, candidate, Utc::now());
        state.keys.insert(key, id);
        state.rows.insert(id, title.clone());
        debug!("Inserted catalog row {}: {}", id, title.title);
        Ok(title)
    }

    async fn update(&self, title: Title) -> Result<Title, StoreError> {
        let mut state = self.state.write().await;
        let old_key = match state.rows.get(&title.id) {
            Some(existing) => existing.match_key(),
            None => return Err(StoreError::NotFound(title.id)),
        };

        let new_key = title.match_key();
        if new_key != old_key {
            if state.keys.contains_key(&new_key) {
                return Err(StoreError::Conflict(new_key.to_string()));
            }
            state.keys.remove(&old_key);
            state.keys.insert(new_key, title.id);
        }

        state.rows.insert(title.id, title.clone());
        Ok(title)
    }

    async fn list_all(&self) -> Result<Vec<Title>, StoreError> {
        let state = self.state.read().await;
        let mut rows: Vec<Title> = state.rows.values().cloned().collect();
        sort_by_title(&mut rows);
        Ok(rows)
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Title>, StoreError> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }

        let state = self.state.read().await;
        let mut rows: Vec<Title> = state
            .rows
            .values()
            .filter(|row| row.title.to_lowercase().contains(&needle))
            .cloned()
            .collect();
        sort_by_title(&mut rows);
        rows.truncate(limit);
        Ok(rows)
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.state.read().await.rows.len())
    }
}

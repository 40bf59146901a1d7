//! Normalize → match → merge pipeline for a single candidate
//!
//! Each stage is usable on its own; `upsert` chains matching and merging against a store
//! and performs at most one write.

pub mod matcher;
pub mod merge;
pub mod normalize;

pub use matcher::find_match;
pub use merge::{merge, MergeOutcome};
pub use normalize::{normalize, RatingScale};

use crate::catalog::{Candidate, CatalogStore, Title};
use crate::error::StoreError;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// What an upsert did to the catalog
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UpsertAction {
    Added,
    Updated,
    Unchanged,
}

/// Match a candidate against the store and write the merged result
///
/// Unchanged rows are not written back.
pub async fn upsert(store: &dyn CatalogStore, candidate: Candidate) -> Result<(Title, UpsertAction), StoreError> {
    let existing = find_match(store, &candidate).await?;

    match merge(existing, candidate, Utc::now()) {
        MergeOutcome::Insert(candidate) => {
            let row = store.insert(candidate).await?;
            debug!("➕ Added '{}' ({})", row.title, row.match_key());
            Ok((row, UpsertAction::Added))
        }
        MergeOutcome::Update(row) => {
            let row = store.update(row).await?;
            debug!("✏️ Updated '{}' from {}", row.title, row.source);
            Ok((row, UpsertAction::Updated))
        }
        MergeOutcome::Unchanged(row) => Ok((row, UpsertAction::Unchanged)),
    }
}

//! Candidate → existing catalog row matching
use crate::catalog::{Candidate, CatalogStore, Title};
use crate::error::StoreError;
use tracing::debug;

/// Find the catalog row a candidate refers to, if any
///
/// The key is (normalized title, year, media type). A candidate without a year only
/// matches rows without a year: loosening that would merge unrelated titles that share
/// a name.
pub async fn find_match(store: &dyn CatalogStore, candidate: &Candidate) -> Result<Option<Title>, StoreError> {
    let key = candidate.match_key();
    let found = store.lookup_by_key(&key).await?;
    if let Some(row) = &found {
        debug!("Matched '{}' to catalog row {} ({})", candidate.title, row.id, key);
    }
    Ok(found)
}

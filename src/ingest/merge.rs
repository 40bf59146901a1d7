//! Gap-filling merge of a candidate into a catalog row
//!
//! A populated field is never overwritten and never cleared. Later sources can only fill
//! fields that are still empty, so a coarse list source and a detailed lookup source can
//! run in any order and converge on the same row.

use crate::catalog::{Candidate, Title};
use chrono::{DateTime, Utc};

/// What merging one candidate decided
#[derive(Debug, Clone, PartialEq)]
pub enum MergeOutcome {
    /// No existing row: insert the candidate as is
    Insert(Candidate),
    /// Existing row gained at least one field
    Update(Title),
    /// Existing row already had everything the candidate offers
    Unchanged(Title),
}

impl MergeOutcome {
    pub fn was_new(&self) -> bool {
        matches!(self, MergeOutcome::Insert(_))
    }

    pub fn changed(&self) -> bool {
        !matches!(self, MergeOutcome::Unchanged(_))
    }
}

/// Fill `slot` from `offered` only when the slot is empty
fn fill_gap<T>(slot: &mut Option<T>, offered: Option<T>) -> bool {
    if slot.is_none() && offered.is_some() {
        *slot = offered;
        true
    } else {
        false
    }
}

fn fill_text_gap(slot: &mut Option<String>, offered: Option<String>) -> bool {
    let slot_empty = slot.as_deref().map_or(true, |s| s.trim().is_empty());
    let offered = offered.filter(|s| !s.trim().is_empty());
    if slot_empty && offered.is_some() {
        *slot = offered;
        true
    } else {
        false
    }
}

/// Merge a candidate into its matched row (or mark it for insertion)
pub fn merge(existing: Option<Title>, candidate: Candidate, now: DateTime<Utc>) -> MergeOutcome {
    let Some(mut row) = existing else {
        return MergeOutcome::Insert(candidate);
    };

    let mut changed = false;
    changed |= fill_text_gap(&mut row.description, candidate.description);
    changed |= fill_gap(&mut row.release_date, candidate.release_date);
    changed |= fill_gap(&mut row.rating, candidate.rating);
    changed |= fill_text_gap(&mut row.source_url, candidate.source_url);
    changed |= fill_text_gap(&mut row.external_id, candidate.external_id);

    if changed {
        row.source = candidate.source;
        row.updated_at = now;
        MergeOutcome::Update(row)
    } else {
        MergeOutcome::Unchanged(row)
    }
}

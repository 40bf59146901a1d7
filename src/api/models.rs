//! API data models

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::refresh::{CycleStatus, RefreshSummary};

/// API response wrapper
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

/// Query string of the catalog search endpoint
#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
}

/// Body returned by an on-demand refresh
#[derive(Debug, Serialize, Deserialize)]
pub struct RefreshResponse {
    pub added: usize,
    pub updated: usize,
    pub failed_sources: BTreeSet<String>,
    pub status: CycleStatus,
    pub summary: RefreshSummary,
}

impl From<RefreshSummary> for RefreshResponse {
    fn from(summary: RefreshSummary) -> Self {
        Self {
            added: summary.added,
            updated: summary.updated,
            failed_sources: summary.failed_sources.clone(),
            status: summary.status,
            summary,
        }
    }
}

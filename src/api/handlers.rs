//! API request handlers

use anyhow::Result;
use serde_json::Value;
use std::sync::Arc;

use super::models::RefreshResponse;
use crate::catalog::CatalogStore;
use crate::error::{RefreshError, StoreError};
use crate::refresh::RefreshService;

/// Maximum results of a catalog search
pub const SEARCH_LIMIT: usize = 8;

/// Handle health check requests
pub async fn health_check() -> Result<Value> {
    Ok(serde_json::json!({
        "status": "healthy",
        "service": "catalog-engine",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// All catalog titles, ordered by title
pub async fn list_catalog(store: &Arc<dyn CatalogStore>) -> Result<Value, StoreError> {
    let titles = store.list_all().await?;
    Ok(serde_json::to_value(titles).unwrap_or_else(|_| Value::Array(Vec::new())))
}

/// Titles whose name contains `query`; a blank query matches nothing
pub async fn search_catalog(store: &Arc<dyn CatalogStore>, query: Option<&str>) -> Result<Value, StoreError> {
    let query = query.map(str::trim).unwrap_or_default();
    if query.is_empty() {
        return Ok(Value::Array(Vec::new()));
    }
    let titles = store.search(query, SEARCH_LIMIT).await?;
    Ok(serde_json::to_value(titles).unwrap_or_else(|_| Value::Array(Vec::new())))
}

/// Run a refresh cycle on its own task and wait for it
///
/// A client that disconnects drops this future, not the cycle.
pub async fn trigger_refresh(service: &Arc<RefreshService>) -> Result<Value, RefreshError> {
    let service = Arc::clone(service);
    let summary = tokio::spawn(async move { service.run_refresh_cycle().await })
        .await
        .map_err(|e| RefreshError::Interrupted(e.to_string()))??;
    Ok(serde_json::to_value(RefreshResponse::from(summary)).unwrap_or(Value::Null))
}

/// Current service state and the last cycle's summary
pub async fn refresh_status(service: &Arc<RefreshService>) -> Value {
    let status = service.status().await;
    serde_json::to_value(status).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Candidate, MediaType, MemoryCatalogStore, SourceTag};
    use crate::config::Config;

    async fn seeded_store() -> Arc<dyn CatalogStore> {
        let store = MemoryCatalogStore::new();
        for (name, year) in [("Star Wars", 1977), ("Lone Star", 1996), ("Heat", 1995)] {
            store
                .insert(Candidate::new(name, MediaType::Movie, Some(year), SourceTag::Wikipedia))
                .await
                .unwrap();
        }
        Arc::new(store)
    }

    #[tokio::test]
    async fn test_health_check() {
        let health = health_check().await.unwrap();
        assert_eq!(health["status"], "healthy");
    }

    #[tokio::test]
    async fn test_list_and_search() {
        let store = seeded_store().await;

        let all = list_catalog(&store).await.unwrap();
        let names: Vec<&str> = all.as_array().unwrap().iter().map(|t| t["title"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["Heat", "Lone Star", "Star Wars"]);

        let hits = search_catalog(&store, Some("star")).await.unwrap();
        assert_eq!(hits.as_array().unwrap().len(), 2);
        assert_eq!(search_catalog(&store, Some("  ")).await.unwrap(), Value::Array(Vec::new()));
        assert_eq!(search_catalog(&store, None).await.unwrap(), Value::Array(Vec::new()));
    }

    #[tokio::test]
    async fn test_refresh_and_status() {
        let service = Arc::new(RefreshService::new(
            Arc::new(Config::default()),
            seeded_store().await,
            Vec::new(),
        ));

        let before = refresh_status(&service).await;
        assert_eq!(before["state"], "idle");

        let response = trigger_refresh(&service).await.unwrap();
        assert_eq!(response["added"], 0);
        assert_eq!(response["status"], "success");

        let after = refresh_status(&service).await;
        assert_eq!(after["state"], "finished");
        assert_eq!(after["last_summary"]["added"], 0);
    }
}

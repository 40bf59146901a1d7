use async_trait::async_trait;
use catalog_engine::sources::HttpFetcher;
use catalog_engine::{
    Candidate, CatalogSource, CatalogStore, Config, CycleStatus, FetchError, MatchKey, MediaType, MemoryCatalogStore,
    RawRecord, RecordSink, RefreshError, RefreshService, SourceTag, SqliteCatalogStore, StoreError, Title,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Notify;

/// Source that replays a fixed list of records
struct Scripted {
    tag: SourceTag,
    records: Vec<RawRecord>,
}

#[async_trait]
impl CatalogSource for Scripted {
    fn tag(&self) -> SourceTag {
        self.tag
    }

    async fn fetch(&self, _http: &mut HttpFetcher<'_>, sink: RecordSink) -> Result<(), FetchError> {
        for record in &self.records {
            if !sink.send(record.clone()).await {
                break;
            }
        }
        Ok(())
    }
}

/// Source whose server refuses connections
struct Unreachable;

#[async_trait]
impl CatalogSource for Unreachable {
    fn tag(&self) -> SourceTag {
        SourceTag::Imdb
    }

    async fn fetch(&self, http: &mut HttpFetcher<'_>, _sink: RecordSink) -> Result<(), FetchError> {
        http.get_text("http://127.0.0.1:1/suggestion/s/star.json").await?;
        Ok(())
    }
}

/// Source that waits for a signal before finishing
struct Blocking {
    release: Arc<Notify>,
}

#[async_trait]
impl CatalogSource for Blocking {
    fn tag(&self) -> SourceTag {
        SourceTag::Wikipedia
    }

    async fn fetch(&self, _http: &mut HttpFetcher<'_>, sink: RecordSink) -> Result<(), FetchError> {
        sink.send(RawRecord::new("Heat (1995 film)")).await;
        self.release.notified().await;
        Ok(())
    }
}

/// Memory store that starts failing writes after a number of inserts
struct FlakyStore {
    inner: MemoryCatalogStore,
    inserts_left: AtomicUsize,
    count_fails: bool,
}

impl FlakyStore {
    fn failing_after(inserts: usize) -> Self {
        Self {
            inner: MemoryCatalogStore::new(),
            inserts_left: AtomicUsize::new(inserts),
            count_fails: false,
        }
    }
}

#[async_trait]
impl CatalogStore for FlakyStore {
    async fn lookup_by_key(&self, key: &MatchKey) -> Result<Option<Title>, StoreError> {
        self.inner.lookup_by_key(key).await
    }

    async fn insert(&self, candidate: Candidate) -> Result<Title, StoreError> {
        let left = self.inserts_left.load(Ordering::SeqCst);
        if left == 0 {
            return Err(StoreError::Unavailable("disk full".to_string()));
        }
        self.inserts_left.store(left - 1, Ordering::SeqCst);
        self.inner.insert(candidate).await
    }

    async fn update(&self, title: Title) -> Result<Title, StoreError> {
        self.inner.update(title).await
    }

    async fn list_all(&self) -> Result<Vec<Title>, StoreError> {
        self.inner.list_all().await
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Title>, StoreError> {
        self.inner.search(query, limit).await
    }

    async fn count(&self) -> Result<usize, StoreError> {
        if self.count_fails {
            return Err(StoreError::Unavailable("connection lost".to_string()));
        }
        self.inner.count().await
    }
}

fn record(title: &str, media_type: MediaType, year: Option<i32>) -> RawRecord {
    RawRecord {
        media_type: Some(media_type),
        year,
        ..RawRecord::new(title)
    }
}

fn wiki_films() -> Scripted {
    Scripted {
        tag: SourceTag::Wikipedia,
        records: vec![
            record("Dune: Part Two", MediaType::Movie, Some(2024)),
            record("Arrival (2016)", MediaType::Movie, None),
            record("Shōgun", MediaType::Series, Some(2024)),
        ],
    }
}

fn imdb_details() -> Scripted {
    let mut dune = RawRecord::new("Dune: Part Two");
    dune.media_hint = Some("feature".to_string());
    dune.year = Some(2024);
    dune.description = Some("Paul Atreides unites with the Fremen.".to_string());
    dune.rating = Some("8.5".to_string());
    dune.external_id = Some("tt15239678".to_string());

    Scripted {
        tag: SourceTag::Imdb,
        records: vec![dune],
    }
}

fn service_with(store: Arc<dyn CatalogStore>, sources: Vec<Box<dyn CatalogSource>>) -> RefreshService {
    RefreshService::new(Arc::new(Config::default()), store, sources)
}

#[tokio::test]
async fn test_new_titles_are_added_verbatim() {
    let store = Arc::new(MemoryCatalogStore::new());
    let service = service_with(store.clone(), vec![Box::new(wiki_films())]);

    let summary = service.run_refresh_cycle().await.unwrap();
    assert_eq!(summary.added, 3);
    assert_eq!(summary.updated, 0);
    assert_eq!(summary.status, CycleStatus::Success);

    let arrival = store
        .lookup_by_key(&MatchKey::new("Arrival", Some(2016), MediaType::Movie))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(arrival.title, "Arrival");
    assert_eq!(arrival.source, SourceTag::Wikipedia);
}

#[tokio::test]
async fn test_second_identical_cycle_changes_nothing() {
    let store = Arc::new(MemoryCatalogStore::new());
    let service = service_with(store.clone(), vec![Box::new(wiki_films()), Box::new(imdb_details())]);

    let first = service.run_refresh_cycle().await.unwrap();
    assert_eq!(first.added, 3);
    assert_eq!(first.updated, 1);
    let rows_after_first = store.list_all().await.unwrap();

    let second = service.run_refresh_cycle().await.unwrap();
    assert_eq!(second.added, 0);
    assert_eq!(second.updated, 0);
    assert_eq!(second.unchanged, 4);
    assert_eq!(store.list_all().await.unwrap(), rows_after_first);
}

#[tokio::test]
async fn test_later_source_fills_gaps_without_new_row() {
    let store = Arc::new(MemoryCatalogStore::new());
    let service = service_with(store.clone(), vec![Box::new(wiki_films()), Box::new(imdb_details())]);

    let summary = service.run_refresh_cycle().await.unwrap();
    assert_eq!(summary.sources[&SourceTag::Imdb].updated, 1);
    assert_eq!(summary.sources[&SourceTag::Imdb].added, 0);

    let dune = store
        .lookup_by_key(&MatchKey::new("dune: part two", Some(2024), MediaType::Movie))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(dune.description.as_deref(), Some("Paul Atreides unites with the Fremen."));
    assert_eq!(dune.rating, Some(8.5));
    assert_eq!(dune.external_id.as_deref(), Some("tt15239678"));
    assert_eq!(dune.source, SourceTag::Imdb);
    assert_eq!(store.count().await.unwrap(), 3);
}

#[tokio::test]
async fn test_unreachable_source_does_not_block_others() {
    let store = Arc::new(MemoryCatalogStore::new());
    let service = service_with(store.clone(), vec![Box::new(Unreachable), Box::new(wiki_films())]);

    let summary = service.run_refresh_cycle().await.unwrap();
    assert_eq!(summary.status, CycleStatus::PartialFailure);
    assert!(summary.failed_sources.contains("imdb"));
    assert!(!summary.failed_sources.contains("wikipedia"));
    assert_eq!(summary.added, 3);
    assert_eq!(store.count().await.unwrap(), 3);
}

#[tokio::test]
async fn test_duplicate_reports_collapse_to_one_row() {
    let store = Arc::new(MemoryCatalogStore::new());
    let sources: Vec<Box<dyn CatalogSource>> = vec![
        Box::new(Scripted {
            tag: SourceTag::Tvmaze,
            records: vec![
                record("The  Office", MediaType::Series, Some(2005)),
                record("the office", MediaType::Series, Some(2005)),
            ],
        }),
        Box::new(Scripted {
            tag: SourceTag::Tmdb,
            records: vec![
                record("THE OFFICE", MediaType::Series, Some(2005)),
                record("The Office", MediaType::Series, Some(2001)),
                record("The Office", MediaType::Series, None),
            ],
        }),
    ];
    let service = service_with(store.clone(), sources);
    service.run_refresh_cycle().await.unwrap();

    let rows = store.list_all().await.unwrap();
    assert_eq!(rows.len(), 3);
    let keys: HashSet<MatchKey> = rows.iter().map(|r| r.match_key()).collect();
    assert_eq!(keys.len(), rows.len());
}

#[tokio::test]
async fn test_concurrent_trigger_is_rejected() {
    let release = Arc::new(Notify::new());
    let store = Arc::new(MemoryCatalogStore::new());
    let service = Arc::new(service_with(
        store,
        vec![Box::new(Blocking {
            release: release.clone(),
        })],
    ));

    let running = {
        let service = service.clone();
        tokio::spawn(async move { service.run_refresh_cycle().await })
    };

    tokio::time::timeout(Duration::from_secs(5), async {
        while !service.is_running() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    assert!(matches!(
        service.run_refresh_cycle().await,
        Err(RefreshError::AlreadyRunning)
    ));

    release.notify_one();
    let summary = running.await.unwrap().unwrap();
    assert_eq!(summary.added, 1);
    assert!(!service.is_running());

    release.notify_one();
    let again = service.run_refresh_cycle().await.unwrap();
    assert_eq!(again.unchanged, 1);
}

#[tokio::test]
async fn test_store_failure_stops_cycle_with_partial_summary() {
    let store = Arc::new(FlakyStore::failing_after(2));
    let service = service_with(
        store.clone(),
        vec![Box::new(wiki_films()), Box::new(imdb_details())],
    );

    let summary = service.run_refresh_cycle().await.unwrap();
    assert_eq!(summary.added, 2);
    assert!(summary.aborted.is_some());
    assert!(summary.failed_sources.contains("wikipedia"));
    assert_eq!(summary.skipped_sources, vec!["imdb".to_string()]);
    assert_eq!(summary.status, CycleStatus::PartialFailure);
    assert_eq!(store.inner.count().await.unwrap(), 2);
}

#[tokio::test]
async fn test_unavailable_store_refuses_to_start() {
    let store = Arc::new(FlakyStore {
        count_fails: true,
        ..FlakyStore::failing_after(10)
    });
    let service = service_with(store, vec![Box::new(wiki_films())]);

    assert!(matches!(
        service.run_refresh_cycle().await,
        Err(RefreshError::StoreUnavailable(_))
    ));
}

#[tokio::test]
async fn test_sqlite_catalog_persists_between_services() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("catalog.db");

    {
        let store = Arc::new(SqliteCatalogStore::open(&db_path).unwrap());
        let service = service_with(store, vec![Box::new(wiki_films())]);
        assert_eq!(service.run_refresh_cycle().await.unwrap().added, 3);
    }

    let store = Arc::new(SqliteCatalogStore::open(&db_path).unwrap());
    let service = service_with(store.clone(), vec![Box::new(wiki_films()), Box::new(imdb_details())]);
    let summary = service.run_refresh_cycle().await.unwrap();
    assert_eq!(summary.added, 0);
    assert_eq!(summary.updated, 1);

    let hits = store.search("dune", 8).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].rating, Some(8.5));
}

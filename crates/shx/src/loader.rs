//! 🚜 The loading dock foreman. Reads the manifest, dispatches the trucks.
//!
//! Previously, on Bulk Loading: we had records (the reader), we had trucks
//! (the batcher), we had a parking lot with a bouncer (the throttle), and
//! we had a warehouse that occasionally yells 429 (the store). This module
//! is where they all meet and pretend to be one program.
//!
//! The shape of a load:
//!
//! 1. The session pulls batches off a record feed, one at a time.
//! 2. Before each dispatch it asks the throttle for a slot. This is the
//!    ONLY place anything waits for capacity. If the lot is full, the
//!    dispatcher stands here holding the batch until someone leaves.
//! 3. Granted a slot, the batch gets its own spawned loader task, which
//!    writes its documents one by one, riding out 429s for as long as the
//!    store keeps sending them. Loaders never wait for capacity — they
//!    already HAVE their slot. They finish and vacate. That one-way flow
//!    (dispatcher waits, loaders only ever leave) is what makes "the lot
//!    shrank below its occupancy" a slow news day instead of a deadlock.
//! 4. When the feed runs dry, [`LoadSession::finish`] waits for every
//!    outstanding loader, then folds the metrics into a [`RunSummary`].
//!
//! A write that fails in a way no retry can fix takes the whole program
//! down with exit code 1. On purpose. A bulk load that skips documents and
//! then prints a cheerful summary is worse than no loader at all — partial
//! data that LOOKS complete is how search indexes gaslight people.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use serde_json::value::RawValue;
use tracing::{debug, error, info, trace};

use crate::app_config::LoadConfig;
use crate::batcher::Batcher;
use crate::common::DocBatch;
use crate::progress::{LoadMetrics, RunSummary};
use crate::records::RecordFeed;
use crate::store::{DocumentStore, StoreBackend, WriteError};
use crate::throttle::LoaderThrottle;

/// 🚜 One bulk-load run: a store to write to, a throttle to obey, a
/// scoreboard to feed, and a batch size to cut records into.
///
/// The session outlives any single file — point it at as many files as you
/// like with [`load_file`](LoadSession::load_file), then call
/// [`finish`](LoadSession::finish) once. The throttle cap and the metrics
/// carry across files: a store that got grumpy during file two stays
/// throttled for file three, because it's the same store and the same grump.
#[derive(Debug)]
pub(crate) struct LoadSession {
    store: Arc<StoreBackend>,
    throttle: Arc<LoaderThrottle>,
    metrics: Arc<LoadMetrics>,
    batch_size: usize,
}

impl LoadSession {
    pub(crate) fn new(store: Arc<StoreBackend>, load_config: &LoadConfig) -> Self {
        Self {
            store,
            throttle: Arc::new(LoaderThrottle::new(load_config.max_loaders)),
            metrics: Arc::new(LoadMetrics::new(load_config.report_every)),
            batch_size: load_config.batch_size,
        }
    }

    /// 📂 Load one file of line-shaped records, start to finish.
    pub(crate) async fn load_file(&self, path: &Path) -> Result<()> {
        info!("🚜 loading '{}'", path.display());
        let records = crate::records::file_records::FileRecords::open(path).await?;
        self.load_feed(RecordFeed::File(records)).await
    }

    /// 🚚 Drain a record feed: batch, wait for a slot, dispatch, repeat.
    pub(crate) async fn load_feed(&self, feed: RecordFeed) -> Result<()> {
        let mut batcher = Batcher::new(feed, self.batch_size);
        while let Some(batch) = batcher.next_batch().await? {
            // 🚦 the wait happens HERE, holding no locks, blocking no loaders.
            self.throttle.acquire().await;
            debug!(
                "📦 dispatching batch of {} docs ({} bytes)",
                batch.len(),
                batch.total_bytes()
            );
            let handle = tokio::spawn(load_batch(
                Arc::clone(&self.store),
                batch,
                Arc::clone(&self.throttle),
                Arc::clone(&self.metrics),
            ));
            self.throttle.register(handle).await;
        }
        Ok(())
    }

    /// 🏁 Wait for every outstanding loader, then settle the books.
    pub(crate) async fn finish(self) -> Result<RunSummary> {
        self.throttle.drain().await?;
        Ok(self.metrics.finish().await)
    }
}

/// 🧵 One loader task: write every document in the batch, in order, each
/// one retried past as many 429s as the store cares to send.
///
/// This is a spawned task, so there's no caller to hand an error to — a
/// write that comes back fatal gets logged with its full story and then
/// the process exits. See the module docs for why that's the contract.
async fn load_batch(
    store: Arc<StoreBackend>,
    batch: DocBatch,
    throttle: Arc<LoaderThrottle>,
    metrics: Arc<LoadMetrics>,
) {
    for doc in &batch.docs {
        if let Err(err) = write_with_retry(&store, doc, &throttle, &metrics).await {
            error!("💀 {err:#}");
            error!("🛑 halting the load — a partial import that looks finished is a trap for whoever queries it next");
            std::process::exit(1);
        }
    }
}

/// 🔄 Write one document, however many attempts it takes.
///
/// The retry loop has exactly three exits:
/// - the write lands → count it (with the cap at that moment) and return,
/// - the store says Overloaded → count the retry, tell the throttle so the
///   NEXT dispatch is gentler, nap for exactly as long as the store
///   suggested, go again. No attempt limit. The store is the backpressure;
///   our job is to keep offering the document until it's taken,
/// - the store says Fatal → bubble it up. Retrying a 401 forever isn't
///   persistence, it's a grudge.
pub(crate) async fn write_with_retry(
    store: &StoreBackend,
    doc: &RawValue,
    throttle: &LoaderThrottle,
    metrics: &LoadMetrics,
) -> Result<()> {
    loop {
        match store.upsert(doc).await {
            Ok(()) => {
                let cap = throttle.current_cap().await;
                metrics.record_success(cap).await;
                return Ok(());
            }
            Err(WriteError::Overloaded { retry_after }) => {
                metrics.record_retry().await;
                throttle.report_overload().await;
                trace!("🔄 store overloaded — napping {retry_after:?} before the next attempt");
                tokio::time::sleep(retry_after).await;
            }
            Err(WriteError::Fatal(err)) => {
                return Err(err.context(
                    "💀 A document write failed in a way no amount of retrying will fix",
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::in_mem_records::InMemoryRecords;
    use crate::store::in_mem::InMemoryStore;
    use std::time::{Duration, Instant};

    fn doc(raw: &str) -> crate::common::Doc {
        serde_json::from_str(raw).expect("💀 test fixture JSON must parse")
    }

    #[tokio::test]
    async fn the_one_where_retries_eventually_land() {
        let store = InMemoryStore::new();
        store.plan_overloads(3, Duration::from_millis(5)).await;
        let backend = StoreBackend::InMemory(store.clone());
        let throttle = LoaderThrottle::new(6);
        let metrics = LoadMetrics::new(100);

        let started = Instant::now();
        write_with_retry(&backend, &doc(r#"{"id":"stubborn"}"#), &throttle, &metrics)
            .await
            .expect("💀 three 429s and then a landing — that's the whole feature");

        // 🔄 4 attempts total: 3 scripted bounces, then the one that lands
        assert_eq!(store.attempts().await, 4);
        assert_eq!(store.received().await.len(), 1);
        let (loaded, retries) = metrics.snapshot().await;
        assert_eq!((loaded, retries), (1, 3));
        // 📉 each bounce narrowed the cap: 6 → 5 → 4 → 3
        assert_eq!(throttle.current_cap().await, 3);
        // ⏱️ three naps of 5ms each must actually have been slept
        assert!(
            started.elapsed() >= Duration::from_millis(15),
            "the retry loop must honor the store's suggested naps"
        );
    }

    #[tokio::test]
    async fn the_one_where_the_cap_parks_on_the_floor() {
        let store = InMemoryStore::new();
        store.plan_overloads(5, Duration::from_millis(1)).await;
        let backend = StoreBackend::InMemory(store.clone());
        let throttle = LoaderThrottle::new(6);
        let metrics = LoadMetrics::new(100);

        write_with_retry(&backend, &doc(r#"{"id":"patient"}"#), &throttle, &metrics)
            .await
            .expect("💀 five bounces, one landing");

        assert_eq!(store.attempts().await, 6);
        let (_, retries) = metrics.snapshot().await;
        assert_eq!(retries, 5);
        // 🧱 6 → 5 → 4 → 3, then the floor holds for bounces four and five
        assert_eq!(throttle.current_cap().await, 3);
    }

    #[tokio::test]
    async fn the_one_where_a_fatal_write_comes_back_as_an_error() {
        let store = InMemoryStore::new();
        store.plan_fatal("key rejected, feelings hurt").await;
        let backend = StoreBackend::InMemory(store.clone());
        let throttle = LoaderThrottle::new(6);
        let metrics = LoadMetrics::new(100);

        let err = write_with_retry(&backend, &doc(r#"{"id":"doomed"}"#), &throttle, &metrics)
            .await
            .expect_err("💀 fatal means fatal — no retry loop heroics");
        assert!(format!("{err:#}").contains("key rejected"));
        // 🚫 exactly one attempt. fatal errors do not get second chances.
        assert_eq!(store.attempts().await, 1);
        assert!(store.received().await.is_empty());
    }

    #[tokio::test]
    async fn the_one_where_a_whole_session_loads_sixty() {
        let store = InMemoryStore::new();
        let lines: Vec<String> = (0..60).map(|i| format!(r#"{{"id":{i}}}"#)).collect();
        let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        let feed = RecordFeed::InMemory(
            InMemoryRecords::from_lines(&refs).expect("💀 fixture lines must parse"),
        );

        let config = LoadConfig {
            batch_size: 25,
            max_loaders: 6,
            report_every: 100,
            ..Default::default()
        };
        let session = LoadSession::new(Arc::new(StoreBackend::InMemory(store.clone())), &config);
        session.load_feed(feed).await.expect("💀 a healthy store loads cleanly");
        let summary = session.finish().await.expect("💀 drain should find only finished loaders");

        assert_eq!(summary.docs_loaded, 60);
        assert_eq!(summary.retries, 0);
        assert_eq!(store.attempts().await, 60);
        // 📦 batches run concurrently so arrival ORDER can interleave, but
        // every document must land exactly once
        let mut got = store.received().await;
        got.sort();
        let mut want = lines.clone();
        want.sort();
        assert_eq!(got, want);
    }

    #[tokio::test]
    async fn the_one_where_retries_survive_across_a_batch() {
        // 🎬 scripted: the second write of the batch bounces twice, then lands.
        // the batch still completes and every doc is present.
        let store = InMemoryStore::new();
        let backend = StoreBackend::InMemory(store.clone());
        let throttle = LoaderThrottle::new(6);
        let metrics = LoadMetrics::new(100);

        write_with_retry(&backend, &doc(r#"{"id":"a"}"#), &throttle, &metrics)
            .await
            .expect("💀 first doc lands clean");
        store.plan_overloads(2, Duration::from_millis(1)).await;
        write_with_retry(&backend, &doc(r#"{"id":"b"}"#), &throttle, &metrics)
            .await
            .expect("💀 second doc lands on attempt three");

        assert_eq!(store.received().await, vec![r#"{"id":"a"}"#, r#"{"id":"b"}"#]);
        let (loaded, retries) = metrics.snapshot().await;
        assert_eq!((loaded, retries), (2, 2));
    }
}

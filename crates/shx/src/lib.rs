//! 🚜 shovex — a bulk document loader with manners.
//!
//! ---
//!
//! 🎬 COLD OPEN — INT. A DIRECTORY FULL OF JSON — NIGHT
//!
//! Four files sit in a data directory. Hundreds of thousands of records.
//! Somewhere across the network, a document store waits, metered by the
//! request unit, armed with a 429 and not afraid to use it.
//!
//! Somebody has to carry all of this over there. Record by record. Batch
//! by batch. Politely when possible, patiently when not.
//!
//! That somebody is this crate. It brought a shovel. 🚜
//!
//! ---
//!
//! The pipeline, in one breath: read line-shaped records out of
//! pseudo-JSON-array files → cut them into batches → dispatch each batch to
//! its own loader task, never more than the throttle allows → upsert every
//! document individually, riding out rate limits with the store's own
//! suggested naps → shrink the loader cap whenever the store complains,
//! never grow it back → print progress so the humans don't alt-tab into
//! despair → hand back a [`RunSummary`] with the final numbers.
//!
//! Everything is driven through [`run`]: build an
//! [`AppConfig`](app_config::AppConfig) (from TOML, env vars, or plain
//! struct literals), pass it in, await the summary. The CLI crate is a thin
//! wrapper that does exactly that and then draws a table.

pub mod app_config;
mod batcher;
mod common;
mod loader;
mod progress;
mod records;
mod store;
mod throttle;

pub use progress::RunSummary;

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use crate::app_config::{AppConfig, StoreConfig};
use crate::loader::LoadSession;
use crate::store::StoreBackend;

/// 🚀 Run one bulk load, start to finish.
///
/// The order of operations is the error-reporting strategy:
/// 1. validate the knobs (cheap, local, instant),
/// 2. connect to the store and provision its indexes (the first thing that
///    can REALLY fail, and the thing you most want to fail before any file
///    is half-loaded),
/// 3. resolve the data files,
/// 4. load each file through one shared [`LoadSession`] — same throttle,
///    same metrics, same store across all of them,
/// 5. wait for every loader to land, fold the counters, return the summary.
///
/// Everything recoverable is handled below this function (429s never
/// surface here). Everything that reaches the `?`s in this body is a
/// reason to stop the program.
pub async fn run(app_config: AppConfig) -> Result<RunSummary> {
    app_config.load.validate()?;
    let store = build_store(&app_config).await?;
    let data_files = app_config::resolve_data_files(&app_config.load)?;

    let session = LoadSession::new(Arc::new(store), &app_config.load);
    for path in &data_files {
        session.load_file(path).await?;
    }
    let summary = session.finish().await?;

    info!(
        "🏁 load complete — {} docs in {} ({:.0} rows/sec, {} retries)",
        summary.docs_loaded_display(),
        summary.elapsed_display(),
        summary.rows_per_sec(),
        summary.retries_display()
    );
    Ok(summary)
}

/// 🔌 Turn a [`StoreConfig`] into a live backend.
///
/// Cosmos gets the full pre-flight: connect (which proves the database and
/// collection exist) and composite-index provisioning, both before a single
/// document moves. The in-memory store gets a `Vec`. One of these is doing
/// more work than the other and it knows it.
async fn build_store(app_config: &AppConfig) -> Result<StoreBackend> {
    match &app_config.store {
        Some(StoreConfig::Cosmos(config)) => {
            let store = store::cosmos::CosmosStore::connect(config, app_config.load.max_loaders).await?;
            store.ensure_composite_indexes().await?;
            Ok(StoreBackend::Cosmos(store))
        }
        Some(StoreConfig::InMemory) => Ok(StoreBackend::InMemory(store::in_mem::InMemoryStore::new())),
        None => anyhow::bail!(
            "💀 No store configured. The documents have nowhere to go and the loader \
            refuses to pantomime. Add a [store.Cosmos] section or pass the connection \
            arguments on the command line."
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_config::{CosmosStoreConfig, LoadConfig};
    use serde_json::json;
    use std::fs;
    use std::path::Path;
    use wiremock::matchers::{method, path as url_path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// 🧪 Writes a pseudo-JSON-array file: bracket, records with trailing
    /// commas, bracket. The exact shape the reader was built to survive.
    fn write_records_file(dir: &Path, name: &str, count: usize) {
        let mut contents = String::from("[\n");
        for i in 0..count {
            contents.push_str(&format!("{{\"id\": {i}, \"source\": \"{name}\"}},\n"));
        }
        contents.push_str("]\n");
        fs::write(dir.join(name), contents).expect("💀 fixture file must write");
    }

    fn in_memory_config(data_dir: &Path, files: Vec<String>) -> AppConfig {
        AppConfig {
            load: LoadConfig {
                data_dir: Some(data_dir.to_path_buf()),
                files,
                ..Default::default()
            },
            store: Some(StoreConfig::InMemory),
        }
    }

    #[tokio::test]
    async fn the_one_where_ten_records_cross_the_finish_line() {
        let dir = tempfile::tempdir().expect("💀 tempdir should materialize");
        write_records_file(dir.path(), "featured.json", 10);

        let summary = run(in_memory_config(dir.path(), vec!["featured.json".to_string()]))
            .await
            .expect("💀 ten clean records against a healthy store is the happy path");

        assert_eq!(summary.docs_loaded, 10);
        assert_eq!(summary.retries, 0);
    }

    #[tokio::test]
    async fn the_one_where_two_files_share_a_session() {
        let dir = tempfile::tempdir().expect("💀 tempdir should materialize");
        write_records_file(dir.path(), "movies.json", 10);
        write_records_file(dir.path(), "actors.json", 5);

        let summary = run(in_memory_config(
            dir.path(),
            vec!["movies.json".to_string(), "actors.json".to_string()],
        ))
        .await
        .expect("💀 two files, one session, fifteen documents");

        // 📊 counters accumulate ACROSS files, not per file
        assert_eq!(summary.docs_loaded, 15);
    }

    #[tokio::test]
    async fn the_one_where_the_store_keeps_saying_busy() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(url_path("/dbs/imdb"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .mount(&server)
            .await;
        // 📦 collection already carries both composite indexes, so the run
        // skips provisioning and goes straight to loading
        Mock::given(method("GET"))
            .and(url_path("/dbs/imdb/colls/movies"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "movies",
                "indexingPolicy": {
                    "compositeIndexes": [
                        [
                            { "path": "/textSearch", "order": "ascending" },
                            { "path": "/actorId", "order": "ascending" }
                        ],
                        [
                            { "path": "/textSearch", "order": "ascending" },
                            { "path": "/movieId", "order": "ascending" }
                        ]
                    ]
                }
            })))
            .mount(&server)
            .await;
        // 🔄 the first two POSTs bounce with a 429 and a 10ms suggestion;
        // mount order matters — this mock retires after two serves and the
        // 201 mock underneath catches everything after
        Mock::given(method("POST"))
            .and(url_path("/dbs/imdb/colls/movies/docs"))
            .respond_with(
                ResponseTemplate::new(429).insert_header("x-ms-retry-after-ms", "10"),
            )
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(url_path("/dbs/imdb/colls/movies/docs"))
            .respond_with(ResponseTemplate::new(201))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().expect("💀 tempdir should materialize");
        write_records_file(dir.path(), "movies.json", 3);

        let config = AppConfig {
            load: LoadConfig {
                data_dir: Some(dir.path().to_path_buf()),
                files: vec!["movies.json".to_string()],
                ..Default::default()
            },
            store: Some(StoreConfig::Cosmos(CosmosStoreConfig::new(
                server.uri(),
                "test-key",
                "imdb",
                "movies",
            ))),
        };

        let summary = run(config)
            .await
            .expect("💀 two 429s against three documents is a Tuesday, not a failure");

        assert_eq!(summary.docs_loaded, 3, "every document must land despite the 429s");
        assert_eq!(summary.retries, 2, "each 429 must be counted as a retry");
    }

    #[tokio::test]
    async fn the_one_where_a_mangled_line_sinks_the_run() {
        let dir = tempfile::tempdir().expect("💀 tempdir should materialize");
        // ⚠️ line 2 qualifies as a record (starts {, ends }) but isn't JSON
        fs::write(
            dir.path().join("movies.json"),
            "{\"id\": 1}\n{this is not json}\n{\"id\": 3}\n",
        )
        .expect("💀 fixture file must write");

        let err = run(in_memory_config(dir.path(), vec!["movies.json".to_string()]))
            .await
            .expect_err("💀 a qualifying line that fails to parse must end the run");
        assert!(
            format!("{err:#}").contains("Line 2"),
            "the error must say WHICH line betrayed us: {err:#}"
        );
    }

    #[tokio::test]
    async fn the_one_where_running_without_a_store_is_caught_early() {
        let config = AppConfig {
            load: LoadConfig::default(),
            store: None,
        };
        let err = run(config).await.expect_err("💀 no store, no run");
        assert!(format!("{err:#}").contains("store"));
    }

    #[tokio::test]
    async fn the_one_where_a_zero_batch_config_is_rejected() {
        let config = AppConfig {
            load: LoadConfig {
                batch_size: 0,
                ..Default::default()
            },
            store: Some(StoreConfig::InMemory),
        };
        let err = run(config).await.expect_err("💀 validation runs before anything moves");
        assert!(format!("{err:#}").contains("batch_size"));
    }
}

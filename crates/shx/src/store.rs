//! 🕳️ Document stores — where the documents go.
//!
//! 🎭 This module is the other half of the casting agency. Sources pour
//! records in; a store upserts them somewhere durable (or, for tests,
//! somewhere convincingly durable-shaped).
//!
//! The one interesting idea here is the error split. A write can fail two
//! ways, and they are NOT the same incident:
//!
//! - [`WriteError::Overloaded`] — the store said "not now" and suggested a
//!   nap length. Recoverable. Expected. Practically a love language for
//!   rate-limited databases.
//! - [`WriteError::Fatal`] — anything else. Auth, networks, 500s, cosmic rays.
//!   Not recoverable by waiting. The worker stops the whole show.
//!
//! Everything downstream (retry loops, cap decay, the progress counters)
//! hangs off that distinction, so it gets a real enum instead of a string
//! someone greps for at 3am. 🦆

use std::time::Duration;

use async_trait::async_trait;
use serde_json::value::RawValue;
use thiserror::Error;

pub(crate) mod cosmos;
pub(crate) mod in_mem;

// 🎯 Re-export the config so callers can do `store::CosmosStoreConfig`
// instead of spelunking into `store::cosmos::CosmosStoreConfig`.
pub use cosmos::CosmosStoreConfig;

// ===== Write Errors =====

/// 💀 The two moods of a failed write.
///
/// `Overloaded` carries the store's own suggestion for how long to back off,
/// because the store knows its pain better than we do. `Fatal` carries the
/// full anyhow context chain for the post-mortem nobody wants to write.
#[derive(Debug, Error)]
pub(crate) enum WriteError {
    /// 🔄 The store is drowning and said so politely. Sleep, then try again.
    #[error("store overloaded — retry suggested in {retry_after:?}")]
    Overloaded { retry_after: Duration },

    /// 💀 Everything else. No retry will save you. Check the chain.
    #[error(transparent)]
    Fatal(#[from] anyhow::Error),
}

// ===== DocumentStore Trait and Backend Enum =====

/// 🕳️ A store that accepts one document at a time, idempotently.
///
/// # Contract 📜
/// - `upsert` writes one document. Same document twice = same end state.
///   That idempotence is what makes "crash and rerun" a recovery strategy
///   instead of a data corruption strategy.
/// - `&self`, not `&mut self` — one store handle is shared by every loader
///   task via `Arc`. Connections are pooled inside; interior mutability is
///   the implementor's problem (and tokio's gift).
/// - Ordering between concurrent upserts of DIFFERENT documents: none.
///   Promised by nobody. Don't build on it.
#[async_trait]
pub(crate) trait DocumentStore: std::fmt::Debug {
    /// 📤 Upsert one document. Ok, Overloaded, or Fatal — pick exactly one.
    async fn upsert(&self, doc: &RawValue) -> Result<(), WriteError>;
}

/// 🎭 The many faces of a document store.
///
/// Each variant wraps a concrete store. The enum dispatches via
/// `impl DocumentStore for StoreBackend`, so the loader never knows whether
/// it's talking to a real database with real billing or a Vec with
/// delusions of persistence.
///
/// Ancient proverb: "He who hardcodes the store, reloads only once."
#[derive(Debug)]
pub(crate) enum StoreBackend {
    Cosmos(cosmos::CosmosStore),
    InMemory(in_mem::InMemoryStore),
}

#[async_trait]
impl DocumentStore for StoreBackend {
    async fn upsert(&self, doc: &RawValue) -> Result<(), WriteError> {
        match self {
            StoreBackend::Cosmos(store) => store.upsert(doc).await,
            StoreBackend::InMemory(store) => store.upsert(doc).await,
        }
    }
}

//! 🧠 The in-memory store — all of the drama, none of the networking.
//!
//! Previously, on Distributed Databases: latency. Partitions. A bill.
//!
//! This backend has none of that. It's a `Vec` behind a mutex wearing a
//! trench coat that says "document store" on the back. Every upsert either
//! lands in the vec or trips over an outcome you scripted in advance,
//! which makes it the perfect scene partner for the loader: it can play
//! "healthy store", "store having a moment", and "store on fire" with
//! equal commitment, and it never breaks character.
//!
//! The scripting works like a queue of cue cards: each call to `upsert`
//! pulls the next planned outcome if there is one (Overloaded, Fatal —
//! dealer's choice) and otherwise just accepts the document. Plan three
//! overloads and the first three writes get 429 energy, the fourth one
//! lands. Deterministic chaos. The best kind.

#[cfg(test)]
use std::collections::VecDeque;
use std::sync::Arc;
#[cfg(test)]
use std::time::Duration;

use async_trait::async_trait;
use serde_json::value::RawValue;
use tokio::sync::Mutex;

use crate::store::{DocumentStore, WriteError};

/// 🎭 What the store has been told to do instead of its job.
#[cfg(test)]
#[derive(Debug)]
enum PlannedOutcome {
    /// 🔄 Pretend to be rate-limited, suggest this exact nap.
    Overloaded { retry_after: Duration },
    /// 💀 Pretend something unrecoverable happened, with this message.
    Fatal { message: String },
}

#[derive(Debug, Default)]
struct InMemoryState {
    /// 📦 Every document that made it through, verbatim, in arrival order.
    received: Vec<String>,
    /// 🎬 Cue cards. Front of the queue goes first. Test builds only;
    /// everyone else gets a store that simply works.
    #[cfg(test)]
    planned: VecDeque<PlannedOutcome>,
    /// 🧮 Total upsert calls, including the ones that "failed".
    attempts: u64,
}

/// 🧠 A document store that lives entirely in RAM and cannot be billed.
///
/// `Clone` hands out another handle to the SAME state (it's an `Arc` all
/// the way down), so a test can keep a handle for inspection while the
/// loader machinery owns another. Everybody sees the same vec. No copies,
/// no surprises, no "wait which store did I assert against" incidents.
#[derive(Debug, Default, Clone)]
pub(crate) struct InMemoryStore {
    state: Arc<Mutex<InMemoryState>>,
}

impl InMemoryStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// 🎬 Queue up `count` rate-limit rejections, each suggesting the same nap.
    #[cfg(test)]
    pub(crate) async fn plan_overloads(&self, count: usize, retry_after: Duration) {
        let mut state = self.state.lock().await;
        for _ in 0..count {
            state
                .planned
                .push_back(PlannedOutcome::Overloaded { retry_after });
        }
    }

    /// 🎬 Queue up one unrecoverable failure with the given message.
    #[cfg(test)]
    pub(crate) async fn plan_fatal(&self, message: &str) {
        self.state.lock().await.planned.push_back(PlannedOutcome::Fatal {
            message: message.to_string(),
        });
    }

    /// 🔍 Everything that landed, in the order it landed.
    #[cfg(test)]
    pub(crate) async fn received(&self) -> Vec<String> {
        self.state.lock().await.received.clone()
    }

    /// 🧮 How many times anyone knocked, successful or not.
    #[cfg(test)]
    pub(crate) async fn attempts(&self) -> u64 {
        self.state.lock().await.attempts
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn upsert(&self, doc: &RawValue) -> Result<(), WriteError> {
        let mut state = self.state.lock().await;
        state.attempts += 1;
        // 🎭 scripted outcome first. the show must go wrong on schedule.
        #[cfg(test)]
        if let Some(outcome) = state.planned.pop_front() {
            return match outcome {
                PlannedOutcome::Overloaded { retry_after } => {
                    Err(WriteError::Overloaded { retry_after })
                }
                PlannedOutcome::Fatal { message } => {
                    Err(WriteError::Fatal(anyhow::anyhow!(message)))
                }
            };
        }
        state.received.push(doc.get().to_string());
        Ok(())
    }
}

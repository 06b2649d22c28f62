//! # Previously, on Shovex...
//!
//! 🎬 The documents needed somewhere to come FROM that wasn't a disk. Tests
//! were getting slow. Fixtures were getting lost. Someone had to write a
//! source so simple it lives entirely in RAM, gone the moment you blink.
//!
//! That someone was this module.
//!
//! ⚠️ This is NOT for production. This is for tests and benchmarks. If you're
//! deploying this to prod, please also deploy a therapist.
//!
//! ✅ No disk I/O. No file handles. No surprises. Just vibes and heap memory. 🦆

use std::collections::VecDeque;

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::common::Doc;
use crate::records::RecordSource;

/// 📦 The world's most agreeable record source.
///
/// `InMemoryRecords` takes a list of raw JSON strings at construction, parses
/// them all up front, and then hands them back one at a time like a PEZ
/// dispenser with commitment issues. When it's out, it's out. `None` forever.
///
/// 🎯 Designed entirely for testing. Not for feelings. Feelings are unindexed.
#[derive(Debug)]
pub(crate) struct InMemoryRecords {
    /// 🔄 The queue of pre-parsed documents. Pop from the front, preserve the
    /// order, disappoint nobody. VecDeque because we are civilized.
    docs: VecDeque<Doc>,
}

impl InMemoryRecords {
    /// 🚀 Parses every raw string into a [`Doc`] and queues them up in order.
    ///
    /// Yes, this is eager. Yes, the file source is lazy. In a test fixture
    /// with twelve documents, laziness is a personality, not an optimization.
    ///
    /// # Errors
    /// 💀 If one of YOUR OWN hardcoded test strings fails to parse, that's on
    /// you, and the error message will gently say so.
    pub(crate) fn from_lines(lines: &[&str]) -> Result<Self> {
        let mut docs = VecDeque::with_capacity(lines.len());
        for (i, line) in lines.iter().enumerate() {
            let doc = serde_json::from_str::<Doc>(line).with_context(|| {
                format!(
                    "💀 In-memory fixture line {} isn't JSON. You wrote this fixture. \
                    We both know what happened here.",
                    i + 1
                )
            })?;
            docs.push_back(doc);
        }
        Ok(Self { docs })
    }
}

#[async_trait]
impl RecordSource for InMemoryRecords {
    /// 🎯 Pops the next pre-parsed document. `None` when the dispenser is empty.
    ///
    /// It's async because the trait contract says so, not because RAM is slow.
    /// Ancient proverb: "He who makes everything async learns nothing, but
    /// ships faster."
    async fn next_record(&mut self) -> Result<Option<Doc>> {
        Ok(self.docs.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn the_one_where_the_dispenser_runs_out() {
        let mut feed = InMemoryRecords::from_lines(&[r#"{"doc":1}"#, r#"{"doc":2}"#])
            .expect("💀 Fixture parse failed. The call is coming from inside the test.");

        assert!(feed.next_record().await.expect("first pop").is_some());
        assert!(feed.next_record().await.expect("second pop").is_some());
        // 📭 and now: nothing, forever, no matter how nicely we ask
        assert!(feed.next_record().await.expect("third pop").is_none());
        assert!(feed.next_record().await.expect("fourth pop").is_none());
    }

    #[test]
    fn the_one_where_a_bad_fixture_is_called_out_by_line() {
        let err = InMemoryRecords::from_lines(&[r#"{"fine":true}"#, "not json"])
            .expect_err("💀 Line two is prose, this must fail.");
        assert!(format!("{err:#}").contains("line 2"));
    }
}

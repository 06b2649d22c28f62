//! 🚰 Record sources — where the documents come from.
//!
//! 🎭 This module is the casting agency. Need records off a disk? Out of a
//! Vec you hardcoded in a test at 11pm? We've got a source for that.
//!
//! The contract is tiny on purpose: one parsed record per call, `None` at
//! EOF, errors only when a line that *claimed* to be a document turns out to
//! be lying. Everything downstream — batching, dispatch, throttling — builds
//! on this one narrow promise.
//!
//! 🦆 The duck is here because every file must have one. This is law.

use anyhow::Result;
use async_trait::async_trait;

use crate::common::Doc;

pub(crate) mod file_records;
#[cfg(test)]
pub(crate) mod in_mem_records;

// ===== RecordSource Trait and Feed Enum =====

/// 🚰 A source that produces parsed records, one at a time, lazily.
///
/// Implement this trait and you too can be the origin of someone else's data
/// problems. Guaranteed to dispense only the finest organic, free-range,
/// pre-validated JSON objects.
///
/// # Contract 📜
/// - `next_record` returns `Ok(Some(doc))` while records flow.
/// - `None` = EOF. The well is dry. The golden retriever goes home. 🐕
/// - `Err(...)` means a line that looked like a document failed to parse —
///   and that is a run-ending event, not a shrug. Garbage that never looked
///   like a document is skipped silently; garbage in a trenchcoat is fatal.
/// - The borrow checker demands `&mut self` because sources have state.
///   And feelings. Mostly state.
#[async_trait]
pub(crate) trait RecordSource: std::fmt::Debug {
    /// 📄 Fetch the next parsed record.
    ///
    /// Returns `Ok(Some(doc))` while data flows. Returns `Ok(None)` when the
    /// tap runs dry. EOF. Fin. The end. 🏁
    async fn next_record(&mut self) -> Result<Option<Doc>>;
}

/// 🎭 The many faces of a record source — a polymorphic casting call.
///
/// Each variant wraps a concrete source. The enum dispatches via
/// `impl RecordSource for RecordFeed`, so the batcher never needs to know
/// (or care) whether records come from disk or from RAM.
///
/// Ancient proverb: "He who hardcodes the source, imports only once."
#[derive(Debug)]
pub(crate) enum RecordFeed {
    File(file_records::FileRecords),
    /// 🧪 Records out of a Vec. Tests only — no config spelling builds one.
    #[cfg(test)]
    InMemory(in_mem_records::InMemoryRecords),
}

#[async_trait]
impl RecordSource for RecordFeed {
    async fn next_record(&mut self) -> Result<Option<Doc>> {
        match self {
            RecordFeed::File(f) => f.next_record().await,
            #[cfg(test)]
            RecordFeed::InMemory(m) => m.next_record().await,
        }
    }
}

//! 📦 Common data structures — the cargo pallets of shovex
//!
//! ---
//!
//! 🎬 COLD OPEN — INT. LOADING DOCK — 3:47 AM
//!
//! 🌩️  A forklift idles. Somewhere, a fluorescent light buzzes at exactly the
//! frequency that makes you question your career. The import has been running
//! for an hour. The database meter is running too. The database meter is
//! ALWAYS running.
//!
//! ✅ And then — a `DocBatch` rolls up. Twenty-five documents, shrink-wrapped,
//! in order, each one a fully validated JSON object that asked for nothing and
//! received a one-way ticket to a document store. They don't know where
//! they're going. They don't need to know. They're documents.
//!
//! 🦆
//!
//! This module defines the humble yet load-bearing types that ferry records
//! from the files they came from to the store they're destined for. They don't
//! ask questions. They carry the data. They are the pallets of this codebase.
//! Please do not stand on the pallets.

use serde_json::value::RawValue;

/// 🎯 A single record — one JSON object, validated once, re-parsed never.
///
/// `RawValue` is serde_json's way of saying "I checked it, it's JSON, now
/// leave it alone." We parse each line exactly once at read time, and from
/// then on the document travels as its original bytes. The store gets the
/// text verbatim. No re-serialization. No field reordering. No surprises.
pub(crate) type Doc = Box<RawValue>;

/// 📦 A `DocBatch` — because one document is never enough.
///
/// Think of it as a shopping cart, except everything in the cart is a JSON
/// object, the cart has no wheels, and checkout is a remote database that
/// charges by the request. It groups up to batch-size [`Doc`]s in file order
/// so one loader task can carry them all in one trip (ALL of them, no second
/// trips, this is a point of honor).
///
/// # What's the DEAL with batches?
/// You can't hand a worker one document at a time. That would be like hiring
/// a moving truck to transport individual spoons. Technically possible.
/// Deeply inefficient. Someone would write a post-mortem about it.
#[derive(Debug, Clone, Default)]
pub(crate) struct DocBatch {
    /// The documents, in the exact order they appeared in the source file.
    /// Order within a batch is a promise. Order across batches is a rumor.
    pub docs: Vec<Doc>,
}

impl DocBatch {
    /// 🏗️  Wraps a `Vec<Doc>` in its travel container. That's it. That's the job.
    ///
    /// The records were already parsed upstream, so there is nothing left to
    /// fail. The constructor takes the vec, keeps the vec, becomes the vec.
    /// A career many of us would envy.
    pub(crate) fn new(docs: Vec<Doc>) -> Self {
        Self { docs }
    }

    /// 🔢 How many documents are riding in this batch.
    pub(crate) fn len(&self) -> usize {
        self.docs.len()
    }

    /// 📭 True when the batch is carrying nothing but potential.
    pub(crate) fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// 📊 Counts the total bytes across all documents in this batch.
    ///
    /// One iterator. One map. One sum. It measures ALL of it — the ids, the
    /// payloads, the dreams — and returns a single `usize` that coldly
    /// represents the magnitude of your ambitions in bytes.
    ///
    /// Ancient proverb: "He who sums without first iterating panics in
    /// production. He who iterates and maps and sums... ships a feature."
    pub(crate) fn total_bytes(&self) -> usize {
        // One line to rule them all. One line to find them.
        // One line to bring them all, and in the darkness count them.
        self.docs.iter().map(|doc| doc.get().len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(raw: &str) -> Doc {
        serde_json::from_str(raw).expect("💀 Test fixture JSON failed to parse. Check the test, not the code.")
    }

    #[test]
    fn the_one_where_the_batch_counts_its_cargo() {
        let batch = DocBatch::new(vec![doc(r#"{"id":"1"}"#), doc(r#"{"id":"2"}"#)]);
        assert_eq!(batch.len(), 2); // ✅ two docs, zero regrets
        assert!(!batch.is_empty());
    }

    #[test]
    fn the_one_where_bytes_are_counted_verbatim() {
        // 📏 RawValue keeps the original text, so the byte count is the
        // byte count of what we actually read. No re-serialization drift.
        let batch = DocBatch::new(vec![doc(r#"{"id":"1"}"#), doc(r#"{"id":"22"}"#)]);
        assert_eq!(batch.total_bytes(), r#"{"id":"1"}"#.len() + r#"{"id":"22"}"#.len());
    }

    #[test]
    fn the_one_where_an_empty_batch_is_honest_about_it() {
        let batch = DocBatch::default();
        assert!(batch.is_empty());
        assert_eq!(batch.total_bytes(), 0); // 📭 zero bytes of ambition
    }
}

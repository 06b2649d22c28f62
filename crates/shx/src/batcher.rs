//! 📦 The Batcher — turns a stream of documents into trucks of documents.
//!
//! One record at a time is retail. We do wholesale. Records come in off the
//! feed, get stacked until the pallet holds `batch_size`, and ship as one
//! [`DocBatch`]. The last pallet goes out partially loaded, because leaving
//! nine documents on the warehouse floor is how audits happen.
//!
//! For N records and batch size B you get exactly ceil(N/B) batches, the
//! last one holding N mod B (or a full B when the math is kind). 🦆

use anyhow::Result;

use crate::common::DocBatch;
use crate::records::{RecordFeed, RecordSource};

/// 📦 Pulls records off a [`RecordFeed`] and vends fixed-size [`DocBatch`]es.
///
/// State machine the size of a fortune cookie: keep filling until the batch
/// is full or the feed is empty, ship what you have, remember when the feed
/// died so we never poke it again. Sources deserve a peaceful EOF.
#[derive(Debug)]
pub(crate) struct Batcher {
    feed: RecordFeed,
    batch_size: usize,
    /// 🏁 set once the feed returns `None` — after that, we're done forever.
    exhausted: bool,
}

impl Batcher {
    /// 🏗️ Straps a batcher onto a feed. `batch_size` is validated upstream
    /// (config says ≥ 1), but a zero sneaking in here just means zero batches,
    /// not an infinite loop. We checked. Twice.
    pub(crate) fn new(feed: RecordFeed, batch_size: usize) -> Self {
        Self {
            feed,
            batch_size,
            exhausted: false,
        }
    }

    /// 🚚 Builds and returns the next batch, or `None` when the feed is spent.
    ///
    /// Records land in the batch in feed order — order within a batch is a
    /// promise we keep so the loader can make it a promise too.
    ///
    /// # Errors
    /// 💀 Propagates feed errors untouched. A fatal parse two layers down is
    /// still fatal up here. We're a batcher, not a grief counselor.
    pub(crate) async fn next_batch(&mut self) -> Result<Option<DocBatch>> {
        if self.exhausted {
            return Ok(None);
        }

        let mut docs = Vec::with_capacity(self.batch_size);
        while docs.len() < self.batch_size {
            match self.feed.next_record().await? {
                Some(doc) => docs.push(doc),
                None => {
                    // 🏁 feed's done. ship whatever is on the pallet.
                    self.exhausted = true;
                    break;
                }
            }
        }

        let batch = DocBatch::new(docs);
        if batch.is_empty() {
            // 📭 nothing accumulated — EOF landed exactly on a batch boundary,
            // or the feed was empty from the start. Either way: no empty trucks.
            Ok(None)
        } else {
            Ok(Some(batch))
        }
    }
}

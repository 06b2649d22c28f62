//! 🎬 *[a JSON file sits on disk. it is almost, but not quite, a JSON array.]*
//! *[someone exported it with trailing commas. someone else added brackets.]*
//! *[nobody wrote a schema. nobody ever writes a schema.]*
//!
//! 📄 The FileRecords module — a reader for the "pseudo-array" layout: one
//! JSON object per physical line, possibly with a trailing comma, possibly
//! wrapped in `[` and `]` lines that exist purely for decoration. We read it
//! line by line and keep only the lines that are actually documents.
//!
//! 🦆 (the duck read the file format notes. the duck has concerns.)

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::{
    fs::File,
    io::{self, AsyncBufReadExt},
};
use tracing::trace;

use crate::common::Doc;
use crate::records::RecordSource;

/// 📂 FileRecords — reads a file line by line and vends parsed documents.
///
/// Think of it like a very patient intern going through a stack of mail:
/// envelopes that obviously aren't documents go straight in the bin, no
/// comment. Envelopes that look like documents get opened — and if one of
/// THOSE turns out to be garbage, the intern pulls the fire alarm, because a
/// malformed document in a file full of real ones means the file is broken
/// and every subsequent write would be a gamble.
///
/// The qualification rules, in order, per trimmed line:
/// 1. must start with `{` — otherwise skip silently (`[`, `]`, blanks, noise)
/// 2. one trailing `,` is stripped, if present (the pseudo-array comma)
/// 3. must now end with `}` — otherwise skip silently (unfinished business)
/// 4. must parse as JSON — otherwise the whole run dies, on purpose
///
/// One object per physical line. Multi-line documents are not a thing here.
/// 🧵 Async, non-blocking. The BufReader wraps a tokio `File`, real async I/O.
#[derive(Debug)]
pub(crate) struct FileRecords {
    buf_reader: io::BufReader<File>,
    path: PathBuf,
    /// 📄 reused line buffer — one allocation, many lines. the buffer abides.
    line: String,
    /// 🔢 1-based line number, for error messages a human can act on at 3am.
    line_no: u64,
}

impl FileRecords {
    /// 🚀 Opens the source file and returns a `FileRecords` ready to vend docs.
    ///
    /// If the file doesn't exist: 💀 anyhow will tell you with *theatrical flair*.
    ///
    /// No cap: `File::open` is async here because we're in tokio-land. This is
    /// not your grandfather's `std::fs::File::open`. This is its cooler younger
    /// sibling who got into the async runtime scene and never looked back.
    pub(crate) async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        // -- 💀 The door. It's locked. Or it doesn't exist. Or the filesystem lied.
        // The context string below becomes the error message. Make it count.
        let file_handle = File::open(&path).await.context(format!(
            "💀 The door to '{}' would not budge. We knocked. We pleaded. \
            We checked if it existed (it might not). We checked permissions (they might be wrong). \
            The door remained closed. The documents remain unloaded. We remain outside.",
            path.display()
        ))?;

        Ok(Self {
            buf_reader: io::BufReader::new(file_handle),
            path,
            line: String::with_capacity(16 * 1024),
            line_no: 0,
        })
    }
}

#[async_trait]
impl RecordSource for FileRecords {
    /// 📄 Read lines until one qualifies as a document, then parse and return it.
    ///
    /// 🧠 Knowledge graph: the skip-vs-die distinction is the whole design.
    ///   - Lines that never claimed to be documents (`[`, `]`, blanks, prose)
    ///     are skipped without a word. They were never part of the deal.
    ///   - A line that qualifies (starts `{`, ends `}` after the comma trim)
    ///     and then FAILS to parse is a fatal error. A half-broken input file
    ///     means unknown blast radius, and we'd rather stop at line 3 than
    ///     discover the problem at document 40,000.
    ///
    /// "He who skips the unparseable, debugs the missing." — Ancient proverb 📜
    async fn next_record(&mut self) -> Result<Option<Doc>> {
        loop {
            self.line.clear();
            let bytes_read = self
                .buf_reader
                .read_line(&mut self.line)
                .await
                .with_context(|| {
                    format!(
                        "💀 Reading '{}' fell over around line {}. Either the disk is \
                        having a moment or the file isn't UTF-8. Both are bad news, \
                        delivered here with love.",
                        self.path.display(),
                        self.line_no + 1
                    )
                })?;

            // 🏁 EOF. Zero bytes. The file has nothing more to say.
            if bytes_read == 0 {
                trace!(
                    "🏁 finished '{}' after {} lines — the well is dry",
                    self.path.display(),
                    self.line_no
                );
                return Ok(None);
            }
            self.line_no += 1;

            // 🧹 trim both ends — handles \n, \r\n, and whoever indented the export
            let trimmed = self.line.trim();

            // 🚪 rule 1: doesn't start with '{'? not a document. never was. bye.
            // This is where the array brackets, blank lines, and stray commas
            // of the pseudo-array format quietly exit the story.
            if !trimmed.starts_with('{') {
                continue;
            }

            // ✂️ rule 2: one trailing comma gets a haircut. ONE. We are barbers,
            // not lumberjacks. A second comma means the line is malformed in a
            // way rule 3 will catch.
            let candidate = trimmed.strip_suffix(',').unwrap_or(trimmed);

            // 🚪 rule 3: no closing brace at the end? unfinished business.
            // Skipped silently — it opened like a document but never committed.
            if !candidate.ends_with('}') {
                continue;
            }

            // 🎯 rule 4: it walked like a document and quacked like a document,
            // so now it MUST parse like a document. If it doesn't, the run is
            // over — propagate up, let the orchestrator pull the plug.
            let doc = serde_json::from_str::<Doc>(candidate).with_context(|| {
                format!(
                    "💀 Line {} of '{}' dressed up as a JSON object and failed the audition. \
                    The file is corrupt or was exported by something with strong opinions. \
                    Refusing to load a file we only partially understand.",
                    self.line_no,
                    self.path.display()
                )
            })?;

            return Ok(Some(doc));
        }
    }
}

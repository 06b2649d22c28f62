//! 📊 The scoreboard. Someone has to count, and the loaders are busy.
//!
//! Ancient proverb: a bulk load with no progress line is indistinguishable
//! from a hang. You stare at the cursor. The cursor stares back. Is it
//! loading ten thousand documents a second or is it deadlocked on a mutex
//! you forgot you owned? Nobody knows. The terminal keeps its secrets.
//!
//! So: every worker reports every success and every retry here, and every
//! hundredth success (configurable, but a hundred is a good rhythm) this
//! module prints one line — how many docs are in, how wide the loader cap
//! currently is, how long the last stretch took, and how long we've been
//! at this. Four numbers. Enough to answer "is it working" and "should I
//! get coffee or lunch" without grepping anything.
//!
//! At the end, [`LoadMetrics::finish`] folds the whole run into a
//! [`RunSummary`] — the artifact you paste into the channel when someone
//! asks how the backfill went.

use std::fmt;
use std::time::{Duration, Instant};

use comfy_table::{Cell, CellAlignment, Table, presets};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::Mutex;
use tracing::debug;

/// 🧮 The mutable half of the scoreboard, kept behind one lock because the
/// numbers move together or not at all.
struct MetricsState {
    docs_loaded: u64,
    retries: u64,
    last_report_at: Instant,
    reports_emitted: u64,
}

/// 📊 Shared run metrics plus the terminal spinner they feed.
///
/// Workers call [`record_success`](LoadMetrics::record_success) and
/// [`record_retry`](LoadMetrics::record_retry) from wherever they are;
/// everything contends on a single async mutex, which sounds like a
/// bottleneck until you remember every increment sits next to an HTTP
/// round-trip. The lock is not your problem. The network is your problem.
pub(crate) struct LoadMetrics {
    state: Mutex<MetricsState>,
    started_at: Instant,
    /// 🥁 report cadence: a progress line every Nth successful write.
    report_every: u64,
    progress_bar: ProgressBar,
}

impl LoadMetrics {
    pub(crate) fn new(report_every: u64) -> Self {
        let progress_bar = ProgressBar::new_spinner();
        progress_bar.set_style(
            ProgressStyle::with_template("{spinner:.green} {msg}")
                // -- 🔒 safe unwrap: hardcoded template, parsed at startup, cannot fail
                // -- unless someone edits the string above, in which case: their problem now
                .unwrap(),
        );
        let now = Instant::now();
        Self {
            state: Mutex::new(MetricsState {
                docs_loaded: 0,
                retries: 0,
                last_report_at: now,
                reports_emitted: 0,
            }),
            started_at: now,
            // ⚠️ a cadence of zero would make the modulo below divide by zero.
            // zero means "you clearly wanted every write" is a lie; it means
            // someone fat-fingered a config. clamp to 1 and move on.
            report_every: report_every.max(1),
            progress_bar,
        }
    }

    /// ✅ One document landed. Every `report_every`-th landing prints the line.
    ///
    /// `current_cap` rides along so the progress line can show how throttled
    /// we currently are — watching the cap sink during a load is the single
    /// most informative thing on the screen.
    pub(crate) async fn record_success(&self, current_cap: usize) {
        let mut state = self.state.lock().await;
        state.docs_loaded += 1;
        if state.docs_loaded % self.report_every != 0 {
            return;
        }

        let since_last = state.last_report_at.elapsed().as_secs_f64();
        let elapsed = self.started_at.elapsed();

        // 📊 one row, four cells, no borders. comfy-table does the column
        // padding so the line doesn't wobble as the numbers grow digits.
        let mut table = Table::new();
        table.load_preset(presets::NOTHING);
        table.add_row(vec![
            Cell::new(format!("{} docs", format_number(state.docs_loaded)))
                .set_alignment(CellAlignment::Right),
            Cell::new(format!("cap {current_cap}")).set_alignment(CellAlignment::Right),
            Cell::new(format!("{since_last:.2}s since last")).set_alignment(CellAlignment::Right),
            Cell::new(format!("{} elapsed", format_duration(elapsed)))
                .set_alignment(CellAlignment::Right),
        ]);
        let line = table.to_string();
        self.progress_bar.set_message(line.clone());
        debug!("📊 {}", line);

        state.last_report_at = Instant::now();
        state.reports_emitted += 1;
    }

    /// 🔄 One write bounced off a rate limit and is going around again.
    pub(crate) async fn record_retry(&self) {
        self.state.lock().await.retries += 1;
    }

    /// 🔍 (docs_loaded, retries) — for asserting, not for reporting.
    #[cfg(test)]
    pub(crate) async fn snapshot(&self) -> (u64, u64) {
        let state = self.state.lock().await;
        (state.docs_loaded, state.retries)
    }

    /// 🔍 How many progress lines have actually been printed.
    #[cfg(test)]
    pub(crate) async fn reports_emitted(&self) -> u64 {
        self.state.lock().await.reports_emitted
    }

    /// 🏁 Stop the spinner, fold the counters into a [`RunSummary`].
    pub(crate) async fn finish(&self) -> RunSummary {
        self.progress_bar.finish_and_clear();
        let state = self.state.lock().await;
        RunSummary {
            docs_loaded: state.docs_loaded,
            retries: state.retries,
            elapsed: self.started_at.elapsed(),
        }
    }
}

// -- 🎭 hand-rolled Debug: the spinner has no secrets worth printing and no
// -- appetite for being printed. the counters are behind a lock anyway.
impl fmt::Debug for LoadMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadMetrics")
            .field("report_every", &self.report_every)
            .finish_non_exhaustive()
    }
}

/// 🏁 What a finished run looks like on paper.
///
/// The fields are raw numbers so callers can do math; the `*_display`
/// helpers render them the way the final report table wants them, so the
/// formatting opinions live here instead of leaking into every caller.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub docs_loaded: u64,
    pub retries: u64,
    pub elapsed: Duration,
}

impl RunSummary {
    /// 📈 Sustained throughput across the whole run.
    /// Zero elapsed yields zero rows/sec rather than a division accident.
    pub fn rows_per_sec(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.docs_loaded as f64 / secs
    }

    pub fn docs_loaded_display(&self) -> String {
        format_number(self.docs_loaded)
    }

    pub fn retries_display(&self) -> String {
        format_number(self.retries)
    }

    pub fn elapsed_display(&self) -> String {
        format_duration(self.elapsed)
    }
}

/// ⏱️ `mm:ss`, growing to `hh:mm:ss` when a load earns its third colon digit.
fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    if hours > 0 {
        format!("{hours:02}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes:02}:{seconds:02}")
    }
}

/// 🧮 1234567 → "1,234,567". Eyes parse commas. Eyes do not parse 7-digit runs.
fn format_number(number: u64) -> String {
    let digits = number.to_string();
    let mut formatted = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            formatted.push(',');
        }
        formatted.push(ch);
    }
    formatted
}

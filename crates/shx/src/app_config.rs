//! 🔧 Configuration — where env vars and TOML files learn to share.
//!
//! 📡 "It worked on my machine because my machine had the env var."
//!     — the first line of every config postmortem ever written 🦆
//!
//! 🏗️ Powered by Figment, because hand-rolling an env-var parser is how you
//! end up with a second, worse Figment that only you can debug.
//!
//! The layering is simple and you should not make it more interesting:
//! environment variables (SHX_*) go in first as the base coat, then the
//! TOML file (if one was given) paints over them. File beats env. Anyone
//! who wants the opposite can delete the line from their file.

use std::path::{Path, PathBuf};

use anyhow::Context;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;
use tracing::info;

// 🔄 the store config lives next to the store it configures; we re-export it
// here so callers assembling an AppConfig only need one import path.
pub use crate::store::CosmosStoreConfig;

/// 📦 Everything the loader needs to know about itself before it starts.
///
/// `store` is optional at the parsing layer because the CLI supplies it from
/// positional arguments — a config file that only sets `[load]` knobs is a
/// perfectly good config file. A RUN without a store is not a good run, and
/// gets rejected at startup with words to that effect.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    /// 🚜 Batch sizes, loader caps, cadences. The knobs.
    #[serde(default)]
    pub load: LoadConfig,
    /// 📡 Where the documents go.
    pub store: Option<StoreConfig>,
}

/// 🚜 The load-shaping knobs, all of them optional, all of them defaulted.
///
/// The defaults describe a polite loader: 25-document batches, six
/// concurrent loaders, a progress line every hundred documents. Large
/// enough to be worth the HTTP, small enough that a single 429 doesn't
/// strand much work behind it.
#[derive(Debug, Deserialize, Clone)]
pub struct LoadConfig {
    /// 📦 Documents per dispatched batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// 🚦 Upper bound on concurrently running loader tasks. The throttle
    /// may lower it mid-run; it never raises it.
    #[serde(default = "default_max_loaders")]
    pub max_loaders: usize,
    /// 📊 Progress line cadence, in successful writes.
    #[serde(default = "default_report_every")]
    pub report_every: u64,
    /// 📂 Where the data files live. When unset, the loader probes the
    /// conventional spots (see [`resolve_data_files`]).
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    /// 📂 Which files to load, in order. Order matters to nobody but the
    /// humans watching the progress lines, which is to say: it matters.
    #[serde(default = "default_files")]
    pub files: Vec<String>,
}

/// 🔧 Serde's errand boys. The attributes up top are the boss.
fn default_batch_size() -> usize {
    25
}
fn default_max_loaders() -> usize {
    6
}
fn default_report_every() -> u64 {
    100
}
// 📂 the standard catalog set, featured first so the demo rows show up
// quickly and everyone relaxes.
fn default_files() -> Vec<String> {
    vec![
        "featured.json".to_string(),
        "genres.json".to_string(),
        "movies.json".to_string(),
        "actors.json".to_string(),
    ]
}

impl Default for LoadConfig {
    fn default() -> Self {
        // 🎯 same numbers as the serde defaults, on purpose. two sources of
        // default that agree is a feature; two that disagree is a haunting.
        Self {
            batch_size: default_batch_size(),
            max_loaders: default_max_loaders(),
            report_every: default_report_every(),
            data_dir: None,
            files: default_files(),
        }
    }
}

impl LoadConfig {
    /// 🚪 The bouncer for nonsense values. Zero-sized batches and zero-beat
    /// cadences parse fine and then divide the run by zero in spirit, so we
    /// reject them here, at startup, with names attached.
    pub(crate) fn validate(&self) -> anyhow::Result<()> {
        if self.batch_size == 0 {
            anyhow::bail!(
                "💀 batch_size is 0. A batch of zero documents is a meditation practice, \
                not a bulk load. Set it to at least 1."
            );
        }
        if self.report_every == 0 {
            anyhow::bail!(
                "💀 report_every is 0. We admire the enthusiasm for progress reporting \
                but the cadence must be at least 1."
            );
        }
        // 🚦 max_loaders of 0 (or 1, or 2) is handled downstream by clamping
        // to the minimum of 3 rather than rejected here. Tiny is a choice.
        Ok(())
    }
}

/// 📡 Which store backend to write into.
///
/// Externally tagged, so TOML spells it `[store.Cosmos]` with the fields
/// underneath, or `store = "InMemory"` for the backend with no network and
/// no memory of your documents after the process exits. InMemory exists for
/// benches and rehearsals; if you ship it to production, the data loss is
/// self-documenting.
#[derive(Debug, Deserialize, Clone)]
pub enum StoreConfig {
    Cosmos(CosmosStoreConfig),
    InMemory,
}

/// 🚀 Load the config — from env vars, from a TOML file, or from both.
///
/// 📐 DESIGN NOTE (tribal knowledge, now written down):
///   - `config_file_name` of None → env vars only. No file probing here —
///     whether a default file exists is the CLI's call, not this layer's.
///   - Some(path) → env vars + that TOML file, merged. TOML wins conflicts.
///   Figment's file provider shrugs at missing files instead of erroring,
///   which is why callers that CARE whether the file exists check before
///   calling — a typo'd --config path that silently no-ops is a cruel bug.
pub fn load_config(config_file_name: Option<&Path>) -> anyhow::Result<AppConfig> {
    info!(
        "🔧 loading configuration: {:?}",
        config_file_name.unwrap_or(Path::new("<env only>"))
    );

    // 🏗️ env vars first, as the base layer. ALL SHX_* vars are welcome.
    let config = Figment::new().merge(Env::prefixed("SHX_"));

    // 🎯 then the file, if the caller brought one.
    let config = match config_file_name {
        Some(file_name) => config.merge(Toml::file(file_name)),
        None => config,
    };

    // 💬 a context message that names its sources, because "invalid type"
    // with no filename is how config errors make enemies.
    let context_msg = match config_file_name {
        Some(path) => format!(
            "💀 Failed to parse configuration from file '{}' and environment variables (SHX_*). \
             One of them is lying about its schema.",
            path.display()
        ),
        None => "💀 Failed to parse configuration from environment variables (SHX_*). \
                 No file was involved. The environment did this alone."
            .to_string(),
    };

    config.extract().context(context_msg)
}

/// 📂 Turn the configured file list into concrete paths.
///
/// With `data_dir` set, that directory is the law — if it doesn't exist,
/// that's an error with the path in it, not a silent fallback. With no
/// `data_dir`, we probe the conventional spots: `../data` (running from a
/// checkout's bin directory) and `../../../data` (running from deep inside
/// a build tree). First directory that exists wins.
///
/// This function resolves paths; it does not open them. A file that's
/// missing from an existing data dir fails later, at open time, with the
/// filename in the error where it belongs.
pub(crate) fn resolve_data_files(load: &LoadConfig) -> anyhow::Result<Vec<PathBuf>> {
    if load.files.is_empty() {
        anyhow::bail!(
            "💀 The file list is empty. Zero files, zero documents, zero reasons to run. \
            Put something in `files` or stop early like this, your call."
        );
    }

    let data_dir = match &load.data_dir {
        Some(dir) => {
            if !dir.is_dir() {
                anyhow::bail!(
                    "💀 data_dir '{}' is not a directory we can find. You told us exactly \
                    where to look, so we're not going to guess somewhere else.",
                    dir.display()
                );
            }
            dir.clone()
        }
        None => {
            // 🔍 the conventional spots, nearest first
            let candidates = [Path::new("../data"), Path::new("../../../data")];
            candidates
                .iter()
                .find(|candidate| candidate.is_dir())
                .map(|candidate| candidate.to_path_buf())
                .context(
                    "💀 Couldn't find a data directory. We looked at '../data' and '../../../data'. \
                    Under the couch. Behind the fridge. Nothing. Set `data_dir` explicitly and \
                    this stops being a scavenger hunt.",
                )?
        }
    };

    Ok(load.files.iter().map(|file| data_dir.join(file)).collect())
}

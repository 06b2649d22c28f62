//! 🚀 shx — the front door, the maitre d', the guy with the clipboard.
//!
//! 🎬 *[narrator voice]* "Four arguments walked into a terminal..."
//! 📦 This binary crate is the thin CLI wrapper: parse args, set up
//! logging, load config, hand everything to the library, then draw one
//! table and leave. The heavy lifting happens elsewhere. Like a manager. 🦆

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use comfy_table::{Cell, CellAlignment, Table, presets};
use shx::RunSummary;
use shx::app_config::{CosmosStoreConfig, StoreConfig, load_config};
use tracing::error;
use tracing_subscriber::EnvFilter;

/// 🚜 Bulk-load pseudo-JSON-array files into a document store.
///
/// Reads every configured data file, cuts the records into batches, and
/// upserts each document with bounded, self-throttling concurrency. The
/// store connection comes from these four arguments; everything else
/// (batch size, loader cap, file list, data directory) comes from the
/// config file and SHX_* environment variables.
#[derive(Debug, Parser)]
#[command(name = "shx", version)]
struct Cli {
    /// Account name ("mystuff") or a full base URL ("http://localhost:8081")
    endpoint: String,
    /// Access key, sent verbatim in the authorization header
    key: String,
    /// Database name
    database: String,
    /// Collection name
    collection: String,
    /// Path to a TOML config file [default: ./shx.toml, if present]
    #[arg(long)]
    config: Option<PathBuf>,
}

/// 🚀 main() — where it all begins. Parse, configure, run, report, exit.
///
/// 🔧 Steps:
/// 1. Init tracing (so we can see what goes wrong, and when)
/// 2. Parse args (clap does the yelling about missing ones)
/// 3. Load config (the moment of truth)
/// 4. Run the load (send it 🙏)
/// 5. Print the final table, or the error chain, whichever we earned
#[tokio::main]
async fn main() -> Result<()> {
    // 📡 tracing first — a failure before logging exists is a failure
    // nobody gets to read about
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let config_file = resolve_config_file(cli.config.as_deref())?;
    let mut app_config = load_config(config_file.as_deref()).context(
        "💀 The config didn't load. Take a look at the file, make sure the TOML is \
        actually TOML and nobody put a tab where a space should be (looking at you, Kevin)",
    )?;

    // 🔌 the positional args own the store connection, wholesale. if the
    // config file also has a [store] section, it loses — entirely, not
    // field-by-field. half-merged connection settings are how you load
    // production data into the staging account.
    app_config.store = Some(StoreConfig::Cosmos(CosmosStoreConfig::new(
        cli.endpoint.trim(),
        cli.key.trim(),
        cli.database.trim(),
        cli.collection.trim(),
    )));

    // 🚀 SEND IT. No take-backs.
    let summary = match shx::run(app_config).await {
        Ok(summary) => summary,
        Err(err) => {
            print_error_chain(&err);
            // 🗑️ Exit with prejudice. Process exitus maximus.
            std::process::exit(1);
        }
    };

    // ✅ the final table goes to stdout on purpose — it's the product of the
    // run, not telemetry about the run. logs are for tracing; this is for eyes.
    println!();
    println!("{}", summary_table(&summary));
    Ok(())
}

/// 🔒 Figure out which config file, if any, to hand to the loader.
///
/// An explicit `--config` that points at nothing is a hard error — a flag
/// that silently no-ops on a typo'd path is a cruel bug to hand somebody.
/// No flag means we check for the ol' reliable `shx.toml` and shrug if it
/// isn't there; env vars and defaults carry the run alone just fine.
fn resolve_config_file(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
    if let Some(path) = explicit {
        let exists = path.try_exists().context(format!(
            "💀 Couldn't even CHECK whether '{}' exists. Permissions? A directory that \
            isn't? Either way the filesystem is being cagey about it.",
            path.display()
        ))?;
        if !exists {
            anyhow::bail!(
                "💀 --config points at '{}' and there's nothing there. Double check the path, \
                or maybe it's a pwd/cwd relative-path situation. In that case, use an absolute \
                path, to be absolutely certain you are not messing this up.",
                path.display()
            );
        }
        return Ok(Some(path.to_path_buf()));
    }

    let default = Path::new("shx.toml");
    let exists = default
        .try_exists()
        .context("💀 Couldn't check the current directory for shx.toml. That's a new one.")?;
    Ok(exists.then(|| default.to_path_buf()))
}

/// 💀 Print the error and every cause under it, in a way that's helpful at 3am.
fn print_error_chain(err: &anyhow::Error) {
    error!("💀 error: {}", err);
    // -- 🧅 peel the onion of sadness, one tear-jerking layer at a time
    let mut the_vibes_are_giving_connection_issues = false;
    for cause in err.chain().skip(1) {
        error!("⚠️  cause: {}", cause);
        // -- 🕵️ sniff each cause like a truffle pig hunting for network problems
        let cause_str = cause.to_string();
        if cause_str.contains("error sending request")
            || cause_str.contains("connection refused")
            || cause_str.contains("Connection refused")
            || cause_str.contains("tcp connect error")
            || cause_str.contains("dns error")
        {
            the_vibes_are_giving_connection_issues = true;
        }
    }

    // -- 📡 if it smells like a connection problem, it's probably a connection problem
    if the_vibes_are_giving_connection_issues {
        error!(
            "🔧 hint: the store endpoint doesn't look reachable. If you passed an account \
            name, double-check the spelling. If you're loading into a local emulator, make \
            sure it's actually running — `docker ps` to see what's up, `docker compose up -d` \
            to resurrect it. Even databases need a nudge sometimes. ☕"
        );
    }
}

/// 📊 The run, as a table. Label on the left, number on the right,
/// no borders — it's a receipt, not a spreadsheet.
fn summary_table(summary: &RunSummary) -> Table {
    let mut table = Table::new();
    table.load_preset(presets::NOTHING);
    table.add_row(vec![
        Cell::new("Documents Loaded"),
        Cell::new(summary.docs_loaded_display()).set_alignment(CellAlignment::Right),
    ]);
    table.add_row(vec![
        Cell::new("Elapsed Time"),
        Cell::new(summary.elapsed_display()).set_alignment(CellAlignment::Right),
    ]);
    table.add_row(vec![
        Cell::new("Rows / Second"),
        Cell::new(format!("{:.0}", summary.rows_per_sec())).set_alignment(CellAlignment::Right),
    ]);
    table.add_row(vec![
        Cell::new("Retries"),
        Cell::new(summary.retries_display()).set_alignment(CellAlignment::Right),
    ]);
    table
}

use std::io::{self, BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use clap::{CommandFactory, Parser};
use serde::Serialize;

use ffind_indexer::{
    BuildConfig, DEFAULT_LIMIT, Index, IndexBuilder, IndexStats, IndexUpdater, IndexerError,
    PragmaConfig, Result, Snapshot,
    cli::{Cli, Commands, OutputFormat},
    error::ExitCode,
    search::{SearchConfig, Searcher},
    validate_root, watch,
};

/// Everything a subcommand needs once the root is resolved.
struct RunContext {
    root: PathBuf,
    snapshot: PathBuf,
    build_config: BuildConfig,
    pragma_config: PragmaConfig,
    quiet: bool,
}

#[derive(Serialize)]
struct StatsOutput<'a> {
    root: &'a Path,
    snapshot: &'a Path,
    #[serde(flatten)]
    index: IndexStats,
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays clean for results.
    // RUST_LOG overrides the default WARN level; --quiet disables logging.
    if !cli.quiet {
        tracing_subscriber::fmt()
            .with_target(false)
            .with_level(true)
            .with_writer(std::io::stderr)
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .init();
    }

    if cli.command.is_none() && cli.query.is_empty() {
        eprintln!("{}", Cli::command().render_help());
        return ExitCode::NoInput.into();
    }

    let ctx = match resolve_context(&cli) {
        Ok(ctx) => ctx,
        Err(e) => {
            tracing::error!(error = %e, "Failed to resolve root directory");
            return ExitCode::from(&e).into();
        }
    };

    let result = match &cli.command {
        Some(Commands::Index { no_save }) => run_index(&ctx, *no_save),
        Some(Commands::Search { query, limit, format, rebuild }) => {
            run_search(&ctx, &query.join(" "), *limit, format.unwrap_or_default(), *rebuild)
        }
        Some(Commands::Watch { limit }) => run_watch(&ctx, *limit),
        Some(Commands::Stats { format }) => run_stats(&ctx, format.unwrap_or_default()),
        None => {
            let query = cli.query_string().unwrap_or_default();
            run_search(&ctx, &query, DEFAULT_LIMIT, OutputFormat::Plain, false)
        }
    };

    match result {
        Ok(()) => ExitCode::Ok.into(),
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            ExitCode::from(&e).into()
        }
    }
}

fn resolve_context(cli: &Cli) -> Result<RunContext> {
    let root = cli.root()?;
    validate_root(&root)?;
    // Canonical so walk paths and watcher paths agree.
    let root = root.canonicalize().map_err(|e| IndexerError::InvalidRoot {
        path: root.display().to_string(),
        reason: e.to_string(),
    })?;
    let snapshot = cli.snapshot_path(&root)?;

    Ok(RunContext {
        root,
        snapshot,
        build_config: cli.build_config(),
        pragma_config: cli.pragma_config(),
        quiet: cli.quiet,
    })
}

fn build(ctx: &RunContext) -> Result<Index> {
    let (index, stats) =
        IndexBuilder::new(&ctx.root, ctx.build_config.clone()).exclude(&ctx.snapshot).build()?;

    tracing::info!(
        files = stats.files_indexed,
        vanished = stats.files_vanished,
        errors = stats.walk_errors,
        duration_secs = %format!("{:.2}", stats.duration.as_secs_f64()),
        "Indexing complete"
    );
    if !ctx.quiet {
        eprintln!(
            "Indexed {} files in {:.2}s",
            stats.files_indexed,
            stats.duration.as_secs_f64()
        );
    }

    Ok(index)
}

fn save(ctx: &RunContext, index: &Index) -> Result<()> {
    Snapshot::save(index, &ctx.snapshot, &ctx.root, &ctx.pragma_config)?;
    Ok(())
}

/// Save for commands where the snapshot only speeds up the next run.
fn save_best_effort(ctx: &RunContext, index: &Index) {
    if let Err(e) = save(ctx, index) {
        tracing::warn!(
            error = %e,
            snapshot = %ctx.snapshot.display(),
            "Failed to save snapshot, continuing without one"
        );
    }
}

/// Load the snapshot, or walk the root and save a fresh one.
///
/// A corrupted snapshot or one built for another root is rebuilt. A
/// snapshot path owned by another application is an error. Failing to save
/// the fresh snapshot is logged and the built index is still returned.
fn load_or_build(ctx: &RunContext, rebuild: bool) -> Result<Index> {
    if !rebuild && ctx.snapshot.exists() {
        match Snapshot::load(&ctx.snapshot) {
            Ok((index, meta)) if Path::new(&meta.root) == ctx.root => return Ok(index),
            Ok((_, meta)) => {
                tracing::warn!(
                    snapshot_root = %meta.root,
                    root = %ctx.root.display(),
                    "Snapshot belongs to a different root, rebuilding"
                );
            }
            Err(e) if e.is_snapshot_unusable() => {
                tracing::warn!(error = %e, "Snapshot unusable, rebuilding");
            }
            Err(e) => return Err(e),
        }
    }

    let index = build(ctx)?;
    save_best_effort(ctx, &index);
    Ok(index)
}

fn run_index(ctx: &RunContext, no_save: bool) -> Result<()> {
    let index = build(ctx)?;
    if !no_save {
        save(ctx, &index)?;
    }
    Ok(())
}

fn run_search(
    ctx: &RunContext,
    query: &str,
    limit: usize,
    format: OutputFormat,
    rebuild: bool,
) -> Result<()> {
    let index = load_or_build(ctx, rebuild)?;
    let searcher = Searcher::new(&index, SearchConfig { format, max_results: limit });
    let results = searcher.search(query);
    searcher.format_results(&results, &mut io::stdout().lock())
}

fn run_stats(ctx: &RunContext, format: OutputFormat) -> Result<()> {
    let index = load_or_build(ctx, false)?;
    let output = StatsOutput { root: &ctx.root, snapshot: &ctx.snapshot, index: index.stats() };
    let mut out = io::stdout().lock();

    match format {
        OutputFormat::Json => {
            writeln!(out, "{}", serde_json::to_string_pretty(&output)?)?;
        }
        OutputFormat::Plain => {
            writeln!(out, "root:           {}", output.root.display())?;
            writeln!(out, "snapshot:       {}", output.snapshot.display())?;
            writeln!(out, "records:        {}", output.index.records)?;
            writeln!(out, "unique names:   {}", output.index.unique_names)?;
            writeln!(out, "paths:          {}", output.index.paths)?;
            writeln!(out, "suffix keys:    {}", output.index.suffix_keys)?;
            writeln!(
                out,
                "longest suffix: {}",
                output.index.longest_suffix.as_deref().unwrap_or("-")
            )?;
        }
    }
    Ok(())
}

/// Interactive loop: one query per stdin line until `quit` or EOF, while
/// filesystem changes flow into the index.
fn run_watch(ctx: &RunContext, limit: usize) -> Result<()> {
    let index = Arc::new(load_or_build(ctx, false)?);
    let updater = IndexUpdater::spawn(Arc::clone(&index))?;
    let watcher = watch::watch(&ctx.root, &ctx.snapshot, updater.sender())?;

    let searcher =
        Searcher::new(&index, SearchConfig { format: OutputFormat::Plain, max_results: limit });
    let stdin = io::stdin();
    let interactive = stdin.is_terminal();
    let mut out = io::stdout().lock();

    if interactive {
        eprintln!("Type a query, or `quit` to exit.");
    }
    prompt(interactive)?;

    for line in stdin.lock().lines() {
        let line = line?;
        let query = line.trim();
        if query == "quit" {
            break;
        }
        if !query.is_empty() {
            let start = Instant::now();
            let results = searcher.search(query);
            let elapsed = start.elapsed();

            searcher.format_results(&results, &mut out)?;
            writeln!(
                out,
                "-- {} results in {:.3} ms",
                results.len(),
                elapsed.as_secs_f64() * 1000.0
            )?;
            out.flush()?;
        }
        prompt(interactive)?;
    }

    // Dropping the watcher releases its sender so the updater can drain.
    drop(watcher);
    updater.finish();
    save_best_effort(ctx, &index);
    Ok(())
}

fn prompt(interactive: bool) -> Result<()> {
    if interactive {
        let mut err = io::stderr().lock();
        write!(err, "> ")?;
        err.flush()?;
    }
    Ok(())
}

mod chat;

use std::fmt::Write as _;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use codechat_core::bootstrap::{build_codechat, resolve_config_path};
use codechat_core::{Answer, CodeChat, Config, IndexStats, JobStatus};
use codechat_index::SearchHit;
use codechat_index::context::chunk_display_header;
use codechat_llm::AnyProvider;
use dialoguer::Confirm;

#[derive(Debug, Parser)]
#[command(name = "codechat", version, about = "Ask questions about a code repository")]
struct Cli {
    /// Config file (default: `CODECHAT_CONFIG` or config/codechat.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Index a repository, printing progress until the run finishes
    Ingest {
        root: PathBuf,
        /// Keep running and re-ingest after file changes
        #[arg(long)]
        watch: bool,
    },
    /// Answer one question with citations
    Ask {
        question: String,
        #[arg(short, long)]
        k: Option<usize>,
    },
    /// Interactive multi-turn conversation
    Chat {
        #[arg(short, long)]
        k: Option<usize>,
    },
    /// Nearest chunks for a text, without generation
    Search {
        text: String,
        #[arg(short, long)]
        k: Option<usize>,
        /// Only search chunks of this indexed file (path relative to the repository root)
        #[arg(long)]
        file: Option<String>,
    },
    /// Index size per language and chunk type
    Stats,
    /// Clear the index and job state
    Reset {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_subscriber(cli.log_file.as_deref())?;

    let config_path = resolve_config_path(cli.config.as_deref());
    let config = Config::load(&config_path)?;
    let codechat = build_codechat(&config).await?;

    match cli.command {
        Command::Ingest { root, watch } => ingest(&codechat, &root, watch).await,
        Command::Ask { question, k } => {
            let answer = codechat.query(&question, k, &[]).await?;
            println!("{}", render_answer(&answer));
            Ok(())
        }
        Command::Chat { k } => chat::run(&codechat, k).await,
        Command::Search { text, k, file } => {
            let hits = match file {
                Some(file) => codechat.search_in_file(&text, &file, k).await?,
                None => codechat.search(&text, k).await?,
            };
            println!("{}", render_hits(&hits));
            Ok(())
        }
        Command::Stats => {
            println!("{}", render_stats(&codechat.stats().await?));
            Ok(())
        }
        Command::Reset { yes } => reset(&codechat, yes).await,
    }
}

fn init_subscriber(log_file: Option<&Path>) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if let Some(path) = log_file {
        let file = std::fs::File::create(path)
            .with_context(|| format!("failed to create log file {}", path.display()))?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(file)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
    Ok(())
}

async fn ingest(codechat: &CodeChat<AnyProvider>, root: &Path, watch: bool) -> anyhow::Result<()> {
    let handle = codechat.ingest(root)?;
    let run_id = handle.run_id();

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut cancelled = false;
    let mut ticker = tokio::time::interval(Duration::from_millis(250));

    loop {
        tokio::select! {
            _ = &mut ctrl_c, if !cancelled => {
                cancelled = true;
                codechat.cancel();
                eprintln!("\ncancelling after the current file...");
            }
            _ = ticker.tick() => {}
        }
        let status = codechat.job_status();
        if status.run_id != run_id || status.is_finished() {
            break;
        }
        eprint!("\r{}", render_progress(&status));
        let _ = std::io::stderr().flush();
    }

    let status = handle.wait().await;
    eprintln!("\r{}", render_progress(&status));
    if let Some(failure) = &status.error {
        bail!("ingestion failed: {}", failure.message);
    }
    println!("{}", render_summary(&status));

    if watch {
        let watcher = codechat.watch(root)?;
        println!("watching {} for changes, press Ctrl-C to stop", root.display());
        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for ctrl-c")?;
        watcher.stop().await;
    }
    Ok(())
}

async fn reset(codechat: &CodeChat<AnyProvider>, yes: bool) -> anyhow::Result<()> {
    if !yes {
        let confirmed = Confirm::new()
            .with_prompt("Delete every indexed chunk?")
            .default(false)
            .interact()?;
        if !confirmed {
            println!("reset aborted");
            return Ok(());
        }
    }
    codechat.reset().await?;
    println!("index cleared");
    Ok(())
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn render_progress(status: &JobStatus) -> String {
    format!(
        "[{}] {:>3}% {} files, {} chunks",
        status.state,
        (status.progress * 100.0).round() as u32,
        status.files_processed,
        status.chunks_produced
    )
}

fn render_summary(status: &JobStatus) -> String {
    let mut out = format!(
        "indexed {} files in {} ms: {} chunks ({} unchanged), {} removed, {} files skipped",
        status.files_processed,
        status.duration_ms,
        status.chunks_produced,
        status.chunks_unchanged,
        status.chunks_removed,
        status.files_skipped
    );
    if let Some(repo) = &status.repo {
        let _ = write!(out, "\nrepository: {}", repo.name);
        if let Some(branch) = &repo.branch {
            let _ = write!(out, " on {branch}");
        }
        if let Some(commit) = &repo.commit {
            let _ = write!(out, " @ {commit}");
        }
    }
    out
}

pub(crate) fn render_answer(answer: &Answer) -> String {
    let mut out = answer.answer.clone();
    if !answer.citations.is_empty() {
        out.push_str("\n\nSources:");
        for c in &answer.citations {
            let _ = write!(
                out,
                "\n  [{}] {}:{}-{} (score {:.3})",
                c.label, c.file_path, c.start_line, c.end_line, c.score
            );
        }
    }
    out
}

fn render_hits(hits: &[SearchHit]) -> String {
    if hits.is_empty() {
        return "no results".into();
    }
    hits.iter()
        .enumerate()
        .map(|(i, h)| format!("{:>2}. {:.3}  {}", i + 1, h.score, chunk_display_header(&h.chunk)))
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_stats(stats: &IndexStats) -> String {
    let mut out = format!(
        "total chunks: {}\nfiles: {}",
        stats.total_chunks, stats.files
    );
    if !stats.languages.is_empty() {
        out.push_str("\nlanguages:");
        for (lang, count) in &stats.languages {
            let _ = write!(out, "\n  {lang:<20} {count}");
        }
    }
    if !stats.kinds.is_empty() {
        out.push_str("\nchunk types:");
        for (kind, count) in &stats.kinds {
            let _ = write!(out, "\n  {kind:<20} {count}");
        }
    }
    out
}

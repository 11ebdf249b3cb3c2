//! CLI entry point for the bookshelf tool.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use bookshelf_core::{
    CandidateMetadata, Config, Database, Ledger, LookupCache, Pipeline, QuerySignature,
    ReconcilePolicy, SourceTag, build_default_resolver_registry,
    configure_resolver_http_timeouts,
};
use clap::Parser;
use tracing::{debug, info, warn};

mod app_config;
mod cli;

use app_config::FileConfig;
use cli::{Args, CacheCommand, Command, CorrectArgs, OrganizeArgs};

/// Confidence given to metadata typed in by the user.
const MANUAL_CONFIDENCE: f64 = 1.0;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?args, "CLI arguments parsed");

    let file_config = app_config::load_file_config(args.config.as_deref())?;
    configure_resolver_http_timeouts(
        file_config.resolver_connect_timeout_secs.unwrap_or(10),
        file_config.resolver_read_timeout_secs.unwrap_or(30),
    );

    match args.command {
        Command::Organize(organize) => run_organize(organize, &file_config).await,
        Command::Unlocated { dest } => run_unlocated(&dest, &file_config).await,
        Command::Correct(correct) => run_correct(correct, &file_config).await,
        Command::Exclude { dest, id } => {
            let pipeline = Pipeline::open(library_config(&dest, &file_config)).await?;
            let record = pipeline.exclude(id).await?;
            info!(record = id, new_record = record.id, "File excluded");
            println!(
                "excluded #{id} -> {}",
                record.final_path.as_deref().unwrap_or("(left in place)")
            );
            Ok(())
        }
        Command::CheckApis { api_key } => {
            run_check_apis(api_key.or_else(|| file_config.google_books_api_key.clone())).await
        }
        Command::Cache(cache) => run_cache(cache, &file_config).await,
    }
}

/// Library-level settings shared by every command.
fn library_config(dest: &Path, file: &FileConfig) -> Config {
    let defaults = ReconcilePolicy::default();
    let policy = ReconcilePolicy::default()
        .with_weights(file.source_weights())
        .with_similarity_threshold(
            file.similarity_threshold
                .unwrap_or(defaults.similarity_threshold),
        )
        .with_acceptance_floor(file.acceptance_floor.unwrap_or(defaults.acceptance_floor));
    let mut config = Config::new(dest)
        .with_policy(policy)
        .with_google_api_key(file.google_books_api_key.clone())
        .with_covers(file.covers.unwrap_or(false))
        .with_text_normalization(file.normalize.unwrap_or(false));
    if let Some(mode) = file.mode {
        config = config.with_mode(mode);
    }
    if let Some(pattern) = &file.pattern {
        config = config.with_pattern(pattern.clone());
    }
    if let Some(concurrency) = file.concurrency {
        config = config.with_concurrency(usize::from(concurrency));
    }
    if let Some(secs) = file.remote_timeout_secs {
        config = config.with_remote_timeout(Duration::from_secs(secs));
    }
    if let Some(floor) = file.resolver_min_confidence {
        config = config.with_resolver_min_confidence(floor);
    }
    if let Some(path) = &file.database_path {
        config = config.with_database_path(path.clone());
    }
    if let Some(extensions) = &file.excluded_extensions {
        config = config.with_excluded_extensions(extensions);
    }
    config
}

async fn run_organize(args: OrganizeArgs, file: &FileConfig) -> Result<()> {
    let mut config = library_config(&args.dest, file)
        .with_source(&args.src)
        .with_dry_run(args.dry_run);
    if let Some(mode) = args.mode {
        config = config.with_mode(mode);
    }
    if let Some(pattern) = args.pattern {
        config = config.with_pattern(pattern);
    }
    if args.covers {
        config = config.with_covers(true);
    }
    if args.api_key.is_some() {
        config = config.with_google_api_key(args.api_key);
    }
    if args.normalize {
        config = config.with_text_normalization(true);
    }
    if let Some(concurrency) = args.concurrency {
        config = config.with_concurrency(usize::from(concurrency));
    }
    if let Some(secs) = args.timeout {
        config = config.with_remote_timeout(Duration::from_secs(secs));
    }
    config.validate()?;

    let pipeline = Pipeline::open(config).await?;
    let token = pipeline.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; finishing files already in progress");
            token.cancel();
        }
    });

    let stats = pipeline.organize().await?;
    println!("{stats}");
    Ok(())
}

async fn open_library_db(dest: &Path, file: &FileConfig) -> Result<Database> {
    let config = library_config(dest, file);
    let db_path = config.database_path();
    if !db_path.exists() {
        bail!(
            "No bookshelf database at {}\n  Suggestion: Run 'bookshelf organize <SRC> {}' first",
            db_path.display(),
            dest.display()
        );
    }
    Database::new(&db_path)
        .await
        .with_context(|| format!("Failed to open {}", db_path.display()))
}

async fn run_unlocated(dest: &Path, file: &FileConfig) -> Result<()> {
    let db = open_library_db(dest, file).await?;
    let ledger = Ledger::start_run(db);
    let records = ledger.unlocated().await?;
    if records.is_empty() {
        println!("No unlocated files.");
        return Ok(());
    }
    for record in &records {
        println!(
            "#{:<6} {:<24} {}",
            record.id,
            record.reason.as_deref().unwrap_or("-"),
            record.final_path.as_deref().unwrap_or(&record.source_path)
        );
    }
    Ok(())
}

async fn run_correct(args: CorrectArgs, file: &FileConfig) -> Result<()> {
    let candidate = CandidateMetadata::new(SourceTag::Manual, MANUAL_CONFIDENCE)
        .with_title(args.title)
        .with_author(args.author)
        .with_year(args.year)
        .with_genre(args.genre)
        .with_isbn(args.isbn.as_deref());

    let pipeline = Pipeline::open(library_config(&args.dest, file)).await?;
    let record = pipeline.correct(args.id, candidate).await?;
    println!(
        "#{} -> #{} {} {}",
        args.id,
        record.id,
        record.status_str.as_deref().unwrap_or("-"),
        record.final_path.as_deref().unwrap_or("")
    );
    Ok(())
}

async fn run_check_apis(api_key: Option<String>) -> Result<()> {
    let registry = build_default_resolver_registry(api_key.as_deref());
    let mut all_available = true;
    for report in registry.check_connectivity().await {
        let state = if report.available { "ok" } else { "unavailable" };
        all_available &= report.available;
        println!(
            "{:<14} {state:<12} {}",
            report.resolver,
            report.detail.as_deref().unwrap_or("")
        );
    }
    if !all_available {
        warn!("At least one metadata source is unavailable; lookups will fall back or degrade");
    }
    Ok(())
}

async fn run_cache(command: CacheCommand, file: &FileConfig) -> Result<()> {
    match command {
        CacheCommand::Invalidate {
            dest,
            isbn,
            title,
            author,
        } => {
            let signature = match (isbn, title) {
                (Some(isbn), _) => QuerySignature::from_isbn(&isbn)
                    .with_context(|| format!("'{isbn}' is not a valid ISBN"))?,
                (None, Some(title)) => {
                    QuerySignature::from_title_author(&title, author.as_deref().unwrap_or(""))
                        .context("Title is empty")?
                }
                (None, None) => bail!("Pass --isbn or --title"),
            };
            let cache = LookupCache::new(open_library_db(&dest, file).await?);
            let removed = cache.invalidate(&signature).await?;
            cache.checkpoint().await?;
            println!(
                "{signature}: {}",
                if removed { "removed" } else { "not cached" }
            );
        }
        CacheCommand::Clear { dest } => {
            let cache = LookupCache::new(open_library_db(&dest, file).await?);
            let removed = cache.clear().await?;
            cache.checkpoint().await?;
            println!("removed {removed} cached lookups");
        }
    }
    Ok(())
}

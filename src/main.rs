/*============================================================
  Synavera Project: Syn-Mirror
  Module: synmirror::main
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Entry point for Syn-Mirror. Lists apk repository indexes
    and mirrors selected packages into a local tree with a
    rebuilt index per architecture.

  Security / Safety Notes:
    Operates within user privileges. Performs HTTP(S) GETs,
    optional object-storage reads, and writes only below the
    chosen output directory.

  Dependencies:
    clap for CLI parsing, chrono for session stamps.

  Operational Scope:
    Invoked by operators or CI jobs as `syn-mirror ls` and
    `syn-mirror cp`.

  Revision History:
    2026-10-18 COD  Authored Syn-Mirror runtime.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Result-first error handling with deterministic exits
    - Structured logging following Synavera cadence
    - Configurable execution via CLI and config file
============================================================*/

mod apkindex;
mod config;
mod error;
mod fetch;
mod listing;
mod logger;
mod package;
mod select;
mod sync;
mod version;

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use chrono::Utc;
use clap::{ArgAction, Args, Parser, Subcommand};

use config::{HttpAuth, MirrorConfig, AUTH_ENV};
use error::{MirrorError, Result};
use fetch::{http_client, ArtifactSource, IndexSource};
use listing::{write_listing, ListFormat};
use logger::Logger;
use sync::{mirror_all, ArchTarget, MirrorRequest, RunReport, Synchronizer};

/// Command-line arguments for Syn-Mirror.
#[derive(Debug, Parser)]
#[command(
    name = "Syn-Mirror",
    version,
    author = "Synavera Systems",
    about = "Conscious apk repository mirror"
)]
struct Cli {
    /// Override configuration file path.
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Explicit log file path.
    #[arg(long, value_name = "PATH", global = true)]
    log: Option<PathBuf>,
    /// Enable verbose logging to stderr.
    #[arg(long, action = ArgAction::SetTrue, global = true)]
    verbose: bool,
    /// Basic auth as `basic:<domain>:<user>:<password>` (falls back to HTTP_AUTH).
    #[arg(long, value_name = "CRED", global = true)]
    auth: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List the packages of an APKINDEX.tar.gz.
    Ls(LsArgs),
    /// Mirror packages and rebuild the local index.
    Cp(CpArgs),
}

#[derive(Debug, Args)]
struct LsArgs {
    /// `-` for stdin, a local path, or an HTTP(S) URL.
    index: String,
    /// Print the full URL or path.
    #[arg(long, action = ArgAction::SetTrue, conflicts_with = "json")]
    full: bool,
    /// Print each package as JSON.
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,
}

#[derive(Debug, Args)]
struct CpArgs {
    /// Package names to mirror; none means everything.
    #[arg(value_name = "PKG")]
    packages: Vec<String>,
    /// Repository alias or base URL.
    #[arg(long, value_name = "ALIAS|URL")]
    repo: Option<String>,
    /// Architecture to mirror; repeatable.
    #[arg(long = "arch", value_name = "ARCH", action = ArgAction::Append)]
    arches: Vec<String>,
    /// Only the newest version of each package.
    #[arg(long, action = ArgAction::SetTrue)]
    latest: bool,
    /// Output directory root.
    #[arg(long, value_name = "DIR")]
    out_dir: Option<PathBuf>,
    /// Index override (`-`, path or URL); single architecture only.
    #[arg(long, value_name = "INDEX")]
    index: Option<String>,
    /// Fetch artifacts from `bucket-name/key-prefix` instead of HTTP.
    #[arg(long, value_name = "PATH")]
    bucket: Option<String>,
    /// Fetch artifacts from a local `<DIR>/<arch>/` tree instead of HTTP.
    #[arg(long, value_name = "DIR", conflicts_with = "bucket")]
    source_dir: Option<PathBuf>,
    /// Cap on concurrent fetches per architecture.
    #[arg(long, value_name = "N")]
    jobs: Option<usize>,
    /// Resolve and print the desired set; fetch nothing.
    #[arg(long, action = ArgAction::SetTrue)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("[Syn-Mirror] {}", err);
            err.exit_code()
        }
    }
}

async fn run() -> Result<ExitCode> {
    let cli = Cli::parse();

    let config = MirrorConfig::load_from_optional_path(cli.config.as_deref())?;
    let auth = HttpAuth::resolve(cli.auth.as_deref(), std::env::var(AUTH_ENV).ok())?;

    let session_stamp = Utc::now().format("%Y-%m-%d_%H-%M-%S").to_string();
    let log_path = cli
        .log
        .clone()
        .unwrap_or_else(|| config.log_dir().join(format!("mirror_{session_stamp}.log")));
    let logger = Arc::new(Logger::new(Some(log_path), cli.verbose)?);
    logger.info("INIT", "Syn-Mirror awakening.");

    let client = http_client(&config.http)?;
    let sync = Synchronizer::new(client.clone(), auth.clone(), Arc::clone(&logger));

    let outcome = match cli.command {
        Command::Ls(args) => list_index(&client, auth.as_ref(), args).await,
        Command::Cp(args) => copy_packages(&config, &client, auth, &sync, &logger, args).await,
    };
    if let Err(err) = &outcome {
        logger.error("FATAL", err.to_string());
    }
    logger.finalize()?;
    outcome?;

    Ok(ExitCode::SUCCESS)
}

async fn list_index(
    client: &reqwest::Client,
    auth: Option<&HttpAuth>,
    args: LsArgs,
) -> Result<()> {
    let source = IndexSource::parse(&args.index);
    let bytes = source.load(client, auth).await?;
    let records = apkindex::parse_index(&bytes)?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    write_listing(
        &mut out,
        &records,
        &source.base(),
        ListFormat::from_flags(args.full, args.json),
    )?;
    out.flush()?;
    Ok(())
}

async fn copy_packages(
    config: &MirrorConfig,
    client: &reqwest::Client,
    auth: Option<HttpAuth>,
    sync: &Synchronizer,
    logger: &Logger,
    args: CpArgs,
) -> Result<()> {
    let repo = args
        .repo
        .as_deref()
        .unwrap_or(config.mirror.default_repo.as_str());
    let repo_url = config.resolve_repository(repo)?;
    let arches = if args.arches.is_empty() {
        config.mirror.arches.clone()
    } else {
        args.arches.clone()
    };
    if arches.is_empty() {
        return Err(MirrorError::Config("No architectures requested".into()));
    }
    if args.index.is_some() && arches.len() != 1 {
        return Err(MirrorError::Config(
            "--index requires exactly one --arch".into(),
        ));
    }

    let artifacts = match (args.bucket.as_deref(), args.source_dir.clone()) {
        (Some(path), _) => ArtifactSource::s3(path, &config.bucket)?,
        (None, Some(root)) => ArtifactSource::Local { root },
        (None, None) => ArtifactSource::Http {
            client: client.clone(),
            base_url: repo_url.clone(),
            auth,
        },
    };
    let targets: Vec<ArchTarget> = arches
        .iter()
        .map(|arch| ArchTarget {
            arch: arch.clone(),
            index: args
                .index
                .as_deref()
                .map(IndexSource::parse)
                .unwrap_or_else(|| IndexSource::for_repository(&repo_url, arch)),
            source: artifacts.scoped(arch),
        })
        .collect();

    let request = MirrorRequest {
        packages: args.packages.clone(),
        latest: args.latest,
        out_dir: args
            .out_dir
            .clone()
            .unwrap_or_else(|| config.mirror.out_dir.clone()),
        max_parallel: args.jobs.or(config.mirror.max_parallel_fetches),
    };
    logger.info(
        "REQUEST",
        format!(
            "repo={repo_url} arches={} packages={} latest={}",
            arches.join(","),
            request.packages.len(),
            request.latest
        ),
    );

    if args.dry_run {
        for target in &targets {
            let desired = sync.resolve(&request, target).await?;
            println!("→ {} ({} packages)", target.arch, desired.len());
            let stdout = std::io::stdout();
            write_listing(&mut stdout.lock(), &desired, "", ListFormat::Filename)?;
        }
        return Ok(());
    }

    let reports = mirror_all(sync, &request, &targets).await?;
    for report in &reports {
        print_summary(report);
    }
    logger.info("COMPLETE", "Mirror synchronised.");
    Ok(())
}

fn print_summary(report: &RunReport) {
    println!(
        "→ {} desired={} fetched={} ({} bytes) skipped={} indexed={} ({})",
        report.arch,
        report.desired,
        report.fetched,
        report.bytes,
        report.skipped,
        report.indexed,
        report.index_path.display()
    );
}

//! CLI entry point for the docfetch tool.

use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use docfetch_core::filename::file_name_from_location;
use docfetch_core::retrieval::CONNECT_TIMEOUT_SECS;
use docfetch_core::{
    DEFAULT_MAX_HANDLES, DownloadRequest, FetchPolicy, FilesystemHost, RetrievalState, Retriever,
    RetryPolicy, VerifiedFetch,
};
use tracing::{debug, info};
use url::Url;

mod cli;
mod config;
mod output;

use cli::Args;
use config::{FileConfig, load_default_file_config};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();
    let file_config = load_default_file_config()?.unwrap_or_default();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > config verbosity > info
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => file_config
                .verbosity
                .map_or("info", config::VerbositySetting::filter_directive),
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let output_dir = args
        .output_dir
        .clone()
        .or_else(|| file_config.output_dir.clone())
        .unwrap_or_else(|| PathBuf::from("."));
    let origin = args.origin.clone().or_else(|| file_config.origin.clone());
    let source = local_source_url(&args.source, origin.as_ref())?;
    let file_name = args
        .name
        .clone()
        .unwrap_or_else(|| file_name_from_location(&args.source));
    let request = DownloadRequest::new(source.clone(), file_name.clone(), args.signature()?);

    let host = Arc::new(build_host(&args, &file_config, &output_dir)?);
    let fetch = VerifiedFetch::with_options(
        None,
        file_config
            .connect_timeout_secs
            .unwrap_or(CONNECT_TIMEOUT_SECS),
    )
    .context("Failed to build HTTP client")?
    .with_policy(fetch_policy(&args, &file_config));

    let mut retriever = Retriever::new(host.clone()).with_fetch(fetch);
    if let Some(origin) = origin {
        retriever = retriever.with_origin(origin);
    }

    info!(file = %file_name, dir = %output_dir.display(), "Docfetch starting");

    let started = Instant::now();
    let show_spinner = !args.quiet && !args.json && io::stderr().is_terminal();
    let spinner = show_spinner.then(output::start_spinner);

    let retrieval = retriever.retrieve(request);
    let state = retrieval.finished().await;

    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }

    let saved_to = match state {
        RetrievalState::Succeeded => host.saved_paths().await.last().cloned(),
        _ => None,
    };

    if args.json {
        let outcome = output::Outcome::new(
            &source,
            &file_name,
            state,
            saved_to.clone(),
            started.elapsed(),
        );
        println!("{}", serde_json::to_string(&outcome)?);
    } else {
        report(state, &file_name, saved_to.as_deref(), args.quiet);
    }

    Ok(match state {
        RetrievalState::Succeeded => ExitCode::SUCCESS,
        _ => ExitCode::FAILURE,
    })
}

fn build_host(args: &Args, file_config: &FileConfig, output_dir: &Path) -> Result<FilesystemHost> {
    let max_handles = args
        .max_handles
        .or(file_config.max_handles)
        .map_or(DEFAULT_MAX_HANDLES, usize::from);
    let host = FilesystemHost::new(output_dir).with_max_handles(max_handles);

    if args.direct_remote || file_config.direct_remote.unwrap_or(false) {
        debug!("remote direct delivery enabled");
        host.with_default_remote_delivery()
            .context("Failed to build HTTP client for direct delivery")
    } else {
        Ok(host)
    }
}

fn fetch_policy(args: &Args, file_config: &FileConfig) -> FetchPolicy {
    let mut policy = FetchPolicy::default();
    if let Some(secs) = args.timeout_secs.or(file_config.timeout_secs) {
        debug!(timeout_secs = secs, "fetch timeout enabled");
        policy = policy.with_timeout(Duration::from_secs(secs));
    }
    let retries = args.max_retries.or(file_config.max_retries).unwrap_or(0);
    if retries > 0 {
        debug!(max_retries = retries, "fetch retries enabled");
        policy = policy.with_retry(RetryPolicy::with_max_attempts(u32::from(retries) + 1));
    }
    policy
}

/// Turns an existing local path into a `file://` URL when no origin is set.
fn local_source_url(source: &str, origin: Option<&Url>) -> Result<String> {
    if origin.is_some() || Url::parse(source).is_ok() {
        return Ok(source.to_string());
    }
    let path = Path::new(source);
    if !path.exists() {
        return Ok(source.to_string());
    }
    let absolute = path
        .canonicalize()
        .with_context(|| format!("Failed to resolve '{}'", path.display()))?;
    Url::from_file_path(&absolute)
        .map(String::from)
        .map_err(|()| anyhow::anyhow!("Cannot express '{}' as a file URL", absolute.display()))
}

fn report(state: RetrievalState, file_name: &str, saved_to: Option<&Path>, quiet: bool) {
    match state {
        RetrievalState::Succeeded if quiet => {}
        RetrievalState::Succeeded => match saved_to {
            Some(path) => println!("Saved {}", path.display()),
            None => println!("Saved {file_name}"),
        },
        RetrievalState::Failed(kind) => {
            eprintln!(
                "{}: {} ({kind})",
                output::state_label(state, file_name),
                output::failure_hint(kind)
            );
        }
        RetrievalState::Idle | RetrievalState::InFlight => {
            eprintln!("{}", output::FAILED_LABEL);
        }
    }
}

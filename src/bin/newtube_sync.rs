#![forbid(unsafe_code)]

//! Command-line front end for the NewTube download server.
//!
//! Lists the remote catalog with cached thumbnails, submits URLs for
//! server-side download (resolving third-party pages first) and prints the
//! media URL a player should open.

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use newtube_sync::config::{
    API_URL_KEY, CACHE_DIR_KEY, DEFAULT_ENV_PATH, SettingsOverrides, resolve_settings,
    upsert_env_value,
};
use newtube_sync::{Catalog, Session, SyncError};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "newtube-sync", version, about)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct GlobalArgs {
    /// Settings file read before the environment.
    #[arg(long, global = true, default_value = DEFAULT_ENV_PATH)]
    env_file: PathBuf,

    /// Base URL of the download server.
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Directory holding cached thumbnails.
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Synchronize and print the catalog.
    List,
    /// Ask the server to download a URL, then print the refreshed catalog.
    Submit { url: String },
    /// Print the URL a player should open for a catalog entry.
    PlayUrl { path: String },
    /// Get or generate the thumbnail for a catalog entry.
    Thumbnail { path: String },
    /// Persist --api-url / --cache-dir into the settings file.
    Configure,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let Cli { global, command } = Cli::parse();

    let settings = resolve_settings(SettingsOverrides {
        api_url: global.api_url.clone(),
        cache_dir: global.cache_dir.clone(),
        ffmpeg_bin: None,
        env_path: Some(global.env_file.clone()),
    })?;
    let session = Arc::new(Session::from_settings(&settings));

    let watcher = session.clone();
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install Ctrl+C handler");
            return;
        }
        watcher.shutdown();
    });

    match command {
        Command::List => {
            let report = session.refresh().await.map_err(notify)?;
            print_catalog(&report.catalog);
            if let Some(err) = report.error {
                return Err(notify(err));
            }
        }
        Command::Submit { url } => {
            let outcome = session.submit(&url).await.map_err(notify)?;
            if let Some(source) = &outcome.resolved_from {
                println!("Resolved {source} URL: {}", outcome.direct_url);
            }
            println!("Download complete: {}", outcome.record.name());
            println!();
            print_catalog(&outcome.refresh.catalog);
            if let Some(err) = outcome.refresh.error {
                return Err(notify(err));
            }
        }
        Command::PlayUrl { path } => {
            println!("{}", session.media_url(&path));
        }
        Command::Thumbnail { path } => {
            let thumbnail = session.thumbnail(&path).await.map_err(notify)?;
            println!("{}", thumbnail.display());
        }
        Command::Configure => configure(&global)?,
    }
    Ok(())
}

fn configure(global: &GlobalArgs) -> Result<()> {
    if global.api_url.is_none() && global.cache_dir.is_none() {
        bail!("configure needs --api-url and/or --cache-dir");
    }
    if let Some(api_url) = &global.api_url {
        upsert_env_value(&global.env_file, API_URL_KEY, api_url)
            .with_context(|| format!("saving {API_URL_KEY}"))?;
    }
    if let Some(cache_dir) = &global.cache_dir {
        upsert_env_value(&global.env_file, CACHE_DIR_KEY, &cache_dir.to_string_lossy())
            .with_context(|| format!("saving {CACHE_DIR_KEY}"))?;
    }
    println!("Settings written to {}", global.env_file.display());
    Ok(())
}

fn print_catalog(catalog: &Catalog) {
    if catalog.is_empty() {
        println!("No videos found");
        return;
    }
    for record in catalog {
        let thumbnail = record
            .thumbnail()
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("{}\t{}\t{}", record.name(), record.url(), thumbnail);
    }
}

/// Shows the user-facing notification and keeps the detail for the error
/// chain.
fn notify(err: SyncError) -> anyhow::Error {
    eprintln!("{}", err.user_message());
    anyhow::Error::new(err)
}

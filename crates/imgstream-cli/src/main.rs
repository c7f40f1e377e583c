//! imgstream CLI
//!
//! Chunked image upload, download and listing over TCP.

mod config;
mod progress;

use anyhow::Context;
use clap::{Parser, Subcommand};
use imgstream_core::{ImageClient, ImageMetadata, ImageServer};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tokio::task::JoinSet;

use config::Config;
use progress::{BatchProgress, format_bytes};

/// imgstream - chunked image transfer service
#[derive(Parser)]
#[command(name = "imgstream")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file path (default: <config dir>/imgstream/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the image server until Ctrl+C
    Serve {
        /// Listen address
        #[arg(short, long)]
        bind: Option<String>,

        /// Store directory
        #[arg(short, long)]
        store: Option<PathBuf>,
    },

    /// Upload images (default: every file in the staging directory)
    Upload {
        /// Files to upload
        paths: Vec<PathBuf>,
    },

    /// Download images into the download directory
    Download {
        /// Image names
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// List images on the server
    List {
        /// Only show names containing this string
        #[arg(short, long, default_value = "")]
        filter: String,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => Config::load_or_default()?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(if cli.verbose {
            "debug"
        } else {
            config.logging.level.as_str()
        })
        .init();

    config.validate()?;

    match cli.command {
        Commands::Serve { bind, store } => serve(bind, store, &config).await,
        Commands::Upload { paths } => upload(paths, &config).await,
        Commands::Download { names } => download(names, &config).await,
        Commands::List { filter, json } => list(&filter, json, &config).await,
    }
}

/// Run the server until Ctrl+C
async fn serve(
    bind: Option<String>,
    store: Option<PathBuf>,
    config: &Config,
) -> anyhow::Result<()> {
    let mut server_config = config.server_config();
    if let Some(bind) = bind {
        server_config.listen_addr = bind;
    }
    if let Some(store) = store {
        server_config.store_root = store;
    }

    let server = ImageServer::bind(server_config).await?;
    println!("imgstream {}", env!("CARGO_PKG_VERSION"));
    println!("Listening on: {}", server.local_addr()?);
    println!("Store: {}", server.store().root().display());
    println!("Press Ctrl+C to stop");

    server
        .serve_with_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!("Failed to listen for Ctrl+C: {}", e);
            }
        })
        .await?;

    println!("\nShutting down...");
    Ok(())
}

/// Upload every path concurrently
async fn upload(paths: Vec<PathBuf>, config: &Config) -> anyhow::Result<()> {
    let paths = if paths.is_empty() {
        staged_files(&config.client.staging_dir)?
    } else {
        paths
    };
    if paths.is_empty() {
        anyhow::bail!(
            "No files to upload in {}",
            config.client.staging_dir.display()
        );
    }

    let client = ImageClient::new(config.client_config()).await?;
    let progress = BatchProgress::new(paths.len() as u64, "Uploading");
    let mut uploads = JoinSet::new();

    for path in paths {
        let client = client.clone();
        uploads.spawn(async move {
            let result = client.upload_image(&path).await;
            (path, result)
        });
    }

    let mut total = 0usize;
    while let Some(joined) = uploads.join_next().await {
        total += 1;
        match joined {
            Ok((path, Ok(summary))) => progress.succeeded(format!(
                "Uploaded {} as {} ({})",
                path.display(),
                summary.name,
                format_bytes(summary.size)
            )),
            Ok((path, Err(e))) => {
                progress.failed(format!("Failed to upload {}: {}", path.display(), e));
            }
            Err(e) => progress.failed(format!("Upload task failed: {e}")),
        }
    }

    finish_batch(&progress, "uploads", total)
}

/// Download every name concurrently
async fn download(names: Vec<String>, config: &Config) -> anyhow::Result<()> {
    let client = ImageClient::new(config.client_config()).await?;
    let progress = BatchProgress::new(names.len() as u64, "Downloading");
    let mut downloads = JoinSet::new();

    for name in names {
        let client = client.clone();
        downloads.spawn(async move {
            let result = client.download_image(&name).await;
            (name, result)
        });
    }

    let mut total = 0usize;
    while let Some(joined) = downloads.join_next().await {
        total += 1;
        match joined {
            Ok((name, Ok(path))) => {
                progress.succeeded(format!("Downloaded {} to {}", name, path.display()));
            }
            Ok((name, Err(e))) => progress.failed(format!("Failed to download {name}: {e}")),
            Err(e) => progress.failed(format!("Download task failed: {e}")),
        }
    }

    finish_batch(&progress, "downloads", total)
}

/// Print the server's listing
async fn list(filter: &str, json: bool, config: &Config) -> anyhow::Result<()> {
    let client = ImageClient::new(config.client_config()).await?;
    let images = client.list_images_matching(filter).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&images)?);
        return Ok(());
    }

    if images.is_empty() {
        println!("No images");
        return Ok(());
    }

    println!("{:<40} {:<8} {:>12}", "NAME", "TYPE", "MODIFIED");
    for image in &images {
        println!(
            "{:<40} {:<8} {:>12}",
            image.name,
            image.image_type,
            modified_secs(image)
        );
    }
    println!("\n{} images", images.len());
    Ok(())
}

/// Regular files directly inside `dir`, sorted by name
fn staged_files(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("cannot read staging directory {}", dir.display()))?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

fn modified_secs(image: &ImageMetadata) -> u64 {
    image
        .modified_at
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn finish_batch(progress: &BatchProgress, what: &str, total: usize) -> anyhow::Result<()> {
    let failed = progress.failures();
    if failed > 0 {
        progress.abandon_with_message(format!("{failed} of {total} {what} failed"));
        anyhow::bail!("{failed} of {total} {what} failed");
    }

    progress.finish_with_message(format!("{total} {what} complete"));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_finish_batch_fails_on_any_failure() {
        let progress = BatchProgress::new(2, "Uploading");
        progress.succeeded("a.png".to_string());
        assert!(finish_batch(&progress, "uploads", 1).is_ok());

        let progress = BatchProgress::new(2, "Uploading");
        progress.succeeded("a.png".to_string());
        progress.failed("b.png".to_string());
        let err = finish_batch(&progress, "uploads", 2).unwrap_err();
        assert_eq!(err.to_string(), "1 of 2 uploads failed");
    }

    #[test]
    fn test_cli_parses_commands() {
        let cli = Cli::parse_from(["imgstream", "-v", "list", "--filter", "png", "--json"]);
        assert!(cli.verbose);
        assert!(matches!(
            cli.command,
            Commands::List { ref filter, json: true } if filter == "png"
        ));

        let cli = Cli::parse_from(["imgstream", "upload"]);
        assert!(matches!(cli.command, Commands::Upload { ref paths } if paths.is_empty()));

        assert!(Cli::try_parse_from(["imgstream", "download"]).is_err());
    }

    #[test]
    fn test_staged_files_skips_directories() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("b.png"), b"b").unwrap();
        std::fs::write(dir.path().join("a.jpg"), b"a").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();

        let files = staged_files(dir.path()).unwrap();
        assert_eq!(
            files,
            vec![dir.path().join("a.jpg"), dir.path().join("b.png")]
        );
    }

    #[test]
    fn test_missing_staging_dir() {
        let dir = TempDir::new().unwrap();
        assert!(staged_files(&dir.path().join("tmp")).is_err());
    }
}

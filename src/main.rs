mod catalog;
mod download;
mod error;
mod file;
mod options;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use url::Url;

use catalog::CatalogEntry;
use download::batch::download_all;
use download::episode::{download_episode, entry_for_page, EpisodeSettings};
use download::DownloadClient;
use options::Options;

#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    #[clap(subcommand)]
    subcmd: SubCmd,

    #[clap(short, long, global = true)]
    /// read options from this TOML file
    config: Option<PathBuf>,

    #[clap(short, long, global = true)]
    /// set the maximum number of episodes downloaded in parallel
    parallel: Option<usize>,

    #[clap(short, long, global = true)]
    /// set the maximum number of attempts per request
    retries: Option<u32>,

    #[clap(long, global = true)]
    /// set the delay between attempts in milliseconds
    retry_delay: Option<u64>,

    #[clap(short, long, global = true)]
    /// set the directory videos and segments are written to
    destination: Option<PathBuf>,

    #[clap(short, long, global = true)]
    /// enable debug logging
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum SubCmd {
    /// Download every episode of a paginated catalog
    Catalog {
        #[clap(value_parser = url_parser)]
        /// provide the catalog url
        url: Url,
    },
    /// Print the episodes of a paginated catalog without downloading
    List {
        #[clap(value_parser = url_parser)]
        /// provide the catalog url
        url: Url,
    },
    /// Download the episodes listed in a saved catalog page
    File {
        #[clap(default_value = "merci-professeur.json")]
        /// provide a json file with an "episodes" array
        file: PathBuf,
    },
    /// Download a single episode from its detail page
    Episode {
        /// provide the detail page url or its path below the origin
        page: String,
    },
}

fn url_parser(url: &str) -> Result<Url, String> {
    if !url.starts_with("http") {
        return Err("URL must start with http or https".to_string());
    }
    Url::parse(url).map_err(|err| err.to_string())
}

fn init_logging(verbose: bool) {
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if verbose {
            "episode_downloader=debug".to_string()
        } else {
            "episode_downloader=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();
}

async fn download_entries(
    client: Arc<DownloadClient>,
    entries: Vec<CatalogEntry>,
    settings: Arc<EpisodeSettings>,
    parallel: usize,
) -> Result<()> {
    let report = download_all(client, entries, settings, parallel).await;
    report.log_summary();

    let failed = report.episodes.len() - report.succeeded();
    if failed > 0 {
        bail!("{} episode(s) failed", failed);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let mut options = Options::load(args.config.as_deref())?;
    if let Some(parallel) = args.parallel {
        options.parallel = parallel;
    }
    if let Some(retries) = args.retries {
        options.max_attempts = retries;
    }
    if let Some(retry_delay) = args.retry_delay {
        options.retry_delay_ms = retry_delay;
    }
    if let Some(destination) = args.destination {
        options.destination = destination;
    }
    options.validate()?;

    tracing::debug!(?options, "Options");

    let client = Arc::new(
        DownloadClient::new(
            &options.user_agent,
            options.retry_policy(),
            options.request_timeout(),
        )
            .context("Error building HTTP client")?,
    );
    let settings = Arc::new(options.episode_settings()?);

    match args.subcmd {
        SubCmd::Catalog { url } => {
            let entries = catalog::enumerate(client.as_ref(), &url, &options.page_param).await?;
            download_entries(client, entries, settings, options.parallel).await?;
        }
        SubCmd::List { url } => {
            let entries = catalog::enumerate(client.as_ref(), &url, &options.page_param).await?;
            for entry in entries {
                println!(
                    "{}\t{}\t{}\t{}\t{}",
                    entry.id(),
                    entry.broadcast_date(),
                    entry.duration(),
                    entry.title(),
                    entry.poster_ref()
                );
            }
        }
        SubCmd::File { file } => {
            let entries = file::load_entries(&file)?;
            download_entries(client, entries, settings, options.parallel).await?;
        }
        SubCmd::Episode { page } => {
            let entry = entry_for_page(&page);
            let artifact = download_episode(client.as_ref(), &entry, &settings)
                .await
                .with_context(|| format!("Error downloading {}", page))?;
            println!("{}", artifact.display());
        }
    }

    Ok(())
}

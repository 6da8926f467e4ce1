use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use feed_masher::config::Config;
use feed_masher::feed::{generate_feed, MergedFeedSpec};
use feed_masher::resolver::{GistResolver, SourceResolver};
use feed_masher::server::{self, AppState};
use feed_masher::util::redirect_policy;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Get the default config file path (~/.config/feed-masher/config.toml)
fn default_config_path() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home)
        .join(".config")
        .join("feed-masher")
        .join("config.toml"))
}

const MAX_REDIRECTS: usize = 5;

fn build_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("feed-masher/", env!("CARGO_PKG_VERSION")))
        .redirect(redirect_policy(MAX_REDIRECTS))
        .pool_max_idle_per_host(4)
        .pool_idle_timeout(Duration::from_secs(30))
        .tcp_keepalive(Duration::from_secs(60))
        .build()
        .context("Failed to build HTTP client")
}

#[derive(Parser, Debug)]
#[command(
    name = "feed-masher",
    about = "Combine multiple RSS and Atom feeds into one Atom feed"
)]
struct Args {
    /// Config file (defaults to ~/.config/feed-masher/config.toml)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a merged feed once and write it out
    Generate {
        /// Gist id or URL listing the source feeds
        #[arg(long, conflicts_with = "source")]
        gist: Option<String>,

        /// Source feed URL (repeatable, order is preserved)
        #[arg(long = "source", value_name = "URL")]
        source: Vec<String>,

        /// Feed id used for the self link and feed id
        #[arg(long, default_value = "feed")]
        id: String,

        /// Feed title
        #[arg(long, default_value = "Mashed Feed")]
        title: String,

        /// Feed author
        #[arg(long, default_value = "feed-masher")]
        author: String,

        /// Write to FILE instead of stdout
        #[arg(long, short, value_name = "FILE")]
        output: Option<PathBuf>,
    },
    /// Serve merged feeds over HTTP
    Serve {
        /// Bind address (overrides `listen` from the config)
        #[arg(long, value_name = "ADDR")]
        listen: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_path = match args.config {
        Some(path) => path,
        None => default_config_path()?,
    };
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    tracing::debug!(config = ?config, "Effective configuration");

    let client = build_client()?;
    let resolver: Arc<dyn SourceResolver> = Arc::new(GistResolver::new(
        client.clone(),
        config.github_api_base.clone(),
        config.resolve_github_token(),
    ));

    match args.command {
        Command::Generate {
            gist,
            source,
            id,
            title,
            author,
            output,
        } => {
            let spec = if let Some(gist) = gist {
                resolver
                    .resolve(&gist)
                    .await
                    .with_context(|| format!("Failed to resolve gist '{}'", gist))?
            } else if !source.is_empty() {
                MergedFeedSpec {
                    id,
                    title,
                    author,
                    sources: source,
                }
            } else if let Some(feed) = config.feed.clone() {
                feed.into()
            } else {
                anyhow::bail!(
                    "No feeds to merge: pass --gist or --source, or add a [feed] table to {}",
                    config_path.display()
                );
            };

            let xml = generate_feed(&client, &spec, &config.merge_options())
                .await
                .context("Failed to render merged feed")?;

            match output {
                Some(path) => {
                    std::fs::write(&path, xml)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    eprintln!("Wrote merged feed to {}", path.display());
                }
                None => println!("{}", xml),
            }
        }
        Command::Serve { listen } => {
            let addr = listen.unwrap_or_else(|| config.listen.clone());
            let listener = tokio::net::TcpListener::bind(&addr)
                .await
                .with_context(|| format!("Failed to bind {}", addr))?;

            let state = AppState {
                client,
                resolver,
                options: Arc::new(config.merge_options()),
                default_feed: config.feed.clone().map(|f| Arc::new(MergedFeedSpec::from(f))),
                cache_max_age_secs: config.cache_max_age_secs,
            };

            server::serve(listener, state)
                .await
                .context("HTTP server failed")?;
        }
    }

    Ok(())
}

//! tagscout CLI
//!
//! Local execution entry point. For the streaming HTTP transport, use `tagscout-server`.

use std::path::PathBuf;
#[cfg(feature = "chrome")]
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
#[cfg(feature = "chrome")]
use futures::StreamExt;
use tagscout::{error::Result, models::Config, utils::parse_count};
#[cfg(feature = "chrome")]
use tagscout::{
    error::AppError,
    models::{Event, FilterCriteria, SearchRequest},
    pipeline::DiscoveryPipeline,
    session::{BrowsingSession, ChromeSession, SessionContext},
    utils::pacing::Pacer,
};

/// tagscout - Tag-driven profile discovery
#[derive(Parser, Debug)]
#[command(
    name = "tagscout",
    version,
    about = "Discovers profiles from topic tags and streams the matches"
)]
struct Cli {
    /// Directory containing config.toml and the cookie jar
    #[arg(short, long, default_value = "storage")]
    storage_dir: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Search tag feeds and print matching profiles
    #[cfg(feature = "chrome")]
    Search {
        /// Comma-separated tags, with or without a leading '#'
        #[arg(long, required = true)]
        tags: String,

        /// Inclusive lower follower bound (default: from config)
        #[arg(long)]
        min_followers: Option<u64>,

        /// Inclusive upper follower bound (default: from config)
        #[arg(long)]
        max_followers: Option<u64>,

        /// Stop after this many matches (default: from config)
        #[arg(long)]
        max_profiles: Option<usize>,

        /// Location hint, logged but not enforced
        #[arg(long)]
        location: Option<String>,

        /// Output framing for events on stdout
        #[arg(long, value_enum, default_value_t = OutputFormat::Jsonl)]
        format: OutputFormat,
    },

    /// Validate the configuration file
    Validate,

    /// Parse an abbreviated count such as "1.2K" or "3,400"
    ParseCount {
        /// Text to parse
        text: String,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// One JSON object per line
    Jsonl,
    /// `data: {json}` frames separated by blank lines
    Sse,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config_path = cli.storage_dir.join("config.toml");
    let config = Config::load_or_default(&config_path);
    log::debug!("Loaded configuration from {}", config_path.display());

    match cli.command {
        #[cfg(feature = "chrome")]
        Command::Search {
            tags,
            min_followers,
            max_followers,
            max_profiles,
            location,
            format,
        } => {
            let defaults = FilterCriteria::from_config(&config);
            let criteria = FilterCriteria {
                min_followers: min_followers.unwrap_or(defaults.min_followers),
                max_followers: max_followers.unwrap_or(defaults.max_followers),
                max_profiles: max_profiles.unwrap_or(defaults.max_profiles),
                location_hint: location,
            };
            let request = SearchRequest::new(tags.split(','), criteria);
            if request.tags.is_empty() {
                log::error!("No tags provided");
                return Err(AppError::validation("No tags provided"));
            }

            config.validate()?;
            search(Arc::new(config), &cli.storage_dir, request, format).await?;
        }

        Command::Validate => {
            log::info!("Validating configuration...");

            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            log::info!("✓ Config OK ({})", config_path.display());
            log::info!(
                "Cookie jar: {}",
                config.cookies_path(&cli.storage_dir).display()
            );
        }

        Command::ParseCount { text } => {
            println!("{}", parse_count(&text));
        }
    }

    Ok(())
}

#[cfg(feature = "chrome")]
async fn search(
    config: Arc<Config>,
    storage_dir: &std::path::Path,
    request: SearchRequest,
    format: OutputFormat,
) -> Result<()> {
    log::info!("Initializing browser...");
    let mut session = ChromeSession::launch(&config.browser).await?;

    let cookies = config.cookies_path(storage_dir);
    let mut pacer = Pacer::new(&config.pacing);
    let authenticated = match session
        .authenticate(&cookies, &config.browser.base_url, &mut pacer)
        .await
    {
        Ok(authenticated) => authenticated,
        Err(e) => {
            log::error!("Authentication failed: {}", e);
            false
        }
    };
    if !authenticated {
        session.shutdown().await?;
        return Err(AppError::session("Login failed"));
    }

    let context = SessionContext::authenticated(session);
    let mut events = Box::pin(DiscoveryPipeline::new(context, config).run(request));
    while let Some(event) = events.next().await {
        // Keep draining on failure: the session is closed after the last event.
        match render(&event, format) {
            Ok(line) => print!("{line}"),
            Err(e) => log::error!("Failed to serialize {} event: {}", event.kind(), e),
        }

        if let Event::Complete(summary) = &event {
            log::info!(
                "Found {} profiles from {} candidates across {} tags in {}s",
                summary.profiles_found,
                summary.candidates_checked,
                summary.tags_scraped,
                summary.elapsed_secs()
            );
        }
    }

    Ok(())
}

/// One event as printed to stdout, trailing newline included.
#[cfg(feature = "chrome")]
fn render(event: &Event, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Jsonl => Ok(format!("{}\n", event.to_json()?)),
        OutputFormat::Sse => event.to_sse_frame(),
    }
}

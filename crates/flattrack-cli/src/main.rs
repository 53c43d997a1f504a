use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use flattrack_core::format::{
    bedroom_label, format_amount, furnishing_label, relative_time, restriction_glyph,
    sharing_badge, truncate, DEFAULT_TRUNCATE_LEN,
};
use flattrack_core::normalize::prepare_feed;
use flattrack_core::{parse_records, Column, DashboardState, ListingRecord};
use flattrack_storage::{
    messages_url, FeedFileSource, HttpFetcher, HttpMessageSource, MessageSource, RecordStore,
    TrackerConfig,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "flattrack")]
#[command(about = "Flat Tracker rental listings dashboard")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Start the web dashboard and load messages in the background.
    Serve,
    /// Load messages once and print the rows that pass the filters.
    List(ListArgs),
    /// Clean up a raw messages file the way the feed serves it.
    Normalize {
        input: PathBuf,
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}

#[derive(Debug, Args)]
struct ListArgs {
    #[arg(long)]
    bhk: Option<String>,
    #[arg(long)]
    bedroom: Option<String>,
    /// `true` or `false`.
    #[arg(long)]
    sharing: Option<String>,
    #[arg(long)]
    gender: Option<String>,
    #[arg(long)]
    address: Option<String>,
    #[arg(long)]
    rent: Option<String>,
    #[arg(long)]
    deposit: Option<String>,
    #[arg(long)]
    restrictions: Option<String>,
    #[arg(long)]
    furnished: Option<String>,
    #[arg(long)]
    brokerage: Option<String>,
    #[arg(long)]
    available: Option<String>,
    /// Matched against the relative phrase, e.g. `"2 days"`.
    #[arg(long)]
    time: Option<String>,
    #[arg(long)]
    author: Option<String>,
    /// Base URL of an API serving `/messages`.
    #[arg(long, conflicts_with = "file")]
    source: Option<String>,
    #[arg(long)]
    file: Option<PathBuf>,
    /// Print message text untruncated.
    #[arg(long)]
    full: bool,
}

impl ListArgs {
    fn criteria(&self) -> [(Column, Option<&String>); 13] {
        [
            (Column::Bhk, self.bhk.as_ref()),
            (Column::BedroomType, self.bedroom.as_ref()),
            (Column::Sharing, self.sharing.as_ref()),
            (Column::Gender, self.gender.as_ref()),
            (Column::Address, self.address.as_ref()),
            (Column::Rent, self.rent.as_ref()),
            (Column::Deposit, self.deposit.as_ref()),
            (Column::Restrictions, self.restrictions.as_ref()),
            (Column::Furnishing, self.furnished.as_ref()),
            (Column::Brokerage, self.brokerage.as_ref()),
            (Column::AvailableDate, self.available.as_ref()),
            (Column::CreatedAt, self.time.as_ref()),
            (Column::Author, self.author.as_ref()),
        ]
    }

    fn dashboard_state(&self) -> DashboardState {
        let mut state = DashboardState::new();
        for (column, raw) in self.criteria() {
            if let Some(raw) = raw {
                state.set_filter(column, raw);
            }
        }
        if self.full {
            state.toggle_full_text();
        }
        state
    }

    fn message_source(&self, config: &TrackerConfig) -> Result<Box<dyn MessageSource>> {
        if let Some(base) = &self.source {
            let fetcher = HttpFetcher::new(config.http_client_config())?;
            return Ok(Box::new(HttpMessageSource::new(fetcher, messages_url(base))));
        }
        if let Some(path) = &self.file {
            return Ok(Box::new(FeedFileSource::new(path)));
        }
        config.message_source()
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => flattrack_web::serve_from_env().await?,
        Commands::List(args) => list(&args, &TrackerConfig::from_env()?).await?,
        Commands::Normalize { input, output } => normalize(&input, output.as_deref()).await?,
    }

    Ok(())
}

async fn list(args: &ListArgs, config: &TrackerConfig) -> Result<()> {
    let source = args.message_source(config)?;
    info!(source = %source.describe(), "loading messages");
    let mut store = RecordStore::new();
    store.load(source.as_ref()).await;

    let state = args.dashboard_state();
    let now = Utc::now();
    let visible = state.visible_records(store.records(), now);
    if visible.is_empty() {
        println!("No matching messages found");
        return Ok(());
    }
    for record in &visible {
        println!("{}", render_row(record, state.show_full_text(), now));
    }
    println!("{} of {} messages", visible.len(), store.records().len());
    Ok(())
}

/// One tab-separated line in dashboard column order.
fn render_row(record: &ListingRecord, full_text: bool, now: DateTime<Utc>) -> String {
    let d = &record.details;
    let restrictions: Vec<String> = d
        .restrictions
        .iter()
        .map(|code| restriction_glyph(code).title().to_string())
        .collect();
    let text = if full_text {
        record.raw_text.clone()
    } else {
        truncate(&record.raw_text, DEFAULT_TRUNCATE_LEN)
    };
    [
        d.bhk.value().map(|v| v.to_string()).unwrap_or_else(|| "-".into()),
        bedroom_label(&d.bedroom_type),
        sharing_badge(d.sharing).0.to_string(),
        d.gender.iter().collect::<Vec<_>>().join(", "),
        d.address.clone(),
        format_amount(&d.rent),
        format_amount(&d.deposit),
        restrictions.join(", "),
        furnishing_label(&d.furnishing),
        format_amount(&d.brokerage),
        d.available_date.clone(),
        relative_time(&record.created_at, now),
        d.contact.clone(),
        text.replace(['\n', '\t'], " "),
        record.author.clone(),
    ]
    .join("\t")
}

async fn normalize(input: &Path, output: Option<&Path>) -> Result<()> {
    let raw = tokio::fs::read_to_string(input)
        .await
        .with_context(|| format!("reading {}", input.display()))?;
    let value: serde_json::Value =
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", input.display()))?;
    let parsed = parse_records(value);
    if parsed.rejected > 0 {
        warn!(rejected = parsed.rejected, "skipped malformed message records");
    }
    let total = parsed.records.len();
    let feed = prepare_feed(parsed.records);
    info!(kept = feed.len(), dropped = total - feed.len(), "normalized messages");

    let json = serde_json::to_string_pretty(&feed)?;
    match output {
        Some(path) => tokio::fs::write(path, json)
            .await
            .with_context(|| format!("writing {}", path.display()))?,
        None => println!("{json}"),
    }
    Ok(())
}

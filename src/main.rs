use std::time::{Duration, Instant};

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::{Map, Value};
use tracing::info;

use ln_shim::dashboard::Dashboard;
use ln_shim::drilldown::{Dimension, Drilldown, UrlResolver};
use ln_shim::error::ShimError;
use ln_shim::fetch::HttpFetcher;
use ln_shim::parser::datasets::DatasetName;
use ln_shim::planner;
use ln_shim::query::{parse_when, DateSpec, QueryDescriptor, QueryKind, Tier, Tiers};
use ln_shim::respond;
use ln_shim::settings::Settings;

#[derive(Parser)]
#[command(name = "ln_shim", about = "Query a LogNormal performance dashboard as JSON")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer one named query (median_load_time, intraday_range, ...)
    Query {
        kind: QueryKind,
        /// Day to query (YYYY-MM-DD or Unix timestamp)
        #[arg(long, value_parser = parse_when, conflicts_with_all = ["start", "end"])]
        date: Option<DateTime<Utc>>,
        /// First day of a range query
        #[arg(long, value_parser = parse_when)]
        start: Option<DateTime<Utc>>,
        /// Last day of a range query, inclusive
        #[arg(long, value_parser = parse_when)]
        end: Option<DateTime<Utc>>,
        /// Drilldown tier, DIM or DIM=v1,v2 (at most two, outermost first)
        #[arg(long = "tier")]
        tiers: Vec<Tier>,
    },
    /// Dump the datasets of one dashboard page
    Page {
        #[arg(long, value_parser = parse_when)]
        date: Option<DateTime<Utc>>,
        /// Narrow the page, DIM=VALUE
        #[arg(long = "drill", value_parser = parse_drill)]
        drills: Vec<(Dimension, String)>,
        /// Only this dataset (intraday, pagegroup, country, ...)
        #[arg(long)]
        dataset: Option<String>,
    },
    /// Print the page URL for a date and drilldown without fetching it
    Url {
        #[arg(long, value_parser = parse_when)]
        date: Option<DateTime<Utc>>,
        #[arg(long = "drill", value_parser = parse_drill)]
        drills: Vec<(Dimension, String)>,
    },
}

fn parse_drill(s: &str) -> Result<(Dimension, String), String> {
    let (dim, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected DIM=VALUE, got '{}'", s))?;
    if value.trim().is_empty() {
        return Err(format!("drilldown '{}' has no value", dim));
    }
    Ok((dim.trim().parse()?, value.trim().to_string()))
}

fn drilldown(drills: Vec<(Dimension, String)>) -> Drilldown {
    drills
        .into_iter()
        .fold(Drilldown::none(), |dd, (dim, value)| dd.with(dim, value))
}

fn connect(settings: &Settings) -> Result<Dashboard<HttpFetcher>, ShimError> {
    let (cookie, domain) = settings.credentials()?;
    let fetcher = HttpFetcher::new(cookie, settings.timeout());
    let urls = UrlResolver::new(&settings.base_url, domain);
    Ok(Dashboard::new(fetcher, urls).with_throttle(settings.throttle()))
}

fn spinner(msg: String) -> anyhow::Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?);
    pb.set_message(msg);
    pb.enable_steady_tick(Duration::from_millis(120));
    Ok(pb)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load().context("loading settings from ln_shim.toml / LN_SHIM_*")?;

    let outcome: Result<Value, ShimError> = match cli.command {
        Commands::Query {
            kind,
            date,
            start,
            end,
            tiers,
        } => {
            let tiers = Tiers::try_from(tiers).map_err(anyhow::Error::msg)?;
            let dates = match (date, start, end) {
                (Some(d), _, _) => DateSpec::Day(d),
                (None, None, None) => DateSpec::Unset,
                (None, start, end) => DateSpec::Range { start, end },
            };
            let query = QueryDescriptor { kind, tiers, dates };
            let pb = spinner(format!("running {}", kind))?;
            let outcome = connect(&settings).and_then(|d| planner::execute(&d, &query));
            pb.finish_and_clear();
            outcome
        }
        Commands::Page { date, drills, dataset } => {
            let dd = drilldown(drills);
            let day = date.map(|d| d.date_naive());
            let pb = spinner("fetching page".to_string())?;
            let outcome = connect(&settings).and_then(|d| match dataset {
                Some(name) => d.dataset(day, name.parse::<DatasetName>()?, None, &dd),
                None => d.datasets(day, &dd).map(|ds| {
                    Value::Object(
                        DatasetName::ALL
                            .iter()
                            .map(|n| (n.as_str().to_string(), ds.get(*n)))
                            .collect::<Map<_, _>>(),
                    )
                }),
            });
            pb.finish_and_clear();
            outcome
        }
        Commands::Url { date, drills } => settings.domain().map(|domain| {
            let urls = UrlResolver::new(&settings.base_url, domain);
            Value::String(urls.resolve(date.map(|d| d.date_naive()), &drilldown(drills)))
        }),
    };

    let envelope = respond::envelope(&outcome);
    println!("{}", serde_json::to_string_pretty(&envelope)?);
    info!(elapsed_ms = t0.elapsed().as_millis() as u64, "done");

    if respond::is_error(&envelope) {
        std::process::exit(1);
    }
    Ok(())
}

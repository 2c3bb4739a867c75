// ===============================
// src/config.rs
// ===============================
/*
=============================================================================
Project : stock_report_bot — concurrent portfolio analysis & report pipeline
Module  : config.rs
Version : 0.5.0
Author  : Kukuh Tripamungkas Wicaksono (Kukuh TW)
Email   : kukuhtw@gmail.com
WhatsApp: https://wa.me/628129893706
LinkedIn: https://id.linkedin.com/in/kukuhtw
License : MIT (see LICENSE)

Summary : Loads a stock portfolio, fetches quotes/news per symbol, runs a
          bounded pool of LLM analyses under a rate limit and daily quota,
          extracts trading judgments, and writes per-category HTML reports.
          Exposes Prometheus metrics and records JSONL events.

(c) 2025 Kukuh TW. All rights reserved where applicable.
=============================================================================
*/
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveDate;
use clap::Parser;
use dotenvy::dotenv;
use tracing::warn;

use crate::dispatcher::DEFAULT_MAX_WORKERS;

pub const DEFAULT_GEMINI_DAILY_LIMIT: usize = 18;
pub const MAX_GEMINI_DAILY_LIMIT: usize = 20;
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash-exp";
pub const DEFAULT_CLAUDE_MODEL: &str = "claude-3-5-sonnet-latest";
pub const DEFAULT_MIN_INTERVAL_MS: u64 = 6_000;

#[derive(Parser, Debug, Clone)]
#[command(name = "stock_report_bot", version, about = "Portfolio analysis report generator")]
pub struct Cli {
    /// Use the Claude backend (no rate limit / daily quota)
    #[arg(long)]
    pub claude: bool,

    /// Portfolio file
    #[arg(long, default_value = "data/stocks.yaml")]
    pub stocks: PathBuf,

    /// Investor preference file
    #[arg(long, default_value = "data/investment_preferences.yaml")]
    pub preferences: PathBuf,

    /// Output directory for HTML reports
    #[arg(long, default_value = "reports")]
    pub out_dir: PathBuf,

    /// Report date (YYYY-MM-DD); drives quota rotation. Defaults to today.
    #[arg(long)]
    pub date: Option<NaiveDate>,
}

/// Which analysis backend serves this run
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendMode {
    Gemini,
    Claude,
}

impl BackendMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendMode::Gemini => "gemini",
            BackendMode::Claude => "claude",
        }
    }
}

/// Market/news data source
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MarketMode {
    Yahoo,
    Mock,
}

impl MarketMode {
    pub fn parse(raw: Option<&str>, default_mode: MarketMode) -> MarketMode {
        match raw.unwrap_or_default().trim().to_ascii_lowercase().as_str() {
            "mock" => MarketMode::Mock,
            "yahoo" => MarketMode::Yahoo,
            _ => default_mode,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MarketMode::Yahoo => "yahoo",
            MarketMode::Mock => "mock",
        }
    }
}

#[derive(Clone, Debug)]
pub struct Args {
    // backend
    pub backend: BackendMode,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub claude_api_key: Option<String>,
    pub claude_model: String,
    pub gemini_daily_limit: usize,
    pub gemini_min_interval: Duration,

    // data
    pub market_mode: MarketMode,
    pub yahoo_api_key: Option<String>,
    pub stocks_path: PathBuf,
    pub preferences_path: PathBuf,

    // output
    pub out_dir: PathBuf,
    pub report_date: NaiveDate,
    pub simplify_hold: bool,
    pub max_workers: usize,

    // files/metrics
    pub record_file: Option<String>,
    pub metrics_port: Option<u16>,
}

/// Daily ceiling for the rate-limited backend: 1..=20, anything else -> 18.
pub fn parse_daily_limit(raw: Option<&str>) -> usize {
    let Some(raw) = raw else {
        return DEFAULT_GEMINI_DAILY_LIMIT;
    };
    match raw.trim().parse::<usize>() {
        Ok(n) if (1..=MAX_GEMINI_DAILY_LIMIT).contains(&n) => n,
        Ok(n) => {
            warn!(value = n, "GEMINI_DAILY_LIMIT out of range 1..=20, using {DEFAULT_GEMINI_DAILY_LIMIT}");
            DEFAULT_GEMINI_DAILY_LIMIT
        }
        Err(_) => {
            warn!(value = %raw, "GEMINI_DAILY_LIMIT is not an integer, using {DEFAULT_GEMINI_DAILY_LIMIT}");
            DEFAULT_GEMINI_DAILY_LIMIT
        }
    }
}

/// `true`, `1`, `yes` (any case) are true; unset uses `default`.
pub fn parse_bool_flag(raw: Option<&str>, default: bool) -> bool {
    match raw {
        Some(v) => matches!(v.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes"),
        None => default,
    }
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Build `Args` from parsed flags and a variable lookup.
pub fn from_sources(cli: Cli, get: impl Fn(&str) -> Option<String>) -> Args {
    let backend = if cli.claude { BackendMode::Claude } else { BackendMode::Gemini };

    let gemini_daily_limit = parse_daily_limit(get("GEMINI_DAILY_LIMIT").as_deref());
    let gemini_min_interval = Duration::from_millis(
        get("GEMINI_MIN_INTERVAL_MS")
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(DEFAULT_MIN_INTERVAL_MS),
    );
    let max_workers = get("MAX_WORKERS")
        .and_then(|s| s.trim().parse().ok())
        .filter(|n: &usize| *n > 0)
        .unwrap_or(DEFAULT_MAX_WORKERS);

    Args {
        backend,
        gemini_api_key: non_empty(get("GEMINI_API_KEY")),
        gemini_model: non_empty(get("GEMINI_MODEL")).unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
        claude_api_key: non_empty(get("CLAUDE_API_KEY")),
        claude_model: non_empty(get("CLAUDE_MODEL")).unwrap_or_else(|| DEFAULT_CLAUDE_MODEL.to_string()),
        gemini_daily_limit,
        gemini_min_interval,

        market_mode: MarketMode::parse(get("MARKET_DATA").as_deref(), MarketMode::Yahoo),
        yahoo_api_key: non_empty(get("YAHOO_API_KEY")),
        stocks_path: cli.stocks,
        preferences_path: cli.preferences,

        out_dir: cli.out_dir,
        report_date: cli.date.unwrap_or_else(|| chrono::Local::now().date_naive()),
        simplify_hold: parse_bool_flag(get("SIMPLIFY_HOLD_REPORTS").as_deref(), true),
        max_workers,

        record_file: non_empty(get("RECORD_FILE")),
        metrics_port: get("METRICS_PORT").and_then(|s| s.trim().parse().ok()),
    }
}

pub fn load() -> Args {
    // Make sure .env is read (API keys, RECORD_FILE, ...)
    let _ = dotenv();
    from_sources(Cli::parse(), |k| env::var(k).ok())
}

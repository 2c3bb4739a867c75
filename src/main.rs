// ===============================
// src/main.rs
// ===============================
/*
 # dry run without network (random prices, no API keys needed for market data)
 MARKET_DATA=mock cargo run -- --stocks data/stocks.yaml --out-dir reports

 # metrics while running
 curl -s localhost:9898/metrics | egrep '^(analysis_tasks_total|judgments_total|rate_limiter_wait)'
*/
/*
=============================================================================
Project : stock_report_bot — concurrent portfolio analysis & report pipeline
Module  : main.rs
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
use std::process::ExitCode;
use std::sync::Arc;

use ahash::AHashSet as HashSet;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use stock_report_bot::aggregator::deliver_all;
use stock_report_bot::backend::{AnalysisBackend, ClaudeBackend, GeminiBackend};
use stock_report_bot::config::{self, Args, BackendMode, MarketMode};
use stock_report_bot::dispatcher::{DispatchConfig, Dispatcher};
use stock_report_bot::domain::Event;
use stock_report_bot::limiter::RateLimiter;
use stock_report_bot::market::{MarketData, MockMarketData, YahooMarketData};
use stock_report_bot::portfolio::{load_portfolio, PortfolioError};
use stock_report_bot::preferences::{load_preferences, PreferenceError};
use stock_report_bot::sink::FileSink;
use stock_report_bot::{classifier, metrics, quota, recorder};

#[derive(Debug, Error)]
enum AppError {
    #[error(transparent)]
    Portfolio(#[from] PortfolioError),
    #[error(transparent)]
    Preferences(#[from] PreferenceError),
}

#[tokio::main]
async fn main() -> ExitCode {
    // ---- Logging (RUST_LOG overrides) ----
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // ---- Config ----
    let args = config::load();

    // ---- Metrics ----
    metrics::init();
    if let Some(port) = args.metrics_port {
        tokio::spawn(metrics::serve_metrics(port));
    }

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "configuration error, nothing dispatched");
            ExitCode::FAILURE
        }
    }
}

fn build_backend(args: &Args) -> Arc<dyn AnalysisBackend> {
    match args.backend {
        BackendMode::Gemini => Arc::new(GeminiBackend::new(args.gemini_api_key.clone(), &args.gemini_model)),
        BackendMode::Claude => Arc::new(ClaudeBackend::new(args.claude_api_key.clone(), &args.claude_model)),
    }
}

fn build_market(args: &Args) -> Arc<dyn MarketData> {
    match args.market_mode {
        MarketMode::Yahoo => Arc::new(YahooMarketData::new(args.yahoo_api_key.clone())),
        MarketMode::Mock => Arc::new(MockMarketData::default()),
    }
}

async fn run(args: Args) -> Result<(), AppError> {
    // ---- Inputs (any failure here is fatal, before dispatch) ----
    let positions = load_portfolio(&args.stocks_path)?;
    let preferences: Arc<str> = Arc::from(load_preferences(&args.preferences_path)?.prompt_text());

    let backend = build_backend(&args);
    let limiter = backend
        .rate_limited()
        .then(|| Arc::new(RateLimiter::new(args.gemini_min_interval)));

    info!(
        backend = backend.name(),
        market = args.market_mode.as_str(),
        daily_limit = args.gemini_daily_limit,
        min_interval_ms = args.gemini_min_interval.as_millis() as u64,
        workers = args.max_workers,
        simplify_hold = args.simplify_hold,
        positions = positions.len(),
        date = %args.report_date,
        "startup config"
    );
    metrics::CONFIG_BACKEND.with_label_values(&[backend.name()]).set(1);
    metrics::CONFIG_POSITIONS.set(positions.len() as i64);

    // ---- Daily quota ----
    let total = positions.len();
    let selected = if quota::quota_applies(total, args.gemini_daily_limit, backend.rate_limited()) {
        let picked = quota::select_for_date(&positions, args.gemini_daily_limit, args.report_date);
        let kept: HashSet<&str> = picked.iter().map(|p| p.symbol.as_str()).collect();
        let skipped: Vec<&str> = positions
            .iter()
            .map(|p| p.symbol.as_str())
            .filter(|s| !kept.contains(s))
            .collect();
        info!(
            selected = picked.len(),
            total,
            skipped = ?skipped,
            "daily quota applied; skipped positions rotate in on later days"
        );
        picked
    } else {
        positions
    };
    let skipped_by_quota = total - selected.len();
    metrics::QUOTA_SKIPPED.set(skipped_by_quota as i64);

    let by_category = classifier::categorize_all(&selected);

    // ---- Recorder (optional) ----
    let (rec_tx, rec_rx) = mpsc::channel::<Event>(1024);
    let recorder_task = args
        .record_file
        .clone()
        .map(|path| tokio::spawn(recorder::run(rec_rx, path)));
    let events = recorder_task.as_ref().map(|_| rec_tx.clone());
    drop(rec_tx);

    if let Some(tx) = &events {
        let _ = tx.try_send(Event::RunStarted {
            backend: backend.name().to_string(),
            positions: total,
            selected: selected.len(),
        });
    }

    // ---- Dispatch ----
    let cfg = DispatchConfig {
        max_workers: args.max_workers,
        simplify_hold: args.simplify_hold,
        report_date: args.report_date,
    };
    let mut dispatcher = Dispatcher::new(build_market(&args), backend, limiter, preferences, cfg);
    if let Some(tx) = events.clone() {
        dispatcher = dispatcher.with_events(tx);
    }
    let summary = dispatcher.run(&by_category).await;

    // ---- Delivery ----
    let sink = FileSink::new(&args.out_dir, args.report_date);
    let delivered = deliver_all(&summary.reports, &sink, args.report_date, events.as_ref()).await;
    if summary.reports.is_empty() {
        warn!("no position was analyzed successfully, no report written");
    }

    let failed: Vec<&str> = summary.failures.iter().map(|f| f.symbol.as_str()).collect();
    info!(
        ok = summary.reports.len(),
        failed = failed.len(),
        failed_symbols = ?failed,
        skipped_by_quota,
        reports = delivered,
        out_dir = %args.out_dir.display(),
        "run complete"
    );

    // ---- Flush recorder ----
    drop(dispatcher);
    drop(events);
    if let Some(task) = recorder_task {
        let _ = task.await;
    }
    Ok(())
}

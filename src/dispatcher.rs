// ===============================
// src/dispatcher.rs
// ===============================
//
// Bounded fan-out of one analysis task per position.
//
//   fetch -> [rate limiter] -> backend -> judgment -> [simplify] -> fragment
//
// Concurrency is capped by a semaphore of `max_workers` permits; tasks
// live in a JoinSet and are collected in completion order by this single
// loop, which is also the only writer of the aggregated reports.
// A task that errors or panics is logged with its symbol and dropped;
// the rest of the batch carries on.
//

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use ahash::AHashMap;
use chrono::NaiveDate;
use futures_util::FutureExt;
use thiserror::Error;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::aggregator::{CategoryReports, TaskOutput};
use crate::backend::{build_request, is_failure_marker, AnalysisBackend};
use crate::domain::{ByCategory, Category, Event, Position, StockReportInfo};
use crate::judgment::{extract_judgment, NOT_FOUND};
use crate::limiter::RateLimiter;
use crate::market::{FetchError, MarketData};
use crate::metrics::{JUDGMENTS, TASKS};
use crate::report::{render_fragment, unique_anchor};
use crate::simplifier::{detect_hold_judgment, is_no_action, simplify_hold_report};

pub const DEFAULT_MAX_WORKERS: usize = 10;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("market data: {0}")]
    Fetch(#[from] FetchError),
    #[error("task panicked: {0}")]
    Panicked(String),
    #[error("task cancelled")]
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub max_workers: usize,
    pub simplify_hold: bool,
    pub report_date: NaiveDate,
}

impl DispatchConfig {
    pub fn new(report_date: NaiveDate) -> Self {
        Self { max_workers: DEFAULT_MAX_WORKERS, simplify_hold: true, report_date }
    }
}

#[derive(Debug)]
pub struct Failure {
    pub symbol: String,
    pub error: DispatchError,
}

#[derive(Debug, Default)]
pub struct DispatchSummary {
    pub reports: CategoryReports,
    pub failures: Vec<Failure>,
}

/// Everything a task needs, shared read-only across the pool.
struct TaskContext {
    market: Arc<dyn MarketData>,
    backend: Arc<dyn AnalysisBackend>,
    limiter: Option<Arc<RateLimiter>>,
    preferences: Arc<str>,
    simplify_hold: bool,
    report_date: NaiveDate,
}

pub struct Dispatcher {
    ctx: Arc<TaskContext>,
    max_workers: usize,
    events: Option<mpsc::Sender<Event>>,
}

impl Dispatcher {
    /// `limiter` is only consulted when the backend reports itself rate-limited.
    pub fn new(
        market: Arc<dyn MarketData>,
        backend: Arc<dyn AnalysisBackend>,
        limiter: Option<Arc<RateLimiter>>,
        preferences: Arc<str>,
        cfg: DispatchConfig,
    ) -> Self {
        let ctx = TaskContext {
            market,
            backend,
            limiter,
            preferences,
            simplify_hold: cfg.simplify_hold,
            report_date: cfg.report_date,
        };
        Self { ctx: Arc::new(ctx), max_workers: cfg.max_workers.max(1), events: None }
    }

    /// Send per-position outcome events (for the JSONL recorder).
    pub fn with_events(mut self, tx: mpsc::Sender<Event>) -> Self {
        self.events = Some(tx);
        self
    }

    fn emit(&self, ev: Event) {
        if let Some(tx) = &self.events {
            let _ = tx.try_send(ev);
        }
    }

    /// Run every position of every category and wait for all of them.
    pub async fn run(&self, positions: &ByCategory<Vec<Position>>) -> DispatchSummary {
        let sem = Arc::new(Semaphore::new(self.max_workers));
        let mut set = JoinSet::new();
        // repeated symbols get numbered anchors so TOC links stay distinct
        let mut seen: AHashMap<&str, usize> = AHashMap::new();

        for (category, list) in positions.iter() {
            for position in list.iter() {
                let occurrence = seen.entry(position.symbol.as_str()).or_insert(0);
                *occurrence += 1;
                let anchor = unique_anchor(&position.symbol, *occurrence);
                let position = position.clone();
                let ctx = self.ctx.clone();
                let sem = sem.clone();
                set.spawn(async move {
                    let symbol = position.symbol.clone();
                    // a closed semaphore is the only acquire error; it never closes here
                    let Ok(_permit) = sem.acquire_owned().await else {
                        return (symbol, Err(DispatchError::Cancelled));
                    };
                    let started = Instant::now();
                    let result = AssertUnwindSafe(process(&ctx, category, position, anchor))
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|panic| Err(DispatchError::Panicked(panic_message(&*panic))));
                    (symbol, result.map(|out| (out, started.elapsed())))
                });
            }
        }

        let mut summary = DispatchSummary::default();
        while let Some(joined) = set.join_next().await {
            let (symbol, result) = match joined {
                Ok(pair) => pair,
                // only reachable if the runtime aborts the task
                Err(e) => {
                    warn!(error = %e, "dispatcher: task join failed");
                    TASKS.with_label_values(&["failed"]).inc();
                    continue;
                }
            };

            match result {
                Ok(((out, simplified), elapsed)) => {
                    TASKS.with_label_values(&["ok"]).inc();
                    debug!(%symbol, category = out.category.as_str(), judgment = %out.info.judgment, "task done");
                    self.emit(Event::Analyzed {
                        symbol,
                        category: out.category,
                        judgment: out.info.judgment.clone(),
                        simplified,
                        elapsed_ms: elapsed.as_millis() as u64,
                    });
                    summary.reports.push(out);
                }
                Err(error) => {
                    warn!(%symbol, error = %error, "analysis task failed, position skipped");
                    TASKS.with_label_values(&["failed"]).inc();
                    self.emit(Event::Failed { symbol: symbol.clone(), reason: error.to_string() });
                    summary.failures.push(Failure { symbol, error });
                }
            }
        }

        info!(ok = summary.reports.len(), failed = summary.failures.len(), "dispatch finished");
        summary
    }
}

/// One position end to end. Returns the output and whether it was simplified.
async fn process(
    ctx: &TaskContext,
    category: Category,
    position: Position,
    anchor: String,
) -> Result<(TaskOutput, bool), DispatchError> {
    let snapshot = ctx.market.fetch(&position.symbol).await?;
    let request = build_request(&position, &snapshot);

    if ctx.backend.rate_limited() {
        if let Some(limiter) = &ctx.limiter {
            limiter.acquire().await;
        }
    }
    let analysis = ctx.backend.analyze(&request, &ctx.preferences).await;

    let failed = is_failure_marker(&analysis);
    let judgment = if failed { NOT_FOUND.to_string() } else { extract_judgment(&analysis) };

    // the TOC label and the condensed body must agree
    let simplified = ctx.simplify_hold && !failed && is_no_action(&judgment) && detect_hold_judgment(&analysis);
    let body = if simplified {
        simplify_hold_report(&request.symbol, &request.name, &analysis, request.price, &request.currency)
    } else {
        analysis
    };

    let info = StockReportInfo {
        anchor_id: anchor,
        symbol: position.symbol,
        name: position.name,
        judgment,
    };
    let fragment = render_fragment(&info, &body, ctx.report_date);
    JUDGMENTS
        .with_label_values(&[category.as_str(), if simplified { "true" } else { "false" }])
        .inc();

    Ok((TaskOutput { category, fragment, info }, simplified))
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

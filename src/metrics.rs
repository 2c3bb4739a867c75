// ===============================
// src/metrics.rs
// ===============================
use std::convert::Infallible;
use std::net::SocketAddr;

use hyper::service::{make_service_fn, service_fn};
use hyper::{header, Body, Request, Response, Server, StatusCode};
use once_cell::sync::Lazy;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry,
    TextEncoder,
};
use tracing::{error, info};

// Single custom registry (we register everything here)
pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

// -------- Dispatch --------
pub static TASKS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("analysis_tasks_total", "per-position tasks by outcome"),
        &["outcome"],
    )
    .unwrap()
});

pub static JUDGMENTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "judgments_total",
            "analyzed positions (labels: category, simplified)",
        ),
        &["category", "simplified"],
    )
    .unwrap()
});

pub static BACKEND_CALLS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("backend_calls_total", "analysis backend calls"),
        &["backend", "outcome"],
    )
    .unwrap()
});

// Seconds spent waiting on the rate limiter per grant
pub static LIMITER_WAIT: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(
        HistogramOpts::new("rate_limiter_wait_seconds", "time spent waiting for a grant")
            .buckets(vec![0.0, 0.5, 1.0, 2.0, 4.0, 6.0, 10.0, 30.0, 60.0]),
    )
    .unwrap()
});

pub static REPORTS_DELIVERED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("reports_delivered_total", "category documents delivered"),
        &["category"],
    )
    .unwrap()
});

// ---- Config visibility ----
pub static CONFIG_BACKEND: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("config_backend", "analysis backend (label: backend)"),
        &["backend"],
    )
    .unwrap()
});

pub static CONFIG_POSITIONS: Lazy<IntGauge> =
    Lazy::new(|| IntGauge::new("config_positions", "positions in the portfolio file").unwrap());

pub static QUOTA_SKIPPED: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("quota_skipped_positions", "positions left out by today's quota").unwrap()
});

pub fn init() {
    // Register all metrics to the custom registry; a second init() is a no-op
    for m in [
        REGISTRY.register(Box::new(TASKS.clone())),
        REGISTRY.register(Box::new(JUDGMENTS.clone())),
        REGISTRY.register(Box::new(BACKEND_CALLS.clone())),
        REGISTRY.register(Box::new(LIMITER_WAIT.clone())),
        REGISTRY.register(Box::new(REPORTS_DELIVERED.clone())),
        REGISTRY.register(Box::new(CONFIG_BACKEND.clone())),
        REGISTRY.register(Box::new(CONFIG_POSITIONS.clone())),
        REGISTRY.register(Box::new(QUOTA_SKIPPED.clone())),
    ] {
        let _ = m;
    }
}

// Encode all metrics in Prometheus text format
pub fn encode_metrics() -> Vec<u8> {
    let encoder = TextEncoder::new();
    let families = REGISTRY.gather();
    let mut buf = Vec::new();
    if encoder.encode(&families, &mut buf).is_err() || buf.is_empty() {
        buf.extend_from_slice(b"# no metrics\n");
    }
    buf
}

async fn handle(req: Request<Body>) -> Result<Response<Body>, Infallible> {
    let resp = match req.uri().path() {
        "/" | "/metrics" => Response::builder()
            .header(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")
            .body(Body::from(encode_metrics())),
        _ => Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Body::from("not found\n")),
    };
    Ok(resp.unwrap_or_else(|_| Response::new(Body::empty())))
}

/// Serve GET / and /metrics until the process exits. Bind errors are logged, not fatal.
pub async fn serve_metrics(port: u16) {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let builder = match Server::try_bind(&addr) {
        Ok(b) => b,
        Err(e) => {
            error!(%addr, error = %e, "metrics bind failed");
            return;
        }
    };
    let make_svc = make_service_fn(|_conn| async { Ok::<_, Infallible>(service_fn(handle)) });

    info!("metrics listening on http://{addr}/ (and /metrics)");
    if let Err(e) = builder.serve(make_svc).await {
        error!(error = %e, "metrics server stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registered_counters_show_up_in_the_export() {
        init();
        init();
        TASKS.with_label_values(&["ok"]).inc();
        let text = String::from_utf8(encode_metrics()).unwrap();
        assert!(text.contains("analysis_tasks_total"));
    }

    #[tokio::test]
    async fn unknown_paths_are_404() {
        let req = Request::builder().uri("/nope").body(Body::empty()).unwrap();
        let resp = handle(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let req = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
        assert_eq!(handle(req).await.unwrap().status(), StatusCode::OK);
    }
}

// ===============================
// src/lib.rs
// ===============================
pub mod aggregator;
pub mod backend;
pub mod classifier;
pub mod config;
pub mod dispatcher;
pub mod domain;
pub mod judgment;
pub mod limiter;
pub mod market;
pub mod metrics;
pub mod portfolio;
pub mod preferences;
pub mod quota;
pub mod recorder;
pub mod report;
pub mod simplifier;
pub mod sink;
pub mod tax;

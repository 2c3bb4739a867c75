// ===============================
// src/market.rs
// ===============================
//
// Market/news data adapters:
// - YahooMarketData : quote price + recent headlines over HTTP
// - MockMarketData  : offline random-walk price, placeholder news
//
// Both degrade to a partial snapshot (null price / placeholder headline)
// instead of failing; `FetchError` exists for adapters that cannot.
//

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use rand::Rng;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::domain::MarketSnapshot;

/// Headlines passed to the backend per symbol.
pub const MAX_NEWS: usize = 5;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("bad url: {0}")]
    Url(#[from] url::ParseError),
    #[error("unexpected response: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait MarketData: Send + Sync {
    async fn fetch(&self, symbol: &str) -> Result<MarketSnapshot, FetchError>;
}

// --- Yahoo response models (only the fields we read) ---

#[derive(Debug, Deserialize)]
struct QuoteEnvelope {
    #[serde(rename = "quoteResponse")]
    quote_response: QuoteResponse,
}

#[derive(Debug, Deserialize)]
struct QuoteResponse {
    #[serde(default)]
    result: Vec<QuoteRow>,
}

#[derive(Debug, Deserialize)]
struct QuoteRow {
    #[serde(rename = "regularMarketPrice")]
    regular_market_price: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct SearchEnvelope {
    #[serde(default)]
    news: Vec<NewsItem>,
}

#[derive(Debug, Deserialize)]
struct NewsItem {
    title: Option<String>,
    publisher: Option<String>,
    #[serde(rename = "providerPublishTime")]
    provider_publish_time: Option<i64>,
}

pub fn parse_quote(body: &str) -> Result<Option<f64>, FetchError> {
    let env: QuoteEnvelope = serde_json::from_str(body).map_err(|e| FetchError::Malformed(e.to_string()))?;
    Ok(env.quote_response.result.first().and_then(|r| r.regular_market_price))
}

/// Headlines formatted as `[YYYY-MM-DD] publisher: title`, at most `MAX_NEWS`.
pub fn parse_news(body: &str) -> Result<Vec<String>, FetchError> {
    let env: SearchEnvelope = serde_json::from_str(body).map_err(|e| FetchError::Malformed(e.to_string()))?;
    Ok(env
        .news
        .into_iter()
        .take(MAX_NEWS)
        .map(|n| {
            let date = n
                .provider_publish_time
                .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| "不明".to_string());
            let publisher = n.publisher.unwrap_or_else(|| "不明".to_string());
            let title = n.title.unwrap_or_else(|| "タイトルなし".to_string());
            format!("[{date}] {publisher}: {title}")
        })
        .collect())
}

fn no_news(symbol: &str) -> Vec<String> {
    vec![format!("{symbol}関連のニュースは現在ありません。")]
}

pub struct YahooMarketData {
    http: reqwest::Client,
    quote_url: String,
    search_url: String,
    api_key: Option<String>,
}

impl YahooMarketData {
    pub const DEFAULT_QUOTE_URL: &'static str = "https://yfapi.net/v6/finance/quote";
    pub const DEFAULT_SEARCH_URL: &'static str = "https://query1.finance.yahoo.com/v1/finance/search";

    pub fn new(api_key: Option<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            http,
            quote_url: Self::DEFAULT_QUOTE_URL.to_string(),
            search_url: Self::DEFAULT_SEARCH_URL.to_string(),
            api_key,
        }
    }

    async fn quote(&self, symbol: &str) -> Result<Option<f64>, FetchError> {
        let url = Url::parse_with_params(&self.quote_url, &[("symbols", symbol)])?;
        let mut req = self.http.get(url);
        if let Some(key) = &self.api_key {
            req = req.header("x-api-key", key);
        }
        let body = req.send().await?.error_for_status()?.text().await?;
        parse_quote(&body)
    }

    async fn news(&self, symbol: &str) -> Result<Vec<String>, FetchError> {
        let count = MAX_NEWS.to_string();
        let url = Url::parse_with_params(
            &self.search_url,
            &[("q", symbol), ("newsCount", count.as_str()), ("quotesCount", "0")],
        )?;
        let body = self.http.get(url).send().await?.error_for_status()?.text().await?;
        parse_news(&body)
    }
}

#[async_trait]
impl MarketData for YahooMarketData {
    async fn fetch(&self, symbol: &str) -> Result<MarketSnapshot, FetchError> {
        let (price, news) = futures_util::future::join(self.quote(symbol), self.news(symbol)).await;

        let price = price.unwrap_or_else(|e| {
            warn!(%symbol, error = %e, "quote lookup failed");
            None
        });
        let news = match news {
            Ok(items) if items.is_empty() => {
                info!(%symbol, "no news found");
                no_news(symbol)
            }
            Ok(items) => items,
            Err(e) => {
                warn!(%symbol, error = %e, "news lookup failed");
                vec![format!("{symbol}関連ニュースの取得に失敗しました")]
            }
        };
        Ok(MarketSnapshot { price, news })
    }
}

/// Offline source for dry runs: random walk around a fixed base.
#[derive(Debug, Clone)]
pub struct MockMarketData {
    pub base_price: f64,
}

impl Default for MockMarketData {
    fn default() -> Self {
        Self { base_price: 1000.0 }
    }
}

#[async_trait]
impl MarketData for MockMarketData {
    async fn fetch(&self, symbol: &str) -> Result<MarketSnapshot, FetchError> {
        // ThreadRng is !Send, keep it out of any await
        let step: f64 = rand::thread_rng().gen_range(-0.05..=0.05);
        let price = ((self.base_price * (1.0 + step)) * 100.0).round() / 100.0;
        Ok(MarketSnapshot { price: Some(price), news: no_news(symbol) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_price_is_read_from_first_row() {
        let body = r#"{"quoteResponse":{"result":[{"symbol":"7203.T","regularMarketPrice":2700.5}],"error":null}}"#;
        assert_eq!(parse_quote(body).unwrap(), Some(2700.5));
        let empty = r#"{"quoteResponse":{"result":[]}}"#;
        assert_eq!(parse_quote(empty).unwrap(), None);
        assert!(matches!(parse_quote("<html>"), Err(FetchError::Malformed(_))));
    }

    #[test]
    fn news_is_formatted_and_capped() {
        let items: Vec<String> = (0..8)
            .map(|i| format!(r#"{{"title":"t{i}","publisher":"Nikkei","providerPublishTime":1735689600}}"#))
            .collect();
        let body = format!(r#"{{"news":[{}]}}"#, items.join(","));
        let news = parse_news(&body).unwrap();
        assert_eq!(news.len(), MAX_NEWS);
        assert_eq!(news[0], "[2025-01-01] Nikkei: t0");

        let sparse = parse_news(r#"{"news":[{}]}"#).unwrap();
        assert_eq!(sparse, vec!["[不明] 不明: タイトルなし".to_string()]);
        assert!(parse_news(r#"{"quotes":[]}"#).unwrap().is_empty());
    }

    #[tokio::test]
    async fn mock_source_stays_near_base() {
        let mock = MockMarketData::default();
        for _ in 0..50 {
            let snap = mock.fetch("TEST").await.unwrap();
            let p = snap.price.unwrap();
            assert!((950.0..=1050.0).contains(&p));
            assert_eq!(snap.news.len(), 1);
        }
    }
}

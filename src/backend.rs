// ===============================
// src/backend.rs
// ===============================
//
// Analysis backends (LLM text generation).
//
// Backends never fail from the dispatcher's point of view: a missing key,
// a transport error or a non-2xx status comes back as an error-marker
// document (`## 分析失敗 ...`) that is rendered like any other analysis
// and yields no decision label.
//

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::warn;

use crate::domain::{AnalysisRequest, ConsideringAction, HoldingStatus, MarketSnapshot, Position};
use crate::metrics::BACKEND_CALLS;
use crate::report::{format_amount, format_price};
use crate::tax::ProfitLoss;

pub const FAILURE_HEADER: &str = "## 分析失敗";
const MAX_ERROR_BODY_CHARS: usize = 500;
const SYSTEM_PROMPT: &str = "あなたは株式分析の専門家です。データに基づいて客観的な分析と売買判断を提供してください。";

#[async_trait]
pub trait AnalysisBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether calls must pass through the shared rate limiter.
    fn rate_limited(&self) -> bool {
        false
    }

    async fn analyze(&self, request: &AnalysisRequest, preferences: &str) -> String;
}

pub fn failure_marker(detail: &str) -> String {
    format!("{FAILURE_HEADER}\n\n**エラー内容:** {detail}")
}

pub fn is_failure_marker(text: &str) -> bool {
    text.trim_start().starts_with(FAILURE_HEADER)
}

fn http_failure(backend: &str, status: u16, body: &str) -> String {
    let detail: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
    format!(
        "{}\n\n**API応答:** {detail}",
        failure_marker(&format!("{backend} APIエラー: HTTPステータス {status}"))
    )
}

/// Snapshot + position -> backend input. P/L only when both prices are known.
pub fn build_request(position: &Position, snapshot: &MarketSnapshot) -> AnalysisRequest {
    let price = snapshot.price;
    let status = match position.quantity {
        Some(q) if q > 0 => HoldingStatus::Long {
            quantity: q,
            acquisition_price: position.acquisition_price,
            pnl: price
                .zip(position.acquisition_price)
                .and_then(|(p, a)| ProfitLoss::long(p, a, q, position.account_type)),
        },
        Some(q) if q < 0 => HoldingStatus::Short {
            quantity: q,
            short_price: position.acquisition_price,
            pnl: price
                .zip(position.acquisition_price)
                .and_then(|(p, a)| ProfitLoss::short(p, a, q, position.account_type)),
        },
        _ => HoldingStatus::NotHeld(position.considering_action),
    };

    AnalysisRequest {
        symbol: position.symbol.clone(),
        name: position.name.clone(),
        price,
        currency: position.currency().to_string(),
        status,
        news: snapshot.news.clone(),
    }
}

fn pnl_lines(pnl: &ProfitLoss, currency: &str) -> String {
    let mut s = format!(
        "\n現在の損益: {}{currency}（{:+.2}%）",
        format_amount(pnl.amount),
        pnl.rate_pct
    );
    if pnl.tax > 0.0 {
        s.push_str(&format!(
            "\n想定税額: {}{currency}（税引後損益: {}{currency}）",
            format_amount(pnl.tax),
            format_amount(pnl.after_tax)
        ));
    } else if pnl.amount > 0.0 {
        s.push_str(&format!("\n非課税口座のため税引後損益: {}{currency}", format_amount(pnl.after_tax)));
    }
    s
}

pub fn holding_status_text(request: &AnalysisRequest) -> String {
    let cur = &request.currency;
    match &request.status {
        HoldingStatus::Long { quantity, acquisition_price, pnl } => {
            let mut s = format!("現在の保有状況: {quantity}株を保有中");
            if let Some(a) = acquisition_price {
                s.push_str(&format!("（取得単価: {}{cur}）", format_price(*a)));
            }
            if let Some(pnl) = pnl {
                s.push_str(&pnl_lines(pnl, cur));
            }
            s
        }
        HoldingStatus::Short { quantity, short_price, pnl } => {
            let mut s = format!("現在の保有状況: {}株を空売り中（信用売り）", quantity.unsigned_abs());
            if let Some(a) = short_price {
                s.push_str(&format!("（空売り価格: {}{cur}）", format_price(*a)));
            }
            if let Some(pnl) = pnl {
                s.push_str(&pnl_lines(pnl, cur));
            }
            s
        }
        HoldingStatus::NotHeld(ConsideringAction::Buy) => {
            "現在の保有状況: 保有なし（購入を検討中）".to_string()
        }
        HoldingStatus::NotHeld(ConsideringAction::ShortSell) => {
            "現在の保有状況: 保有なし（空売りを検討中）".to_string()
        }
    }
}

pub fn build_prompt(request: &AnalysisRequest, preferences: &str) -> String {
    let price = request.price.map(format_price).unwrap_or_else(|| "不明".to_string());
    let news: Vec<String> = request.news.iter().map(|n| format!("- {n}")).collect();

    let mut prompt = format!(
        "{name}（{symbol}）の分析をお願いします。\n\n\
         現在の株価: {price}{cur}\n\
         {status}\n\n\
         最近のニュース:\n{news}\n\n",
        name = request.name,
        symbol = request.symbol,
        cur = request.currency,
        status = holding_status_text(request),
        news = news.join("\n"),
    );
    if !preferences.trim().is_empty() {
        prompt.push_str(preferences.trim());
        prompt.push_str("\n\n");
    }
    prompt.push_str(
        "以下の観点から分析してください：\n\
         1. 株価とニュースの要約\n\
         2. 現在のトレンドと今後の見通し\n\
         3. リスク要因とチャンス要因\n\
         4. 売買判断（買い/売り/ホールド/様子見）とその理由\n\
         5. 推奨する指値価格（買い注文または売り注文）\n\n\
         保有状況と投資家の志向性を考慮して、具体的な売買アクションを提案してください。\n\
         結論は必ず独立した1行で「売買判断: <判断>」の形式で記載してください。",
    );
    prompt
}

fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(60))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

fn missing_key(backend: &str, env_key: &str) -> String {
    failure_marker(&format!(
        "{backend} APIエラー: APIキーが未設定です。環境変数{env_key}を確認してください。"
    ))
}

/// POST `body` as JSON, pull the generated text out with `extract`.
async fn post_json(
    backend: &'static str,
    req: reqwest::RequestBuilder,
    body: &Value,
    extract: fn(&Value) -> Option<&str>,
) -> String {
    let resp = match req.json(body).send().await {
        Ok(r) => r,
        Err(e) => {
            warn!(backend, error = %e, "analysis request failed");
            BACKEND_CALLS.with_label_values(&[backend, "transport_error"]).inc();
            return failure_marker(&format!("{backend} API呼び出し失敗: {e}"));
        }
    };

    let status = resp.status();
    let text = resp.text().await.unwrap_or_default();
    if !status.is_success() {
        warn!(backend, status = status.as_u16(), "analysis backend returned an error status");
        BACKEND_CALLS.with_label_values(&[backend, "http_error"]).inc();
        return http_failure(backend, status.as_u16(), &text);
    }

    let parsed: Option<String> = serde_json::from_str::<Value>(&text)
        .ok()
        .and_then(|v| extract(&v).map(str::to_string));
    match parsed {
        Some(out) => {
            BACKEND_CALLS.with_label_values(&[backend, "ok"]).inc();
            out
        }
        None => {
            warn!(backend, "analysis response had no text content");
            BACKEND_CALLS.with_label_values(&[backend, "malformed"]).inc();
            failure_marker(&format!("{backend} APIエラー: 応答に本文が含まれていません"))
        }
    }
}

/// Gemini `generateContent`; rate-limited and subject to the daily ceiling.
pub struct GeminiBackend {
    http: reqwest::Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
}

impl GeminiBackend {
    pub const DEFAULT_BASE_URL: &'static str = "https://generativelanguage.googleapis.com/v1beta";

    pub fn new(api_key: Option<String>, model: impl Into<String>) -> Self {
        Self {
            http: http_client(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            model: model.into(),
            base_url: Self::DEFAULT_BASE_URL.to_string(),
        }
    }

    fn extract(v: &Value) -> Option<&str> {
        v.pointer("/candidates/0/content/parts/0/text")?.as_str()
    }
}

#[async_trait]
impl AnalysisBackend for GeminiBackend {
    fn name(&self) -> &'static str {
        "gemini"
    }

    fn rate_limited(&self) -> bool {
        true
    }

    async fn analyze(&self, request: &AnalysisRequest, preferences: &str) -> String {
        let Some(key) = self.api_key.as_deref() else {
            BACKEND_CALLS.with_label_values(&["gemini", "missing_key"]).inc();
            return missing_key("Gemini", "GEMINI_API_KEY");
        };
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url,
            self.model,
            urlencoding::encode(key)
        );
        let prompt = format!("{SYSTEM_PROMPT}\n\n{}", build_prompt(request, preferences));
        let body = json!({ "contents": [ { "parts": [ { "text": prompt } ] } ] });
        post_json("gemini", self.http.post(url), &body, Self::extract).await
    }
}

/// Anthropic Messages API; no rate limiting.
pub struct ClaudeBackend {
    http: reqwest::Client,
    api_key: Option<String>,
    model: String,
    url: String,
}

impl ClaudeBackend {
    pub const DEFAULT_URL: &'static str = "https://api.anthropic.com/v1/messages";
    const API_VERSION: &'static str = "2023-06-01";

    pub fn new(api_key: Option<String>, model: impl Into<String>) -> Self {
        Self {
            http: http_client(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            model: model.into(),
            url: Self::DEFAULT_URL.to_string(),
        }
    }

    fn extract(v: &Value) -> Option<&str> {
        v.pointer("/content/0/text")?.as_str()
    }
}

#[async_trait]
impl AnalysisBackend for ClaudeBackend {
    fn name(&self) -> &'static str {
        "claude"
    }

    async fn analyze(&self, request: &AnalysisRequest, preferences: &str) -> String {
        let Some(key) = self.api_key.as_deref() else {
            BACKEND_CALLS.with_label_values(&["claude", "missing_key"]).inc();
            return missing_key("Claude", "CLAUDE_API_KEY");
        };
        let body = json!({
            "model": self.model,
            "max_tokens": 1500,
            "temperature": 0.5,
            "system": SYSTEM_PROMPT,
            "messages": [ { "role": "user", "content": build_prompt(request, preferences) } ],
        });
        let req = self
            .http
            .post(&self.url)
            .header("x-api-key", key)
            .header("anthropic-version", Self::API_VERSION);
        post_json("claude", req, &body, Self::extract).await
    }
}

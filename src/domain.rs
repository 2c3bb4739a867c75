// ===============================
// src/domain.rs
// ===============================
use serde::{Deserialize, Serialize};

use crate::tax::ProfitLoss;

/// Portfolio bucket. Computed once per run, used only as a grouping key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Holding,
    ShortSelling,
    ConsideringBuy,
    ConsideringShortSell,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Holding,
        Category::ShortSelling,
        Category::ConsideringBuy,
        Category::ConsideringShortSell,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Holding => "holding",
            Category::ShortSelling => "short_selling",
            Category::ConsideringBuy => "considering_buy",
            Category::ConsideringShortSell => "considering_short_sell",
        }
    }

    /// Section title used for the per-category report document.
    pub fn title(&self) -> &'static str {
        match self {
            Category::Holding => "保有銘柄",
            Category::ShortSelling => "空売り銘柄",
            Category::ConsideringBuy => "購入検討銘柄",
            Category::ConsideringShortSell => "空売り検討銘柄",
        }
    }
}

/// One value per category; every key is always present.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ByCategory<T> {
    pub holding: T,
    pub short_selling: T,
    pub considering_buy: T,
    pub considering_short_sell: T,
}

impl<T> ByCategory<T> {
    pub fn get(&self, category: Category) -> &T {
        match category {
            Category::Holding => &self.holding,
            Category::ShortSelling => &self.short_selling,
            Category::ConsideringBuy => &self.considering_buy,
            Category::ConsideringShortSell => &self.considering_short_sell,
        }
    }

    pub fn get_mut(&mut self, category: Category) -> &mut T {
        match category {
            Category::Holding => &mut self.holding,
            Category::ShortSelling => &mut self.short_selling,
            Category::ConsideringBuy => &mut self.considering_buy,
            Category::ConsideringShortSell => &mut self.considering_short_sell,
        }
    }

    /// Iterate in the fixed `Category::ALL` order.
    pub fn iter(&self) -> impl Iterator<Item = (Category, &T)> {
        Category::ALL.into_iter().map(move |c| (c, self.get(c)))
    }
}

/// Tax treatment of the account a position sits in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AccountType {
    /// Taxable "specified" account.
    #[default]
    #[serde(rename = "特定")]
    Tokutei,
    #[serde(rename = "NISA")]
    Nisa,
    #[serde(rename = "旧NISA")]
    OldNisa,
}

impl AccountType {
    /// Unknown or missing values fall back to the taxable default.
    pub fn parse_lenient(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some("NISA") => AccountType::Nisa,
            Some("旧NISA") => AccountType::OldNisa,
            _ => AccountType::Tokutei,
        }
    }

    pub fn is_tax_exempt(&self) -> bool {
        matches!(self, AccountType::Nisa | AccountType::OldNisa)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Tokutei => "特定",
            AccountType::Nisa => "NISA",
            AccountType::OldNisa => "旧NISA",
        }
    }
}

/// Intent for a position that is not currently held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsideringAction {
    #[default]
    Buy,
    ShortSell,
}

impl ConsideringAction {
    pub fn parse_lenient(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("short_sell") => ConsideringAction::ShortSell,
            _ => ConsideringAction::Buy,
        }
    }
}

/// One configured portfolio entry (held, shorted, or merely watched).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Position {
    pub symbol: String,
    pub name: String,
    /// >0 long, <0 short, None/0 not held.
    pub quantity: Option<i64>,
    pub acquisition_price: Option<f64>,
    pub currency: Option<String>,
    pub account_type: AccountType,
    pub considering_action: ConsideringAction,
    pub note: Option<String>,
    pub added: Option<String>,
}

impl Position {
    pub fn new(symbol: impl Into<String>) -> Self {
        let symbol = symbol.into();
        Self {
            name: symbol.clone(),
            symbol,
            quantity: None,
            acquisition_price: None,
            currency: None,
            account_type: AccountType::default(),
            considering_action: ConsideringAction::default(),
            note: None,
            added: None,
        }
    }

    pub fn with_quantity(mut self, quantity: i64) -> Self {
        self.quantity = Some(quantity);
        self
    }

    pub fn with_acquisition_price(mut self, price: f64) -> Self {
        self.acquisition_price = Some(price);
        self
    }

    pub fn with_account_type(mut self, account_type: AccountType) -> Self {
        self.account_type = account_type;
        self
    }

    pub fn with_considering_action(mut self, action: ConsideringAction) -> Self {
        self.considering_action = action;
        self
    }

    /// Explicit currency if configured, otherwise inferred from the symbol.
    pub fn currency(&self) -> &str {
        match self.currency.as_deref() {
            Some(c) if !c.trim().is_empty() => c,
            _ => crate::portfolio::infer_currency(&self.symbol),
        }
    }
}

/// Result of the market/news lookup for one symbol.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub price: Option<f64>,
    pub news: Vec<String>,
}

/// Holding status as presented to the analysis backend.
#[derive(Debug, Clone, PartialEq)]
pub enum HoldingStatus {
    Long {
        quantity: i64,
        acquisition_price: Option<f64>,
        pnl: Option<ProfitLoss>,
    },
    Short {
        quantity: i64,
        short_price: Option<f64>,
        pnl: Option<ProfitLoss>,
    },
    NotHeld(ConsideringAction),
}

/// Ephemeral per-position input for a backend call.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisRequest {
    pub symbol: String,
    pub name: String,
    pub price: Option<f64>,
    pub currency: String,
    pub status: HoldingStatus,
    pub news: Vec<String>,
}

/// Table-of-contents entry for one successfully processed position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReportInfo {
    pub symbol: String,
    pub name: String,
    pub judgment: String,
    pub anchor_id: String,
}

/// Events written by the JSONL recorder.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    RunStarted { backend: String, positions: usize, selected: usize },
    Analyzed { symbol: String, category: Category, judgment: String, simplified: bool, elapsed_ms: u64 },
    Failed { symbol: String, reason: String },
    Delivered { category: Category, reports: usize },
}

// ===============================
// src/preferences.rs
// ===============================
//
// Investor preference profile. Rendered once per run into a prompt block
// that every analysis request shares.
//

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum PreferenceError {
    #[error("cannot read preference file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid preference file {path}: {source}")]
    Invalid {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvestmentStyle {
    Growth,
    Value,
    Income,
    #[default]
    Balanced,
    Speculative,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskTolerance {
    Low,
    #[default]
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvestmentHorizon {
    Short,
    #[default]
    Medium,
    Long,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradingFrequency {
    High,
    #[default]
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FocusArea {
    Technical,
    Fundamental,
    News,
    Dividend,
    Momentum,
}

impl InvestmentStyle {
    fn label(&self) -> &'static str {
        match self {
            InvestmentStyle::Growth => "成長投資（成長性重視、高リスク・高リターン）",
            InvestmentStyle::Value => "バリュー投資（割安株投資、中リスク・中リターン）",
            InvestmentStyle::Income => "インカムゲイン投資（配当・優待重視、低リスク・安定志向）",
            InvestmentStyle::Balanced => "バランス投資（成長と配当のバランス、中リスク）",
            InvestmentStyle::Speculative => "投機的投資（短期売買、高リスク・高リターン）",
        }
    }
}

impl RiskTolerance {
    fn label(&self) -> &'static str {
        match self {
            RiskTolerance::Low => "低リスク（元本重視、安全性優先）",
            RiskTolerance::Medium => "中リスク（適度なリスクとリターンのバランス）",
            RiskTolerance::High => "高リスク（積極的なリターン追求、損失許容度が高い）",
        }
    }
}

impl InvestmentHorizon {
    fn label(&self) -> &'static str {
        match self {
            InvestmentHorizon::Short => "短期（数日～数週間）",
            InvestmentHorizon::Medium => "中期（数ヶ月～1年）",
            InvestmentHorizon::Long => "長期（数年以上）",
        }
    }
}

impl TradingFrequency {
    fn label(&self) -> &'static str {
        match self {
            TradingFrequency::High => "頻繁（デイトレード、スイングトレード）",
            TradingFrequency::Medium => "適度（週次～月次で売買）",
            TradingFrequency::Low => "少ない（バイ&ホールド、長期保有）",
        }
    }
}

impl FocusArea {
    fn label(&self) -> &'static str {
        match self {
            FocusArea::Technical => "テクニカル分析（チャート、移動平均、RSIなど）",
            FocusArea::Fundamental => "ファンダメンタル分析（PER、PBR、財務状況）",
            FocusArea::News => "ニュース・イベント（市場センチメント、企業ニュース）",
            FocusArea::Dividend => "配当利回り（株主優待、インカムゲイン）",
            FocusArea::Momentum => "モメンタム（トレンド、勢い）",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct InvestmentPreferences {
    pub investment_style: InvestmentStyle,
    pub risk_tolerance: RiskTolerance,
    pub investment_horizon: InvestmentHorizon,
    pub trading_frequency: TradingFrequency,
    pub focus_areas: Vec<FocusArea>,
    pub custom_message: Option<String>,
}

impl Default for InvestmentPreferences {
    fn default() -> Self {
        Self {
            investment_style: InvestmentStyle::default(),
            risk_tolerance: RiskTolerance::default(),
            investment_horizon: InvestmentHorizon::default(),
            trading_frequency: TradingFrequency::default(),
            focus_areas: vec![FocusArea::Fundamental, FocusArea::News],
            custom_message: None,
        }
    }
}

impl InvestmentPreferences {
    /// Prompt block shared by every analysis request of a run.
    pub fn prompt_text(&self) -> String {
        let mut parts = vec![
            "投資家の志向性:".to_string(),
            format!("- 投資スタイル: {}", self.investment_style.label()),
            format!("- リスク許容度: {}", self.risk_tolerance.label()),
            format!("- 投資期間: {}", self.investment_horizon.label()),
            format!("- 売買頻度: {}", self.trading_frequency.label()),
        ];
        if !self.focus_areas.is_empty() {
            let labels: Vec<&str> = self.focus_areas.iter().map(FocusArea::label).collect();
            parts.push(format!("- 重視する指標: {}", labels.join(", ")));
        }
        if let Some(msg) = self.custom_message.as_deref().map(str::trim).filter(|m| !m.is_empty()) {
            parts.push(format!("- 追加の要望: {msg}"));
        }
        parts.join("\n")
    }
}

pub fn parse_preferences(text: &str, origin: &str) -> Result<InvestmentPreferences, PreferenceError> {
    if text.trim().is_empty() {
        warn!(path = %origin, "preference file is empty, using defaults");
        return Ok(InvestmentPreferences::default());
    }
    serde_yaml::from_str(text).map_err(|source| PreferenceError::Invalid { path: origin.to_string(), source })
}

/// Missing file -> defaults (with a warning); invalid values -> error.
pub fn load_preferences(path: &Path) -> Result<InvestmentPreferences, PreferenceError> {
    let origin = path.display().to_string();
    match std::fs::read_to_string(path) {
        Ok(text) => parse_preferences(&text, &origin),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(path = %origin, "preference file not found, using defaults");
            Ok(InvestmentPreferences::default())
        }
        Err(source) => Err(PreferenceError::Io { path: origin, source }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_render_balanced_profile() {
        let text = InvestmentPreferences::default().prompt_text();
        assert!(text.starts_with("投資家の志向性:"));
        assert!(text.contains("バランス投資"));
        assert!(text.contains("ファンダメンタル分析（PER、PBR、財務状況）, ニュース・イベント"));
        assert!(!text.contains("追加の要望"));
    }

    #[test]
    fn partial_file_merges_over_defaults() {
        let prefs = parse_preferences(
            "investment_style: growth\nfocus_areas: [technical, momentum]\ncustom_message: '  半導体に注目  '\n",
            "prefs.yaml",
        )
        .unwrap();
        assert_eq!(prefs.investment_style, InvestmentStyle::Growth);
        assert_eq!(prefs.risk_tolerance, RiskTolerance::Medium);
        assert_eq!(prefs.focus_areas, vec![FocusArea::Technical, FocusArea::Momentum]);
        assert!(prefs.prompt_text().contains("- 追加の要望: 半導体に注目"));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = parse_preferences("risk_tolerance: extreme\n", "prefs.yaml").unwrap_err();
        assert!(matches!(err, PreferenceError::Invalid { .. }));
        assert!(parse_preferences("focus_areas: astrology\n", "prefs.yaml").is_err());
    }

    #[test]
    fn missing_or_empty_file_uses_defaults() {
        let prefs = load_preferences(Path::new("/nonexistent/prefs.yaml")).unwrap();
        assert_eq!(prefs, InvestmentPreferences::default());
        assert_eq!(parse_preferences("", "p").unwrap(), InvestmentPreferences::default());
    }
}

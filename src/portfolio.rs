// ===============================
// src/portfolio.rs
// ===============================
//
// Portfolio file loader.
//
//   stocks:
//     - symbol: 7203            # bare 4-digit code -> "7203.T"
//       name: トヨタ自動車
//       quantity: 100           # >0 long, <0 short, absent/0 watch-list
//       acquisition_price: 2500
//       account_type: NISA      # 特定 | NISA | 旧NISA (anything else -> 特定)
//     - symbol: AAPL
//       considering_action: short_sell
//     - 6758.T                  # legacy: bare symbol
//
// Any failure here is a configuration error and aborts the run before
// dispatch starts.
//

use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_yaml::Value;
use thiserror::Error;
use tracing::warn;

use crate::domain::{AccountType, ConsideringAction, Position};

#[derive(Debug, Error)]
pub enum PortfolioError {
    #[error("portfolio file not found: {0}")]
    NotFound(PathBuf),
    #[error("cannot read portfolio file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("YAML parse error in {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("portfolio is empty, add stocks to {0}")]
    Empty(PathBuf),
}

#[derive(Debug, Default, Deserialize)]
struct PortfolioFile {
    #[serde(default)]
    stocks: Option<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct RawPosition {
    symbol: Value,
    name: Option<String>,
    quantity: Option<i64>,
    acquisition_price: Option<f64>,
    currency: Option<String>,
    account_type: Option<String>,
    considering_action: Option<String>,
    note: Option<String>,
    added: Option<Value>,
}

/// Bare 4-digit codes are Tokyo listings and get the `.T` suffix.
pub fn normalize_symbol(raw: &str) -> String {
    let s = raw.trim();
    if s.len() == 4 && s.chars().all(|c| c.is_ascii_digit()) {
        format!("{s}.T")
    } else {
        s.to_string()
    }
}

/// Currency label implied by a symbol's market suffix.
pub fn infer_currency(symbol: &str) -> &'static str {
    let is_jp_code = symbol.len() == 4 && symbol.chars().all(|c| c.is_ascii_digit());
    if symbol.ends_with(".T") || symbol.ends_with(".JP") || is_jp_code {
        "円"
    } else {
        "ドル"
    }
}

fn scalar_to_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn position_from_value(entry: Value) -> Option<Position> {
    // legacy form: a bare symbol
    if let Some(sym) = scalar_to_string(&entry) {
        return Some(Position::new(normalize_symbol(&sym)));
    }

    let raw: RawPosition = match serde_yaml::from_value(entry) {
        Ok(r) => r,
        Err(e) => {
            warn!(error = %e, "portfolio: skipping malformed entry");
            return None;
        }
    };
    let symbol = normalize_symbol(&scalar_to_string(&raw.symbol)?);
    let name = raw
        .name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| symbol.clone());

    Some(Position {
        name,
        quantity: raw.quantity,
        acquisition_price: raw.acquisition_price.filter(|p| *p > 0.0),
        currency: raw.currency,
        account_type: AccountType::parse_lenient(raw.account_type.as_deref()),
        considering_action: ConsideringAction::parse_lenient(raw.considering_action.as_deref()),
        note: raw.note,
        added: raw.added.as_ref().and_then(scalar_to_string),
        symbol,
    })
}

/// Parse portfolio YAML text. `origin` is only used for error messages.
pub fn parse_portfolio(text: &str, origin: &Path) -> Result<Vec<Position>, PortfolioError> {
    if text.trim().is_empty() {
        return Err(PortfolioError::Empty(origin.to_path_buf()));
    }
    let file: Option<PortfolioFile> = serde_yaml::from_str(text).map_err(|source| PortfolioError::Yaml {
        path: origin.to_path_buf(),
        source,
    })?;

    let positions: Vec<Position> = file
        .unwrap_or_default()
        .stocks
        .unwrap_or_default()
        .into_iter()
        .filter_map(position_from_value)
        .collect();

    if positions.is_empty() {
        return Err(PortfolioError::Empty(origin.to_path_buf()));
    }
    Ok(positions)
}

pub fn load_portfolio(path: &Path) -> Result<Vec<Position>, PortfolioError> {
    let text = std::fs::read_to_string(path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            PortfolioError::NotFound(path.to_path_buf())
        } else {
            PortfolioError::Io { path: path.to_path_buf(), source }
        }
    })?;
    parse_portfolio(&text, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn parse(text: &str) -> Result<Vec<Position>, PortfolioError> {
        parse_portfolio(text, Path::new("stocks.yaml"))
    }

    #[test]
    fn normalizes_bare_tokyo_codes() {
        assert_eq!(normalize_symbol("7203"), "7203.T");
        assert_eq!(normalize_symbol("7203.T"), "7203.T");
        assert_eq!(normalize_symbol("AAPL"), "AAPL");
        assert_eq!(normalize_symbol("12345"), "12345");
    }

    #[test]
    fn infers_currency_from_suffix() {
        assert_eq!(infer_currency("7203.T"), "円");
        assert_eq!(infer_currency("6758.JP"), "円");
        assert_eq!(infer_currency("7203"), "円");
        assert_eq!(infer_currency("AAPL"), "ドル");
        assert_eq!(infer_currency("BMW.DE"), "ドル");
    }

    #[test]
    fn parses_full_entries_and_defaults() {
        let positions = parse(
            r#"
stocks:
  - symbol: 7203
    name: トヨタ自動車
    quantity: 100
    acquisition_price: 2500
    account_type: NISA
    added: 2024-01-01
  - symbol: AAPL
    considering_action: short_sell
    account_type: iDeCo
  - symbol: BMW.DE
    currency: ユーロ
  - 6758
"#,
        )
        .unwrap();

        assert_eq!(positions.len(), 4);
        let toyota = &positions[0];
        assert_eq!(toyota.symbol, "7203.T");
        assert_eq!(toyota.name, "トヨタ自動車");
        assert_eq!(toyota.quantity, Some(100));
        assert_eq!(toyota.acquisition_price, Some(2500.0));
        assert_eq!(toyota.account_type, AccountType::Nisa);
        assert_eq!(toyota.added.as_deref(), Some("2024-01-01"));
        assert_eq!(toyota.currency(), "円");

        let apple = &positions[1];
        assert_eq!(apple.name, "AAPL");
        assert_eq!(apple.considering_action, ConsideringAction::ShortSell);
        assert_eq!(apple.account_type, AccountType::Tokutei);
        assert_eq!(apple.currency(), "ドル");

        assert_eq!(positions[2].currency(), "ユーロ");
        assert_eq!(positions[3].symbol, "6758.T");
        assert_eq!(positions[3].considering_action, ConsideringAction::Buy);
    }

    #[test]
    fn entries_without_symbol_are_skipped() {
        let positions = parse("stocks:\n  - name: no symbol\n  - symbol: MSFT\n").unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].symbol, "MSFT");
    }

    #[test]
    fn empty_portfolio_is_an_error() {
        assert!(matches!(parse("stocks: []\n"), Err(PortfolioError::Empty(_))));
        assert!(matches!(parse(""), Err(PortfolioError::Empty(_))));
        assert!(matches!(parse("other: 1\n"), Err(PortfolioError::Empty(_))));
    }

    #[test]
    fn malformed_yaml_is_an_error() {
        assert!(matches!(parse("stocks: [unclosed\n"), Err(PortfolioError::Yaml { .. })));
    }

    #[test]
    fn loads_from_disk_and_reports_missing_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "stocks:\n  - symbol: 9984\n    quantity: -200").unwrap();
        let positions = load_portfolio(f.path()).unwrap();
        assert_eq!(positions[0].symbol, "9984.T");
        assert_eq!(positions[0].quantity, Some(-200));

        let missing = load_portfolio(Path::new("/nonexistent/stocks.yaml"));
        assert!(matches!(missing, Err(PortfolioError::NotFound(_))));
    }
}

// ===============================
// src/simplifier.rs
// ===============================
//
// Condensed report for "no action" decisions.
//
// A hold/maintain verdict does not need the full analysis; we keep the
// label, the current price and one sentence of justification. Detection
// is contextual: the no-action keyword must sit on a labelled decision
// line, so prose that merely mentions "maintain" is left alone.
//

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::report::format_price;

const NO_ACTION_KEYWORDS: [&str; 10] = [
    "ホールド",
    "hold",
    "保有継続",
    "様子見",
    "現状維持",
    "維持",
    "maintain",
    "wait and see",
    "wait-and-see",
    "status quo",
];

pub const DEFAULT_REASON: &str = "現状の保有状況を維持することを推奨します。";

const DISABLE_NOTE: &str =
    "*詳細な分析レポートが必要な場合は、環境変数 `SIMPLIFY_HOLD_REPORTS=false` を設定してください。*";

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid simplifier pattern {pattern}: {e}"))
}

// ASCII keywords only count as whole words ("hold" but not "shareholders")
fn keyword_alternation() -> String {
    NO_ACTION_KEYWORDS
        .iter()
        .map(|k| {
            if k.is_ascii() {
                format!(r"\b{}\b", regex::escape(k))
            } else {
                regex::escape(k)
            }
        })
        .collect::<Vec<_>>()
        .join("|")
}

static NO_ACTION_WORD: Lazy<Regex> = Lazy::new(|| re(&format!("(?i){}", keyword_alternation())));

// decision label, then the keyword somewhere on the same line
static HOLD_DECISION: Lazy<Regex> = Lazy::new(|| {
    re(&format!(
        r"(?i)(?:売買判断|判断|推奨|アクション|\b(?:judgment|judgement|decision|recommendation|action))[：:\s]*[^\n]*(?:{})",
        keyword_alternation()
    ))
});

static MAINTAIN_DECISION: Lazy<Regex> =
    Lazy::new(|| re(r"(?i)(?:売買判断|判断|\b(?:judgment|judgement|decision))[：:\s]*(?:維持|\bmaintain\b)"));

static REASON_PATTERNS: Lazy<[Regex; 4]> = Lazy::new(|| {
    [
        re(r"理由[：:\s]*([^\n]+)"),
        re(r"(?i)(?:売買判断|判断|推奨)[：:\s]*(?:ホールド|hold\b|保有継続|様子見|現状維持|維持)[^\n]*[\n\s]*([^\n]+)"),
        re(r"(?i)\breason[：:\s]*([^\n]+)"),
        re(r"(?i)\b(?:judgment|judgement|recommendation)[：:\s]*(?:hold|maintain)\b[^\n]*[\n\s]*([^\n]+)"),
    ]
});

static SENTENCE_SPLIT: Lazy<Regex> = Lazy::new(|| re(r"[。.]"));

/// True when a labelled decision line carries a no-action keyword.
pub fn detect_hold_judgment(text: &str) -> bool {
    !text.trim().is_empty() && HOLD_DECISION.is_match(text)
}

/// True when an extracted decision label is itself a no-action decision.
pub fn is_no_action(judgment: &str) -> bool {
    NO_ACTION_WORD.is_match(judgment)
}

/// Short-position "maintain" rather than long-position "hold".
pub fn is_maintain_judgment(text: &str) -> bool {
    MAINTAIN_DECISION.is_match(text)
}

/// First sentence of `s`, terminated with 。, if it is long enough to say anything.
fn first_sentence(s: &str, min_chars: usize) -> Option<String> {
    let first = SENTENCE_SPLIT.split(s.trim()).next()?.trim();
    if first.chars().count() <= min_chars {
        return None;
    }
    Some(format!("{first}。"))
}

/// One-sentence justification for the no-action decision.
pub fn extract_hold_reason(text: &str) -> String {
    if text.trim().is_empty() {
        return DEFAULT_REASON.to_string();
    }

    for pattern in REASON_PATTERNS.iter() {
        if let Some(caps) = pattern.captures(text) {
            if let Some(reason) = first_sentence(&caps[1], 5) {
                return reason;
            }
        }
    }

    let lines: Vec<&str> = text.lines().collect();
    for (i, line) in lines.iter().enumerate() {
        if !NO_ACTION_WORD.is_match(line) {
            continue;
        }
        for candidate in lines.iter().skip(i).take(3).map(|l| l.trim()) {
            if candidate.is_empty() || candidate.starts_with('#') || candidate.chars().count() <= 10 {
                continue;
            }
            if let Some(reason) = first_sentence(candidate, 0) {
                return reason;
            }
        }
    }

    DEFAULT_REASON.to_string()
}

/// Replace a verbose no-action analysis with a fixed-format summary.
pub fn simplify_hold_report(symbol: &str, name: &str, text: &str, price: Option<f64>, currency: &str) -> String {
    let reason = extract_hold_reason(text);
    let label = if is_maintain_judgment(text) { "維持" } else { "ホールド" };
    let price = price.map(format_price).unwrap_or_else(|| "N/A".to_string());
    debug!(%symbol, %name, %label, "simplified no-action report");

    format!(
        "## 売買判断: {label}\n\n**現在の株価**: {price}{currency}\n\n{reason}\n\n---\n{DISABLE_NOTE}\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_labelled_hold_in_both_languages() {
        assert!(detect_hold_judgment("## 分析結果\n\n株価は安定。\n\n売買判断: ホールド\n"));
        assert!(detect_hold_judgment("Stock price is stable.\n\nJudgment: Hold\n"));
        assert!(detect_hold_judgment("judgment: hold"));
        assert!(detect_hold_judgment("売買判断：ホールド\n\n理由：市場が不安定なため。"));
        assert!(detect_hold_judgment("推奨アクション: 保有継続"));
        assert!(detect_hold_judgment("判断: 様子見"));
        assert!(detect_hold_judgment("売買判断: 現状維持"));
        assert!(detect_hold_judgment("Decision: maintain the short"));
    }

    #[test]
    fn ignores_keywords_outside_the_decision_line() {
        let text = "Judgment: Buy\n\nManagement expects to maintain margins through next year.";
        assert!(!detect_hold_judgment(text));
        assert!(!detect_hold_judgment("売買判断: 買い\n\n理由：株価が上昇傾向。"));
        assert!(!detect_hold_judgment("売買判断: 売り\n\n理由：利益確定のため。"));
        assert!(!detect_hold_judgment("We maintain a positive view on the sector."));
        assert!(!detect_hold_judgment(""));
    }

    #[test]
    fn english_keywords_match_whole_words_only() {
        assert!(!detect_hold_judgment("Judgment: Buy. Buybacks reward shareholders."));
        assert!(!detect_hold_judgment("Judgment: Sell (support threshold broken)"));
        assert!(!detect_hold_judgment("Recommendation: Buy, raise holdings"));
        assert!(detect_hold_judgment("Recommendation: Hold until earnings"));
        assert!(!is_maintain_judgment("Decision: maintained exposure was a mistake, sell"));
    }

    #[test]
    fn no_action_labels() {
        for label in ["ホールド", "様子見", "維持", "現状維持", "保有継続", "Hold", "maintain", "wait-and-see"] {
            assert!(is_no_action(label), "{label}");
        }
        for label in ["買い", "売り", "買い増し", "Buy", "Sell", "holdings", "threshold", "-"] {
            assert!(!is_no_action(label), "{label}");
        }
    }

    #[test]
    fn basic_hold_summary() {
        let text = "## 分析結果\n\n売買判断: ホールド\n\n理由：市場が不安定なため、現状維持を推奨します。\n";
        let out = simplify_hold_report("7203.T", "トヨタ自動車", text, Some(2500.0), "円");
        assert!(out.contains("## 売買判断: ホールド"));
        assert!(out.contains("2500円"));
        assert!(out.contains("市場が不安定なため、現状維持を推奨します。"));
        assert!(out.contains("SIMPLIFY_HOLD_REPORTS=false"));
    }

    #[test]
    fn price_formatting_and_missing_price() {
        let out = simplify_hold_report("AAPL", "Apple", "Judgment: Hold", Some(150.5), "ドル");
        assert!(out.contains("150.5ドル"));
        let out = simplify_hold_report("AAPL", "Apple", "Judgment: Hold", None, "ドル");
        assert!(out.contains("N/Aドル"));
    }

    #[test]
    fn maintain_label_for_short_positions() {
        let text = "売買判断: 維持\n\n株価の下落トレンドが続いているため、現在の空売りポジションを維持することを推奨します。\n";
        let out = simplify_hold_report("7203.T", "トヨタ自動車", text, Some(2500.0), "円");
        assert!(out.contains("## 売買判断: 維持"));
        assert!(!out.contains("## 売買判断: ホールド"));
        assert!(out.contains("株価の下落トレンドが続いているため"));

        let mixed = "## 分析\n\n売買判断: 維持\n\n以前はホールドを推奨していましたが、空売りポジションを維持します。";
        assert!(detect_hold_judgment(mixed));
        assert!(simplify_hold_report("T", "テスト", mixed, Some(1000.0), "円").contains("## 売買判断: 維持"));
    }

    #[test]
    fn hold_label_even_when_prose_says_maintain() {
        let text = "売買判断: ホールド\n\n株価が横ばいのため、現状維持を推奨します。";
        let out = simplify_hold_report("7203.T", "トヨタ自動車", text, Some(2500.0), "円");
        assert!(out.contains("## 売買判断: ホールド"));
        assert!(!out.contains("## 売買判断: 維持"));
    }

    #[test]
    fn reason_from_labelled_section() {
        let reason = extract_hold_reason("売買判断: 維持\n\n理由: 株価の下落トレンドが続いており、空売りの維持が適切です。");
        assert_eq!(reason, "株価の下落トレンドが続いており、空売りの維持が適切です。");
    }

    #[test]
    fn reason_from_line_after_decision() {
        let reason = extract_hold_reason("Judgment: Hold\nEarnings were flat and guidance unchanged. More text.");
        assert_eq!(reason, "Earnings were flat and guidance unchanged。");
    }

    #[test]
    fn default_reason_when_nothing_usable() {
        assert_eq!(extract_hold_reason(""), DEFAULT_REASON);
        assert_eq!(extract_hold_reason("ホールド"), DEFAULT_REASON);
    }
}

// ===============================
// src/judgment.rs
// ===============================
//
// Trading-decision label extraction from free-text analysis.
//
// The backend is asked to print `売買判断: <label>` but nothing enforces
// it, so extraction is an ordered list of rules, first hit wins:
//
//   1. structured  : "売買判断: 買い" / "judgment: buy", short labels only
//   2. fallback    : recommendation/action labels, markdown heading and bold
//                    variants, trailing justification stripped, max 30 chars
//   3. keyword line: a short line containing decision vocabulary
//
// Nothing found -> NOT_FOUND.
//

use once_cell::sync::Lazy;
use regex::Regex;

/// Sentinel for "no decision located".
pub const NOT_FOUND: &str = "-";

const MAX_STRUCTURED_CHARS: usize = 10;
const MAX_FALLBACK_CHARS: usize = 30;
const MAX_KEYWORD_LINE_CHARS: usize = 30;
const MIN_KEYWORD_LINE_CHARS: usize = 5;

const DECISION_VOCABULARY: [&str; 7] = ["買い", "buy", "売り", "sell", "ホールド", "hold", "様子見"];

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid judgment pattern {pattern}: {e}"))
}

static STRUCTURED: Lazy<[Regex; 2]> = Lazy::new(|| {
    [
        re(r"(?i)(?:売買判断|判断)[：:\s]+([^\n。、.,（(を]+)"),
        re(r"(?i)\b(?:judgment|judgement|decision|action)\s*[：:]\s*([^\n\s。、.,]+)"),
    ]
});

static FALLBACK: Lazy<[Regex; 3]> = Lazy::new(|| {
    [
        re(r"(?i)(?:推奨|アクション|recommendation)[：:\s]+([^\n]+)"),
        re(r"(?i)#{1,2}\s*(?:売買判断|判断)[：:\s]+([^\n]+)"),
        re(r"(?i)\*\*(?:売買判断|判断|推奨|アクション)\*\*[：:\s]+([^\n]+)"),
    ]
});

static MARKUP: Lazy<Regex> = Lazy::new(|| re(r"[*#]"));
static LINE_MARKUP: Lazy<Regex> = Lazy::new(|| re(r"[*#:\-]"));
static LEADING_SEPARATORS: Lazy<Regex> = Lazy::new(|| re(r"^[：:\s]+"));
static LEADING_LABEL: Lazy<Regex> = Lazy::new(|| re(r"(?i)^(?:売買判断|判断|推奨|アクション|recommendation)[：:\s]*"));
static SENTENCE_END: Lazy<Regex> = Lazy::new(|| re(r"[。、.,]"));
static VERB_SUFFIX: Lazy<Regex> = Lazy::new(|| re(r"[をがはに](?:推奨|提供|維持|継続)"));
static PREFERENCE_SUFFIX: Lazy<Regex> = Lazy::new(|| re(r"が(?:良い|おすすめ|望ましい)"));
static OPEN_PAREN: Lazy<Regex> = Lazy::new(|| re(r"[（(]"));
static LINE_CLAUSE_END: Lazy<Regex> = Lazy::new(|| re(r"[（(。、]"));

/// Prefix of `s` before the first match of `re`.
fn cut_before<'a>(re: &Regex, s: &'a str) -> &'a str {
    match re.find(s) {
        Some(m) => &s[..m.start()],
        None => s,
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn strip_trailing_clauses(s: &str) -> &str {
    let s = cut_before(&VERB_SUFFIX, s).trim();
    cut_before(&PREFERENCE_SUFFIX, s).trim()
}

/// A single extraction rule; `apply` returns `None` to fall through.
pub struct Rule {
    pub name: &'static str,
    pub apply: fn(&str) -> Option<String>,
}

pub static RULES: [Rule; 3] = [
    Rule { name: "structured", apply: structured_label },
    Rule { name: "fallback", apply: fallback_label },
    Rule { name: "keyword_line", apply: keyword_line_label },
];

/// Rule 1: labelled decision up to the next clause boundary.
pub fn structured_label(text: &str) -> Option<String> {
    STRUCTURED.iter().find_map(|pattern| {
        let caps = pattern.captures(text)?;
        let label = MARKUP.replace_all(caps[1].trim(), "");
        let label = label.trim();
        (!label.is_empty() && char_len(label) <= MAX_STRUCTURED_CHARS).then(|| label.to_string())
    })
}

/// Rule 2: broader labels, markdown variants, trailing prose removed.
pub fn fallback_label(text: &str) -> Option<String> {
    FALLBACK.iter().find_map(|pattern| {
        let caps = pattern.captures(text)?;
        let cleaned = MARKUP.replace_all(caps[1].trim(), "");
        let s = LEADING_SEPARATORS.replace(cleaned.trim(), "");
        let s = LEADING_LABEL.replace(&s, "");
        let s = cut_before(&SENTENCE_END, &s).trim();
        let s = strip_trailing_clauses(s);
        let s = cut_before(&OPEN_PAREN, s).trim();
        (!s.is_empty()).then(|| s.chars().take(MAX_FALLBACK_CHARS).collect())
    })
}

/// Rule 3: first short line mentioning decision vocabulary.
pub fn keyword_line_label(text: &str) -> Option<String> {
    text.lines().find_map(|line| {
        let lower = line.to_lowercase();
        if !DECISION_VOCABULARY.iter().any(|kw| lower.contains(kw)) {
            return None;
        }
        let clean = LINE_MARKUP.replace_all(line, "");
        let clean = clean.trim();
        let len = char_len(clean);
        if len <= MIN_KEYWORD_LINE_CHARS || len > MAX_KEYWORD_LINE_CHARS {
            return None;
        }
        let clean = strip_trailing_clauses(clean);
        let clean = cut_before(&LINE_CLAUSE_END, clean).trim();
        (!clean.is_empty() && char_len(clean) <= MAX_STRUCTURED_CHARS).then(|| clean.to_string())
    })
}

/// Extract the decision label, or `NOT_FOUND`.
pub fn extract_judgment(text: &str) -> String {
    if text.trim().is_empty() {
        return NOT_FOUND.to_string();
    }
    RULES
        .iter()
        .find_map(|rule| (rule.apply)(text))
        .unwrap_or_else(|| NOT_FOUND.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_english_label() {
        assert_eq!(extract_judgment("judgment: buy"), "buy");
        assert_eq!(extract_judgment("Decision: SELL, because margins shrink"), "SELL");
    }

    #[test]
    fn english_label_needs_a_colon() {
        let text = "The board's decision to raise the dividend was welcomed.\nJudgment: Sell";
        assert_eq!(extract_judgment(text), "Sell");
        let text = "Management took action on costs.\nDecision : Buy";
        assert_eq!(structured_label(text).as_deref(), Some("Buy"));
    }

    #[test]
    fn no_vocabulary_gives_sentinel() {
        assert_eq!(extract_judgment("株価は横ばいで推移しています。\n特記事項なし。"), NOT_FOUND);
        assert_eq!(extract_judgment("The company reported earnings."), NOT_FOUND);
        assert_eq!(extract_judgment(""), NOT_FOUND);
        assert_eq!(extract_judgment("   \n"), NOT_FOUND);
    }

    #[test]
    fn structured_japanese_stops_at_clause_boundary() {
        assert_eq!(structured_label("売買判断: 買い増し（押し目で）").as_deref(), Some("買い増し"));
        assert_eq!(structured_label("売買判断：ホールド。理由は…").as_deref(), Some("ホールド"));
        assert_eq!(structured_label("判断: 買い、業績好調").as_deref(), Some("買い"));
        assert_eq!(structured_label("売買判断: 買いを推奨").as_deref(), Some("買い"));
    }

    #[test]
    fn structured_rejects_long_spans() {
        let text = "売買判断: 現時点では慎重に市場全体の動向を見極めつつ判断したい\n";
        assert_eq!(structured_label(text), None);
    }

    #[test]
    fn structured_strips_markdown() {
        assert_eq!(structured_label("売買判断: **売り**").as_deref(), Some("売り"));
    }

    #[test]
    fn fallback_handles_bold_labels() {
        let text = "## 結論\n**売買判断**: 買い増しを推奨します。";
        assert_eq!(structured_label(text), None);
        assert_eq!(fallback_label(text).as_deref(), Some("買い増し"));
        assert_eq!(extract_judgment(text), "買い増し");
    }

    #[test]
    fn fallback_handles_recommendation_lines() {
        assert_eq!(fallback_label("推奨: 様子見が望ましい状況").as_deref(), Some("様子見"));
        assert_eq!(fallback_label("アクション: 買い戻し(短期)").as_deref(), Some("買い戻し"));
    }

    #[test]
    fn fallback_truncates_to_display_length() {
        let long = format!("推奨: {}", "あ".repeat(50));
        assert_eq!(fallback_label(&long).map(|s| s.chars().count()), Some(30));
    }

    #[test]
    fn keyword_line_accepts_short_bare_labels() {
        let text = "総合的に見て\n- **買い継続（強気）** -\n以上";
        assert_eq!(keyword_line_label(text).as_deref(), Some("買い継続"));
    }

    #[test]
    fn keyword_line_skips_long_prose() {
        let text = "We think it's a buy for long-term investors who can wait for years.";
        assert_eq!(keyword_line_label(text), None);
    }

    #[test]
    fn rules_run_in_priority_order() {
        let names: Vec<_> = RULES.iter().map(|r| r.name).collect();
        assert_eq!(names, ["structured", "fallback", "keyword_line"]);

        // structured wins over the later recommendation line
        let text = "売買判断: 売り\n推奨: 買い増し";
        assert_eq!(extract_judgment(text), "売り");
    }

    #[test]
    fn error_marker_text_degrades_to_sentinel() {
        let text = "## 分析失敗\n\n**エラー内容:** Gemini APIエラー: HTTPステータス 503";
        assert_eq!(extract_judgment(text), NOT_FOUND);
    }
}

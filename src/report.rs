// ===============================
// src/report.rs
// ===============================
//
// HTML rendering for report fragments, the per-category table of
// contents and the final category document. Analysis text is markdown;
// single newlines are kept as line breaks.
//

use chrono::NaiveDate;
use pulldown_cmark::{html, Event as MdEvent, Options, Parser};

use crate::domain::{Category, StockReportInfo};

/// 2500.0 -> "2500", 150.5 -> "150.5", 12.346 -> "12.35"
pub fn format_price(p: f64) -> String {
    if p.fract() == 0.0 {
        return format!("{p:.0}");
    }
    let s = format!("{p:.2}");
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}

/// Rounded amount with thousands separators: 20000.4 -> "20,000".
pub fn format_amount(v: f64) -> String {
    let rounded = v.round() as i64;
    let digits = rounded.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    if rounded < 0 {
        out.insert(0, '-');
    }
    out
}

pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

/// Stable, HTML-safe anchor for a symbol ("7203.T" -> "stock-7203_2e_T").
/// Non-alphanumerics are hex-escaped between underscores, so distinct
/// symbols never share an anchor.
pub fn anchor_id(symbol: &str) -> String {
    let mut slug = String::with_capacity(symbol.len());
    for c in symbol.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
        } else {
            slug.push_str(&format!("_{:x}_", c as u32));
        }
    }
    format!("stock-{slug}")
}

/// Anchor for the `occurrence`-th (1-based) position carrying `symbol`.
pub fn unique_anchor(symbol: &str, occurrence: usize) -> String {
    match occurrence {
        0 | 1 => anchor_id(symbol),
        n => format!("{}-{n}", anchor_id(symbol)),
    }
}

pub fn markdown_to_html(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);

    let parser = Parser::new_ext(markdown, options).map(|ev| match ev {
        MdEvent::SoftBreak => MdEvent::HardBreak,
        other => other,
    });
    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

/// One position's section of the category document.
pub fn render_fragment(info: &StockReportInfo, analysis_markdown: &str, date: NaiveDate) -> String {
    format!(
        "<div class=\"stock-report\" id=\"{anchor}\">\n<h1>{name}（{symbol}）</h1>\n<p style=\"color: #666; font-size: 14px;\">日付: {date}</p>\n{body}</div>\n",
        anchor = escape_html(&info.anchor_id),
        name = escape_html(&info.name),
        symbol = escape_html(&info.symbol),
        date = date.format("%Y-%m-%d"),
        body = markdown_to_html(analysis_markdown),
    )
}

fn judgment_style(judgment: &str) -> &'static str {
    let lower = judgment.to_lowercase();
    if judgment.contains("売り") || lower.contains("sell") {
        "padding: 10px; border: 1px solid #dee2e6; font-weight: bold; color: #dc3545;"
    } else if judgment.contains("ホールド") || lower.contains("hold") {
        "padding: 10px; border: 1px solid #dee2e6; color: #666;"
    } else {
        "padding: 10px; border: 1px solid #dee2e6; font-weight: bold;"
    }
}

/// Table of contents; empty string when there is nothing to list.
pub fn generate_toc(infos: &[StockReportInfo]) -> String {
    if infos.is_empty() {
        return String::new();
    }

    let mut toc = String::from(
        "<div style=\"background-color: #f8f9fa; border: 1px solid #dee2e6; border-radius: 5px; padding: 20px; margin-bottom: 30px;\">\n\
         <h2 style=\"color: #333; margin-top: 0; font-size: 20px;\">📊 銘柄一覧</h2>\n\
         <table style=\"width: 100%; border-collapse: collapse; background-color: white;\">\n\
         <thead><tr style=\"background-color: #007bff; color: white;\">\
         <th style=\"padding: 10px; text-align: left;\">銘柄名</th>\
         <th style=\"padding: 10px; text-align: left;\">銘柄コード</th>\
         <th style=\"padding: 10px; text-align: left;\">売買判断</th></tr></thead>\n<tbody>\n",
    );

    for (i, info) in infos.iter().enumerate() {
        let bg = if i % 2 == 0 { "#f8f9fa" } else { "white" };
        toc.push_str(&format!(
            "<tr style=\"background-color: {bg};\">\
             <td style=\"padding: 10px; border: 1px solid #dee2e6; font-weight: bold;\"><a href=\"#{anchor}\">{name}</a></td>\
             <td style=\"padding: 10px; border: 1px solid #dee2e6; color: #666;\">{symbol}</td>\
             <td style=\"{style}\">{judgment}</td></tr>\n",
            anchor = escape_html(&info.anchor_id),
            name = escape_html(&info.name),
            symbol = escape_html(&info.symbol),
            style = judgment_style(&info.judgment),
            judgment = escape_html(&info.judgment),
        ));
    }

    toc.push_str("</tbody>\n</table>\n</div>\n");
    toc
}

/// Subject line and full HTML body for one category.
pub fn category_document(
    category: Category,
    fragments: &[String],
    infos: &[StockReportInfo],
    date: NaiveDate,
) -> (String, String) {
    let subject = format!("{}レポート ({})", category.title(), date.format("%Y-%m-%d"));
    let body = format!(
        "<html>\n<head><meta charset='utf-8'><title>{title}</title></head>\n\
         <body style=\"font-family: Arial, sans-serif; max-width: 900px; margin: 0 auto; padding: 20px;\">\n\
         {toc}{reports}</body>\n</html>\n",
        title = escape_html(&subject),
        toc = generate_toc(infos),
        reports = fragments.concat(),
    );
    (subject, body)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(symbol: &str, name: &str, judgment: &str) -> StockReportInfo {
        StockReportInfo {
            symbol: symbol.into(),
            name: name.into(),
            judgment: judgment.into(),
            anchor_id: anchor_id(symbol),
        }
    }

    #[test]
    fn price_and_amount_formatting() {
        assert_eq!(format_price(2500.0), "2500");
        assert_eq!(format_price(150.5), "150.5");
        assert_eq!(format_price(12.346), "12.35");
        assert_eq!(format_amount(20_000.0), "20,000");
        assert_eq!(format_amount(-1_234_567.4), "-1,234,567");
        assert_eq!(format_amount(999.0), "999");
    }

    #[test]
    fn anchors_are_html_safe() {
        assert_eq!(anchor_id("7203.T"), "stock-7203_2e_T");
        assert_eq!(anchor_id("AAPL"), "stock-AAPL");
    }

    #[test]
    fn similar_symbols_keep_distinct_anchors() {
        assert_ne!(anchor_id("BRK.B"), anchor_id("BRK-B"));
        assert_ne!(anchor_id("BRK.B"), anchor_id("BRK_B"));
        assert_eq!(unique_anchor("BRK.B", 1), anchor_id("BRK.B"));
        assert_eq!(unique_anchor("BRK.B", 2), "stock-BRK_2e_B-2");
        assert_ne!(unique_anchor("BRK", 2), anchor_id("BRK-2"));
    }

    #[test]
    fn markdown_keeps_line_breaks() {
        let html = markdown_to_html("## 売買判断: 買い\n\n一行目\n二行目");
        assert!(html.contains("<h2>売買判断: 買い</h2>"));
        assert!(html.contains("一行目<br />"));
    }

    #[test]
    fn toc_escapes_and_styles() {
        let toc = generate_toc(&[
            info("7203.T", "<トヨタ>", "売り"),
            info("AAPL", "Apple", "ホールド"),
            info("MSFT", "Microsoft", "買い"),
        ]);
        assert!(toc.contains("&lt;トヨタ&gt;"));
        assert!(toc.contains("href=\"#stock-7203_2e_T\""));
        assert!(toc.contains("color: #dc3545;\">売り"));
        assert!(toc.contains("color: #666;\">ホールド"));
        assert!(toc.contains("font-weight: bold;\">買い"));
        assert_eq!(generate_toc(&[]), "");
    }

    #[test]
    fn fragment_and_document() {
        let date = NaiveDate::from_ymd_opt(2025, 1, 6).unwrap();
        let i = info("7203.T", "トヨタ自動車", "買い");
        let fragment = render_fragment(&i, "**強気**", date);
        assert!(fragment.contains("id=\"stock-7203_2e_T\""));
        assert!(fragment.contains("トヨタ自動車（7203.T）"));
        assert!(fragment.contains("<strong>強気</strong>"));

        let (subject, body) = category_document(Category::Holding, &[fragment.clone()], &[i], date);
        assert_eq!(subject, "保有銘柄レポート (2025-01-06)");
        assert!(body.contains("銘柄一覧"));
        assert!(body.contains(&fragment));
    }
}

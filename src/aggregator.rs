// ===============================
// src/aggregator.rs
// ===============================
//
// Collects per-position results by category and hands each non-empty
// category to the report sink as one document.
//
// Only the dispatcher's collecting loop pushes here, so no locking is
// needed. Within a category, entries keep completion order, and the
// fragment list and TOC list stay index-aligned.
//

use chrono::NaiveDate;
use tracing::{info, warn};

use crate::domain::{ByCategory, Category, Event, StockReportInfo};
use crate::metrics::REPORTS_DELIVERED;
use crate::report::category_document;
use crate::sink::ReportSink;

/// Output of one successful dispatcher task.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskOutput {
    pub category: Category,
    pub fragment: String,
    pub info: StockReportInfo,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategoryReports {
    fragments: ByCategory<Vec<String>>,
    infos: ByCategory<Vec<StockReportInfo>>,
}

impl CategoryReports {
    pub fn push(&mut self, out: TaskOutput) {
        self.fragments.get_mut(out.category).push(out.fragment);
        self.infos.get_mut(out.category).push(out.info);
    }

    pub fn fragments(&self, category: Category) -> &[String] {
        self.fragments.get(category)
    }

    pub fn infos(&self, category: Category) -> &[StockReportInfo] {
        self.infos.get(category)
    }

    pub fn len(&self) -> usize {
        self.fragments.iter().map(|(_, v)| v.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Categories that have at least one fragment, in fixed category order.
    pub fn non_empty(&self) -> impl Iterator<Item = Category> + '_ {
        Category::ALL
            .into_iter()
            .filter(move |c| !self.fragments.get(*c).is_empty())
    }
}

/// Deliver one document per non-empty category. Delivery failures are
/// logged and do not stop the other categories. Returns documents delivered.
pub async fn deliver_all(
    reports: &CategoryReports,
    sink: &dyn ReportSink,
    date: NaiveDate,
    events: Option<&tokio::sync::mpsc::Sender<Event>>,
) -> usize {
    let mut delivered = 0;
    for category in reports.non_empty() {
        let (subject, body) =
            category_document(category, reports.fragments(category), reports.infos(category), date);
        match sink.deliver(category, &subject, &body).await {
            Ok(()) => {
                delivered += 1;
                REPORTS_DELIVERED.with_label_values(&[category.as_str()]).inc();
                let count = reports.fragments(category).len();
                info!(category = category.as_str(), reports = count, "category report delivered");
                if let Some(tx) = events {
                    let _ = tx.try_send(Event::Delivered { category, reports: count });
                }
            }
            Err(e) => {
                warn!(category = category.as_str(), error = %e, "category report delivery failed");
            }
        }
    }
    delivered
}

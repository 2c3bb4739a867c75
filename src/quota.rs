// ===============================
// src/quota.rs
// ===============================
//
// Daily quota rotation for a backend with a hard per-day call ceiling.
//
// With N positions and a limit L < N, day d analyzes the L positions
// starting at (d * L) mod N, wrapping around the list. Consecutive days
// therefore walk the portfolio in contiguous blocks of L, so every
// position is covered within ceil(N / L) days. Selection depends only on
// the date and portfolio order; nothing is persisted between runs.
//

use chrono::{Datelike, NaiveDate};

/// Start index of the day's window.
pub fn rotation_offset(day_of_year: u32, total: usize, limit: usize) -> usize {
    if total == 0 {
        return 0;
    }
    (day_of_year as usize % total) * (limit % total) % total
}

/// Whether a quota must be applied at all.
pub fn quota_applies(total: usize, daily_limit: usize, rate_limited_backend: bool) -> bool {
    rate_limited_backend && daily_limit < total
}

/// The circular window of `limit` items for `day_of_year`.
pub fn select_for_day<T: Clone>(items: &[T], limit: usize, day_of_year: u32) -> Vec<T> {
    let n = items.len();
    if limit >= n {
        return items.to_vec();
    }
    let offset = rotation_offset(day_of_year, n, limit);
    (0..limit).map(|i| items[(offset + i) % n].clone()).collect()
}

pub fn select_for_date<T: Clone>(items: &[T], limit: usize, date: NaiveDate) -> Vec<T> {
    select_for_day(items, limit, date.ordinal())
}

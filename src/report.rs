//! Chart data for the dashboard, derived from the already-loaded ticket
//! list. Everything here is a pure function; no store access.

use std::collections::HashMap;

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use crate::models::TicketRow;

/// One calendar month of intake vs completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MonthlyTrend {
    pub year: i32,
    pub month: u32,
    /// Tickets created within the month.
    pub submitted: usize,
    /// Tickets created within the month that are resolved or rejected.
    pub completed: usize,
}

impl MonthlyTrend {
    pub fn label(&self) -> String {
        const NAMES: [&str; 12] = [
            "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
        ];
        format!("{} {}", NAMES[(self.month - 1) as usize], self.year)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeatureCount {
    pub name: String,
    pub count: usize,
}

/// Always exactly three entries, oldest month first, ending with the month
/// containing `today`. Months with no tickets still appear with zeros.
pub fn monthly_trend(tickets: &[TicketRow], today: NaiveDate) -> Vec<MonthlyTrend> {
    (0..3)
        .rev()
        .map(|back| {
            let (year, month) = month_minus(today, back);
            let mut submitted = 0;
            let mut completed = 0;
            for row in tickets {
                let created = row.ticket.created_at.date_naive();
                if created.year() == year && created.month() == month {
                    submitted += 1;
                    if row.ticket.status.is_completed() {
                        completed += 1;
                    }
                }
            }
            MonthlyTrend {
                year,
                month,
                submitted,
                completed,
            }
        })
        .collect()
}

/// Tickets grouped by effective feature name (joined feature name, then the
/// free-text other-feature, then "Others"), descending by count, top four.
/// Ties break alphabetically so the output is deterministic.
pub fn feature_distribution(tickets: &[TicketRow]) -> Vec<FeatureCount> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for row in tickets {
        let name = row
            .feature_name
            .as_deref()
            .or(row.ticket.feature_other.as_deref())
            .unwrap_or("Others");
        *counts.entry(name).or_insert(0) += 1;
    }

    let mut distribution: Vec<FeatureCount> = counts
        .into_iter()
        .map(|(name, count)| FeatureCount {
            name: name.to_string(),
            count,
        })
        .collect();
    distribution.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
    distribution.truncate(4);
    distribution
}

/// The calendar month `back` months before the one containing `date`.
fn month_minus(date: NaiveDate, back: u32) -> (i32, u32) {
    let total = date.year() * 12 + date.month0() as i32 - back as i32;
    (total.div_euclid(12), total.rem_euclid(12) as u32 + 1)
}

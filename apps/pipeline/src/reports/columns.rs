//! Header ordering for the grouped-by-project sheet.
//!
//! The sheet mixes fixed columns with dynamic per-period columns named
//! `"{MM-DD-yyyy} {metric}"`. Ordering is deterministic: fixed columns first
//! in a fixed priority order, then date-bearing columns grouped by metric (in
//! metric priority order) and sorted chronologically within each metric.

use std::cmp::Ordering;

use chrono::NaiveDate;

/// Fixed (non-date) columns, in output order.
pub const FIXED_COLUMNS: [&str; 4] = [
    "Project ID",
    "Project Description",
    "Project Expenditure Category Group",
    "Project Expenditure Category",
];

/// Per-period metrics, in output priority order.
pub const METRICS: [&str; 4] = [
    "Total Aggregate Obligations",
    "Total Aggregate Expenditures",
    "Total Obligations for Awards Greater or Equal to $50,000",
    "Total Expenditures for Awards Greater or Equal to $50,000",
];

const DATE_FORMAT: &str = "%m-%d-%Y";

/// A column header, decomposed for sorting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnKey {
    NonDate(String),
    Date { metric: String, date: NaiveDate },
}

impl ColumnKey {
    pub fn date(metric: &str, date: NaiveDate) -> Self {
        ColumnKey::Date {
            metric: metric.to_string(),
            date,
        }
    }

    /// Rendered header, e.g. `06-30-2022 Total Aggregate Obligations`.
    pub fn header(&self) -> String {
        match self {
            ColumnKey::NonDate(name) => name.clone(),
            ColumnKey::Date { metric, date } => {
                format!("{} {}", date.format(DATE_FORMAT), metric)
            }
        }
    }
}

fn fixed_rank(name: &str) -> usize {
    FIXED_COLUMNS
        .iter()
        .position(|c| *c == name)
        .unwrap_or(FIXED_COLUMNS.len())
}

fn metric_rank(metric: &str) -> usize {
    METRICS.iter().position(|m| *m == metric).unwrap_or(METRICS.len())
}

fn compare(a: &ColumnKey, b: &ColumnKey) -> Ordering {
    match (a, b) {
        (ColumnKey::NonDate(x), ColumnKey::NonDate(y)) => {
            fixed_rank(x).cmp(&fixed_rank(y)).then_with(|| x.cmp(y))
        }
        (ColumnKey::NonDate(_), ColumnKey::Date { .. }) => Ordering::Less,
        (ColumnKey::Date { .. }, ColumnKey::NonDate(_)) => Ordering::Greater,
        (
            ColumnKey::Date { metric: ma, date: da },
            ColumnKey::Date { metric: mb, date: db },
        ) => metric_rank(ma)
            .cmp(&metric_rank(mb))
            .then_with(|| ma.cmp(mb))
            .then_with(|| da.cmp(db)),
    }
}

/// Sorts column keys into their final header order.
pub fn order_headers(mut keys: Vec<ColumnKey>) -> Vec<String> {
    keys.sort_by(compare);
    keys.into_iter().map(|k| k.header()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_fixed_columns_come_first_in_priority_order() {
        let headers = order_headers(vec![
            ColumnKey::date(METRICS[0], d(2022, 6, 30)),
            ColumnKey::NonDate("Project Expenditure Category".to_string()),
            ColumnKey::NonDate("Project ID".to_string()),
        ]);
        assert_eq!(
            headers,
            vec![
                "Project ID",
                "Project Expenditure Category",
                "06-30-2022 Total Aggregate Obligations",
            ]
        );
    }

    #[test]
    fn test_date_columns_group_by_metric_then_chronological() {
        let headers = order_headers(vec![
            ColumnKey::date(METRICS[1], d(2022, 6, 30)),
            ColumnKey::date(METRICS[0], d(2022, 9, 30)),
            ColumnKey::date(METRICS[0], d(2022, 6, 30)),
            ColumnKey::date(METRICS[1], d(2022, 3, 31)),
        ]);
        assert_eq!(
            headers,
            vec![
                "06-30-2022 Total Aggregate Obligations",
                "09-30-2022 Total Aggregate Obligations",
                "03-31-2022 Total Aggregate Expenditures",
                "06-30-2022 Total Aggregate Expenditures",
            ]
        );
    }

    #[test]
    fn test_header_renders_mm_dd_yyyy() {
        let key = ColumnKey::date("Total Aggregate Obligations", d(2023, 1, 5));
        assert_eq!(key.header(), "01-05-2023 Total Aggregate Obligations");
    }
}

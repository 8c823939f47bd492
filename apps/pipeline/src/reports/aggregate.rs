//! Report aggregators: pure folds from normalized records into flat row sets.
//! Deterministic by construction; row order follows input order and nothing
//! here re-sorts beyond the documented header ordering of the v2 sheet.

use std::collections::HashMap;

use chrono::NaiveDate;

use crate::models::reporting::{RecordType, ReportRecord, ReportingPeriod, Upload};
use crate::reports::columns::{ColumnKey, FIXED_COLUMNS, METRICS};
use crate::reports::{CellValue, ReportRow};

// Obligation-sheet column names. EC tabs roll into the first two buckets;
// the three subaward/expenditure tabs each get their own column.
const COL_EC_BUDGET: &str = "Adopted Budget (EC tabs)";
const COL_EC_OBLIGATIONS: &str = "Total Obligations (EC tabs)";
const COL_AWARDS_50K: &str = "Obligations (Awards > $50,000)";
const COL_EXPENDITURES_50K: &str = "Expenditures (Expenditures > $50,000)";
const COL_AGGREGATE_AWARDS: &str = "Obligations (Aggregate Awards < $50,000)";

fn upload_link(base: &str, upload_id: uuid::Uuid) -> String {
    format!("{base}/uploads/{upload_id}")
}

fn sum_records<'a>(
    records: impl Iterator<Item = &'a ReportRecord>,
    field: impl Fn(&ReportRecord) -> Option<f64>,
) -> f64 {
    records.filter_map(|r| field(r)).sum()
}

/// One row per (reporting period × final-treasury upload), summing the five
/// obligation/expenditure columns across that upload's records.
pub fn build_obligation_rows(
    periods: &[ReportingPeriod],
    uploads: &[Upload],
    records: &[ReportRecord],
    link_base: &str,
) -> Vec<ReportRow> {
    let mut rows = Vec::new();
    for period in periods {
        for upload in uploads.iter().filter(|u| u.reporting_period_id == period.id) {
            let for_upload = |t: fn(&RecordType) -> bool| {
                records
                    .iter()
                    .filter(move |r| r.upload_id == upload.id && t(&r.record_type))
            };

            let mut row = ReportRow::new();
            row.push("Reporting Period", CellValue::Text(period.name.clone()));
            row.push("Period End Date", CellValue::Date(period.end_date));
            row.push(
                "Upload",
                CellValue::Text(upload_link(link_base, upload.id)),
            );
            row.push(
                COL_EC_BUDGET,
                CellValue::Number(sum_records(for_upload(RecordType::is_ec_tab), |r| {
                    r.adopted_budget
                })),
            );
            row.push(
                COL_EC_OBLIGATIONS,
                CellValue::Number(sum_records(for_upload(RecordType::is_ec_tab), |r| {
                    r.total_obligations
                })),
            );
            row.push(
                COL_AWARDS_50K,
                CellValue::Number(sum_records(
                    for_upload(|t| *t == RecordType::Awards50k),
                    |r| r.award_amount,
                )),
            );
            row.push(
                COL_EXPENDITURES_50K,
                CellValue::Number(sum_records(
                    for_upload(|t| *t == RecordType::Expenditures50k),
                    |r| r.expenditure_amount,
                )),
            );
            row.push(
                COL_AGGREGATE_AWARDS,
                CellValue::Number(sum_records(
                    for_upload(|t| *t == RecordType::Awards),
                    |r| r.obligation_amount,
                )),
            );
            rows.push(row);
        }
    }
    rows
}

/// Groups records by project id, preserving first-seen project order.
fn group_by_project(records: &[ReportRecord]) -> Vec<(String, Vec<&ReportRecord>)> {
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<&ReportRecord>> = HashMap::new();
    for record in records {
        let Some(project_id) = record.project_id.as_ref() else {
            continue;
        };
        if !groups.contains_key(project_id) {
            order.push(project_id.clone());
        }
        groups.entry(project_id.clone()).or_default().push(record);
    }
    order
        .into_iter()
        .map(|id| {
            let records = groups.remove(&id).unwrap_or_default();
            (id, records)
        })
        .collect()
}

fn period_lookup(periods: &[ReportingPeriod]) -> HashMap<i64, &ReportingPeriod> {
    periods.iter().map(|p| (p.id, p)).collect()
}

/// One row per most-recent EC record per project, carrying forward totals and
/// completion status, with a link back to the source upload.
pub fn build_project_summary_rows(
    records: &[ReportRecord],
    periods: &[ReportingPeriod],
    link_base: &str,
) -> Vec<ReportRow> {
    let periods = period_lookup(periods);
    let ec_records: Vec<ReportRecord> = records
        .iter()
        .filter(|r| r.record_type.is_ec_tab())
        .cloned()
        .collect();

    let mut rows = Vec::new();
    for (project_id, project_records) in group_by_project(&ec_records) {
        let Some(latest) = project_records
            .iter()
            .max_by_key(|r| r.created_at)
        else {
            continue;
        };

        let mut row = ReportRow::new();
        row.push("Project ID", CellValue::Text(project_id));
        row.push(
            "Upload",
            CellValue::Text(upload_link(link_base, latest.upload_id)),
        );
        row.push(
            "Last Reported",
            CellValue::Text(
                periods
                    .get(&latest.reporting_period_id)
                    .map(|p| p.name.clone())
                    .unwrap_or_default(),
            ),
        );
        row.push(
            "Adopted Budget",
            CellValue::Number(latest.adopted_budget.unwrap_or(0.0)),
        );
        row.push(
            "Total Cumulative Obligations",
            CellValue::Number(latest.total_obligations.unwrap_or(0.0)),
        );
        row.push(
            "Total Cumulative Expenditures",
            CellValue::Number(latest.total_expenditures.unwrap_or(0.0)),
        );
        row.push(
            "Current Period Obligations",
            CellValue::Number(latest.current_period_obligations.unwrap_or(0.0)),
        );
        row.push(
            "Current Period Expenditures",
            CellValue::Number(latest.current_period_expenditures.unwrap_or(0.0)),
        );
        row.push(
            "Completion Status",
            CellValue::Text(latest.completion_status.clone().unwrap_or_default()),
        );
        rows.push(row);
    }
    rows
}

/// One row per project across all of its historical records, with four
/// per-period metrics as dynamic columns. Returns the rows together with the
/// explicit header order the workbook must honor.
pub fn build_project_rows_v2(
    records: &[ReportRecord],
    periods: &[ReportingPeriod],
) -> (Vec<ReportRow>, Vec<String>) {
    let periods = period_lookup(periods);
    let mut date_keys: Vec<(String, NaiveDate)> = Vec::new();
    let mut rows = Vec::new();

    for (project_id, project_records) in group_by_project(records) {
        // Descriptive fields come from the newest EC record for the project.
        let latest_ec = project_records
            .iter()
            .filter(|r| r.record_type.is_ec_tab())
            .max_by_key(|r| r.created_at);

        let mut row = ReportRow::new();
        row.push(FIXED_COLUMNS[0], CellValue::Text(project_id));
        row.push(
            FIXED_COLUMNS[1],
            CellValue::Text(
                latest_ec
                    .and_then(|r| r.project_description.clone())
                    .unwrap_or_default(),
            ),
        );
        row.push(
            FIXED_COLUMNS[2],
            CellValue::Text(
                latest_ec
                    .and_then(|r| r.category_group.clone())
                    .unwrap_or_default(),
            ),
        );
        row.push(
            FIXED_COLUMNS[3],
            CellValue::Text(
                latest_ec
                    .and_then(|r| r.category.clone())
                    .unwrap_or_default(),
            ),
        );

        // Periods this project touched, in period id order for determinism.
        let mut period_ids: Vec<i64> = project_records
            .iter()
            .map(|r| r.reporting_period_id)
            .collect();
        period_ids.sort_unstable();
        period_ids.dedup();

        for period_id in period_ids {
            let Some(period) = periods.get(&period_id) else {
                continue;
            };
            let in_period = |t: fn(&RecordType) -> bool| {
                project_records
                    .iter()
                    .copied()
                    .filter(move |r| r.reporting_period_id == period_id && t(&r.record_type))
            };
            let metrics = [
                (
                    METRICS[0],
                    sum_records(in_period(RecordType::is_ec_tab), |r| r.total_obligations),
                ),
                (
                    METRICS[1],
                    sum_records(in_period(RecordType::is_ec_tab), |r| r.total_expenditures),
                ),
                (
                    METRICS[2],
                    sum_records(in_period(|t| *t == RecordType::Awards50k), |r| {
                        r.award_amount
                    }),
                ),
                (
                    METRICS[3],
                    sum_records(in_period(|t| *t == RecordType::Expenditures50k), |r| {
                        r.expenditure_amount
                    }),
                ),
            ];
            for (metric, value) in metrics {
                let key = ColumnKey::date(metric, period.end_date);
                row.push(key.header(), CellValue::Number(value));
                let pair = (metric.to_string(), period.end_date);
                if !date_keys.contains(&pair) {
                    date_keys.push(pair);
                }
            }
        }
        rows.push(row);
    }

    let mut keys: Vec<ColumnKey> = FIXED_COLUMNS
        .iter()
        .map(|c| ColumnKey::NonDate(c.to_string()))
        .collect();
    keys.extend(
        date_keys
            .into_iter()
            .map(|(metric, date)| ColumnKey::Date { metric, date }),
    );
    (rows, crate::reports::columns::order_headers(keys))
}

/// One KPI row per project: subaward count, count of records with positive
/// current-period expenditure, and the evidence-based spend total.
pub fn build_kpi_rows(records: &[ReportRecord]) -> Vec<ReportRow> {
    let mut rows = Vec::new();
    for (project_id, project_records) in group_by_project(records) {
        let subawards = project_records
            .iter()
            .filter(|r| r.record_type == RecordType::Awards50k)
            .count();
        let expenditures = project_records
            .iter()
            .filter(|r| r.current_period_expenditures.is_some_and(|v| v > 0.0))
            .count();
        let evidence_spend: f64 = project_records
            .iter()
            .filter_map(|r| r.evidence_based_spend)
            .sum();

        let mut row = ReportRow::new();
        row.push("Project ID", CellValue::Text(project_id));
        row.push("Number of Subawards", CellValue::Number(subawards as f64));
        row.push(
            "Number of Expenditures",
            CellValue::Number(expenditures as f64),
        );
        row.push(
            "Evidence-Based Total Spend",
            CellValue::Number(evidence_spend),
        );
        rows.push(row);
    }
    rows
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    use super::*;

    fn period(id: i64, name: &str, end: (i32, u32, u32)) -> ReportingPeriod {
        ReportingPeriod {
            id,
            name: name.to_string(),
            end_date: NaiveDate::from_ymd_opt(end.0, end.1, end.2).unwrap(),
        }
    }

    fn upload(id: Uuid, period_id: i64) -> Upload {
        Upload {
            id,
            reporting_period_id: period_id,
            agency_code: Some("001".to_string()),
            ec_code: Some("EC1".to_string()),
            filename: "upload.xlsm".to_string(),
            created_at: Utc.with_ymd_and_hms(2022, 7, 1, 0, 0, 0).unwrap(),
        }
    }

    fn record(upload_id: Uuid, period_id: i64, record_type: RecordType) -> ReportRecord {
        ReportRecord {
            upload_id,
            reporting_period_id: period_id,
            record_type,
            project_id: Some("PIN-1".to_string()),
            project_description: None,
            category_group: None,
            category: None,
            adopted_budget: None,
            total_obligations: None,
            total_expenditures: None,
            current_period_obligations: None,
            current_period_expenditures: None,
            award_amount: None,
            expenditure_amount: None,
            obligation_amount: None,
            evidence_based_spend: None,
            completion_status: None,
            created_at: Utc.with_ymd_and_hms(2022, 7, 1, 0, 0, 0).unwrap(),
        }
    }

    fn number(row: &ReportRow, header: &str) -> f64 {
        match row.get(header) {
            Some(CellValue::Number(n)) => *n,
            other => panic!("expected number for {header}, got {other:?}"),
        }
    }

    #[test]
    fn test_obligation_rows_bucket_by_record_type() {
        let p = period(1, "Quarter 2 2022", (2022, 6, 30));
        let ec_upload = Uuid::new_v4();
        let awards_upload = Uuid::new_v4();

        let records = vec![
            ReportRecord {
                adopted_budget: Some(60.0),
                total_obligations: Some(50.0),
                ..record(ec_upload, 1, RecordType::Ec1)
            },
            ReportRecord {
                adopted_budget: Some(40.0),
                ..record(ec_upload, 1, RecordType::Ec2)
            },
            ReportRecord {
                award_amount: Some(30.0),
                ..record(awards_upload, 1, RecordType::Awards50k)
            },
        ];

        let rows = build_obligation_rows(
            &[p],
            &[upload(ec_upload, 1), upload(awards_upload, 1)],
            &records,
            "https://grants.example.org",
        );

        // Two uploads in one period: two distinct rows, each with only its
        // own bucket populated and the other buckets at 0.
        assert_eq!(rows.len(), 2);
        assert_eq!(number(&rows[0], COL_EC_BUDGET), 100.0);
        assert_eq!(number(&rows[0], COL_EC_OBLIGATIONS), 50.0);
        assert_eq!(number(&rows[0], COL_AWARDS_50K), 0.0);
        assert_eq!(number(&rows[0], COL_EXPENDITURES_50K), 0.0);
        assert_eq!(number(&rows[0], COL_AGGREGATE_AWARDS), 0.0);

        assert_eq!(number(&rows[1], COL_EC_BUDGET), 0.0);
        assert_eq!(number(&rows[1], COL_EC_OBLIGATIONS), 0.0);
        assert_eq!(number(&rows[1], COL_AWARDS_50K), 30.0);
    }

    #[test]
    fn test_project_summary_uses_most_recent_record() {
        let p1 = period(1, "Quarter 1 2022", (2022, 3, 31));
        let p2 = period(2, "Quarter 2 2022", (2022, 6, 30));
        let u1 = Uuid::new_v4();
        let u2 = Uuid::new_v4();

        let records = vec![
            ReportRecord {
                total_obligations: Some(10.0),
                created_at: Utc.with_ymd_and_hms(2022, 4, 1, 0, 0, 0).unwrap(),
                ..record(u1, 1, RecordType::Ec1)
            },
            ReportRecord {
                total_obligations: Some(25.0),
                completion_status: Some("Completed".to_string()),
                created_at: Utc.with_ymd_and_hms(2022, 7, 1, 0, 0, 0).unwrap(),
                ..record(u2, 2, RecordType::Ec1)
            },
        ];

        let rows = build_project_summary_rows(&records, &[p1, p2], "https://grants.example.org");
        assert_eq!(rows.len(), 1);
        assert_eq!(number(&rows[0], "Total Cumulative Obligations"), 25.0);
        assert_eq!(
            rows[0].get("Last Reported"),
            Some(&CellValue::Text("Quarter 2 2022".to_string()))
        );
        assert_eq!(
            rows[0].get("Upload"),
            Some(&CellValue::Text(format!(
                "https://grants.example.org/uploads/{u2}"
            )))
        );
        assert_eq!(
            rows[0].get("Completion Status"),
            Some(&CellValue::Text("Completed".to_string()))
        );
    }

    #[test]
    fn test_v2_rows_have_per_period_columns_and_ordered_headers() {
        let p1 = period(1, "Quarter 1 2022", (2022, 3, 31));
        let p2 = period(2, "Quarter 2 2022", (2022, 6, 30));
        let u1 = Uuid::new_v4();
        let u2 = Uuid::new_v4();

        let records = vec![
            ReportRecord {
                total_obligations: Some(100.0),
                ..record(u1, 1, RecordType::Ec1)
            },
            ReportRecord {
                total_obligations: Some(150.0),
                award_amount: None,
                ..record(u2, 2, RecordType::Ec1)
            },
            ReportRecord {
                award_amount: Some(75.0),
                ..record(u2, 2, RecordType::Awards50k)
            },
        ];

        let (rows, headers) = build_project_rows_v2(&records, &[p1, p2]);
        assert_eq!(rows.len(), 1);

        // Fixed columns first, then metric-grouped chronological date columns.
        assert_eq!(&headers[..4], &FIXED_COLUMNS);
        let obligations_cols: Vec<&String> = headers
            .iter()
            .filter(|h| h.ends_with(METRICS[0]))
            .collect();
        assert_eq!(
            obligations_cols,
            vec![
                &format!("03-31-2022 {}", METRICS[0]),
                &format!("06-30-2022 {}", METRICS[0]),
            ]
        );

        assert_eq!(number(&rows[0], &format!("03-31-2022 {}", METRICS[0])), 100.0);
        assert_eq!(number(&rows[0], &format!("06-30-2022 {}", METRICS[0])), 150.0);
        assert_eq!(number(&rows[0], &format!("06-30-2022 {}", METRICS[2])), 75.0);
    }

    #[test]
    fn test_kpi_rows_count_and_sum() {
        let u = Uuid::new_v4();
        let records = vec![
            ReportRecord {
                evidence_based_spend: Some(500.0),
                current_period_expenditures: Some(10.0),
                ..record(u, 1, RecordType::Ec1)
            },
            record(u, 1, RecordType::Awards50k),
            record(u, 1, RecordType::Awards50k),
            ReportRecord {
                current_period_expenditures: Some(0.0),
                evidence_based_spend: Some(250.0),
                ..record(u, 1, RecordType::Ec2)
            },
        ];

        let rows = build_kpi_rows(&records);
        assert_eq!(rows.len(), 1);
        assert_eq!(number(&rows[0], "Number of Subawards"), 2.0);
        // Only strictly positive current-period expenditure counts.
        assert_eq!(number(&rows[0], "Number of Expenditures"), 1.0);
        assert_eq!(number(&rows[0], "Evidence-Based Total Spend"), 750.0);
    }

    #[test]
    fn test_records_without_project_id_are_skipped() {
        let u = Uuid::new_v4();
        let mut anonymous = record(u, 1, RecordType::Ec1);
        anonymous.project_id = None;

        assert!(build_kpi_rows(&[anonymous.clone()]).is_empty());
        assert!(build_project_summary_rows(&[anonymous], &[], "base").is_empty());
    }
}

//! Report generation: aggregate normalized records into row sets, assemble a
//! multi-sheet workbook, upload it, notify the requester.

pub mod aggregate;
pub mod columns;
pub mod delivery;
pub mod workbook;

use chrono::NaiveDate;

use crate::store::ReportingStore;

/// A single worksheet cell. Numbers and dates keep their types all the way
/// into the workbook.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Text(String),
    Number(f64),
    Date(NaiveDate),
}

/// One flat report row: ordered (header, value) pairs. Ephemeral, rebuilt on
/// every report request.
#[derive(Debug, Clone, Default)]
pub struct ReportRow {
    cells: Vec<(String, CellValue)>,
}

impl ReportRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, header: impl Into<String>, value: CellValue) {
        self.cells.push((header.into(), value));
    }

    pub fn get(&self, header: &str) -> Option<&CellValue> {
        self.cells
            .iter()
            .find(|(h, _)| h == header)
            .map(|(_, v)| v)
    }

    pub fn headers(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(h, _)| h.as_str())
    }
}

/// A named row set destined for one worksheet. When `header_order` is absent
/// the assembler falls back to first-seen key order across the rows.
#[derive(Debug, Clone)]
pub struct Sheet {
    pub name: String,
    pub rows: Vec<ReportRow>,
    pub header_order: Option<Vec<String>>,
}

/// Builds the complete audit-report workbook for a tenant.
pub async fn build_audit_report(
    store: &dyn ReportingStore,
    tenant_id: i64,
    upload_link_base: &str,
) -> Result<Vec<u8>, delivery::DeliveryError> {
    let periods = store.reporting_periods(tenant_id).await?;
    let uploads = store.final_treasury_uploads(tenant_id).await?;
    let upload_ids: Vec<_> = uploads.iter().map(|u| u.id).collect();
    let treasury_records = store.records_for_uploads(&upload_ids).await?;
    let all_records = store.records_for_tenant(tenant_id).await?;

    let (v2_rows, v2_headers) = aggregate::build_project_rows_v2(&all_records, &periods);

    let sheets = vec![
        Sheet {
            name: "Obligations & Expenditures".to_string(),
            rows: aggregate::build_obligation_rows(
                &periods,
                &uploads,
                &treasury_records,
                upload_link_base,
            ),
            header_order: None,
        },
        Sheet {
            name: "Project Summaries".to_string(),
            rows: aggregate::build_project_summary_rows(
                &all_records,
                &periods,
                upload_link_base,
            ),
            header_order: None,
        },
        Sheet {
            name: "Project Summaries V2".to_string(),
            rows: v2_rows,
            header_order: Some(v2_headers),
        },
        Sheet {
            name: "KPI".to_string(),
            rows: aggregate::build_kpi_rows(&all_records),
            header_order: None,
        },
    ];

    workbook::assemble(&sheets)
        .map_err(|e| delivery::DeliveryError::Workbook(e.to_string()))
}

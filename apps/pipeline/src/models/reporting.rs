use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Expenditure-category tab a record was reported under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordType {
    Ec1,
    Ec2,
    Ec3,
    Ec4,
    Ec5,
    Ec6,
    Ec7,
    Awards50k,
    Expenditures50k,
    Awards,
}

impl RecordType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ec1" => Some(RecordType::Ec1),
            "ec2" => Some(RecordType::Ec2),
            "ec3" => Some(RecordType::Ec3),
            "ec4" => Some(RecordType::Ec4),
            "ec5" => Some(RecordType::Ec5),
            "ec6" => Some(RecordType::Ec6),
            "ec7" => Some(RecordType::Ec7),
            "awards50k" => Some(RecordType::Awards50k),
            "expenditures50k" => Some(RecordType::Expenditures50k),
            "awards" => Some(RecordType::Awards),
            _ => None,
        }
    }

    /// True for the seven project-level EC tabs (as opposed to the
    /// subaward/expenditure/aggregate-award tabs).
    pub fn is_ec_tab(&self) -> bool {
        matches!(
            self,
            RecordType::Ec1
                | RecordType::Ec2
                | RecordType::Ec3
                | RecordType::Ec4
                | RecordType::Ec5
                | RecordType::Ec6
                | RecordType::Ec7
        )
    }
}

/// A tenant-scoped reporting window.
#[derive(Debug, Clone, FromRow)]
pub struct ReportingPeriod {
    pub id: i64,
    pub name: String,
    pub end_date: NaiveDate,
}

/// A workbook upload as seen by the report pipeline (read-only here).
#[derive(Debug, Clone, FromRow)]
pub struct Upload {
    pub id: Uuid,
    pub reporting_period_id: i64,
    pub agency_code: Option<String>,
    pub ec_code: Option<String>,
    pub filename: String,
    pub created_at: DateTime<Utc>,
}

/// One reported record, flattened out of an upload. Money fields are optional
/// because each tab only populates its own columns.
#[derive(Debug, Clone)]
pub struct ReportRecord {
    pub upload_id: Uuid,
    pub reporting_period_id: i64,
    pub record_type: RecordType,
    pub project_id: Option<String>,
    pub project_description: Option<String>,
    pub category_group: Option<String>,
    pub category: Option<String>,
    pub adopted_budget: Option<f64>,
    pub total_obligations: Option<f64>,
    pub total_expenditures: Option<f64>,
    pub current_period_obligations: Option<f64>,
    pub current_period_expenditures: Option<f64>,
    pub award_amount: Option<f64>,
    pub expenditure_amount: Option<f64>,
    pub obligation_amount: Option<f64>,
    pub evidence_based_spend: Option<f64>,
    pub completion_status: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// An upload annotated for the full-file archive exporter.
#[derive(Debug, Clone, FromRow)]
pub struct ExportUpload {
    pub upload_id: Uuid,
    pub filename: String,
    pub agency_name: Option<String>,
    pub ec_code: Option<String>,
    pub reporting_period_name: String,
    pub validated: bool,
    pub invalidated: bool,
    /// Most-recently-created validated upload for its
    /// (reporting period, agency, ec_code) triple.
    pub is_final_treasury: bool,
}

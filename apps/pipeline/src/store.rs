//! Store traits and their Postgres implementations.
//!
//! Every collaborator that touches the database sits behind a trait so the
//! pipeline can run against in-memory fakes in tests. The sqlx queries live
//! here and nowhere else.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use crate::models::grant::CanonicalGrant;
use crate::models::reporting::{
    ExportUpload, RecordType, ReportRecord, ReportingPeriod, Upload,
};

#[derive(Debug, Error)]
#[error("persistence error: {0}")]
pub struct PersistenceError(pub String);

impl From<sqlx::Error> for PersistenceError {
    fn from(e: sqlx::Error) -> Self {
        PersistenceError(e.to_string())
    }
}

/// Write side of the ingestion pipeline.
#[async_trait]
pub trait GrantStore: Send + Sync {
    async fn upsert_grant(&self, grant: &CanonicalGrant) -> Result<(), PersistenceError>;
}

/// Read side of the report and export pipelines.
#[async_trait]
pub trait ReportingStore: Send + Sync {
    async fn current_reporting_period(
        &self,
        tenant_id: i64,
    ) -> Result<ReportingPeriod, PersistenceError>;

    async fn reporting_periods(&self, tenant_id: i64)
        -> Result<Vec<ReportingPeriod>, PersistenceError>;

    /// Most-recently-created validated upload per
    /// (reporting period, agency, ec_code) triple.
    async fn final_treasury_uploads(&self, tenant_id: i64)
        -> Result<Vec<Upload>, PersistenceError>;

    async fn records_for_uploads(
        &self,
        upload_ids: &[Uuid],
    ) -> Result<Vec<ReportRecord>, PersistenceError>;

    async fn records_for_tenant(&self, tenant_id: i64)
        -> Result<Vec<ReportRecord>, PersistenceError>;

    /// Every upload for the organization, annotated for the archive exporter.
    async fn exportable_uploads(
        &self,
        organization_id: i64,
    ) -> Result<Vec<ExportUpload>, PersistenceError>;

    /// Creation time of the newest upload, used by the archive freshness check.
    async fn latest_upload_timestamp(
        &self,
        organization_id: i64,
    ) -> Result<Option<DateTime<Utc>>, PersistenceError>;
}

// ── Postgres implementations ────────────────────────────────────────────────

#[derive(Clone)]
pub struct PgGrantStore {
    pool: PgPool,
}

impl PgGrantStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GrantStore for PgGrantStore {
    async fn upsert_grant(&self, grant: &CanonicalGrant) -> Result<(), PersistenceError> {
        // Explicit column list; the conflict target is the natural key.
        // revision_id is deliberately not compared: arrival order wins, so an
        // older revision arriving late overwrites a newer one. Known risk,
        // kept to match the observed upstream behavior (see DESIGN.md).
        // Awards merge through COALESCE so an event without an award never
        // nulls out a previously stored value.
        sqlx::query(
            r#"
            INSERT INTO grants (
                grant_id, revision_id, grant_number, title, description,
                agency_code, award_ceiling, award_floor, cost_sharing,
                cfda_list, open_date, close_date, opportunity_status,
                eligibility_codes, status, notes, search_terms, reviewer_name,
                raw_body, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13,
                    $14, 'inbox', '', '', '', $15, now(), now())
            ON CONFLICT (grant_id) DO UPDATE SET
                revision_id = EXCLUDED.revision_id,
                grant_number = EXCLUDED.grant_number,
                title = EXCLUDED.title,
                description = EXCLUDED.description,
                agency_code = EXCLUDED.agency_code,
                award_ceiling = COALESCE(EXCLUDED.award_ceiling, grants.award_ceiling),
                award_floor = COALESCE(EXCLUDED.award_floor, grants.award_floor),
                cost_sharing = EXCLUDED.cost_sharing,
                cfda_list = EXCLUDED.cfda_list,
                open_date = EXCLUDED.open_date,
                close_date = EXCLUDED.close_date,
                opportunity_status = EXCLUDED.opportunity_status,
                eligibility_codes = EXCLUDED.eligibility_codes,
                raw_body = EXCLUDED.raw_body,
                updated_at = now()
            "#,
        )
        .bind(&grant.grant_id)
        .bind(&grant.revision_id)
        .bind(&grant.grant_number)
        .bind(&grant.title)
        .bind(&grant.description)
        .bind(&grant.agency_code)
        .bind(grant.award_ceiling)
        .bind(grant.award_floor)
        .bind(&grant.cost_sharing)
        .bind(&grant.cfda_list)
        .bind(grant.open_date)
        .bind(grant.close_date)
        .bind(grant.opportunity_status.as_str())
        .bind(&grant.eligibility_codes)
        .bind(&grant.raw_body)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct PgReportingStore {
    pool: PgPool,
}

impl PgReportingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Raw record row; `record_type` comes back as TEXT and is parsed into the
/// domain enum, with unknown types dropped and logged.
#[derive(sqlx::FromRow)]
struct PgRecordRow {
    upload_id: Uuid,
    reporting_period_id: i64,
    record_type: String,
    project_id: Option<String>,
    project_description: Option<String>,
    category_group: Option<String>,
    category: Option<String>,
    adopted_budget: Option<f64>,
    total_obligations: Option<f64>,
    total_expenditures: Option<f64>,
    current_period_obligations: Option<f64>,
    current_period_expenditures: Option<f64>,
    award_amount: Option<f64>,
    expenditure_amount: Option<f64>,
    obligation_amount: Option<f64>,
    evidence_based_spend: Option<f64>,
    completion_status: Option<String>,
    created_at: DateTime<Utc>,
}

const RECORD_COLUMNS: &str = r#"
    upload_id, reporting_period_id, record_type, project_id,
    project_description, category_group, category, adopted_budget,
    total_obligations, total_expenditures, current_period_obligations,
    current_period_expenditures, award_amount, expenditure_amount,
    obligation_amount, evidence_based_spend, completion_status, created_at
"#;

fn into_report_records(rows: Vec<PgRecordRow>) -> Vec<ReportRecord> {
    rows.into_iter()
        .filter_map(|row| {
            let Some(record_type) = RecordType::parse(&row.record_type) else {
                tracing::warn!(record_type = %row.record_type, "unknown record type; skipping");
                return None;
            };
            Some(ReportRecord {
                upload_id: row.upload_id,
                reporting_period_id: row.reporting_period_id,
                record_type,
                project_id: row.project_id,
                project_description: row.project_description,
                category_group: row.category_group,
                category: row.category,
                adopted_budget: row.adopted_budget,
                total_obligations: row.total_obligations,
                total_expenditures: row.total_expenditures,
                current_period_obligations: row.current_period_obligations,
                current_period_expenditures: row.current_period_expenditures,
                award_amount: row.award_amount,
                expenditure_amount: row.expenditure_amount,
                obligation_amount: row.obligation_amount,
                evidence_based_spend: row.evidence_based_spend,
                completion_status: row.completion_status,
                created_at: row.created_at,
            })
        })
        .collect()
}

#[async_trait]
impl ReportingStore for PgReportingStore {
    async fn current_reporting_period(
        &self,
        tenant_id: i64,
    ) -> Result<ReportingPeriod, PersistenceError> {
        Ok(sqlx::query_as::<_, ReportingPeriod>(
            r#"
            SELECT p.id, p.name, p.end_date
            FROM reporting_periods p
            JOIN tenants t ON t.current_reporting_period_id = p.id
            WHERE t.id = $1
            "#,
        )
        .bind(tenant_id)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn reporting_periods(
        &self,
        tenant_id: i64,
    ) -> Result<Vec<ReportingPeriod>, PersistenceError> {
        Ok(sqlx::query_as::<_, ReportingPeriod>(
            "SELECT id, name, end_date FROM reporting_periods WHERE tenant_id = $1 ORDER BY end_date",
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn final_treasury_uploads(
        &self,
        tenant_id: i64,
    ) -> Result<Vec<Upload>, PersistenceError> {
        Ok(sqlx::query_as::<_, Upload>(
            r#"
            SELECT DISTINCT ON (reporting_period_id, agency_code, ec_code)
                id, reporting_period_id, agency_code, ec_code, filename, created_at
            FROM uploads
            WHERE tenant_id = $1 AND validated_at IS NOT NULL
            ORDER BY reporting_period_id, agency_code, ec_code, created_at DESC
            "#,
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn records_for_uploads(
        &self,
        upload_ids: &[Uuid],
    ) -> Result<Vec<ReportRecord>, PersistenceError> {
        let rows = sqlx::query_as::<_, PgRecordRow>(&format!(
            "SELECT {RECORD_COLUMNS} FROM records WHERE upload_id = ANY($1) ORDER BY created_at"
        ))
        .bind(upload_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(into_report_records(rows))
    }

    async fn records_for_tenant(
        &self,
        tenant_id: i64,
    ) -> Result<Vec<ReportRecord>, PersistenceError> {
        let rows = sqlx::query_as::<_, PgRecordRow>(&format!(
            r#"
            SELECT {RECORD_COLUMNS}
            FROM records
            WHERE tenant_id = $1
            ORDER BY created_at
            "#
        ))
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(into_report_records(rows))
    }

    async fn exportable_uploads(
        &self,
        organization_id: i64,
    ) -> Result<Vec<ExportUpload>, PersistenceError> {
        // DISTINCT ON picks the single final-treasury upload per
        // (period, agency, ec_code); everything else is classified by its
        // validation state.
        Ok(sqlx::query_as::<_, ExportUpload>(
            r#"
            SELECT
                u.id AS upload_id,
                u.filename,
                a.name AS agency_name,
                u.ec_code,
                p.name AS reporting_period_name,
                (u.validated_at IS NOT NULL) AS validated,
                (u.invalidated_at IS NOT NULL) AS invalidated,
                (ft.id IS NOT NULL) AS is_final_treasury
            FROM uploads u
            JOIN reporting_periods p ON p.id = u.reporting_period_id
            LEFT JOIN agencies a ON a.id = u.agency_id
            LEFT JOIN (
                SELECT DISTINCT ON (reporting_period_id, agency_code, ec_code) id
                FROM uploads
                WHERE tenant_id = $1 AND validated_at IS NOT NULL
                ORDER BY reporting_period_id, agency_code, ec_code, created_at DESC
            ) ft ON ft.id = u.id
            WHERE u.tenant_id = $1
            ORDER BY u.created_at
            "#,
        )
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn latest_upload_timestamp(
        &self,
        organization_id: i64,
    ) -> Result<Option<DateTime<Utc>>, PersistenceError> {
        Ok(sqlx::query_scalar(
            "SELECT MAX(created_at) FROM uploads WHERE tenant_id = $1",
        )
        .bind(organization_id)
        .fetch_one(&self.pool)
        .await?)
    }
}

//! Report Delivery: build the workbook, upload it under a tenant-scoped key,
//! then notify the requester with a retrieval link. Any failure propagates to
//! the caller; a failed upload never produces a notification.

use chrono::NaiveDate;
use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;

use crate::notify::Notifier;
use crate::reports::build_audit_report;
use crate::storage::ObjectStore;
use crate::store::{PersistenceError, ReportingStore};

pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("failed to build report workbook: {0}")]
    Workbook(String),

    #[error("report upload failed: {0}")]
    Upload(String),

    #[error("report notification failed: {0}")]
    Notify(String),

    #[error(transparent)]
    Store(#[from] PersistenceError),
}

/// Destination settings for delivered reports.
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    pub bucket: String,
    /// Base URL the retrieval link is built from; the signed-URL endpoint
    /// behind it enforces tenant isolation using the tenant id embedded in
    /// the key.
    pub download_base_url: String,
}

/// `audit-report-{yy-MM-dd}-{uuid}.xlsx`
pub fn report_filename(prefix: &str, date: NaiveDate, id: Uuid) -> String {
    format!("{prefix}-{}-{id}.xlsx", date.format("%y-%m-%d"))
}

/// `{tenantId}/{periodId}/{filename}` — the tenant id must stay embedded so
/// cross-tenant access can be rejected downstream.
pub fn report_key(tenant_id: i64, period_id: i64, filename: &str) -> String {
    format!("{tenant_id}/{period_id}/{filename}")
}

/// Generates the audit report for the tenant's current reporting period,
/// uploads it, and emails the requester a retrieval link.
pub async fn generate_and_deliver(
    store: &dyn ReportingStore,
    objects: &dyn ObjectStore,
    notifier: &dyn Notifier,
    config: &DeliveryConfig,
    tenant_id: i64,
    recipient_email: &str,
) -> Result<(), DeliveryError> {
    let period = store.current_reporting_period(tenant_id).await?;
    let buffer = build_audit_report(store, tenant_id, &config.download_base_url).await?;

    let filename = report_filename(
        "audit-report",
        chrono::Utc::now().date_naive(),
        Uuid::new_v4(),
    );
    let key = report_key(tenant_id, period.id, &filename);

    if let Err(e) = objects
        .put_object(&config.bucket, &key, buffer, XLSX_CONTENT_TYPE)
        .await
    {
        error!(tenant_id, key = %key, error = %e, "audit report upload failed");
        return Err(DeliveryError::Upload(e.to_string()));
    }

    let download_url = format!("{}/{}", config.download_base_url, key);
    notifier
        .send(
            recipient_email,
            "Your audit report is ready",
            &format!(
                "<p>Your audit report has been generated. \
                 <a href=\"{download_url}\">Download it here</a>.</p>"
            ),
        )
        .await
        .map_err(|e| DeliveryError::Notify(e.to_string()))?;

    info!(tenant_id, key = %key, recipient = %recipient_email, "audit report delivered");
    Ok(())
}

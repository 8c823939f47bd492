use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::error;

use crate::errors::AppError;
use crate::export::enqueue_export;
use crate::reports::delivery::{generate_and_deliver, DeliveryConfig};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AuditReportRequest {
    pub tenant_id: i64,
    pub recipient_email: String,
}

#[derive(Debug, Deserialize)]
pub struct AuditReportQuery {
    /// `?async=true` queues the generation and returns immediately.
    #[serde(rename = "async")]
    pub run_async: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FullFileExportRequest {
    pub organization_id: i64,
    pub recipient_email: String,
}

fn delivery_config(state: &AppState) -> DeliveryConfig {
    DeliveryConfig {
        bucket: state.config.audit_report_bucket.clone(),
        download_base_url: state.config.website_url.clone(),
    }
}

/// POST /api/audit-report
///
/// Sync: generates, uploads, and emails inline; failures come back as a 500
/// with a fixed-shape error body. Async (`?async=true`): acknowledges with an
/// immediate 200 and runs the same flow in the background, failures visible
/// only in logs and by the absence of the notification email.
pub async fn handle_audit_report(
    State(state): State<AppState>,
    Query(query): Query<AuditReportQuery>,
    Json(req): Json<AuditReportRequest>,
) -> Result<Json<Value>, AppError> {
    if req.recipient_email.is_empty() {
        return Err(AppError::Validation("recipient_email is required".to_string()));
    }

    let config = delivery_config(&state);
    if query.run_async.as_deref() == Some("true") {
        tokio::spawn(async move {
            if let Err(e) = generate_and_deliver(
                state.store.as_ref(),
                state.objects.as_ref(),
                state.notifier.as_ref(),
                &config,
                req.tenant_id,
                &req.recipient_email,
            )
            .await
            {
                error!(tenant_id = req.tenant_id, error = %e, "async audit report failed");
            }
        });
        return Ok(Json(json!({})));
    }

    generate_and_deliver(
        state.store.as_ref(),
        state.objects.as_ref(),
        state.notifier.as_ref(),
        &config,
        req.tenant_id,
        &req.recipient_email,
    )
    .await
    .map_err(|e| {
        error!(tenant_id = req.tenant_id, error = %e, "audit report failed");
        AppError::Report("Unable to generate audit report and send email.".to_string())
    })?;

    Ok(Json(json!({})))
}

/// POST /api/full-file-export
/// Writes the export metadata and enqueues the archive-assembly job.
pub async fn handle_full_file_export(
    State(state): State<AppState>,
    Json(req): Json<FullFileExportRequest>,
) -> Result<Json<Value>, AppError> {
    if req.recipient_email.is_empty() {
        return Err(AppError::Validation("recipient_email is required".to_string()));
    }

    enqueue_export(
        state.store.as_ref(),
        state.objects.as_ref(),
        state.archive_queue.as_ref(),
        &state.config.archive_bucket,
        req.organization_id,
        &req.recipient_email,
    )
    .await
    .map_err(|e| {
        error!(organization_id = req.organization_id, error = %e, "full-file export failed");
        AppError::Report("Unable to start the full file export.".to_string())
    })?;

    Ok(Json(json!({})))
}

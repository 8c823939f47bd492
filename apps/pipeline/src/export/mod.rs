//! Full-File Archive Exporter: classify the tenant's uploads into zip paths,
//! write the metadata CSV to object storage, and hand the archive assembly to
//! the downstream archiver via the second queue.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::ingest::queue::{MessageQueue, QueueError};
use crate::models::reporting::ExportUpload;
use crate::storage::{ObjectStore, StorageError};
use crate::store::{PersistenceError, ReportingStore};

pub const METADATA_CSV_HEADER: [&str; 7] = [
    "upload_id",
    "original_filename",
    "path_in_zip",
    "agency_name",
    "ec_code",
    "reporting_period_name",
    "validity",
];

#[derive(Debug, Error)]
pub enum ExportError {
    #[error(transparent)]
    Store(#[from] PersistenceError),

    #[error("metadata upload failed: {0}")]
    Storage(#[from] StorageError),

    #[error("archive job enqueue failed: {0}")]
    Queue(#[from] QueueError),

    #[error("metadata CSV generation failed: {0}")]
    Csv(String),
}

/// Message consumed by the downstream archive assembler.
#[derive(Debug, Serialize)]
pub struct ArchiveJob {
    pub s3: ArchiveLocation,
    pub organization_id: i64,
    pub user_email: String,
    pub recreate_archive: bool,
}

#[derive(Debug, Serialize)]
pub struct ArchiveLocation {
    pub bucket: String,
    pub zip_key: String,
    pub metadata_key: String,
}

pub fn metadata_key(organization_id: i64) -> String {
    format!("full-file-export/org_{organization_id}/metadata.csv")
}

pub fn zip_key(organization_id: i64) -> String {
    format!("full-file-export/org_{organization_id}/archive.zip")
}

/// Zip directory an upload lands in, by validation state and final-treasury
/// status.
pub fn path_in_zip(upload: &ExportUpload) -> String {
    let directory = if upload.is_final_treasury {
        "Final Treasury"
    } else if upload.validated && !upload.invalidated {
        "Not Final Treasury/Valid files"
    } else {
        "Not Final Treasury/Invalid files"
    };
    format!("{directory}/{}--{}", upload.upload_id, upload.filename)
}

fn validity(upload: &ExportUpload) -> &'static str {
    if upload.invalidated {
        "invalidated"
    } else if upload.validated {
        "validated"
    } else {
        "not_validated"
    }
}

/// Renders the metadata CSV. Fields are quoted only when they need it (a
/// comma in an agency name or zip path); everything else stays bare.
pub fn build_metadata_csv(uploads: &[ExportUpload]) -> Result<Vec<u8>, ExportError> {
    let mut writer = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Necessary)
        .from_writer(Vec::new());

    writer
        .write_record(METADATA_CSV_HEADER)
        .map_err(|e| ExportError::Csv(e.to_string()))?;
    for upload in uploads {
        writer
            .write_record([
                upload.upload_id.to_string().as_str(),
                upload.filename.as_str(),
                path_in_zip(upload).as_str(),
                upload.agency_name.as_deref().unwrap_or(""),
                upload.ec_code.as_deref().unwrap_or(""),
                upload.reporting_period_name.as_str(),
                validity(upload),
            ])
            .map_err(|e| ExportError::Csv(e.to_string()))?;
    }

    writer
        .into_inner()
        .map_err(|e| ExportError::Csv(e.to_string()))
}

/// Freshness short-circuit: the archive only needs recreating when the
/// metadata object predates the newest upload (or does not exist yet). An
/// unnecessary regeneration is acceptable; serving a stale archive is not, so
/// every uncertain case reports stale.
pub fn archive_is_stale(
    metadata_modified: Option<DateTime<Utc>>,
    latest_upload: Option<DateTime<Utc>>,
) -> bool {
    match (metadata_modified, latest_upload) {
        (Some(metadata), Some(upload)) => metadata < upload,
        (Some(_), None) => false,
        (None, _) => true,
    }
}

/// Queries the tenant's uploads, refreshes the metadata CSV when stale, and
/// enqueues the archive-assembly job.
pub async fn enqueue_export(
    store: &dyn ReportingStore,
    objects: &dyn ObjectStore,
    archive_queue: &dyn MessageQueue,
    bucket: &str,
    organization_id: i64,
    user_email: &str,
) -> Result<(), ExportError> {
    let metadata_key = metadata_key(organization_id);

    let metadata_modified = objects.last_modified(bucket, &metadata_key).await?;
    let latest_upload = store.latest_upload_timestamp(organization_id).await?;
    let recreate_archive = archive_is_stale(metadata_modified, latest_upload);

    if recreate_archive {
        let uploads = store.exportable_uploads(organization_id).await?;
        let csv = build_metadata_csv(&uploads)?;
        objects
            .put_object(bucket, &metadata_key, csv, "text/csv")
            .await?;
        info!(
            organization_id,
            uploads = uploads.len(),
            "full-file export metadata refreshed"
        );
    } else {
        info!(organization_id, "full-file export metadata is fresh; skipping regeneration");
    }

    let job = ArchiveJob {
        s3: ArchiveLocation {
            bucket: bucket.to_string(),
            zip_key: zip_key(organization_id),
            metadata_key,
        },
        organization_id,
        user_email: user_email.to_string(),
        recreate_archive,
    };
    let body = serde_json::to_string(&job).map_err(|e| ExportError::Csv(e.to_string()))?;
    archive_queue.send_message(&body).await?;

    info!(organization_id, recreate_archive, "archive job enqueued");
    Ok(())
}

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::Config;
use crate::ingest::queue::MessageQueue;
use crate::notify::Notifier;
use crate::storage::ObjectStore;
use crate::store::ReportingStore;

/// Shared application state injected into all route handlers via Axum
/// extractors. Pipeline collaborators are trait objects so handlers stay
/// testable with fakes.
#[derive(Clone)]
pub struct AppState {
    /// Pool kept on the state for future handlers; the stores carry their own
    /// clones.
    #[allow(dead_code)]
    pub db: PgPool,
    pub store: Arc<dyn ReportingStore>,
    pub objects: Arc<dyn ObjectStore>,
    pub notifier: Arc<dyn Notifier>,
    /// Outbound queue consumed by the downstream archive assembler.
    pub archive_queue: Arc<dyn MessageQueue>,
    pub config: Config,
}

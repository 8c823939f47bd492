//! Batch Processor — parse → normalize → upsert → acknowledge, one message at
//! a time, all messages in a batch concurrently. A single bad message never
//! short-circuits its siblings; unacknowledged messages come back through the
//! queue's visibility timeout.

use std::sync::Arc;

use futures::future::join_all;
use tracing::{error, info, warn};

use crate::ingest::normalize::{parse_event, EventKind};
use crate::ingest::queue::{MessageQueue, RawMessage};
use crate::store::GrantStore;

/// Aggregate counts for one processed batch, logged for observability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    pub succeeded: usize,
    pub parse_errors: usize,
    pub save_errors: usize,
}

enum MessageOutcome {
    Upserted,
    ParseFailed,
    SaveFailed,
}

pub struct BatchProcessor {
    store: Arc<dyn GrantStore>,
    queue: Arc<dyn MessageQueue>,
}

impl BatchProcessor {
    pub fn new(store: Arc<dyn GrantStore>, queue: Arc<dyn MessageQueue>) -> Self {
        Self { store, queue }
    }

    /// Processes every message in the batch concurrently and returns the
    /// tally. Ordering of upserts and acks across messages is unspecified;
    /// the merge-on-conflict upsert makes redelivery harmless.
    pub async fn process_batch(&self, messages: Vec<RawMessage>) -> BatchStats {
        let outcomes = join_all(messages.iter().map(|m| self.process_message(m))).await;

        let mut stats = BatchStats::default();
        for outcome in outcomes {
            match outcome {
                MessageOutcome::Upserted => stats.succeeded += 1,
                MessageOutcome::ParseFailed => stats.parse_errors += 1,
                MessageOutcome::SaveFailed => stats.save_errors += 1,
            }
        }

        info!(
            succeeded = stats.succeeded,
            parse_errors = stats.parse_errors,
            save_errors = stats.save_errors,
            "grant event batch processed"
        );
        stats
    }

    async fn process_message(&self, message: &RawMessage) -> MessageOutcome {
        let event = match parse_event(&message.body) {
            Ok(event) => event,
            Err(e) => {
                warn!(message_id = %message.id, error = %e, "skipping malformed grant event");
                return MessageOutcome::ParseFailed;
            }
        };

        if event.kind == EventKind::Delete {
            // Deletes are upserted like any other modification; no row
            // removal exists in this pipeline. Logged so the volume of
            // delete events stays visible. Open question recorded in
            // DESIGN.md.
            warn!(grant_id = %event.grant.grant_id, "delete event ingested as a plain upsert");
        }

        if let Err(e) = self.store.upsert_grant(&event.grant).await {
            error!(
                message_id = %message.id,
                grant_id = %event.grant.grant_id,
                error = %e,
                "failed to upsert grant; leaving message for redelivery"
            );
            return MessageOutcome::SaveFailed;
        }

        // Ack failures are logged only: the upsert already happened and is
        // idempotent, so redelivery after the visibility timeout re-writes
        // the same row.
        if let Err(e) = self.queue.delete_message(&message.receipt_handle).await {
            error!(
                message_id = %message.id,
                error = %e,
                "failed to acknowledge processed message; visibility timeout will redeliver"
            );
        }

        MessageOutcome::Upserted
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::ingest::queue::QueueError;
    use crate::models::grant::CanonicalGrant;
    use crate::store::PersistenceError;

    #[derive(Default)]
    struct FakeGrantStore {
        grants: Mutex<HashMap<String, CanonicalGrant>>,
        upsert_calls: Mutex<usize>,
        fail_grant_ids: Vec<String>,
    }

    #[async_trait]
    impl GrantStore for FakeGrantStore {
        async fn upsert_grant(&self, grant: &CanonicalGrant) -> Result<(), PersistenceError> {
            *self.upsert_calls.lock().unwrap() += 1;
            if self.fail_grant_ids.contains(&grant.grant_id) {
                return Err(PersistenceError("connection reset".to_string()));
            }
            let mut grants = self.grants.lock().unwrap();
            match grants.get(&grant.grant_id) {
                Some(existing) => {
                    // Merge-on-conflict: absent awards keep the stored value.
                    let mut merged = grant.clone();
                    if merged.award_ceiling.is_none() {
                        merged.award_ceiling = existing.award_ceiling;
                    }
                    if merged.award_floor.is_none() {
                        merged.award_floor = existing.award_floor;
                    }
                    grants.insert(merged.grant_id.clone(), merged);
                }
                None => {
                    grants.insert(grant.grant_id.clone(), grant.clone());
                }
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeQueue {
        deleted: Mutex<Vec<String>>,
        fail_delete_handles: Vec<String>,
    }

    #[async_trait]
    impl MessageQueue for FakeQueue {
        async fn receive_batch(&self) -> Result<Vec<RawMessage>, QueueError> {
            Ok(Vec::new())
        }

        async fn delete_message(&self, receipt_handle: &str) -> Result<(), QueueError> {
            if self.fail_delete_handles.iter().any(|h| h == receipt_handle) {
                return Err(QueueError::Delete("receipt handle expired".to_string()));
            }
            self.deleted.lock().unwrap().push(receipt_handle.to_string());
            Ok(())
        }

        async fn send_message(&self, _body: &str) -> Result<(), QueueError> {
            Ok(())
        }
    }

    fn message(id: &str, body: String) -> RawMessage {
        RawMessage {
            id: id.to_string(),
            receipt_handle: format!("rh-{id}"),
            body,
        }
    }

    fn grant_event(grant_id: &str, revision: &str, title: &str) -> String {
        serde_json::json!({
            "detail": {
                "type": "update",
                "versions": {
                    "new": {
                        "opportunity": {
                            "id": grant_id,
                            "title": title,
                            "milestones": { "close": { "date": "2099-01-01" } }
                        },
                        "revision": { "id": revision }
                    }
                }
            }
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_per_message_isolation_on_parse_failure() {
        let store = Arc::new(FakeGrantStore::default());
        let queue = Arc::new(FakeQueue::default());
        let processor = BatchProcessor::new(store.clone(), queue.clone());

        let stats = processor
            .process_batch(vec![
                message("m1", grant_event("1", "r1", "first")),
                message("m2", "{broken".to_string()),
                message("m3", grant_event("2", "r1", "second")),
            ])
            .await;

        assert_eq!(stats.succeeded, 2);
        assert_eq!(stats.parse_errors, 1);
        assert_eq!(stats.save_errors, 0);
        assert_eq!(*store.upsert_calls.lock().unwrap(), 2);
        // Exactly N-1 acks; the malformed message is left for redelivery.
        let deleted = queue.deleted.lock().unwrap();
        assert_eq!(deleted.len(), 2);
        assert!(deleted.contains(&"rh-m1".to_string()));
        assert!(deleted.contains(&"rh-m3".to_string()));
    }

    #[tokio::test]
    async fn test_redelivered_update_overwrites_same_row() {
        let store = Arc::new(FakeGrantStore::default());
        let queue = Arc::new(FakeQueue::default());
        let processor = BatchProcessor::new(store.clone(), queue.clone());

        let stats = processor
            .process_batch(vec![
                message("m1", grant_event("1", "r1", "original title")),
                message("m2", "not json at all".to_string()),
                message("m3", grant_event("1", "r2", "updated title")),
            ])
            .await;

        assert_eq!(stats.succeeded, 2);
        assert_eq!(stats.parse_errors, 1);
        assert_eq!(*store.upsert_calls.lock().unwrap(), 2);
        assert_eq!(queue.deleted.lock().unwrap().len(), 2);

        let grants = store.grants.lock().unwrap();
        assert_eq!(grants.len(), 1);
        // Both messages carried grant_id=1: exactly one row, and since the
        // two upserts ran concurrently either revision may have landed last.
        let row = grants.get("1").unwrap();
        assert!(matches!(row.revision_id.as_deref(), Some("r1") | Some("r2")));
    }

    #[tokio::test]
    async fn test_save_failure_leaves_message_unacknowledged() {
        let store = Arc::new(FakeGrantStore {
            fail_grant_ids: vec!["1".to_string()],
            ..Default::default()
        });
        let queue = Arc::new(FakeQueue::default());
        let processor = BatchProcessor::new(store.clone(), queue.clone());

        let stats = processor
            .process_batch(vec![
                message("m1", grant_event("1", "r1", "will fail")),
                message("m2", grant_event("2", "r1", "fine")),
            ])
            .await;

        assert_eq!(stats.succeeded, 1);
        assert_eq!(stats.save_errors, 1);
        let deleted = queue.deleted.lock().unwrap();
        assert_eq!(deleted.as_slice(), ["rh-m2"]);
    }

    #[tokio::test]
    async fn test_ack_failure_does_not_block_siblings() {
        let store = Arc::new(FakeGrantStore::default());
        let queue = Arc::new(FakeQueue {
            fail_delete_handles: vec!["rh-m1".to_string()],
            ..Default::default()
        });
        let processor = BatchProcessor::new(store.clone(), queue.clone());

        let stats = processor
            .process_batch(vec![
                message("m1", grant_event("1", "r1", "ack will fail")),
                message("m2", grant_event("2", "r1", "fine")),
            ])
            .await;

        // Both upserts count as succeeded; the failed ack only logs.
        assert_eq!(stats.succeeded, 2);
        assert_eq!(*store.upsert_calls.lock().unwrap(), 2);
        assert_eq!(queue.deleted.lock().unwrap().as_slice(), ["rh-m2"]);
    }

    #[tokio::test]
    async fn test_reingesting_same_event_is_idempotent() {
        let store = Arc::new(FakeGrantStore::default());
        let queue = Arc::new(FakeQueue::default());
        let processor = BatchProcessor::new(store.clone(), queue.clone());

        let body = grant_event("42", "r1", "same event");
        processor.process_batch(vec![message("m1", body.clone())]).await;
        processor.process_batch(vec![message("m2", body)]).await;

        let grants = store.grants.lock().unwrap();
        assert_eq!(grants.len(), 1);
        assert_eq!(grants.get("42").unwrap().title.as_deref(), Some("same event"));
    }

    #[tokio::test]
    async fn test_later_arrival_overwrites_regardless_of_revision() {
        // Observed behavior: last write wins by arrival order, not by
        // revision id. An older revision arriving later still overwrites.
        let store = Arc::new(FakeGrantStore::default());
        let queue = Arc::new(FakeQueue::default());
        let processor = BatchProcessor::new(store.clone(), queue.clone());

        processor
            .process_batch(vec![message("m1", grant_event("1", "r2", "newer revision"))])
            .await;
        processor
            .process_batch(vec![message("m2", grant_event("1", "r1", "older revision"))])
            .await;

        let grants = store.grants.lock().unwrap();
        let row = grants.get("1").unwrap();
        assert_eq!(row.revision_id.as_deref(), Some("r1"));
        assert_eq!(row.title.as_deref(), Some("older revision"));
    }

    #[tokio::test]
    async fn test_absent_award_does_not_clobber_stored_value() {
        let store = Arc::new(FakeGrantStore::default());
        let queue = Arc::new(FakeQueue::default());
        let processor = BatchProcessor::new(store.clone(), queue.clone());

        let with_award = serde_json::json!({
            "detail": { "type": "create", "versions": { "new": {
                "opportunity": { "id": "7" },
                "award": { "ceiling": "250000" }
            }}}
        })
        .to_string();
        let without_award = serde_json::json!({
            "detail": { "type": "update", "versions": { "new": {
                "opportunity": { "id": "7", "title": "second revision" }
            }}}
        })
        .to_string();

        processor.process_batch(vec![message("m1", with_award)]).await;
        processor.process_batch(vec![message("m2", without_award)]).await;

        let grants = store.grants.lock().unwrap();
        let row = grants.get("7").unwrap();
        assert_eq!(row.title.as_deref(), Some("second revision"));
        assert_eq!(row.award_ceiling, Some(250_000));
    }
}

//! Message-queue abstraction and the SQS-backed implementation.
//!
//! The receive path returns a typed `Result` so the ingest loop can apply its
//! empty-batch-on-transient-failure policy explicitly; delete and send errors
//! are never swallowed here.

use async_trait::async_trait;
use thiserror::Error;

/// Long-poll window, in seconds. Fixed, not a tunable.
pub const RECEIVE_WAIT_TIME_SECONDS: i32 = 20;

/// Upper bound on messages per receive call. Fixed, not a tunable.
pub const RECEIVE_MAX_MESSAGES: i32 = 10;

/// A message as pulled off the queue, before any parsing.
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub id: String,
    pub receipt_handle: String,
    pub body: String,
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue receive failed: {0}")]
    Receive(String),

    #[error("message delete failed: {0}")]
    Delete(String),

    #[error("message send failed: {0}")]
    Send(String),
}

#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Blocks up to [`RECEIVE_WAIT_TIME_SECONDS`] waiting for up to
    /// [`RECEIVE_MAX_MESSAGES`] messages. An empty vec means the poll timed
    /// out with no work.
    async fn receive_batch(&self) -> Result<Vec<RawMessage>, QueueError>;

    /// Acknowledges a message; the queue will not redeliver it afterwards.
    async fn delete_message(&self, receipt_handle: &str) -> Result<(), QueueError>;

    /// Enqueues a new message body.
    async fn send_message(&self, body: &str) -> Result<(), QueueError>;
}

/// SQS-backed queue handle, one per queue URL.
#[derive(Clone)]
pub struct SqsQueue {
    client: aws_sdk_sqs::Client,
    queue_url: String,
}

impl SqsQueue {
    pub fn new(client: aws_sdk_sqs::Client, queue_url: String) -> Self {
        Self { client, queue_url }
    }
}

#[async_trait]
impl MessageQueue for SqsQueue {
    async fn receive_batch(&self) -> Result<Vec<RawMessage>, QueueError> {
        let output = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .wait_time_seconds(RECEIVE_WAIT_TIME_SECONDS)
            .max_number_of_messages(RECEIVE_MAX_MESSAGES)
            .send()
            .await
            .map_err(|e| QueueError::Receive(e.to_string()))?;

        let messages = output
            .messages
            .unwrap_or_default()
            .into_iter()
            .filter_map(|m| {
                // A message without a body or receipt handle cannot be
                // processed or acknowledged; drop it and let redelivery
                // surface it again if the queue ever heals it.
                match (m.message_id, m.receipt_handle, m.body) {
                    (Some(id), Some(receipt_handle), Some(body)) => Some(RawMessage {
                        id,
                        receipt_handle,
                        body,
                    }),
                    _ => {
                        tracing::warn!("received SQS message without id/handle/body; skipping");
                        None
                    }
                }
            })
            .collect();

        Ok(messages)
    }

    async fn delete_message(&self, receipt_handle: &str) -> Result<(), QueueError> {
        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map_err(|e| QueueError::Delete(e.to_string()))?;
        Ok(())
    }

    async fn send_message(&self, body: &str) -> Result<(), QueueError> {
        self.client
            .send_message()
            .queue_url(&self.queue_url)
            .message_body(body)
            .send()
            .await
            .map_err(|e| QueueError::Send(e.to_string()))?;
        Ok(())
    }
}

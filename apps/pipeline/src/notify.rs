//! Email notification seam. Report delivery only ever talks to the trait;
//! production wires in SES.

use async_trait::async_trait;
use aws_sdk_sesv2::types::{Body, Content, Destination, EmailContent, Message};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("notification failed: {0}")]
pub struct NotifyError(pub String);

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, recipient: &str, subject: &str, html_body: &str)
        -> Result<(), NotifyError>;
}

#[derive(Clone)]
pub struct SesNotifier {
    client: aws_sdk_sesv2::Client,
    from_address: String,
}

impl SesNotifier {
    pub fn new(client: aws_sdk_sesv2::Client, from_address: String) -> Self {
        Self {
            client,
            from_address,
        }
    }
}

#[async_trait]
impl Notifier for SesNotifier {
    async fn send(
        &self,
        recipient: &str,
        subject: &str,
        html_body: &str,
    ) -> Result<(), NotifyError> {
        let content = EmailContent::builder()
            .simple(
                Message::builder()
                    .subject(
                        Content::builder()
                            .data(subject)
                            .build()
                            .map_err(|e| NotifyError(e.to_string()))?,
                    )
                    .body(
                        Body::builder()
                            .html(
                                Content::builder()
                                    .data(html_body)
                                    .build()
                                    .map_err(|e| NotifyError(e.to_string()))?,
                            )
                            .build(),
                    )
                    .build(),
            )
            .build();

        self.client
            .send_email()
            .from_email_address(&self.from_address)
            .destination(Destination::builder().to_addresses(recipient).build())
            .content(content)
            .send()
            .await
            .map_err(|e| NotifyError(e.to_string()))?;
        Ok(())
    }
}

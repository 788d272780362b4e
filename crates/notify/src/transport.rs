//! Push transports: the last hop between a stored notification record and
//! whatever the operator pointed the relay at.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mendflow_core::domain::notification::NotificationRecord;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use thiserror::Error;

/// Wire payload for one push. The field names are the webhook contract;
/// receivers dedup replayed deliveries on `notification_id`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PushMessage {
    pub notification_id: String,
    pub recipient_id: String,
    pub request_id: String,
    pub event: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl PushMessage {
    pub fn from_record(record: &NotificationRecord) -> Self {
        Self {
            notification_id: record.id.0.clone(),
            recipient_id: record.recipient_id.0.clone(),
            request_id: record.request_id.0.clone(),
            event: record.dedup_key(),
            message: record.message.clone(),
            created_at: record.created_at,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("push delivery failed: {0}")]
    Send(String),
    #[error("push endpoint answered HTTP {status}")]
    Rejected { status: u16 },
}

#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn deliver(&self, message: &PushMessage) -> Result<(), TransportError>;
}

/// Transport used when push is configured off. Accepting every message keeps
/// the relay stamping `delivered_at`, so the outbox stays bounded and old
/// records are not replayed wholesale when an operator enables push later.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopTransport;

#[async_trait]
impl PushTransport for NoopTransport {
    async fn deliver(&self, _message: &PushMessage) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Posts each push as a JSON body to a fixed webhook endpoint, with an
/// optional bearer token.
#[derive(Clone, Debug)]
pub struct WebhookTransport {
    client: Client,
    webhook_url: String,
    auth_token: Option<SecretString>,
}

impl WebhookTransport {
    pub fn new(webhook_url: impl Into<String>, auth_token: Option<SecretString>) -> Self {
        Self { client: Client::new(), webhook_url: webhook_url.into(), auth_token }
    }
}

#[async_trait]
impl PushTransport for WebhookTransport {
    async fn deliver(&self, message: &PushMessage) -> Result<(), TransportError> {
        let mut request = self.client.post(&self.webhook_url).json(message);
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response =
            request.send().await.map_err(|error| TransportError::Send(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Rejected { status: status.as_u16() });
        }

        Ok(())
    }
}

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::errors::AppError;
use crate::models::WebhookPayload;

/// How a webhook's response may be consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Status, headers and body are readable and logged.
    Cors,
    /// The response is opaque: it is never read, and its status always
    /// reports as 0.
    NoCors,
}

/// A fixed endpoint that receives submitted leads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookTarget {
    pub name: String,
    pub url: String,
    pub mode: DeliveryMode,
}

/// The two endpoints every lead is delivered to.
///
/// The primary endpoint also receives the submission origin fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookEndpoints {
    pub primary: WebhookTarget,
    pub secondary: WebhookTarget,
}

/// What could be observed about a delivery that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// A readable response came back.
    Responded { status: u16, body: String },
    /// The request went out; the response cannot be inspected.
    Opaque,
}

impl DeliveryOutcome {
    /// Status as a browser would report it. Opaque responses read as 0.
    pub fn status(&self) -> u16 {
        match self {
            DeliveryOutcome::Responded { status, .. } => *status,
            DeliveryOutcome::Opaque => 0,
        }
    }
}

/// Something that can take a lead payload to a webhook.
#[async_trait]
pub trait LeadSink: Send + Sync {
    async fn deliver(
        &self,
        target: &WebhookTarget,
        payload: &WebhookPayload,
    ) -> Result<DeliveryOutcome, AppError>;
}

/// Posts lead payloads over HTTP.
///
/// A single POST per delivery: no retries, and no timeout unless one is
/// configured.
#[derive(Clone)]
pub struct WebhookClient {
    client: reqwest::Client,
}

impl WebhookClient {
    /// Creates a new `WebhookClient`.
    ///
    /// # Arguments
    ///
    /// * `timeout` - Optional per-request timeout.
    pub fn new(timeout: Option<Duration>) -> Result<Self, AppError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let client = builder.build().map_err(|e| {
            AppError::InternalError(format!("Failed to create webhook client: {}", e))
        })?;

        Ok(Self { client })
    }
}

#[async_trait]
impl LeadSink for WebhookClient {
    async fn deliver(
        &self,
        target: &WebhookTarget,
        payload: &WebhookPayload,
    ) -> Result<DeliveryOutcome, AppError> {
        tracing::info!("Sending to {}...", target.name);
        tracing::debug!(
            "{} payload: {}",
            target.name,
            serde_json::to_string_pretty(payload).unwrap_or_default()
        );

        let response = self
            .client
            .post(&target.url)
            .header("Content-Type", "application/json; charset=utf-8")
            .header("Accept", "application/json")
            .json(payload)
            .send()
            .await
            .map_err(|e| {
                AppError::ExternalApiError(format!("{} request failed: {}", target.name, e))
            })?;

        match target.mode {
            DeliveryMode::NoCors => {
                // Dropped unread; only the fact that the request went out is known.
                drop(response);
                let outcome = DeliveryOutcome::Opaque;
                tracing::info!(
                    "{} Response Status: {} (opaque)",
                    target.name,
                    outcome.status()
                );
                Ok(outcome)
            }
            DeliveryMode::Cors => {
                let status = response.status().as_u16();
                let headers: BTreeMap<String, String> = response
                    .headers()
                    .iter()
                    .map(|(name, value)| {
                        (
                            name.to_string(),
                            value.to_str().unwrap_or("<binary>").to_string(),
                        )
                    })
                    .collect();
                let body = response.text().await.map_err(|e| {
                    AppError::ExternalApiError(format!(
                        "Failed to read {} response: {}",
                        target.name, e
                    ))
                })?;

                tracing::info!("{} Response Status: {}", target.name, status);
                tracing::debug!("{} Response Headers: {:?}", target.name, headers);
                tracing::debug!("{} Response Body: {}", target.name, body);

                Ok(DeliveryOutcome::Responded { status, body })
            }
        }
    }
}

//! Lead submission pipeline.
//!
//! `Idle -> Submitting -> Redirecting | SettledInPlace`
//!
//! Both webhook deliveries are issued concurrently and joined. A failing
//! delivery is logged and swallowed: it neither aborts the other delivery nor
//! changes the outcome the visitor sees. Once both have settled the resolved
//! brand decides whether the visitor is redirected.

use std::sync::Arc;
use std::time::Instant;

use crate::config::RedirectRule;
use crate::errors::AppError;
use crate::models::{
    LeadSubmission, RedirectTarget, SubmissionOrigin, SubmitLeadResponse, WebhookPayload,
};
use crate::overlay::Overlay;
use crate::webhooks::{LeadSink, WebhookEndpoints, WebhookTarget};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionState {
    Idle,
    Submitting {
        first_name: String,
    },
    Redirecting {
        first_name: String,
        url: String,
        target: RedirectTarget,
    },
    SettledInPlace {
        first_name: String,
    },
}

/// Where the submission came from, as far as the page can tell.
#[derive(Debug, Clone, Default)]
pub struct SubmissionContext {
    pub origin: SubmissionOrigin,
    pub has_top_frame: bool,
}

pub struct SubmissionPipeline {
    sink: Arc<dyn LeadSink>,
    endpoints: WebhookEndpoints,
    redirect: RedirectRule,
    overlay: Overlay,
    state: SubmissionState,
}

impl SubmissionPipeline {
    pub fn new(
        sink: Arc<dyn LeadSink>,
        endpoints: WebhookEndpoints,
        redirect: RedirectRule,
        overlay: Overlay,
    ) -> Self {
        Self {
            sink,
            endpoints,
            redirect,
            overlay,
            state: SubmissionState::Idle,
        }
    }

    pub fn state(&self) -> &SubmissionState {
        &self.state
    }

    pub fn overlay(&self) -> &Overlay {
        &self.overlay
    }

    /// Submits a lead and waits for both deliveries to settle.
    ///
    /// Only an idle pipeline accepts a submission. The HTTP handler builds one
    /// pipeline per request, so across requests a double submit is held off
    /// by the page disabling its button, not by this check. Delivery failures
    /// never surface here.
    pub async fn submit(
        &mut self,
        lead: LeadSubmission,
        context: SubmissionContext,
    ) -> Result<&SubmissionState, AppError> {
        if self.state != SubmissionState::Idle {
            return Err(AppError::BadRequest(
                "A submission is already in progress".to_string(),
            ));
        }

        let first_name = lead.fname.clone();
        self.state = SubmissionState::Submitting {
            first_name: first_name.clone(),
        };
        self.overlay.activate(Instant::now());

        tracing::info!(
            "📨 Submitting lead {} (brand: {})",
            lead.fingerprint(),
            lead.brand
        );

        let primary_payload = lead.payload_with_origin(context.origin);
        let secondary_payload = lead.payload();

        tokio::join!(
            self.deliver(&self.endpoints.primary, &primary_payload),
            self.deliver(&self.endpoints.secondary, &secondary_payload),
        );

        self.state = if self.redirect.applies_to(&lead.brand) {
            let target = if context.has_top_frame {
                RedirectTarget::Top
            } else {
                RedirectTarget::Current
            };
            tracing::info!("↪ Redirecting to {} ({:?} frame)", self.redirect.url, target);
            SubmissionState::Redirecting {
                first_name,
                url: self.redirect.url.clone(),
                target,
            }
        } else {
            tracing::info!("✓ Lead {} settled in place", lead.fingerprint());
            SubmissionState::SettledInPlace { first_name }
        };

        Ok(&self.state)
    }

    async fn deliver(&self, target: &WebhookTarget, payload: &WebhookPayload) {
        match self.sink.deliver(target, payload).await {
            Ok(outcome) => {
                tracing::debug!(
                    "{} delivery settled with status {}",
                    target.name,
                    outcome.status()
                );
            }
            Err(e) => {
                tracing::error!("{} Error: {}", target.name, e);
            }
        }
    }

    /// Response body for the page, with the overlay advanced to `now`.
    pub fn response(&mut self, now: Instant) -> Option<SubmitLeadResponse> {
        let overlay = self.overlay.snapshot(now);
        match &self.state {
            SubmissionState::Redirecting {
                first_name,
                url,
                target,
            } => Some(SubmitLeadResponse::Redirecting {
                first_name: first_name.clone(),
                redirect_url: url.clone(),
                target: *target,
                overlay,
            }),
            SubmissionState::SettledInPlace { first_name } => Some(SubmitLeadResponse::Settled {
                first_name: first_name.clone(),
                overlay,
            }),
            SubmissionState::Idle | SubmissionState::Submitting { .. } => None,
        }
    }
}

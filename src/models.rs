use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::formatting::to_e164_au;
use crate::overlay::OverlaySnapshot;
use crate::settings::EffectiveSettings;
use crate::validation::{Field, LeadForm, ValidatedLead};

/// Lead status every submission is created with.
pub const LEAD_STATUS_NEW: &str = "New Lead";

/// A validated lead, ready to be delivered.
///
/// Built once on submit and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeadSubmission {
    pub fname: String,
    pub lname: String,
    pub email: String,
    /// E.164 (`+614XXXXXXXX`).
    pub phone: String,
    pub amount: u64,
    pub lstatus: String,
    pub iso: String,
    pub lead_source: String,
    pub brand: String,
}

impl LeadSubmission {
    pub fn new(lead: ValidatedLead, settings: &EffectiveSettings) -> Self {
        Self {
            phone: to_e164_au(&lead.phone),
            fname: lead.fname,
            lname: lead.lname,
            email: lead.email,
            amount: lead.amount,
            lstatus: LEAD_STATUS_NEW.to_string(),
            iso: settings.country.clone(),
            lead_source: settings.lead_source.clone(),
            brand: settings.brand.clone(),
        }
    }

    /// Short SHA-256 fingerprint of the contact details, for logs.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.email.to_lowercase().as_bytes());
        hasher.update(b":");
        hasher.update(self.phone.as_bytes());
        let digest = hex::encode(hasher.finalize());
        digest[..12].to_string()
    }

    /// Payload without origin details.
    pub fn payload(&self) -> WebhookPayload {
        WebhookPayload {
            fname: self.fname.clone(),
            lname: self.lname.clone(),
            email: self.email.clone(),
            phone: self.phone.clone(),
            amount: self.amount,
            lstatus: self.lstatus.clone(),
            iso: self.iso.clone(),
            lead_source: self.lead_source.clone(),
            brand: self.brand.clone(),
            origin: None,
        }
    }

    /// Payload carrying where the submission came from.
    pub fn payload_with_origin(&self, origin: SubmissionOrigin) -> WebhookPayload {
        WebhookPayload {
            origin: Some(origin),
            ..self.payload()
        }
    }
}

/// Extra fields only the primary webhook receives.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionOrigin {
    /// Page the visitor submitted from (referrer, else the form URL).
    pub submission_url: String,
    /// State or territory guessed from the visitor's IP, empty when unknown.
    pub predicted_state: String,
}

/// JSON body posted to a webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub fname: String,
    pub lname: String,
    pub email: String,
    pub phone: String,
    pub amount: u64,
    pub lstatus: String,
    pub iso: String,
    pub lead_source: String,
    pub brand: String,
    #[serde(flatten)]
    pub origin: Option<SubmissionOrigin>,
}

/// Fields consumed from the IP geolocation service.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GeoLookupResponse {
    #[serde(default)]
    pub country_code: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
}

impl GeoLookupResponse {
    /// The region, when the visitor is in Australia.
    pub fn australian_region(&self) -> Option<String> {
        match (self.country_code.as_deref(), self.region.as_deref()) {
            (Some("AU"), Some(region)) if !region.is_empty() => Some(region.to_string()),
            _ => None,
        }
    }
}

/// Body of `POST /api/v1/leads`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubmitLeadRequest {
    #[serde(flatten)]
    pub form: LeadForm,
    /// `document.referrer || location.href` as seen by the page.
    #[serde(default)]
    pub submission_url: Option<String>,
    /// Whether the page can reach a top-level frame.
    #[serde(default = "default_true")]
    pub has_top_frame: bool,
}

fn default_true() -> bool {
    true
}

/// Frame a redirect should navigate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedirectTarget {
    /// The top-level browsing context (the page embedding the form).
    Top,
    /// The frame the form itself is rendered in.
    Current,
}

/// Body returned once both deliveries have settled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubmitLeadResponse {
    Redirecting {
        first_name: String,
        redirect_url: String,
        target: RedirectTarget,
        overlay: OverlaySnapshot,
    },
    Settled {
        first_name: String,
        overlay: OverlaySnapshot,
    },
}

/// Body of `POST /api/v1/leads/validate`.
#[derive(Debug, Clone, Deserialize)]
pub struct FieldCheckRequest {
    pub field: Field,
    #[serde(default)]
    pub value: String,
}

/// Result of a single-field check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldCheckResponse {
    pub field: Field,
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

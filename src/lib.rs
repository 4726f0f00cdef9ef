//! Loan Lead Form Library
//!
//! This library serves a single-page lead-capture form for an Australian
//! loan-referral business: it resolves the form's settings, validates and
//! normalizes input, and delivers each lead to two webhooks before telling
//! the page whether to redirect.
//!
//! # Modules
//!
//! - `config`: Configuration management.
//! - `errors`: Error handling types.
//! - `formatting`: Phone and amount string transforms.
//! - `geolocation`: Visitor state/territory guess.
//! - `handlers`: HTTP request handlers and routes.
//! - `models`: Lead and wire data models.
//! - `overlay`: Submission overlay state.
//! - `settings`: Effective settings resolution.
//! - `submission`: Submission pipeline.
//! - `validation`: Field validation.
//! - `verification`: Dormant one-time-code verification.
//! - `views`: HTML for the form page.
//! - `webhooks`: Lead delivery to webhooks.

pub mod config;
pub mod errors;
pub mod formatting;
pub mod geolocation;
pub mod handlers;
pub mod models;
pub mod overlay;
pub mod settings;
pub mod submission;
pub mod validation;
pub mod verification;
pub mod views;
pub mod webhooks;

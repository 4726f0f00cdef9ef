//! One-time-code phone verification.
//!
//! Not part of the submission flow. The capability sits behind
//! [`VerificationProvider`] so a real SMS/email provider can replace the demo
//! one, and the HTTP routes are only mounted when enabled in configuration.

use async_trait::async_trait;
use std::time::{Duration, Instant};

use crate::errors::AppError;
use crate::formatting::strip_non_digits;

pub const CODE_LENGTH: usize = 6;
pub const RESEND_WINDOW: Duration = Duration::from_secs(30);
pub const INVALID_CODE: &str = "Please enter a valid 6-digit code";
pub const VERIFY_FAILED: &str = "Failed to verify code. Please try again.";

#[async_trait]
pub trait VerificationProvider: Send + Sync {
    /// Sends (or re-sends) a code to `phone`.
    async fn request_code(&self, phone: &str) -> Result<(), AppError>;

    /// Whether `code` is the code sent to `phone`.
    async fn verify_code(&self, phone: &str, code: &str) -> Result<bool, AppError>;
}

/// Accepts any 6-digit code after an artificial delay.
#[derive(Debug, Clone)]
pub struct DemoVerificationProvider {
    verify_delay: Duration,
    resend_delay: Duration,
}

impl Default for DemoVerificationProvider {
    fn default() -> Self {
        Self::new(Duration::from_millis(1500), Duration::from_millis(500))
    }
}

impl DemoVerificationProvider {
    pub fn new(verify_delay: Duration, resend_delay: Duration) -> Self {
        Self {
            verify_delay,
            resend_delay,
        }
    }
}

#[async_trait]
impl VerificationProvider for DemoVerificationProvider {
    async fn request_code(&self, phone: &str) -> Result<(), AppError> {
        tracing::info!("Demo verification: code requested for ...{}", last_digits(phone));
        tokio::time::sleep(self.resend_delay).await;
        Ok(())
    }

    async fn verify_code(&self, _phone: &str, code: &str) -> Result<bool, AppError> {
        tokio::time::sleep(self.verify_delay).await;
        Ok(is_complete_code(code))
    }
}

fn last_digits(phone: &str) -> String {
    let digits = strip_non_digits(phone);
    digits[digits.len().saturating_sub(3)..].to_string()
}

fn is_complete_code(code: &str) -> bool {
    code.len() == CODE_LENGTH && code.chars().all(|c| c.is_ascii_digit())
}

/// Keeps the digits of a code input, capped at [`CODE_LENGTH`].
pub fn sanitize_code(input: &str) -> String {
    strip_non_digits(input).chars().take(CODE_LENGTH).collect()
}

/// Countdown gating the "resend code" action.
#[derive(Debug, Clone, Copy)]
pub struct ResendCountdown {
    started_at: Instant,
    window: Duration,
}

impl ResendCountdown {
    pub fn start(now: Instant) -> Self {
        Self::with_window(now, RESEND_WINDOW)
    }

    pub fn with_window(now: Instant, window: Duration) -> Self {
        Self {
            started_at: now,
            window,
        }
    }

    /// Whole seconds left, rounded up the way a ticking display shows them.
    pub fn remaining_secs(&self, now: Instant) -> u64 {
        let left = self
            .window
            .saturating_sub(now.saturating_duration_since(self.started_at));
        let secs = left.as_secs();
        if left.subsec_nanos() > 0 {
            secs + 1
        } else {
            secs
        }
    }

    pub fn can_resend(&self, now: Instant) -> bool {
        self.remaining_secs(now) == 0
    }

    pub fn restart(&mut self, now: Instant) {
        self.started_at = now;
    }
}

/// State of the code-entry dialog.
pub struct VerificationDialog<P: VerificationProvider> {
    provider: P,
    phone: String,
    code: String,
    error: Option<String>,
    verifying: bool,
    countdown: ResendCountdown,
}

impl<P: VerificationProvider> VerificationDialog<P> {
    /// Opens the dialog; the resend countdown starts immediately.
    pub fn open(provider: P, phone: impl Into<String>, now: Instant) -> Self {
        Self {
            provider,
            phone: phone.into(),
            code: String::new(),
            error: None,
            verifying: false,
            countdown: ResendCountdown::start(now),
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_verifying(&self) -> bool {
        self.verifying
    }

    pub fn countdown(&self) -> &ResendCountdown {
        &self.countdown
    }

    /// Typing clears any previous error.
    pub fn input(&mut self, value: &str) {
        self.code = sanitize_code(value);
        self.error = None;
    }

    /// Verifies the entered code. Returns `true` once verified.
    pub async fn verify(&mut self) -> bool {
        if self.code.len() != CODE_LENGTH {
            self.error = Some(INVALID_CODE.to_string());
            return false;
        }

        self.verifying = true;
        self.error = None;
        let result = self.provider.verify_code(&self.phone, &self.code).await;
        self.verifying = false;

        match result {
            Ok(true) => true,
            Ok(false) => {
                self.error = Some("Invalid verification code".to_string());
                false
            }
            Err(e) => {
                tracing::warn!("Verification failed: {}", e);
                self.error = Some(VERIFY_FAILED.to_string());
                false
            }
        }
    }

    /// Re-sends the code if the countdown has run out.
    pub async fn resend(&mut self, now: Instant) -> Result<bool, AppError> {
        if !self.countdown.can_resend(now) {
            return Ok(false);
        }
        self.countdown.restart(now);
        self.provider.request_code(&self.phone).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instant_provider() -> DemoVerificationProvider {
        DemoVerificationProvider::new(Duration::ZERO, Duration::ZERO)
    }

    #[test]
    fn test_sanitize_code() {
        assert_eq!(sanitize_code("12 34-56"), "123456");
        assert_eq!(sanitize_code("12345678"), "123456");
        assert_eq!(sanitize_code("abc"), "");
    }

    #[test]
    fn test_countdown() {
        let start = Instant::now();
        let countdown = ResendCountdown::start(start);

        assert_eq!(countdown.remaining_secs(start), 30);
        assert_eq!(countdown.remaining_secs(start + Duration::from_millis(29_500)), 1);
        assert!(!countdown.can_resend(start + Duration::from_secs(29)));
        assert!(countdown.can_resend(start + Duration::from_secs(30)));
    }

    #[tokio::test]
    async fn test_any_six_digit_code_verifies() {
        let mut dialog = VerificationDialog::open(instant_provider(), "0412345678", Instant::now());
        dialog.input("654 821");
        assert_eq!(dialog.code(), "654821");
        assert!(dialog.verify().await);
        assert!(!dialog.is_verifying());
        assert_eq!(dialog.error(), None);
    }

    #[tokio::test]
    async fn test_short_code_sets_error() {
        let mut dialog = VerificationDialog::open(instant_provider(), "0412345678", Instant::now());
        dialog.input("6548");
        assert!(!dialog.verify().await);
        assert_eq!(dialog.error(), Some(INVALID_CODE));

        dialog.input("65482");
        assert_eq!(dialog.error(), None);
    }

    #[tokio::test]
    async fn test_resend_waits_for_countdown() {
        let start = Instant::now();
        let mut dialog = VerificationDialog::open(instant_provider(), "0412345678", start);

        assert!(!dialog.resend(start + Duration::from_secs(10)).await.unwrap());

        let later = start + Duration::from_secs(31);
        assert!(dialog.resend(later).await.unwrap());
        assert_eq!(dialog.countdown().remaining_secs(later), 30);
    }

    #[tokio::test]
    async fn test_demo_provider_delays_verification() {
        let provider = DemoVerificationProvider::new(Duration::from_millis(20), Duration::ZERO);
        let started = Instant::now();
        assert!(provider.verify_code("0412345678", "123456").await.unwrap());
        assert!(started.elapsed() >= Duration::from_millis(20));
        assert!(!provider.verify_code("0412345678", "12345a").await.unwrap());
    }
}

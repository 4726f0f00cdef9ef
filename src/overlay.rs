//! Submission overlay state.
//!
//! The overlay is keyed off a single "is submitting" flag: activating it shows
//! a spinner, and after the message delay the thank-you message replaces the
//! spinner for good. It is timer driven and knows nothing about delivery
//! completion. The page mirrors it from [`OverlaySnapshot`] with one timer,
//! and hides it only when a submission is refused.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// How long the spinner shows before the thank-you message.
pub const DEFAULT_MESSAGE_DELAY: Duration = Duration::from_secs(2);

/// Overlay state with the instant each phase was entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayState {
    Hidden,
    Spinner { since: Instant },
    Message { since: Instant },
}

/// Phase of the overlay without timestamps, as reported to the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlayPhase {
    Hidden,
    Spinner,
    Message,
}

/// What the page needs to mirror the overlay: the current phase and, while
/// the spinner is up, how long until the message replaces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlaySnapshot {
    pub phase: OverlayPhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_in_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct Overlay {
    state: OverlayState,
    message_delay: Duration,
}

impl Default for Overlay {
    fn default() -> Self {
        Self::new(DEFAULT_MESSAGE_DELAY)
    }
}

impl Overlay {
    pub fn new(message_delay: Duration) -> Self {
        Self {
            state: OverlayState::Hidden,
            message_delay,
        }
    }

    pub fn state(&self) -> OverlayState {
        self.state
    }

    pub fn message_delay(&self) -> Duration {
        self.message_delay
    }

    pub fn is_active(&self) -> bool {
        !matches!(self.state, OverlayState::Hidden)
    }

    /// Shows the spinner. Activating an already active overlay is a no-op.
    pub fn activate(&mut self, now: Instant) {
        if !self.is_active() {
            self.state = OverlayState::Spinner { since: now };
        }
    }

    /// Moves the spinner to the message once the delay has elapsed.
    ///
    /// The message's `since` is when the delay expired, not when `advance`
    /// happened to be called.
    pub fn advance(&mut self, now: Instant) -> OverlayPhase {
        if let OverlayState::Spinner { since } = self.state {
            if now.saturating_duration_since(since) >= self.message_delay {
                self.state = OverlayState::Message {
                    since: since + self.message_delay,
                };
            }
        }
        self.phase_at(now)
    }

    /// The phase the overlay is in at `now`, without mutating it.
    pub fn phase_at(&self, now: Instant) -> OverlayPhase {
        match self.state {
            OverlayState::Hidden => OverlayPhase::Hidden,
            OverlayState::Message { .. } => OverlayPhase::Message,
            OverlayState::Spinner { since } => {
                if now.saturating_duration_since(since) >= self.message_delay {
                    OverlayPhase::Message
                } else {
                    OverlayPhase::Spinner
                }
            }
        }
    }

    /// Time left before the message shows. `None` unless the spinner is up.
    pub fn remaining_spinner(&self, now: Instant) -> Option<Duration> {
        match self.state {
            OverlayState::Spinner { since } => Some(
                self.message_delay
                    .saturating_sub(now.saturating_duration_since(since)),
            ),
            _ => None,
        }
    }

    /// Advances to `now` and reports the result for the page.
    pub fn snapshot(&mut self, now: Instant) -> OverlaySnapshot {
        let phase = self.advance(now);
        OverlaySnapshot {
            phase,
            message_in_ms: self
                .remaining_spinner(now)
                .map(|remaining| remaining.as_millis() as u64),
        }
    }
}

//! Checkout state machine.

use serde::{Deserialize, Serialize};

use crate::error::{CheckoutError, Result};

/// The state of one checkout attempt.
///
/// State transitions:
/// ```text
/// Validating ──► Pricing ──► Reserving ──► Persisting ──► Completed
///      │            │            │              │
///      └────────────┴────────────┴──────────────┴──► Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CheckoutState {
    #[default]
    Validating,
    Pricing,
    Reserving,
    Persisting,
    /// The order is committed (terminal state).
    Completed,
    /// The attempt was rolled back (terminal state).
    Failed,
}

impl CheckoutState {
    /// The state that follows this one on success.
    pub fn next(&self) -> Option<CheckoutState> {
        match self {
            CheckoutState::Validating => Some(CheckoutState::Pricing),
            CheckoutState::Pricing => Some(CheckoutState::Reserving),
            CheckoutState::Reserving => Some(CheckoutState::Persisting),
            CheckoutState::Persisting => Some(CheckoutState::Completed),
            CheckoutState::Completed | CheckoutState::Failed => None,
        }
    }

    pub fn can_transition_to(&self, to: CheckoutState) -> bool {
        if self.is_terminal() {
            return false;
        }
        to == CheckoutState::Failed || self.next() == Some(to)
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, CheckoutState::Completed | CheckoutState::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CheckoutState::Validating => "Validating",
            CheckoutState::Pricing => "Pricing",
            CheckoutState::Reserving => "Reserving",
            CheckoutState::Persisting => "Persisting",
            CheckoutState::Completed => "Completed",
            CheckoutState::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for CheckoutState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Tracks the state of a single checkout and rejects illegal moves.
#[derive(Debug, Default)]
pub struct CheckoutAttempt {
    state: CheckoutState,
}

impl CheckoutAttempt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> CheckoutState {
        self.state
    }

    pub fn advance(&mut self, to: CheckoutState) -> Result<()> {
        if !self.state.can_transition_to(to) {
            return Err(CheckoutError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        tracing::debug!(from = %self.state, to = %to, "checkout state changed");
        self.state = to;
        Ok(())
    }

    /// Moves to `Failed` unless the attempt already finished.
    pub fn fail(&mut self) {
        if !self.state.is_terminal() {
            tracing::debug!(from = %self.state, "checkout failed");
            self.state = CheckoutState::Failed;
        }
    }
}

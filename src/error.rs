use serde::Serialize;
use thiserror::Error;

use crate::timer::SessionStateKind;

/// Failures reported by the wallet collaborator.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum WalletError {
    #[error("wallet unavailable: {0}")]
    Unavailable(String),
    #[error("transaction rejected: {0}")]
    Rejected(String),
    #[error("unknown account {0}")]
    UnknownAccount(String),
    #[error("insufficient funds: {available} available, {requested} requested")]
    InsufficientFunds { available: f64, requested: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    /// Bad input; nothing changed and nothing was sent to the wallet.
    Validation,
    /// The wallet failed; the session stays where it was and may retry.
    External,
    /// The request does not apply to the current state.
    Rejected,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SessionError {
    #[error("stake must be a finite number")]
    NonFiniteStake,
    #[error("stake {amount} is outside the allowed range {min}..={max}")]
    StakeOutOfRange { amount: f64, min: f64, max: f64 },
    #[error("{0}s is not one of the permitted durations")]
    InvalidDuration(u64),
    #[error("insufficient balance: staking {stake} with only {balance} available")]
    InsufficientBalance { stake: f64, balance: f64 },
    #[error("cannot {action} while the session is {state}")]
    InvalidTransition {
        action: &'static str,
        state: SessionStateKind,
    },
    #[error("another wallet action is still pending")]
    ActionPending,
    #[error("session controller has been shut down")]
    Closed,
    #[error("{action} failed: {source}")]
    External {
        action: &'static str,
        #[source]
        source: WalletError,
    },
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::NonFiniteStake
            | SessionError::StakeOutOfRange { .. }
            | SessionError::InvalidDuration(_)
            | SessionError::InsufficientBalance { .. } => ErrorKind::Validation,
            SessionError::External { .. } => ErrorKind::External,
            SessionError::InvalidTransition { .. }
            | SessionError::ActionPending
            | SessionError::Closed => ErrorKind::Rejected,
        }
    }
}

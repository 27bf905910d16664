use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{error::ErrorKind, timer::SessionStateKind};

use super::HostState;

/// Wallet write currently awaited on behalf of the session.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum PendingAction {
    Staking,
    Claiming,
}

/// Transient, dismissible message for the user.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Notice {
    pub kind: ErrorKind,
    pub message: String,
}

/// Flat, serializable view of the session for the UI.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub session_id: Option<String>,
    pub state: SessionStateKind,
    pub host: HostState,
    pub staked_amount: Option<f64>,
    pub duration_seconds: Option<u64>,
    pub computed_reward: Option<f64>,
    pub remaining_seconds: Option<u64>,
    pub paused_remaining_seconds: Option<u64>,
    pub abandonment_deadline: Option<DateTime<Utc>>,
    pub grace_remaining_ms: Option<i64>,
    pub lost_stake: Option<f64>,
    pub pending: Option<PendingAction>,
    pub notice: Option<Notice>,
}

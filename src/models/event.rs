use serde::Serialize;

use crate::wallet::{ClaimKind, TxHandle};

use super::{Notice, SessionSnapshot};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum SessionEvent {
    StateChanged { snapshot: SessionSnapshot },
    Tick { remaining_seconds: u64 },
    GraceTick { grace_remaining_ms: i64 },
    ResumePrompt {
        paused_remaining_seconds: u64,
        grace_remaining_ms: i64,
    },
    Staked { amount: f64, tx: TxHandle },
    Completed {
        staked_amount: f64,
        reward: f64,
        payout: f64,
    },
    Claimed {
        kind: ClaimKind,
        amount: f64,
        tx: TxHandle,
    },
    Forfeited { lost_stake: f64 },
    Notice { notice: Notice },
}

use std::sync::Weak;

use chrono::{DateTime, Duration, Utc};
use tokio::time::{self, MissedTickBehavior};

use crate::models::SessionEvent;

use super::{controller::ControllerInner, state::DeadlineCheck, task::ScheduledTask};

// Per-tick lines log at debug level.
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info};

/// Absolute wall-clock deadline after which a backgrounded session is forfeited.
///
/// Only the deadline is stored. Remaining time is always recomputed from the
/// clock, never counted down, so a suspended process that misses every poll
/// still gets the right answer on its next check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbandonmentWatchdog {
    deadline: DateTime<Utc>,
}

impl AbandonmentWatchdog {
    pub fn arm(now: DateTime<Utc>, grace: Duration) -> Self {
        Self {
            deadline: now
                .checked_add_signed(grace)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    pub fn deadline(&self) -> DateTime<Utc> {
        self.deadline
    }

    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.deadline - now).max(Duration::zero())
    }

    pub fn remaining_ms(&self, now: DateTime<Utc>) -> i64 {
        self.remaining(now).num_milliseconds()
    }

    pub fn expired(&self, now: DateTime<Utc>) -> bool {
        self.remaining(now) == Duration::zero()
    }
}

/// Spawns the cosmetic poller that reports the grace countdown and forfeits the
/// session once the deadline passes while nobody else checked it.
pub(crate) fn spawn_watchdog(
    inner: Weak<ControllerInner>,
    generation: u64,
    period: std::time::Duration,
) -> Option<ScheduledTask> {
    let cancel = inner.upgrade()?.shutdown.clone();

    Some(ScheduledTask::spawn(async move {
        let mut interval = time::interval_at(time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = cancel.cancelled() => break,
            }

            let Some(controller) = inner.upgrade() else {
                break;
            };

            let (check, snapshot) = {
                let mut session = controller.session.lock().await;
                if session.generation() != generation {
                    break;
                }
                let now = controller.clock.now();
                let check = session.check_deadline(now);
                (check, session.snapshot(now))
            };

            match check {
                DeadlineCheck::NotArmed => break,
                DeadlineCheck::Remaining(grace_remaining_ms) => {
                    log_debug!("grace remaining {}ms", grace_remaining_ms);
                    controller.emit(SessionEvent::GraceTick { grace_remaining_ms });
                }
                DeadlineCheck::Forfeited { lost_stake } => {
                    log_info!("grace period elapsed, forfeited {}", lost_stake);
                    controller.emit(SessionEvent::Forfeited { lost_stake });
                    controller.emit(SessionEvent::StateChanged { snapshot });
                    break;
                }
            }
        }
    }))
}

use std::{sync::Weak, time::Duration};

use tokio::time::{self, MissedTickBehavior};

use crate::models::SessionEvent;

use super::{controller::ControllerInner, state::TickOutcome, task::ScheduledTask};

// Per-tick lines log at debug level.
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info};

/// Spawns the foreground countdown. Each tick takes one second off the running
/// session; reaching zero completes it and ends the task.
///
/// The task exits as soon as the session generation moves on, so a countdown
/// that outlives its session can never decrement a paused or newer one.
pub(crate) fn spawn_countdown(
    inner: Weak<ControllerInner>,
    generation: u64,
    period: Duration,
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

            let (outcome, snapshot) = {
                let mut session = controller.session.lock().await;
                if session.generation() != generation {
                    break;
                }
                let outcome = session.tick();
                (outcome, session.snapshot(controller.clock.now()))
            };

            match outcome {
                TickOutcome::Ignored => break,
                TickOutcome::Remaining(remaining_seconds) => {
                    log_debug!("{}s remaining", remaining_seconds);
                    controller.emit(SessionEvent::Tick { remaining_seconds });
                }
                TickOutcome::Completed(terms) => {
                    log_info!(
                        "session completed, reward {} on stake {}",
                        terms.reward,
                        terms.staked_amount
                    );
                    controller.emit(SessionEvent::Tick {
                        remaining_seconds: 0,
                    });
                    controller.emit(SessionEvent::Completed {
                        staked_amount: terms.staked_amount,
                        reward: terms.reward,
                        payout: terms.payout(),
                    });
                    controller.emit(SessionEvent::StateChanged { snapshot });
                    break;
                }
            }
        }
    }))
}

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

use crate::{
    config::FocusConfig,
    error::SessionError,
    models::{HostState, Notice, PendingAction, SessionSnapshot},
    reward,
};

use super::watchdog::AbandonmentWatchdog;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SessionStateKind {
    Idle,
    Configuring,
    Running,
    PausedAwaitingReturn,
    AbandonmentWarning,
    Completed,
    Forfeited,
}

impl SessionStateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStateKind::Idle => "idle",
            SessionStateKind::Configuring => "configuring",
            SessionStateKind::Running => "running",
            SessionStateKind::PausedAwaitingReturn => "paused",
            SessionStateKind::AbandonmentWarning => "away",
            SessionStateKind::Completed => "completed",
            SessionStateKind::Forfeited => "forfeited",
        }
    }
}

impl fmt::Display for SessionStateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the user committed to: stake, duration and the reward they imply.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionTerms {
    pub staked_amount: f64,
    pub duration_secs: u64,
    pub reward: f64,
}

impl SessionTerms {
    pub fn new(staked_amount: f64, duration_secs: u64, config: &FocusConfig) -> Self {
        Self {
            staked_amount,
            duration_secs,
            reward: reward::reward(staked_amount, duration_secs, &config.duration, &config.reward),
        }
    }

    pub fn payout(&self) -> f64 {
        reward::payout(self.staked_amount, self.reward)
    }
}

/// Lifecycle of a focus session. Each variant carries only the fields that
/// mean something in that state.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionPhase {
    Idle,
    Configuring {
        terms: SessionTerms,
    },
    Running {
        terms: SessionTerms,
        remaining_seconds: u64,
    },
    /// Host is away; the session is frozen and the grace deadline is live.
    AbandonmentWarning {
        terms: SessionTerms,
        paused_remaining_seconds: u64,
        watchdog: AbandonmentWatchdog,
    },
    /// Host is back and the user is asked to resume. The original deadline
    /// stays armed until the user answers.
    PausedAwaitingReturn {
        terms: SessionTerms,
        paused_remaining_seconds: u64,
        watchdog: Option<AbandonmentWatchdog>,
    },
    Completed {
        terms: SessionTerms,
    },
    Forfeited {
        lost_stake: f64,
    },
}

impl SessionPhase {
    pub fn kind(&self) -> SessionStateKind {
        match self {
            SessionPhase::Idle => SessionStateKind::Idle,
            SessionPhase::Configuring { .. } => SessionStateKind::Configuring,
            SessionPhase::Running { .. } => SessionStateKind::Running,
            SessionPhase::AbandonmentWarning { .. } => SessionStateKind::AbandonmentWarning,
            SessionPhase::PausedAwaitingReturn { .. } => SessionStateKind::PausedAwaitingReturn,
            SessionPhase::Completed { .. } => SessionStateKind::Completed,
            SessionPhase::Forfeited { .. } => SessionStateKind::Forfeited,
        }
    }

    pub fn terms(&self) -> Option<&SessionTerms> {
        match self {
            SessionPhase::Configuring { terms }
            | SessionPhase::Running { terms, .. }
            | SessionPhase::AbandonmentWarning { terms, .. }
            | SessionPhase::PausedAwaitingReturn { terms, .. }
            | SessionPhase::Completed { terms } => Some(terms),
            SessionPhase::Idle | SessionPhase::Forfeited { .. } => None,
        }
    }

    fn watchdog(&self) -> Option<AbandonmentWatchdog> {
        match self {
            SessionPhase::AbandonmentWarning { watchdog, .. } => Some(*watchdog),
            SessionPhase::PausedAwaitingReturn { watchdog, .. } => *watchdog,
            _ => None,
        }
    }
}

/// The repeating callback a phase needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DriverKind {
    Countdown,
    Watchdog,
}

/// How a transition affects the controller's single driver slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverChange {
    Keep,
    Start(DriverKind),
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    Remaining(u64),
    Completed(SessionTerms),
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HostTransition {
    Unchanged,
    /// Left the foreground; `rearmed` is false when an earlier deadline is reused.
    Paused {
        paused_remaining_seconds: u64,
        deadline: DateTime<Utc>,
        rearmed: bool,
    },
    ResumePrompt {
        paused_remaining_seconds: u64,
        grace_remaining_ms: i64,
    },
    Forfeited {
        lost_stake: f64,
    },
}

impl HostTransition {
    pub fn driver_change(&self) -> DriverChange {
        match self {
            HostTransition::Unchanged | HostTransition::ResumePrompt { .. } => DriverChange::Keep,
            HostTransition::Paused { rearmed: true, .. } => DriverChange::Start(DriverKind::Watchdog),
            HostTransition::Paused { rearmed: false, .. } => DriverChange::Keep,
            HostTransition::Forfeited { .. } => DriverChange::Stop,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DeadlineCheck {
    NotArmed,
    Remaining(i64),
    Forfeited { lost_stake: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResumeOutcome {
    Resumed { remaining_seconds: u64 },
    Declined { paused_remaining_seconds: u64 },
    Forfeited { lost_stake: f64 },
}

impl ResumeOutcome {
    pub fn driver_change(&self) -> DriverChange {
        match self {
            ResumeOutcome::Resumed { .. } => DriverChange::Start(DriverKind::Countdown),
            ResumeOutcome::Declined { .. } | ResumeOutcome::Forfeited { .. } => DriverChange::Stop,
        }
    }
}

/// One focus session and everything needed to move it between phases.
///
/// All transitions are synchronous and take time and config as arguments;
/// the last observed host state lives here too, so no handler ever reads
/// lifecycle state captured somewhere else.
#[derive(Debug)]
pub struct Session {
    id: Option<String>,
    phase: SessionPhase,
    host: HostState,
    pending: Option<PendingAction>,
    notice: Option<Notice>,
    generation: u64,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            id: None,
            phase: SessionPhase::Idle,
            host: HostState::Active,
            pending: None,
            notice: None,
            generation: 0,
        }
    }
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn phase(&self) -> &SessionPhase {
        &self.phase
    }

    pub fn kind(&self) -> SessionStateKind {
        self.phase.kind()
    }

    pub fn host(&self) -> HostState {
        self.host
    }

    pub fn pending(&self) -> Option<PendingAction> {
        self.pending
    }

    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Invalidates every callback started for an earlier generation.
    pub(crate) fn bump_generation(&mut self) -> u64 {
        self.generation = self.generation.wrapping_add(1);
        self.generation
    }

    pub fn expected_driver(&self) -> Option<DriverKind> {
        match &self.phase {
            SessionPhase::Running { .. } => Some(DriverKind::Countdown),
            SessionPhase::AbandonmentWarning { .. }
            | SessionPhase::PausedAwaitingReturn {
                watchdog: Some(_), ..
            } => Some(DriverKind::Watchdog),
            _ => None,
        }
    }

    pub fn set_notice(&mut self, notice: Notice) {
        self.notice = Some(notice);
    }

    pub fn dismiss_notice(&mut self) -> Option<Notice> {
        self.notice.take()
    }

    pub(crate) fn begin_pending(&mut self, action: PendingAction) -> Result<(), SessionError> {
        if self.pending.is_some() {
            return Err(SessionError::ActionPending);
        }
        self.pending = Some(action);
        Ok(())
    }

    pub(crate) fn clear_pending(&mut self) {
        self.pending = None;
    }

    fn ensure_not_pending(&self) -> Result<(), SessionError> {
        match self.pending {
            Some(_) => Err(SessionError::ActionPending),
            None => Ok(()),
        }
    }

    fn invalid(&self, action: &'static str) -> SessionError {
        SessionError::InvalidTransition {
            action,
            state: self.kind(),
        }
    }

    pub fn select_duration(
        &mut self,
        duration_secs: u64,
        config: &FocusConfig,
    ) -> Result<SessionTerms, SessionError> {
        self.ensure_not_pending()?;
        let staked_amount = match &self.phase {
            SessionPhase::Idle => config.stake.min,
            SessionPhase::Configuring { terms } => terms.staked_amount,
            _ => return Err(self.invalid("select a duration")),
        };
        if !config.duration.permits(duration_secs) {
            return Err(SessionError::InvalidDuration(duration_secs));
        }

        let terms = SessionTerms::new(staked_amount, duration_secs, config);
        if self.id.is_none() {
            self.id = Some(Uuid::new_v4().to_string());
        }
        self.phase = SessionPhase::Configuring { terms };
        Ok(terms)
    }

    pub fn set_stake(
        &mut self,
        amount: f64,
        config: &FocusConfig,
    ) -> Result<SessionTerms, SessionError> {
        self.ensure_not_pending()?;
        let duration_secs = match &self.phase {
            SessionPhase::Configuring { terms } => terms.duration_secs,
            _ => return Err(self.invalid("change the stake")),
        };
        validate_stake(amount, config)?;

        let terms = SessionTerms::new(amount, duration_secs, config);
        self.phase = SessionPhase::Configuring { terms };
        Ok(terms)
    }

    pub fn cancel_configuration(&mut self) -> Result<(), SessionError> {
        self.ensure_not_pending()?;
        match self.phase {
            SessionPhase::Configuring { .. } => {
                self.reset();
                Ok(())
            }
            _ => Err(self.invalid("cancel configuration")),
        }
    }

    /// Re-checks the configured terms before anything is sent to the wallet.
    pub fn validate_start(&self, config: &FocusConfig) -> Result<SessionTerms, SessionError> {
        let terms = match &self.phase {
            SessionPhase::Configuring { terms } => *terms,
            _ => return Err(self.invalid("start")),
        };
        validate_stake(terms.staked_amount, config)?;
        if !config.duration.permits(terms.duration_secs) {
            return Err(SessionError::InvalidDuration(terms.duration_secs));
        }
        Ok(terms)
    }

    /// Starts the countdown once the stake is committed. A host that went away
    /// while the stake was being committed goes straight to the grace period.
    pub fn begin(&mut self, now: DateTime<Utc>, grace: Duration) -> Result<DriverChange, SessionError> {
        let terms = match &self.phase {
            SessionPhase::Configuring { terms } => *terms,
            _ => return Err(self.invalid("start")),
        };

        if self.host.has_left_foreground() {
            self.phase = SessionPhase::AbandonmentWarning {
                terms,
                paused_remaining_seconds: terms.duration_secs,
                watchdog: AbandonmentWatchdog::arm(now, grace),
            };
            Ok(DriverChange::Start(DriverKind::Watchdog))
        } else {
            self.phase = SessionPhase::Running {
                terms,
                remaining_seconds: terms.duration_secs,
            };
            Ok(DriverChange::Start(DriverKind::Countdown))
        }
    }

    pub fn tick(&mut self) -> TickOutcome {
        let SessionPhase::Running {
            terms,
            remaining_seconds,
        } = self.phase
        else {
            return TickOutcome::Ignored;
        };

        let remaining_seconds = remaining_seconds.saturating_sub(1);
        if remaining_seconds == 0 {
            self.phase = SessionPhase::Completed { terms };
            TickOutcome::Completed(terms)
        } else {
            self.phase = SessionPhase::Running {
                terms,
                remaining_seconds,
            };
            TickOutcome::Remaining(remaining_seconds)
        }
    }

    /// Applies a lifecycle notification. Only `Background` leaves the
    /// foreground and only `Active` regains it; other states are recorded.
    pub fn host_changed(
        &mut self,
        next: HostState,
        now: DateTime<Utc>,
        grace: Duration,
    ) -> HostTransition {
        let previous = std::mem::replace(&mut self.host, next);
        if previous == next {
            return HostTransition::Unchanged;
        }

        if next.has_left_foreground() {
            self.leave_foreground(now, grace)
        } else if next.is_foreground() {
            self.return_to_foreground(now)
        } else {
            HostTransition::Unchanged
        }
    }

    fn leave_foreground(&mut self, now: DateTime<Utc>, grace: Duration) -> HostTransition {
        let (terms, paused_remaining_seconds, watchdog, rearmed) = match self.phase {
            SessionPhase::Running {
                terms,
                remaining_seconds,
            } => (terms, remaining_seconds, AbandonmentWatchdog::arm(now, grace), true),
            SessionPhase::PausedAwaitingReturn {
                terms,
                paused_remaining_seconds,
                watchdog,
            } => match watchdog {
                Some(watchdog) => (terms, paused_remaining_seconds, watchdog, false),
                None => (
                    terms,
                    paused_remaining_seconds,
                    AbandonmentWatchdog::arm(now, grace),
                    true,
                ),
            },
            _ => return HostTransition::Unchanged,
        };

        self.phase = SessionPhase::AbandonmentWarning {
            terms,
            paused_remaining_seconds,
            watchdog,
        };
        HostTransition::Paused {
            paused_remaining_seconds,
            deadline: watchdog.deadline(),
            rearmed,
        }
    }

    fn return_to_foreground(&mut self, now: DateTime<Utc>) -> HostTransition {
        let SessionPhase::AbandonmentWarning {
            terms,
            paused_remaining_seconds,
            watchdog,
        } = self.phase
        else {
            return HostTransition::Unchanged;
        };

        if watchdog.expired(now) {
            let lost_stake = self.forfeit();
            return HostTransition::Forfeited { lost_stake };
        }

        self.phase = SessionPhase::PausedAwaitingReturn {
            terms,
            paused_remaining_seconds,
            watchdog: Some(watchdog),
        };
        HostTransition::ResumePrompt {
            paused_remaining_seconds,
            grace_remaining_ms: watchdog.remaining_ms(now),
        }
    }

    /// Compares the armed deadline against `now` without waiting for a poll.
    pub fn check_deadline(&mut self, now: DateTime<Utc>) -> DeadlineCheck {
        let Some(watchdog) = self.phase.watchdog() else {
            return DeadlineCheck::NotArmed;
        };

        if watchdog.expired(now) {
            let lost_stake = self.forfeit();
            DeadlineCheck::Forfeited { lost_stake }
        } else {
            DeadlineCheck::Remaining(watchdog.remaining_ms(now))
        }
    }

    pub fn resume(&mut self, now: DateTime<Utc>) -> Result<ResumeOutcome, SessionError> {
        let SessionPhase::PausedAwaitingReturn {
            terms,
            paused_remaining_seconds,
            watchdog,
        } = self.phase
        else {
            return Err(self.invalid("resume"));
        };

        if watchdog.is_some_and(|watchdog| watchdog.expired(now)) {
            let lost_stake = self.forfeit();
            return Ok(ResumeOutcome::Forfeited { lost_stake });
        }

        self.phase = SessionPhase::Running {
            terms,
            remaining_seconds: paused_remaining_seconds,
        };
        Ok(ResumeOutcome::Resumed {
            remaining_seconds: paused_remaining_seconds,
        })
    }

    /// Keeps the session paused and disarms the deadline.
    pub fn decline_resume(&mut self, now: DateTime<Utc>) -> Result<ResumeOutcome, SessionError> {
        let SessionPhase::PausedAwaitingReturn {
            terms,
            paused_remaining_seconds,
            watchdog,
        } = self.phase
        else {
            return Err(self.invalid("decline resuming"));
        };

        if watchdog.is_some_and(|watchdog| watchdog.expired(now)) {
            let lost_stake = self.forfeit();
            return Ok(ResumeOutcome::Forfeited { lost_stake });
        }

        self.phase = SessionPhase::PausedAwaitingReturn {
            terms,
            paused_remaining_seconds,
            watchdog: None,
        };
        Ok(ResumeOutcome::Declined {
            paused_remaining_seconds,
        })
    }

    pub fn claim_terms(&self) -> Result<SessionTerms, SessionError> {
        match &self.phase {
            SessionPhase::Completed { terms } => Ok(*terms),
            _ => Err(self.invalid("claim")),
        }
    }

    pub fn finish_claim(&mut self) -> Result<SessionTerms, SessionError> {
        let terms = self.claim_terms()?;
        self.reset();
        Ok(terms)
    }

    pub fn acknowledge_forfeit(&mut self) -> Result<f64, SessionError> {
        match self.phase {
            SessionPhase::Forfeited { lost_stake } => {
                self.reset();
                Ok(lost_stake)
            }
            _ => Err(self.invalid("acknowledge forfeiture")),
        }
    }

    fn forfeit(&mut self) -> f64 {
        let lost_stake = self
            .phase
            .terms()
            .map(|terms| terms.staked_amount)
            .unwrap_or(0.0);
        self.phase = SessionPhase::Forfeited { lost_stake };
        lost_stake
    }

    fn reset(&mut self) {
        self.id = None;
        self.phase = SessionPhase::Idle;
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> SessionSnapshot {
        let terms = self.phase.terms();
        let watchdog = self.phase.watchdog();
        let (remaining_seconds, paused_remaining_seconds) = match &self.phase {
            SessionPhase::Running {
                remaining_seconds, ..
            } => (Some(*remaining_seconds), None),
            SessionPhase::AbandonmentWarning {
                paused_remaining_seconds,
                ..
            }
            | SessionPhase::PausedAwaitingReturn {
                paused_remaining_seconds,
                ..
            } => (None, Some(*paused_remaining_seconds)),
            _ => (None, None),
        };
        let lost_stake = match &self.phase {
            SessionPhase::Forfeited { lost_stake } => Some(*lost_stake),
            _ => None,
        };

        SessionSnapshot {
            session_id: self.id.clone(),
            state: self.kind(),
            host: self.host,
            staked_amount: terms.map(|terms| terms.staked_amount),
            duration_seconds: terms.map(|terms| terms.duration_secs),
            computed_reward: terms.map(|terms| terms.reward),
            remaining_seconds,
            paused_remaining_seconds,
            abandonment_deadline: watchdog.map(|watchdog| watchdog.deadline()),
            grace_remaining_ms: watchdog.map(|watchdog| watchdog.remaining_ms(now)),
            lost_stake,
            pending: self.pending,
            notice: self.notice.clone(),
        }
    }
}

fn validate_stake(amount: f64, config: &FocusConfig) -> Result<(), SessionError> {
    if !amount.is_finite() {
        return Err(SessionError::NonFiniteStake);
    }
    if !config.stake.contains(amount) {
        return Err(SessionError::StakeOutOfRange {
            amount,
            min: config.stake.min,
            max: config.stake.max,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn grace() -> Duration {
        Duration::seconds(10)
    }

    fn running(stake: f64, duration_secs: u64, now: DateTime<Utc>) -> Session {
        let config = FocusConfig::default();
        let mut session = Session::new();
        session.select_duration(duration_secs, &config).unwrap();
        session.set_stake(stake, &config).unwrap();
        session.validate_start(&config).unwrap();
        assert_eq!(
            session.begin(now, grace()).unwrap(),
            DriverChange::Start(DriverKind::Countdown)
        );
        session
    }

    fn run_down_to(session: &mut Session, remaining: u64) {
        while let SessionPhase::Running {
            remaining_seconds, ..
        } = session.phase()
        {
            if *remaining_seconds == remaining {
                return;
            }
            session.tick();
        }
        panic!("session left Running before reaching {remaining}s");
    }

    #[test]
    fn configuring_previews_reward() {
        let config = FocusConfig::default();
        let mut session = Session::new();

        let terms = session.select_duration(5, &config).unwrap();
        assert_eq!(session.kind(), SessionStateKind::Configuring);
        assert_eq!(terms.staked_amount, config.stake.min);
        assert!(session.id().is_some());

        let terms = session.set_stake(2.0, &config).unwrap();
        assert!((terms.reward - 0.4).abs() < 1e-9);

        let terms = session.select_duration(15, &config).unwrap();
        assert_eq!(terms.staked_amount, 2.0);
        assert!((terms.reward - 2.0 * 3.0 * 0.2).abs() < 1e-9);
    }

    #[test]
    fn invalid_inputs_leave_state_untouched() {
        let config = FocusConfig::default();
        let mut session = Session::new();

        assert_eq!(
            session.select_duration(7, &config),
            Err(SessionError::InvalidDuration(7))
        );
        assert_eq!(session.kind(), SessionStateKind::Idle);

        session.select_duration(10, &config).unwrap();
        let before = session.phase().clone();
        assert_matches!(
            session.set_stake(6.0, &config),
            Err(SessionError::StakeOutOfRange { .. })
        );
        assert_eq!(session.set_stake(f64::NAN, &config), Err(SessionError::NonFiniteStake));
        assert_eq!(session.phase(), &before);
    }

    #[test]
    fn stake_requires_a_duration_first() {
        let config = FocusConfig::default();
        let mut session = Session::new();
        assert_matches!(
            session.set_stake(2.0, &config),
            Err(SessionError::InvalidTransition {
                state: SessionStateKind::Idle,
                ..
            })
        );
    }

    #[test]
    fn cancel_configuration_returns_to_idle() {
        let config = FocusConfig::default();
        let mut session = Session::new();
        session.select_duration(5, &config).unwrap();
        session.cancel_configuration().unwrap();
        assert_eq!(session.kind(), SessionStateKind::Idle);
        assert!(session.id().is_none());
    }

    #[test]
    fn countdown_completes_at_zero() {
        let now = Utc::now();
        let mut session = running(2.0, 5, now);

        let mut seen = Vec::new();
        loop {
            match session.tick() {
                TickOutcome::Remaining(remaining) => seen.push(remaining),
                TickOutcome::Completed(terms) => {
                    assert_eq!(terms.duration_secs, 5);
                    break;
                }
                TickOutcome::Ignored => panic!("tick ignored while running"),
            }
        }

        assert_eq!(seen, vec![4, 3, 2, 1]);
        assert_eq!(session.kind(), SessionStateKind::Completed);
        assert_eq!(session.tick(), TickOutcome::Ignored);
    }

    #[test]
    fn ticks_only_count_down_while_running() {
        let now = Utc::now();
        let mut session = running(2.0, 10, now);
        run_down_to(&mut session, 8);

        session.host_changed(HostState::Background, now, grace());
        for _ in 0..5 {
            assert_eq!(session.tick(), TickOutcome::Ignored);
        }
        assert_eq!(session.snapshot(now).paused_remaining_seconds, Some(8));
    }

    #[test]
    fn pause_and_resume_round_trip_keeps_remaining() {
        let now = Utc::now();
        let mut session = running(2.0, 10, now);
        run_down_to(&mut session, 8);

        let paused = session.host_changed(HostState::Background, now, grace());
        assert_matches!(
            paused,
            HostTransition::Paused {
                paused_remaining_seconds: 8,
                rearmed: true,
                ..
            }
        );
        assert_eq!(session.kind(), SessionStateKind::AbandonmentWarning);

        let back = now + Duration::seconds(4);
        assert_eq!(
            session.host_changed(HostState::Active, back, grace()),
            HostTransition::ResumePrompt {
                paused_remaining_seconds: 8,
                grace_remaining_ms: 6_000,
            }
        );
        assert_eq!(session.kind(), SessionStateKind::PausedAwaitingReturn);

        assert_eq!(
            session.resume(back).unwrap(),
            ResumeOutcome::Resumed {
                remaining_seconds: 8
            }
        );
        assert_eq!(session.snapshot(back).remaining_seconds, Some(8));
        assert_eq!(session.expected_driver(), Some(DriverKind::Countdown));
    }

    #[test]
    fn return_after_grace_forfeits_without_prompt() {
        let now = Utc::now();
        let mut session = running(3.0, 10, now);
        run_down_to(&mut session, 8);

        session.host_changed(HostState::Background, now, grace());
        let back = now + Duration::seconds(11);
        assert_eq!(
            session.host_changed(HostState::Active, back, grace()),
            HostTransition::Forfeited { lost_stake: 3.0 }
        );

        let snapshot = session.snapshot(back);
        assert_eq!(snapshot.state, SessionStateKind::Forfeited);
        assert_eq!(snapshot.staked_amount, None);
        assert_eq!(snapshot.lost_stake, Some(3.0));

        assert_eq!(session.acknowledge_forfeit().unwrap(), 3.0);
        assert_eq!(session.kind(), SessionStateKind::Idle);
    }

    #[test]
    fn deadline_check_forfeits_exactly_at_deadline() {
        let now = Utc::now();
        let mut session = running(2.0, 10, now);
        session.host_changed(HostState::Background, now, grace());

        assert_eq!(
            session.check_deadline(now + Duration::milliseconds(9_500)),
            DeadlineCheck::Remaining(500)
        );
        assert_eq!(
            session.check_deadline(now + Duration::seconds(10)),
            DeadlineCheck::Forfeited { lost_stake: 2.0 }
        );
        assert_eq!(session.check_deadline(now), DeadlineCheck::NotArmed);
    }

    #[test]
    fn inactive_is_not_leaving_foreground() {
        let now = Utc::now();
        let mut session = running(2.0, 10, now);

        assert_eq!(
            session.host_changed(HostState::Inactive, now, grace()),
            HostTransition::Unchanged
        );
        assert_eq!(session.kind(), SessionStateKind::Running);
        assert_eq!(session.host(), HostState::Inactive);

        assert_eq!(
            session.host_changed(HostState::Active, now, grace()),
            HostTransition::Unchanged
        );
        assert_eq!(session.kind(), SessionStateKind::Running);
    }

    #[test]
    fn backgrounding_again_before_answering_keeps_original_deadline() {
        let now = Utc::now();
        let mut session = running(2.0, 10, now);
        session.host_changed(HostState::Background, now, grace());
        session.host_changed(HostState::Active, now + Duration::seconds(3), grace());

        let again = session.host_changed(
            HostState::Background,
            now + Duration::seconds(5),
            grace(),
        );
        assert_eq!(
            again,
            HostTransition::Paused {
                paused_remaining_seconds: 10,
                deadline: now + Duration::seconds(10),
                rearmed: false,
            }
        );
        assert_eq!(again.driver_change(), DriverChange::Keep);

        assert_matches!(
            session.host_changed(HostState::Active, now + Duration::seconds(10), grace()),
            HostTransition::Forfeited { .. }
        );
    }

    #[test]
    fn prompt_left_unanswered_past_deadline_forfeits_on_resume() {
        let now = Utc::now();
        let mut session = running(2.0, 10, now);
        session.host_changed(HostState::Background, now, grace());
        session.host_changed(HostState::Active, now + Duration::seconds(2), grace());

        assert_eq!(
            session.resume(now + Duration::seconds(12)).unwrap(),
            ResumeOutcome::Forfeited { lost_stake: 2.0 }
        );
    }

    #[test]
    fn declining_disarms_and_keeps_session_paused() {
        let now = Utc::now();
        let mut session = running(2.0, 10, now);
        session.host_changed(HostState::Background, now, grace());
        session.host_changed(HostState::Active, now + Duration::seconds(2), grace());

        let declined = session.decline_resume(now + Duration::seconds(2)).unwrap();
        assert_eq!(
            declined,
            ResumeOutcome::Declined {
                paused_remaining_seconds: 10
            }
        );
        assert_eq!(declined.driver_change(), DriverChange::Stop);
        assert_eq!(session.expected_driver(), None);

        // Long after the old deadline, still paused and resumable.
        let later = now + Duration::minutes(5);
        assert_eq!(session.check_deadline(later), DeadlineCheck::NotArmed);
        assert_eq!(
            session.resume(later).unwrap(),
            ResumeOutcome::Resumed {
                remaining_seconds: 10
            }
        );
    }

    #[test]
    fn backgrounding_a_declined_session_arms_a_fresh_deadline() {
        let now = Utc::now();
        let mut session = running(2.0, 10, now);
        session.host_changed(HostState::Background, now, grace());
        session.host_changed(HostState::Active, now, grace());
        session.decline_resume(now).unwrap();

        let later = now + Duration::minutes(1);
        assert_eq!(
            session.host_changed(HostState::Background, later, grace()),
            HostTransition::Paused {
                paused_remaining_seconds: 10,
                deadline: later + grace(),
                rearmed: true,
            }
        );
    }

    #[test]
    fn begin_while_backgrounded_enters_grace_period() {
        let config = FocusConfig::default();
        let now = Utc::now();
        let mut session = Session::new();
        session.select_duration(10, &config).unwrap();
        session.host_changed(HostState::Background, now, grace());

        assert_eq!(
            session.begin(now, grace()).unwrap(),
            DriverChange::Start(DriverKind::Watchdog)
        );
        assert_eq!(session.kind(), SessionStateKind::AbandonmentWarning);
        assert_eq!(session.snapshot(now).paused_remaining_seconds, Some(10));
    }

    #[test]
    fn begin_under_transient_host_state_starts_counting() {
        let config = FocusConfig::default();
        let now = Utc::now();

        for host in [HostState::Inactive, HostState::Unknown] {
            let mut session = Session::new();
            session.select_duration(10, &config).unwrap();
            session.host_changed(host, now, grace());

            assert_eq!(
                session.begin(now, grace()).unwrap(),
                DriverChange::Start(DriverKind::Countdown)
            );
            assert_eq!(session.kind(), SessionStateKind::Running);
            assert_eq!(
                session.check_deadline(now + Duration::seconds(10)),
                DeadlineCheck::NotArmed
            );
        }
    }

    #[test]
    fn at_most_one_driver_is_expected_in_every_phase() {
        let now = Utc::now();
        let mut session = running(2.0, 10, now);
        assert_eq!(session.expected_driver(), Some(DriverKind::Countdown));

        session.host_changed(HostState::Background, now, grace());
        assert_eq!(session.expected_driver(), Some(DriverKind::Watchdog));

        session.host_changed(HostState::Active, now, grace());
        assert_eq!(session.expected_driver(), Some(DriverKind::Watchdog));

        session.resume(now).unwrap();
        assert_eq!(session.expected_driver(), Some(DriverKind::Countdown));

        run_down_to(&mut session, 1);
        session.tick();
        assert_eq!(session.kind(), SessionStateKind::Completed);
        assert_eq!(session.expected_driver(), None);
    }

    #[test]
    fn claim_only_from_completed_and_clears_terms() {
        let now = Utc::now();
        let mut session = running(4.0, 15, now);
        assert_matches!(
            session.claim_terms(),
            Err(SessionError::InvalidTransition { .. })
        );

        run_down_to(&mut session, 1);
        session.tick();
        let terms = session.claim_terms().unwrap();
        assert!((terms.payout() - (4.0 + 1.2)).abs() < 1e-9);

        session.finish_claim().unwrap();
        let snapshot = session.snapshot(now);
        assert_eq!(snapshot.state, SessionStateKind::Idle);
        assert_eq!(snapshot.session_id, None);
        assert_eq!(snapshot.computed_reward, None);
    }

    #[test]
    fn pending_action_blocks_second_submission() {
        let config = FocusConfig::default();
        let mut session = Session::new();
        session.select_duration(5, &config).unwrap();

        session.begin_pending(PendingAction::Staking).unwrap();
        assert_eq!(
            session.begin_pending(PendingAction::Staking),
            Err(SessionError::ActionPending)
        );
        assert_eq!(
            session.set_stake(2.0, &config),
            Err(SessionError::ActionPending)
        );

        session.clear_pending();
        assert!(session.set_stake(2.0, &config).is_ok());
    }
}

use std::{future::Future, sync::Arc};

use tokio::sync::{broadcast, watch, Mutex};
use tokio_util::sync::CancellationToken;

use crate::{
    clock::Clock,
    config::FocusConfig,
    error::{ErrorKind, SessionError, WalletError},
    models::{HostState, Notice, PendingAction, SessionEvent, SessionSnapshot},
    wallet::{BalanceCache, ClaimKind, TxHandle, Wallet},
};

use super::{
    countdown::spawn_countdown,
    state::{
        DeadlineCheck, DriverChange, DriverKind, HostTransition, ResumeOutcome, Session,
        SessionTerms,
    },
    task::ScheduledTask,
    watchdog::spawn_watchdog,
};

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

const EVENT_CAPACITY: usize = 64;

struct ActiveDriver {
    kind: DriverKind,
    task: ScheduledTask,
}

pub(crate) struct ControllerInner {
    pub(crate) session: Mutex<Session>,
    driver: Mutex<Option<ActiveDriver>>,
    listener: Mutex<Option<ScheduledTask>>,
    wallet: Arc<dyn Wallet>,
    balance: BalanceCache,
    pub(crate) clock: Arc<dyn Clock>,
    config: FocusConfig,
    address: String,
    events: broadcast::Sender<SessionEvent>,
    pub(crate) shutdown: CancellationToken,
}

impl ControllerInner {
    pub(crate) fn emit(&self, event: SessionEvent) {
        // No subscribers is fine; the snapshot stays queryable.
        let _ = self.events.send(event);
    }
}

impl Drop for ControllerInner {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Owns the focus session and the callbacks that drive it.
///
/// Cloning is cheap; every clone drives the same session. Only one repeating
/// callback (countdown or watchdog poller) exists at a time because both live
/// in the same slot, and replacing or clearing the slot aborts the previous one.
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<ControllerInner>,
}

impl SessionController {
    pub fn new(
        config: FocusConfig,
        wallet: Arc<dyn Wallet>,
        clock: Arc<dyn Clock>,
        address: impl Into<String>,
    ) -> Self {
        let address = address.into();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let balance = BalanceCache::new(wallet.clone(), address.clone(), config.balance_debounce());

        Self {
            inner: Arc::new(ControllerInner {
                session: Mutex::new(Session::new()),
                driver: Mutex::new(None),
                listener: Mutex::new(None),
                wallet,
                balance,
                clock,
                config,
                address,
                events,
                shutdown: CancellationToken::new(),
            }),
        }
    }

    pub fn config(&self) -> &FocusConfig {
        &self.inner.config
    }

    pub fn address(&self) -> &str {
        &self.inner.address
    }

    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let session = self.inner.session.lock().await;
        session.snapshot(self.inner.clock.now())
    }

    /// The repeating callback currently alive, if any.
    pub async fn active_driver(&self) -> Option<DriverKind> {
        self.inner
            .driver
            .lock()
            .await
            .as_ref()
            .filter(|driver| !driver.task.is_finished())
            .map(|driver| driver.kind)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    pub async fn select_duration(&self, duration_secs: u64) -> Result<SessionSnapshot, SessionError> {
        self.ensure_open()?;
        let mut session = self.inner.session.lock().await;
        match session.select_duration(duration_secs, &self.inner.config) {
            Ok(terms) => {
                log_info!(
                    "configuring {}s session, reward preview {}",
                    terms.duration_secs,
                    terms.reward
                );
                Ok(self.publish_state(&session))
            }
            Err(err) => Err(self.reject(&mut session, err)),
        }
    }

    pub async fn set_stake(&self, amount: f64) -> Result<SessionSnapshot, SessionError> {
        self.ensure_open()?;
        let mut session = self.inner.session.lock().await;
        match session.set_stake(amount, &self.inner.config) {
            Ok(_) => Ok(self.publish_state(&session)),
            Err(err) => Err(self.reject(&mut session, err)),
        }
    }

    pub async fn cancel_configuration(&self) -> Result<SessionSnapshot, SessionError> {
        self.ensure_open()?;
        let mut session = self.inner.session.lock().await;
        session.cancel_configuration()?;
        Ok(self.publish_state(&session))
    }

    /// Validates the configured terms, commits the stake through the wallet and
    /// starts the countdown. Nothing changes if validation or the wallet fails.
    pub async fn start_session(&self) -> Result<SessionSnapshot, SessionError> {
        self.ensure_open()?;
        let terms = {
            let mut session = self.inner.session.lock().await;
            let terms = match session.validate_start(&self.inner.config) {
                Ok(terms) => terms,
                Err(err) => return Err(self.reject(&mut session, err)),
            };
            session.begin_pending(PendingAction::Staking)?;
            self.publish_state(&session);
            terms
        };

        let this = self.clone();
        detached("stake", async move { this.commit_stake(terms).await }).await
    }

    async fn commit_stake(&self, terms: SessionTerms) -> Result<SessionSnapshot, SessionError> {
        let staked = self.reduce_balance(&terms).await;

        let mut session = self.inner.session.lock().await;
        session.clear_pending();
        let tx = match staked {
            Ok(tx) => tx,
            Err(err) => {
                let err = self.reject(&mut session, err);
                self.publish_state(&session);
                return Err(err);
            }
        };

        if self.inner.shutdown.is_cancelled() {
            log_warn!("stake {} committed after shutdown; session not started", tx);
            session.set_notice(Notice {
                kind: ErrorKind::External,
                message: format!("stake committed after shutdown ({tx}); session not started"),
            });
            return Err(SessionError::Closed);
        }

        let now = self.inner.clock.now();
        let change = match session.begin(now, self.inner.config.grace_period()) {
            Ok(change) => change,
            Err(err) => {
                log_error!("stake {} committed but session could not start: {}", tx, err);
                return Err(err);
            }
        };
        self.apply_driver(&mut session, change).await;
        self.inner.balance.invalidate().await;

        log_info!(
            "session {} started: {} staked for {}s ({})",
            session.id().unwrap_or("-"),
            terms.staked_amount,
            terms.duration_secs,
            tx
        );
        self.inner.emit(SessionEvent::Staked {
            amount: terms.staked_amount,
            tx,
        });
        Ok(self.publish_state(&session))
    }

    async fn reduce_balance(&self, terms: &SessionTerms) -> Result<TxHandle, SessionError> {
        let balance = self
            .inner
            .balance
            .refresh_now()
            .await
            .map_err(|source| SessionError::External {
                action: "balance check",
                source,
            })?;
        if terms.staked_amount > balance {
            return Err(SessionError::InsufficientBalance {
                stake: terms.staked_amount,
                balance,
            });
        }

        self.inner
            .wallet
            .reduce_balance(&self.inner.address, terms.staked_amount)
            .await
            .map_err(|source| SessionError::External {
                action: "stake",
                source,
            })
    }

    /// Pays out a completed session. A second claim while the first is in
    /// flight is refused without reaching the wallet.
    pub async fn claim(&self, kind: ClaimKind) -> Result<TxHandle, SessionError> {
        self.ensure_open()?;
        let terms = {
            let mut session = self.inner.session.lock().await;
            let terms = session.claim_terms()?;
            session.begin_pending(PendingAction::Claiming)?;
            self.publish_state(&session);
            terms
        };

        let this = self.clone();
        detached("claim", async move { this.commit_claim(kind, terms).await }).await
    }

    async fn commit_claim(&self, kind: ClaimKind, terms: SessionTerms) -> Result<TxHandle, SessionError> {
        let amount = terms.payout();
        let result = self
            .inner
            .wallet
            .claim(kind, &self.inner.address, amount)
            .await;

        let mut session = self.inner.session.lock().await;
        session.clear_pending();
        match result {
            Ok(tx) => {
                session.finish_claim()?;
                self.apply_driver(&mut session, DriverChange::Stop).await;
                self.inner.balance.invalidate().await;
                log_info!("claimed {} as {:?} ({})", amount, kind, tx);
                self.inner.emit(SessionEvent::Claimed {
                    kind,
                    amount,
                    tx: tx.clone(),
                });
                self.publish_state(&session);
                Ok(tx)
            }
            Err(source) => {
                let err = self.reject(
                    &mut session,
                    SessionError::External {
                        action: "claim",
                        source,
                    },
                );
                self.publish_state(&session);
                Err(err)
            }
        }
    }

    /// Applies a host lifecycle notification.
    pub async fn handle_host_state(&self, next: HostState) -> Result<SessionSnapshot, SessionError> {
        self.ensure_open()?;
        let mut session = self.inner.session.lock().await;
        let now = self.inner.clock.now();
        let transition = session.host_changed(next, now, self.inner.config.grace_period());
        self.apply_driver(&mut session, transition.driver_change()).await;

        match transition {
            HostTransition::Unchanged => return Ok(session.snapshot(now)),
            HostTransition::Paused {
                paused_remaining_seconds,
                deadline,
                rearmed,
            } => {
                log_info!(
                    "host left foreground with {}s remaining; forfeits at {} (rearmed: {})",
                    paused_remaining_seconds,
                    deadline,
                    rearmed
                );
            }
            HostTransition::ResumePrompt {
                paused_remaining_seconds,
                grace_remaining_ms,
            } => {
                log_info!(
                    "host returned with {}ms of grace left; prompting to resume",
                    grace_remaining_ms
                );
                self.inner.emit(SessionEvent::ResumePrompt {
                    paused_remaining_seconds,
                    grace_remaining_ms,
                });
            }
            HostTransition::Forfeited { lost_stake } => {
                log_warn!("host returned after the grace period; forfeited {}", lost_stake);
                self.inner.emit(SessionEvent::Forfeited { lost_stake });
            }
        }
        Ok(self.publish_state(&session))
    }

    /// Forwards every value published on `host` until the sender goes away or
    /// the controller shuts down. A new subscription replaces the previous one.
    pub async fn subscribe_host(&self, mut host: watch::Receiver<HostState>) -> Result<(), SessionError> {
        self.ensure_open()?;
        let initial = *host.borrow_and_update();
        self.handle_host_state(initial).await?;

        let weak = Arc::downgrade(&self.inner);
        let cancel = self.inner.shutdown.clone();
        let task = ScheduledTask::spawn(async move {
            loop {
                tokio::select! {
                    changed = host.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    _ = cancel.cancelled() => break,
                }

                let next = *host.borrow_and_update();
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let controller = SessionController { inner };
                if let Err(err) = controller.handle_host_state(next).await {
                    log_error!("failed to apply host state {}: {}", next, err);
                    break;
                }
            }
        });

        *self.inner.listener.lock().await = Some(task);
        Ok(())
    }

    /// Re-checks the grace deadline right away and makes sure the callback the
    /// current phase needs is alive. Call after the UI re-attaches, since a
    /// suspended process may have lost its timers.
    pub async fn revalidate(&self) -> Result<SessionSnapshot, SessionError> {
        self.ensure_open()?;
        let mut session = self.inner.session.lock().await;
        let now = self.inner.clock.now();

        if let DeadlineCheck::Forfeited { lost_stake } = session.check_deadline(now) {
            log_warn!("grace period elapsed while detached; forfeited {}", lost_stake);
            self.apply_driver(&mut session, DriverChange::Stop).await;
            self.inner.emit(SessionEvent::Forfeited { lost_stake });
            return Ok(self.publish_state(&session));
        }

        let expected = session.expected_driver();
        let active = self.active_driver().await;
        if expected != active {
            log_info!("restoring driver {:?} (was {:?})", expected, active);
            let change = match expected {
                Some(kind) => DriverChange::Start(kind),
                None => DriverChange::Stop,
            };
            self.apply_driver(&mut session, change).await;
        }
        Ok(session.snapshot(now))
    }

    pub async fn resume(&self) -> Result<SessionSnapshot, SessionError> {
        self.ensure_open()?;
        let mut session = self.inner.session.lock().await;
        let outcome = session.resume(self.inner.clock.now())?;
        self.settle_prompt(&mut session, outcome).await;
        Ok(self.publish_state(&session))
    }

    pub async fn decline_resume(&self) -> Result<SessionSnapshot, SessionError> {
        self.ensure_open()?;
        let mut session = self.inner.session.lock().await;
        let outcome = session.decline_resume(self.inner.clock.now())?;
        self.settle_prompt(&mut session, outcome).await;
        Ok(self.publish_state(&session))
    }

    async fn settle_prompt(&self, session: &mut Session, outcome: ResumeOutcome) {
        self.apply_driver(session, outcome.driver_change()).await;
        match outcome {
            ResumeOutcome::Resumed { remaining_seconds } => {
                log_info!("resumed with {}s remaining", remaining_seconds);
            }
            ResumeOutcome::Declined {
                paused_remaining_seconds,
            } => {
                log_info!("resume declined; holding at {}s", paused_remaining_seconds);
            }
            ResumeOutcome::Forfeited { lost_stake } => {
                log_warn!("answered after the grace period; forfeited {}", lost_stake);
                self.inner.emit(SessionEvent::Forfeited { lost_stake });
            }
        }
    }

    pub async fn acknowledge_forfeit(&self) -> Result<SessionSnapshot, SessionError> {
        self.ensure_open()?;
        let mut session = self.inner.session.lock().await;
        let lost_stake = session.acknowledge_forfeit()?;
        self.apply_driver(&mut session, DriverChange::Stop).await;
        log_info!("forfeiture of {} acknowledged", lost_stake);
        Ok(self.publish_state(&session))
    }

    pub async fn dismiss_notice(&self) -> Result<SessionSnapshot, SessionError> {
        self.ensure_open()?;
        let mut session = self.inner.session.lock().await;
        if session.dismiss_notice().is_some() {
            return Ok(self.publish_state(&session));
        }
        Ok(session.snapshot(self.inner.clock.now()))
    }

    /// Debounced balance read for display.
    pub async fn refresh_balance(&self) -> Result<f64, SessionError> {
        self.ensure_open()?;
        self.inner
            .balance
            .refresh()
            .await
            .map_err(|source| SessionError::External {
                action: "balance refresh",
                source,
            })
    }

    /// Teardown: cancels every callback and the host subscription. Later
    /// commands fail with [`SessionError::Closed`].
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        self.inner.driver.lock().await.take();
        self.inner.listener.lock().await.take();
        log_info!("session controller shut down");
    }

    fn ensure_open(&self) -> Result<(), SessionError> {
        if self.inner.shutdown.is_cancelled() {
            return Err(SessionError::Closed);
        }
        Ok(())
    }

    async fn apply_driver(&self, session: &mut Session, change: DriverChange) {
        let mut slot = self.inner.driver.lock().await;
        match change {
            DriverChange::Keep => {}
            DriverChange::Stop => {
                session.bump_generation();
                slot.take();
            }
            DriverChange::Start(_) if self.inner.shutdown.is_cancelled() => {
                session.bump_generation();
                slot.take();
            }
            DriverChange::Start(kind) => {
                let generation = session.bump_generation();
                let weak = Arc::downgrade(&self.inner);
                let period = self.inner.config.tick_interval();
                let task = match kind {
                    DriverKind::Countdown => spawn_countdown(weak, generation, period),
                    DriverKind::Watchdog => spawn_watchdog(weak, generation, period),
                };
                // Assigning drops (and aborts) whatever ran before.
                *slot = task.map(|task| ActiveDriver { kind, task });
            }
        }
    }

    /// Surfaces validation and wallet failures as a dismissible notice.
    fn reject(&self, session: &mut Session, err: SessionError) -> SessionError {
        match err.kind() {
            ErrorKind::Validation | ErrorKind::External => {
                log_warn!("{}", err);
                let notice = Notice {
                    kind: err.kind(),
                    message: err.to_string(),
                };
                session.set_notice(notice.clone());
                self.inner.emit(SessionEvent::Notice { notice });
            }
            ErrorKind::Rejected => {}
        }
        err
    }

    fn publish_state(&self, session: &Session) -> SessionSnapshot {
        let snapshot = session.snapshot(self.inner.clock.now());
        self.inner.emit(SessionEvent::StateChanged {
            snapshot: snapshot.clone(),
        });
        snapshot
    }
}

/// Runs a wallet round-trip on its own task so the pending guard is always
/// released, even when the caller stops waiting.
async fn detached<T, F>(action: &'static str, work: F) -> Result<T, SessionError>
where
    T: Send + 'static,
    F: Future<Output = Result<T, SessionError>> + Send + 'static,
{
    match tokio::spawn(work).await {
        Ok(result) => result,
        Err(join_err) => Err(SessionError::External {
            action,
            source: WalletError::Unavailable(join_err.to_string()),
        }),
    }
}

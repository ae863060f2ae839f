//! Bot Engine - main orchestration loop
//!
//! One engine drives one account through `INIT -> ACTIVE <-> RECOVERING ->
//! STOPPED`. Each tick syncs the account, refreshes the farm list when due,
//! runs the construction, training and adventure policies, then a raid cycle,
//! and sleeps until the next tick. Every sleep is cut short by a stop request.

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info_span, Instrument};
use uuid::Uuid;

use crate::advisor::TargetAdvisor;
use crate::config::{EngineConfig, SecsRange};
use crate::error::{EngineError, GameResult};
use crate::farming::{FarmCandidate, FarmingManager};
use crate::game::GameInterface;
use crate::policy::adventure::{self, AdventureAction, AdventureOutcome, CooldownKind};
use crate::policy::construction::{self, ConstructionPlan, GoalCheck};
use crate::policy::training;
use crate::report::{Observer, Reporter};
use crate::shutdown::{stop_channel, StopHandle, StopSignal};
use crate::timer::{Clock, CooldownTimer};
use crate::types::Account;

/// Lifecycle state of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineStatus {
    Init,
    Active,
    Recovering,
    Stopped,
}

impl fmt::Display for EngineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineStatus::Init => write!(f, "init"),
            EngineStatus::Active => write!(f, "active"),
            EngineStatus::Recovering => write!(f, "recovering"),
            EngineStatus::Stopped => write!(f, "stopped"),
        }
    }
}

/// Why [`BotEngine::run`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// A stop was requested through the handle
    Requested,
    /// The session could not be (re-)established
    LoginFailed,
}

/// Thread-safe view of a running engine
#[derive(Debug, Clone)]
pub struct EngineHandle {
    stop: StopHandle,
    status: watch::Receiver<EngineStatus>,
    account: watch::Receiver<Account>,
}

impl EngineHandle {
    /// Ask the engine to stop at the next phase boundary or sleep
    pub fn stop(&self) {
        self.stop.stop();
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop.is_stopped()
    }

    pub fn status(&self) -> EngineStatus {
        *self.status.borrow()
    }

    /// The account as of the last completed sync
    pub fn account_snapshot(&self) -> Account {
        self.account.borrow().clone()
    }

    /// Resolves once the engine reached [`EngineStatus::Stopped`]
    pub async fn stopped(&self) {
        let mut status = self.status.clone();
        let _ = status.wait_for(|s| *s == EngineStatus::Stopped).await;
    }
}

pub struct BotEngine<G: GameInterface> {
    game: G,
    account: Account,
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    reporter: Reporter,
    farming: FarmingManager,
    advisor: Option<Box<dyn TargetAdvisor>>,
    adventure_timer: CooldownTimer,
    advisor_timer: CooldownTimer,
    rng: StdRng,
    stop_handle: StopHandle,
    stop: StopSignal,
    status_tx: watch::Sender<EngineStatus>,
    account_tx: watch::Sender<Account>,
    /// Whether `close` is owed to the game
    session_open: bool,
    run_id: Uuid,
}

impl<G: GameInterface> BotEngine<G> {
    pub fn new(
        game: G,
        account: Account,
        config: EngineConfig,
        clock: Arc<dyn Clock>,
        observer: Option<Arc<dyn Observer>>,
    ) -> Self {
        let reporter = Reporter::new(observer);
        let farming = FarmingManager::new(config.farming, clock.clone(), reporter.clone());
        let rng = match config.farming.shuffle_seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(1)),
            None => StdRng::from_entropy(),
        };
        let (stop_handle, stop) = stop_channel();
        let (status_tx, _) = watch::channel(EngineStatus::Init);
        let (account_tx, _) = watch::channel(account.clone());

        Self {
            game,
            account,
            config,
            clock,
            reporter,
            farming,
            advisor: None,
            adventure_timer: CooldownTimer::new("adventure"),
            advisor_timer: CooldownTimer::new("advisor_refresh"),
            rng,
            stop_handle,
            stop,
            status_tx,
            account_tx,
            session_open: false,
            run_id: Uuid::new_v4(),
        }
    }

    /// Attach a target advisor; without one the farm list only changes
    /// through [`BotEngine::set_farm_list`]
    pub fn with_advisor(mut self, advisor: Box<dyn TargetAdvisor>) -> Self {
        self.advisor = Some(advisor);
        self
    }

    pub fn handle(&self) -> EngineHandle {
        EngineHandle {
            stop: self.stop_handle.clone(),
            status: self.status_tx.subscribe(),
            account: self.account_tx.subscribe(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Replace the farm list, validated against the current account
    pub fn set_farm_list(&mut self, candidates: Vec<FarmCandidate>) -> usize {
        self.farming.set_farm_list(candidates, &self.account)
    }

    /// Run until stopped or the session is lost for good. The session is
    /// closed before this returns.
    pub async fn run(mut self) -> StopReason {
        let span = info_span!("engine", run_id = %self.run_id, account = %self.account.username);
        async move {
            self.reporter.info("Engine starting");

            let reason = match self.establish_session().await {
                Ok(()) => {
                    let first_check = self.sample(self.config.adventure.initial_cooldown);
                    self.adventure_timer.mark_triggered(self.clock.now(), first_check);
                    self.set_status(EngineStatus::Active);
                    self.main_loop().await
                }
                Err(EngineError::Stopped) => StopReason::Requested,
                Err(e) => {
                    self.reporter.error(format!("{}", e));
                    StopReason::LoginFailed
                }
            };

            self.shutdown().await;
            self.set_status(EngineStatus::Stopped);
            reason
        }
        .instrument(span)
        .await
    }

    async fn main_loop(&mut self) -> StopReason {
        loop {
            if self.stop.is_stopped() {
                return StopReason::Requested;
            }

            let started = self.clock.now();
            match self.tick().await {
                Ok(()) => {}
                Err(EngineError::Stopped) => return StopReason::Requested,
                Err(e @ EngineError::FatalLogin { .. }) => {
                    self.reporter.error(format!("{}", e));
                    return StopReason::LoginFailed;
                }
                Err(EngineError::Game(e)) => {
                    let pause = if e.is_session_loss() {
                        self.close_session().await;
                        self.set_status(EngineStatus::Recovering);
                        Duration::from_secs(self.config.tick.driver_error_pause_secs)
                    } else {
                        Duration::from_secs(self.config.tick.error_pause_secs)
                    };
                    self.reporter.error(format!(
                        "Tick aborted: {}. Pausing for {}s",
                        e,
                        pause.as_secs()
                    ));
                    if !self.stop.sleep(pause).await {
                        return StopReason::Requested;
                    }
                    continue;
                }
            }

            let elapsed = self.clock.now().saturating_duration_since(started);
            let delay = self
                .sample(self.config.tick.interval)
                .saturating_sub(elapsed);
            self.reporter.info(format!(
                "Tick finished in {}s, next tick in {}s",
                elapsed.as_secs(),
                delay.as_secs()
            ));
            if !self.stop.sleep(delay).await {
                return StopReason::Requested;
            }
        }
    }

    async fn tick(&mut self) -> Result<(), EngineError> {
        self.ensure_session().await?;

        // Only village discovery fails here without losing the session;
        // the main loop pauses for `error_pause_secs` before retrying
        self.sync_state().await?;
        self.checkpoint()?;

        self.refresh_farm_list().await?;
        self.checkpoint()?;

        self.run_construction().await?;
        self.phase_pause().await?;
        self.run_training().await?;
        self.phase_pause().await?;
        self.run_adventure().await?;
        self.phase_pause().await?;

        let summary = self
            .farming
            .run_raid_cycle(&mut self.game, &self.account, &mut self.stop)
            .await?;
        debug!("Raid cycle summary: {:?}", summary);
        Ok(())
    }

    async fn ensure_session(&mut self) -> Result<(), EngineError> {
        if self.session_open && self.game.is_session_active() {
            return Ok(());
        }
        self.set_status(EngineStatus::Recovering);
        self.reporter
            .warn("Game session is not active, logging in again");
        self.establish_session().await?;
        self.set_status(EngineStatus::Active);
        Ok(())
    }

    async fn establish_session(&mut self) -> Result<(), EngineError> {
        let attempts = self.config.session.max_login_attempts;
        let retry_delay = Duration::from_secs(self.config.session.login_retry_delay_secs);
        let mut last_error = String::from("no login attempt made");

        for attempt in 1..=attempts {
            self.checkpoint()?;
            self.reporter
                .info(format!("Logging in (attempt {}/{})", attempt, attempts));
            self.session_open = true;

            match self.game.login().await {
                Ok(()) => {
                    self.reporter.info("Logged in");
                    return Ok(());
                }
                Err(e) => {
                    self.reporter.warn(format!("Login attempt {} failed: {}", attempt, e));
                    last_error = e.to_string();
                }
            }

            if attempt < attempts && !self.stop.sleep(retry_delay).await {
                return Err(EngineError::Stopped);
            }
        }

        Err(EngineError::FatalLogin {
            attempts,
            last_error,
        })
    }

    /// Refresh every village and the hero. Entities that cannot be read keep
    /// their cached values.
    async fn sync_state(&mut self) -> GameResult<()> {
        if self.account.villages.is_empty() {
            self.reporter.info("No villages known yet, reading them from the game");
            for village in self.game.discover_villages().await? {
                if !self.account.add_village(village) {
                    self.reporter.warn("Game reported the same village twice");
                }
            }
            if self.account.villages.is_empty() {
                self.reporter.warn("The account has no villages");
            }
        }

        for id in self.account.village_ids() {
            let resources = self.game.sync_village_resources(&id).await;
            let resources = self.absorb("resources", &id, resources)?;
            let buildings = self.game.sync_buildings(&id).await;
            let buildings = self.absorb("buildings", &id, buildings)?;
            let queue = self.game.sync_building_queue(&id).await;
            let queue = self.absorb("building queue", &id, queue)?;
            let troops = self.game.sync_troops(&id).await;
            let troops = self.absorb("troops", &id, troops)?;

            let Some(village) = self.account.village_mut(&id) else {
                continue;
            };
            match resources {
                Some(Some(snapshot)) => village.apply_resources(snapshot),
                Some(None) => self
                    .reporter
                    .warn(format!("Resource bar of village {} could not be read", id)),
                None => {}
            }
            if let Some(buildings) = buildings {
                village.buildings = buildings;
            }
            if let Some(queue) = queue {
                village.building_queue = queue;
            }
            if let Some(troops) = troops {
                village.troops_home = troops;
            }
            debug!(
                "Synced '{}': {} buildings, {} queued, {} troops at home",
                village.name,
                village.buildings.len(),
                village.active_constructions(),
                village.total_troops()
            );
        }

        match self.game.sync_hero().await {
            Ok(Some(hero)) => self.account.hero = Some(hero),
            Ok(None) => debug!("Hero status unavailable, keeping cached value"),
            Err(e) if e.is_session_loss() => return Err(e),
            Err(e) => self.reporter.warn(format!("Could not sync hero: {}", e)),
        }

        self.publish_account();
        Ok(())
    }

    fn absorb<T>(&self, what: &str, village_id: &str, result: GameResult<T>) -> GameResult<Option<T>> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_session_loss() => Err(e),
            Err(e) => {
                self.reporter.warn(format!(
                    "Could not sync {} of village {}: {}",
                    what, village_id, e
                ));
                Ok(None)
            }
        }
    }

    /// Full sync after a successful command
    async fn resync(&mut self) -> Result<(), EngineError> {
        match self.sync_state().await {
            Ok(()) => Ok(()),
            Err(e) if e.is_session_loss() => Err(e.into()),
            Err(e) => {
                self.reporter.warn(format!("Resync after command failed: {}", e));
                Ok(())
            }
        }
    }

    async fn refresh_farm_list(&mut self) -> Result<(), EngineError> {
        let now = self.clock.now();
        if self.advisor.is_none() || !self.advisor_timer.is_eligible(now) {
            return Ok(());
        }
        self.advisor_timer
            .mark_triggered(now, self.config.farming.advisor_refresh());

        let Some(primary) = self.account.primary_village() else {
            self.reporter.warn("No villages, cannot refresh the farm list");
            return Ok(());
        };
        let village_id = primary.id.clone();
        let troops = primary.troops_home.clone();

        self.reporter.info("Refreshing farm list from the advisor");
        let nearby = match self
            .game
            .fetch_nearby_targets(&village_id, self.config.farming.nearby_radius)
            .await
        {
            Ok(nearby) => nearby,
            Err(e) if e.is_session_loss() => return Err(e.into()),
            Err(e) => {
                self.reporter
                    .warn(format!("Could not read the map around village {}: {}", village_id, e));
                return Ok(());
            }
        };
        if nearby.is_empty() {
            self.reporter.info("No nearby villages found");
            return Ok(());
        }

        let suggestions = match self.advisor.as_mut() {
            Some(advisor) => advisor.suggest_targets(&nearby, &troops).await,
            None => Vec::new(),
        };
        if suggestions.is_empty() {
            self.reporter.info(format!(
                "No advisor suggestions, keeping the current farm list ({} targets)",
                self.farming.targets().len()
            ));
            return Ok(());
        }

        self.farming.set_farm_list(suggestions, &self.account);
        Ok(())
    }

    async fn run_construction(&mut self) -> Result<(), EngineError> {
        for id in self.account.village_ids() {
            self.checkpoint()?;
            let goals = self.config.construction.goals_for(&id).to_vec();
            let Some(village) = self.account.village(&id) else {
                continue;
            };
            let village_name = village.name.clone();

            let checks = match construction::plan(village, &goals, self.config.construction.max_concurrent) {
                ConstructionPlan::QueueFull { active, limit } => {
                    self.reporter.info(format!(
                        "Construction queue of '{}' is busy ({}/{}), skipping",
                        village_name, active, limit
                    ));
                    continue;
                }
                ConstructionPlan::Checks(checks) => checks,
            };

            for check in checks {
                match check {
                    GoalCheck::MissingSlot { goal } => self.reporter.warn(format!(
                        "Build goal {} has no slot, skipping",
                        goal.name
                    )),
                    GoalCheck::Conflict { goal, slot, found } => self.reporter.warn(format!(
                        "Slot {} in '{}' holds {} instead of {}, skipping",
                        slot, village_name, found, goal.name
                    )),
                    GoalCheck::Reached { goal, level } => debug!(
                        "{} in '{}' already at level {} (target {})",
                        goal.name, village_name, level, goal.target_level
                    ),
                    GoalCheck::Eligible {
                        goal,
                        slot,
                        current_level,
                    } => {
                        self.reporter.info(format!(
                            "Upgrading {} in '{}' slot {} (level {} -> {})",
                            goal.name,
                            village_name,
                            slot,
                            current_level,
                            current_level + 1
                        ));
                        match self.game.start_building_upgrade(&goal.name, slot, &id).await {
                            Ok(()) => {
                                self.reporter.info(format!("Upgrade of {} started", goal.name));
                                self.resync().await?;
                                break;
                            }
                            Err(e) if e.is_session_loss() => return Err(e.into()),
                            Err(e) => self
                                .reporter
                                .warn(format!("Could not upgrade {}: {}", goal.name, e)),
                        }
                    }
                }
            }
        }
        Ok(())
    }

    async fn run_training(&mut self) -> Result<(), EngineError> {
        for id in self.account.village_ids() {
            self.checkpoint()?;
            let Some(village) = self.account.village(&id) else {
                continue;
            };
            let village_name = village.name.clone();
            let orders = training::plan(village, self.config.training.preferences_for(&id));

            for order in orders {
                self.reporter.info(format!(
                    "Training {} {} in '{}' (have {}, want {})",
                    order.amount, order.unit_type, village_name, order.current, order.min_count
                ));
                match self.game.train_troops(&id, &order.unit_type, order.amount).await {
                    Ok(()) => {
                        self.resync().await?;
                        break;
                    }
                    Err(e) if e.is_session_loss() => return Err(e.into()),
                    Err(e) => self.reporter.warn(format!(
                        "Could not train {}: {}",
                        order.unit_type, e
                    )),
                }
            }
        }
        Ok(())
    }

    async fn run_adventure(&mut self) -> Result<(), EngineError> {
        let now = self.clock.now();
        if !self.adventure_timer.is_eligible(now) {
            debug!(
                "Timer '{}' not due for {}s",
                self.adventure_timer.name(),
                self.adventure_timer.remaining(now).as_secs()
            );
            return Ok(());
        }

        let outcome = match adventure::decide(self.account.hero.as_ref()) {
            AdventureAction::NoHeroData => {
                self.reporter.warn("No hero data, skipping adventure check");
                AdventureOutcome::NoHeroData
            }
            AdventureAction::NothingAvailable => {
                self.reporter.info("No adventure available");
                AdventureOutcome::NothingAvailable
            }
            AdventureAction::Dispatch => match self.game.dispatch_hero_adventure().await {
                Ok(()) => {
                    // reconciled by the next sync
                    if let Some(hero) = self.account.hero.as_mut() {
                        hero.mark_adventure_dispatched();
                    }
                    self.publish_account();
                    self.reporter.info("Hero sent on an adventure");
                    AdventureOutcome::Dispatched
                }
                Err(e) if e.is_session_loss() => return Err(e.into()),
                Err(e) => {
                    self.reporter.warn(format!("Could not start adventure: {}", e));
                    AdventureOutcome::DispatchFailed
                }
            },
        };

        let range = match outcome.cooldown() {
            CooldownKind::Initial => self.config.adventure.initial_cooldown,
            CooldownKind::Success => self.config.adventure.success_cooldown,
            CooldownKind::Fail => self.config.adventure.fail_cooldown,
        };
        let next = self.sample(range);
        self.adventure_timer.mark_triggered(self.clock.now(), next);
        self.reporter.info(format!(
            "Next adventure check in ~{} min",
            next.as_secs().div_ceil(60)
        ));
        Ok(())
    }

    async fn phase_pause(&mut self) -> Result<(), EngineError> {
        let pause = self.sample(self.config.tick.phase_pause);
        if self.stop.sleep(pause).await {
            Ok(())
        } else {
            Err(EngineError::Stopped)
        }
    }

    fn checkpoint(&self) -> Result<(), EngineError> {
        if self.stop.is_stopped() {
            Err(EngineError::Stopped)
        } else {
            Ok(())
        }
    }

    fn sample(&mut self, range: SecsRange) -> Duration {
        range.sample(&mut self.rng)
    }

    fn set_status(&self, status: EngineStatus) {
        let previous = self.status_tx.send_replace(status);
        if previous != status {
            debug!("Engine status {} -> {}", previous, status);
        }
    }

    fn publish_account(&self) {
        self.account_tx.send_replace(self.account.clone());
        self.reporter.state_synced(&self.account);
    }

    async fn close_session(&mut self) {
        if self.session_open {
            self.session_open = false;
            self.game.close().await;
        }
    }

    async fn shutdown(&mut self) {
        if self.session_open {
            self.reporter.info("Closing game session");
        }
        self.close_session().await;
        self.reporter.info("Engine stopped");
    }
}

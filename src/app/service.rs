//! Command worker: the hexagonal core.
//!
//! [`CommandWorker`] owns the device registry, the actuator sequencer and
//! the redelivery ledger.  Every collaborator (store, PWM lines, clock,
//! notification sink, scheduler registrar) is injected at construction,
//! so the whole state machine runs against in-memory fakes in tests.
//!
//! ```text
//!                    ┌────────────────────────────┐ ──▶ NotifyPort (best-effort)
//!   Command ──────▶  │        CommandWorker        │ ──▶ RegistrarPort (best-effort)
//!                    │  rules · sequencer · ledger │
//!   StorePort  ◀───▶ └────────────────────────────┘ ──▶ ActuatorPort
//! ```
//!
//! ## Transition rules
//!
//! | action            | checks                                   | effect                               |
//! |-------------------|------------------------------------------|--------------------------------------|
//! | `activate`        | enabled · skip pending · food > 0        | actuate, reconcile, write            |
//! | `skip`            | none                                     | write `skipNext = !skipNext`         |
//! | `toggle-enabled`  | none                                     | write `enabled = !enabled`           |
//! | `update`          | non-empty · id · interval · per-feeding  | sparse write, register interval      |
//! | `post-activation` | id                                       | reconcile, write (no hardware)       |
//!
//! Store failures are the only retryable errors.  Notification and
//! registration outcomes never change the command's result.

use core::cell::RefCell;
use core::time::Duration;

use futures_lite::future;
use log::{debug, error, info, warn};

use crate::config::{ConfigError, WorkerConfig};
use crate::drivers::sequencer::ActuatorSequencer;
use crate::error::{CommandError, Disposition, ValidationError};
use crate::interval::Interval;
use crate::ledger::{CommandLedger, Stage};
use crate::registry::DeviceRegistry;
use crate::state::{
    reconcile_activation, remaining_feedings, DeviceId, FeederPatch, FeederState,
};

use super::commands::{Action, Command, CommandId, UpdateFields};
use super::events::FeederNotification;
use super::ports::{
    ActuatorPort, ClockPort, CommandHandler, NotifyPort, RegistrarPort, StoreError, StorePort,
};

// ───────────────────────────────────────────────────────────────
// Outcome
// ───────────────────────────────────────────────────────────────

/// Successful outcome of one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ack {
    /// The servo ran one feeding cycle and the state was reconciled.
    Actuated(FeederState),
    /// A pending skip absorbed the activation; nothing was dispensed.
    SkipConsumed(FeederState),
    /// Reconciliation without driving hardware (post-activation, or a
    /// redelivered activate whose feeding already happened).
    Reconciled(FeederState),
    /// Field-level write (skip, toggle-enabled, update).
    Updated(FeederState),
    /// Already fully applied; acknowledged without effects.
    Duplicate(CommandId),
}

impl Ack {
    /// Post-write record, if this outcome wrote one.
    pub fn state(&self) -> Option<&FeederState> {
        match self {
            Self::Actuated(s) | Self::SkipConsumed(s) | Self::Reconciled(s) | Self::Updated(s) => {
                Some(s)
            }
            Self::Duplicate(_) => None,
        }
    }
}

// ───────────────────────────────────────────────────────────────
// CommandWorker
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct WorkerSettings {
    notify_timeout: Duration,
    registrar_timeout: Duration,
    track_next_active: bool,
}

/// Applies commands to feeder state.  One instance serves every device;
/// callers must not overlap two commands for the same device.
pub struct CommandWorker<S, H, C, N, R> {
    store: S,
    hardware: H,
    clock: C,
    notifier: N,
    registrar: R,
    registry: DeviceRegistry,
    sequencer: ActuatorSequencer,
    settings: WorkerSettings,
    ledger: RefCell<CommandLedger>,
}

impl<S, H, C, N, R> CommandWorker<S, H, C, N, R>
where
    S: StorePort,
    H: ActuatorPort,
    C: ClockPort,
    N: NotifyPort,
    R: RegistrarPort,
{
    /// Construct the worker from validated configuration.
    pub fn new(
        store: S,
        hardware: H,
        clock: C,
        notifier: N,
        registrar: R,
        config: &WorkerConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            store,
            hardware,
            clock,
            notifier,
            registrar,
            registry: config.registry()?,
            sequencer: ActuatorSequencer::new(config.servo),
            settings: WorkerSettings {
                notify_timeout: config.notify_timeout(),
                registrar_timeout: config.registrar_timeout(),
                track_next_active: config.track_next_active,
            },
            ledger: RefCell::new(CommandLedger::new()),
        })
    }

    // ── Command handling ──────────────────────────────────────

    /// Apply one command.  Logs every failure with device id and reason.
    pub async fn process(&self, command: &Command) -> Result<Ack, CommandError> {
        let result = self.apply(command).await;
        match &result {
            Ok(Ack::Duplicate(cid)) => {
                info!("{}: {} {} already applied", command.id, command.action, cid);
            }
            Ok(_) => debug!("{}: {} applied", command.id, command.action),
            Err(e) => match e.disposition() {
                Disposition::Terminal => {
                    error!("{}: {} rejected: {}", command.id, command.action, e);
                }
                Disposition::Retry => {
                    warn!("{}: {} deferred: {}", command.id, command.action, e);
                }
            },
        }
        result
    }

    async fn apply(&self, command: &Command) -> Result<Ack, CommandError> {
        let cid = command.command_id.as_ref();
        if let Some(cid) = cid {
            if self.ledger.borrow().stage(cid) == Some(Stage::Applied) {
                return Ok(Ack::Duplicate(cid.clone()));
            }
        }

        let ack = match command.action {
            Action::Activate => self.activate(&command.id, cid).await?,
            Action::Skip => self.toggle_skip(&command.id).await?,
            Action::ToggleEnabled => self.toggle_enabled(&command.id).await?,
            Action::Update => self.update(&command.id, command.fields.as_ref()).await?,
            Action::PostActivation => {
                self.post_activation(&command.id, command.fields.as_ref())
                    .await?
            }
        };

        if let Some(cid) = cid {
            self.ledger.borrow_mut().record(cid, Stage::Applied);
        }
        if let Some(state) = ack.state() {
            self.publish(state).await;
        }
        Ok(ack)
    }

    async fn activate(&self, id: &DeviceId, cid: Option<&CommandId>) -> Result<Ack, CommandError> {
        let state = self.load(id).await?;

        let dispensed = cid.is_some_and(|c| self.ledger.borrow().stage(c) == Some(Stage::Actuated));
        if dispensed {
            info!("{}: feeding already dispensed, reconciling only", id);
            return Ok(Ack::Actuated(self.reconcile(&state).await?));
        }

        if !state.enabled {
            return Err(CommandError::Disabled(id.clone()));
        }
        if state.skip_next {
            let patch = FeederPatch {
                skip_next: Some(false),
                ..FeederPatch::default()
            };
            let state = self.write(id, &patch).await?;
            info!("{}: pending skip consumed, nothing dispensed", id);
            return Ok(Ack::SkipConsumed(state));
        }
        if state.est_remaining_food == 0 {
            return Err(CommandError::OutOfStock(id.clone()));
        }
        let device = self
            .registry
            .get(id)
            .ok_or_else(|| CommandError::Unregistered(id.clone()))?;

        self.sequencer
            .actuate(&self.hardware, &self.clock, device)
            .await?;
        if let Some(cid) = cid {
            self.ledger.borrow_mut().record(cid, Stage::Actuated);
        }

        Ok(Ack::Actuated(self.reconcile(&state).await?))
    }

    async fn toggle_skip(&self, id: &DeviceId) -> Result<Ack, CommandError> {
        let state = self.load(id).await?;
        let patch = FeederPatch {
            skip_next: Some(!state.skip_next),
            ..FeederPatch::default()
        };
        Ok(Ack::Updated(self.write(id, &patch).await?))
    }

    async fn toggle_enabled(&self, id: &DeviceId) -> Result<Ack, CommandError> {
        let state = self.load(id).await?;
        let patch = FeederPatch {
            enabled: Some(!state.enabled),
            ..FeederPatch::default()
        };
        Ok(Ack::Updated(self.write(id, &patch).await?))
    }

    async fn update(&self, id: &DeviceId, fields: Option<&UpdateFields>) -> Result<Ack, CommandError> {
        let fields = fields
            .filter(|f| !f.is_empty())
            .ok_or(ValidationError::EmptyPatch)?;
        check_target(id, Some(fields))?;
        if fields.est_food_per_feeding == Some(0) {
            return Err(ValidationError::ZeroFoodPerFeeding.into());
        }
        let interval = fields
            .interval
            .as_deref()
            .map(Interval::parse)
            .transpose()
            .map_err(ValidationError::from)?;

        let state = self.load(id).await?;
        let patch = update_patch(
            &state,
            fields,
            interval,
            self.clock.now_ms(),
            self.settings.track_next_active,
        );
        let changed_interval = patch
            .interval
            .clone()
            .filter(|i| state.interval.as_ref() != Some(i));

        let state = self.write(id, &patch).await?;
        if let Some(interval) = changed_interval {
            self.register(id, &interval).await;
        }
        Ok(Ack::Updated(state))
    }

    async fn post_activation(
        &self,
        id: &DeviceId,
        fields: Option<&UpdateFields>,
    ) -> Result<Ack, CommandError> {
        check_target(id, fields)?;
        let state = self.load(id).await?;
        Ok(Ack::Reconciled(self.reconcile(&state).await?))
    }

    // ── Start-up ──────────────────────────────────────────────

    /// Register every stored interval with the scheduler registrar.
    /// Returns how many registrations were attempted.
    pub async fn sync_schedules(&self) -> Result<usize, CommandError> {
        let feeders = self
            .store
            .list()
            .await
            .map_err(|e| CommandError::StoreUnavailable(e.to_string()))?;
        let mut count = 0;
        for feeder in &feeders {
            if let Some(interval) = &feeder.interval {
                self.register(&feeder.id, interval).await;
                count += 1;
            }
        }
        info!("synced {} feeding schedule(s) from {} feeder(s)", count, feeders.len());
        Ok(count)
    }

    // ── Accessors ─────────────────────────────────────────────

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn hardware(&self) -> &H {
        &self.hardware
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    pub fn registrar(&self) -> &R {
        &self.registrar
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    /// Number of commands currently remembered for redelivery detection.
    pub fn ledger_len(&self) -> usize {
        self.ledger.borrow().len()
    }

    // ── Internal ──────────────────────────────────────────────

    async fn load(&self, id: &DeviceId) -> Result<FeederState, CommandError> {
        self.store.get(id).await.map_err(|e| store_failure(id, e))
    }

    async fn write(&self, id: &DeviceId, patch: &FeederPatch) -> Result<FeederState, CommandError> {
        let state = self
            .store
            .patch(id, patch)
            .await
            .map_err(|e| store_failure(id, e))?;
        debug!("{}: wrote {:?}", id, patch.field_names());
        Ok(state)
    }

    /// Record one genuine feeding against `state`.
    async fn reconcile(&self, state: &FeederState) -> Result<FeederState, CommandError> {
        let patch = reconcile_activation(
            state,
            self.clock.now_ms(),
            self.settings.track_next_active,
        );
        self.write(&state.id, &patch).await
    }

    async fn publish(&self, state: &FeederState) {
        let notification = FeederNotification::feeder_update(state.clone());
        let outcome = future::or(
            async { Some(self.notifier.publish(&notification).await) },
            async {
                self.clock.sleep(self.settings.notify_timeout).await;
                None
            },
        )
        .await;
        match outcome {
            Some(Ok(())) => {}
            Some(Err(e)) => warn!("{}: notification dropped: {}", state.id, e),
            None => warn!(
                "{}: notification timed out after {:?}",
                state.id, self.settings.notify_timeout
            ),
        }
    }

    async fn register(&self, id: &DeviceId, interval: &Interval) {
        let outcome = future::or(
            async { Some(self.registrar.register(id, interval).await) },
            async {
                self.clock.sleep(self.settings.registrar_timeout).await;
                None
            },
        )
        .await;
        match outcome {
            Some(Ok(())) => info!("{}: schedule registered '{}'", id, interval),
            Some(Err(e)) => warn!("{}: schedule registration failed: {}", id, e),
            None => warn!(
                "{}: schedule registration timed out after {:?}",
                id, self.settings.registrar_timeout
            ),
        }
    }
}

impl<S, H, C, N, R> CommandHandler for CommandWorker<S, H, C, N, R>
where
    S: StorePort,
    H: ActuatorPort,
    C: ClockPort,
    N: NotifyPort,
    R: RegistrarPort,
{
    async fn handle(&self, command: &Command) -> Result<Ack, CommandError> {
        self.process(command).await
    }
}

fn store_failure(id: &DeviceId, e: StoreError) -> CommandError {
    match e {
        StoreError::NotFound => CommandError::NotFound(id.clone()),
        StoreError::Unavailable(msg) => CommandError::StoreUnavailable(msg),
    }
}

/// A patch that names a device must name the command's device.
fn check_target(id: &DeviceId, fields: Option<&UpdateFields>) -> Result<(), ValidationError> {
    match fields.and_then(|f| f.id.as_ref()) {
        Some(named) if named != id => Err(ValidationError::IdMismatch),
        _ => Ok(()),
    }
}

/// Translate validated update fields into a store patch.
///
/// Feedings are recomputed whenever either food field is present;
/// otherwise a supplied feedings count is written as-is.
fn update_patch(
    state: &FeederState,
    fields: &UpdateFields,
    interval: Option<Interval>,
    now_ms: u64,
    track_next_active: bool,
) -> FeederPatch {
    let mut patch = FeederPatch {
        name: fields.name.clone(),
        description: fields.description.clone(),
        status: fields.status,
        enabled: fields.enabled,
        interval,
        est_remaining_food: fields.est_remaining_food,
        est_food_per_feeding: fields.est_food_per_feeding,
        est_remaining_feedings: fields.est_remaining_feedings,
        ..FeederPatch::default()
    };

    if fields.est_remaining_food.is_some() || fields.est_food_per_feeding.is_some() {
        let food = fields.est_remaining_food.unwrap_or(state.est_remaining_food);
        let per_feeding = fields
            .est_food_per_feeding
            .unwrap_or(state.est_food_per_feeding);
        patch.est_remaining_feedings = Some(remaining_feedings(food, per_feeding));
    }

    if track_next_active {
        patch.next_active = patch
            .interval
            .as_ref()
            .filter(|i| state.interval.as_ref() != Some(*i))
            .map(|i| i.next_after(state.last_active.max(now_ms)));
    }
    patch
}

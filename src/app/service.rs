//! Provisioning service — the hexagonal core.
//!
//! [`ProvisioningService`] owns the configuration record, the aux field
//! registry, the mode arbiter, the connectivity supervisor and the portal
//! session.  All I/O flows through port traits it owns by value, so the
//! whole service runs against mock adapters on the host.
//!
//! ```text
//!  StoragePort ◀──┐  ┌──────────────────────────────┐
//!  NetworkPort ◀──┼──│     ProvisioningService      │ ──▶ EventSink
//!   SystemPort ◀──┤  │ Store · Supervisor · Portal  │
//! ResetDetector ◀─┘  └──────────────────────────────┘
//! ```

use log::{info, warn};

use crate::adapters::utils::{sanitize_hostname, MAX_HOSTNAME_LEN};
use crate::config::ManagerConfig;
use crate::error::Error;
use crate::mode::{decide_boot, BootDecision, BootInputs, Mode, ModeArbiter, PortalReason};
use crate::portal::{
    network_list, ExchangeReply, ExchangeRequest, ExchangeSession, ResolvedAccessPoint, SetOutcome,
};
use crate::record::{ConfigRecord, ForcedPortal};
use crate::registry::AuxRegistry;
use crate::store::{is_integrity_error, ConfigStore};
use crate::supervisor::{JoinAttempt, Supervisor, TickAction};

use super::commands::ManagerCommand;
use super::events::{ManagerEvent, RestartReason};
use super::ports::{ConfigError, EventSink, NetworkPort, ResetDetector, StoragePort, SystemPort};

/// Title shown in the portal when neither a hostname nor a display name is
/// known.
const DEFAULT_TITLE: &str = "NETPROV";

// ───────────────────────────────────────────────────────────────
// ProvisioningService
// ───────────────────────────────────────────────────────────────

/// The provisioning service orchestrates all domain logic.
pub struct ProvisioningService<'a, S, N, Y, D> {
    config: ManagerConfig,
    store: ConfigStore,
    storage: S,
    network: N,
    system: Y,
    detector: D,
    registry: AuxRegistry<'a>,
    record: ConfigRecord,
    record_valid: bool,
    mode: ModeArbiter,
    supervisor: Supervisor,
    session: Option<ExchangeSession>,
    hostname: Option<heapless::String<MAX_HOSTNAME_LEN>>,
}

impl<'a, S, N, Y, D> ProvisioningService<'a, S, N, Y, D>
where
    S: StoragePort,
    N: NetworkPort,
    Y: SystemPort,
    D: ResetDetector,
{
    /// Construct the service.  The configuration is validated here, once.
    ///
    /// Does **not** touch storage or the radio — call [`begin`] next.
    ///
    /// [`begin`]: Self::begin
    pub fn new(
        config: ManagerConfig,
        registry: AuxRegistry<'a>,
        storage: S,
        network: N,
        system: Y,
        detector: D,
    ) -> Result<Self, Error> {
        config.validate()?;
        let sets = config.credential_sets();
        Ok(Self {
            store: ConfigStore::new(&config),
            supervisor: Supervisor::new(&config),
            config,
            storage,
            network,
            system,
            detector,
            registry,
            record: ConfigRecord::empty(sets),
            record_valid: false,
            mode: ModeArbiter::new(),
            session: None,
            hostname: None,
        })
    }

    /// Hostname shown as the portal title, reduced to its RFC-952 form.
    /// Nothing usable left means the display name is shown instead.
    pub fn set_hostname(&mut self, hostname: &str) {
        self.hostname = Some(sanitize_hostname(hostname));
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Boot sequence: reset burst, forced flag, stored record, then join.
    pub fn begin(&mut self, sink: &mut impl EventSink) -> Mode {
        let reset_burst = self.detector.detect_burst();
        if reset_burst {
            info!("Reset burst detected");
        }

        let forced = self.store.forced_portal(&self.storage);
        if forced == ForcedPortal::Transient {
            // Consumed by this boot.
            self.store.clear_forced_portal(&mut self.storage);
        }

        let loaded = self.load_or_seed();
        sink.emit(&ManagerEvent::ConfigLoaded(loaded));

        let inputs = BootInputs {
            reset_burst,
            forced,
            record_valid: self.record_valid,
        };
        match decide_boot(inputs) {
            BootDecision::Portal(reason) => self.open_portal(reason, sink),
            BootDecision::Join => {
                let attempt = self.supervisor.attempt_join(
                    self.record.credentials(),
                    &mut self.network,
                    &mut self.system,
                );
                emit_join(sink, attempt);
                if attempt.result.is_ok() {
                    self.enter_mode(Mode::Normal, sink);
                } else if self.config.reset_on_boot_join_failure {
                    self.restart(RestartReason::BootJoinFailed, sink);
                } else {
                    self.open_portal(PortalReason::JoinFailed, sink);
                }
            }
        }

        let mode = self.mode.current();
        sink.emit(&ManagerEvent::Started(mode));
        info!("ProvisioningService started in {:?}", mode);
        mode
    }

    /// One control-loop iteration.  Does nothing once a restart was
    /// requested.
    pub fn tick(&mut self, sink: &mut impl EventSink) {
        if self.mode.current() == Mode::Restarting {
            return;
        }
        self.detector.tick();

        let report =
            self.supervisor
                .tick(self.record.credentials(), &mut self.network, &mut self.system);

        if report.link_lost {
            sink.emit(&ManagerEvent::LinkLost);
        }
        if report.portal_timed_out {
            sink.emit(&ManagerEvent::PortalTimedOut);
        }
        if let Some(attempt) = report.join {
            emit_join(sink, attempt);
        }
        match report.action {
            TickAction::Recovered { in_portal } | TickAction::Rejoined { in_portal } => {
                if in_portal {
                    self.close_portal(sink);
                }
            }
            TickAction::RejoinFailed { failures } => {
                sink.emit(&ManagerEvent::RejoinFailed { failures });
            }
            TickAction::RestartRequired => {
                self.restart(RestartReason::RejoinRetriesExhausted, sink);
            }
            TickAction::None | TickAction::Deferred | TickAction::Throttled => {}
        }
    }

    // ── Portal exchange ───────────────────────────────────────

    /// Handle one portal request.  Returns `None` while the portal is not
    /// active.
    pub fn handle_request(
        &mut self,
        key: &str,
        value: &str,
        sink: &mut impl EventSink,
    ) -> Option<ExchangeReply> {
        if self.mode.current() != Mode::Portal {
            return None;
        }
        match ExchangeRequest::parse(key, value) {
            ExchangeRequest::ReadForm => {
                self.supervisor.cancel_portal_timeout();
                let scanned = self.network.scan();
                let networks = network_list(&scanned, &self.config.portal);
                let title = self.portal_title();
                let session = self.session.as_ref()?;
                Some(ExchangeReply::Form(session.form_view(
                    &self.record,
                    self.record_valid,
                    &self.registry,
                    &title,
                    networks,
                )))
            }
            ExchangeRequest::Set { key, value } => {
                let session = self.session.as_mut()?;
                let outcome = session.apply(key, value, &self.registry);
                let required = session.required();
                match outcome {
                    SetOutcome::Accepted { updated, required } => {
                        if let Some(k) = self.static_key(key) {
                            sink.emit(&ManagerEvent::FieldUpdated {
                                key: k,
                                updated,
                                required,
                            });
                        }
                    }
                    SetOutcome::Complete => {
                        if let Some(k) = self.static_key(key) {
                            sink.emit(&ManagerEvent::FieldUpdated {
                                key: k,
                                updated: required,
                                required,
                            });
                        }
                        self.commit(sink);
                    }
                    SetOutcome::Repeated | SetOutcome::Unknown => {}
                }
                Some(ExchangeReply::Ack)
            }
        }
    }

    fn portal_title(&self) -> String {
        if let Some(h) = self.hostname.as_ref().filter(|h| !h.is_empty()) {
            h.to_string()
        } else if !self.record.display_name().is_empty() {
            self.record.display_name().to_string()
        } else {
            DEFAULT_TITLE.to_string()
        }
    }

    /// The `'static` spelling of an accepted key, for events.
    fn static_key(&self, key: &str) -> Option<&'static str> {
        use crate::registry::{DISPLAY_NAME_KEY, NETWORK_ID_KEYS, SECRET_KEYS};
        NETWORK_ID_KEYS
            .iter()
            .chain(SECRET_KEYS.iter())
            .chain(core::iter::once(&DISPLAY_NAME_KEY))
            .copied()
            .find(|k| *k == key)
            .or_else(|| self.registry.get(key).map(|f| f.id()))
    }

    /// Persist the completed session, drop any forced flag, restart.
    fn commit(&mut self, sink: &mut impl EventSink) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let Some(draft) = session.take_draft() else {
            return;
        };
        session.commit_aux(&mut self.registry);
        self.record = draft;
        self.record_valid = self
            .record
            .validate(self.config.validity_policy, self.config.min_secret_len())
            .is_ok();
        if !self.record_valid {
            warn!("Committed record does not satisfy the validity policy");
        }
        self.persist_all(sink);
        self.store.clear_forced_portal(&mut self.storage);
        sink.emit(&ManagerEvent::PortalCommitted);
        self.restart(RestartReason::ConfigCommitted, sink);
    }

    // ── Commands ──────────────────────────────────────────────

    pub fn handle_command(&mut self, cmd: ManagerCommand, sink: &mut impl EventSink) {
        match cmd {
            ManagerCommand::EnterPortal => self.reset_and_enter_portal(sink),
            ManagerCommand::EnterPortalPersistent => self.reset_and_enter_portal_persistent(sink),
            ManagerCommand::ClearForcedPortal => self.clear_forced_portal(),
            ManagerCommand::ClearConfig => self.clear_config(sink),
        }
    }

    /// Open the portal on the next boot only, then restart.
    pub fn reset_and_enter_portal(&mut self, sink: &mut impl EventSink) {
        self.store
            .set_forced_portal(&mut self.storage, ForcedPortal::Transient);
        self.restart(RestartReason::EnterPortalRequested, sink);
    }

    /// Open the portal on every boot until a configuration is committed,
    /// then restart.
    pub fn reset_and_enter_portal_persistent(&mut self, sink: &mut impl EventSink) {
        self.store
            .set_forced_portal(&mut self.storage, ForcedPortal::Persistent);
        self.restart(RestartReason::EnterPortalRequested, sink);
    }

    /// Drop a transient forced-portal request.  A persistent one stays until
    /// a portal commit.
    pub fn clear_forced_portal(&mut self) {
        if self.store.forced_portal(&self.storage) == ForcedPortal::Transient {
            self.store.clear_forced_portal(&mut self.storage);
        }
    }

    /// Zero the record and every aux buffer, then save both.
    pub fn clear_config(&mut self, sink: &mut impl EventSink) {
        self.record = ConfigRecord::empty(self.config.credential_sets());
        self.record_valid = false;
        self.registry.clear_all();
        self.persist_all(sink);
        info!("Configuration cleared");
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn mode(&self) -> Mode {
        self.mode.current()
    }

    pub fn network_id(&self, index: usize) -> Option<&str> {
        self.record.credential(index).map(|c| c.network_id.as_str())
    }

    pub fn secret(&self, index: usize) -> Option<&str> {
        self.record.credential(index).map(|c| c.secret.as_str())
    }

    pub fn display_name(&self) -> &str {
        self.record.display_name()
    }

    /// The in-memory record.  Empty unless a valid record was loaded or
    /// committed.
    pub fn full_config(&self) -> &ConfigRecord {
        &self.record
    }

    pub fn aux_value(&self, id: &str) -> Option<&str> {
        self.registry.get(id).map(|f| f.value())
    }

    pub fn is_config_valid(&self) -> bool {
        self.record_valid
    }

    pub fn is_portal_active(&self) -> bool {
        self.mode.current() == Mode::Portal
    }

    pub fn is_connected(&self) -> bool {
        self.supervisor.is_connected()
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn network(&self) -> &N {
        &self.network
    }

    pub fn network_mut(&mut self) -> &mut N {
        &mut self.network
    }

    pub fn system(&self) -> &Y {
        &self.system
    }

    pub fn system_mut(&mut self) -> &mut Y {
        &mut self.system
    }

    // ── Internal ──────────────────────────────────────────────

    /// Fill `record`/`record_valid` from the default record or storage.
    fn load_or_seed(&mut self) -> Result<(), ConfigError> {
        let sets = self.config.credential_sets();
        if let Some(mut seed) = self.config.default_record.clone() {
            seed.stamp_header();
            self.record = seed;
            self.record_valid = true;
            self.store.save(&mut self.storage, &self.record);
            if let Err(e) = self.store.save_aux(&mut self.storage, &self.registry) {
                warn!("Aux data not saved: {}", e);
            }
            info!("Default configuration seeded");
            return Ok(());
        }

        let loaded = self.store.load(&self.storage).and_then(|record| {
            self.store
                .load_aux(&self.storage, &mut self.registry)
                .map(|()| record)
        });
        match loaded {
            Ok(record) => {
                self.record = record;
                self.record_valid = true;
                Ok(())
            }
            Err(e) => {
                self.record = ConfigRecord::empty(sets);
                self.record_valid = false;
                if is_integrity_error(e) {
                    warn!("Stored configuration corrupted ({}), rewriting blank", e);
                    self.registry.fill_blank();
                    self.store.save(&mut self.storage, &ConfigRecord::blank(sets));
                    if let Err(e) = self.store.save_aux(&mut self.storage, &self.registry) {
                        warn!("Aux data not saved: {}", e);
                    }
                } else {
                    info!("No usable configuration ({})", e);
                }
                Err(e)
            }
        }
    }

    fn persist_all(&mut self, sink: &mut impl EventSink) {
        let record = self.store.save(&mut self.storage, &self.record);
        let aux = match self.store.save_aux(&mut self.storage, &self.registry) {
            Ok(r) => r,
            Err(e) => {
                warn!("Aux data not saved: {}", e);
                crate::store::WriteReport {
                    primary_ok: false,
                    backup_ok: false,
                }
            }
        };
        sink.emit(&ManagerEvent::ConfigSaved {
            primary_ok: record.primary_ok && aux.primary_ok,
            backup_ok: record.backup_ok && aux.backup_ok,
        });
    }

    fn open_portal(&mut self, reason: PortalReason, sink: &mut impl EventSink) {
        let now = self.system.now_ms();
        let ap = ResolvedAccessPoint::resolve(&self.config.portal, self.system.chip_id(), now);
        info!("Portal: starting access point '{}' on channel {}", ap.ssid, ap.channel);
        self.network.start_access_point(&ap.as_port());

        let timeout = self.config.config_portal_timeout_ms;
        let armed = (timeout > 0 && reason.arms_timeout(self.record_valid)).then_some(timeout);
        self.supervisor.enter_portal(now, armed);
        self.session = Some(ExchangeSession::new(&self.config, self.registry.len()));

        sink.emit(&ManagerEvent::PortalOpened(reason));
        self.enter_mode(Mode::Portal, sink);
    }

    fn close_portal(&mut self, sink: &mut impl EventSink) {
        self.session = None;
        sink.emit(&ManagerEvent::PortalClosed);
        self.enter_mode(Mode::Normal, sink);
    }

    fn restart(&mut self, reason: RestartReason, sink: &mut impl EventSink) {
        warn!("Restart requested: {:?}", reason);
        sink.emit(&ManagerEvent::RestartRequested(reason));
        self.enter_mode(Mode::Restarting, sink);
        self.system.restart();
    }

    fn enter_mode(&mut self, to: Mode, sink: &mut impl EventSink) {
        if let Some(from) = self.mode.transition(to) {
            sink.emit(&ManagerEvent::ModeChanged { from, to });
        }
    }
}

fn emit_join(sink: &mut impl EventSink, attempt: JoinAttempt) {
    if attempt.candidates > 0 {
        sink.emit(&ManagerEvent::JoinStarted {
            candidates: attempt.candidates,
        });
    }
    match attempt.result {
        Ok(()) => sink.emit(&ManagerEvent::Joined),
        Err(e) => sink.emit(&ManagerEvent::JoinFailed(e)),
    }
}

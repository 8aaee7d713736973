//! Connectivity supervisor.
//!
//! Owns the link state and the only multi-iteration wait in the crate: the
//! bounded join poll loop.
//!
//! ```text
//!             begin_join             poll == Connected
//!   Idle ───────────────▶ Connecting ─────────────────▶ Connected
//!    ▲                        │                             │
//!    └──── budget exhausted ──┘◀── 2 failed status checks ──┘
//!
//!   PortalActive: reconnects are deferred until the config timeout expires.
//! ```

use log::{debug, info, warn};

use crate::app::ports::{JoinCandidate, LinkStatus, NetworkPort, SystemPort};
use crate::config::ManagerConfig;
use crate::error::JoinError;
use crate::record::{CredentialSet, MAX_CREDENTIAL_SETS};

/// Failed status checks in a row before a live link is declared lost.
pub const LINK_LOSS_CHECKS: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Idle,
    Connecting,
    Connected,
    /// The configuration portal is up; normal reconnects are suspended.
    PortalActive,
}

/// Result of one join attempt, for event reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinAttempt {
    pub candidates: u8,
    pub result: Result<(), JoinError>,
}

/// What a [`Supervisor::tick`] did besides bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TickAction {
    #[default]
    None,
    /// Portal is active and its timeout has not expired.
    Deferred,
    /// A rejoin is due but the reconnect interval has not elapsed.
    Throttled,
    /// The link came back on its own.
    Recovered { in_portal: bool },
    /// A rejoin succeeded.
    Rejoined { in_portal: bool },
    /// A rejoin failed; `failures` counts consecutive failures.
    RejoinFailed { failures: u8 },
    /// The consecutive-failure budget is exhausted.
    RestartRequired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickReport {
    pub link_lost: bool,
    pub portal_timed_out: bool,
    pub join: Option<JoinAttempt>,
    pub action: TickAction,
}

/// Join and reconnect timing, copied out of [`ManagerConfig`].
#[derive(Debug, Clone, Copy)]
struct Timing {
    min_secret_len: usize,
    first_wait_ms: u32,
    poll_slice_ms: u32,
    max_polls: u8,
    reconnect_interval_ms: u64,
    status_check_interval_ms: u64,
    reset_after_failures: bool,
    failures_before_reset: u8,
}

#[derive(Debug)]
pub struct Supervisor {
    state: LinkState,
    timing: Timing,
    next_status_check_ms: u64,
    missed_checks: u8,
    last_rejoin_ms: Option<u64>,
    failed_rejoins: u8,
    /// `Some(deadline)` while a portal timeout is armed.
    portal_deadline_ms: Option<u64>,
    portal_timeout_reported: bool,
}

impl Supervisor {
    pub fn new(config: &ManagerConfig) -> Self {
        Self {
            state: LinkState::Idle,
            timing: Timing {
                min_secret_len: config.min_secret_len(),
                first_wait_ms: config.join_first_wait_ms,
                poll_slice_ms: config.join_poll_slice_ms,
                max_polls: config.max_join_polls,
                reconnect_interval_ms: u64::from(config.reconnect_interval_ms),
                status_check_interval_ms: u64::from(config.status_check_interval_ms),
                reset_after_failures: config.reset_after_failed_rejoins,
                failures_before_reset: config.rejoin_failures_before_reset,
            },
            next_status_check_ms: 0,
            missed_checks: 0,
            last_rejoin_ms: None,
            failed_rejoins: 0,
            portal_deadline_ms: None,
            portal_timeout_reported: false,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == LinkState::Connected
    }

    pub fn failed_rejoins(&self) -> u8 {
        self.failed_rejoins
    }

    // ── Join ──────────────────────────────────────────────────

    /// Register every joinable set as a candidate, issue one join, then poll
    /// in bounded slices.
    pub fn attempt_join(
        &mut self,
        sets: &[CredentialSet],
        net: &mut impl NetworkPort,
        sys: &mut impl SystemPort,
    ) -> JoinAttempt {
        let mut candidates: heapless::Vec<JoinCandidate<'_>, MAX_CREDENTIAL_SETS> =
            heapless::Vec::new();
        for set in sets.iter().filter(|s| s.is_joinable(self.timing.min_secret_len)) {
            let _ = candidates.push(JoinCandidate {
                network_id: &set.network_id,
                secret: &set.secret,
            });
        }
        let count = candidates.len() as u8;
        if candidates.is_empty() {
            warn!("Supervisor: no joinable credential set");
            return JoinAttempt {
                candidates: 0,
                result: Err(JoinError::NoCandidates),
            };
        }

        let resume = if self.state == LinkState::PortalActive {
            LinkState::PortalActive
        } else {
            LinkState::Idle
        };
        self.state = LinkState::Connecting;
        info!("Supervisor: joining with {} candidate(s)", count);
        net.begin_join(&candidates);
        sys.delay_ms(self.timing.first_wait_ms);

        let result = self.poll_until_joined(net, sys);
        match result {
            Ok(()) => {
                self.state = LinkState::Connected;
                self.missed_checks = 0;
                self.failed_rejoins = 0;
                info!("Supervisor: link up");
            }
            Err(e) => {
                self.state = resume;
                warn!("Supervisor: join failed: {}", e);
            }
        }
        JoinAttempt {
            candidates: count,
            result,
        }
    }

    fn poll_until_joined(
        &self,
        net: &mut impl NetworkPort,
        sys: &mut impl SystemPort,
    ) -> Result<(), JoinError> {
        for poll in 0..self.timing.max_polls {
            match net.poll_status() {
                LinkStatus::Connected => return Ok(()),
                LinkStatus::Failed => return Err(JoinError::Rejected),
                LinkStatus::Idle | LinkStatus::Connecting => {
                    debug!("Supervisor: poll {} not connected yet", poll + 1);
                    sys.delay_ms(self.timing.poll_slice_ms);
                }
            }
        }
        Err(JoinError::Timeout)
    }

    // ── Portal ────────────────────────────────────────────────

    /// Suspend normal supervision.  `timeout_ms` arms the config timeout.
    pub fn enter_portal(&mut self, now_ms: u64, timeout_ms: Option<u32>) {
        self.state = LinkState::PortalActive;
        self.portal_deadline_ms = timeout_ms.map(|t| now_ms + u64::from(t));
        self.portal_timeout_reported = false;
        self.failed_rejoins = 0;
    }

    /// The user is actively configuring: stay in the portal indefinitely.
    pub fn cancel_portal_timeout(&mut self) {
        if self.portal_deadline_ms.take().is_some() {
            info!("Supervisor: portal timeout cancelled");
        }
    }

    pub fn portal_deadline_ms(&self) -> Option<u64> {
        self.portal_deadline_ms
    }

    fn portal_defers(&self, now_ms: u64) -> bool {
        match self.portal_deadline_ms {
            None => true,
            Some(deadline) => now_ms < deadline,
        }
    }

    // ── Steady state ──────────────────────────────────────────

    /// One supervision step.  `sets` are the stored credentials used for any
    /// rejoin.
    pub fn tick(
        &mut self,
        sets: &[CredentialSet],
        net: &mut impl NetworkPort,
        sys: &mut impl SystemPort,
    ) -> TickReport {
        let now = sys.now_ms();
        let mut report = TickReport::default();

        if self.state != LinkState::PortalActive && now >= self.next_status_check_ms {
            report.link_lost = self.check_status(net);
            self.next_status_check_ms = now + self.timing.status_check_interval_ms;
        }
        if self.state == LinkState::Connected {
            return report;
        }

        let in_portal = self.state == LinkState::PortalActive;
        if net.poll_status() == LinkStatus::Connected {
            info!("Supervisor: link recovered");
            self.mark_connected();
            report.action = TickAction::Recovered { in_portal };
            return report;
        }

        if in_portal && self.portal_defers(now) {
            self.failed_rejoins = 0;
            report.action = TickAction::Deferred;
            return report;
        }
        if in_portal && !self.portal_timeout_reported {
            self.portal_timeout_reported = true;
            report.portal_timed_out = true;
        }

        if let Some(last) = self.last_rejoin_ms {
            let interval = self.timing.reconnect_interval_ms;
            if interval > 0 && now.saturating_sub(last) <= interval {
                report.action = TickAction::Throttled;
                return report;
            }
        }
        self.last_rejoin_ms = Some(now);

        let attempt = self.attempt_join(sets, net, sys);
        report.join = Some(attempt);
        report.action = match attempt.result {
            Ok(()) => TickAction::Rejoined { in_portal },
            Err(_) => {
                self.failed_rejoins = self.failed_rejoins.saturating_add(1);
                if self.timing.reset_after_failures
                    && self.failed_rejoins > self.timing.failures_before_reset
                {
                    warn!(
                        "Supervisor: {} consecutive rejoin failures, restart required",
                        self.failed_rejoins
                    );
                    TickAction::RestartRequired
                } else {
                    TickAction::RejoinFailed {
                        failures: self.failed_rejoins,
                    }
                }
            }
        };
        report
    }

    /// Periodic status check with loss debouncing.  Returns true when the
    /// link was just declared lost.
    fn check_status(&mut self, net: &mut impl NetworkPort) -> bool {
        if net.poll_status() == LinkStatus::Connected {
            self.mark_connected();
            return false;
        }
        if self.state != LinkState::Connected {
            return false;
        }
        self.missed_checks += 1;
        if self.missed_checks < LINK_LOSS_CHECKS {
            debug!("Supervisor: status check missed ({})", self.missed_checks);
            return false;
        }
        warn!("Supervisor: link lost");
        self.state = LinkState::Idle;
        self.missed_checks = 0;
        true
    }

    fn mark_connected(&mut self) {
        self.state = LinkState::Connected;
        self.missed_checks = 0;
        self.failed_rejoins = 0;
        self.portal_deadline_ms = None;
    }
}

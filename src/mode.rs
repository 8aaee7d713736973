//! Operating modes and the boot-time mode decision.
//!
//! ```text
//!            ┌──────────┐  burst / forced / invalid / join failed
//!  Booting ──┤ decide   ├──────────────────────────────▶ Portal
//!            └────┬─────┘                                  │
//!                 │ joined                       link back │
//!                 ▼                                        │
//!              Normal ◀────────────────────────────────────┘
//!                 │ commit / re-enter request / retry budget
//!                 ▼
//!            Restarting  (terminal)
//! ```
//!
//! Link loss in `Normal` never leads back to `Portal`; the supervisor
//! reconnects silently instead.

use log::info;

use crate::record::ForcedPortal;

/// Top-level operating mode of the provisioning service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Mode {
    /// `begin()` has not finished yet.
    Booting = 0,
    /// Joined (or rejoining) a configured network.
    Normal = 1,
    /// Configuration access point and exchange protocol are live.
    Portal = 2,
    /// A restart has been requested; nothing else runs.
    Restarting = 3,
}

/// Why the portal was opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortalReason {
    /// The reset-pattern oracle saw a burst of power cycles.
    ResetBurst,
    /// A forced-portal flag was found in storage.
    Forced(ForcedPortal),
    /// No stored record passed validation.
    NoValidConfig,
    /// The stored credentials could not be joined.
    JoinFailed,
}

impl PortalReason {
    /// The configuration timeout is armed only when a usable record existed,
    /// so an unconfigured device never leaves the portal on its own.
    pub fn arms_timeout(self, record_valid: bool) -> bool {
        record_valid && !matches!(self, Self::NoValidConfig)
    }
}

/// Everything the boot decision depends on.
#[derive(Debug, Clone, Copy)]
pub struct BootInputs {
    pub reset_burst: bool,
    pub forced: ForcedPortal,
    pub record_valid: bool,
}

/// Outcome of the boot decision, before any join is attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootDecision {
    Portal(PortalReason),
    Join,
}

/// Ordered boot rules: reset burst, then forced flag, then record validity.
pub fn decide_boot(inputs: BootInputs) -> BootDecision {
    if inputs.reset_burst {
        BootDecision::Portal(PortalReason::ResetBurst)
    } else if inputs.forced.is_set() {
        BootDecision::Portal(PortalReason::Forced(inputs.forced))
    } else if !inputs.record_valid {
        BootDecision::Portal(PortalReason::NoValidConfig)
    } else {
        BootDecision::Join
    }
}

/// Holds the current [`Mode`] and applies the allowed transitions.
#[derive(Debug)]
pub struct ModeArbiter {
    current: Mode,
    transitions: u32,
}

impl ModeArbiter {
    pub fn new() -> Self {
        Self {
            current: Mode::Booting,
            transitions: 0,
        }
    }

    pub fn current(&self) -> Mode {
        self.current
    }

    /// Number of mode changes since construction.
    pub fn transitions(&self) -> u32 {
        self.transitions
    }

    /// Move to `to`.  Returns the previous mode when the move happened.
    ///
    /// `Restarting` is terminal and a move to `Booting` is never allowed.
    pub fn transition(&mut self, to: Mode) -> Option<Mode> {
        let from = self.current;
        if from == to || from == Mode::Restarting || to == Mode::Booting {
            return None;
        }
        info!("Mode: {:?} -> {:?}", from, to);
        self.current = to;
        self.transitions += 1;
        Some(from)
    }
}

impl Default for ModeArbiter {
    fn default() -> Self {
        Self::new()
    }
}

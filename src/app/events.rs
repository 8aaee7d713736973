//! Outbound manager events.
//!
//! The [`ProvisioningService`](super::service::ProvisioningService) emits
//! these through the [`EventSink`](super::ports::EventSink) port.  Adapters
//! on the other side decide what to do with them: log to serial, drive a
//! status LED, publish somewhere once connected.
//!
//! No variant carries a secret.

use crate::error::JoinError;
use crate::mode::{Mode, PortalReason};
use crate::app::ports::ConfigError;

/// Why a restart was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartReason {
    /// A portal session committed a complete configuration.
    ConfigCommitted,
    /// The application asked to re-enter the portal.
    EnterPortalRequested,
    /// Too many consecutive failed rejoins.
    RejoinRetriesExhausted,
    /// The boot-time join failed and restart-on-failure is enabled.
    BootJoinFailed,
}

/// Structured events emitted by the provisioning core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagerEvent {
    /// `begin()` finished; carries the resulting mode.
    Started(Mode),

    /// The operating mode changed.
    ModeChanged { from: Mode, to: Mode },

    /// Stored configuration was loaded.  `Err` means it was treated as absent.
    ConfigLoaded(Result<(), ConfigError>),

    /// A record and its aux data were written to both locations.
    /// `backup_ok` is false when only the primary copy landed.
    ConfigSaved { primary_ok: bool, backup_ok: bool },

    /// A join was issued with this many candidates.
    JoinStarted { candidates: u8 },

    /// The link came up.
    Joined,

    /// A join attempt ended without a link.
    JoinFailed(JoinError),

    /// Two consecutive status checks saw no link.
    LinkLost,

    /// A steady-state rejoin failed; `failures` is the consecutive count.
    RejoinFailed { failures: u8 },

    /// The configuration portal came up.
    PortalOpened(PortalReason),

    /// The portal closed because the link recovered.
    PortalClosed,

    /// The portal's configuration timeout expired.
    PortalTimedOut,

    /// A portal field was accepted.
    FieldUpdated {
        key: &'static str,
        updated: u8,
        required: u8,
    },

    /// Every required field arrived and was persisted.
    PortalCommitted,

    /// A restart is about to be triggered.
    RestartRequested(RestartReason),
}

//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured manager events to the
//! ESP-IDF logger (which goes to UART / USB-CDC in production).  A status
//! LED or a remote publisher would implement the same trait.

use log::{info, warn};

use crate::app::events::ManagerEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`ManagerEvent`] to the serial console.
#[derive(Debug, Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &ManagerEvent) {
        match event {
            ManagerEvent::Started(mode) => {
                info!("START | mode={:?}", mode);
            }
            ManagerEvent::ModeChanged { from, to } => {
                info!("MODE  | {:?} -> {:?}", from, to);
            }
            ManagerEvent::ConfigLoaded(Ok(())) => {
                info!("STORE | config loaded");
            }
            ManagerEvent::ConfigLoaded(Err(e)) => {
                warn!("STORE | config unusable: {}", e);
            }
            ManagerEvent::ConfigSaved {
                primary_ok,
                backup_ok,
            } => {
                if *primary_ok && *backup_ok {
                    info!("STORE | config saved");
                } else {
                    warn!(
                        "STORE | config save incomplete, primary={} backup={}",
                        primary_ok, backup_ok
                    );
                }
            }
            ManagerEvent::JoinStarted { candidates } => {
                info!("LINK  | joining, {} candidate(s)", candidates);
            }
            ManagerEvent::Joined => {
                info!("LINK  | up");
            }
            ManagerEvent::JoinFailed(e) => {
                warn!("LINK  | join failed: {}", e);
            }
            ManagerEvent::LinkLost => {
                warn!("LINK  | lost");
            }
            ManagerEvent::RejoinFailed { failures } => {
                warn!("LINK  | rejoin failed ({} in a row)", failures);
            }
            ManagerEvent::PortalOpened(reason) => {
                info!("PORTAL| opened, reason={:?}", reason);
            }
            ManagerEvent::PortalClosed => {
                info!("PORTAL| closed");
            }
            ManagerEvent::PortalTimedOut => {
                info!("PORTAL| timed out, rejoining stored credentials");
            }
            ManagerEvent::FieldUpdated {
                key,
                updated,
                required,
            } => {
                info!("PORTAL| '{}' set ({}/{})", key, updated, required);
            }
            ManagerEvent::PortalCommitted => {
                info!("PORTAL| configuration committed");
            }
            ManagerEvent::RestartRequested(reason) => {
                warn!("SYS   | restart: {:?}", reason);
            }
        }
    }
}

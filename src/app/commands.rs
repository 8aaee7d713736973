//! Inbound commands to the provisioning service.
//!
//! These represent actions requested by the embedding application (a button
//! handler, a serial console, a remote management hook) that the
//! [`ProvisioningService`](super::service::ProvisioningService) interprets.

/// Commands that the application can send into the provisioning core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerCommand {
    /// Set the transient forced-portal flag and restart.  The flag is
    /// consumed by the next boot.
    EnterPortal,

    /// Set the persistent forced-portal flag and restart.  Every boot opens
    /// the portal until a configuration is committed.
    EnterPortalPersistent,

    /// Drop a transient forced-portal flag without restarting.
    ClearForcedPortal,

    /// Zero the record and every aux buffer, then save.
    ClearConfig,
}

//! netprov — network credential provisioning core.
//!
//! Keeps a small configuration record (network credentials, a display name
//! and application-defined extra fields) safe across power loss, decides on
//! every boot whether to join a stored network or open a configuration
//! portal, supervises the link afterwards, and implements the key/value
//! protocol the portal form talks.
//!
//! All ESP-IDF-specific code is guarded by `#[cfg(target_os = "espidf")]`
//! within each adapter; everything else runs on the host.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod mode;
pub mod portal;
pub mod record;
pub mod registry;
pub mod store;
pub mod supervisor;

mod error;

pub use app::events::{ManagerEvent, RestartReason};
pub use app::service::ProvisioningService;
pub use config::{ManagerConfig, PortalSettings, StorageLayout, ValidityPolicy};
pub use error::{Error, JoinError, RegistryError, Result};
pub use mode::{Mode, PortalReason};
pub use record::{ConfigRecord, CredentialSet, ForcedPortal};
pub use registry::{AuxField, AuxRegistry};

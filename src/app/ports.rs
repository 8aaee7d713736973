//! Port traits — the hexagonal boundary between the provisioning core and
//! the platform.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ ProvisioningService (domain)
//! ```
//!
//! Driven adapters (NVS, EEPROM, WiFi driver, system timer, reset detector,
//! event sinks) implement these traits.  The
//! [`ProvisioningService`](super::service::ProvisioningService) consumes them
//! via generics, so the domain core never touches hardware directly.
//!
//! ## Notes
//!
//! - Credentials are stored in plaintext; [`StoragePort`] implementations
//!   make no confidentiality promise.
//! - [`NetworkPort::begin_join`] must not wait for association.  Waiting
//!   happens in the supervisor's bounded poll loop, never inside the adapter.
//! - All port errors are typed — callers must handle every variant explicitly.

use crate::app::events::ManagerEvent;

// ───────────────────────────────────────────────────────────────
// Storage port (driven adapter: domain ↔ NVS / flash / EEPROM)
// ───────────────────────────────────────────────────────────────

/// Persistent key-value storage.
///
/// Each key is an independent location: a failed write to one key must not
/// affect any other key.  The store relies on this to keep primary and
/// backup copies independent.
pub trait StoragePort {
    /// Read a value.  Returns the number of bytes written to `buf`.
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError>;

    /// Write a value, replacing any previous content.
    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Delete a key.  Returns `Ok(())` even if the key didn't exist.
    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError>;

    /// Check whether a key exists without reading it.
    fn exists(&self, namespace: &str, key: &str) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Network port (driven adapter: domain → WiFi driver)
// ───────────────────────────────────────────────────────────────

/// Maximum number of scan results an adapter may report.
pub const MAX_SCAN_RESULTS: usize = 32;

/// One join candidate handed to [`NetworkPort::begin_join`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinCandidate<'a> {
    pub network_id: &'a str,
    pub secret: &'a str,
}

/// Link status as reported by the network driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    Idle,
    Connecting,
    Connected,
    Failed,
}

/// A network seen during a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedNetwork {
    pub network_id: heapless::String<32>,
    /// Received signal strength in dBm.
    pub rssi: i8,
}

/// Access-point parameters for the configuration portal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPoint<'a> {
    pub ssid: &'a str,
    pub password: &'a str,
    /// Resolved channel, always in `1..=11`.
    pub channel: u8,
}

/// Station-side network capability.
pub trait NetworkPort {
    /// Register every candidate and start one join without waiting for it.
    /// The driver picks the strongest reachable candidate; ties go to the
    /// earlier one.
    fn begin_join(&mut self, candidates: &[JoinCandidate<'_>]);

    /// Current link status.
    fn poll_status(&mut self) -> LinkStatus;

    /// Scan for nearby networks.  Used only to populate the portal form.
    fn scan(&mut self) -> heapless::Vec<ScannedNetwork, MAX_SCAN_RESULTS>;

    /// Switch the radio into access-point mode for the portal.
    fn start_access_point(&mut self, ap: &AccessPoint<'_>);
}

// ───────────────────────────────────────────────────────────────
// System port (driven adapter: domain → timer / reset)
// ───────────────────────────────────────────────────────────────

/// Clock, bounded delay, restart and chip identity.
pub trait SystemPort {
    /// Milliseconds since boot (monotonic).
    fn now_ms(&self) -> u64;

    /// Block for `ms` milliseconds.  Only ever called with small, bounded
    /// values from the join poll loop.
    fn delay_ms(&mut self, ms: u32);

    /// Restart the device.  On hardware this does not return; host
    /// simulations record the request and return.
    fn restart(&mut self);

    /// Short chip identifier used to name the portal access point.
    fn chip_id(&self) -> u32;
}

// ───────────────────────────────────────────────────────────────
// Reset-pattern oracle (external collaborator)
// ───────────────────────────────────────────────────────────────

/// Detects a burst of rapid power cycles, interpreted as an operator request
/// to reconfigure.
pub trait ResetDetector {
    /// Queried once at boot.
    fn detect_burst(&mut self) -> bool;

    /// Called every control-loop iteration so the detector can age out its
    /// detection window.
    fn tick(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`ManagerEvent`]s through this port.
pub trait EventSink {
    fn emit(&mut self, event: &ManagerEvent);
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from loading, validating or saving configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// No copy exists in storage (first boot).
    NotFound,
    /// Stored blob has the wrong size or undecodable text.
    Corrupted,
    /// The record header does not identify our format.
    BadHeader,
    /// Stored checksum does not match the content.
    ChecksumMismatch,
    /// Credential sets do not satisfy the validity policy.
    PolicyViolation,
    /// A configuration field failed range validation.
    /// The `&'static str` describes which field and why.
    ValidationFailed(&'static str),
    /// A transient buffer could not be allocated.
    OutOfMemory,
    /// Generic I/O error from the storage backend.
    IoError,
}

/// Errors from [`StoragePort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Requested key does not exist.
    NotFound,
    /// Storage partition is full.
    Full,
    /// Generic I/O error.
    IoError,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "config not found"),
            Self::Corrupted => write!(f, "config corrupted"),
            Self::BadHeader => write!(f, "unrecognised header"),
            Self::ChecksumMismatch => write!(f, "checksum mismatch"),
            Self::PolicyViolation => write!(f, "no usable credential set"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::OutOfMemory => write!(f, "out of memory"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl core::fmt::Display for StorageError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "key not found"),
            Self::Full => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl std::error::Error for ConfigError {}
impl std::error::Error for StorageError {}

impl From<StorageError> for ConfigError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound => Self::NotFound,
            StorageError::Full | StorageError::IoError => Self::IoError,
        }
    }
}

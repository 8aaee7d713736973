//! Configuration record and forced-portal flag.
//!
//! # Wire layout
//!
//! Every text field occupies a fixed, NUL-padded slot.  With `n` credential
//! sets the blob is:
//!
//! ```text
//! ┌────────┬──────────────────────────────┬──────────────┬──────────┐
//! │ header │ n × (network_id │ secret)    │ display_name │ checksum │
//! │  16 B  │ n × (   32 B    │  64 B )    │     24 B     │ i32 LE   │
//! └────────┴──────────────────────────────┴──────────────┴──────────┘
//! ```
//!
//! The checksum is the wrapping sum of every preceding byte, padding
//! included, so any single-byte change is detected.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::app::ports::ConfigError;
use crate::config::ValidityPolicy;

// ---------------------------------------------------------------------------
// Layout constants
// ---------------------------------------------------------------------------

pub const HEADER_SLOT: usize = 16;
pub const NETWORK_ID_SLOT: usize = 32;
pub const SECRET_SLOT: usize = 64;
pub const DISPLAY_NAME_SLOT: usize = 24;
pub const CHECKSUM_LEN: usize = 4;

/// Upper bound on credential sets a record can carry.
pub const MAX_CREDENTIAL_SETS: usize = 4;

/// Tag written into every record we produce.
pub const RECORD_HEADER: &str = "NETPROV_V1";

/// Placeholder marking a field as "not configured".
pub const BLANK: &str = "blank";

/// Size of a record blob with `sets` credential sets.
pub const fn record_len(sets: usize) -> usize {
    HEADER_SLOT + sets * (NETWORK_ID_SLOT + SECRET_SLOT) + DISPLAY_NAME_SLOT + CHECKSUM_LEN
}

/// Largest record blob any configuration can produce.
pub const MAX_RECORD_LEN: usize = record_len(MAX_CREDENTIAL_SETS);

/// Wrapping additive checksum over raw bytes.
pub fn checksum(bytes: &[u8]) -> i32 {
    bytes
        .iter()
        .fold(0i32, |acc, &b| acc.wrapping_add(i32::from(b)))
}

/// Copy `s` into a bounded string, cutting on a char boundary if it does
/// not fit.
pub fn bounded<const N: usize>(s: &str) -> heapless::String<N> {
    let mut end = s.len().min(N);
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    let mut out = heapless::String::new();
    // Cannot fail: `end <= N`.
    let _ = out.push_str(&s[..end]);
    out
}

// ---------------------------------------------------------------------------
// Credential set
// ---------------------------------------------------------------------------

/// One network identifier and its secret.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialSet {
    pub network_id: heapless::String<{ NETWORK_ID_SLOT - 1 }>,
    pub secret: heapless::String<{ SECRET_SLOT - 1 }>,
}

impl CredentialSet {
    /// Build a set, truncating either value to its slot capacity.
    pub fn new(network_id: &str, secret: &str) -> Self {
        Self {
            network_id: bounded(network_id),
            secret: bounded(secret),
        }
    }

    fn blank() -> Self {
        Self::new(BLANK, BLANK)
    }

    /// Usable for the validity policy: a real identifier and a long enough
    /// secret.
    pub fn is_valid(&self, min_secret_len: usize) -> bool {
        !self.network_id.is_empty()
            && self.network_id.as_str() != BLANK
            && self.secret.len() >= min_secret_len
    }

    /// Worth handing to the radio as a join candidate.
    pub fn is_joinable(&self, min_secret_len: usize) -> bool {
        !self.network_id.is_empty() && self.secret.len() >= min_secret_len
    }
}

impl fmt::Debug for CredentialSet {
    // Secrets never reach the log.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialSet")
            .field("network_id", &self.network_id.as_str())
            .field("secret_len", &self.secret.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Configuration record
// ---------------------------------------------------------------------------

/// The persisted configuration: header, credential sets and display name.
///
/// The number of credential sets is fixed at construction and never changes;
/// it must match the `credential_sets` setting the record is stored under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigRecord {
    header: heapless::String<{ HEADER_SLOT - 1 }>,
    credentials: heapless::Vec<CredentialSet, MAX_CREDENTIAL_SETS>,
    display_name: heapless::String<{ DISPLAY_NAME_SLOT - 1 }>,
}

impl ConfigRecord {
    /// All-zero record with `sets` empty credential sets and no header.
    pub fn empty(sets: usize) -> Self {
        let mut credentials = heapless::Vec::new();
        for _ in 0..sets.min(MAX_CREDENTIAL_SETS) {
            let _ = credentials.push(CredentialSet::default());
        }
        Self {
            header: heapless::String::new(),
            credentials,
            display_name: heapless::String::new(),
        }
    }

    /// Empty record carrying our header; the starting point of a portal
    /// session.
    pub fn fresh(sets: usize) -> Self {
        let mut r = Self::empty(sets);
        r.stamp_header();
        r
    }

    /// Recognisably unconfigured record written over corrupted storage.
    pub fn blank(sets: usize) -> Self {
        let mut r = Self::fresh(sets);
        for c in &mut r.credentials {
            *c = CredentialSet::blank();
        }
        r.display_name = bounded(BLANK);
        r
    }

    /// Builder helper: replace credential set `index`.  Out-of-range indices
    /// are ignored.
    pub fn with_credential(mut self, index: usize, network_id: &str, secret: &str) -> Self {
        if let Some(c) = self.credentials.get_mut(index) {
            *c = CredentialSet::new(network_id, secret);
        }
        self
    }

    /// Builder helper: set the display name.
    pub fn with_display_name(mut self, name: &str) -> Self {
        self.set_display_name(name);
        self
    }

    pub fn stamp_header(&mut self) {
        self.header = bounded(RECORD_HEADER);
    }

    pub fn header(&self) -> &str {
        &self.header
    }

    pub fn has_valid_header(&self) -> bool {
        self.header.as_str() == RECORD_HEADER
    }

    pub fn credential_sets(&self) -> usize {
        self.credentials.len()
    }

    pub fn credentials(&self) -> &[CredentialSet] {
        &self.credentials
    }

    pub fn credential(&self, index: usize) -> Option<&CredentialSet> {
        self.credentials.get(index)
    }

    pub fn set_network_id(&mut self, index: usize, value: &str) {
        if let Some(c) = self.credentials.get_mut(index) {
            c.network_id = bounded(value);
        }
    }

    pub fn set_secret(&mut self, index: usize, value: &str) {
        if let Some(c) = self.credentials.get_mut(index) {
            c.secret = bounded(value);
        }
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn set_display_name(&mut self, value: &str) {
        self.display_name = bounded(value);
    }

    /// Check the credential sets against `policy`.
    pub fn validate(&self, policy: ValidityPolicy, min_secret_len: usize) -> Result<(), ConfigError> {
        let mut sets = self.credentials.iter();
        let ok = match policy {
            ValidityPolicy::AnyOne => sets.any(|c| c.is_valid(min_secret_len)),
            ValidityPolicy::All => {
                !self.credentials.is_empty() && sets.all(|c| c.is_valid(min_secret_len))
            }
        };
        if ok {
            Ok(())
        } else {
            Err(ConfigError::PolicyViolation)
        }
    }

    // ── Encoding ──────────────────────────────────────────────

    /// Serialise into the fixed-slot blob, checksum included.
    pub fn encode(&self) -> heapless::Vec<u8, MAX_RECORD_LEN> {
        let len = record_len(self.credentials.len());
        let mut out: heapless::Vec<u8, MAX_RECORD_LEN> = heapless::Vec::new();
        // Cannot fail: `len <= MAX_RECORD_LEN`.
        let _ = out.resize(len, 0);

        let mut at = 0;
        at = put_slot(&mut out, at, HEADER_SLOT, &self.header);
        for c in &self.credentials {
            at = put_slot(&mut out, at, NETWORK_ID_SLOT, &c.network_id);
            at = put_slot(&mut out, at, SECRET_SLOT, &c.secret);
        }
        at = put_slot(&mut out, at, DISPLAY_NAME_SLOT, &self.display_name);

        let sum = checksum(&out[..at]);
        out[at..at + CHECKSUM_LEN].copy_from_slice(&sum.to_le_bytes());
        out
    }

    /// Parse a blob written by [`encode`](Self::encode) for `sets` credential
    /// sets.  Checks size, checksum and header, in that order.
    pub fn decode(bytes: &[u8], sets: usize) -> Result<Self, ConfigError> {
        if sets == 0 || sets > MAX_CREDENTIAL_SETS || bytes.len() != record_len(sets) {
            return Err(ConfigError::Corrupted);
        }
        let body = bytes.len() - CHECKSUM_LEN;
        let mut stored = [0u8; CHECKSUM_LEN];
        stored.copy_from_slice(&bytes[body..]);
        if i32::from_le_bytes(stored) != checksum(&bytes[..body]) {
            return Err(ConfigError::ChecksumMismatch);
        }

        let mut at = 0;
        let header = take_slot(bytes, &mut at, HEADER_SLOT)?;
        if header != RECORD_HEADER {
            return Err(ConfigError::BadHeader);
        }

        let mut record = Self::empty(sets);
        record.stamp_header();
        for c in &mut record.credentials {
            c.network_id = bounded(take_slot(bytes, &mut at, NETWORK_ID_SLOT)?);
            c.secret = bounded(take_slot(bytes, &mut at, SECRET_SLOT)?);
        }
        record.display_name = bounded(take_slot(bytes, &mut at, DISPLAY_NAME_SLOT)?);
        Ok(record)
    }
}

fn put_slot(out: &mut [u8], at: usize, slot: usize, text: &str) -> usize {
    let bytes = text.as_bytes();
    let n = bytes.len().min(slot - 1);
    out[at..at + n].copy_from_slice(&bytes[..n]);
    at + slot
}

/// Text up to the first NUL of the slot.  A slot must contain a terminator
/// and valid UTF-8.
fn take_slot<'b>(bytes: &'b [u8], at: &mut usize, slot: usize) -> Result<&'b str, ConfigError> {
    let raw = &bytes[*at..*at + slot];
    *at += slot;
    let end = raw
        .iter()
        .position(|&b| b == 0)
        .ok_or(ConfigError::Corrupted)?;
    core::str::from_utf8(&raw[..end]).map_err(|_| ConfigError::Corrupted)
}

// ---------------------------------------------------------------------------
// Forced-portal flag
// ---------------------------------------------------------------------------

/// Raw value of a transient forced-portal request.
pub const FORCED_TRANSIENT: u32 = 0xDEAD_BEEF;
/// Raw value of a persistent forced-portal request.
pub const FORCED_PERSISTENT: u32 = 0xBEEF_DEAD;

/// Persisted request to open the portal on the next boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ForcedPortal {
    #[default]
    None,
    /// Consumed by the next boot.
    Transient,
    /// Survives boots until a configuration is committed.
    Persistent,
}

impl ForcedPortal {
    /// Any bit pattern other than the two sentinels reads as `None`.
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            FORCED_TRANSIENT => Self::Transient,
            FORCED_PERSISTENT => Self::Persistent,
            _ => Self::None,
        }
    }

    pub fn to_raw(self) -> u32 {
        match self {
            Self::None => 0,
            Self::Transient => FORCED_TRANSIENT,
            Self::Persistent => FORCED_PERSISTENT,
        }
    }

    pub fn is_set(self) -> bool {
        self != Self::None
    }
}

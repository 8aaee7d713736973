//! Auxiliary field registry.
//!
//! The embedding application declares extra settings (an MQTT server, a
//! port, a token) as [`AuxField`]s backed by its own byte buffers.  The
//! registry offers them in the portal and persists them as one blob:
//!
//! ```text
//! ┌───────────────┬───────────────┬─────┬──────────┐
//! │ field 0 bytes │ field 1 bytes │ ... │ checksum │
//! │   max_len 0   │   max_len 1   │     │ i32 LE   │
//! └───────────────┴───────────────┴─────┴──────────┘
//! ```
//!
//! Buffers are borrowed, never resized, and only overwritten once an
//! incoming blob has passed its checksum.

use log::debug;

use crate::app::ports::ConfigError;
use crate::error::RegistryError;
use crate::record::{checksum, BLANK, CHECKSUM_LEN, MAX_CREDENTIAL_SETS};

/// Maximum number of auxiliary fields.
pub const MAX_AUX_FIELDS: usize = 16;
/// Longest accepted field id.
pub const MAX_AUX_ID_LEN: usize = 5;
/// Longest accepted display name.
pub const MAX_AUX_DISPLAY_NAME_LEN: usize = 16;

/// Portal keys of the network identifier of each credential set.
pub const NETWORK_ID_KEYS: [&str; MAX_CREDENTIAL_SETS] = ["id", "id1", "id2", "id3"];
/// Portal keys of the secret of each credential set.
pub const SECRET_KEYS: [&str; MAX_CREDENTIAL_SETS] = ["pw", "pw1", "pw2", "pw3"];
/// Portal key of the display name.
pub const DISPLAY_NAME_KEY: &str = "name";

fn is_reserved(id: &str) -> bool {
    id == DISPLAY_NAME_KEY || NETWORK_ID_KEYS.contains(&id) || SECRET_KEYS.contains(&id)
}

// ---------------------------------------------------------------------------
// AuxField
// ---------------------------------------------------------------------------

/// One application-defined setting.
#[derive(Debug)]
pub struct AuxField<'a> {
    id: &'static str,
    display_name: &'static str,
    buffer: &'a mut [u8],
    max_len: u8,
}

impl<'a> AuxField<'a> {
    /// Declare a field.  The first `max_len` bytes of `buffer` hold its value.
    pub fn new(
        id: &'static str,
        display_name: &'static str,
        buffer: &'a mut [u8],
        max_len: u8,
    ) -> Result<Self, RegistryError> {
        if id.is_empty() || id.len() > MAX_AUX_ID_LEN || is_reserved(id) {
            return Err(RegistryError::InvalidId);
        }
        if max_len == 0 || usize::from(max_len) > buffer.len() {
            return Err(RegistryError::InvalidLength);
        }
        Ok(Self {
            id,
            display_name: truncate_str(display_name, MAX_AUX_DISPLAY_NAME_LEN),
            buffer,
            max_len,
        })
    }

    pub fn id(&self) -> &'static str {
        self.id
    }

    pub fn display_name(&self) -> &'static str {
        self.display_name
    }

    pub fn max_len(&self) -> u8 {
        self.max_len
    }

    fn slot(&self) -> &[u8] {
        &self.buffer[..usize::from(self.max_len)]
    }

    fn slot_mut(&mut self) -> &mut [u8] {
        &mut self.buffer[..usize::from(self.max_len)]
    }

    /// Current value: text up to the first NUL, cut at the first invalid
    /// UTF-8 sequence.
    pub fn value(&self) -> &str {
        let slot = self.slot();
        let end = slot.iter().position(|&b| b == 0).unwrap_or(slot.len());
        match core::str::from_utf8(&slot[..end]) {
            Ok(s) => s,
            Err(e) => core::str::from_utf8(&slot[..e.valid_up_to()]).unwrap_or_default(),
        }
    }

    /// Replace the value, zero-padding the slot and truncating on a char
    /// boundary.
    pub fn set_value(&mut self, value: &str) {
        let cut = truncate_str(value, usize::from(self.max_len));
        let slot = self.slot_mut();
        slot.fill(0);
        slot[..cut.len()].copy_from_slice(cut.as_bytes());
    }

    /// Zero the slot.
    pub fn clear(&mut self) {
        self.slot_mut().fill(0);
    }
}

pub(crate) fn truncate_str(s: &str, max: usize) -> &str {
    let mut end = s.len().min(max);
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

// ---------------------------------------------------------------------------
// AuxRegistry
// ---------------------------------------------------------------------------

/// Ordered collection of [`AuxField`]s.
#[derive(Debug, Default)]
pub struct AuxRegistry<'a> {
    fields: heapless::Vec<AuxField<'a>, MAX_AUX_FIELDS>,
}

impl<'a> AuxRegistry<'a> {
    pub fn new() -> Self {
        Self {
            fields: heapless::Vec::new(),
        }
    }

    /// Append a field.  Order is kept in the portal and in the stored blob.
    pub fn register(&mut self, field: AuxField<'a>) -> Result<(), RegistryError> {
        if self.fields.iter().any(|f| f.id == field.id) {
            return Err(RegistryError::DuplicateId);
        }
        self.fields
            .push(field)
            .map_err(|_| RegistryError::TooManyFields)
    }

    /// Builder form of [`register`](Self::register).
    pub fn with(mut self, field: AuxField<'a>) -> Result<Self, RegistryError> {
        self.register(field)?;
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AuxField<'a>> {
        self.fields.iter()
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.id == id)
    }

    pub fn get(&self, id: &str) -> Option<&AuxField<'a>> {
        self.fields.iter().find(|f| f.id == id)
    }

    pub fn field_mut(&mut self, index: usize) -> Option<&mut AuxField<'a>> {
        self.fields.get_mut(index)
    }

    /// Sum of every field's `max_len`.
    pub fn payload_len(&self) -> usize {
        self.fields.iter().map(|f| usize::from(f.max_len)).sum()
    }

    /// Size of the stored blob, checksum included.
    pub fn blob_len(&self) -> usize {
        self.payload_len() + CHECKSUM_LEN
    }

    pub fn clear_all(&mut self) {
        for f in &mut self.fields {
            f.clear();
        }
    }

    /// Fill every field with the "not configured" marker.
    pub fn fill_blank(&mut self) {
        for f in &mut self.fields {
            f.set_value(BLANK);
        }
    }

    /// Serialise every slot plus checksum.
    pub fn encode(&self) -> Result<Vec<u8>, ConfigError> {
        let mut out = Vec::new();
        out.try_reserve_exact(self.blob_len())
            .map_err(|_| ConfigError::OutOfMemory)?;
        for f in &self.fields {
            out.extend_from_slice(f.slot());
        }
        let sum = checksum(&out);
        out.extend_from_slice(&sum.to_le_bytes());
        Ok(out)
    }

    /// Verify a stored blob and, only if it checks out, copy it into the
    /// field buffers.
    pub fn decode_into(&mut self, blob: &[u8]) -> Result<(), ConfigError> {
        if blob.len() != self.blob_len() {
            debug!(
                "Registry: blob is {} bytes, expected {}",
                blob.len(),
                self.blob_len()
            );
            return Err(ConfigError::Corrupted);
        }
        let body = blob.len() - CHECKSUM_LEN;
        let mut stored = [0u8; CHECKSUM_LEN];
        stored.copy_from_slice(&blob[body..]);
        if i32::from_le_bytes(stored) != checksum(&blob[..body]) {
            return Err(ConfigError::ChecksumMismatch);
        }

        let mut at = 0;
        for f in &mut self.fields {
            let n = usize::from(f.max_len);
            f.slot_mut().copy_from_slice(&blob[at..at + n]);
            at += n;
        }
        Ok(())
    }
}

//! Byte-addressed storage adapter (EEPROM, emulated EEPROM, raw flash).
//!
//! Implements [`StoragePort`] over any [`embedded_storage::Storage`].  Each
//! store key gets a fixed slot, laid out from `base`:
//!
//! ```text
//! ┌────────┬──────┬─────┬───────────────┬───────────┬──────────┐
//! │ record │ flag │ aux │ record backup │ flag bak. │ aux bak. │
//! └────────┴──────┴─────┴───────────────┴───────────┴──────────┘
//! ```
//!
//! Every slot starts with a `u16` LE length.  `0xFFFF` (erased) means the
//! key does not exist.  The payload is written before the length, so a
//! torn write leaves at worst a checksum mismatch in that one slot.

use core::cell::RefCell;

use embedded_storage::{ReadStorage, Storage};
use log::{debug, warn};

use crate::app::ports::{StorageError, StoragePort};
use crate::config::StorageLayout;

const LEN_PREFIX: usize = 2;
const ERASED_LEN: u16 = 0xFFFF;
const FLAG_LEN: usize = 4;

#[derive(Debug, Clone)]
struct Slot {
    key: heapless::String<15>,
    offset: u32,
    capacity: u16,
}

pub struct EepromAdapter<F> {
    flash: RefCell<F>,
    namespace: heapless::String<15>,
    slots: heapless::Vec<Slot, 6>,
}

impl<F: Storage> EepromAdapter<F> {
    /// Map `layout` onto `flash` starting at `base`.  `record_len` and
    /// `aux_len` are the exact blob sizes the store will write.
    pub fn new(
        flash: F,
        base: u32,
        layout: &StorageLayout,
        record_len: usize,
        aux_len: usize,
    ) -> Result<Self, StorageError> {
        let order: [(&str, usize); 6] = [
            (layout.record_key.as_str(), record_len),
            (layout.flag_key.as_str(), FLAG_LEN),
            (layout.aux_key.as_str(), aux_len),
            (layout.record_backup_key.as_str(), record_len),
            (layout.flag_backup_key.as_str(), FLAG_LEN),
            (layout.aux_backup_key.as_str(), aux_len),
        ];

        let mut slots = heapless::Vec::new();
        let mut offset = base as usize;
        for (key, len) in order {
            let capacity = u16::try_from(len).map_err(|_| StorageError::Full)?;
            if capacity == ERASED_LEN {
                return Err(StorageError::Full);
            }
            let slot = Slot {
                key: crate::record::bounded(key),
                offset: offset as u32,
                capacity,
            };
            slots.push(slot).map_err(|_| StorageError::Full)?;
            offset += LEN_PREFIX + len;
        }
        if offset > flash.capacity() {
            warn!(
                "EepromAdapter: layout needs {} bytes, device has {}",
                offset,
                flash.capacity()
            );
            return Err(StorageError::Full);
        }
        debug!("EepromAdapter: {} slots, {} bytes used", slots.len(), offset - base as usize);

        Ok(Self {
            flash: RefCell::new(flash),
            namespace: layout.namespace.clone(),
            slots,
        })
    }

    /// Give the underlying device back.
    pub fn release(self) -> F {
        self.flash.into_inner()
    }

    fn slot(&self, namespace: &str, key: &str) -> Option<&Slot> {
        if namespace != self.namespace.as_str() {
            return None;
        }
        self.slots.iter().find(|s| s.key.as_str() == key)
    }

    fn stored_len(&self, slot: &Slot) -> Result<Option<u16>, StorageError> {
        let mut prefix = [0u8; LEN_PREFIX];
        self.flash
            .borrow_mut()
            .read(slot.offset, &mut prefix)
            .map_err(|_| StorageError::IoError)?;
        match u16::from_le_bytes(prefix) {
            ERASED_LEN => Ok(None),
            n if n > slot.capacity => Err(StorageError::IoError),
            n => Ok(Some(n)),
        }
    }

    fn write_len(&self, slot: &Slot, len: u16) -> Result<(), StorageError> {
        self.flash
            .borrow_mut()
            .write(slot.offset, &len.to_le_bytes())
            .map_err(|_| StorageError::IoError)
    }
}

impl<F: Storage> StoragePort for EepromAdapter<F> {
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        let slot = self.slot(namespace, key).ok_or(StorageError::NotFound)?;
        let len = self.stored_len(slot)?.ok_or(StorageError::NotFound)?;
        let n = usize::from(len).min(buf.len());
        self.flash
            .borrow_mut()
            .read(slot.offset + LEN_PREFIX as u32, &mut buf[..n])
            .map_err(|_| StorageError::IoError)?;
        Ok(n)
    }

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        let slot = self.slot(namespace, key).ok_or(StorageError::IoError)?.clone();
        if data.len() > usize::from(slot.capacity) {
            return Err(StorageError::Full);
        }
        self.flash
            .borrow_mut()
            .write(slot.offset + LEN_PREFIX as u32, data)
            .map_err(|_| StorageError::IoError)?;
        self.write_len(&slot, data.len() as u16)
    }

    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError> {
        match self.slot(namespace, key).cloned() {
            Some(slot) => self.write_len(&slot, ERASED_LEN),
            None => Ok(()),
        }
    }

    fn exists(&self, namespace: &str, key: &str) -> bool {
        self.slot(namespace, key)
            .is_some_and(|slot| matches!(self.stored_len(slot), Ok(Some(_))))
    }
}

//! Dual-copy persistent store.
//!
//! Every blob (record, aux data, forced-portal flag) lives at a primary and
//! a backup key.  Writes go primary first, then backup, each independently;
//! reads fall back to the backup whenever the primary cannot be read **or**
//! does not validate.
//!
//! The two writes are not a transaction.  A power cut between them leaves
//! one fresh and one stale copy, both of which validate on their own.

use log::{debug, info, warn};

use crate::app::ports::{ConfigError, StorageError, StoragePort};
use crate::config::{ManagerConfig, StorageLayout, ValidityPolicy};
use crate::record::{ConfigRecord, ForcedPortal, MAX_RECORD_LEN};
use crate::registry::AuxRegistry;

/// Which copies a dual write managed to land.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteReport {
    pub primary_ok: bool,
    pub backup_ok: bool,
}

impl WriteReport {
    /// At least one copy is on storage.
    pub fn any(self) -> bool {
        self.primary_ok || self.backup_ok
    }

    pub fn both(self) -> bool {
        self.primary_ok && self.backup_ok
    }

    const SKIPPED: Self = Self {
        primary_ok: true,
        backup_ok: true,
    };
}

/// Integrity failures: the bytes are there but cannot be trusted.
pub fn is_integrity_error(e: ConfigError) -> bool {
    matches!(
        e,
        ConfigError::Corrupted | ConfigError::BadHeader | ConfigError::ChecksumMismatch
    )
}

/// Rank used to report the more informative of two copy failures.
fn severity(e: ConfigError) -> u8 {
    match e {
        ConfigError::NotFound => 0,
        ConfigError::IoError | ConfigError::OutOfMemory | ConfigError::ValidationFailed(_) => 1,
        ConfigError::Corrupted | ConfigError::BadHeader | ConfigError::ChecksumMismatch => 2,
        ConfigError::PolicyViolation => 3,
    }
}

fn worse(a: ConfigError, b: ConfigError) -> ConfigError {
    if severity(b) > severity(a) { b } else { a }
}

/// Record, aux and flag persistence over a [`StoragePort`].
#[derive(Debug, Clone)]
pub struct ConfigStore {
    layout: StorageLayout,
    sets: usize,
    policy: ValidityPolicy,
    min_secret_len: usize,
}

impl ConfigStore {
    pub fn new(config: &ManagerConfig) -> Self {
        Self {
            layout: config.storage.clone(),
            sets: config.credential_sets(),
            policy: config.validity_policy,
            min_secret_len: config.min_secret_len(),
        }
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    // ── Record ────────────────────────────────────────────────

    /// Load the first copy that decodes and satisfies the validity policy.
    ///
    /// When both copies fail, the more telling error is returned: a policy
    /// violation beats an integrity failure, which beats a missing key.
    pub fn load(&self, storage: &impl StoragePort) -> Result<ConfigRecord, ConfigError> {
        let primary = match self.load_copy(storage, &self.layout.record_key) {
            Ok(r) => return Ok(r),
            Err(e) => e,
        };
        debug!("Store: primary record unusable ({}), trying backup", primary);
        match self.load_copy(storage, &self.layout.record_backup_key) {
            Ok(r) => {
                info!("Store: record restored from backup");
                Ok(r)
            }
            Err(backup) => Err(worse(primary, backup)),
        }
    }

    fn load_copy(&self, storage: &impl StoragePort, key: &str) -> Result<ConfigRecord, ConfigError> {
        // One spare byte so an oversized blob is caught as a size mismatch.
        let mut buf = [0u8; MAX_RECORD_LEN + 1];
        let n = storage.read(&self.layout.namespace, key, &mut buf)?;
        let record = ConfigRecord::decode(&buf[..n], self.sets)?;
        record.validate(self.policy, self.min_secret_len)?;
        Ok(record)
    }

    /// Write the record to both locations.  The checksum is recomputed from
    /// the current content.
    pub fn save(&self, storage: &mut impl StoragePort, record: &ConfigRecord) -> WriteReport {
        let blob = record.encode();
        let report = self.write_both(
            storage,
            &self.layout.record_key,
            &self.layout.record_backup_key,
            &blob,
        );
        info!(
            "Store: record saved ({} bytes, primary={}, backup={})",
            blob.len(),
            report.primary_ok,
            report.backup_ok
        );
        report
    }

    // ── Aux data ──────────────────────────────────────────────

    /// Load aux data into the registry's buffers.  An empty registry is a
    /// no-op.
    pub fn load_aux(
        &self,
        storage: &impl StoragePort,
        registry: &mut AuxRegistry<'_>,
    ) -> Result<(), ConfigError> {
        if registry.is_empty() {
            return Ok(());
        }
        let mut buf = Vec::new();
        buf.try_reserve_exact(registry.blob_len() + 1)
            .map_err(|_| ConfigError::OutOfMemory)?;
        buf.resize(registry.blob_len() + 1, 0);

        let primary = match Self::load_aux_copy(
            storage,
            &self.layout.namespace,
            &self.layout.aux_key,
            &mut buf,
            registry,
        ) {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };
        debug!("Store: primary aux data unusable ({}), trying backup", primary);
        Self::load_aux_copy(
            storage,
            &self.layout.namespace,
            &self.layout.aux_backup_key,
            &mut buf,
            registry,
        )
        .map_err(|backup| worse(primary, backup))
    }

    fn load_aux_copy(
        storage: &impl StoragePort,
        namespace: &str,
        key: &str,
        buf: &mut [u8],
        registry: &mut AuxRegistry<'_>,
    ) -> Result<(), ConfigError> {
        let n = storage.read(namespace, key, buf)?;
        registry.decode_into(&buf[..n])
    }

    /// Write aux data to both locations.
    pub fn save_aux(
        &self,
        storage: &mut impl StoragePort,
        registry: &AuxRegistry<'_>,
    ) -> Result<WriteReport, ConfigError> {
        if registry.is_empty() {
            return Ok(WriteReport::SKIPPED);
        }
        let blob = registry.encode()?;
        let report = self.write_both(
            storage,
            &self.layout.aux_key,
            &self.layout.aux_backup_key,
            &blob,
        );
        info!(
            "Store: aux data saved ({} fields, primary={}, backup={})",
            registry.len(),
            report.primary_ok,
            report.backup_ok
        );
        Ok(report)
    }

    // ── Forced-portal flag ────────────────────────────────────

    /// Read the flag.  Falls back to the backup when the primary is
    /// unreadable; anything unrecognised reads as `None`.
    pub fn forced_portal(&self, storage: &impl StoragePort) -> ForcedPortal {
        let read = |key: &str| -> Option<u32> {
            let mut raw = [0u8; 4];
            match storage.read(&self.layout.namespace, key, &mut raw) {
                Ok(4) => Some(u32::from_le_bytes(raw)),
                _ => None,
            }
        };
        let raw = read(&self.layout.flag_key).or_else(|| read(&self.layout.flag_backup_key));
        ForcedPortal::from_raw(raw.unwrap_or(0))
    }

    pub fn set_forced_portal(
        &self,
        storage: &mut impl StoragePort,
        state: ForcedPortal,
    ) -> WriteReport {
        let report = self.write_both(
            storage,
            &self.layout.flag_key,
            &self.layout.flag_backup_key,
            &state.to_raw().to_le_bytes(),
        );
        info!("Store: forced-portal flag set to {:?}", state);
        report
    }

    pub fn clear_forced_portal(&self, storage: &mut impl StoragePort) -> WriteReport {
        self.set_forced_portal(storage, ForcedPortal::None)
    }

    // ── Internal ──────────────────────────────────────────────

    fn write_both(
        &self,
        storage: &mut impl StoragePort,
        primary: &str,
        backup: &str,
        data: &[u8],
    ) -> WriteReport {
        let ns = &self.layout.namespace;
        let primary_ok = log_write(storage.write(ns, primary, data), primary);
        let backup_ok = log_write(storage.write(ns, backup, data), backup);
        WriteReport {
            primary_ok,
            backup_ok,
        }
    }
}

fn log_write(result: Result<(), StorageError>, key: &str) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            warn!("Store: write to '{}' failed: {}", key, e);
            false
        }
    }
}

//! Manager configuration parameters
//!
//! Every tunable of the provisioning core.  Built once by the embedding
//! application and checked with [`ManagerConfig::validate`] before the
//! service is constructed.

use serde::{Deserialize, Serialize};

use crate::app::ports::ConfigError;
use crate::record::{ConfigRecord, MAX_CREDENTIAL_SETS};

/// How many credential sets must be usable for the record to count as valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ValidityPolicy {
    /// At least one set must be valid.
    AnyOne,
    /// Every set must be valid.
    #[default]
    All,
}

/// Where the store keeps its copies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageLayout {
    pub namespace: heapless::String<15>,
    pub record_key: heapless::String<15>,
    pub record_backup_key: heapless::String<15>,
    pub aux_key: heapless::String<15>,
    pub aux_backup_key: heapless::String<15>,
    pub flag_key: heapless::String<15>,
    pub flag_backup_key: heapless::String<15>,
}

impl StorageLayout {
    /// Every key in the layout, namespace excluded.
    pub fn keys(&self) -> [&str; 6] {
        [
            &self.record_key,
            &self.record_backup_key,
            &self.aux_key,
            &self.aux_backup_key,
            &self.flag_key,
            &self.flag_backup_key,
        ]
    }
}

impl Default for StorageLayout {
    fn default() -> Self {
        use crate::record::bounded;
        Self {
            namespace: bounded("netprov"),
            record_key: bounded("wm_config"),
            record_backup_key: bounded("wm_config_bak"),
            aux_key: bounded("wm_cred"),
            aux_backup_key: bounded("wm_cred_bak"),
            flag_key: bounded("wm_cp"),
            flag_backup_key: bounded("wm_cp_bak"),
        }
    }
}

/// Configuration-portal access point and form settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortalSettings {
    /// AP name.  `None` derives `ESP_<chipid>`.
    pub ssid: Option<heapless::String<32>>,
    /// AP password.  `None` derives `MyESP_<chipid>`.
    pub password: Option<heapless::String<63>>,
    /// AP channel, 0 picks one from uptime.
    pub channel: u8,
    /// Maximum scan entries offered in the form.
    pub max_networks_listed: u8,
    /// Networks at or below this quality (0–100) are hidden.  `None` shows all.
    pub min_signal_quality: Option<u8>,
}

impl Default for PortalSettings {
    fn default() -> Self {
        Self {
            ssid: None,
            password: None,
            channel: 10,
            max_networks_listed: 10,
            min_signal_quality: None,
        }
    }
}

/// Core provisioning configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerConfig {
    // --- Record shape ---
    /// Number of credential sets in the record
    pub credential_sets: u8,
    /// How many sets must be valid for the record to be usable
    pub validity_policy: ValidityPolicy,
    /// Minimum secret length for a set to be valid or joinable
    pub min_secret_len: u8,
    /// Offer and require the `name` field in the portal
    pub use_display_name: bool,

    // --- Join ---
    /// Wait after issuing a join before the first status poll (ms)
    pub join_first_wait_ms: u32,
    /// Wait between status polls (ms)
    pub join_poll_slice_ms: u32,
    /// Status polls per join attempt
    pub max_join_polls: u8,

    // --- Supervision ---
    /// Minimum time between steady-state rejoins (ms), 0 = every tick
    pub reconnect_interval_ms: u32,
    /// Link status check period (ms)
    pub status_check_interval_ms: u32,
    /// Portal lifetime before rejoining stored credentials (ms), 0 = never
    pub config_portal_timeout_ms: u32,
    /// Restart after too many consecutive failed rejoins
    pub reset_after_failed_rejoins: bool,
    /// Failed rejoins tolerated before restarting
    pub rejoin_failures_before_reset: u8,
    /// Restart instead of opening the portal when the boot join fails
    pub reset_on_boot_join_failure: bool,

    // --- Sub-sections ---
    pub storage: StorageLayout,
    pub portal: PortalSettings,

    /// Record written on every boot in place of the stored one
    pub default_record: Option<ConfigRecord>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            credential_sets: 2,
            validity_policy: ValidityPolicy::All,
            min_secret_len: 8,
            use_display_name: true,

            join_first_wait_ms: 800,
            join_poll_slice_ms: 500,
            max_join_polls: 1,

            reconnect_interval_ms: 0,
            status_check_interval_ms: 5000,
            config_portal_timeout_ms: 60_000,
            reset_after_failed_rejoins: true,
            rejoin_failures_before_reset: 10,
            reset_on_boot_join_failure: false,

            storage: StorageLayout::default(),
            portal: PortalSettings::default(),

            default_record: None,
        }
    }
}

impl ManagerConfig {
    pub fn credential_sets(&self) -> usize {
        self.credential_sets as usize
    }

    pub fn min_secret_len(&self) -> usize {
        self.min_secret_len as usize
    }

    /// Range-check every field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_CREDENTIAL_SETS).contains(&self.credential_sets()) {
            return Err(ConfigError::ValidationFailed(
                "credential_sets must be 1–4",
            ));
        }
        if !(1..=63).contains(&self.min_secret_len) {
            return Err(ConfigError::ValidationFailed(
                "min_secret_len must be 1–63",
            ));
        }
        if self.join_first_wait_ms > 5000 {
            return Err(ConfigError::ValidationFailed(
                "join_first_wait_ms must be 0–5000",
            ));
        }
        if !(10..=5000).contains(&self.join_poll_slice_ms) {
            return Err(ConfigError::ValidationFailed(
                "join_poll_slice_ms must be 10–5000",
            ));
        }
        if !(1..=20).contains(&self.max_join_polls) {
            return Err(ConfigError::ValidationFailed(
                "max_join_polls must be 1–20",
            ));
        }
        if self.reconnect_interval_ms > 600_000 {
            return Err(ConfigError::ValidationFailed(
                "reconnect_interval_ms must be 0–600000",
            ));
        }
        if !(1000..=60_000).contains(&self.status_check_interval_ms) {
            return Err(ConfigError::ValidationFailed(
                "status_check_interval_ms must be 1000–60000",
            ));
        }
        if self.config_portal_timeout_ms != 0
            && !(10_000..=600_000).contains(&self.config_portal_timeout_ms)
        {
            return Err(ConfigError::ValidationFailed(
                "config_portal_timeout_ms must be 0 or 10000–600000",
            ));
        }
        if !(2..=100).contains(&self.rejoin_failures_before_reset) {
            return Err(ConfigError::ValidationFailed(
                "rejoin_failures_before_reset must be 2–100",
            ));
        }
        self.validate_storage()?;
        self.validate_portal()?;
        if let Some(r) = &self.default_record {
            if r.credential_sets() != self.credential_sets() {
                return Err(ConfigError::ValidationFailed(
                    "default_record must have credential_sets sets",
                ));
            }
        }
        Ok(())
    }

    fn validate_storage(&self) -> Result<(), ConfigError> {
        let layout = &self.storage;
        if layout.namespace.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "storage namespace must not be empty",
            ));
        }
        let keys = layout.keys();
        if keys.iter().any(|k| k.is_empty()) {
            return Err(ConfigError::ValidationFailed(
                "storage keys must not be empty",
            ));
        }
        for (i, a) in keys.iter().enumerate() {
            if keys[i + 1..].contains(a) {
                return Err(ConfigError::ValidationFailed(
                    "storage keys must be distinct",
                ));
            }
        }
        Ok(())
    }

    fn validate_portal(&self) -> Result<(), ConfigError> {
        let portal = &self.portal;
        if portal.channel > 11 {
            return Err(ConfigError::ValidationFailed(
                "portal channel must be 0–11",
            ));
        }
        if !(2..=15).contains(&portal.max_networks_listed) {
            return Err(ConfigError::ValidationFailed(
                "max_networks_listed must be 2–15",
            ));
        }
        if portal.min_signal_quality.is_some_and(|q| q > 100) {
            return Err(ConfigError::ValidationFailed(
                "min_signal_quality must be 0–100",
            ));
        }
        if portal.password.as_ref().is_some_and(|p| p.len() < 8) {
            return Err(ConfigError::ValidationFailed(
                "portal password must be at least 8 characters",
            ));
        }
        Ok(())
    }
}

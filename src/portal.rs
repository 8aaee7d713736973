//! Configuration exchange protocol.
//!
//! The portal's web front end talks to the core with one `(key, value)`
//! pair per request:
//!
//! - `("", "")` reads the current state back as a [`FormView`].
//! - Anything else is a field update, acknowledged with [`ACK`].
//!
//! Recognised keys are `id`/`pw` for the first credential set, `id1`/`pw1`
//! and so on for the rest, `name` for the display name when enabled, plus
//! every aux field id.  The first write to a key wins; once every required
//! key has been written the session is complete and the caller commits.
//! Nothing reaches the live record or the aux buffers before then.

use log::{debug, info};
use serde::Serialize;

use crate::app::ports::{AccessPoint, ScannedNetwork};
use crate::config::{ManagerConfig, PortalSettings};
use crate::record::{bounded, ConfigRecord, NETWORK_ID_SLOT, SECRET_SLOT, DISPLAY_NAME_SLOT};
use crate::registry::{
    truncate_str, AuxRegistry, DISPLAY_NAME_KEY, NETWORK_ID_KEYS, SECRET_KEYS,
};

/// Plain-text acknowledgment returned for every update request.
pub const ACK: &str = "OK";

/// Upper bound on networks offered in the form.
pub const MAX_LISTED_NETWORKS: usize = 15;

/// Highest channel the portal access point uses.
pub const MAX_AP_CHANNEL: u8 = 11;

const NETWORK_ID_LABELS: [&str; 4] = ["Network", "Network 1", "Network 2", "Network 3"];
const SECRET_LABELS: [&str; 4] = ["Secret", "Secret 1", "Secret 2", "Secret 3"];
const DISPLAY_NAME_LABEL: &str = "Device name";

// ---------------------------------------------------------------------------
// Requests and replies
// ---------------------------------------------------------------------------

/// A decoded portal request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeRequest<'r> {
    ReadForm,
    Set { key: &'r str, value: &'r str },
}

impl<'r> ExchangeRequest<'r> {
    /// Classify an already URL-decoded pair.
    pub fn parse(key: &'r str, value: &'r str) -> Self {
        if key.is_empty() && value.is_empty() {
            Self::ReadForm
        } else {
            Self::Set { key, value }
        }
    }
}

/// What the portal front end should send back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeReply {
    Form(FormView),
    Ack,
}

impl ExchangeReply {
    /// Response body: the form as JSON, or the plain acknowledgment.
    pub fn body(&self) -> Result<String, serde_json::Error> {
        match self {
            Self::Form(view) => view.to_json(),
            Self::Ack => Ok(String::from(ACK)),
        }
    }
}

// ---------------------------------------------------------------------------
// Form view
// ---------------------------------------------------------------------------

/// One editable field of the form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormField {
    pub key: &'static str,
    pub label: &'static str,
    pub value: String,
    pub max_len: u8,
}

/// One scanned network offered as a suggestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkEntry {
    pub network_id: heapless::String<32>,
    /// Signal quality, 0–100.
    pub quality: u8,
}

/// Everything the front end needs to render the configuration page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormView {
    pub title: String,
    pub fields: Vec<FormField>,
    pub networks: heapless::Vec<NetworkEntry, MAX_LISTED_NETWORKS>,
}

impl FormView {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn field(&self, key: &str) -> Option<&FormField> {
        self.fields.iter().find(|f| f.key == key)
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Field a portal key resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldKey {
    NetworkId(usize),
    Secret(usize),
    DisplayName,
    Aux(usize),
}

/// Result of applying one update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOutcome {
    Accepted { updated: u8, required: u8 },
    /// The key was already written this session.
    Repeated,
    /// Not a key this configuration knows.
    Unknown,
    /// The update completed the session.
    Complete,
}

/// State of one portal session: the draft record, staged aux values and
/// which keys arrived.
#[derive(Debug)]
pub struct ExchangeSession {
    sets: usize,
    use_display_name: bool,
    aux_count: usize,
    draft: Option<ConfigRecord>,
    /// Aux values by registry index, held back until commit.
    aux_draft: Vec<Option<String>>,
    updated: u32,
}

impl ExchangeSession {
    pub fn new(config: &ManagerConfig, aux_count: usize) -> Self {
        Self {
            sets: config.credential_sets(),
            use_display_name: config.use_display_name,
            aux_count,
            draft: None,
            aux_draft: vec![None; aux_count],
            updated: 0,
        }
    }

    /// Fixed fields plus aux fields.
    pub fn required(&self) -> u8 {
        (2 * self.sets + usize::from(self.use_display_name) + self.aux_count) as u8
    }

    pub fn updated(&self) -> u8 {
        self.updated.count_ones() as u8
    }

    pub fn is_complete(&self) -> bool {
        self.updated() == self.required()
    }

    /// The record being assembled, once the first update has arrived.
    pub fn draft(&self) -> Option<&ConfigRecord> {
        self.draft.as_ref()
    }

    /// Hand over the draft for commit.  Only meaningful once complete.
    pub fn take_draft(&mut self) -> Option<ConfigRecord> {
        self.draft.take()
    }

    /// Aux value staged for registry slot `index`, if one arrived.
    pub fn staged_aux(&self, index: usize) -> Option<&str> {
        self.aux_draft.get(index)?.as_deref()
    }

    /// Write the staged aux values into the registry buffers.  Part of
    /// committing a complete session.
    pub fn commit_aux(&mut self, registry: &mut AuxRegistry<'_>) {
        for (i, staged) in self.aux_draft.iter_mut().enumerate() {
            if let (Some(value), Some(field)) = (staged.take(), registry.field_mut(i)) {
                field.set_value(&value);
            }
        }
    }

    fn resolve(&self, key: &str, registry: &AuxRegistry<'_>) -> Option<(FieldKey, u32)> {
        let sets = self.sets;
        if let Some(i) = NETWORK_ID_KEYS[..sets].iter().position(|k| *k == key) {
            return Some((FieldKey::NetworkId(i), 2 * i as u32));
        }
        if let Some(i) = SECRET_KEYS[..sets].iter().position(|k| *k == key) {
            return Some((FieldKey::Secret(i), 2 * i as u32 + 1));
        }
        let fixed = 2 * sets as u32;
        if self.use_display_name && key == DISPLAY_NAME_KEY {
            return Some((FieldKey::DisplayName, fixed));
        }
        let aux_base = fixed + u32::from(self.use_display_name);
        registry
            .index_of(key)
            .map(|i| (FieldKey::Aux(i), aux_base + i as u32))
    }

    /// Apply one update.  The draft is reset to a fresh record (header set)
    /// on the first update of the session, recognised or not.
    pub fn apply(&mut self, key: &str, value: &str, registry: &AuxRegistry<'_>) -> SetOutcome {
        let sets = self.sets;
        self.draft.get_or_insert_with(|| ConfigRecord::fresh(sets));

        let Some((field, bit)) = self.resolve(key, registry) else {
            debug!("Portal: ignoring unknown key '{}'", key);
            return SetOutcome::Unknown;
        };
        let mask = 1u32 << bit;
        if self.updated & mask != 0 {
            debug!("Portal: '{}' already set this session", key);
            return SetOutcome::Repeated;
        }

        let draft = self.draft.get_or_insert_with(|| ConfigRecord::fresh(sets));
        match field {
            FieldKey::NetworkId(i) => draft.set_network_id(i, value),
            FieldKey::Secret(i) => draft.set_secret(i, value),
            FieldKey::DisplayName => draft.set_display_name(value),
            FieldKey::Aux(i) => {
                let max = registry.iter().nth(i).map_or(0, |f| usize::from(f.max_len()));
                if let Some(slot) = self.aux_draft.get_mut(i) {
                    *slot = Some(truncate_str(value, max).to_string());
                }
            }
        }
        self.updated |= mask;

        let (updated, required) = (self.updated(), self.required());
        info!("Portal: field '{}' set ({}/{})", key, updated, required);
        if updated == required {
            SetOutcome::Complete
        } else {
            SetOutcome::Accepted { updated, required }
        }
    }

    /// Build the form.  Values are prefilled from `record` only when it was
    /// valid; a session in progress shows its draft and staged aux values
    /// instead.
    pub fn form_view(
        &self,
        record: &ConfigRecord,
        record_valid: bool,
        registry: &AuxRegistry<'_>,
        title: &str,
        networks: heapless::Vec<NetworkEntry, MAX_LISTED_NETWORKS>,
    ) -> FormView {
        let source = match (&self.draft, record_valid) {
            (Some(d), _) => Some(d),
            (None, true) => Some(record),
            (None, false) => None,
        };
        let cred = |i: usize| source.and_then(|r| r.credential(i));

        let mut fields = Vec::with_capacity(usize::from(self.required()));
        for i in 0..self.sets {
            fields.push(FormField {
                key: NETWORK_ID_KEYS[i],
                label: NETWORK_ID_LABELS[i],
                value: cred(i).map(|c| c.network_id.to_string()).unwrap_or_default(),
                max_len: (NETWORK_ID_SLOT - 1) as u8,
            });
            fields.push(FormField {
                key: SECRET_KEYS[i],
                label: SECRET_LABELS[i],
                value: cred(i).map(|c| c.secret.to_string()).unwrap_or_default(),
                max_len: (SECRET_SLOT - 1) as u8,
            });
        }
        if self.use_display_name {
            fields.push(FormField {
                key: DISPLAY_NAME_KEY,
                label: DISPLAY_NAME_LABEL,
                value: source.map(|r| r.display_name().to_string()).unwrap_or_default(),
                max_len: (DISPLAY_NAME_SLOT - 1) as u8,
            });
        }
        for (i, f) in registry.iter().enumerate() {
            fields.push(FormField {
                key: f.id(),
                label: f.display_name(),
                value: self.staged_aux(i).unwrap_or(f.value()).to_string(),
                max_len: f.max_len(),
            });
        }

        FormView {
            title: title.to_string(),
            fields,
            networks,
        }
    }
}

// ---------------------------------------------------------------------------
// Scan list
// ---------------------------------------------------------------------------

/// Map RSSI (dBm) to a 0–100 quality figure.
pub fn signal_quality(rssi: i8) -> u8 {
    (2 * (i16::from(rssi) + 100)).clamp(0, 100) as u8
}

/// Strongest first, one entry per network id, quality-filtered and capped.
pub fn network_list(
    scanned: &[ScannedNetwork],
    settings: &PortalSettings,
) -> heapless::Vec<NetworkEntry, MAX_LISTED_NETWORKS> {
    let mut order: heapless::Vec<&ScannedNetwork, { crate::app::ports::MAX_SCAN_RESULTS }> =
        scanned.iter().take(crate::app::ports::MAX_SCAN_RESULTS).collect();
    order.sort_by(|a, b| b.rssi.cmp(&a.rssi));

    let cap = usize::from(settings.max_networks_listed).min(MAX_LISTED_NETWORKS);
    let mut out: heapless::Vec<NetworkEntry, MAX_LISTED_NETWORKS> = heapless::Vec::new();
    for net in order {
        if out.len() >= cap {
            break;
        }
        if net.network_id.is_empty() || out.iter().any(|e| e.network_id == net.network_id) {
            continue;
        }
        let quality = signal_quality(net.rssi);
        if settings.min_signal_quality.is_some_and(|min| quality <= min) {
            continue;
        }
        let _ = out.push(NetworkEntry {
            network_id: net.network_id.clone(),
            quality,
        });
    }
    out
}

// ---------------------------------------------------------------------------
// Access point
// ---------------------------------------------------------------------------

/// Portal access-point settings with defaults filled in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAccessPoint {
    pub ssid: heapless::String<32>,
    pub password: heapless::String<63>,
    pub channel: u8,
}

impl ResolvedAccessPoint {
    /// Fill in SSID and password from the chip id and pick a channel.
    /// Channel 0 derives one from uptime; anything above the maximum falls
    /// back to 1.
    pub fn resolve(settings: &PortalSettings, chip_id: u32, now_ms: u64) -> Self {
        let ssid = settings
            .ssid
            .clone()
            .unwrap_or_else(|| bounded(&format!("ESP_{:X}", chip_id)));
        let password = settings
            .password
            .clone()
            .unwrap_or_else(|| bounded(&format!("MyESP_{:X}", chip_id)));
        let channel = match settings.channel {
            0 => (now_ms % u64::from(MAX_AP_CHANNEL)) as u8 + 1,
            c if c > MAX_AP_CHANNEL => 1,
            c => c,
        };
        Self {
            ssid,
            password,
            channel,
        }
    }

    pub fn as_port(&self) -> AccessPoint<'_> {
        AccessPoint {
            ssid: &self.ssid,
            password: &self.password,
            channel: self.channel,
        }
    }
}

//! Mock platform for integration tests.
//!
//! Storage is a shared handle so a test can drop a service, "reboot" by
//! building a new one over a clone, and see exactly what the first one
//! persisted.  The radio, clock and reset detector are scripted and record
//! every call.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use netprov::app::ports::{
    AccessPoint, EventSink, JoinCandidate, LinkStatus, MAX_SCAN_RESULTS, ResetDetector,
    ScannedNetwork, StorageError, StoragePort, SystemPort,
};
use netprov::record::bounded;
use netprov::store::ConfigStore;
use netprov::{
    AuxRegistry, ConfigRecord, ManagerConfig, ManagerEvent, ProvisioningService, RestartReason,
};

pub const NAMESPACE: &str = "netprov";

// ── MockStorage ───────────────────────────────────────────────

#[derive(Default)]
struct StorageState {
    blobs: HashMap<String, Vec<u8>>,
    failing: HashSet<String>,
}

/// Key-value storage shared between every clone.
#[derive(Clone, Default)]
pub struct MockStorage {
    inner: Rc<RefCell<StorageState>>,
}

#[allow(dead_code)]
impl MockStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn path(namespace: &str, key: &str) -> String {
        format!("{}::{}", namespace, key)
    }

    pub fn raw(&self, key: &str) -> Option<Vec<u8>> {
        self.inner
            .borrow()
            .blobs
            .get(&Self::path(NAMESPACE, key))
            .cloned()
    }

    pub fn remove(&self, key: &str) {
        self.inner
            .borrow_mut()
            .blobs
            .remove(&Self::path(NAMESPACE, key));
    }

    /// Flip every bit of one stored byte.
    pub fn corrupt(&self, key: &str, offset: usize) {
        let mut state = self.inner.borrow_mut();
        let blob = state
            .blobs
            .get_mut(&Self::path(NAMESPACE, key))
            .expect("key to corrupt must exist");
        blob[offset] ^= 0xFF;
    }

    /// Make writes to `key` fail with an I/O error until cleared.
    pub fn fail_writes(&self, key: &str, fail: bool) {
        let path = Self::path(NAMESPACE, key);
        let mut state = self.inner.borrow_mut();
        if fail {
            state.failing.insert(path);
        } else {
            state.failing.remove(&path);
        }
    }

    /// Persist `record` to both copies the way the service would.
    pub fn seed(&self, config: &ManagerConfig, record: &ConfigRecord) {
        let mut handle = self.clone();
        ConfigStore::new(config).save(&mut handle, record);
    }
}

impl StoragePort for MockStorage {
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        let state = self.inner.borrow();
        match state.blobs.get(&Self::path(namespace, key)) {
            Some(v) if v.len() <= buf.len() => {
                buf[..v.len()].copy_from_slice(v);
                Ok(v.len())
            }
            Some(_) => Err(StorageError::IoError),
            None => Err(StorageError::NotFound),
        }
    }

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        let path = Self::path(namespace, key);
        let mut state = self.inner.borrow_mut();
        if state.failing.contains(&path) {
            return Err(StorageError::IoError);
        }
        state.blobs.insert(path, data.to_vec());
        Ok(())
    }

    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError> {
        self.inner
            .borrow_mut()
            .blobs
            .remove(&Self::path(namespace, key));
        Ok(())
    }

    fn exists(&self, namespace: &str, key: &str) -> bool {
        self.inner
            .borrow()
            .blobs
            .contains_key(&Self::path(namespace, key))
    }
}

// ── MockNetwork ───────────────────────────────────────────────

/// Radio that accepts the first candidate matching a reachable network.
#[derive(Default)]
pub struct MockNetwork {
    reachable: Vec<(String, String)>,
    online: bool,
    connected: Option<String>,
    joining: bool,
    pub joins: Vec<Vec<String>>,
    pub scans: Vec<ScannedNetwork>,
    pub scan_calls: u32,
    pub access_point: Option<(String, u8)>,
}

#[allow(dead_code)]
impl MockNetwork {
    pub fn new() -> Self {
        Self {
            online: true,
            ..Self::default()
        }
    }

    pub fn with_network(mut self, network_id: &str, secret: &str) -> Self {
        self.reachable
            .push((network_id.to_string(), secret.to_string()));
        self
    }

    pub fn with_scan(mut self, network_id: &str, rssi: i8) -> Self {
        self.scans.push(ScannedNetwork {
            network_id: bounded(network_id),
            rssi,
        });
        self
    }

    /// Take every network off the air.  A live link drops on the next poll.
    pub fn set_online(&mut self, online: bool) {
        self.online = online;
    }

    /// The link comes back without a join, as the driver's auto-reconnect
    /// would do.
    pub fn reconnect(&mut self, network_id: &str) {
        self.online = true;
        self.connected = Some(network_id.to_string());
    }

    pub fn connected_to(&self) -> Option<&str> {
        self.connected.as_deref()
    }
}

impl netprov::app::ports::NetworkPort for MockNetwork {
    fn begin_join(&mut self, candidates: &[JoinCandidate<'_>]) {
        self.joins
            .push(candidates.iter().map(|c| c.network_id.to_string()).collect());
        self.connected = None;
        self.joining = true;
        if !self.online {
            return;
        }
        self.connected = candidates
            .iter()
            .find(|c| {
                self.reachable
                    .iter()
                    .any(|(id, pw)| id == c.network_id && pw == c.secret)
            })
            .map(|c| c.network_id.to_string());
    }

    fn poll_status(&mut self) -> LinkStatus {
        if self.connected.is_some() && !self.online {
            self.connected = None;
        }
        match (&self.connected, self.joining) {
            (Some(_), _) => LinkStatus::Connected,
            (None, true) => LinkStatus::Connecting,
            (None, false) => LinkStatus::Idle,
        }
    }

    fn scan(&mut self) -> heapless::Vec<ScannedNetwork, MAX_SCAN_RESULTS> {
        self.scan_calls += 1;
        self.scans.iter().take(MAX_SCAN_RESULTS).cloned().collect()
    }

    fn start_access_point(&mut self, ap: &AccessPoint<'_>) {
        self.joining = false;
        self.access_point = Some((ap.ssid.to_string(), ap.channel));
    }
}

// ── MockClock ─────────────────────────────────────────────────

/// Virtual clock.  Delays advance it; restarts are counted.
#[derive(Default)]
pub struct MockClock {
    pub now: u64,
    pub slept: u64,
    pub restarts: u32,
}

impl MockClock {
    pub fn advance(&mut self, ms: u64) {
        self.now += ms;
    }
}

impl SystemPort for MockClock {
    fn now_ms(&self) -> u64 {
        self.now
    }

    fn delay_ms(&mut self, ms: u32) {
        self.now += u64::from(ms);
        self.slept += u64::from(ms);
    }

    fn restart(&mut self) {
        self.restarts += 1;
    }

    fn chip_id(&self) -> u32 {
        0x00AB_CDEF
    }
}

// ── MockDetector ──────────────────────────────────────────────

#[derive(Default)]
pub struct MockDetector {
    burst: bool,
    pub ticks: u32,
}

impl MockDetector {
    pub fn new(burst: bool) -> Self {
        Self { burst, ticks: 0 }
    }
}

impl ResetDetector for MockDetector {
    fn detect_burst(&mut self) -> bool {
        self.burst
    }

    fn tick(&mut self) {
        self.ticks += 1;
    }
}

// ── RecordingSink ─────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<ManagerEvent>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn contains(&self, event: &ManagerEvent) -> bool {
        self.events.contains(event)
    }

    pub fn count(&self, pred: impl Fn(&ManagerEvent) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }

    pub fn restarts(&self) -> Vec<RestartReason> {
        self.events
            .iter()
            .filter_map(|e| match e {
                ManagerEvent::RestartRequested(r) => Some(*r),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &ManagerEvent) {
        self.events.push(event.clone());
    }
}

// ── Boot helpers ──────────────────────────────────────────────

pub type TestService<'a> =
    ProvisioningService<'a, MockStorage, MockNetwork, MockClock, MockDetector>;

/// Build a service over a clone of `storage` and run `begin()`.
pub fn boot<'a>(
    config: ManagerConfig,
    registry: AuxRegistry<'a>,
    storage: &MockStorage,
    network: MockNetwork,
    reset_burst: bool,
) -> (TestService<'a>, RecordingSink) {
    let mut service = ProvisioningService::new(
        config,
        registry,
        storage.clone(),
        network,
        MockClock::default(),
        MockDetector::new(reset_burst),
    )
    .expect("test config must validate");
    let mut sink = RecordingSink::default();
    service.begin(&mut sink);
    (service, sink)
}

/// Both credential sets usable under the default policy.
pub fn home_record() -> ConfigRecord {
    ConfigRecord::fresh(2)
        .with_credential(0, "HomeNet", "longenoughpwd")
        .with_credential(1, "Backup", "backuppasswd")
        .with_display_name("kitchen")
}

//! WiFi adapter.
//!
//! Implements [`NetworkPort`]: multi-candidate station join, link status,
//! scanning and the portal access point.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: real ESP-IDF WiFi driver calls via `esp_idf_svc::wifi`.
//! - **all other targets**: a simulated radio with scripted networks for
//!   host-side tests.
//!
//! ## Candidate selection
//!
//! `begin_join` scans once and orders the well-formed candidates whose SSID
//! is visible, strongest first.  Equal signal goes to the earlier
//! candidate.  A candidate turned down while `begin_join` runs hands over
//! to the next one in the same attempt, and `Failed` is reported only once
//! every visible candidate has been turned down.  Turned-down candidates,
//! and any still unconfirmed when the next attempt starts, go to the back
//! of the order until a join succeeds.  Association itself is left to the
//! driver; the supervisor polls [`NetworkPort::poll_status`].

use log::{info, warn};

use super::utils::is_printable_ascii;
use crate::app::ports::{
    AccessPoint, JoinCandidate, LinkStatus, NetworkPort, ScannedNetwork, MAX_SCAN_RESULTS,
};
use crate::record::{bounded, MAX_CREDENTIAL_SETS};

#[cfg(target_os = "espidf")]
use esp_idf_svc::wifi::{
    AccessPointConfiguration, AuthMethod, ClientConfiguration, Configuration, EspWifi,
};

// ───────────────────────────────────────────────────────────────
// Validation
// ───────────────────────────────────────────────────────────────

fn valid_ssid(ssid: &str) -> bool {
    !ssid.is_empty() && ssid.len() <= 32 && is_printable_ascii(ssid)
}

/// Empty means an open network, otherwise WPA2 needs 8–63 bytes.
fn valid_password(password: &str) -> bool {
    password.is_empty() || (8..=63).contains(&password.len())
}

// ───────────────────────────────────────────────────────────────
// Join plan
// ───────────────────────────────────────────────────────────────

/// A candidate copied out of the caller's borrow so it can outlive
/// `begin_join`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Candidate {
    ssid: heapless::String<32>,
    secret: heapless::String<63>,
}

/// Order in which one join attempt works through its candidates.
#[derive(Debug, Default)]
struct JoinPlan {
    /// Remaining candidates, next first.
    queue: heapless::Vec<Candidate, MAX_CREDENTIAL_SETS>,
    /// Candidate handed to the radio and not yet confirmed.
    current: Option<heapless::String<32>>,
    /// Networks that let an earlier attempt down.
    demoted: heapless::Vec<heapless::String<32>, MAX_CREDENTIAL_SETS>,
}

impl JoinPlan {
    /// Order the visible, well-formed `candidates` for a fresh attempt.
    fn start(&mut self, candidates: &[JoinCandidate<'_>], scan: &[ScannedNetwork]) {
        if let Some(stale) = self.current.take() {
            self.demote(stale);
        }
        let mut ranked: heapless::Vec<(bool, i8, &JoinCandidate<'_>), MAX_CREDENTIAL_SETS> =
            heapless::Vec::new();
        for c in candidates {
            if !valid_ssid(c.network_id) || !valid_password(c.secret) {
                warn!("WiFi: skipping malformed candidate '{}'", c.network_id);
                continue;
            }
            let Some(rssi) = scan
                .iter()
                .filter(|n| n.network_id.as_str() == c.network_id)
                .map(|n| n.rssi)
                .max()
            else {
                continue;
            };
            let demoted = self.demoted.iter().any(|d| d.as_str() == c.network_id);
            let _ = ranked.push((demoted, rssi, c));
        }
        // Stable: ties keep candidate order.
        ranked.sort_by_key(|&(demoted, rssi, _)| (demoted, core::cmp::Reverse(rssi)));
        self.queue = ranked
            .iter()
            .map(|(_, _, c)| Candidate {
                ssid: bounded(c.network_id),
                secret: bounded(c.secret),
            })
            .collect();
    }

    /// Take the next candidate to hand to the radio.
    fn next(&mut self) -> Option<Candidate> {
        if self.queue.is_empty() {
            return None;
        }
        let c = self.queue.remove(0);
        self.current = Some(c.ssid.clone());
        Some(c)
    }

    /// The current candidate turned the join down.
    fn rejected(&mut self) {
        if let Some(ssid) = self.current.take() {
            self.demote(ssid);
        }
    }

    fn succeeded(&mut self) {
        self.current = None;
        self.demoted.clear();
    }

    fn has_next(&self) -> bool {
        !self.queue.is_empty()
    }

    fn demote(&mut self, ssid: heapless::String<32>) {
        if !self.demoted.contains(&ssid) {
            let _ = self.demoted.push(ssid);
        }
    }
}

// ───────────────────────────────────────────────────────────────
// WiFi adapter (ESP-IDF)
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub struct WifiAdapter {
    wifi: EspWifi<'static>,
    ap: Option<AccessPointConfiguration>,
    status: LinkStatus,
    plan: JoinPlan,
}

#[cfg(target_os = "espidf")]
impl WifiAdapter {
    pub fn new(wifi: EspWifi<'static>) -> Self {
        Self {
            wifi,
            ap: None,
            status: LinkStatus::Idle,
            plan: JoinPlan::default(),
        }
    }

    fn apply(&mut self, client: ClientConfiguration) -> Result<(), esp_idf_svc::sys::EspError> {
        let conf = match &self.ap {
            Some(ap) => Configuration::Mixed(client, ap.clone()),
            None => Configuration::Client(client),
        };
        self.wifi.set_configuration(&conf)?;
        if !self.wifi.is_started()? {
            self.wifi.start()?;
        }
        Ok(())
    }

    fn connect_to(&mut self, c: &Candidate) -> Result<(), esp_idf_svc::sys::EspError> {
        let auth_method = if c.secret.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        };
        let client = ClientConfiguration {
            ssid: c.ssid.as_str().try_into().unwrap_or_default(),
            password: c.secret.as_str().try_into().unwrap_or_default(),
            auth_method,
            ..Default::default()
        };
        self.apply(client)?;
        // Non-blocking: association completes in the driver task.
        self.wifi.connect()
    }

    /// Hand the next planned candidate to the driver.  `Failed` once the
    /// plan runs dry.
    fn advance(&mut self) -> LinkStatus {
        while let Some(choice) = self.plan.next() {
            info!("WiFi: joining '{}'", choice.ssid);
            match self.connect_to(&choice) {
                Ok(()) => return LinkStatus::Connecting,
                Err(e) => {
                    warn!("WiFi: connect to '{}' failed ({})", choice.ssid, e);
                    self.plan.rejected();
                }
            }
        }
        LinkStatus::Failed
    }
}

#[cfg(target_os = "espidf")]
impl NetworkPort for WifiAdapter {
    fn begin_join(&mut self, candidates: &[JoinCandidate<'_>]) {
        let scan = self.scan();
        self.plan.start(candidates, &scan);
        if !self.plan.has_next() {
            info!("WiFi: none of {} candidate(s) in range", candidates.len());
            self.status = LinkStatus::Connecting;
            return;
        }
        self.status = self.advance();
    }

    fn poll_status(&mut self) -> LinkStatus {
        let up = self.wifi.is_connected().unwrap_or(false) && self.wifi.is_up().unwrap_or(false);
        if up {
            self.plan.succeeded();
        }
        self.status = match (up, self.status) {
            (true, _) => LinkStatus::Connected,
            // A refused association looks the same as a slow one here; the
            // plan demotes it when the next attempt starts.
            (false, LinkStatus::Connecting) => LinkStatus::Connecting,
            (false, LinkStatus::Failed) => LinkStatus::Failed,
            (false, _) => LinkStatus::Idle,
        };
        self.status
    }

    fn scan(&mut self) -> heapless::Vec<ScannedNetwork, MAX_SCAN_RESULTS> {
        let mut out = heapless::Vec::new();
        if !self.wifi.is_started().unwrap_or(false) {
            if let Err(e) = self.apply(ClientConfiguration::default()) {
                warn!("WiFi: cannot start radio for scan ({})", e);
                return out;
            }
        }
        match self.wifi.scan() {
            Ok(found) => {
                for ap in found.into_iter().take(MAX_SCAN_RESULTS) {
                    let _ = out.push(ScannedNetwork {
                        network_id: bounded(ap.ssid.as_str()),
                        rssi: ap.signal_strength,
                    });
                }
            }
            Err(e) => warn!("WiFi: scan failed ({})", e),
        }
        out
    }

    fn start_access_point(&mut self, ap: &AccessPoint<'_>) {
        let auth_method = if ap.password.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        };
        self.ap = Some(AccessPointConfiguration {
            ssid: ap.ssid.try_into().unwrap_or_default(),
            password: ap.password.try_into().unwrap_or_default(),
            channel: ap.channel,
            auth_method,
            max_connections: 4,
            ..Default::default()
        });
        // Mixed mode keeps the station side free for scans and rejoins.
        match self.apply(ClientConfiguration::default()) {
            Ok(()) => info!("WiFi: access point '{}' up on channel {}", ap.ssid, ap.channel),
            Err(e) => warn!("WiFi: access point start failed ({})", e),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// WiFi adapter (simulation)
// ───────────────────────────────────────────────────────────────

/// A network the simulated radio can see.
#[cfg(not(target_os = "espidf"))]
#[derive(Debug, Clone)]
struct SimNetwork {
    ssid: heapless::String<32>,
    secret: heapless::String<63>,
    rssi: i8,
    online: bool,
}

#[cfg(not(target_os = "espidf"))]
pub struct WifiAdapter {
    networks: Vec<SimNetwork>,
    target: Option<heapless::String<32>>,
    status: LinkStatus,
    polls_to_connect: u8,
    pending_polls: u8,
    joins: u32,
    ap: Option<heapless::String<32>>,
    plan: JoinPlan,
}

#[cfg(not(target_os = "espidf"))]
impl Default for WifiAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(not(target_os = "espidf"))]
impl WifiAdapter {
    pub fn new() -> Self {
        Self {
            networks: Vec::new(),
            target: None,
            status: LinkStatus::Idle,
            polls_to_connect: 1,
            pending_polls: 0,
            joins: 0,
            ap: None,
            plan: JoinPlan::default(),
        }
    }

    /// Make a network visible.
    pub fn add_network(&mut self, ssid: &str, secret: &str, rssi: i8) {
        self.networks.push(SimNetwork {
            ssid: bounded(ssid),
            secret: bounded(secret),
            rssi,
            online: true,
        });
    }

    /// Take a network off the air (or bring it back).  A link to it drops
    /// on the next status poll.
    pub fn set_online(&mut self, ssid: &str, online: bool) {
        for n in self.networks.iter_mut().filter(|n| n.ssid.as_str() == ssid) {
            n.online = online;
        }
    }

    /// Status polls an association takes before it reports `Connected`.
    pub fn set_connect_polls(&mut self, polls: u8) {
        self.polls_to_connect = polls;
    }

    pub fn joins(&self) -> u32 {
        self.joins
    }

    pub fn connected_to(&self) -> Option<&str> {
        match self.status {
            LinkStatus::Connected => self.target.as_deref(),
            _ => None,
        }
    }

    pub fn access_point(&self) -> Option<&str> {
        self.ap.as_deref()
    }

    fn accepts(&self, c: &Candidate) -> bool {
        self.networks
            .iter()
            .any(|n| n.online && n.ssid == c.ssid && n.secret == c.secret)
    }

    fn target_online(&self) -> bool {
        self.target.as_ref().is_some_and(|t| {
            self.networks
                .iter()
                .any(|n| n.online && n.ssid.as_str() == t.as_str())
        })
    }
}

#[cfg(not(target_os = "espidf"))]
impl NetworkPort for WifiAdapter {
    fn begin_join(&mut self, candidates: &[JoinCandidate<'_>]) {
        self.joins += 1;
        let scan = self.scan();
        self.plan.start(candidates, &scan);
        self.target = None;
        self.status = LinkStatus::Connecting;
        if !self.plan.has_next() {
            info!("WiFi(sim): none of {} candidate(s) in range", candidates.len());
            return;
        }
        while let Some(choice) = self.plan.next() {
            if self.accepts(&choice) {
                info!("WiFi(sim): associating with '{}'", choice.ssid);
                self.target = Some(choice.ssid);
                self.pending_polls = self.polls_to_connect;
                return;
            }
            warn!("WiFi(sim): '{}' rejected the secret", choice.ssid);
            self.plan.rejected();
        }
        self.status = LinkStatus::Failed;
    }

    fn poll_status(&mut self) -> LinkStatus {
        match self.status {
            LinkStatus::Connecting if self.target.is_some() => {
                self.pending_polls = self.pending_polls.saturating_sub(1);
                if self.pending_polls == 0 {
                    self.status = LinkStatus::Connected;
                    self.plan.succeeded();
                }
            }
            LinkStatus::Connected if !self.target_online() => {
                info!("WiFi(sim): link lost");
                self.status = LinkStatus::Idle;
            }
            _ => {}
        }
        self.status
    }

    fn scan(&mut self) -> heapless::Vec<ScannedNetwork, MAX_SCAN_RESULTS> {
        self.networks
            .iter()
            .filter(|n| n.online)
            .take(MAX_SCAN_RESULTS)
            .map(|n| ScannedNetwork {
                network_id: n.ssid.clone(),
                rssi: n.rssi,
            })
            .collect()
    }

    fn start_access_point(&mut self, ap: &AccessPoint<'_>) {
        info!("WiFi(sim): access point '{}' on channel {}", ap.ssid, ap.channel);
        self.ap = Some(bounded(ap.ssid));
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────

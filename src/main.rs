//! netprov firmware — main entry point.
//!
//! Hexagonal architecture: the provisioning core runs in one cooperative
//! loop; the HTTP server only forwards portal requests to it.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  NvsAdapter     WifiAdapter    SystemAdapter   LogEventSink    │
//! │  (Storage)      (Network)      (System)        (EventSink)     │
//! │  MultiResetDetector            EspHttpServer ──▶ mpsc channel  │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │           ProvisioningService (pure logic)             │    │
//! │  │  Store · Supervisor · Mode arbiter · Portal exchange   │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use std::sync::mpsc;
use std::time::Duration;

use anyhow::Result;
use log::{info, warn};

use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::hal::peripherals::Peripherals;
use esp_idf_svc::http::server::{Configuration as HttpConfig, EspHttpServer};
use esp_idf_svc::http::Method;
use esp_idf_svc::io::{EspIOError, Write};
use esp_idf_svc::wifi::EspWifi;

use netprov::adapters::log_sink::LogEventSink;
use netprov::adapters::nvs::NvsAdapter;
use netprov::adapters::reset_detector::MultiResetDetector;
use netprov::adapters::system::SystemAdapter;
use netprov::adapters::wifi::WifiAdapter;
use netprov::adapters::{device_id, utils};
use netprov::portal::ExchangeReply;
use netprov::{AuxField, AuxRegistry, ManagerConfig, Mode, ProvisioningService};

const LOOP_INTERVAL_MS: u64 = 100;
const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// Body plus content type.
type PortalResponse = Option<(String, &'static str)>;

/// One HTTP request handed from the server task to the control loop.
struct PortalRequest {
    key: String,
    value: String,
    reply: mpsc::SyncSender<PortalResponse>,
}

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  netprov v{}                        ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    // ── 2. Application settings offered in the portal ─────────
    let mut mqtt_server = [0u8; 32];
    let mut mqtt_port = [0u8; 6];
    let registry = AuxRegistry::new()
        .with(AuxField::new("mqtt", "MQTT server", &mut mqtt_server, 32)?)?
        .with(AuxField::new("port", "MQTT port", &mut mqtt_port, 6)?)?;

    // ── 3. Adapters ───────────────────────────────────────────
    let storage = NvsAdapter::new()?;
    let detector = MultiResetDetector::new(NvsAdapter::new()?, SystemAdapter::new());

    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let mut esp_wifi = EspWifi::new(peripherals.modem, sysloop, None)?;

    let hostname = device_id::hostname(&device_id::read_mac());
    if let Err(e) = esp_wifi.sta_netif_mut().set_hostname(&hostname) {
        warn!("Hostname '{}' not applied: {}", hostname, e);
    }
    let network = WifiAdapter::new(esp_wifi);

    // ── 4. Provisioning core ──────────────────────────────────
    let mut service = ProvisioningService::new(
        ManagerConfig::default(),
        registry,
        storage,
        network,
        SystemAdapter::new(),
        detector,
    )?;
    service.set_hostname(&hostname);

    let mut sink = LogEventSink::new();
    let mode = service.begin(&mut sink);
    info!("Boot complete: {:?} (hostname {})", mode, hostname);

    // ── 5. Portal HTTP front end ──────────────────────────────
    let (tx, rx) = mpsc::sync_channel::<PortalRequest>(4);
    let mut server = EspHttpServer::new(&HttpConfig::default())?;
    server.fn_handler("/", Method::Get, move |req| -> core::result::Result<(), EspIOError> {
        let query = req.uri().split_once('?').map_or("", |(_, q)| q);
        let (key, value) = utils::exchange_params(query);
        let (reply_tx, reply_rx) = mpsc::sync_channel(1);
        let reply = match tx.send(PortalRequest {
            key,
            value,
            reply: reply_tx,
        }) {
            Ok(()) => reply_rx.recv_timeout(REPLY_TIMEOUT).ok().flatten(),
            Err(_) => None,
        };
        match reply {
            Some((body, content_type)) => {
                let mut resp = req.into_response(200, None, &[("Content-Type", content_type)])?;
                resp.write_all(body.as_bytes())?;
            }
            None => {
                let mut resp = req.into_status_response(404)?;
                resp.write_all(b"portal not active")?;
            }
        }
        Ok(())
    })?;

    // ── 6. Control loop ───────────────────────────────────────
    info!("Entering control loop");
    loop {
        while let Ok(request) = rx.try_recv() {
            let response = service
                .handle_request(&request.key, &request.value, &mut sink)
                .and_then(|reply| {
                    let content_type = match reply {
                        ExchangeReply::Form(_) => "application/json",
                        ExchangeReply::Ack => "text/plain",
                    };
                    match reply.body() {
                        Ok(body) => Some((body, content_type)),
                        Err(e) => {
                            warn!("Portal reply not encoded: {}", e);
                            None
                        }
                    }
                });
            // The requester may have timed out already.
            let _ = request.reply.send(response);
        }

        service.tick(&mut sink);
        if service.mode() == Mode::Restarting {
            // esp_restart() does not return; nothing left to do.
            break;
        }
        std::thread::sleep(Duration::from_millis(LOOP_INTERVAL_MS));
    }
    Ok(())
}

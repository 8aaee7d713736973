//! Configuration portal: exchange protocol, commit and portal exit paths.

use netprov::portal::ExchangeReply;
use netprov::{
    AuxField, AuxRegistry, ManagerConfig, ManagerEvent, Mode, PortalReason, RestartReason,
};

use crate::mock_platform::{MockNetwork, MockStorage, RecordingSink, TestService, boot, home_record};

const FULL_FORM: [(&str, &str); 5] = [
    ("id", "HomeNet"),
    ("pw", "longenoughpwd"),
    ("id1", "Backup"),
    ("pw1", "backuppasswd"),
    ("name", "kitchen"),
];

fn submit(svc: &mut TestService<'_>, sink: &mut RecordingSink, pairs: &[(&str, &str)]) {
    for (key, value) in pairs {
        assert_eq!(
            svc.handle_request(key, value, sink),
            Some(ExchangeReply::Ack),
            "update of '{}' must be acknowledged",
            key
        );
    }
}

fn read_form(svc: &mut TestService<'_>, sink: &mut RecordingSink) -> netprov::portal::FormView {
    match svc.handle_request("", "", sink) {
        Some(ExchangeReply::Form(view)) => view,
        other => panic!("expected form, got {:?}", other),
    }
}

fn home_network() -> MockNetwork {
    MockNetwork::new().with_network("HomeNet", "longenoughpwd")
}

// ── Commit ────────────────────────────────────────────────────

#[test]
fn full_submission_commits_and_restarts_once() {
    let cfg = ManagerConfig::default();
    let storage = MockStorage::new();
    let (mut svc, mut sink) = boot(
        cfg.clone(),
        AuxRegistry::new(),
        &storage,
        home_network(),
        false,
    );
    assert_eq!(svc.mode(), Mode::Portal);
    sink.clear();

    submit(&mut svc, &mut sink, &FULL_FORM);

    assert_eq!(svc.mode(), Mode::Restarting);
    assert_eq!(svc.system().restarts, 1);
    assert_eq!(sink.restarts(), vec![RestartReason::ConfigCommitted]);
    assert!(sink.contains(&ManagerEvent::PortalCommitted));
    assert!(sink.contains(&ManagerEvent::ConfigSaved {
        primary_ok: true,
        backup_ok: true,
    }));
    assert_eq!(
        sink.count(|e| matches!(e, ManagerEvent::FieldUpdated { .. })),
        5
    );
    assert!(sink.contains(&ManagerEvent::FieldUpdated {
        key: "name",
        updated: 5,
        required: 5,
    }));
    // Nothing is served once a restart is pending.
    assert_eq!(svc.handle_request("", "", &mut sink), None);
    drop(svc);

    let (svc, _) = boot(cfg, AuxRegistry::new(), &storage, home_network(), false);
    assert_eq!(svc.mode(), Mode::Normal);
    assert_eq!(svc.full_config(), &home_record());
}

#[test]
fn partial_submission_does_not_commit() {
    let storage = MockStorage::new();
    let (mut svc, mut sink) = boot(
        ManagerConfig::default(),
        AuxRegistry::new(),
        &storage,
        home_network(),
        false,
    );

    submit(&mut svc, &mut sink, &FULL_FORM[..4]);

    assert_eq!(svc.mode(), Mode::Portal);
    assert_eq!(svc.system().restarts, 0);
    assert_eq!(storage.raw("wm_config"), None);
}

#[test]
fn first_write_wins_and_unknown_keys_are_ignored() {
    let storage = MockStorage::new();
    let (mut svc, mut sink) = boot(
        ManagerConfig::default(),
        AuxRegistry::new(),
        &storage,
        home_network(),
        false,
    );
    sink.clear();

    submit(
        &mut svc,
        &mut sink,
        &[("id", "First"), ("id", "Second"), ("bogus", "x")],
    );

    assert_eq!(
        sink.count(|e| matches!(e, ManagerEvent::FieldUpdated { .. })),
        1
    );
    let view = read_form(&mut svc, &mut sink);
    assert_eq!(view.field("id").map(|f| f.value.as_str()), Some("First"));
}

#[test]
fn commit_clears_persistent_flag() {
    let cfg = ManagerConfig::default();
    let storage = MockStorage::new();
    storage.seed(&cfg, &home_record());

    let (mut svc, mut sink) = boot(
        cfg.clone(),
        AuxRegistry::new(),
        &storage,
        home_network(),
        false,
    );
    svc.reset_and_enter_portal_persistent(&mut sink);
    drop(svc);

    let (mut svc, mut sink) = boot(
        cfg.clone(),
        AuxRegistry::new(),
        &storage,
        home_network(),
        false,
    );
    assert_eq!(svc.mode(), Mode::Portal);
    submit(&mut svc, &mut sink, &FULL_FORM);
    assert_eq!(svc.mode(), Mode::Restarting);
    drop(svc);

    let (svc, _) = boot(cfg, AuxRegistry::new(), &storage, home_network(), false);
    assert_eq!(svc.mode(), Mode::Normal);
}

#[test]
fn aux_fields_are_required_and_persisted() {
    let cfg = ManagerConfig::default();
    let storage = MockStorage::new();
    {
        let mut mqtt = [0u8; 32];
        let registry = AuxRegistry::new()
            .with(AuxField::new("mqtt", "MQTT server", &mut mqtt, 32).unwrap())
            .unwrap();
        let (mut svc, mut sink) = boot(cfg.clone(), registry, &storage, home_network(), false);

        submit(&mut svc, &mut sink, &FULL_FORM);
        assert_eq!(svc.mode(), Mode::Portal, "aux field still missing");

        submit(&mut svc, &mut sink, &[("mqtt", "broker.local")]);
        assert_eq!(svc.mode(), Mode::Restarting);
        assert!(sink.contains(&ManagerEvent::FieldUpdated {
            key: "mqtt",
            updated: 6,
            required: 6,
        }));
    }

    let mut mqtt = [0u8; 32];
    let registry = AuxRegistry::new()
        .with(AuxField::new("mqtt", "MQTT server", &mut mqtt, 32).unwrap())
        .unwrap();
    let (svc, _) = boot(cfg, registry, &storage, home_network(), false);
    assert_eq!(svc.mode(), Mode::Normal);
    assert_eq!(svc.aux_value("mqtt"), Some("broker.local"));
    drop(svc);
    assert_eq!(&mqtt[..12], b"broker.local");
    assert!(mqtt[12..].iter().all(|&b| b == 0));
}

#[test]
fn record_without_aux_data_is_not_usable() {
    let cfg = ManagerConfig::default();
    let storage = MockStorage::new();
    storage.seed(&cfg, &home_record());

    let mut port = [0u8; 6];
    let registry = AuxRegistry::new()
        .with(AuxField::new("port", "MQTT port", &mut port, 6).unwrap())
        .unwrap();
    let (svc, _) = boot(cfg, registry, &storage, home_network(), false);

    assert_eq!(svc.mode(), Mode::Portal);
    assert!(!svc.is_config_valid());
}

// ── Form ──────────────────────────────────────────────────────

#[test]
fn form_lists_fields_and_strongest_networks() {
    let network = home_network()
        .with_scan("Cafe", -70)
        .with_scan("HomeNet", -40)
        .with_scan("HomeNet", -60)
        .with_scan("Weak", -95);
    let storage = MockStorage::new();
    let (mut svc, mut sink) = boot(
        ManagerConfig::default(),
        AuxRegistry::new(),
        &storage,
        network,
        false,
    );

    let view = read_form(&mut svc, &mut sink);

    assert_eq!(view.title, "NETPROV");
    let keys: Vec<&str> = view.fields.iter().map(|f| f.key).collect();
    assert_eq!(keys, ["id", "pw", "id1", "pw1", "name"]);
    assert!(view.fields.iter().all(|f| f.value.is_empty()));
    let listed: Vec<(&str, u8)> = view
        .networks
        .iter()
        .map(|n| (n.network_id.as_str(), n.quality))
        .collect();
    assert_eq!(listed, [("HomeNet", 100), ("Cafe", 60), ("Weak", 10)]);
    assert_eq!(svc.network().scan_calls, 1);

    svc.set_hostname("NETPROV-ABCDEF");
    assert_eq!(read_form(&mut svc, &mut sink).title, "NETPROV-ABCDEF");

    svc.set_hostname("-My Device_01!");
    assert_eq!(read_form(&mut svc, &mut sink).title, "MyDevice01");

    // Nothing usable left falls back to the default title.
    svc.set_hostname("_!_");
    assert_eq!(read_form(&mut svc, &mut sink).title, "NETPROV");
}

#[test]
fn form_prefills_stored_record() {
    let cfg = ManagerConfig::default();
    let storage = MockStorage::new();
    storage.seed(&cfg, &home_record());
    let (mut svc, mut sink) = boot(cfg, AuxRegistry::new(), &storage, home_network(), true);

    let view = read_form(&mut svc, &mut sink);

    assert_eq!(view.title, "kitchen");
    assert_eq!(view.field("id").map(|f| f.value.as_str()), Some("HomeNet"));
    assert_eq!(view.field("id1").map(|f| f.value.as_str()), Some("Backup"));
    let json = view.to_json().unwrap();
    assert!(json.contains("\"key\":\"name\""));
}

#[test]
fn requests_outside_portal_are_refused() {
    let cfg = ManagerConfig::default();
    let storage = MockStorage::new();
    storage.seed(&cfg, &home_record());
    let (mut svc, mut sink) = boot(cfg, AuxRegistry::new(), &storage, home_network(), false);

    assert_eq!(svc.mode(), Mode::Normal);
    assert_eq!(svc.handle_request("", "", &mut sink), None);
    assert_eq!(svc.handle_request("id", "Evil", &mut sink), None);
    assert_eq!(svc.network_id(0), Some("HomeNet"));
}

// ── Leaving the portal ────────────────────────────────────────

#[test]
fn portal_timeout_rejoins_and_closes() {
    let cfg = ManagerConfig::default();
    let storage = MockStorage::new();
    storage.seed(&cfg, &home_record());
    let (mut svc, mut sink) = boot(cfg, AuxRegistry::new(), &storage, home_network(), true);
    assert_eq!(svc.mode(), Mode::Portal);

    svc.system_mut().advance(59_999);
    svc.tick(&mut sink);
    assert_eq!(svc.mode(), Mode::Portal);
    assert!(svc.network().joins.is_empty());

    svc.system_mut().advance(1);
    sink.clear();
    svc.tick(&mut sink);

    assert_eq!(svc.mode(), Mode::Normal);
    assert!(svc.is_connected());
    assert!(sink.contains(&ManagerEvent::PortalTimedOut));
    assert!(sink.contains(&ManagerEvent::Joined));
    assert!(sink.contains(&ManagerEvent::PortalClosed));
    assert!(sink.contains(&ManagerEvent::ModeChanged {
        from: Mode::Portal,
        to: Mode::Normal,
    }));
}

#[test]
fn failed_rejoin_after_timeout_keeps_portal_open() {
    let cfg = ManagerConfig::default();
    let storage = MockStorage::new();
    storage.seed(&cfg, &home_record());
    let (mut svc, mut sink) = boot(cfg, AuxRegistry::new(), &storage, MockNetwork::new(), true);

    svc.system_mut().advance(60_000);
    svc.tick(&mut sink);

    assert_eq!(svc.mode(), Mode::Portal);
    assert!(sink.contains(&ManagerEvent::PortalTimedOut));
    assert!(sink.contains(&ManagerEvent::RejoinFailed { failures: 1 }));
    // Still answering the form.
    assert!(matches!(
        svc.handle_request("", "", &mut sink),
        Some(ExchangeReply::Form(_))
    ));
}

#[test]
fn reading_the_form_cancels_the_timeout() {
    let cfg = ManagerConfig::default();
    let storage = MockStorage::new();
    storage.seed(&cfg, &home_record());
    let (mut svc, mut sink) = boot(cfg, AuxRegistry::new(), &storage, home_network(), true);

    read_form(&mut svc, &mut sink);
    assert_eq!(svc.supervisor().portal_deadline_ms(), None);

    svc.system_mut().advance(600_000);
    svc.tick(&mut sink);
    assert_eq!(svc.mode(), Mode::Portal);
    assert!(svc.network().joins.is_empty());
}

#[test]
fn link_recovery_closes_portal() {
    let cfg = ManagerConfig::default();
    let storage = MockStorage::new();
    storage.seed(&cfg, &home_record());
    let (mut svc, mut sink) = boot(cfg, AuxRegistry::new(), &storage, MockNetwork::new(), false);
    assert!(sink.contains(&ManagerEvent::PortalOpened(PortalReason::JoinFailed)));

    svc.network_mut().reconnect("HomeNet");
    svc.tick(&mut sink);

    assert_eq!(svc.mode(), Mode::Normal);
    assert!(svc.is_connected());
    assert!(sink.contains(&ManagerEvent::PortalClosed));
}

#[test]
fn abandoned_session_leaves_aux_values_untouched() {
    let cfg = ManagerConfig::default();
    let storage = MockStorage::new();
    {
        let mut mqtt = [0u8; 32];
        let registry = AuxRegistry::new()
            .with(AuxField::new("mqtt", "MQTT server", &mut mqtt, 32).unwrap())
            .unwrap();
        let (mut svc, mut sink) = boot(cfg.clone(), registry, &storage, home_network(), false);
        submit(&mut svc, &mut sink, &FULL_FORM);
        submit(&mut svc, &mut sink, &[("mqtt", "broker.local")]);
    }

    let mut mqtt = [0u8; 32];
    let registry = AuxRegistry::new()
        .with(AuxField::new("mqtt", "MQTT server", &mut mqtt, 32).unwrap())
        .unwrap();
    let (mut svc, mut sink) = boot(cfg, registry, &storage, MockNetwork::new(), false);
    assert_eq!(svc.mode(), Mode::Portal);

    submit(&mut svc, &mut sink, &[("mqtt", "other.broker")]);
    let view = read_form(&mut svc, &mut sink);
    assert_eq!(view.field("mqtt").map(|f| f.value.as_str()), Some("other.broker"));
    assert_eq!(svc.aux_value("mqtt"), Some("broker.local"));

    svc.network_mut().reconnect("HomeNet");
    svc.tick(&mut sink);

    assert!(sink.contains(&ManagerEvent::PortalClosed));
    assert_eq!(svc.aux_value("mqtt"), Some("broker.local"));
    drop(svc);
    assert_eq!(&mqtt[..12], b"broker.local");
}

// ── Clearing ──────────────────────────────────────────────────

#[test]
fn clear_config_wipes_record_and_aux_values() {
    let cfg = ManagerConfig::default();
    let storage = MockStorage::new();
    {
        let mut mqtt = [0u8; 32];
        let registry = AuxRegistry::new()
            .with(AuxField::new("mqtt", "MQTT server", &mut mqtt, 32).unwrap())
            .unwrap();
        let (mut svc, mut sink) = boot(cfg.clone(), registry, &storage, home_network(), false);
        submit(&mut svc, &mut sink, &FULL_FORM);
        submit(&mut svc, &mut sink, &[("mqtt", "broker.local")]);
    }

    let mut mqtt = [0u8; 32];
    let registry = AuxRegistry::new()
        .with(AuxField::new("mqtt", "MQTT server", &mut mqtt, 32).unwrap())
        .unwrap();
    let (mut svc, mut sink) = boot(cfg.clone(), registry, &storage, home_network(), false);
    assert_eq!(svc.mode(), Mode::Normal);

    svc.clear_config(&mut sink);

    assert!(!svc.is_config_valid());
    assert_eq!(svc.network_id(0), Some(""));
    assert_eq!(svc.aux_value("mqtt"), Some(""));
    assert!(sink.contains(&ManagerEvent::ConfigSaved {
        primary_ok: true,
        backup_ok: true,
    }));
    drop(svc);

    let (svc, _) = boot(cfg, AuxRegistry::new(), &storage, home_network(), false);
    assert_eq!(svc.mode(), Mode::Portal);
}

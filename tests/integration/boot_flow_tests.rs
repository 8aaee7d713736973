//! Boot-time mode decision against mock storage and radio.

use netprov::app::ports::ConfigError;
use netprov::store::ConfigStore;
use netprov::{
    AuxRegistry, ConfigRecord, ForcedPortal, JoinError, ManagerConfig, ManagerEvent, Mode,
    PortalReason, RestartReason, ValidityPolicy,
};

use crate::mock_platform::{MockNetwork, MockStorage, boot, home_record};

fn home_network() -> MockNetwork {
    MockNetwork::new().with_network("HomeNet", "longenoughpwd")
}

// ── Record state ──────────────────────────────────────────────

#[test]
fn first_boot_opens_portal_without_timeout() {
    let storage = MockStorage::new();
    let (svc, sink) = boot(
        ManagerConfig::default(),
        AuxRegistry::new(),
        &storage,
        home_network(),
        false,
    );

    assert_eq!(svc.mode(), Mode::Portal);
    assert!(!svc.is_config_valid());
    assert!(sink.contains(&ManagerEvent::ConfigLoaded(Err(ConfigError::NotFound))));
    assert!(sink.contains(&ManagerEvent::PortalOpened(PortalReason::NoValidConfig)));
    assert!(sink.contains(&ManagerEvent::Started(Mode::Portal)));
    assert!(svc.network().joins.is_empty());
    assert_eq!(
        svc.network().access_point,
        Some(("ESP_ABCDEF".to_string(), 10))
    );
    // An unconfigured device never leaves the portal on its own.
    assert_eq!(svc.supervisor().portal_deadline_ms(), None);
}

#[test]
fn valid_record_joins_and_runs_normally() {
    let cfg = ManagerConfig::default();
    let storage = MockStorage::new();
    storage.seed(&cfg, &home_record());

    let (svc, sink) = boot(cfg, AuxRegistry::new(), &storage, home_network(), false);

    assert_eq!(svc.mode(), Mode::Normal);
    assert!(svc.is_connected());
    assert!(sink.contains(&ManagerEvent::ConfigLoaded(Ok(()))));
    assert!(sink.contains(&ManagerEvent::JoinStarted { candidates: 2 }));
    assert!(sink.contains(&ManagerEvent::Joined));
    assert_eq!(svc.network_id(0), Some("HomeNet"));
    assert_eq!(svc.secret(1), Some("backuppasswd"));
    assert_eq!(svc.display_name(), "kitchen");
    assert_eq!(
        svc.network().joins,
        vec![vec!["HomeNet".to_string(), "Backup".to_string()]]
    );
    assert!(svc.network().access_point.is_none());
}

#[test]
fn any_one_policy_offers_only_the_usable_set() {
    let cfg = ManagerConfig {
        validity_policy: ValidityPolicy::AnyOne,
        ..ManagerConfig::default()
    };
    let storage = MockStorage::new();
    storage.seed(
        &cfg,
        &ConfigRecord::fresh(2)
            .with_credential(0, "blank", "blank")
            .with_credential(1, "HomeNet", "longenoughpwd"),
    );

    let (svc, sink) = boot(cfg, AuxRegistry::new(), &storage, home_network(), false);

    assert_eq!(svc.mode(), Mode::Normal);
    assert!(sink.contains(&ManagerEvent::JoinStarted { candidates: 1 }));
    assert_eq!(svc.network().joins, vec![vec!["HomeNet".to_string()]]);
}

#[test]
fn all_policy_rejects_record_with_one_bad_set() {
    let cfg = ManagerConfig::default();
    let storage = MockStorage::new();
    storage.seed(
        &cfg,
        &ConfigRecord::fresh(2)
            .with_credential(0, "HomeNet", "longenoughpwd")
            .with_credential(1, "Backup", "short"),
    );

    let (svc, sink) = boot(cfg, AuxRegistry::new(), &storage, home_network(), false);

    assert_eq!(svc.mode(), Mode::Portal);
    assert!(sink.contains(&ManagerEvent::ConfigLoaded(Err(
        ConfigError::PolicyViolation
    ))));
    assert!(svc.network().joins.is_empty());
}

#[test]
fn second_set_alone_can_join() {
    let cfg = ManagerConfig::default();
    let storage = MockStorage::new();
    storage.seed(&cfg, &home_record());

    let network = MockNetwork::new().with_network("Backup", "backuppasswd");
    let (svc, _) = boot(cfg, AuxRegistry::new(), &storage, network, false);

    assert_eq!(svc.mode(), Mode::Normal);
    assert_eq!(svc.network().connected_to(), Some("Backup"));
}

// ── Reset burst ───────────────────────────────────────────────

#[test]
fn reset_burst_opens_portal_over_valid_record() {
    let cfg = ManagerConfig::default();
    let storage = MockStorage::new();
    storage.seed(&cfg, &home_record());

    let (svc, sink) = boot(cfg, AuxRegistry::new(), &storage, home_network(), true);

    assert_eq!(svc.mode(), Mode::Portal);
    assert!(svc.is_config_valid());
    assert!(sink.contains(&ManagerEvent::PortalOpened(PortalReason::ResetBurst)));
    assert!(svc.network().joins.is_empty());
    assert_eq!(svc.supervisor().portal_deadline_ms(), Some(60_000));
}

// ── Dual copies ───────────────────────────────────────────────

#[test]
fn corrupted_primary_falls_back_to_backup() {
    let cfg = ManagerConfig::default();
    let storage = MockStorage::new();
    storage.seed(&cfg, &home_record());
    storage.corrupt("wm_config", 20);

    let (svc, sink) = boot(cfg, AuxRegistry::new(), &storage, home_network(), false);

    assert_eq!(svc.mode(), Mode::Normal);
    assert!(sink.contains(&ManagerEvent::ConfigLoaded(Ok(()))));
    assert_eq!(svc.network_id(0), Some("HomeNet"));
}

#[test]
fn missing_primary_falls_back_to_backup() {
    let cfg = ManagerConfig::default();
    let storage = MockStorage::new();
    storage.seed(&cfg, &home_record());
    storage.remove("wm_config");

    let (svc, _) = boot(cfg, AuxRegistry::new(), &storage, home_network(), false);
    assert_eq!(svc.mode(), Mode::Normal);
}

#[test]
fn both_copies_corrupted_are_rewritten_blank() {
    let cfg = ManagerConfig::default();
    let storage = MockStorage::new();
    storage.seed(&cfg, &home_record());
    storage.corrupt("wm_config", 20);
    storage.corrupt("wm_config_bak", 40);

    let (svc, sink) = boot(
        cfg.clone(),
        AuxRegistry::new(),
        &storage,
        home_network(),
        false,
    );

    assert_eq!(svc.mode(), Mode::Portal);
    assert!(sink.contains(&ManagerEvent::ConfigLoaded(Err(
        ConfigError::ChecksumMismatch
    ))));
    for key in ["wm_config", "wm_config_bak"] {
        let raw = storage.raw(key).expect("blank record written");
        assert_eq!(ConfigRecord::decode(&raw, 2), Ok(ConfigRecord::blank(2)));
    }
    drop(svc);

    // The blank record decodes but is never usable.
    let (svc, sink) = boot(cfg, AuxRegistry::new(), &storage, home_network(), false);
    assert_eq!(svc.mode(), Mode::Portal);
    assert!(sink.contains(&ManagerEvent::ConfigLoaded(Err(
        ConfigError::PolicyViolation
    ))));
}

#[test]
fn record_saved_under_other_set_count_is_corrupt() {
    let storage = MockStorage::new();
    let three = ManagerConfig {
        credential_sets: 3,
        ..ManagerConfig::default()
    };
    storage.seed(
        &three,
        &ConfigRecord::fresh(3)
            .with_credential(0, "A", "password1")
            .with_credential(1, "B", "password2")
            .with_credential(2, "C", "password3"),
    );

    let (svc, sink) = boot(
        ManagerConfig::default(),
        AuxRegistry::new(),
        &storage,
        home_network(),
        false,
    );
    assert_eq!(svc.mode(), Mode::Portal);
    assert!(sink.contains(&ManagerEvent::ConfigLoaded(Err(ConfigError::Corrupted))));
}

// ── Boot join failure ─────────────────────────────────────────

#[test]
fn boot_join_failure_opens_portal_with_timeout() {
    let cfg = ManagerConfig::default();
    let storage = MockStorage::new();
    storage.seed(&cfg, &home_record());

    let (svc, sink) = boot(cfg, AuxRegistry::new(), &storage, MockNetwork::new(), false);

    assert_eq!(svc.mode(), Mode::Portal);
    assert!(sink.contains(&ManagerEvent::JoinFailed(JoinError::Timeout)));
    assert!(sink.contains(&ManagerEvent::PortalOpened(PortalReason::JoinFailed)));
    // 800 ms first wait plus one 500 ms poll slice.
    assert_eq!(svc.system().slept, 1_300);
    assert_eq!(svc.supervisor().portal_deadline_ms(), Some(1_300 + 60_000));
}

#[test]
fn boot_join_failure_restarts_when_configured() {
    let cfg = ManagerConfig {
        reset_on_boot_join_failure: true,
        ..ManagerConfig::default()
    };
    let storage = MockStorage::new();
    storage.seed(&cfg, &home_record());

    let (svc, sink) = boot(cfg, AuxRegistry::new(), &storage, MockNetwork::new(), false);

    assert_eq!(svc.mode(), Mode::Restarting);
    assert_eq!(svc.system().restarts, 1);
    assert_eq!(sink.restarts(), vec![RestartReason::BootJoinFailed]);
    assert!(svc.network().access_point.is_none());
}

// ── Default record ────────────────────────────────────────────

#[test]
fn default_record_is_seeded_every_boot() {
    let cfg = ManagerConfig {
        default_record: Some(home_record()),
        ..ManagerConfig::default()
    };
    let storage = MockStorage::new();
    storage.seed(
        &cfg,
        &ConfigRecord::fresh(2)
            .with_credential(0, "Other", "otherpasswd")
            .with_credential(1, "Other2", "otherpasswd"),
    );

    let (svc, _) = boot(cfg, AuxRegistry::new(), &storage, home_network(), false);

    assert_eq!(svc.mode(), Mode::Normal);
    assert_eq!(svc.network_id(0), Some("HomeNet"));
    let raw = storage.raw("wm_config").expect("seed persisted");
    assert_eq!(ConfigRecord::decode(&raw, 2), Ok(home_record()));
}

// ── Forced portal ─────────────────────────────────────────────

#[test]
fn transient_flag_is_consumed_by_next_boot() {
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
    svc.reset_and_enter_portal(&mut sink);
    assert_eq!(svc.mode(), Mode::Restarting);
    assert_eq!(svc.system().restarts, 1);
    assert_eq!(
        storage.raw("wm_cp"),
        Some(0xDEAD_BEEFu32.to_le_bytes().to_vec())
    );
    drop(svc);

    let (svc, sink) = boot(
        cfg.clone(),
        AuxRegistry::new(),
        &storage,
        home_network(),
        false,
    );
    assert_eq!(svc.mode(), Mode::Portal);
    assert!(sink.contains(&ManagerEvent::PortalOpened(PortalReason::Forced(
        ForcedPortal::Transient
    ))));
    assert_eq!(
        ConfigStore::new(&cfg).forced_portal(svc.storage()),
        ForcedPortal::None
    );
    drop(svc);

    let (svc, _) = boot(cfg, AuxRegistry::new(), &storage, home_network(), false);
    assert_eq!(svc.mode(), Mode::Normal);
}

#[test]
fn persistent_flag_survives_reboots() {
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
    assert_eq!(sink.restarts(), vec![RestartReason::EnterPortalRequested]);
    drop(svc);

    for _ in 0..3 {
        let (svc, sink) = boot(
            cfg.clone(),
            AuxRegistry::new(),
            &storage,
            home_network(),
            false,
        );
        assert_eq!(svc.mode(), Mode::Portal);
        assert!(sink.contains(&ManagerEvent::PortalOpened(PortalReason::Forced(
            ForcedPortal::Persistent
        ))));
    }
}

#[test]
fn clear_forced_portal_drops_only_transient_flag() {
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
    svc.reset_and_enter_portal(&mut sink);
    svc.clear_forced_portal();
    drop(svc);
    let (mut svc, mut sink) = boot(
        cfg.clone(),
        AuxRegistry::new(),
        &storage,
        home_network(),
        false,
    );
    assert_eq!(svc.mode(), Mode::Normal);

    svc.reset_and_enter_portal_persistent(&mut sink);
    svc.clear_forced_portal();
    drop(svc);
    let (svc, _) = boot(cfg, AuxRegistry::new(), &storage, home_network(), false);
    assert_eq!(svc.mode(), Mode::Portal);
}

#[test]
fn flag_backup_used_when_primary_write_fails() {
    let cfg = ManagerConfig::default();
    let storage = MockStorage::new();
    storage.seed(&cfg, &home_record());
    storage.fail_writes("wm_cp", true);

    let (mut svc, mut sink) = boot(
        cfg.clone(),
        AuxRegistry::new(),
        &storage,
        home_network(),
        false,
    );
    svc.reset_and_enter_portal(&mut sink);
    assert_eq!(storage.raw("wm_cp"), None);
    drop(svc);

    let (svc, _) = boot(
        cfg.clone(),
        AuxRegistry::new(),
        &storage,
        home_network(),
        false,
    );
    assert_eq!(svc.mode(), Mode::Portal);
    drop(svc);

    let (svc, _) = boot(cfg, AuxRegistry::new(), &storage, home_network(), false);
    assert_eq!(svc.mode(), Mode::Normal);
}

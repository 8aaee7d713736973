//! Fuzz target: `ExchangeSession::apply` fed from raw query strings
//!
//! Splits the input into `key=value&...` pairs, URL-decodes them the way
//! the HTTP front end does, and drives an exchange session.  The session
//! must never panic and never count more updates than it requires.
//!
//! cargo fuzz run fuzz_portal_exchange

#![no_main]

use libfuzzer_sys::fuzz_target;
use netprov::adapters::utils::exchange_params;
use netprov::portal::{ExchangeRequest, ExchangeSession};
use netprov::{AuxField, AuxRegistry, ConfigRecord, ManagerConfig};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = core::str::from_utf8(data) else {
        return;
    };

    let mut mqtt = [0u8; 32];
    let Ok(field) = AuxField::new("mqtt", "MQTT server", &mut mqtt, 32) else {
        return;
    };
    let Ok(mut registry) = AuxRegistry::new().with(field) else {
        return;
    };
    let mut session = ExchangeSession::new(&ManagerConfig::default(), registry.len());

    for query in text.split('\n') {
        let (key, value) = exchange_params(query);
        if let ExchangeRequest::Set { key, value } = ExchangeRequest::parse(&key, &value) {
            session.apply(key, value, &registry);
        }
        assert!(session.updated() <= session.required());
    }
    if let Some(draft) = session.draft() {
        let blob = draft.encode();
        assert!(ConfigRecord::decode(&blob, draft.credential_sets()).is_ok());
    }
    session.commit_aux(&mut registry);
    if let Some(f) = registry.get("mqtt") {
        assert!(f.value().len() <= 32);
    }
});

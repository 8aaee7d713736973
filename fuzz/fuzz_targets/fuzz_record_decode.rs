//! Fuzz target: `ConfigRecord::decode` and `AuxRegistry::decode_into`
//!
//! Feeds arbitrary blobs to both stored-blob decoders.  Neither may panic,
//! and anything the record decoder accepts must survive a re-encode.
//!
//! cargo fuzz run fuzz_record_decode

#![no_main]

use libfuzzer_sys::fuzz_target;
use netprov::record::{MAX_CREDENTIAL_SETS, record_len};
use netprov::{AuxField, AuxRegistry, ConfigRecord};

fuzz_target!(|data: &[u8]| {
    for sets in 1..=MAX_CREDENTIAL_SETS {
        if let Ok(record) = ConfigRecord::decode(data, sets) {
            assert_eq!(data.len(), record_len(sets));
            let again = ConfigRecord::decode(&record.encode(), sets);
            assert_eq!(again.as_ref(), Ok(&record), "re-encoded record must decode");
        }
    }

    let mut host = [0u8; 32];
    let mut port = [0u8; 6];
    let (Ok(host), Ok(port)) = (
        AuxField::new("host", "Host", &mut host, 32),
        AuxField::new("port", "Port", &mut port, 6),
    ) else {
        return;
    };
    let Ok(mut registry) = AuxRegistry::new().with(host).and_then(|r| r.with(port)) else {
        return;
    };
    if registry.decode_into(data).is_ok() {
        assert_eq!(registry.encode().ok().as_deref(), Some(data));
    }
});

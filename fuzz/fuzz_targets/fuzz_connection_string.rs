#![no_main]

use firebird_wire::ConnectionInfo;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(info) = ConnectionInfo::parse(s) {
            // A parsed string always names a host and a database
            assert!(!info.host.is_empty());
            assert!(!info.database.is_empty());
            assert!(info.fetch_size > 0);
            let config = info.to_config();
            assert_eq!(config.port, info.port);
        }
    }
});

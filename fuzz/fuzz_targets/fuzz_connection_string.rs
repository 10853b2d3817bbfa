#![no_main]

use libfuzzer_sys::fuzz_target;
use mongo_wire::ConnectionInfo;

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(info) = ConnectionInfo::parse(s) {
        assert!(!info.candidates.is_empty());
        assert!(!info.database.is_empty());
        let _ = info.auth_database();
    }

    // Also exercise the scheme-prefixed path
    let _ = ConnectionInfo::parse(&format!("mongodb://{}", s));
});

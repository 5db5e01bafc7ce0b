//! Fuzz target: `AppConfig::from_blob`
//!
//! Arbitrary bytes must decode to a validated config or an error, never a
//! panic.  Anything accepted must survive a re-encode unchanged.
//!
//! cargo fuzz run fuzz_config_blob

#![no_main]

use libfuzzer_sys::fuzz_target;
use signalbox::config::AppConfig;

fuzz_target!(|data: &[u8]| {
    if let Ok(cfg) = AppConfig::from_blob(data) {
        let bytes = cfg.to_blob().expect("accepted config must re-encode");
        assert_eq!(AppConfig::from_blob(&bytes).ok(), Some(cfg));
    }
});

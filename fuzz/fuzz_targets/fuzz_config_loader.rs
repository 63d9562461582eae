#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parse errors and validation errors are both fine; panics are not.
    if let Ok(mut cfg) = servo_config::load_toml(data) {
        let _ = cfg.validate();
        let rows = cfg.coefficients.clone();
        cfg.merge_coefficients(rows);
        let _ = cfg.filter.channel_index_for(cfg.acquisition.channel_count);
    }
});

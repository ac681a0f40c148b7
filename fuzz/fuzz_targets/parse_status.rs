#![no_main]

use libfuzzer_sys::fuzz_target;
use purok_core::Status;

fuzz_target!(|data: &str| {
    if let Ok(status) = data.parse::<Status>() {
        assert_eq!(status.as_str().parse::<Status>().ok(), Some(status));
        assert_eq!(status.label().parse::<Status>().ok(), Some(status));
    }
});

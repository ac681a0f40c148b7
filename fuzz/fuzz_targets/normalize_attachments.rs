#![no_main]

use libfuzzer_sys::fuzz_target;
use purok_core::AttachmentInput;
use purok_core::model::validate_uri;

fuzz_target!(|data: &str| {
    let list = AttachmentInput::Raw(data.to_string()).normalize();
    for entry in &list {
        assert!(!entry.trim().is_empty());
        let _ = validate_uri(entry);
    }
});

#![no_main]

use chrono::Utc;
use libfuzzer_sys::fuzz_target;
use purok_core::{ReportDraft, ReportId};

fuzz_target!(|data: &[u8]| {
    let Ok(draft) = serde_json::from_slice::<ReportDraft>(data) else {
        return;
    };
    if let Ok(report) = draft.into_report(ReportId::generate(), "fuzz", Utc::now()) {
        assert!(!report.title.trim().is_empty());
        assert!(!report.description.trim().is_empty());
    }
});

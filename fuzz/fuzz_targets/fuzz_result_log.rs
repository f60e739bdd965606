#![no_main]

use libfuzzer_sys::fuzz_target;
use vqpy_core::log::ResultLogReader;

fuzz_target!(|data: &[u8]| {
    // Limit input size to prevent timeout
    if data.len() > 1_000_000 {
        return;
    }

    let dir = match tempfile::tempdir() {
        Ok(dir) => dir,
        Err(_) => return,
    };
    let path = dir.path().join("fuzz.vqrl");
    if std::fs::write(&path, data).is_err() {
        return;
    }

    // Reading arbitrary bytes should never panic
    if let Ok(reader) = ResultLogReader::open(&path) {
        for record in reader {
            if record.is_err() {
                break;
            }
        }
    }
});

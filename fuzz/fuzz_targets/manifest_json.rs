#![no_main]

use libfuzzer_sys::fuzz_target;
use starhouse_core::Record;
use starhouse_storage::Manifest;

fuzz_target!(|data: &[u8]| {
    // Fuzz the two JSON documents a catalog reads: record input and the
    // manifest, which is loaded through its consistency checks.
    if let Ok(record) = serde_json::from_slice::<Record>(data) {
        let json = serde_json::to_vec(&record).unwrap_or_default();
        let _ = serde_json::from_slice::<Record>(&json);
    }

    let Ok(dir) = tempfile::TempDir::new() else {
        return;
    };
    if std::fs::write(dir.path().join("manifest.json"), data).is_ok() {
        if let Ok(manifest) = Manifest::load(dir.path()) {
            let _ = manifest.row_group_count();
        }
    }
});

#![no_main]

use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use starhouse_storage::PartitionFileReader;

fuzz_target!(|data: &[u8]| {
    // Fuzz partition file parsing with arbitrary bytes.
    // Tests handling of:
    // - Bad magic and footer length
    // - Footers naming column types we never store
    // - Statistics and sorting columns pointing at missing columns
    // - Truncated or undecodable pages
    let Ok(reader) = PartitionFileReader::new(Bytes::copy_from_slice(data)) else {
        return;
    };
    let _ = reader.codec();
    let _ = reader.build_id();
    for group in 0..reader.row_group_count() {
        let _ = reader.sorting_columns(group);
        for column in 0..reader.columns().len() {
            let _ = reader.column_range(group, column);
        }
        if reader.read_row_group(group).is_err() {
            break;
        }
    }
});

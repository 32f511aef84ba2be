//! Fuzz target for result-set decoding.
//!
//! Ragged rows, duplicate headers and junk amounts must surface as decode
//! errors, never panics. A successful decode must restore its input.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use cost_digest::query::{ResultSet, decode};

#[derive(Arbitrary, Debug)]
struct DecodeInput {
    rows: Vec<Vec<String>>,
    numeric_columns: Vec<String>,
}

fuzz_target!(|input: DecodeInput| {
    let result_set = ResultSet::new(input.rows);
    if let Ok(table) = decode(&result_set, &input.numeric_columns) {
        assert_eq!(table.to_result_set(), result_set);
    }
});

//! Fuzz target for the CSV reader and writer.
//!
//! Arbitrary text must never panic the reader, and any grid of cells must
//! read back exactly after being written.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use cost_digest::render::{parse_csv, write_csv};

#[derive(Arbitrary, Debug)]
struct CsvInput {
    raw: String,
    grid: Vec<Vec<String>>,
}

fuzz_target!(|input: CsvInput| {
    let _ = parse_csv(&input.raw);

    let written = write_csv(&input.grid);
    let parsed = parse_csv(&written).expect("written CSV must parse");
    assert_eq!(parsed, input.grid);
});

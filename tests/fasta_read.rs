use std::error::Error;
use std::io::Cursor;
use std::io::Write;

use hictools::fasta::{iterate_reads, iterate_reads_strict, FastaError, LazyRecord};
use hictools::utils::file::ReopenableFile;

const FASTA1: &str = ">sequence1\nATCGTAGCTAGCTAGCTAGCTAGCTA\n>sequence2\nGGCATCGATCGATCGATCGATT\n>sequence3\nTTAGG\nCGTAG\nCTAGC\nATCGG\nTA\n";

fn collect(data: &str) -> Vec<LazyRecord> {
    iterate_reads(Cursor::new(data.as_bytes().to_vec()))
        .collect::<Result<_, _>>()
        .unwrap()
}

#[test]
fn three_sequence_file() {
    let records = collect(FASTA1);
    assert_eq!(records.len(), 3);

    let headers: Vec<_> = records
        .iter()
        .map(|r| r.header().unwrap().to_owned())
        .collect();
    assert_eq!(headers, vec!["sequence1", "sequence2", "sequence3"]);

    let lengths: Vec<_> = records.iter().map(|r| r.sequence().len()).collect();
    assert_eq!(lengths, vec![26, 22, 22]);

    // Multi-line payloads concatenate with the line breaks removed.
    assert_eq!(
        records[2].sequence_string().unwrap(),
        "TTAGGCGTAGCTAGCATCGGTA"
    );
}

#[test]
fn sequence_before_header_fails() {
    let result: Result<Vec<_>, _> =
        iterate_reads_strict(Cursor::new(b"ACGT\n>h\nACGT\n".to_vec())).collect();
    match result {
        Err(FastaError::InvalidFormat(msg)) => {
            assert_eq!(msg, "Found sequence data before header")
        }
        other => panic!("expected InvalidFormat, got {:?}", other),
    }
}

#[test]
fn empty_sequence_fails_in_strict_mode() {
    let result: Result<Vec<_>, _> =
        iterate_reads_strict(Cursor::new(b">h1\n>h2\nACGT\n".to_vec())).collect();
    match result {
        Err(FastaError::InvalidFormat(msg)) => {
            assert_eq!(msg, "Empty sequence for header")
        }
        other => panic!("expected InvalidFormat, got {:?}", other),
    }

    // The lazy variant accepts the same file.
    let records = collect(">h1\n>h2\nACGT\n");
    assert_eq!(records.len(), 2);
    assert!(records[0].sequence().is_empty());
}

#[test]
fn strict_mode_passes_well_formed_input() {
    let records: Vec<LazyRecord> = iterate_reads_strict(Cursor::new(FASTA1.as_bytes().to_vec()))
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(records.len(), 3);
}

#[test]
fn reads_from_a_file_on_disk() -> Result<(), Box<dyn Error>> {
    let mut tmp = tempfile::NamedTempFile::new()?;
    tmp.write_all(FASTA1.as_bytes())?;
    tmp.flush()?;

    let source = ReopenableFile::open(tmp.path())?;
    let records: Vec<LazyRecord> = iterate_reads(source).collect::<Result<_, _>>()?;
    assert_eq!(records.len(), 3);
    assert_eq!(records[0].sequence().len(), 26);
    Ok(())
}

#[test]
fn records_arrive_lazily_in_file_order() {
    let mut driver = iterate_reads(Cursor::new(FASTA1.as_bytes().to_vec()));
    assert_eq!(
        driver.next().unwrap().unwrap().header().unwrap(),
        "sequence1"
    );
    assert_eq!(
        driver.next().unwrap().unwrap().header().unwrap(),
        "sequence2"
    );
    assert_eq!(
        driver.next().unwrap().unwrap().header().unwrap(),
        "sequence3"
    );
    assert!(driver.next().is_none());
    assert!(driver.next().is_none());
}

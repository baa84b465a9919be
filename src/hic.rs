/*!
Reading Hi-C V8 contact-map files.

The entrypoint is [`HicReader`]: construct one over anything `Read + Seek`
(or with [`HicReader::open_file`]), read the header and master index, then
iterate contacts for a pair of genomic ranges at a resolution:

```no_run
# use std::error::Error;
# fn main() -> Result<(), Box<dyn Error>> {
use hictools::{ContactsKind, HicReader, Resolution};
use hictools::genome::GenomicRange;

let mut hic = HicReader::open_file("matrix.hic")?;
let chr1 = hic.header().unwrap().genome.chromosomes()[0].clone();
let range = GenomicRange::full(&chr1);
for contact in hic.iterate_contacts(
    &range,
    &range,
    Resolution::bp(50_000),
    ContactsKind::Observed,
)? {
    let contact = contact?;
    println!("{} {} {}", contact.bin_x, contact.bin_y, contact.value);
}
# Ok(())
# }
```

Each read operation drives a dedicated [pull parser][crate::parse] against
the file: the header streams from offset 0, the master index from the
footer position, and contact blocks are fetched, inflated, and decoded one
at a time as the iterator is pulled.
*/

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::io;

use thiserror::Error;

use crate::genome::{ChromosomeNotFound, IndexedGenome};
use crate::parse::{ByteAccumulator, Cursor, ParseError, ReadRequest};

pub(crate) mod contacts;
pub(crate) mod expected;
pub(crate) mod footer;
pub(crate) mod header;
pub(crate) mod hicread;
pub(crate) mod matrix;

pub use contacts::ContactIterator;
pub use hicread::HicReader;

pub(crate) const HIC_MAGIC: &[u8] = b"HIC\0";
pub(crate) const SUPPORTED_VERSION: i32 = 8;

/// The coordinate system a resolution bins over.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Unit {
    Bp,
    Frag,
}

impl Unit {
    pub(crate) fn parse(s: &str) -> Option<Unit> {
        match s {
            "BP" => Some(Unit::Bp),
            "FRAG" => Some(Unit::Frag),
            _ => None,
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unit::Bp => write!(f, "BP"),
            Unit::Frag => write!(f, "FRAG"),
        }
    }
}

/// A bin size in a unit. Two resolutions are equal only if both match.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Resolution {
    pub bin_size: u32,
    pub unit: Unit,
}

impl Resolution {
    pub fn bp(bin_size: u32) -> Resolution {
        Resolution {
            bin_size,
            unit: Unit::Bp,
        }
    }

    pub fn frag(bin_size: u32) -> Resolution {
        Resolution {
            bin_size,
            unit: Unit::Frag,
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.bin_size, self.unit)
    }
}

/// A span of bytes in the underlying file.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FileRegion {
    pub offset: u64,
    pub length: u32,
}

/// The preamble of a Hi-C file: identity, genome, and resolutions.
#[derive(Clone, Debug)]
pub struct HicHeader {
    pub version: i32,
    pub footer_position: u64,
    pub genome_id: String,
    /// Free-form key/value attributes in file order.
    pub attributes: Vec<(String, String)>,
    pub genome: IndexedGenome,
    pub resolutions: Vec<Resolution>,
    /// Restriction sites per chromosome; present only when the file
    /// carries fragment resolutions.
    pub fragment_sites: HashMap<String, Vec<i32>>,
    /// Where the expected-value vectors start; recorded while reading the
    /// master index. The length is advisory.
    pub(crate) expected_vectors_region: Option<FileRegion>,
}

impl HicHeader {
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// The directory mapping chromosome-pair keys to matrix records.
#[derive(Clone, Debug, Default)]
pub struct MasterIndex {
    entries: HashMap<String, FileRegion>,
}

impl MasterIndex {
    pub(crate) fn key(chr1: u32, chr2: u32) -> String {
        format!("{}_{}", chr1, chr2)
    }

    pub(crate) fn insert(&mut self, key: String, region: FileRegion) {
        self.entries.insert(key, region);
    }

    /// The matrix record for a chromosome pair, if the file has one.
    pub fn region(&self, chr1: u32, chr2: u32) -> Option<FileRegion> {
        self.entries.get(&MasterIndex::key(chr1, chr2)).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Per-resolution layout of one matrix: block geometry and block index.
#[derive(Clone, Debug)]
pub struct ResolutionMetadata {
    pub resolution: Resolution,
    pub sum_counts: f32,
    /// Bins per block side.
    pub block_size: u32,
    pub block_column_count: u32,
    /// Sorted map from flat block number to its compressed bytes.
    pub block_index: BTreeMap<i32, FileRegion>,
}

/// One expected-value vector: expected counts by genomic distance in bins,
/// plus per-chromosome scale factors.
#[derive(Clone, Debug)]
pub struct ExpectedValues {
    /// `None` for the un-normalized vector group.
    pub normalization: Option<String>,
    pub resolution: Resolution,
    pub values: Vec<f64>,
    pub scale_factors: HashMap<u32, f64>,
}

impl ExpectedValues {
    /// The expected count at a distance, clamped to the vector tail.
    pub fn value_for_distance(&self, distance: usize) -> f64 {
        match self.values.last() {
            Some(&last) => *self.values.get(distance).unwrap_or(&last),
            None => f64::NAN,
        }
    }

    /// The scale factor for a chromosome index (1.0 when absent).
    pub fn scale_factor(&self, chromosome: u32) -> f64 {
        self.scale_factors.get(&chromosome).copied().unwrap_or(1.0)
    }
}

/// One cell of the contact matrix.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ContactRecord {
    pub bin_x: i32,
    pub bin_y: i32,
    pub value: f64,
}

/// Which values [`HicReader::iterate_contacts`] emits.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ContactsKind {
    /// Raw observed counts.
    Observed,
    /// Counts divided by the un-normalized expected value at the bin
    /// distance and the chromosome scale factors.
    OverExpected,
    /// Like `OverExpected`, using the named normalization's vectors.
    Normalized(String),
}

/// Possible errors encountered when reading a hic file.
#[derive(Error, Debug)]
pub enum HicReadError {
    #[error("Invalid magic (likely not a hic file)")]
    InvalidMagic,
    #[error("Unsupported hic version: {} (only version 8 is supported)", .0)]
    UnsupportedVersion(i32),
    #[error("The file was invalid: {}", .0)]
    InvalidFormat(String),
    #[error("No matrix for key {} in the master index", .0)]
    UnknownMatrix(String),
    #[error("The requested resolution was not found")]
    ResolutionNotFound,
    #[error("The passed chromosome ({}) was incorrect.", .0)]
    InvalidChromosome(String),
    #[error("Operation out of order: {}", .0)]
    State(&'static str),
    #[error("{}", .0)]
    Parse(#[from] ParseError),
}

impl From<ChromosomeNotFound> for HicReadError {
    fn from(e: ChromosomeNotFound) -> Self {
        HicReadError::InvalidChromosome(e.0)
    }
}

impl From<io::Error> for HicReadError {
    fn from(e: io::Error) -> Self {
        HicReadError::Parse(ParseError::IoError(e))
    }
}

/// Result of looking for a nul terminator in the buffered window.
pub(crate) enum Scan {
    Found(u64),
    Need(ReadRequest),
}

/// Scans for the next 0x00 at or after `from`, requesting more bytes while
/// the window does not contain one. `awaiting` carries the stall detection
/// across suspensions; running out of input mid-string is an EOF error.
pub(crate) fn scan_nul(
    acc: &ByteAccumulator,
    from: u64,
    awaiting: &mut Option<u64>,
) -> Result<Scan, ParseError> {
    if let Some(nul) = acc.find(from, 0) {
        *awaiting = None;
        return Ok(Scan::Found(nul));
    }
    if let Some(prev) = awaiting.take() {
        if acc.end_offset() == prev {
            return Err(ParseError::UnexpectedEof);
        }
    }
    *awaiting = Some(acc.end_offset());
    Ok(Scan::Need(ReadRequest::partial()))
}

/// Consumes the nul-terminated string ending at `nul` and validates UTF-8.
pub(crate) fn take_nul_string(
    cursor: &mut Cursor,
    acc: &ByteAccumulator,
    nul: u64,
) -> Result<String, HicReadError> {
    let bytes = acc.range(cursor.pos(), nul);
    let s = std::str::from_utf8(bytes)
        .map_err(|_| HicReadError::InvalidFormat("Invalid utf-8 string".to_owned()))?
        .to_owned();
    cursor.advance(bytes.len() as u64 + 1);
    Ok(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolutions_compare_on_both_fields() {
        assert_eq!(Resolution::bp(5000), Resolution::bp(5000));
        assert_ne!(Resolution::bp(5000), Resolution::frag(5000));
        assert_ne!(Resolution::bp(5000), Resolution::bp(10000));
    }

    #[test]
    fn unit_parsing() {
        assert_eq!(Unit::parse("BP"), Some(Unit::Bp));
        assert_eq!(Unit::parse("FRAG"), Some(Unit::Frag));
        assert_eq!(Unit::parse("bp"), None);
    }

    #[test]
    fn expected_value_clamp() {
        let ev = ExpectedValues {
            normalization: None,
            resolution: Resolution::bp(1000),
            values: vec![4.0, 2.0, 1.0],
            scale_factors: HashMap::new(),
        };
        assert_eq!(ev.value_for_distance(0), 4.0);
        assert_eq!(ev.value_for_distance(2), 1.0);
        assert_eq!(ev.value_for_distance(1_000_000), 1.0);
        assert_eq!(ev.scale_factor(7), 1.0);
    }

    #[test]
    fn master_index_keys() {
        let mut index = MasterIndex::default();
        index.insert(
            MasterIndex::key(0, 3),
            FileRegion {
                offset: 10,
                length: 20,
            },
        );
        assert!(index.region(0, 3).is_some());
        assert!(index.region(3, 0).is_none());
        assert_eq!(index.len(), 1);
    }
}

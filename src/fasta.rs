/*!
Streaming FASTA records.

[`iterate_reads`] walks a FASTA file record by record without materializing
more than one record at a time: the parser collapses its buffer after each
emission, so peak memory stays near the size of the longest record.

A [`LazyRecord`] holds the raw bytes of one record together with the
positions of every line-break byte inside it; the header and sequence are
decoded on demand from those offsets.

```no_run
# use std::error::Error;
# fn main() -> Result<(), Box<dyn Error>> {
use hictools::fasta::iterate_reads;
use hictools::utils::file::ReopenableFile;

let source = ReopenableFile::open("genome.fa")?;
for record in iterate_reads(source) {
    let record = record?;
    println!("{}: {} bp", record.header()?, record.sequence().len());
}
# Ok(())
# }
```
*/

use thiserror::Error;

use crate::parse::{
    parse_sync, ByteAccumulator, Cursor, ParseDriver, ParseError, ParseStep, PullParser,
    ReadRequest,
};
use crate::utils::file::SeekableRead;

const CR: u8 = 0x0D;
const LF: u8 = 0x0A;
const HEADER_MARK: u8 = b'>';

/// Default partial-read size while scanning for record boundaries.
pub const DEFAULT_SEEK_CHUNK: usize = 8;

#[derive(Error, Debug)]
pub enum FastaError {
    #[error("Invalid FASTA: {}", .0)]
    InvalidFormat(String),
    #[error("{}", .0)]
    Parse(#[from] ParseError),
}

/// One FASTA record as a raw byte span plus line-break offsets.
///
/// `offsets[0]` is the header start (right after `'>'`), `offsets[1]` the
/// header end, and the rest mark every CR/LF inside the payload; a record
/// cut short by EOF gets its own length appended so decoding is uniform.
/// Offsets are strictly increasing and relative to the record start.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LazyRecord {
    bytes: Vec<u8>,
    offsets: Vec<u32>,
}

impl LazyRecord {
    /// The record's bytes, starting at `'>'`.
    pub fn raw(&self) -> &[u8] {
        &self.bytes
    }

    pub fn offsets(&self) -> &[u32] {
        &self.offsets
    }

    pub fn header(&self) -> Result<&str, FastaError> {
        let start = self.offsets[0] as usize;
        let end = self.offsets.get(1).map(|&o| o as usize).unwrap_or(start);
        std::str::from_utf8(&self.bytes[start..end])
            .map_err(|_| FastaError::InvalidFormat("Header is not valid UTF-8".to_owned()))
    }

    /// The sequence with all line breaks removed.
    pub fn sequence(&self) -> Vec<u8> {
        let mut seq = Vec::with_capacity(self.bytes.len());
        for pair in self.offsets[1..].windows(2) {
            let (start, end) = (pair[0] as usize + 1, pair[1] as usize);
            if start < end {
                seq.extend_from_slice(&self.bytes[start..end]);
            }
        }
        seq
    }

    pub fn sequence_string(&self) -> Result<String, FastaError> {
        String::from_utf8(self.sequence())
            .map_err(|_| FastaError::InvalidFormat("Sequence is not valid UTF-8".to_owned()))
    }
}

enum ScanState {
    /// Before the first record; blank bytes are allowed.
    Leading,
    /// Cursor sits on a `'>'` that starts the next record.
    Begin,
    Header,
    Sequence,
    /// A record was just emitted; trim, then start the next one.
    CollapseThenBegin,
    Finished,
}

/// The record-scanning state machine behind [`iterate_reads`].
///
/// The cursor's checkpoint marks the start of the record under
/// construction; offsets are recorded relative to it.
pub struct FastaParser {
    state: ScanState,
    cursor: Cursor,
    offsets: Vec<u32>,
    line_start: bool,
    seq_seen: bool,
    strict: bool,
    seek_chunk: usize,
    awaiting: Option<u64>,
}

impl FastaParser {
    /// A parser that accepts records with empty sequences.
    pub fn new() -> FastaParser {
        FastaParser {
            state: ScanState::Leading,
            cursor: Cursor::at(0),
            offsets: Vec::new(),
            line_start: false,
            seq_seen: false,
            strict: false,
            seek_chunk: DEFAULT_SEEK_CHUNK,
            awaiting: None,
        }
    }

    /// A parser that rejects records with empty sequences.
    pub fn strict() -> FastaParser {
        FastaParser {
            strict: true,
            ..FastaParser::new()
        }
    }

    pub fn with_seek_chunk(mut self, seek_chunk: usize) -> Self {
        assert!(seek_chunk > 0, "seek chunk must be nonzero");
        self.seek_chunk = seek_chunk;
        self
    }

    /// Requests more bytes, or reports EOF (`None`) when the previous
    /// request came back empty.
    fn need_bytes(&mut self, acc: &ByteAccumulator) -> Option<ParseStep<LazyRecord>> {
        if let Some(prev) = self.awaiting.take() {
            if acc.end_offset() == prev {
                return None;
            }
        }
        self.awaiting = Some(acc.end_offset());
        Some(ParseStep::Read(ReadRequest::partial_up_to(self.seek_chunk)))
    }

    fn rel(&self, pos: u64) -> u32 {
        (pos - self.cursor.mark()) as u32
    }

    /// Closes out the record spanning the checkpoint to the cursor.
    fn emit(
        &mut self,
        acc: &ByteAccumulator,
        next: ScanState,
    ) -> Result<ParseStep<LazyRecord>, FastaError> {
        if self.strict && !self.seq_seen {
            return Err(FastaError::InvalidFormat(
                "Empty sequence for header".to_owned(),
            ));
        }
        let rel_end = self.rel(self.cursor.pos());
        if self.offsets.last().map_or(true, |&last| rel_end > last) {
            self.offsets.push(rel_end);
        }
        let record = LazyRecord {
            bytes: self.cursor.slice(acc).to_vec(),
            offsets: std::mem::take(&mut self.offsets),
        };
        self.state = next;
        Ok(ParseStep::Record(record))
    }
}

impl Default for FastaParser {
    fn default() -> Self {
        FastaParser::new()
    }
}

impl PullParser for FastaParser {
    type Record = LazyRecord;
    type Error = FastaError;

    fn step(
        &mut self,
        acc: &mut ByteAccumulator,
    ) -> Result<ParseStep<LazyRecord>, FastaError> {
        loop {
            match self.state {
                ScanState::Leading => {
                    while self.cursor.pos() < acc.end_offset() {
                        match acc.get(self.cursor.pos()) {
                            CR | LF | b' ' | b'\t' => self.cursor.advance(1),
                            HEADER_MARK => {
                                self.state = ScanState::Begin;
                                break;
                            }
                            _ => {
                                return Err(FastaError::InvalidFormat(
                                    "Found sequence data before header".to_owned(),
                                ))
                            }
                        }
                    }
                    if matches!(self.state, ScanState::Leading) {
                        match self.need_bytes(acc) {
                            Some(step) => return Ok(step),
                            None => {
                                self.state = ScanState::Finished;
                                return Ok(ParseStep::Stop);
                            }
                        }
                    }
                }
                ScanState::Begin => {
                    self.cursor.checkpoint();
                    self.offsets.clear();
                    self.offsets.push(1);
                    self.cursor.advance(1);
                    self.line_start = false;
                    self.seq_seen = false;
                    self.state = ScanState::Header;
                    return Ok(ParseStep::Pass);
                }
                ScanState::Header => {
                    while self.cursor.pos() < acc.end_offset() {
                        let byte = acc.get(self.cursor.pos());
                        self.cursor.advance(1);
                        if byte == CR || byte == LF {
                            self.offsets.push(self.rel(self.cursor.pos() - 1));
                            self.line_start = true;
                            self.state = ScanState::Sequence;
                            break;
                        }
                    }
                    if matches!(self.state, ScanState::Header) {
                        match self.need_bytes(acc) {
                            Some(step) => return Ok(step),
                            None => {
                                // Header cut short by EOF: a record with no payload.
                                return self.emit(acc, ScanState::Finished);
                            }
                        }
                    }
                }
                ScanState::Sequence => {
                    while self.cursor.pos() < acc.end_offset() {
                        let byte = acc.get(self.cursor.pos());
                        if byte == CR || byte == LF {
                            self.offsets.push(self.rel(self.cursor.pos()));
                            self.line_start = true;
                            self.cursor.advance(1);
                        } else if byte == HEADER_MARK && self.line_start {
                            return self.emit(acc, ScanState::CollapseThenBegin);
                        } else {
                            self.seq_seen = true;
                            self.line_start = false;
                            self.cursor.advance(1);
                        }
                    }
                    match self.need_bytes(acc) {
                        Some(step) => return Ok(step),
                        None => return self.emit(acc, ScanState::Finished),
                    }
                }
                ScanState::CollapseThenBegin => {
                    self.state = ScanState::Begin;
                    return Ok(ParseStep::Collapse {
                        keep_from: Some(self.cursor.pos()),
                    });
                }
                ScanState::Finished => return Ok(ParseStep::Stop),
            }
        }
    }
}

/// The record sequence produced by [`iterate_reads`].
pub type FastaRecords<S> = ParseDriver<S, FastaParser>;

/// Iterates the records of a FASTA source, accepting empty sequences.
pub fn iterate_reads<S: SeekableRead>(source: S) -> FastaRecords<S> {
    parse_sync(FastaParser::new(), source)
}

/// Iterates the records of a FASTA source, rejecting empty sequences.
pub fn iterate_reads_strict<S: SeekableRead>(source: S) -> FastaRecords<S> {
    parse_sync(FastaParser::strict(), source)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor as IoCursor;

    use super::*;

    fn records(data: &str) -> Vec<LazyRecord> {
        iterate_reads(IoCursor::new(data.as_bytes().to_vec()))
            .collect::<Result<_, _>>()
            .unwrap()
    }

    #[test]
    fn single_record() {
        let records = records(">seq1 description\nATCG\nGGTA\n");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].header().unwrap(), "seq1 description");
        assert_eq!(records[0].sequence(), b"ATCGGGTA");
    }

    #[test]
    fn multiple_records_and_boundaries() {
        let records = records(">a\nAT\n>b\nCG\nGT\n>c\nTT\n");
        let headers: Vec<_> = records.iter().map(|r| r.header().unwrap().to_owned()).collect();
        assert_eq!(headers, vec!["a", "b", "c"]);
        assert_eq!(records[1].sequence(), b"CGGT");
    }

    #[test]
    fn crlf_line_endings() {
        let records = records(">h\r\nAC\r\nGT\r\n");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].header().unwrap(), "h");
        assert_eq!(records[0].sequence(), b"ACGT");
    }

    #[test]
    fn cr_only_line_endings() {
        let records = records(">h\rACGT\r>i\rTT\r");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].sequence(), b"ACGT");
        assert_eq!(records[1].header().unwrap(), "i");
    }

    #[test]
    fn missing_final_newline() {
        let records = records(">h\nACG\nTA");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].sequence(), b"ACGTA");
    }

    #[test]
    fn leading_blank_lines_are_skipped() {
        let records = records("\n\n>h\nAC\n");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].header().unwrap(), "h");
    }

    #[test]
    fn sequence_before_header_is_rejected() {
        let result: Result<Vec<_>, _> =
            iterate_reads(IoCursor::new(b"ACGT\n>h\nACGT\n".to_vec())).collect();
        match result {
            Err(FastaError::InvalidFormat(msg)) => {
                assert_eq!(msg, "Found sequence data before header")
            }
            other => panic!("expected InvalidFormat, got {:?}", other),
        }
    }

    #[test]
    fn strict_rejects_empty_sequence() {
        let result: Result<Vec<_>, _> =
            iterate_reads_strict(IoCursor::new(b">h1\n>h2\nACGT\n".to_vec())).collect();
        match result {
            Err(FastaError::InvalidFormat(msg)) => {
                assert_eq!(msg, "Empty sequence for header")
            }
            other => panic!("expected InvalidFormat, got {:?}", other),
        }
    }

    #[test]
    fn lazy_accepts_empty_sequence() {
        let records = records(">h1\n>h2\nACGT\n");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].header().unwrap(), "h1");
        assert!(records[0].sequence().is_empty());
        assert_eq!(records[1].sequence(), b"ACGT");
    }

    #[test]
    fn empty_and_blank_inputs_yield_nothing() {
        assert!(records("").is_empty());
        assert!(records("\n\n\n").is_empty());
    }

    #[test]
    fn offsets_are_strictly_increasing_and_roundtrip() {
        for record in records(">a b\nAC\nGT\n>c\nT\n") {
            let offsets = record.offsets();
            assert!(offsets.windows(2).all(|w| w[0] < w[1]));
            assert_eq!(record.raw()[0], b'>');

            // Reinserting the recorded whitespace bytes around the decoded
            // header and sequence reproduces the raw record.
            let mut rebuilt = vec![b'>'];
            rebuilt.extend_from_slice(record.header().unwrap().as_bytes());
            let mut seq = record.sequence().into_iter();
            let raw = record.raw();
            for pair in offsets[1..].windows(2) {
                rebuilt.push(raw[pair[0] as usize]);
                for _ in pair[0] + 1..pair[1] {
                    rebuilt.push(seq.next().unwrap());
                }
            }
            if let Some(&last) = offsets.last() {
                if (last as usize) < raw.len() {
                    rebuilt.push(raw[last as usize]);
                }
            }
            assert_eq!(rebuilt, raw);
        }
    }

    #[test]
    fn accumulator_stays_bounded() {
        let mut data = String::new();
        let mut longest = 0;
        for i in 0..50 {
            let record = format!(">read{}\n{}\n", i, "ACGT".repeat(10 + i % 7));
            longest = longest.max(record.len());
            data.push_str(&record);
        }
        let mut driver = iterate_reads(IoCursor::new(data.into_bytes()));
        let mut peak = 0;
        while let Some(record) = driver.next() {
            record.unwrap();
            peak = peak.max(driver.buffered());
        }
        assert!(peak <= longest + DEFAULT_SEEK_CHUNK);
    }
}

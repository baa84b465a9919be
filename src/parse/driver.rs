//! Runs a parser against a byte source, servicing its requests.

use std::io::{self, SeekFrom};

use crate::parse::{
    ByteAccumulator, ParseError, ParseStep, PullParser, ReadKind, ReadRequest,
};
use crate::utils::file::SeekableRead;

/// Default number of bytes supplied for a partial read with no `max`.
pub const DEFAULT_READ_CHUNK: usize = 8 * 1024;

/// Starts `parser` over `source` and returns the lazy record sequence.
///
/// The source can be anything `Read + Seek`: a `File`, an
/// `io::Cursor<Vec<u8>>`, or a `&mut` borrow of either, so an owning
/// container can lend its file to a driver and take it back afterwards.
pub fn parse_sync<S: SeekableRead, P: PullParser>(parser: P, source: S) -> ParseDriver<S, P> {
    ParseDriver {
        source,
        parser,
        acc: ByteAccumulator::new(),
        chunk: DEFAULT_READ_CHUNK,
        finished: false,
    }
}

/// Drives a parser that finishes with a single `Complete` value and
/// returns that value.
pub fn handle_sync<S: SeekableRead, P: PullParser>(
    parser: P,
    source: S,
) -> Result<P::Record, P::Error> {
    match parse_sync(parser, source).next() {
        Some(result) => result,
        None => Err(ParseError::UnexpectedEof.into()),
    }
}

/// The cooperative loop between one source and one parser.
///
/// Each `next()` steps the parser until it emits a record, completes, or
/// fails; read and trim requests are serviced in yield order with no
/// concurrent source access. Dropping the driver cancels the parser at its
/// current suspension point. An error fuses the iterator.
pub struct ParseDriver<S, P> {
    source: S,
    parser: P,
    acc: ByteAccumulator,
    chunk: usize,
    finished: bool,
}

impl<S, P> ParseDriver<S, P> {
    pub fn with_chunk_size(mut self, chunk: usize) -> Self {
        assert!(chunk > 0, "chunk size must be nonzero");
        self.chunk = chunk;
        self
    }

    /// Bytes currently buffered, for memory accounting.
    pub fn buffered(&self) -> usize {
        self.acc.len()
    }
}

impl<S: SeekableRead, P: PullParser> ParseDriver<S, P> {
    fn service(&mut self, request: ReadRequest) -> Result<(), ParseError> {
        if let Some(position) = request.position {
            self.source.seek(SeekFrom::Start(position))?;
            self.acc.clear_at(position);
        }
        match request.kind {
            ReadKind::Exact(count) => {
                let mut buf = vec![0u8; count];
                self.source.read_exact(&mut buf).map_err(|e| {
                    if e.kind() == io::ErrorKind::UnexpectedEof {
                        ParseError::UnexpectedEof
                    } else {
                        ParseError::IoError(e)
                    }
                })?;
                self.acc.append(&buf);
            }
            ReadKind::Partial { max } => {
                let mut buf = vec![0u8; max.unwrap_or(self.chunk)];
                let n = loop {
                    match self.source.read(&mut buf) {
                        Ok(n) => break n,
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                        Err(e) => return Err(ParseError::IoError(e)),
                    }
                };
                // n == 0 leaves the window unchanged: that is the EOF signal.
                self.acc.append(&buf[..n]);
            }
        }
        Ok(())
    }
}

impl<S: SeekableRead, P: PullParser> Iterator for ParseDriver<S, P> {
    type Item = Result<P::Record, P::Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        loop {
            let step = match self.parser.step(&mut self.acc) {
                Ok(step) => step,
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e));
                }
            };
            match step {
                ParseStep::Read(request) => {
                    if let Err(e) = self.service(request) {
                        self.finished = true;
                        return Some(Err(e.into()));
                    }
                }
                ParseStep::Collapse { keep_from } => match keep_from {
                    Some(offset) => self.acc.collapse_to(offset),
                    None => self.acc.clear_at(self.acc.end_offset()),
                },
                ParseStep::Pass => {}
                ParseStep::Record(value) => return Some(Ok(value)),
                ParseStep::Complete(value) => {
                    self.finished = true;
                    return Some(Ok(value));
                }
                ParseStep::Stop => {
                    self.finished = true;
                    return None;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor as IoCursor;

    use super::*;
    use crate::parse::Cursor;

    /// Emits each little-endian u32 of the input as a record.
    struct WordParser {
        cursor: Cursor,
        stalled: Option<u64>,
    }

    impl WordParser {
        fn new() -> WordParser {
            WordParser {
                cursor: Cursor::at(0),
                stalled: None,
            }
        }
    }

    impl PullParser for WordParser {
        type Record = u32;
        type Error = ParseError;

        fn step(
            &mut self,
            acc: &mut ByteAccumulator,
        ) -> Result<ParseStep<u32>, ParseError> {
            if acc.available_from(self.cursor.pos()) < 4 {
                if let Some(prev) = self.stalled.take() {
                    if acc.end_offset() == prev {
                        if acc.available_from(self.cursor.pos()) == 0 {
                            return Ok(ParseStep::Stop);
                        }
                        return Err(ParseError::UnexpectedEof);
                    }
                }
                self.stalled = Some(acc.end_offset());
                return Ok(ParseStep::Read(ReadRequest::partial_up_to(3)));
            }
            let word = self.cursor.read_i32(acc)? as u32;
            Ok(ParseStep::Record(word))
        }
    }

    #[test]
    fn partial_reads_accumulate_across_chunks() {
        let mut data = Vec::new();
        for w in [7u32, 1_000_000, u32::MAX] {
            data.extend_from_slice(&w.to_le_bytes());
        }
        let words: Vec<u32> = parse_sync(WordParser::new(), IoCursor::new(data))
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(words, vec![7, 1_000_000, u32::MAX]);
    }

    #[test]
    fn trailing_garbage_is_an_eof_error() {
        let mut data = 5u32.to_le_bytes().to_vec();
        data.extend_from_slice(&[1, 2]);
        let results: Vec<_> = parse_sync(WordParser::new(), IoCursor::new(data)).collect();
        assert_eq!(results.len(), 2);
        assert_eq!(*results[0].as_ref().unwrap(), 5);
        assert!(matches!(results[1], Err(ParseError::UnexpectedEof)));
    }

    /// Reads four bytes at an absolute position, then completes.
    struct SeekParser {
        position: u64,
        started: bool,
        cursor: Cursor,
    }

    impl PullParser for SeekParser {
        type Record = Vec<u8>;
        type Error = ParseError;

        fn step(
            &mut self,
            acc: &mut ByteAccumulator,
        ) -> Result<ParseStep<Vec<u8>>, ParseError> {
            if !self.started {
                self.started = true;
                self.cursor = Cursor::at(self.position);
                return Ok(ParseStep::Read(ReadRequest::exact_at(self.position, 4)));
            }
            let bytes = self.cursor.take(acc, 4)?.to_vec();
            Ok(ParseStep::Complete(bytes))
        }
    }

    #[test]
    fn exact_read_at_position_reanchors() {
        let data = b"0123456789".to_vec();
        let parser = SeekParser {
            position: 6,
            started: false,
            cursor: Cursor::at(0),
        };
        let bytes = handle_sync(parser, IoCursor::new(data)).unwrap();
        assert_eq!(bytes, b"6789");
    }

    #[test]
    fn exact_read_past_end_is_eof() {
        let parser = SeekParser {
            position: 8,
            started: false,
            cursor: Cursor::at(0),
        };
        let result = handle_sync(parser, IoCursor::new(b"0123456789".to_vec()));
        assert!(matches!(result, Err(ParseError::UnexpectedEof)));
    }
}

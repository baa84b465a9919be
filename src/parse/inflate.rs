//! Transparent zlib decompression for nested parsers.

use std::io::{self, Read};

use flate2::read::ZlibDecoder;
use flate2::{Decompress, FlushDecompress, Status};

use crate::parse::{
    ByteAccumulator, ParseError, ParseStep, PullParser, ReadKind, ReadRequest,
};

/// Default number of compressed bytes demanded from the outer stream per
/// refill.
pub const DEFAULT_DECOMPRESS_CHUNK: usize = 4096;

/// One-shot zlib decompression into a fresh accumulator, for sources that
/// store independently compressed chunks (Hi-C contact blocks).
pub fn inflate_into_accumulator(data: &[u8]) -> io::Result<ByteAccumulator> {
    let mut out = Vec::with_capacity(data.len().saturating_mul(4));
    ZlibDecoder::new(data).read_to_end(&mut out)?;
    Ok(ByteAccumulator::with_data(out))
}

/// What the inner parser is currently waiting for.
enum Demand {
    /// The inner window must reach this absolute end offset.
    Exact { target_end: u64 },
    /// The inner window must grow past this baseline (or hit stream end).
    Partial { baseline: u64 },
}

/// A parser transformer that inflates a zlib stream.
///
/// `ZlibStream<P>` runs over the *compressed* outer stream and owns an
/// inner accumulator of decompressed bytes for the nested parser `P`. An
/// inner byte demand pulls compressed bytes through the inflater,
/// requesting more from the driver only when the outer window runs dry;
/// consumed outer bytes are released with a collapse first, so compressed
/// input never piles up. Emissions from the inner parser are re-yielded
/// unchanged.
///
/// The stream is forward-only: an inner request with an absolute source
/// position is a programmer error and panics.
pub struct ZlibStream<P> {
    inner: P,
    inner_acc: ByteAccumulator,
    inflate: Decompress,
    outer_pos: Option<u64>,
    chunk: usize,
    demand: Option<Demand>,
    stream_end: bool,
    collapsed: bool,
    outer_stalled: Option<u64>,
}

impl<P> ZlibStream<P> {
    pub fn new(inner: P) -> ZlibStream<P> {
        ZlibStream {
            inner,
            inner_acc: ByteAccumulator::new(),
            inflate: Decompress::new(true),
            outer_pos: None,
            chunk: DEFAULT_DECOMPRESS_CHUNK,
            demand: None,
            stream_end: false,
            collapsed: false,
            outer_stalled: None,
        }
    }

    pub fn with_chunk_size(mut self, chunk: usize) -> Self {
        assert!(chunk > 0, "chunk size must be nonzero");
        self.chunk = chunk;
        self
    }

    /// Feeds buffered outer bytes through the inflater once. Returns
    /// (consumed, produced) counts.
    fn inflate_some(
        &mut self,
        outer: &ByteAccumulator,
        outer_pos: u64,
    ) -> Result<(u64, usize), ParseError> {
        let input = outer.range(outer_pos, outer.end_offset());
        let mut out = vec![0u8; self.chunk];
        let before_in = self.inflate.total_in();
        let before_out = self.inflate.total_out();
        let status = self
            .inflate
            .decompress(input, &mut out, FlushDecompress::None)
            .map_err(|e| {
                ParseError::IoError(io::Error::new(io::ErrorKind::InvalidData, e))
            })?;
        let consumed = self.inflate.total_in() - before_in;
        let produced = (self.inflate.total_out() - before_out) as usize;
        self.inner_acc.append(&out[..produced]);
        if status == Status::StreamEnd {
            self.stream_end = true;
        }
        Ok((consumed, produced))
    }
}

impl<P: PullParser> PullParser for ZlibStream<P> {
    type Record = P::Record;
    type Error = P::Error;

    fn step(
        &mut self,
        outer: &mut ByteAccumulator,
    ) -> Result<ParseStep<Self::Record>, Self::Error> {
        let mut outer_pos = *self
            .outer_pos
            .get_or_insert_with(|| outer.first_offset());
        loop {
            if let Some(demand) = &self.demand {
                let satisfied = match demand {
                    Demand::Exact { target_end } => self.inner_acc.end_offset() >= *target_end,
                    Demand::Partial { baseline } => self.inner_acc.end_offset() > *baseline,
                };
                if satisfied {
                    self.demand = None;
                } else if self.stream_end {
                    if let Demand::Exact { .. } = demand {
                        return Err(ParseError::UnexpectedEof.into());
                    }
                    // The inner parser observes no growth and handles EOF.
                    self.demand = None;
                } else {
                    let mut need_input = outer_pos == outer.end_offset();
                    if !need_input {
                        self.outer_stalled = None;
                        let (consumed, produced) =
                            self.inflate_some(outer, outer_pos)?;
                        outer_pos += consumed;
                        self.outer_pos = Some(outer_pos);
                        need_input =
                            consumed == 0 && produced == 0 && !self.stream_end;
                    }
                    if need_input {
                        if let Some(prev) = self.outer_stalled.take() {
                            if outer.end_offset() == prev {
                                // Compressed input truncated mid-stream.
                                return Err(ParseError::UnexpectedEof.into());
                            }
                        }
                        if !self.collapsed && outer_pos > outer.first_offset() {
                            self.collapsed = true;
                            return Ok(ParseStep::Collapse {
                                keep_from: Some(outer_pos),
                            });
                        }
                        self.collapsed = false;
                        self.outer_stalled = Some(outer.end_offset());
                        return Ok(ParseStep::Read(ReadRequest::partial_up_to(self.chunk)));
                    }
                    continue;
                }
            }
            match self.inner.step(&mut self.inner_acc)? {
                ParseStep::Read(request) => {
                    assert!(
                        request.position.is_none(),
                        "absolute repositioning is not supported inside a compressed stream"
                    );
                    self.demand = Some(match request.kind {
                        ReadKind::Exact(count) => Demand::Exact {
                            target_end: self.inner_acc.end_offset() + count as u64,
                        },
                        ReadKind::Partial { .. } => Demand::Partial {
                            baseline: self.inner_acc.end_offset(),
                        },
                    });
                }
                ParseStep::Collapse { keep_from } => match keep_from {
                    Some(offset) => self.inner_acc.collapse_to(offset),
                    None => self.inner_acc.clear_at(self.inner_acc.end_offset()),
                },
                ParseStep::Pass => return Ok(ParseStep::Pass),
                ParseStep::Record(value) => return Ok(ParseStep::Record(value)),
                ParseStep::Complete(value) => return Ok(ParseStep::Complete(value)),
                ParseStep::Stop => return Ok(ParseStep::Stop),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor as IoCursor;
    use std::io::Write;

    use flate2::write::ZlibEncoder;
    use flate2::Compression;

    use super::*;
    use crate::parse::{parse_sync, Cursor};

    fn deflate(data: &[u8]) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn one_shot_inflate() {
        let acc = inflate_into_accumulator(&deflate(b"block payload")).unwrap();
        assert_eq!(acc.range(0, acc.end_offset()), b"block payload");
    }

    /// Demands fixed-size chunks of the decompressed stream until EOF.
    struct ChunkParser {
        cursor: Cursor,
        size: usize,
        stalled: Option<u64>,
    }

    impl PullParser for ChunkParser {
        type Record = Vec<u8>;
        type Error = ParseError;

        fn step(
            &mut self,
            acc: &mut ByteAccumulator,
        ) -> Result<ParseStep<Vec<u8>>, ParseError> {
            if acc.available_from(self.cursor.pos()) < self.size {
                if let Some(prev) = self.stalled.take() {
                    if acc.end_offset() == prev {
                        return Ok(ParseStep::Stop);
                    }
                }
                self.stalled = Some(acc.end_offset());
                return Ok(ParseStep::Read(ReadRequest::partial()));
            }
            let chunk = self.cursor.take(acc, self.size)?.to_vec();
            Ok(ParseStep::Record(chunk))
        }
    }

    #[test]
    fn streaming_inflate_across_tiny_outer_chunks() {
        let payload: Vec<u8> = (0u16..2048).map(|i| (i % 251) as u8).collect();
        let compressed = deflate(&payload);
        let parser = ZlibStream::new(ChunkParser {
            cursor: Cursor::at(0),
            size: 256,
            stalled: None,
        })
        .with_chunk_size(17);
        let chunks: Vec<Vec<u8>> = parse_sync(parser, IoCursor::new(compressed))
            .collect::<Result<_, _>>()
            .unwrap();
        let rebuilt: Vec<u8> = chunks.concat();
        assert_eq!(rebuilt, payload);
    }

    /// Demands an exact count beyond what the stream holds.
    struct GreedyParser {
        asked: bool,
    }

    impl PullParser for GreedyParser {
        type Record = ();
        type Error = ParseError;

        fn step(
            &mut self,
            acc: &mut ByteAccumulator,
        ) -> Result<ParseStep<()>, ParseError> {
            if !self.asked {
                self.asked = true;
                return Ok(ParseStep::Read(ReadRequest::exact(1_000_000)));
            }
            let _ = acc;
            Ok(ParseStep::Complete(()))
        }
    }

    #[test]
    fn exact_demand_past_stream_end_is_eof() {
        let compressed = deflate(b"short");
        let parser = ZlibStream::new(GreedyParser { asked: false });
        let result: Result<Vec<()>, _> =
            parse_sync(parser, IoCursor::new(compressed)).collect();
        assert!(matches!(result, Err(ParseError::UnexpectedEof)));
    }

    #[test]
    fn truncated_compressed_input_is_eof() {
        let mut compressed = deflate(&vec![42u8; 4096]);
        compressed.truncate(compressed.len() / 2);
        let parser = ZlibStream::new(ChunkParser {
            cursor: Cursor::at(0),
            size: 4096,
            stalled: None,
        });
        let result: Result<Vec<Vec<u8>>, _> =
            parse_sync(parser, IoCursor::new(compressed)).collect();
        assert!(matches!(result, Err(ParseError::UnexpectedEof)));
    }
}

/*!
The pull-based parsing framework underlying both the FASTA and Hi-C readers.

A parser here is a resumable state machine over a [`ByteAccumulator`], a
window of bytes anchored at an absolute file offset. On every call to
[`PullParser::step`], the parser either makes progress against the bytes
currently in the window or yields a [`ParseStep`] describing what it needs:
more bytes (exact or partial, optionally at an absolute source position), a
buffer trim, or an emission. The [driver][crate::parse::driver] owns the
source and the accumulator, services the requests, and exposes the emitted
records as a lazy `Iterator`.

Two conventions keep the protocol small:

- An *exact* read demands that many bytes beyond the current window end; a
  short read is an [`UnexpectedEof`][ParseError::UnexpectedEof] error.
- A *partial* read supplies between zero and `max` bytes. Zero bytes leaves
  the accumulator unchanged, which is how end-of-input is signalled: a
  parser that sees no growth after a partial request has reached EOF and
  decides for itself whether that is fine (FASTA) or fatal (Hi-C sections).

Parsers compose: [`ZlibStream`][inflate::ZlibStream] is itself a
`PullParser` that inflates the outer compressed stream into an inner
accumulator on behalf of a nested parser, forwarding demands upward.
*/

use std::io;

use thiserror::Error;

pub mod accum;
pub mod cursor;
pub mod driver;
pub mod inflate;

pub use accum::ByteAccumulator;
pub use cursor::Cursor;
pub use driver::{handle_sync, parse_sync, ParseDriver};
pub use inflate::{inflate_into_accumulator, ZlibStream};

/// How many bytes a [`ReadRequest`] wants.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ReadKind {
    /// Exactly this many bytes beyond the current window end.
    Exact(usize),
    /// At least one byte, up to `max` (driver default when `None`).
    Partial { max: Option<usize> },
}

/// A demand for more bytes, optionally repositioning the source first.
///
/// When `position` is set the driver seeks there and re-anchors the
/// accumulator, discarding the old window.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ReadRequest {
    pub kind: ReadKind,
    pub position: Option<u64>,
}

impl ReadRequest {
    pub fn exact(count: usize) -> ReadRequest {
        ReadRequest {
            kind: ReadKind::Exact(count),
            position: None,
        }
    }

    pub fn exact_at(position: u64, count: usize) -> ReadRequest {
        ReadRequest {
            kind: ReadKind::Exact(count),
            position: Some(position),
        }
    }

    pub fn partial() -> ReadRequest {
        ReadRequest {
            kind: ReadKind::Partial { max: None },
            position: None,
        }
    }

    pub fn partial_up_to(max: usize) -> ReadRequest {
        ReadRequest {
            kind: ReadKind::Partial { max: Some(max) },
            position: None,
        }
    }
}

/// What a parser yields at each suspension point.
#[derive(Debug)]
pub enum ParseStep<T> {
    /// Demand more bytes before progress can continue.
    Read(ReadRequest),
    /// Hint that bytes before `keep_from` are no longer needed
    /// (`None` drops the whole window).
    Collapse { keep_from: Option<u64> },
    /// Yield control without a demand; the driver steps again immediately.
    /// Used by composite parsers to hand one inner transition per step.
    Pass,
    /// One record among many.
    Record(T),
    /// The final emission of a composite parser; parsing ends.
    Complete(T),
    /// End without emitting.
    Stop,
}

/// A resumable parser over an accumulator window.
///
/// `step` is called repeatedly by the driver; it must be deterministic
/// given the window contents and must only suspend by returning. A parser
/// is restarted by constructing a new value, never by rewinding.
pub trait PullParser {
    type Record;
    type Error: From<ParseError>;

    fn step(
        &mut self,
        acc: &mut ByteAccumulator,
    ) -> Result<ParseStep<Self::Record>, Self::Error>;
}

/// Errors raised by the framework itself while servicing a parser.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Unexpected end of input")]
    UnexpectedEof,
    #[error("Error occurred: {}", .0)]
    IoError(#[from] io::Error),
}

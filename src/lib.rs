/*!
Hictools reads FASTA sequence files and Hi-C V8 contact-map files on top of
one pull-based, resumable parsing framework.

## Reading Hi-C files

The entrypoint is [`HicReader::open`] (or [`HicReader::open_file`]), which
takes any type implementing both [`Read`][std::io::Read] and
[`Seek`][std::io::Seek] and reads the file's header and master index. From
there, [`HicReader::iterate_contacts`] returns a lazy `Iterator` of
[`ContactRecord`]s overlapping a pair of [`GenomicRange`][genome::GenomicRange]s
at a chosen [`Resolution`], fetching and inflating contact blocks one at a
time; [`HicReader::read_expected_value_vectors`] exposes the expected-value
vectors used for `Observed/Expected` and named normalizations.

## Reading FASTA files

[`fasta::iterate_reads`] streams [`fasta::LazyRecord`]s out of a FASTA
source in bounded memory, collapsing its buffer after every record.

## The parsing framework

Both readers are built from [`parse`]: resumable parser state machines
that yield typed read requests against a byte accumulator, a driver that
services them from a source, and a zlib adapter that chains decompression
into the same protocol. The pieces are public, so new binary or textual
formats can be grown from the same parts.
*/

pub mod fasta;
pub mod genome;
mod hic;
pub mod parse;
pub mod utils;

pub use hic::*;

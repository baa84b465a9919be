//! Contact-block decoding and the lazy contact iterator.

use std::io::SeekFrom;
use std::ops::Range;

use smallvec::SmallVec;

use crate::genome::GenomicRange;
use crate::hic::header::count_field;
use crate::hic::{
    ContactRecord, ExpectedValues, FileRegion, HicReadError, ResolutionMetadata,
};
use crate::parse::{inflate_into_accumulator, ByteAccumulator, Cursor};
use crate::utils::file::SeekableRead;

/// Converts a 1-based genomic span to a half-open bin range.
pub(crate) fn bin_span(range: &GenomicRange, bin_size: u32) -> Range<i32> {
    let bin = u64::from(bin_size);
    let start = (range.start / bin) as i32;
    let end = ((range.end + bin - 1) / bin) as i32;
    start..end
}

fn ceil_div(a: i32, b: i32) -> i32 {
    (a + b - 1) / b
}

/// The expected-value data needed to normalize one chromosome pair.
pub(crate) struct NormVector {
    expected: ExpectedValues,
    scale: f64,
}

impl NormVector {
    pub(crate) fn new(vector: &ExpectedValues, chr1: u32, chr2: u32) -> NormVector {
        NormVector {
            scale: vector.scale_factor(chr1) * vector.scale_factor(chr2),
            expected: vector.clone(),
        }
    }

    fn divisor(&self, distance: usize) -> f64 {
        self.expected.value_for_distance(distance) * self.scale
    }
}

fn read_value(
    cursor: &mut Cursor,
    acc: &ByteAccumulator,
    use_float: bool,
) -> Result<f64, HicReadError> {
    Ok(if use_float {
        f64::from(cursor.read_f32(acc)?)
    } else {
        f64::from(cursor.read_i16(acc)?)
    })
}

/// Decodes one inflated contact block, filtering to the requested bin
/// ranges and applying normalization when asked.
pub(crate) fn decode_block(
    acc: &ByteAccumulator,
    x_bins: &Range<i32>,
    y_bins: &Range<i32>,
    norm: Option<&NormVector>,
) -> Result<Vec<ContactRecord>, HicReadError> {
    let mut cursor = Cursor::at(0);
    let n_records = count_field(cursor.read_i32(acc)?, "block records")?;
    let bin_x_offset = cursor.read_i32(acc)?;
    let bin_y_offset = cursor.read_i32(acc)?;
    let use_float = cursor.read_u8(acc)? != 0;
    let representation = cursor.read_u8(acc)?;

    let mut records = Vec::with_capacity(n_records as usize);
    let mut push = |bin_x: i32, bin_y: i32, value: f64| {
        if !x_bins.contains(&bin_x) || !y_bins.contains(&bin_y) {
            return;
        }
        let value = match norm {
            Some(norm) => value / norm.divisor(bin_x.abs_diff(bin_y) as usize),
            None => value,
        };
        records.push(ContactRecord {
            bin_x,
            bin_y,
            value,
        });
    };

    match representation {
        // List of rows: each row carries its records' column deltas.
        1 => {
            let row_count = cursor.read_i16(acc)?;
            if row_count < 0 {
                return Err(HicReadError::InvalidFormat(
                    "Negative row count in contact block".to_owned(),
                ));
            }
            for _ in 0..row_count {
                let row_number = cursor.read_i16(acc)?;
                if row_number < 0 {
                    return Err(HicReadError::InvalidFormat(
                        "Negative row number in contact block".to_owned(),
                    ));
                }
                let record_count = cursor.read_i16(acc)?;
                if record_count < 0 {
                    return Err(HicReadError::InvalidFormat(
                        "Negative record count in contact block".to_owned(),
                    ));
                }
                let bin_y = i32::from(row_number) + bin_y_offset;
                for _ in 0..record_count {
                    let bin_x = i32::from(cursor.read_i16(acc)?) + bin_x_offset;
                    let value = read_value(&mut cursor, acc, use_float)?;
                    push(bin_x, bin_y, value);
                }
            }
        }
        // Dense: every cell of a width-w tile in row-major order. NaN
        // cells mark absent data.
        2 => {
            let n_cells = count_field(cursor.read_i32(acc)?, "dense cells")?;
            let n_cells = i32::try_from(n_cells).map_err(|_| {
                HicReadError::InvalidFormat("Dense block too large".to_owned())
            })?;
            let width = cursor.read_i16(acc)?;
            if width <= 0 {
                return Err(HicReadError::InvalidFormat(
                    "Non-positive dense block width".to_owned(),
                ));
            }
            let width = i32::from(width);
            for k in 0..n_cells {
                let value = read_value(&mut cursor, acc, use_float)?;
                if use_float && value.is_nan() {
                    continue;
                }
                let row = k / width;
                let col = k % width;
                push(row + bin_x_offset, col + bin_y_offset, value);
            }
        }
        other => {
            return Err(HicReadError::InvalidFormat(format!(
                "Invalid block representation: {}",
                other
            )))
        }
    }

    Ok(records)
}

/// Lazily yields the contacts overlapping one query, block by block.
///
/// Blocks are visited in ascending flat block number; within a block,
/// records come out in file order. Each block is fetched with one exact
/// read, inflated into a fresh accumulator, and dropped before the next.
pub struct ContactIterator<'a, R> {
    read: &'a mut R,
    blocks: smallvec::IntoIter<[FileRegion; 4]>,
    records: std::vec::IntoIter<ContactRecord>,
    x_bins: Range<i32>,
    y_bins: Range<i32>,
    norm: Option<NormVector>,
    finished: bool,
}

impl<'a, R: SeekableRead> ContactIterator<'a, R> {
    pub(crate) fn new(
        read: &'a mut R,
        metadata: &ResolutionMetadata,
        x_bins: Range<i32>,
        y_bins: Range<i32>,
        norm: Option<NormVector>,
    ) -> ContactIterator<'a, R> {
        let block = metadata.block_size as i32;
        let columns = metadata.block_column_count as i32;
        let x_blocks = (x_bins.start / block)..ceil_div(x_bins.end, block);
        let y_blocks = (y_bins.start / block)..ceil_div(y_bins.end, block);

        let mut blocks: SmallVec<[FileRegion; 4]> = SmallVec::new();
        for x_block in x_blocks {
            for y_block in y_blocks.clone() {
                let number = x_block * columns + y_block;
                if let Some(region) = metadata.block_index.get(&number) {
                    blocks.push(*region);
                }
            }
        }

        ContactIterator {
            read,
            blocks: blocks.into_iter(),
            records: Vec::new().into_iter(),
            x_bins,
            y_bins,
            norm,
            finished: false,
        }
    }

    fn load_block(&mut self, region: FileRegion) -> Result<Vec<ContactRecord>, HicReadError> {
        self.read.seek(SeekFrom::Start(region.offset))?;
        let mut compressed = vec![0u8; region.length as usize];
        self.read.read_exact(&mut compressed)?;
        let inflated = inflate_into_accumulator(&compressed)?;
        decode_block(&inflated, &self.x_bins, &self.y_bins, self.norm.as_ref())
    }
}

impl<'a, R: SeekableRead> Iterator for ContactIterator<'a, R> {
    type Item = Result<ContactRecord, HicReadError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        loop {
            if let Some(record) = self.records.next() {
                return Some(Ok(record));
            }
            let region = match self.blocks.next() {
                Some(region) => region,
                None => {
                    self.finished = true;
                    return None;
                }
            };
            match self.load_block(region) {
                Ok(records) => self.records = records.into_iter(),
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

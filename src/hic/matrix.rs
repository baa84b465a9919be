//! The matrix-record parser: per-resolution metadata and block indexes.

use std::collections::BTreeMap;

use crate::hic::header::count_field;
use crate::hic::{
    FileRegion, HicReadError, Resolution, ResolutionMetadata, Unit,
};
use crate::parse::{ByteAccumulator, Cursor, ParseStep, PullParser, ReadRequest};

/// Parses one matrix record (looked up in the master index) into its
/// [`ResolutionMetadata`] entries.
///
/// Matrix records are small compared to contact data, so the whole record
/// is demanded in a single exact read and decoded in one pass.
pub(crate) struct MatrixMetadataParser {
    region: FileRegion,
    started: bool,
    cursor: Cursor,
}

impl MatrixMetadataParser {
    pub(crate) fn new(region: FileRegion) -> MatrixMetadataParser {
        MatrixMetadataParser {
            region,
            started: false,
            cursor: Cursor::at(region.offset),
        }
    }
}

impl PullParser for MatrixMetadataParser {
    type Record = Vec<ResolutionMetadata>;
    type Error = HicReadError;

    fn step(
        &mut self,
        acc: &mut ByteAccumulator,
    ) -> Result<ParseStep<Vec<ResolutionMetadata>>, HicReadError> {
        if !self.started {
            self.started = true;
            return Ok(ParseStep::Read(ReadRequest::exact_at(
                self.region.offset,
                self.region.length as usize,
            )));
        }

        let cursor = &mut self.cursor;
        let _chr1 = cursor.read_i32(acc)?;
        let _chr2 = cursor.read_i32(acc)?;
        let n_resolutions = count_field(cursor.read_i32(acc)?, "resolutions")?;

        let mut metadatas = Vec::with_capacity(n_resolutions as usize);
        for _ in 0..n_resolutions {
            let unit = match acc.find(cursor.pos(), 0) {
                Some(nul) => {
                    let s = crate::hic::take_nul_string(cursor, acc, nul)?;
                    Unit::parse(&s).ok_or_else(|| {
                        HicReadError::InvalidFormat(format!("Invalid unit: {}", s))
                    })?
                }
                None => {
                    return Err(HicReadError::InvalidFormat(
                        "Unterminated unit string in matrix record".to_owned(),
                    ))
                }
            };
            let _resolution_index = cursor.read_i32(acc)?;
            let sum_counts = cursor.read_f32(acc)?;
            // Zero in V8 files; present only for layout compatibility.
            let _occupied_cell_count = cursor.read_i32(acc)?;
            let _percent5 = cursor.read_f32(acc)?;
            let _percent95 = cursor.read_f32(acc)?;
            let bin_size = count_field(cursor.read_i32(acc)?, "bin size")?;
            let block_size = count_field(cursor.read_i32(acc)?, "block size")?;
            let block_column_count =
                count_field(cursor.read_i32(acc)?, "block columns")?;
            let block_count = count_field(cursor.read_i32(acc)?, "blocks")?;

            let mut block_index = BTreeMap::new();
            for _ in 0..block_count {
                let number = cursor.read_i32(acc)?;
                let offset = cursor.read_i64(acc)?;
                let offset = u64::try_from(offset).map_err(|_| {
                    HicReadError::InvalidFormat("Negative block offset".to_owned())
                })?;
                let length = count_field(cursor.read_i32(acc)?, "block length")?;
                block_index.insert(number, FileRegion { offset, length });
            }

            metadatas.push(ResolutionMetadata {
                resolution: Resolution {
                    bin_size,
                    unit,
                },
                sum_counts,
                block_size,
                block_column_count,
                block_index,
            });
        }

        Ok(ParseStep::Complete(metadatas))
    }
}

//! The Hi-C reader container.

use std::io;
use std::path::Path;

use crate::genome::GenomicRange;
use crate::hic::contacts::{bin_span, ContactIterator, NormVector};
use crate::hic::expected::ExpectedValuesParser;
use crate::hic::footer::MasterIndexParser;
use crate::hic::header::HeaderParser;
use crate::hic::matrix::MatrixMetadataParser;
use crate::hic::{
    ContactsKind, ExpectedValues, HicHeader, HicReadError, MasterIndex, Resolution,
    ResolutionMetadata,
};
use crate::parse::{handle_sync, parse_sync};
use crate::utils::file::{Reopen, ReopenableFile, SeekableRead};

/// The struct used to read a Hi-C file.
///
/// Sections are parsed on demand, each exactly once, in their file-imposed
/// order: header first, then the master index, then contacts or
/// expected-value vectors. Calling an operation before its prerequisite is
/// a [`HicReadError::State`] error; [`HicReader::open`] runs the first two
/// for you.
pub struct HicReader<R> {
    read: R,
    header: Option<HicHeader>,
    master_index: Option<MasterIndex>,
    expected_values: Option<Vec<ExpectedValues>>,
}

impl<R> HicReader<R> {
    /// Wraps a source without reading anything.
    pub fn new(read: R) -> HicReader<R> {
        HicReader {
            read,
            header: None,
            master_index: None,
            expected_values: None,
        }
    }

    pub fn header(&self) -> Option<&HicHeader> {
        self.header.as_ref()
    }

    pub fn master_index(&self) -> Option<&MasterIndex> {
        self.master_index.as_ref()
    }

    pub fn expected_values(&self) -> Option<&[ExpectedValues]> {
        self.expected_values.as_deref()
    }

    pub fn into_inner(self) -> R {
        self.read
    }
}

impl<R: Reopen> Reopen for HicReader<R> {
    fn reopen(&self) -> io::Result<Self> {
        Ok(HicReader {
            read: self.read.reopen()?,
            header: self.header.clone(),
            master_index: self.master_index.clone(),
            expected_values: self.expected_values.clone(),
        })
    }
}

impl HicReader<ReopenableFile> {
    /// Opens a Hi-C file from a path and reads its header and master index.
    pub fn open_file(path: impl AsRef<Path>) -> Result<Self, HicReadError> {
        HicReader::open(ReopenableFile::open(path)?)
    }
}

impl<R: SeekableRead> HicReader<R> {
    /// Opens a reader over anything `Read + Seek` and reads its header and
    /// master index.
    pub fn open(read: R) -> Result<Self, HicReadError> {
        let mut reader = HicReader::new(read);
        reader.read_header()?;
        reader.read_master_index()?;
        Ok(reader)
    }

    pub fn read_header(&mut self) -> Result<&HicHeader, HicReadError> {
        if self.header.is_none() {
            self.header = Some(handle_sync(HeaderParser::new(), &mut self.read)?);
        }
        Ok(self.header.as_ref().unwrap())
    }

    pub fn read_master_index(&mut self) -> Result<&MasterIndex, HicReadError> {
        if self.master_index.is_none() {
            let footer_position = self
                .header
                .as_ref()
                .ok_or(HicReadError::State(
                    "read_header must run before read_master_index",
                ))?
                .footer_position;
            let (index, region) =
                handle_sync(MasterIndexParser::new(footer_position), &mut self.read)?;
            self.header
                .as_mut()
                .expect("header checked above")
                .expected_vectors_region = Some(region);
            self.master_index = Some(index);
        }
        Ok(self.master_index.as_ref().unwrap())
    }

    /// The per-resolution metadata of the matrix for a chromosome pair
    /// (indices as in the header's genome, `chr1 <= chr2`).
    pub fn matrix_metadata(
        &mut self,
        chr1: u32,
        chr2: u32,
    ) -> Result<Vec<ResolutionMetadata>, HicReadError> {
        let index = self.master_index.as_ref().ok_or(HicReadError::State(
            "read_master_index must run before reading matrices",
        ))?;
        let region = index
            .region(chr1, chr2)
            .ok_or_else(|| HicReadError::UnknownMatrix(MasterIndex::key(chr1, chr2)))?;
        handle_sync(MatrixMetadataParser::new(region), &mut self.read)
    }

    /// Reads (once) and returns the expected-value vectors: the
    /// un-normalized group followed by the normalized one.
    pub fn read_expected_value_vectors(&mut self) -> Result<&[ExpectedValues], HicReadError> {
        if self.expected_values.is_none() {
            let region = self
                .header
                .as_ref()
                .and_then(|h| h.expected_vectors_region)
                .ok_or(HicReadError::State(
                    "read_master_index must run before read_expected_value_vectors",
                ))?;
            let vectors = parse_sync(ExpectedValuesParser::new(region.offset), &mut self.read)
                .collect::<Result<Vec<_>, _>>()?;
            self.expected_values = Some(vectors);
        }
        Ok(self.expected_values.as_deref().unwrap())
    }

    /// Iterates the contacts of `x` against `y` at one resolution.
    ///
    /// Chromosome indices are swapped (together with their ranges) so the
    /// lower index is on the X axis, matching how matrices are stored; the
    /// records of an `(x on A, y on B)` query therefore equal those of
    /// `(x on B, y on A)` up to that axis swap. Expected-value vectors are
    /// read on first use when `kind` needs them.
    pub fn iterate_contacts(
        &mut self,
        x: &GenomicRange,
        y: &GenomicRange,
        resolution: Resolution,
        kind: ContactsKind,
    ) -> Result<ContactIterator<'_, R>, HicReadError> {
        let (x_index, y_index) = {
            let header = self.header.as_ref().ok_or(HicReadError::State(
                "read_header must run before iterate_contacts",
            ))?;
            (
                header.genome.index_of(&x.chromosome)?,
                header.genome.index_of(&y.chromosome)?,
            )
        };
        let (chr1, chr2, x_range, y_range) = if x_index <= y_index {
            (x_index, y_index, x, y)
        } else {
            (y_index, x_index, y, x)
        };

        let metadatas = self.matrix_metadata(chr1, chr2)?;
        let metadata = metadatas
            .into_iter()
            .find(|m| m.resolution == resolution)
            .ok_or(HicReadError::ResolutionNotFound)?;
        if metadata.resolution.bin_size == 0 || metadata.block_size == 0 {
            return Err(HicReadError::InvalidFormat(
                "Zero bin or block size in matrix metadata".to_owned(),
            ));
        }

        let x_bins = bin_span(x_range, metadata.resolution.bin_size);
        let y_bins = bin_span(y_range, metadata.resolution.bin_size);

        let norm = match kind {
            ContactsKind::Observed => None,
            ContactsKind::OverExpected => {
                Some(self.normalization_vector(None, resolution, chr1, chr2)?)
            }
            ContactsKind::Normalized(name) => {
                Some(self.normalization_vector(Some(name), resolution, chr1, chr2)?)
            }
        };

        Ok(ContactIterator::new(
            &mut self.read,
            &metadata,
            x_bins,
            y_bins,
            norm,
        ))
    }

    fn normalization_vector(
        &mut self,
        name: Option<String>,
        resolution: Resolution,
        chr1: u32,
        chr2: u32,
    ) -> Result<NormVector, HicReadError> {
        let vectors = self.read_expected_value_vectors()?;
        let vector = vectors
            .iter()
            .find(|v| {
                v.normalization.as_deref() == name.as_deref() && v.resolution == resolution
            })
            .ok_or(HicReadError::ResolutionNotFound)?;
        Ok(NormVector::new(vector, chr1, chr2))
    }
}

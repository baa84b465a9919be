//! The header parser: preamble, genome, resolutions, fragment sites.

use std::collections::HashMap;

use crate::genome::{Chromosome, IndexedGenome};
use crate::hic::{
    scan_nul, take_nul_string, HicHeader, HicReadError, Resolution, Scan, HIC_MAGIC,
    SUPPORTED_VERSION,
};
use crate::parse::{ByteAccumulator, Cursor, ParseStep, PullParser, ReadRequest};

/// Checks that a count read from the file is non-negative.
pub(crate) fn count_field(value: i32, what: &str) -> Result<u32, HicReadError> {
    u32::try_from(value)
        .map_err(|_| HicReadError::InvalidFormat(format!("Negative count for {}", what)))
}

enum HeaderState {
    Start,
    Preamble,
    GenomeId,
    AttrCount,
    AttrKey,
    AttrValue,
    ChromCount,
    ChromName,
    ChromLength,
    BpResCount,
    BpRes,
    FragResCount,
    FragRes,
    SiteCount,
    Sites,
    Finish,
}

/// Streams the file preamble from offset 0 and completes with a
/// [`HicHeader`]. Fixed-width fields are demanded exactly; strings are
/// scanned for their nul terminator with partial reads.
pub(crate) struct HeaderParser {
    state: HeaderState,
    cursor: Cursor,
    awaiting: Option<u64>,
    remaining: u32,
    pending: Option<String>,
    chrom_at: usize,
    n_sites: u32,
    n_frag_resolutions: u32,
    footer_position: u64,
    genome_id: String,
    attributes: Vec<(String, String)>,
    chromosomes: Vec<Chromosome>,
    resolutions: Vec<Resolution>,
    fragment_sites: HashMap<String, Vec<i32>>,
}

impl HeaderParser {
    pub(crate) fn new() -> HeaderParser {
        HeaderParser {
            state: HeaderState::Start,
            cursor: Cursor::at(0),
            awaiting: None,
            remaining: 0,
            pending: None,
            chrom_at: 0,
            n_sites: 0,
            n_frag_resolutions: 0,
            footer_position: 0,
            genome_id: String::new(),
            attributes: Vec::new(),
            chromosomes: Vec::new(),
            resolutions: Vec::new(),
            fragment_sites: HashMap::new(),
        }
    }

    fn ensure(&self, acc: &ByteAccumulator, n: usize) -> Option<ParseStep<HicHeader>> {
        let available = acc.available_from(self.cursor.pos());
        if available < n {
            Some(ParseStep::Read(ReadRequest::exact(n - available)))
        } else {
            None
        }
    }

    fn scan(&mut self, acc: &ByteAccumulator) -> Result<Scan, HicReadError> {
        Ok(scan_nul(acc, self.cursor.pos(), &mut self.awaiting)?)
    }
}

impl PullParser for HeaderParser {
    type Record = HicHeader;
    type Error = HicReadError;

    fn step(
        &mut self,
        acc: &mut ByteAccumulator,
    ) -> Result<ParseStep<HicHeader>, HicReadError> {
        loop {
            match self.state {
                HeaderState::Start => {
                    self.state = HeaderState::Preamble;
                    return Ok(ParseStep::Read(ReadRequest::exact_at(0, 16)));
                }
                HeaderState::Preamble => {
                    if let Some(step) = self.ensure(acc, 16) {
                        return Ok(step);
                    }
                    if self.cursor.take(acc, 4)? != HIC_MAGIC {
                        return Err(HicReadError::InvalidMagic);
                    }
                    let version = self.cursor.read_i32(acc)?;
                    if version != SUPPORTED_VERSION {
                        return Err(HicReadError::UnsupportedVersion(version));
                    }
                    let footer_position = self.cursor.read_i64(acc)?;
                    self.footer_position = u64::try_from(footer_position).map_err(|_| {
                        HicReadError::InvalidFormat("Negative footer position".to_owned())
                    })?;
                    self.state = HeaderState::GenomeId;
                }
                HeaderState::GenomeId => match self.scan(acc)? {
                    Scan::Need(request) => return Ok(ParseStep::Read(request)),
                    Scan::Found(nul) => {
                        self.genome_id = take_nul_string(&mut self.cursor, acc, nul)?;
                        self.state = HeaderState::AttrCount;
                    }
                },
                HeaderState::AttrCount => {
                    if let Some(step) = self.ensure(acc, 4) {
                        return Ok(step);
                    }
                    self.remaining = count_field(self.cursor.read_i32(acc)?, "attributes")?;
                    self.state = HeaderState::AttrKey;
                }
                HeaderState::AttrKey => {
                    if self.remaining == 0 {
                        self.state = HeaderState::ChromCount;
                        continue;
                    }
                    match self.scan(acc)? {
                        Scan::Need(request) => return Ok(ParseStep::Read(request)),
                        Scan::Found(nul) => {
                            self.pending = Some(take_nul_string(&mut self.cursor, acc, nul)?);
                            self.state = HeaderState::AttrValue;
                        }
                    }
                }
                HeaderState::AttrValue => match self.scan(acc)? {
                    Scan::Need(request) => return Ok(ParseStep::Read(request)),
                    Scan::Found(nul) => {
                        let value = take_nul_string(&mut self.cursor, acc, nul)?;
                        let key = self.pending.take().expect("attribute key pending");
                        self.attributes.push((key, value));
                        self.remaining -= 1;
                        self.state = HeaderState::AttrKey;
                    }
                },
                HeaderState::ChromCount => {
                    if let Some(step) = self.ensure(acc, 4) {
                        return Ok(step);
                    }
                    self.remaining = count_field(self.cursor.read_i32(acc)?, "chromosomes")?;
                    self.state = HeaderState::ChromName;
                }
                HeaderState::ChromName => {
                    if self.remaining == 0 {
                        self.state = HeaderState::BpResCount;
                        continue;
                    }
                    match self.scan(acc)? {
                        Scan::Need(request) => return Ok(ParseStep::Read(request)),
                        Scan::Found(nul) => {
                            self.pending = Some(take_nul_string(&mut self.cursor, acc, nul)?);
                            self.state = HeaderState::ChromLength;
                        }
                    }
                }
                HeaderState::ChromLength => {
                    if let Some(step) = self.ensure(acc, 4) {
                        return Ok(step);
                    }
                    let length = count_field(self.cursor.read_i32(acc)?, "chromosome length")?;
                    let name = self.pending.take().expect("chromosome name pending");
                    self.chromosomes.push(Chromosome { name, length });
                    self.remaining -= 1;
                    self.state = HeaderState::ChromName;
                }
                HeaderState::BpResCount => {
                    if let Some(step) = self.ensure(acc, 4) {
                        return Ok(step);
                    }
                    self.remaining = count_field(self.cursor.read_i32(acc)?, "bp resolutions")?;
                    self.state = HeaderState::BpRes;
                }
                HeaderState::BpRes => {
                    let n = self.remaining as usize;
                    if let Some(step) = self.ensure(acc, 4 * n) {
                        return Ok(step);
                    }
                    for _ in 0..n {
                        let bin_size = count_field(self.cursor.read_i32(acc)?, "bin size")?;
                        self.resolutions.push(Resolution::bp(bin_size));
                    }
                    self.remaining = 0;
                    self.state = HeaderState::FragResCount;
                }
                HeaderState::FragResCount => {
                    if let Some(step) = self.ensure(acc, 4) {
                        return Ok(step);
                    }
                    self.n_frag_resolutions =
                        count_field(self.cursor.read_i32(acc)?, "frag resolutions")?;
                    self.remaining = self.n_frag_resolutions;
                    self.state = HeaderState::FragRes;
                }
                HeaderState::FragRes => {
                    let n = self.remaining as usize;
                    if let Some(step) = self.ensure(acc, 4 * n) {
                        return Ok(step);
                    }
                    for _ in 0..n {
                        let bin_size = count_field(self.cursor.read_i32(acc)?, "bin size")?;
                        self.resolutions.push(Resolution::frag(bin_size));
                    }
                    self.remaining = 0;
                    // Restriction sites follow only when fragment
                    // resolutions are present.
                    self.state = if self.n_frag_resolutions > 0 {
                        HeaderState::SiteCount
                    } else {
                        HeaderState::Finish
                    };
                }
                HeaderState::SiteCount => {
                    if self.chrom_at == self.chromosomes.len() {
                        self.state = HeaderState::Finish;
                        continue;
                    }
                    if let Some(step) = self.ensure(acc, 4) {
                        return Ok(step);
                    }
                    self.n_sites = count_field(self.cursor.read_i32(acc)?, "sites")?;
                    self.state = HeaderState::Sites;
                }
                HeaderState::Sites => {
                    let n = self.n_sites as usize;
                    if let Some(step) = self.ensure(acc, 4 * n) {
                        return Ok(step);
                    }
                    let mut sites = Vec::with_capacity(n);
                    for _ in 0..n {
                        sites.push(self.cursor.read_i32(acc)?);
                    }
                    self.fragment_sites
                        .insert(self.chromosomes[self.chrom_at].name.clone(), sites);
                    self.chrom_at += 1;
                    self.state = HeaderState::SiteCount;
                }
                HeaderState::Finish => {
                    let header = HicHeader {
                        version: SUPPORTED_VERSION,
                        footer_position: self.footer_position,
                        genome_id: std::mem::take(&mut self.genome_id),
                        attributes: std::mem::take(&mut self.attributes),
                        genome: IndexedGenome::new(std::mem::take(&mut self.chromosomes)),
                        resolutions: std::mem::take(&mut self.resolutions),
                        fragment_sites: std::mem::take(&mut self.fragment_sites),
                        expected_vectors_region: None,
                    };
                    return Ok(ParseStep::Complete(header));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor as IoCursor;

    use super::*;
    use crate::parse::handle_sync;

    fn put_i32(buf: &mut Vec<u8>, v: i32) {
        buf.extend_from_slice(&v.to_le_bytes());
    }

    fn put_nul(buf: &mut Vec<u8>, s: &str) {
        buf.extend_from_slice(s.as_bytes());
        buf.push(0);
    }

    fn preamble(buf: &mut Vec<u8>) {
        buf.extend_from_slice(b"HIC\0");
        put_i32(buf, 8);
        buf.extend_from_slice(&0i64.to_le_bytes());
    }

    #[test]
    fn parses_fragment_resolutions_and_sites() {
        let mut f = Vec::new();
        preamble(&mut f);
        put_nul(&mut f, "hg-test");
        put_i32(&mut f, 0); // attributes
        put_i32(&mut f, 2); // chromosomes
        put_nul(&mut f, "chr1");
        put_i32(&mut f, 1000);
        put_nul(&mut f, "chr2");
        put_i32(&mut f, 500);
        put_i32(&mut f, 1);
        put_i32(&mut f, 100); // bp resolution
        put_i32(&mut f, 1);
        put_i32(&mut f, 1); // frag resolution
        put_i32(&mut f, 2); // chr1 sites
        put_i32(&mut f, 10);
        put_i32(&mut f, 20);
        put_i32(&mut f, 1); // chr2 sites
        put_i32(&mut f, 7);

        let header = handle_sync(HeaderParser::new(), IoCursor::new(f)).unwrap();
        assert_eq!(header.genome_id, "hg-test");
        assert_eq!(
            header.resolutions,
            vec![Resolution::bp(100), Resolution::frag(1)]
        );
        assert_eq!(header.fragment_sites["chr1"], vec![10, 20]);
        assert_eq!(header.fragment_sites["chr2"], vec![7]);
        assert_eq!(header.genome.index_of("chr2").unwrap(), 1);
        assert!(header.attributes.is_empty());
    }

    #[test]
    fn sites_are_skipped_without_fragment_resolutions() {
        let mut f = Vec::new();
        preamble(&mut f);
        put_nul(&mut f, "hg-test");
        put_i32(&mut f, 0);
        put_i32(&mut f, 1);
        put_nul(&mut f, "chr1");
        put_i32(&mut f, 1000);
        put_i32(&mut f, 1);
        put_i32(&mut f, 100);
        put_i32(&mut f, 0); // no frag resolutions, no site lists follow

        let header = handle_sync(HeaderParser::new(), IoCursor::new(f)).unwrap();
        assert!(header.fragment_sites.is_empty());
        assert_eq!(header.resolutions, vec![Resolution::bp(100)]);
    }

    #[test]
    fn truncated_header_is_eof() {
        let mut f = Vec::new();
        preamble(&mut f);
        f.extend_from_slice(b"unterminated genome id");
        let result = handle_sync(HeaderParser::new(), IoCursor::new(f));
        assert!(matches!(
            result,
            Err(HicReadError::Parse(crate::parse::ParseError::UnexpectedEof))
        ));
    }
}

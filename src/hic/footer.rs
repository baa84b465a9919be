//! The master-index parser.

use crate::hic::header::count_field;
use crate::hic::{
    scan_nul, take_nul_string, FileRegion, HicReadError, MasterIndex, Scan,
};
use crate::parse::{ByteAccumulator, Cursor, ParseStep, PullParser, ReadRequest};

enum FooterState {
    Start,
    Counts,
    EntryKey,
    EntryRegion,
    Finish,
}

/// Reads the footer at `footer_position`: the declared footer size, the
/// master-index entries, and where the expected-value vectors begin.
///
/// Completes with the index plus the expected-value region. The region
/// length is advisory: the declared footer size covers more than that
/// section.
pub(crate) struct MasterIndexParser {
    footer_position: u64,
    state: FooterState,
    cursor: Cursor,
    awaiting: Option<u64>,
    declared_bytes: u32,
    remaining: u32,
    pending: Option<String>,
    index: MasterIndex,
}

impl MasterIndexParser {
    pub(crate) fn new(footer_position: u64) -> MasterIndexParser {
        MasterIndexParser {
            footer_position,
            state: FooterState::Start,
            cursor: Cursor::at(footer_position),
            awaiting: None,
            declared_bytes: 0,
            remaining: 0,
            pending: None,
            index: MasterIndex::default(),
        }
    }

    fn ensure(
        &self,
        acc: &ByteAccumulator,
        n: usize,
    ) -> Option<ParseStep<(MasterIndex, FileRegion)>> {
        let available = acc.available_from(self.cursor.pos());
        if available < n {
            Some(ParseStep::Read(ReadRequest::exact(n - available)))
        } else {
            None
        }
    }
}

impl PullParser for MasterIndexParser {
    type Record = (MasterIndex, FileRegion);
    type Error = HicReadError;

    fn step(
        &mut self,
        acc: &mut ByteAccumulator,
    ) -> Result<ParseStep<(MasterIndex, FileRegion)>, HicReadError> {
        loop {
            match self.state {
                FooterState::Start => {
                    self.state = FooterState::Counts;
                    return Ok(ParseStep::Read(ReadRequest::exact_at(
                        self.footer_position,
                        8,
                    )));
                }
                FooterState::Counts => {
                    if let Some(step) = self.ensure(acc, 8) {
                        return Ok(step);
                    }
                    self.declared_bytes =
                        count_field(self.cursor.read_i32(acc)?, "footer bytes")?;
                    self.remaining =
                        count_field(self.cursor.read_i32(acc)?, "master index entries")?;
                    self.state = FooterState::EntryKey;
                }
                FooterState::EntryKey => {
                    if self.remaining == 0 {
                        self.state = FooterState::Finish;
                        continue;
                    }
                    match scan_nul(acc, self.cursor.pos(), &mut self.awaiting)? {
                        Scan::Need(request) => return Ok(ParseStep::Read(request)),
                        Scan::Found(nul) => {
                            self.pending = Some(take_nul_string(&mut self.cursor, acc, nul)?);
                            self.state = FooterState::EntryRegion;
                        }
                    }
                }
                FooterState::EntryRegion => {
                    if let Some(step) = self.ensure(acc, 12) {
                        return Ok(step);
                    }
                    let position = self.cursor.read_i64(acc)?;
                    let position = u64::try_from(position).map_err(|_| {
                        HicReadError::InvalidFormat("Negative matrix position".to_owned())
                    })?;
                    let length = count_field(self.cursor.read_i32(acc)?, "matrix size")?;
                    let key = self.pending.take().expect("master index key pending");
                    self.index.insert(
                        key,
                        FileRegion {
                            offset: position,
                            length,
                        },
                    );
                    self.remaining -= 1;
                    self.state = FooterState::EntryKey;
                }
                FooterState::Finish => {
                    let consumed = self.cursor.pos() - self.footer_position;
                    // The declared size counts from after its own field.
                    let advisory =
                        (u64::from(self.declared_bytes) + 4).saturating_sub(consumed);
                    let region = FileRegion {
                        offset: self.cursor.pos(),
                        length: advisory.min(u64::from(u32::MAX)) as u32,
                    };
                    let index = std::mem::take(&mut self.index);
                    return Ok(ParseStep::Complete((index, region)));
                }
            }
        }
    }
}

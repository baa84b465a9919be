//! The expected-value vector parser.

use std::collections::HashMap;

use crate::hic::header::count_field;
use crate::hic::{
    scan_nul, take_nul_string, ExpectedValues, HicReadError, Resolution, Scan, Unit,
};
use crate::parse::{ByteAccumulator, Cursor, ParseStep, PullParser, ReadRequest};

/// Which of the two consecutive vector groups is being read.
#[derive(Copy, Clone, PartialEq, Eq)]
enum Phase {
    Raw,
    Normalized,
}

enum EvState {
    Start,
    SectionCount,
    VectorStart,
    Name,
    Unit,
    Head,
    Values,
    ScaleCount,
    Scale,
    CollapseNext,
    Finish,
}

/// Streams the expected-value section: first the un-normalized vector
/// group, then the normalized one (whose vectors carry a normalization
/// name). Each vector is emitted as its own record and the buffer is
/// collapsed behind it, since value arrays can run to megabytes.
///
/// The region length recorded with the master index is advisory; this
/// parser reads until both groups are consumed.
pub(crate) struct ExpectedValuesParser {
    region_offset: u64,
    state: EvState,
    phase: Phase,
    cursor: Cursor,
    awaiting: Option<u64>,
    remaining: u32,
    normalization: Option<String>,
    unit: Option<Unit>,
    bin_size: u32,
    n_values: u32,
    values: Vec<f64>,
    n_scale_factors: u32,
}

impl ExpectedValuesParser {
    pub(crate) fn new(region_offset: u64) -> ExpectedValuesParser {
        ExpectedValuesParser {
            region_offset,
            state: EvState::Start,
            phase: Phase::Raw,
            cursor: Cursor::at(region_offset),
            awaiting: None,
            remaining: 0,
            normalization: None,
            unit: None,
            bin_size: 0,
            n_values: 0,
            values: Vec::new(),
            n_scale_factors: 0,
        }
    }

    fn ensure(&self, acc: &ByteAccumulator, n: usize) -> Option<ParseStep<ExpectedValues>> {
        let available = acc.available_from(self.cursor.pos());
        if available < n {
            Some(ParseStep::Read(ReadRequest::exact(n - available)))
        } else {
            None
        }
    }
}

impl PullParser for ExpectedValuesParser {
    type Record = ExpectedValues;
    type Error = HicReadError;

    fn step(
        &mut self,
        acc: &mut ByteAccumulator,
    ) -> Result<ParseStep<ExpectedValues>, HicReadError> {
        loop {
            match self.state {
                EvState::Start => {
                    self.state = EvState::SectionCount;
                    return Ok(ParseStep::Read(ReadRequest::exact_at(
                        self.region_offset,
                        4,
                    )));
                }
                EvState::SectionCount => {
                    if let Some(step) = self.ensure(acc, 4) {
                        return Ok(step);
                    }
                    self.remaining =
                        count_field(self.cursor.read_i32(acc)?, "expected-value vectors")?;
                    self.state = EvState::VectorStart;
                }
                EvState::VectorStart => {
                    if self.remaining == 0 {
                        match self.phase {
                            Phase::Raw => {
                                self.phase = Phase::Normalized;
                                self.state = EvState::SectionCount;
                            }
                            Phase::Normalized => self.state = EvState::Finish,
                        }
                        continue;
                    }
                    self.normalization = None;
                    self.state = match self.phase {
                        Phase::Raw => EvState::Unit,
                        Phase::Normalized => EvState::Name,
                    };
                }
                EvState::Name => {
                    match scan_nul(acc, self.cursor.pos(), &mut self.awaiting)? {
                        Scan::Need(request) => return Ok(ParseStep::Read(request)),
                        Scan::Found(nul) => {
                            self.normalization =
                                Some(take_nul_string(&mut self.cursor, acc, nul)?);
                            self.state = EvState::Unit;
                        }
                    }
                }
                EvState::Unit => {
                    match scan_nul(acc, self.cursor.pos(), &mut self.awaiting)? {
                        Scan::Need(request) => return Ok(ParseStep::Read(request)),
                        Scan::Found(nul) => {
                            let s = take_nul_string(&mut self.cursor, acc, nul)?;
                            self.unit = Some(Unit::parse(&s).ok_or_else(|| {
                                HicReadError::InvalidFormat(format!("Invalid unit: {}", s))
                            })?);
                            self.state = EvState::Head;
                        }
                    }
                }
                EvState::Head => {
                    if let Some(step) = self.ensure(acc, 8) {
                        return Ok(step);
                    }
                    self.bin_size = count_field(self.cursor.read_i32(acc)?, "bin size")?;
                    self.n_values = count_field(self.cursor.read_i32(acc)?, "expected values")?;
                    self.state = EvState::Values;
                }
                EvState::Values => {
                    let n = self.n_values as usize;
                    if let Some(step) = self.ensure(acc, 8 * n) {
                        return Ok(step);
                    }
                    self.values.reserve(n);
                    for _ in 0..n {
                        self.values.push(self.cursor.read_f64(acc)?);
                    }
                    self.state = EvState::ScaleCount;
                }
                EvState::ScaleCount => {
                    if let Some(step) = self.ensure(acc, 4) {
                        return Ok(step);
                    }
                    self.n_scale_factors =
                        count_field(self.cursor.read_i32(acc)?, "scale factors")?;
                    self.state = EvState::Scale;
                }
                EvState::Scale => {
                    let n = self.n_scale_factors as usize;
                    if let Some(step) = self.ensure(acc, 12 * n) {
                        return Ok(step);
                    }
                    let mut scale_factors = HashMap::with_capacity(n);
                    for _ in 0..n {
                        let chromosome =
                            count_field(self.cursor.read_i32(acc)?, "chromosome index")?;
                        let factor = self.cursor.read_f64(acc)?;
                        scale_factors.insert(chromosome, factor);
                    }
                    let vector = ExpectedValues {
                        normalization: self.normalization.take(),
                        resolution: Resolution {
                            bin_size: self.bin_size,
                            unit: self.unit.take().expect("unit read before values"),
                        },
                        values: std::mem::take(&mut self.values),
                        scale_factors,
                    };
                    self.remaining -= 1;
                    self.state = EvState::CollapseNext;
                    return Ok(ParseStep::Record(vector));
                }
                EvState::CollapseNext => {
                    self.state = EvState::VectorStart;
                    return Ok(ParseStep::Collapse {
                        keep_from: Some(self.cursor.pos()),
                    });
                }
                EvState::Finish => return Ok(ParseStep::Stop),
            }
        }
    }
}

//! Tracks which segment sequence numbers of a flow have been received.
//!
//! Everything below `base` was received. Above it, the received numbers are described by a list
//! of contigs, each a run of missing numbers followed by a run of received numbers. The list is
//! bounded, a sequence that would need more contigs than available is refused without modifying
//! the state.
use core::fmt;

/// A contiguous run of missing numbers, followed by a contiguous run of received numbers.
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq)]
pub struct Contig {
    hole_size: u64,
    data_size: u64,
}

/// A bounded set of received sequence numbers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Assembler {
    base: u64,
    contigs: Vec<Contig>,
    max_contigs: usize,
}

/// The assembler had no room for another hole.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Full;

impl Contig {
    fn hole_and_data(hole_size: u64, data_size: u64) -> Contig {
        Contig { hole_size, data_size }
    }

    fn total_size(&self) -> u64 {
        self.hole_size.saturating_add(self.data_size)
    }
}

impl Assembler {
    /// Create an assembler where nothing was received, tracking at most `max_contigs` holes.
    pub fn new(max_contigs: usize) -> Self {
        Assembler {
            base: 0,
            contigs: Vec::with_capacity(max_contigs),
            max_contigs,
        }
    }

    /// The first sequence number that has not been received.
    pub fn base(&self) -> u64 {
        self.base
    }

    /// Check if a sequence number has been received.
    pub fn contains(&self, seq: u64) -> bool {
        if seq < self.base {
            return true;
        }

        let mut offset = self.base;
        for contig in &self.contigs {
            let data_start = offset.saturating_add(contig.hole_size);
            let data_end = data_start.saturating_add(contig.data_size);
            if seq < data_start {
                return false;
            }
            if seq < data_end {
                return true;
            }
            offset = data_end;
        }

        false
    }

    /// Record a sequence number.
    ///
    /// Returns `Ok(true)` if the number was new, `Ok(false)` for a duplicate. When recording would
    /// require another contig than available the assembler is unchanged and `Err(Full)` is
    /// returned.
    pub fn add(&mut self, seq: u64) -> Result<bool, Full> {
        if seq < self.base {
            return Ok(false);
        }

        let mut offset = self.base;
        for idx in 0..self.contigs.len() {
            let contig = self.contigs[idx];
            let hole_end = offset.saturating_add(contig.hole_size);

            if seq < hole_end {
                if contig.hole_size == 1 {
                    // The hole is closed, the data joins the preceding run.
                    self.contigs.remove(idx);
                    self.extend_before(idx, 1 + contig.data_size);
                } else if seq + 1 == hole_end {
                    let contig = &mut self.contigs[idx];
                    contig.hole_size -= 1;
                    contig.data_size += 1;
                } else if seq == offset {
                    self.contigs[idx].hole_size -= 1;
                    self.extend_before(idx, 1);
                } else {
                    if self.contigs.len() == self.max_contigs {
                        return Err(Full);
                    }
                    let front = seq - offset;
                    self.contigs[idx].hole_size -= front + 1;
                    self.contigs.insert(idx, Contig::hole_and_data(front, 1));
                }
                return Ok(true);
            }

            if seq < hole_end.saturating_add(contig.data_size) {
                return Ok(false);
            }

            offset = offset.saturating_add(contig.total_size());
        }

        if seq == offset {
            let len = self.contigs.len();
            self.extend_before(len, 1);
        } else {
            if self.contigs.len() == self.max_contigs {
                return Err(Full);
            }
            self.contigs.push(Contig::hole_and_data(seq - offset, 1));
        }

        Ok(true)
    }

    /// Grow the received run preceding the contig at `idx`.
    fn extend_before(&mut self, idx: usize, by: u64) {
        match idx.checked_sub(1) {
            None => self.base = self.base.saturating_add(by),
            Some(prev) => {
                let contig = &mut self.contigs[prev];
                contig.data_size = contig.data_size.saturating_add(by);
            },
        }
    }
}

impl fmt::Display for Contig {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.hole_size != 0 { write!(f, "({})", self.hole_size)?; }
        if self.hole_size != 0 && self.data_size != 0 { write!(f, " ")?; }
        if self.data_size != 0 { write!(f, "{}", self.data_size)?; }
        Ok(())
    }
}

impl fmt::Display for Assembler {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} [ ", self.base)?;
        for contig in self.contigs.iter() {
            write!(f, "{} ", contig)?;
        }
        write!(f, "]")
    }
}

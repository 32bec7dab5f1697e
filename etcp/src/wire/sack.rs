use byteorder::{ByteOrder, NetworkEndian};

use super::{Error, Result};
use super::timing::{timing_block, Timing, TIMING_LEN};

byte_wrapper! {
    /// The header of ACK and DEN messages, followed by its SACK fields.
    pub struct sack_header([u8]);
}

byte_wrapper! {
    /// One selectively acknowledged run of segments.
    pub struct sack_field([u8]);
}

mod field {
    #![allow(non_snake_case)]
    use crate::wire::field::Field;

    pub(crate) const BASE_SEQ: Field = 0..8;
    pub(crate) const COUNT: usize = 8;
    pub(crate) const RESERVED: Field = 9..12;
    pub(crate) const RX_WINDOW: Field = 12..16;

    pub(crate) fn FIELD(idx: usize) -> Field {
        let start = RX_WINDOW.end + idx*super::SACK_FIELD_LEN;
        start..start + super::SACK_FIELD_LEN
    }

    pub(crate) const OFFSET: Field = 0..4;
    pub(crate) const RUN: Field = 4..8;
    pub(crate) const TIMING: Field = 8..40;
}

/// The length of the SACK header, without its fields.
pub const SACK_HEADER_LEN: usize = field::RX_WINDOW.end;

/// The length of a single SACK field.
pub const SACK_FIELD_LEN: usize = 8 + TIMING_LEN;

/// The largest number of SACK fields in one message.
///
/// Keeps the largest acknowledgement within a standard link MTU.
pub const MAX_SACK_FIELDS: usize = 12;

impl sack_header {
    pub fn new_unchecked(data: &[u8]) -> &Self {
        Self::__from_macro_new_unchecked(data)
    }

    pub fn new_unchecked_mut(data: &mut [u8]) -> &mut Self {
        Self::__from_macro_new_unchecked_mut(data)
    }

    pub fn new_checked(data: &[u8]) -> Result<&Self> {
        Self::new_unchecked(data).check_len()?;
        Ok(Self::new_unchecked(data))
    }

    pub fn new_checked_mut(data: &mut [u8]) -> Result<&mut Self> {
        Self::new_checked(&data[..])?;
        Ok(Self::new_unchecked_mut(data))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Ensure that no accessor method will panic if called.
    ///
    /// Returns `Err(Error::Truncated)` if the buffer is too short for the header or its fields.
    /// Returns `Err(Error::Malformed)` if the count exceeds the maximum number of fields.
    ///
    /// The result of this check is invalidated by calling [set_count].
    ///
    /// [set_count]: #method.set_count
    pub fn check_len(&self) -> Result<()> {
        if self.0.len() < SACK_HEADER_LEN {
            return Err(Error::Truncated);
        }

        let count = usize::from(self.count());
        if count > MAX_SACK_FIELDS {
            return Err(Error::Malformed);
        }

        if count > 0 && self.0.len() < field::FIELD(count - 1).end {
            return Err(Error::Truncated);
        }

        Ok(())
    }

    /// Return the sequence number that field offsets are relative to.
    #[inline]
    pub fn base_seq(&self) -> u64 {
        NetworkEndian::read_u64(&self.0[field::BASE_SEQ])
    }

    /// Return the number of SACK fields.
    #[inline]
    pub fn count(&self) -> u8 {
        self.0[field::COUNT]
    }

    /// Return the number of segments the receiver can still buffer.
    #[inline]
    pub fn rx_window(&self) -> u32 {
        NetworkEndian::read_u32(&self.0[field::RX_WINDOW])
    }

    #[inline]
    pub fn set_base_seq(&mut self, value: u64) {
        NetworkEndian::write_u64(&mut self.0[field::BASE_SEQ], value)
    }

    #[inline]
    pub fn set_count(&mut self, value: u8) {
        self.0[field::COUNT] = value;
        // Reserved bits are always sent as zero.
        self.0[field::RESERVED].iter_mut().for_each(|b| *b = 0);
    }

    #[inline]
    pub fn set_rx_window(&mut self, value: u32) {
        NetworkEndian::write_u32(&mut self.0[field::RX_WINDOW], value)
    }

    /// Access a SACK field.
    ///
    /// # Panics
    /// This function panics if the field is out of bounds of the buffer.
    pub fn field(&self, idx: usize) -> &sack_field {
        sack_field::__from_macro_new_unchecked(&self.0[field::FIELD(idx)])
    }

    pub fn field_mut(&mut self, idx: usize) -> &mut sack_field {
        sack_field::__from_macro_new_unchecked_mut(&mut self.0[field::FIELD(idx)])
    }
}

impl sack_field {
    /// Return the offset of the first acknowledged segment from the base sequence number.
    #[inline]
    pub fn offset(&self) -> u32 {
        NetworkEndian::read_u32(&self.0[field::OFFSET])
    }

    /// Return the number of consecutive acknowledged segments.
    #[inline]
    pub fn run(&self) -> u32 {
        NetworkEndian::read_u32(&self.0[field::RUN])
    }

    pub fn timing(&self) -> &timing_block {
        timing_block::new_unchecked(&self.0[field::TIMING])
    }

    #[inline]
    pub fn set_offset(&mut self, value: u32) {
        NetworkEndian::write_u32(&mut self.0[field::OFFSET], value)
    }

    #[inline]
    pub fn set_run(&mut self, value: u32) {
        NetworkEndian::write_u32(&mut self.0[field::RUN], value)
    }

    pub fn timing_mut(&mut self) -> &mut timing_block {
        timing_block::new_unchecked_mut(&mut self.0[field::TIMING])
    }
}

/// A high-level representation of a SACK field.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Field {
    pub offset: u32,
    pub count: u32,
    /// The timestamps of the first segment of the run.
    pub timing: Timing,
}

/// A high-level representation of a SACK header with its fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Repr {
    pub base_seq: u64,
    pub rx_window: u32,
    count: u8,
    fields: [Field; MAX_SACK_FIELDS],
}

impl Repr {
    /// Create an acknowledgement without any fields.
    pub fn new(base_seq: u64, rx_window: u32) -> Self {
        Repr {
            base_seq,
            rx_window,
            count: 0,
            fields: [Field::default(); MAX_SACK_FIELDS],
        }
    }

    /// Append a field, handing it back if all fields are in use.
    pub fn push(&mut self, field: Field) -> core::result::Result<(), Field> {
        match self.fields.get_mut(usize::from(self.count)) {
            Some(slot) => {
                *slot = field;
                self.count += 1;
                Ok(())
            },
            None => Err(field),
        }
    }

    /// The fields in use.
    pub fn fields(&self) -> &[Field] {
        &self.fields[..usize::from(self.count)]
    }

    pub fn is_full(&self) -> bool {
        usize::from(self.count) == MAX_SACK_FIELDS
    }

    /// Parse a SACK header with all of its fields.
    pub fn parse(header: &sack_header) -> Result<Repr> {
        header.check_len()?;

        let mut repr = Repr::new(header.base_seq(), header.rx_window());
        for idx in 0..usize::from(header.count()) {
            let raw = header.field(idx);
            let field = Field {
                offset: raw.offset(),
                count: raw.run(),
                timing: Timing::parse(raw.timing()),
            };

            if field.count == 0 {
                return Err(Error::Malformed);
            }

            repr.push(field).map_err(|_| Error::Malformed)?;
        }

        Ok(repr)
    }

    /// Return the length of the header and its fields.
    pub fn buffer_len(&self) -> usize {
        SACK_HEADER_LEN + usize::from(self.count)*SACK_FIELD_LEN
    }

    /// Emit a high-level representation into a SACK header and its fields.
    ///
    /// # Panics
    /// This function panics if the buffer is shorter than `buffer_len()`.
    pub fn emit(&self, header: &mut sack_header) {
        header.set_base_seq(self.base_seq);
        header.set_count(self.count);
        header.set_rx_window(self.rx_window);
        for (idx, field) in self.fields().iter().enumerate() {
            let raw = header.field_mut(idx);
            raw.set_offset(field.offset);
            raw.set_run(field.count);
            field.timing.emit(raw.timing_mut());
        }
    }
}

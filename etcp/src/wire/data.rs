use byteorder::{ByteOrder, NetworkEndian};

use super::{Error, Result};

byte_wrapper! {
    /// The header of CON, DAT and FIN messages, followed by the segment payload.
    pub struct data_header([u8]);
}

mod field {
    #![allow(non_snake_case)]
    use crate::wire::field::Field;

    pub(crate) const SEQ: Field = 0..8;
    pub(crate) const LEN: Field = 8..12;
    pub(crate) const ATTEMPTS: Field = 12..16;

    pub(crate) fn PAYLOAD(length: u32) -> Field {
        ATTEMPTS.end..ATTEMPTS.end + length as usize
    }
}

/// The length of the data header.
pub const DATA_HEADER_LEN: usize = field::ATTEMPTS.end;

impl data_header {
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
    /// Returns `Err(Error::Truncated)` if the buffer is too short for the header or for the
    /// payload length it announces. Trailing bytes after the payload are permitted, links may pad
    /// short frames.
    ///
    /// The result of this check is invalidated by calling [set_len].
    ///
    /// [set_len]: #method.set_len
    pub fn check_len(&self) -> Result<()> {
        if self.0.len() < DATA_HEADER_LEN {
            return Err(Error::Truncated);
        }

        if self.0.len() < field::PAYLOAD(self.len()).end {
            return Err(Error::Truncated);
        }

        Ok(())
    }

    /// Return the sequence number of the segment.
    #[inline]
    pub fn seq(&self) -> u64 {
        NetworkEndian::read_u64(&self.0[field::SEQ])
    }

    /// Return the payload length.
    #[inline]
    pub fn len(&self) -> u32 {
        NetworkEndian::read_u32(&self.0[field::LEN])
    }

    /// Return how often this segment was transmitted, including this transmission.
    #[inline]
    pub fn attempts(&self) -> u32 {
        NetworkEndian::read_u32(&self.0[field::ATTEMPTS])
    }

    #[inline]
    pub fn set_seq(&mut self, value: u64) {
        NetworkEndian::write_u64(&mut self.0[field::SEQ], value)
    }

    #[inline]
    pub fn set_len(&mut self, value: u32) {
        NetworkEndian::write_u32(&mut self.0[field::LEN], value)
    }

    #[inline]
    pub fn set_attempts(&mut self, value: u32) {
        NetworkEndian::write_u32(&mut self.0[field::ATTEMPTS], value)
    }

    pub fn payload_slice(&self) -> &[u8] {
        &self.0[field::PAYLOAD(self.len())]
    }

    pub fn payload_mut_slice(&mut self) -> &mut [u8] {
        let len = self.len();
        &mut self.0[field::PAYLOAD(len)]
    }
}

/// A high-level representation of a data header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Repr {
    pub seq: u64,
    pub len: u32,
    pub attempts: u32,
}

impl Repr {
    /// Parse a data header and return a high-level representation.
    pub fn parse(header: &data_header) -> Result<Repr> {
        header.check_len()?;
        Ok(Repr {
            seq: header.seq(),
            len: header.len(),
            attempts: header.attempts(),
        })
    }

    /// Return the length of the header, without the payload.
    pub fn buffer_len(&self) -> usize {
        DATA_HEADER_LEN
    }

    /// Emit a high-level representation into a data header.
    pub fn emit(&self, header: &mut data_header) {
        header.set_seq(self.seq);
        header.set_len(self.len);
        header.set_attempts(self.attempts);
    }
}

use byteorder::{ByteOrder, NetworkEndian};

use super::{Error, Result};
use super::timing::{timing_block, Timing};

enum_with_unknown! {
    /// The type of an ETCP message, the low 24 bits of the full type.
    pub enum MessageType(u32) {
        Error = 0,
        Con = 1,
        Fin = 2,
        Dat = 3,
        Ack = 4,
        Den = 5,
    }
}

byte_wrapper! {
    /// A byte sequence representing an ETCP message header.
    pub struct etcp_header([u8]);
}

mod field {
    use crate::wire::field::{Field, Rest};

    pub(crate) const FULLTYPE: Field = 0..8;
    pub(crate) const SRC_PORT: Field = 8..12;
    pub(crate) const DST_PORT: Field = 12..16;
    pub(crate) const TIMING: Field = 16..48;
    pub(crate) const PAYLOAD: Rest = TIMING.end..;
}

/// The magic number in the upper 32 bits of every full type, ASCII `ETCP`.
pub const MAGIC: u32 = 0x4554_4350;

/// The implemented protocol version.
pub const VERSION: u8 = 1;

/// The length of the message header.
pub const HEADER_LEN: usize = field::PAYLOAD.start;

/// Combine magic, version and message type into the full type.
///
/// Comparing the full type of a frame against this value checks all three parts at once.
pub fn fulltype(kind: MessageType) -> u64 {
    u64::from(MAGIC) << 32 | u64::from(VERSION) << 24 | u64::from(u32::from(kind) & 0xff_ffff)
}

impl etcp_header {
    /// Imbue a raw octet buffer with the header structure.
    pub fn new_unchecked(data: &[u8]) -> &Self {
        Self::__from_macro_new_unchecked(data)
    }

    /// Imbue a mutable octet buffer with the header structure.
    pub fn new_unchecked_mut(data: &mut [u8]) -> &mut Self {
        Self::__from_macro_new_unchecked_mut(data)
    }

    /// Shorthand for a combination of [new_unchecked] and [check_len].
    ///
    /// [new_unchecked]: #method.new_unchecked
    /// [check_len]: #method.check_len
    pub fn new_checked(data: &[u8]) -> Result<&Self> {
        let header = Self::new_unchecked(data);
        header.check_len()?;
        Ok(header)
    }

    /// Mutable version of [`new_checked`](#method.new_checked).
    pub fn new_checked_mut(data: &mut [u8]) -> Result<&mut Self> {
        Self::new_checked(&data[..])?;
        Ok(Self::new_unchecked_mut(data))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Ensure that no accessor method will panic if called.
    ///
    /// Returns `Err(Error::Truncated)` if the buffer is shorter than a header.
    pub fn check_len(&self) -> Result<()> {
        if self.0.len() < HEADER_LEN {
            Err(Error::Truncated)
        } else {
            Ok(())
        }
    }

    /// Return the combined magic, version and type field.
    #[inline]
    pub fn fulltype(&self) -> u64 {
        NetworkEndian::read_u64(&self.0[field::FULLTYPE])
    }

    #[inline]
    pub fn magic(&self) -> u32 {
        (self.fulltype() >> 32) as u32
    }

    #[inline]
    pub fn version(&self) -> u8 {
        (self.fulltype() >> 24) as u8
    }

    #[inline]
    pub fn msg_type(&self) -> MessageType {
        MessageType::from((self.fulltype() & 0xff_ffff) as u32)
    }

    #[inline]
    pub fn src_port(&self) -> u32 {
        NetworkEndian::read_u32(&self.0[field::SRC_PORT])
    }

    #[inline]
    pub fn dst_port(&self) -> u32 {
        NetworkEndian::read_u32(&self.0[field::DST_PORT])
    }

    pub fn timing(&self) -> &timing_block {
        timing_block::new_unchecked(&self.0[field::TIMING])
    }

    pub fn timing_mut(&mut self) -> &mut timing_block {
        timing_block::new_unchecked_mut(&mut self.0[field::TIMING])
    }

    #[inline]
    pub fn set_fulltype(&mut self, value: u64) {
        NetworkEndian::write_u64(&mut self.0[field::FULLTYPE], value)
    }

    #[inline]
    pub fn set_src_port(&mut self, value: u32) {
        NetworkEndian::write_u32(&mut self.0[field::SRC_PORT], value)
    }

    #[inline]
    pub fn set_dst_port(&mut self, value: u32) {
        NetworkEndian::write_u32(&mut self.0[field::DST_PORT], value)
    }

    /// The bytes following the header, a data or SACK header.
    pub fn payload_slice(&self) -> &[u8] {
        &self.0[field::PAYLOAD]
    }

    pub fn payload_mut_slice(&mut self) -> &mut [u8] {
        &mut self.0[field::PAYLOAD]
    }
}

/// A high-level representation of an ETCP message header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Repr {
    pub kind: MessageType,
    pub src_port: u32,
    pub dst_port: u32,
    pub timing: Timing,
}

impl Repr {
    /// Parse a message header and return a high-level representation.
    ///
    /// Frames of other protocols sharing the link are `Unrecognized`.
    pub fn parse(header: &etcp_header) -> Result<Repr> {
        header.check_len()?;

        if header.magic() != MAGIC {
            return Err(Error::Unrecognized);
        }

        if header.version() != VERSION {
            return Err(Error::Unsupported);
        }

        let kind = match header.msg_type() {
            MessageType::Unknown(_) => return Err(Error::Unrecognized),
            kind => kind,
        };

        Ok(Repr {
            kind,
            src_port: header.src_port(),
            dst_port: header.dst_port(),
            timing: Timing::parse(header.timing()),
        })
    }

    /// Return the length of the header that will be emitted from this high-level representation.
    pub fn buffer_len(&self) -> usize {
        HEADER_LEN
    }

    /// Emit a high-level representation into a message header.
    pub fn emit(&self, header: &mut etcp_header) {
        header.set_fulltype(fulltype(self.kind));
        header.set_src_port(self.src_port);
        header.set_dst_port(self.dst_port);
        self.timing.emit(header.timing_mut());
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::time::Instant;

    static HEADER_BYTES: [u8; 48] =
        [0x45, 0x54, 0x43, 0x50, 0x01, 0x00, 0x00, 0x03,
         0x00, 0x00, 0x07, 0xd0, 0x00, 0x00, 0x03, 0xe8,
         0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01,
         0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x02,
         0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x03,
         0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x04];

    fn header_repr() -> Repr {
        Repr {
            kind: MessageType::Dat,
            src_port: 2000,
            dst_port: 1000,
            timing: Timing {
                sw_tx: Instant::from_nanos(1u64),
                hw_tx: Instant::from_nanos(2u64),
                hw_rx: Instant::from_nanos(3u64),
                sw_rx: Instant::from_nanos(4u64),
            },
        }
    }

    #[test]
    fn header_size() {
        assert_eq!(HEADER_LEN, 48);
        assert_eq!(header_repr().buffer_len(), 48);
    }

    #[test]
    fn deconstruct() {
        let header = etcp_header::new_checked(&HEADER_BYTES[..]).unwrap();
        assert_eq!(header.fulltype(), 0x4554_4350_0100_0003);
        assert_eq!(header.magic(), MAGIC);
        assert_eq!(header.version(), VERSION);
        assert_eq!(header.msg_type(), MessageType::Dat);
        assert_eq!(header.src_port(), 2000);
        assert_eq!(header.dst_port(), 1000);
        assert_eq!(header.timing().hw_rx(), 3);
        assert_eq!(Repr::parse(header), Ok(header_repr()));
    }

    #[test]
    fn construct() {
        let mut bytes = vec![0xa5; 48];
        header_repr().emit(etcp_header::new_unchecked_mut(&mut bytes));
        assert_eq!(&bytes[..], &HEADER_BYTES[..]);
    }

    #[test]
    fn fulltype_dispatch() {
        assert_eq!(fulltype(MessageType::Error), 0x4554_4350_0100_0000);
        assert_eq!(fulltype(MessageType::Den), 0x4554_4350_0100_0005);
    }

    #[test]
    fn rejects_foreign_frames() {
        assert_eq!(etcp_header::new_checked(&HEADER_BYTES[..47]).err(), Some(Error::Truncated));

        let mut bytes = HEADER_BYTES;
        bytes[0] = b'X';
        assert_eq!(Repr::parse(etcp_header::new_unchecked(&bytes)), Err(Error::Unrecognized));

        let mut bytes = HEADER_BYTES;
        bytes[4] = 2;
        assert_eq!(Repr::parse(etcp_header::new_unchecked(&bytes)), Err(Error::Unsupported));

        let mut bytes = HEADER_BYTES;
        bytes[7] = 9;
        assert_eq!(Repr::parse(etcp_header::new_unchecked(&bytes)), Err(Error::Unrecognized));
    }
}

use byteorder::{ByteOrder, NetworkEndian};

use crate::time::Instant;

byte_wrapper! {
    /// The four timestamps carried by headers and SACK fields.
    pub struct timing_block([u8]);
}

mod field {
    use crate::wire::field::Field;

    pub(crate) const SW_TX: Field = 0..8;
    pub(crate) const HW_TX: Field = 8..16;
    pub(crate) const HW_RX: Field = 16..24;
    pub(crate) const SW_RX: Field = 24..32;
}

/// The length of a timing block.
pub const TIMING_LEN: usize = field::SW_RX.end;

/// Timestamps of one frame on its way between two hosts.
///
/// Unset stamps are transmitted as zero. Stamps of different clocks are not comparable, see the
/// [time module](../time/index.html).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Timing {
    /// Software clock when the sender handed the frame to its link.
    pub sw_tx: Instant,
    /// Hardware clock when the frame left the sender's link.
    pub hw_tx: Instant,
    /// Hardware clock when the frame arrived on the receiver's link.
    pub hw_rx: Instant,
    /// Software clock when the receiver took the frame from its link.
    pub sw_rx: Instant,
}

impl timing_block {
    /// Imbue a raw octet buffer with the timing block structure.
    ///
    /// # Panics
    /// This function panics if the buffer is shorter than a timing block.
    pub fn new_unchecked(data: &[u8]) -> &Self {
        Self::__from_macro_new_unchecked(&data[..TIMING_LEN])
    }

    /// Mutable version of [`new_unchecked`](#method.new_unchecked).
    pub fn new_unchecked_mut(data: &mut [u8]) -> &mut Self {
        Self::__from_macro_new_unchecked_mut(&mut data[..TIMING_LEN])
    }

    #[inline]
    pub fn sw_tx(&self) -> u64 {
        NetworkEndian::read_u64(&self.0[field::SW_TX])
    }

    #[inline]
    pub fn hw_tx(&self) -> u64 {
        NetworkEndian::read_u64(&self.0[field::HW_TX])
    }

    #[inline]
    pub fn hw_rx(&self) -> u64 {
        NetworkEndian::read_u64(&self.0[field::HW_RX])
    }

    #[inline]
    pub fn sw_rx(&self) -> u64 {
        NetworkEndian::read_u64(&self.0[field::SW_RX])
    }

    #[inline]
    pub fn set_sw_tx(&mut self, value: u64) {
        NetworkEndian::write_u64(&mut self.0[field::SW_TX], value)
    }

    #[inline]
    pub fn set_hw_tx(&mut self, value: u64) {
        NetworkEndian::write_u64(&mut self.0[field::HW_TX], value)
    }

    #[inline]
    pub fn set_hw_rx(&mut self, value: u64) {
        NetworkEndian::write_u64(&mut self.0[field::HW_RX], value)
    }

    #[inline]
    pub fn set_sw_rx(&mut self, value: u64) {
        NetworkEndian::write_u64(&mut self.0[field::SW_RX], value)
    }
}

impl Timing {
    /// Read all four stamps.
    pub fn parse(block: &timing_block) -> Self {
        Timing {
            sw_tx: Instant::from_nanos(block.sw_tx()),
            hw_tx: Instant::from_nanos(block.hw_tx()),
            hw_rx: Instant::from_nanos(block.hw_rx()),
            sw_rx: Instant::from_nanos(block.sw_rx()),
        }
    }

    /// Write all four stamps.
    pub fn emit(&self, block: &mut timing_block) {
        block.set_sw_tx(self.sw_tx.total_nanos());
        block.set_hw_tx(self.hw_tx.total_nanos());
        block.set_hw_rx(self.hw_rx.total_nanos());
        block.set_sw_rx(self.sw_rx.total_nanos());
    }
}

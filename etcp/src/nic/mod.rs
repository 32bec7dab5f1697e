//! Encapsulates the link below the transport.
//!
//! ETCP frames travel directly on a fast link without any network layer in between. The link
//! delivers whole frames and provides the host addresses of both sides, optional VLAN tags and
//! priorities, and the time stamps taken by the hardware. A link is anything implementing
//! [`Device`], also permitting software emulation of one. Two are included:
//!
//! * [`Loopback`] returns every sent frame as a received frame.
//! * [`External`] keeps received and sent frames in queues driven by the caller. Two endpoints can
//!   be connected by moving the frames of one into the other.
//!
//! [`Device`]: trait.Device.html
//! [`Loopback`]: loopback/struct.Loopback.html
//! [`External`]: external/struct.External.html
pub mod common;
pub mod external;
pub mod loopback;
mod personality;

use crate::layer::Result;
use crate::time::Instant;

pub use self::external::External;
pub use self::loopback::Loopback;
pub use self::personality::{
    Capabilities,
    Personality};

/// A reference to memory holding frame data and a handle.
///
/// The `Payload` is the frame buffer while the `Handle` is an interface to the device to provide
/// operations for frame handling.
pub struct Packet<'a, H, P>
where
    H: Handle + ?Sized + 'a,
    P: PayloadMut + ?Sized + 'a,
{
    /// A control handle to the link and current buffer.
    pub handle: &'a mut H,
    /// One buffer containing an ETCP frame.
    pub payload: &'a mut P,
}

/// A controller for the link operations of the payload buffer.
///
/// Provides the meta data of the payload. This trait is split from the main payload since it must
/// be possible to use its method even while the payload itself is borrowed.
pub trait Handle {
    /// Queue this frame to be sent.
    ///
    /// This operation may fail for received frames that can not be reflected by the device, or
    /// simply for a lack of resources to queue the frame.
    fn queue(&mut self) -> Result<()>;

    /// Information on the frame.
    ///
    /// For received frames this describes where the frame came from. Before queueing an outgoing
    /// frame the sender chooses the link addressing with `set_link`.
    fn info(&self) -> &dyn Info;

    /// Choose link addressing and tags for an outgoing frame.
    fn set_link(&mut self, link: Link);
}

/// The metadata associated with a frame buffer.
///
/// The data can differ per buffer, although the timestamp should be monotonically increasing.
pub trait Info {
    /// The hardware time stamp of the frame, or `Instant::UNSET` if the device has no clock.
    fn timestamp(&self) -> Instant;

    /// The link addressing of the frame.
    fn link(&self) -> Link;
}

/// Addressing and tagging on the link.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Link {
    /// The host that sent the frame.
    pub src_addr: u64,
    /// The host receiving the frame.
    pub dst_addr: u64,
    /// The 12-bit VLAN identifier, if the frame is tagged.
    pub vlan: Option<u16>,
    /// The 3-bit priority code point, if the frame is tagged.
    pub priority: Option<u8>,
}

/// A frame buffer that can be read.
pub trait Payload {
    /// The bytes of the frame.
    fn payload(&self) -> &[u8];
}

/// A frame buffer that can be written and resized.
pub trait PayloadMut: Payload {
    /// Mutable bytes of the frame.
    fn payload_mut(&mut self) -> &mut [u8];

    /// Change the length of the frame.
    ///
    /// Fails if the buffer can not hold a frame of the requested length, the content of the
    /// buffer is unspecified after a successful resize.
    fn resize(&mut self, len: usize) -> Result<()>;
}

/// A link device.
pub trait Device {
    /// The control handle type also providing frame meta information.
    type Handle: Handle + ?Sized;
    /// The payload buffer type of this device.
    type Payload: PayloadMut + ?Sized;

    /// A description of the device.
    fn personality(&self) -> Personality;

    /// Transmit some frames utilizing the `sender`.
    ///
    /// Up to `max` frame buffers are chosen by the device. They are provided to the sender
    /// callback which may initialize their contents and decide to queue them. Transmission ends
    /// early at the first buffer the sender does not queue. Returns the number of queued frames.
    fn tx(&mut self, max: usize, sender: impl Send<Self::Handle, Self::Payload>)
        -> Result<usize>;

    /// Receive frames utilizing the `receiver`.
    ///
    /// Dequeue up to `max` received frames and provide them to the receiver callback.
    fn rx(&mut self, max: usize, receiver: impl Recv<Self::Handle, Self::Payload>)
        -> Result<usize>;
}

/// A raw frame receiver.
pub trait Recv<H: Handle + ?Sized, P: PayloadMut + ?Sized> {
    /// Receive a single frame.
    fn receive(&mut self, packet: Packet<H, P>);
}

/// A raw frame sender.
pub trait Send<H: Handle + ?Sized, P: PayloadMut + ?Sized> {
    /// Fill a single frame for sending.
    fn send(&mut self, packet: Packet<H, P>);
}

impl Payload for Vec<u8> {
    fn payload(&self) -> &[u8] {
        self.as_slice()
    }
}

impl PayloadMut for Vec<u8> {
    fn payload_mut(&mut self) -> &mut [u8] {
        self.as_mut_slice()
    }

    fn resize(&mut self, len: usize) -> Result<()> {
        if len > self.len() {
            self.try_reserve(len - self.len())?;
        }
        Vec::resize(self, len, 0);
        Ok(())
    }
}

impl<F, H: Handle + ?Sized, P: PayloadMut + ?Sized> Recv<H, P> for &'_ mut F
    where F: Recv<H, P>
{
    fn receive(&mut self, packet: Packet<H, P>) {
        (**self).receive(packet)
    }
}

impl<F, H: Handle + ?Sized, P: PayloadMut + ?Sized> Send<H, P> for &'_ mut F
    where F: Send<H, P>
{
    fn send(&mut self, packet: Packet<H, P>) {
        (**self).send(packet)
    }
}

/// Some base types and methods for other tests.
#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Sender and receiver verifying frame lengths.
    #[derive(Copy, Clone)]
    pub(crate) struct LengthIo(pub usize);

    impl LengthIo {
        fn signature(&self) -> [u8; 8] {
            self.0.to_le_bytes()
        }
    }

    impl<H, P> Recv<H, P> for LengthIo
        where H: Handle + ?Sized, P: PayloadMut + ?Sized,
    {
        fn receive(&mut self, packet: Packet<H, P>) {
            let bytes = self.signature();
            assert_eq!(packet.payload.payload().len(), self.0);
            for (p, b) in packet.payload.payload().iter().zip(bytes.iter().cycle()) {
                assert!(p == b)
            }
        }
    }

    impl<H, P> Send<H, P> for LengthIo
        where H: Handle + ?Sized, P: PayloadMut + ?Sized,
    {
        fn send(&mut self, packet: Packet<H, P>) {
            let bytes = self.signature();
            assert_eq!(packet.payload.resize(self.0), Ok(()));
            for (p, b) in packet.payload.payload_mut().iter_mut().zip(bytes.iter().cycle()) {
                *p = *b;
            }
            packet.handle.set_link(Link { src_addr: 1, dst_addr: 2, .. Link::default() });
            assert_eq!(packet.handle.queue(), Ok(()));
        }
    }
}

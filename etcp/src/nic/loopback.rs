//! Implementation of a software loop-back device.
use crate::time::Instant;

use super::common::{EnqueueFlag, PacketInfo};
use super::{Info, Link, Personality, Payload, PayloadMut, Recv, Send, Result};

/// A software loop-back device.
///
/// Maintains a ring buffer of frame buffers in flight. Every queued frame is received in order
/// with the link addressing chosen by its sender.
pub struct Loopback<C> {
    buffer: Vec<C>,
    links: Vec<Link>,
    next_recv: usize,
    sent: usize,
    mtu: usize,
    timestamp: Instant,
}

/// A newtype wrapper for the `nic::Handle` of `Loopback`.
///
/// This is only to ensure that future changes and additions can be done without relying on the
/// internal representation.
pub struct Handle(EnqueueFlag);

impl<C: PayloadMut> Loopback<C> {
    /// Create a loop-back device with the buffers used for frames in flight.
    pub fn new(buffer: Vec<C>) -> Self {
        let links = vec![Link::default(); buffer.len()];
        Loopback {
            buffer,
            links,
            next_recv: 0,
            sent: 0,
            mtu: Personality::DEFAULT_MTU,
            timestamp: Instant::UNSET,
        }
    }

    /// Change the largest frame the device accepts for sending.
    pub fn set_mtu(&mut self, mtu: usize) {
        self.mtu = mtu;
    }

    /// Update the timestamp on all future received frames.
    pub fn set_current_time(&mut self, instant: Instant) {
        self.timestamp = instant;
    }

    /// The number of frames queued and not yet received.
    pub fn in_flight(&self) -> usize {
        self.sent
    }

    fn buffer_count(&self) -> usize {
        self.buffer.len()
    }

    fn wrap_buffer(&self, base: usize, add: usize) -> usize {
        (base + add) % self.buffer_count()
    }
}

impl<C: PayloadMut> super::Device for Loopback<C> {
    type Handle = Handle;
    type Payload = C;

    fn personality(&self) -> Personality {
        Personality::baseline().with_mtu(self.mtu)
    }

    fn tx(&mut self, max: usize, mut sender: impl Send<Self::Handle, Self::Payload>)
        -> Result<usize>
    {
        let mut count = 0;

        for _ in 0..max {
            if self.sent == self.buffer_count() {
                break;
            }

            let next = self.wrap_buffer(self.next_recv, self.sent);
            let mut flag = Handle(EnqueueFlag::set_true(PacketInfo {
                timestamp: self.timestamp,
                link: Link::default(),
            }));

            sender.send(super::Packet {
                handle: &mut flag,
                payload: &mut self.buffer[next],
            });

            if !flag.0.was_sent() {
                break;
            }

            if self.buffer[next].payload().len() > self.mtu {
                net_debug!("loopback: dropping frame of {} bytes", self.buffer[next].payload().len());
                continue;
            }

            self.links[next] = flag.0.packet_info().link;
            self.sent += 1;
            count += 1;
        }

        Ok(count)
    }

    fn rx(&mut self, max: usize, mut receptor: impl Recv<Self::Handle, Self::Payload>)
        -> Result<usize>
    {
        let mut count = 0;

        for _ in 0..max {
            if self.sent == 0 {
                break;
            }

            let next = self.next_recv;
            let mut flag = Handle(EnqueueFlag::not_possible(PacketInfo {
                timestamp: self.timestamp,
                link: self.links[next],
            }));

            receptor.receive(super::Packet {
                handle: &mut flag,
                payload: &mut self.buffer[next],
            });

            self.next_recv = self.wrap_buffer(next, 1);
            self.sent -= 1;
            count += 1;
        }

        Ok(count)
    }
}

impl super::Handle for Handle {
    fn queue(&mut self) -> Result<()> {
        self.0.queue()
    }

    fn info(&self) -> &dyn Info {
        self.0.info()
    }

    fn set_link(&mut self, link: Link) {
        self.0.set_link(link)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::Error;
    use crate::nic::{Device as _, Handle as _, Packet};
    use crate::nic::tests::LengthIo;

    #[test]
    fn simple_loopback() {
        let mut loopback = Loopback::<Vec<u8>>::new(vec![Vec::new(); 2]);
        assert_eq!(loopback.tx(4, LengthIo(64)), Ok(2));
        assert_eq!(loopback.in_flight(), 2);
        assert_eq!(loopback.rx(4, LengthIo(64)), Ok(2));
        assert_eq!(loopback.rx(1, LengthIo(64)), Ok(0));
    }

    struct Inspect(usize);

    impl Recv<Handle, Vec<u8>> for Inspect {
        fn receive(&mut self, packet: Packet<Handle, Vec<u8>>) {
            assert_eq!(packet.handle.info().link().dst_addr, 2);
            assert_eq!(packet.handle.info().timestamp(), Instant::from_millis(3u64));
            assert_eq!(packet.handle.queue(), Err(Error::Illegal));
            self.0 += 1;
        }
    }

    #[test]
    fn keeps_link_and_refuses_reflection() {
        let mut loopback = Loopback::<Vec<u8>>::new(vec![Vec::new(); 1]);
        loopback.set_current_time(Instant::from_millis(3u64));
        assert_eq!(loopback.tx(1, LengthIo(8)), Ok(1));

        let mut inspect = Inspect(0);
        assert_eq!(loopback.rx(1, &mut inspect), Ok(1));
        assert_eq!(inspect.0, 1);
    }

    #[test]
    fn oversized_frames_dropped() {
        let mut loopback = Loopback::<Vec<u8>>::new(vec![Vec::new(); 2]);
        loopback.set_mtu(16);
        assert_eq!(loopback.tx(1, LengthIo(17)), Ok(0));
        assert_eq!(loopback.in_flight(), 0);
    }
}

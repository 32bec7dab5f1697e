//! A nic whose frames are moved in and out by the caller.
//!
//! Nothing leaves or enters an `External` device on its own. Sent frames accumulate in an outbox
//! and received frames are taken from an inbox, both accessible to the owner. Connecting two
//! devices is a matter of moving frames from one outbox to the other inbox, which also allows
//! tests to drop, duplicate or reorder frames on the way.
use std::collections::VecDeque;

use crate::time::Instant;

use super::common::{EnqueueFlag, PacketInfo};
use super::{Info, Link, Personality, Payload, Recv, Send, Result};

/// A frame with its link meta data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    /// The frame content.
    pub payload: Vec<u8>,
    /// Addressing and tags of the frame.
    pub link: Link,
    /// When the frame was sent or received.
    pub timestamp: Instant,
}

/// A newtype wrapper for the `nic::Handle` of `External`.
pub struct Handle(EnqueueFlag);

/// A device with an inbox and an outbox of frames.
pub struct External {
    inbox: VecDeque<Frame>,
    outbox: VecDeque<Frame>,
    /// The buffer offered to the next sender.
    spare: Vec<u8>,
    mtu: usize,
    address: u64,
    timestamp: Instant,
}

impl External {
    /// A device of a host with the given link address.
    pub fn new(address: u64) -> Self {
        External {
            inbox: VecDeque::new(),
            outbox: VecDeque::new(),
            spare: Vec::new(),
            mtu: Personality::DEFAULT_MTU,
            address,
            timestamp: Instant::UNSET,
        }
    }

    /// The link address of the host.
    pub fn address(&self) -> u64 {
        self.address
    }

    /// Change the largest frame the device accepts for sending.
    pub fn set_mtu(&mut self, mtu: usize) {
        self.mtu = mtu;
    }

    /// Update the timestamp on all future frames.
    pub fn set_current_time(&mut self, instant: Instant) {
        self.timestamp = instant;
    }

    /// Remaining number of frames to receive.
    pub fn to_recv(&self) -> usize {
        self.inbox.len()
    }

    /// Number of sent frames not yet taken out.
    pub fn to_send(&self) -> usize {
        self.outbox.len()
    }

    /// Put a frame into the inbox.
    pub fn push_recv(&mut self, frame: Frame) {
        self.inbox.push_back(frame);
    }

    /// Take the oldest sent frame.
    pub fn pop_sent(&mut self) -> Option<Frame> {
        self.outbox.pop_front()
    }

    /// Move all sent frames into the inbox of another device.
    ///
    /// Frames addressed to a different host are dropped, as a switch would. Returns the number of
    /// delivered frames.
    pub fn deliver_to(&mut self, other: &mut External) -> usize {
        let mut count = 0;
        while let Some(frame) = self.outbox.pop_front() {
            if frame.link.dst_addr != other.address {
                net_trace!("external: frame for {:x} not delivered to {:x}",
                    frame.link.dst_addr, other.address);
                continue;
            }
            other.inbox.push_back(frame);
            count += 1;
        }
        count
    }
}

impl super::Device for External {
    type Handle = Handle;
    type Payload = Vec<u8>;

    fn personality(&self) -> Personality {
        Personality::baseline().with_mtu(self.mtu)
    }

    fn tx(&mut self, max: usize, mut sender: impl Send<Self::Handle, Self::Payload>)
        -> Result<usize>
    {
        let mut count = 0;

        for _ in 0..max {
            let mut flag = Handle(EnqueueFlag::set_true(PacketInfo {
                timestamp: self.timestamp,
                link: Link { src_addr: self.address, .. Link::default() },
            }));

            self.spare.clear();
            sender.send(super::Packet {
                handle: &mut flag,
                payload: &mut self.spare,
            });

            if !flag.0.was_sent() {
                break;
            }

            if self.spare.payload().len() > self.mtu {
                net_debug!("external: dropping frame of {} bytes", self.spare.len());
                continue;
            }

            let info = flag.0.packet_info();
            self.outbox.push_back(Frame {
                payload: core::mem::replace(&mut self.spare, Vec::new()),
                link: info.link,
                timestamp: info.timestamp,
            });
            count += 1;
        }

        Ok(count)
    }

    fn rx(&mut self, max: usize, mut receptor: impl Recv<Self::Handle, Self::Payload>)
        -> Result<usize>
    {
        let mut count = 0;

        for _ in 0..max {
            let mut frame = match self.inbox.pop_front() {
                Some(frame) => frame,
                None => break,
            };

            let mut flag = Handle(EnqueueFlag::not_possible(PacketInfo {
                timestamp: self.timestamp,
                link: frame.link,
            }));

            receptor.receive(super::Packet {
                handle: &mut flag,
                payload: &mut frame.payload,
            });
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

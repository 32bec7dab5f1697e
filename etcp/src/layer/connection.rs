//! One direction of a flow.
//!
//! A sending connection keeps every data segment in its transmit queue until an acknowledgement
//! releases it, the receive queue holds the ACK and DEN frames the peer sent back. A receiving
//! connection buffers segments for the user in its receive queue and queues its ACK frames in the
//! transmit queue. Duplicates of segments that were already acknowledged are kept in the stale
//! queue until they are acknowledged again.
use core::cmp;
use core::fmt;
use std::collections::BTreeMap;

use crate::managed::Key;
use crate::nic::{self, Device, Link, Packet, PayloadMut};
use crate::storage::{ring, Assembler, RingQueue};
use crate::time::Instant;
use crate::wire::{
    data_header,
    etcp_header,
    Body,
    DataRepr,
    FrameRepr,
    HeaderRepr,
    MessageType,
    SackField,
    SackRepr,
    Timing,
    DATA_HEADER_LEN,
    HEADER_LEN,
    MAX_ACK_LEN};

use super::control::QueueState;
use super::{ConnOptions, Error, Result};

/// The host address and port of one side of a flow.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address {
    /// The link address of the host.
    pub host: u64,
    /// The port on the host.
    pub port: u32,
}

/// The addresses identifying a unidirectional flow.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FourTuple {
    /// The host sending the data.
    pub src_addr: u64,
    /// The port sending the data.
    pub src_port: u32,
    /// The host receiving the data.
    pub dst_addr: u64,
    /// The port receiving the data.
    pub dst_port: u32,
}

/// A connection and its three queues.
pub(crate) struct Connection {
    tuple: FourTuple,
    options: ConnOptions,
    tx: RingQueue<Segment>,
    rx: RingQueue<Segment>,
    stale: RingQueue<Segment>,
    role: Role,
}

/// A queue entry.
///
/// The buffer holds a complete frame, except in the receive queue of a receiving connection where
/// it holds the segment payload only. Stale entries have no buffer.
pub(crate) struct Segment {
    bytes: Vec<u8>,
    seq: u64,
    kind: MessageType,
    timing: Timing,
    /// An ACK covering this segment was queued.
    acked: bool,
    /// The segment must be transmitted again.
    retransmit: bool,
}

enum Role {
    Send(Sender),
    Recv(Receiver),
}

struct Sender {
    next_seq: u64,
    /// The first segment went into the queue.
    opened: bool,
    fin: bool,
    /// The peer refused the connection.
    denied: bool,
    /// Transmitted segments by sequence number, with their slot in the transmit queue.
    in_flight: BTreeMap<u64, usize>,
}

struct Receiver {
    received: Assembler,
    /// The sequence number of the FIN segment, once received.
    fin: Option<u64>,
}

/// The result of offering a data segment to a receiving connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum Accepted {
    /// The segment is new and was queued for the user.
    Fresh,
    /// The segment was acknowledged before and is acknowledged again.
    Stale,
    /// The segment was not queued.
    Dropped,
}

/// Copies queue entries into device buffers.
///
/// Sending stops at the first entry that could not be queued by the device.
struct FrameSender<'a> {
    conn: &'a mut Connection,
    link: Link,
    sent: usize,
    result: Result<()>,
}

/// Sends one frame prepared outside of any queue.
pub(crate) struct Oneshot<'a> {
    bytes: &'a [u8],
    link: Link,
    result: Result<bool>,
}

/// Holes of a receiving connection tracked at most.
const MAX_HOLES: usize = 32;

impl Address {
    /// Create an address from host and port.
    pub fn new(host: u64, port: u32) -> Self {
        Address { host, port }
    }

    /// The key of this address in the flow index.
    pub(crate) fn key(self) -> Key {
        Key::new(self.host, u64::from(self.port))
    }
}

impl FourTuple {
    /// The flow from `src` to `dst`.
    pub fn new(src: Address, dst: Address) -> Self {
        FourTuple {
            src_addr: src.host,
            src_port: src.port,
            dst_addr: dst.host,
            dst_port: dst.port,
        }
    }

    /// The sending side.
    pub fn src(&self) -> Address {
        Address::new(self.src_addr, self.src_port)
    }

    /// The receiving side.
    pub fn dst(&self) -> Address {
        Address::new(self.dst_addr, self.dst_port)
    }

    /// The flow in the opposite direction.
    pub fn swapped(&self) -> Self {
        FourTuple::new(self.dst(), self.src())
    }
}

impl Segment {
    fn with_size(size: usize) -> core::result::Result<Self, ring::Error> {
        let mut bytes = Vec::new();
        bytes.try_reserve_exact(size)
            .map_err(|_| ring::Error::Exhausted)?;
        bytes.resize(size, 0);
        Ok(Segment {
            bytes,
            seq: 0,
            kind: MessageType::Dat,
            timing: Timing::default(),
            acked: false,
            retransmit: false,
        })
    }

    fn reset(&mut self, seq: u64, kind: MessageType) {
        self.seq = seq;
        self.kind = kind;
        self.timing = Timing::default();
        self.acked = false;
        self.retransmit = false;
    }
}

impl Connection {
    /// Create the sending side of a flow.
    pub fn sender(tuple: FourTuple, options: ConnOptions, stale_log2: u32) -> Result<Self> {
        let frame_len = HEADER_LEN + DATA_HEADER_LEN + options.buffer_size;
        Ok(Connection {
            tuple,
            options,
            tx: RingQueue::new(options.window_log2, || Segment::with_size(frame_len))?,
            rx: RingQueue::new(options.window_log2, || Segment::with_size(MAX_ACK_LEN))?,
            stale: RingQueue::new(stale_log2, || Segment::with_size(0))?,
            role: Role::Send(Sender {
                next_seq: 0,
                opened: false,
                fin: false,
                denied: false,
                in_flight: BTreeMap::new(),
            }),
        })
    }

    /// Create the receiving side of a flow.
    pub fn receiver(tuple: FourTuple, options: ConnOptions, stale_log2: u32) -> Result<Self> {
        let window = 1usize << options.window_log2;
        Ok(Connection {
            tuple,
            options,
            tx: RingQueue::new(options.window_log2, || Segment::with_size(MAX_ACK_LEN))?,
            rx: RingQueue::new(options.window_log2, || Segment::with_size(options.buffer_size))?,
            stale: RingQueue::new(stale_log2, || Segment::with_size(0))?,
            role: Role::Recv(Receiver {
                received: Assembler::new(cmp::min(window, MAX_HOLES)),
                fin: None,
            }),
        })
    }

    pub fn tuple(&self) -> FourTuple {
        self.tuple
    }

    pub fn is_sender(&self) -> bool {
        match self.role {
            Role::Send(_) => true,
            Role::Recv(_) => false,
        }
    }

    pub fn tx_state(&self) -> QueueState {
        QueueState::of(&self.tx)
    }

    pub fn rx_state(&self) -> QueueState {
        QueueState::of(&self.rx)
    }

    pub fn stale_state(&self) -> QueueState {
        QueueState::of(&self.stale)
    }

    /// Check if the peer refused this connection.
    pub fn is_denied(&self) -> bool {
        match &self.role {
            Role::Send(sender) => sender.denied,
            Role::Recv(_) => false,
        }
    }

    /// Check if the peer closed the flow and all of its data was delivered.
    pub fn is_finished(&self) -> bool {
        match &self.role {
            Role::Recv(receiver) => match receiver.fin {
                Some(fin) => receiver.received.base() > fin && self.rx.readable() == 0,
                None => false,
            },
            Role::Send(_) => false,
        }
    }

    /// The number of transmitted segments waiting for their acknowledgement.
    pub fn in_flight(&self) -> usize {
        match &self.role {
            Role::Send(sender) => sender.in_flight.len(),
            Role::Recv(_) => 0,
        }
    }

    /// Link addressing of the frames leaving this connection.
    ///
    /// Data travels along the flow while acknowledgements travel against it.
    fn link(&self) -> Link {
        let (src_addr, dst_addr) = match self.role {
            Role::Send(_) => (self.tuple.src_addr, self.tuple.dst_addr),
            Role::Recv(_) => (self.tuple.dst_addr, self.tuple.src_addr),
        };

        Link {
            src_addr,
            dst_addr,
            vlan: self.options.vlan,
            priority: self.options.priority,
        }
    }

    /// Queue a data segment, truncated to the buffer size.
    ///
    /// The first segment of a connection opens it. Returns the number of payload bytes queued.
    pub fn queue_data(&mut self, payload: &[u8]) -> Result<usize> {
        let len = cmp::min(payload.len(), self.options.buffer_size);
        let kind = match &self.role {
            Role::Send(Sender { opened: false, .. }) => MessageType::Con,
            _ => MessageType::Dat,
        };
        self.queue_segment(kind, &payload[..len])?;
        Ok(len)
    }

    /// Queue the last segment of the connection.
    pub fn queue_fin(&mut self) -> Result<()> {
        self.queue_segment(MessageType::Fin, &[])?;
        if let Role::Send(sender) = &mut self.role {
            sender.fin = true;
        }
        Ok(())
    }

    fn queue_segment(&mut self, kind: MessageType, payload: &[u8]) -> Result<()> {
        let sender = match &mut self.role {
            Role::Send(sender) => sender,
            Role::Recv(_) => return Err(Error::WrongSocket),
        };

        if sender.denied || sender.fin {
            return Err(Error::NotConnected);
        }

        let repr = FrameRepr {
            header: HeaderRepr {
                kind,
                src_port: self.tuple.src_port,
                dst_port: self.tuple.dst_port,
                timing: Timing::default(),
            },
            body: Body::Data(DataRepr {
                seq: sender.next_seq,
                len: payload.len() as u32,
                attempts: 0,
            }),
        };

        let (index, segment) = self.tx.reserve()?;
        let frame_len = repr.frame_len();
        repr.emit(&mut segment.bytes[..frame_len]);
        repr.payload_mut(&mut segment.bytes[..frame_len]).copy_from_slice(payload);
        segment.reset(sender.next_seq, kind);
        self.tx.commit(index, frame_len)?;

        sender.next_seq += 1;
        sender.opened = true;
        Ok(())
    }

    /// Queue an ACK or DEN frame received for a sending connection.
    pub fn accept_ack(&mut self, frame: &[u8]) -> bool {
        if !self.is_sender() || frame.len() > MAX_ACK_LEN {
            return false;
        }

        let (index, segment) = match self.rx.reserve() {
            Ok(reserved) => reserved,
            Err(_) => {
                net_trace!("etcp: ack queue of {} full", self.tuple);
                return false;
            },
        };

        segment.bytes[..frame.len()].copy_from_slice(frame);
        self.rx.commit(index, frame.len()).is_ok()
    }

    /// Process the received acknowledgements of a sending connection.
    ///
    /// Acknowledged segments leave the transmit queue. Unacknowledged segments below the highest
    /// acknowledged one are marked for retransmission. Returns the number of released segments.
    pub fn handle_acks(&mut self) -> Result<usize> {
        let sender = match &mut self.role {
            Role::Send(sender) => sender,
            Role::Recv(_) => return Ok(0),
        };

        let mut released = 0;
        let mut highest = None;
        loop {
            let (index, frame) = match self.rx.pull() {
                Ok((index, segment, len)) => (index, FrameRepr::parse(&segment.bytes[..len])),
                Err(_) => break,
            };
            self.rx.release(index)?;

            let (kind, sack) = match frame {
                Ok(FrameRepr { header, body: Body::Sack(sack) }) => (header.kind, sack),
                _ => {
                    net_debug!("etcp: malformed acknowledgement for {}", self.tuple);
                    continue;
                },
            };

            if kind == MessageType::Den {
                net_debug!("etcp: {} denied by peer", self.tuple);
                sender.denied = true;
                continue;
            }

            for field in sack.fields() {
                let range = sack.base_seq.checked_add(u64::from(field.offset))
                    .and_then(|first| first.checked_add(u64::from(field.count))
                        .map(|end| first..end));
                let range = match range {
                    Some(range) => range,
                    None => {
                        net_debug!("etcp: acknowledgement outside of sequence space for {}", self.tuple);
                        continue;
                    },
                };

                let acked: Vec<(u64, usize)> = sender.in_flight.range(range.clone())
                    .map(|(&seq, &slot)| (seq, slot))
                    .collect();
                for (seq, slot) in acked {
                    sender.in_flight.remove(&seq);
                    self.tx.release(slot)?;
                    released += 1;
                }
                highest = cmp::max(highest, Some(cmp::min(range.end, sender.next_seq)));
            }
        }

        if let Some(end) = highest {
            for (_, &slot) in sender.in_flight.range(..end) {
                let (segment, _) = self.tx.slot_mut(slot)?;
                segment.retransmit = true;
            }
        }

        Ok(released)
    }

    /// Find the next data segment to transmit.
    ///
    /// Segments marked for retransmission go first. New segments are moved in flight.
    fn next_data(&mut self) -> Result<Option<usize>> {
        let sender = match &mut self.role {
            Role::Send(sender) => sender,
            Role::Recv(_) => return Ok(None),
        };

        for (_, &slot) in sender.in_flight.iter() {
            let (segment, _) = self.tx.slot(slot)?;
            if segment.retransmit {
                return Ok(Some(slot));
            }
        }

        match self.tx.pull() {
            Ok((slot, segment, _)) => {
                sender.in_flight.insert(segment.seq, slot);
                Ok(Some(slot))
            },
            Err(ring::Error::Empty) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Prepare the in-flight segment at `slot` for another transmission.
    fn stamp_data(&mut self, slot: usize) -> Result<(&[u8], u32)> {
        let (segment, len) = self.tx.slot_mut(slot)?;
        let frame = &mut segment.bytes[..len];

        let data = data_header::new_unchecked_mut(&mut frame[HEADER_LEN..]);
        let attempts = data.attempts().saturating_add(1);
        data.set_attempts(attempts);
        etcp_header::new_unchecked_mut(frame)
            .timing_mut()
            .set_sw_tx(Instant::now().nanos);
        segment.retransmit = false;

        Ok((&segment.bytes[..len], attempts))
    }

    /// Transmit up to `max` data segments, retransmissions first.
    pub fn transmit_data<D: Device>(&mut self, device: &mut D, max: Option<usize>) -> Result<usize> {
        let max = max.unwrap_or(self.tx.capacity());
        if max == 0 || !self.is_sender() {
            return Ok(0);
        }

        let link = self.link();
        let mut sender = FrameSender { conn: self, link, sent: 0, result: Ok(()) };
        device.tx(max, &mut sender)?;
        let FrameSender { sent, result, .. } = sender;
        result.map(|()| sent)
    }

    /// Transmit up to `max` queued acknowledgements.
    pub fn transmit_acks<D: Device>(&mut self, device: &mut D, max: Option<usize>) -> Result<usize> {
        let max = max.unwrap_or(self.tx.capacity());
        if max == 0 || self.is_sender() || self.tx.readable() == 0 {
            return Ok(0);
        }

        let link = self.link();
        let mut sender = FrameSender { conn: self, link, sent: 0, result: Ok(()) };
        device.tx(max, &mut sender)?;
        let FrameSender { sent, result, .. } = sender;
        result.map(|()| sent)
    }

    /// Offer a received data segment to a receiving connection.
    pub fn accept_segment(&mut self, header: &HeaderRepr, data: &DataRepr, payload: &[u8], hw_rx: Instant)
        -> Accepted
    {
        let receiver = match &mut self.role {
            Role::Recv(receiver) => receiver,
            Role::Send(_) => return Accepted::Dropped,
        };

        let timing = Timing {
            hw_rx,
            sw_rx: Instant::now(),
            .. header.timing
        };

        let window_end = receiver.received.base().saturating_add(self.rx.capacity() as u64);
        if data.seq >= window_end {
            net_trace!("etcp: segment {} beyond the window of {}", data.seq, self.tuple);
            return Accepted::Dropped;
        }

        if receiver.received.contains(data.seq) {
            let pending = self.rx.iter_readable_mut()
                .any(|(_, segment, _)| segment.seq == data.seq && !segment.acked);
            if pending {
                net_trace!("etcp: duplicate {} of {} not yet acknowledged", data.seq, self.tuple);
                return Accepted::Dropped;
            }

            return match self.stale.reserve() {
                Ok((index, entry)) => {
                    entry.reset(data.seq, header.kind);
                    entry.timing = timing;
                    match self.stale.commit(index, 0) {
                        Ok(()) => Accepted::Stale,
                        Err(_) => Accepted::Dropped,
                    }
                },
                Err(_) => {
                    net_trace!("etcp: stale queue of {} full", self.tuple);
                    Accepted::Dropped
                },
            };
        }

        if payload.len() > self.options.buffer_size || self.rx.available() == 0 {
            net_trace!("etcp: no room for segment {} of {}", data.seq, self.tuple);
            return Accepted::Dropped;
        }

        if receiver.received.add(data.seq).is_err() {
            net_trace!("etcp: too many holes in {}, dropping {}", self.tuple, data.seq);
            return Accepted::Dropped;
        }

        if header.kind == MessageType::Fin {
            receiver.fin = Some(data.seq);
        }

        let (index, segment) = match self.rx.reserve() {
            Ok(reserved) => reserved,
            Err(_) => return Accepted::Dropped,
        };
        segment.bytes[..payload.len()].copy_from_slice(payload);
        segment.reset(data.seq, header.kind);
        segment.timing = timing;
        match self.rx.commit(index, payload.len()) {
            Ok(()) => Accepted::Fresh,
            Err(_) => Accepted::Dropped,
        }
    }

    /// Acknowledge received segments not acknowledged before.
    ///
    /// Considers at most `max_slots` segments in the order of their arrival and queues at most
    /// `max_packets` ACK frames, never more than the transmit queue has room for. Consecutive
    /// sequence numbers share a SACK field. Returns the number of acknowledged segments.
    pub fn generate_acks(&mut self, max_slots: Option<usize>, max_packets: Option<usize>)
        -> Result<usize>
    {
        let max_slots = max_slots.unwrap_or(self.rx.capacity());
        let max_packets = cmp::min(
            max_packets.unwrap_or(self.tx.capacity()),
            self.tx.available());

        let mut pending: Vec<(u64, Timing, usize)> = self.rx.iter_readable_mut()
            .filter(|(_, segment, _)| !segment.acked)
            .take(max_slots)
            .map(|(index, segment, _)| (segment.seq, segment.timing, index))
            .collect();
        pending.sort_unstable_by_key(|&(seq, _, _)| seq);

        let mut covered = 0;
        let mut packets = 0;
        let mut result = Ok(());
        while covered < pending.len() && packets < max_packets {
            let (repr, count) = coalesce(
                pending[covered..].iter().map(|&(seq, timing, _)| (seq, timing)),
                self.rx.available() as u32);
            if let Err(err) = self.queue_ack(MessageType::Ack, &repr) {
                result = Err(err);
                break;
            }
            covered += count;
            packets += 1;
        }

        // Only segments in queued packets count as acknowledged.
        let mut acked: Vec<usize> = pending[..covered].iter()
            .map(|&(_, _, index)| index)
            .collect();
        acked.sort_unstable();
        for (index, segment, _) in self.rx.iter_readable_mut() {
            if acked.binary_search(&index).is_ok() {
                segment.acked = true;
            }
        }

        result.map(|()| covered)
    }

    /// Acknowledge stale segments again, in the order of their arrival.
    ///
    /// Considers at most `max_slots` stale entries and queues at most `max_packets` ACK frames,
    /// by default one per stale slot. An entry leaves the stale queue once its packet was queued.
    /// Returns the number of acknowledged stale segments.
    pub fn generate_stale_acks(&mut self, max_slots: Option<usize>, max_packets: Option<usize>)
        -> Result<usize>
    {
        let mut remaining = max_slots.unwrap_or(self.stale.capacity());
        let max_packets = cmp::min(
            max_packets.unwrap_or(self.stale.capacity()),
            self.tx.available());

        let mut acked = 0;
        for _ in 0..max_packets {
            if remaining == 0 || self.stale.readable() == 0 {
                break;
            }

            let entries: Vec<(u64, Timing)> = self.stale.iter_readable_mut()
                .take(remaining)
                .map(|(_, entry, _)| (entry.seq, entry.timing))
                .collect();
            let (repr, count) = coalesce(entries.into_iter(), self.rx.available() as u32);
            self.queue_ack(MessageType::Ack, &repr)?;

            for _ in 0..count {
                let (index, _, _) = self.stale.pull()?;
                self.stale.release(index)?;
            }
            acked += count;
            remaining -= count;
        }

        Ok(acked)
    }

    fn queue_ack(&mut self, kind: MessageType, sack: &SackRepr) -> Result<()> {
        let repr = FrameRepr {
            header: HeaderRepr {
                kind,
                src_port: self.tuple.dst_port,
                dst_port: self.tuple.src_port,
                timing: Timing::default(),
            },
            body: Body::Sack(*sack),
        };

        let (index, segment) = self.tx.reserve()?;
        let len = repr.buffer_len();
        repr.emit(&mut segment.bytes[..len]);
        segment.reset(sack.base_seq, kind);
        self.tx.commit(index, len)?;
        Ok(())
    }

    /// Copy the next buffered segment into `buffer`.
    ///
    /// The payload is truncated to the length of the buffer. Fails with `NotConnected` once the
    /// peer closed the flow and everything was delivered.
    pub fn deliver(&mut self, buffer: &mut [u8]) -> Result<usize> {
        if self.is_sender() {
            return Err(Error::WrongSocket);
        }

        loop {
            let pulled = match self.rx.pull() {
                Ok((index, segment, len)) => {
                    let len = cmp::min(len, buffer.len());
                    buffer[..len].copy_from_slice(&segment.bytes[..len]);
                    Some((index, len, segment.kind))
                },
                Err(ring::Error::Empty) => None,
                Err(err) => return Err(err.into()),
            };

            let (index, len, kind) = match pulled {
                Some(pulled) => pulled,
                None if self.is_finished() => return Err(Error::NotConnected),
                None => return Err(Error::TryAgain),
            };
            self.rx.release(index)?;

            if kind != MessageType::Fin {
                return Ok(len);
            }
        }
    }
}

/// Pack consecutive runs of sequence numbers into one acknowledgement.
///
/// Takes entries as long as they fit, returning the acknowledgement and the number of entries it
/// covers. The timing of a field is the timing of the first segment of its run.
fn coalesce(entries: impl Iterator<Item=(u64, Timing)>, window: u32) -> (SackRepr, usize) {
    let mut repr: Option<SackRepr> = None;
    let mut run: Option<SackField> = None;
    let mut count = 0;

    for (seq, timing) in entries {
        let sack = repr.get_or_insert_with(|| SackRepr::new(seq, window));
        let offset = match seq.checked_sub(sack.base_seq) {
            Some(offset) if offset <= u64::from(u32::max_value()) => offset as u32,
            _ => break,
        };

        match &mut run {
            Some(field) if field.offset + field.count == offset => {
                field.count += 1;
            },
            Some(field) if offset < field.offset + field.count => {
                // Duplicate of the current run.
            },
            Some(field) => {
                if sack.fields().len() + 1 == crate::wire::MAX_SACK_FIELDS {
                    break;
                }
                // Leaves room for the current run.
                let _ = sack.push(*field);
                run = Some(SackField { offset, count: 1, timing });
            },
            None => run = Some(SackField { offset, count: 1, timing }),
        }
        count += 1;
    }

    let mut sack = repr.unwrap_or_else(|| SackRepr::new(0, window));
    if let Some(field) = run {
        let _ = sack.push(field);
    }
    (sack, count)
}

impl<H, P> nic::Send<H, P> for FrameSender<'_>
    where H: nic::Handle + ?Sized, P: PayloadMut + ?Sized,
{
    fn send(&mut self, packet: Packet<H, P>) {
        if self.result.is_err() {
            return;
        }

        let is_sender = self.conn.is_sender();
        let slot = if is_sender {
            match self.conn.next_data() {
                Ok(Some(slot)) => slot,
                Ok(None) => return,
                Err(err) => {
                    self.result = Err(err);
                    return;
                },
            }
        } else {
            match self.conn.tx.peek() {
                Ok((slot, _, _)) => slot,
                Err(_) => return,
            }
        };

        let queued = if is_sender {
            match self.conn.stamp_data(slot) {
                Ok((frame, _)) => copy_frame(packet, frame, self.link),
                Err(err) => Err(err),
            }
        } else {
            let (_, segment, len) = match self.conn.tx.peek() {
                Ok(entry) => entry,
                Err(_) => return,
            };
            let mut frame = [0; MAX_ACK_LEN];
            frame[..len].copy_from_slice(&segment.bytes[..len]);
            etcp_header::new_unchecked_mut(&mut frame[..len])
                .timing_mut()
                .set_sw_tx(Instant::now().nanos);
            copy_frame(packet, &frame[..len], self.link)
        };

        match queued {
            Ok(()) => self.sent += 1,
            Err(err) => {
                if is_sender {
                    if let Ok((segment, _)) = self.conn.tx.slot_mut(slot) {
                        segment.retransmit = true;
                    }
                }
                self.result = Err(err);
                return;
            },
        }

        if !is_sender {
            let released = self.conn.tx.pull()
                .map(|(index, _, _)| index)
                .and_then(|index| self.conn.tx.release(index));
            if let Err(err) = released {
                self.result = Err(err.into());
            }
        }
    }
}

impl<'a> Oneshot<'a> {
    pub fn new(bytes: &'a [u8], link: Link) -> Self {
        Oneshot { bytes, link, result: Ok(false) }
    }

    /// Transmit the frame, returning whether the device took it.
    pub fn transmit<D: Device>(mut self, device: &mut D) -> Result<bool> {
        device.tx(1, &mut self)?;
        self.result
    }
}

impl<H, P> nic::Send<H, P> for Oneshot<'_>
    where H: nic::Handle + ?Sized, P: PayloadMut + ?Sized,
{
    fn send(&mut self, packet: Packet<H, P>) {
        self.result = copy_frame(packet, self.bytes, self.link).map(|()| true);
    }
}

fn copy_frame<H, P>(packet: Packet<H, P>, frame: &[u8], link: Link) -> Result<()>
    where H: nic::Handle + ?Sized, P: PayloadMut + ?Sized,
{
    packet.payload.resize(frame.len())?;
    packet.payload.payload_mut().copy_from_slice(frame);
    packet.handle.set_link(link);
    packet.handle.queue()
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:x}:{}", self.host, self.port)
    }
}

impl fmt::Display for FourTuple {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} -> {}", self.src(), self.dst())
    }
}

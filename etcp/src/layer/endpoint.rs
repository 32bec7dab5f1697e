//! The endpoint state and the flow index.
//!
//! ## Lookup
//!
//! All connections of an endpoint are found in two steps. The destination of a flow selects a
//! [`SourceMap`], which maps the source of the flow to the connection. Data frames are looked up
//! with their addresses as received, acknowledgements with their addresses swapped since they
//! travel against the flow they acknowledge.
//!
//! ## Admission
//!
//! A data frame of an unknown flow towards a listening destination creates a new socket. The
//! steps of creating it are recorded and undone in reverse order when a later step fails, the same
//! is done when a user connects a socket.
//!
//! [`SourceMap`]: struct.SourceMap.html
use core::sync::atomic::{AtomicU64, Ordering};

use crate::managed::{hashtable, HashTable, Key};
use crate::nic::{self, Device, Link, Packet, PayloadMut};
use crate::storage::RingQueue;
use crate::time::Instant;
use crate::wire::{Body, FrameRepr, HeaderRepr, MessageType, SackRepr, Timing};

use super::connection::{Accepted, Connection, FourTuple, Oneshot};
use super::control::{Order, RxControl, TxControl, TxQueues, Unlimited};
use super::socket::{Socket, SocketKind};
use super::{Config, ConnOptions, Error, Result};

/// The protocol state of one link device.
///
/// Owns the device, every connection reachable through it and the traffic control strategies.
/// All operations take `&mut self`, concurrent use from several threads requires an outer lock
/// such as a `Mutex`.
pub struct Endpoint<D: Device> {
    pub(super) device: D,
    pub(super) flows: Flows,
    pub(super) id: u64,
    pub(super) config: Config,
    pub(super) tx_control: Box<dyn TxControl>,
    pub(super) rx_control: Box<dyn RxControl>,
}

/// The destination level of the flow index.
pub(crate) struct Flows {
    maps: HashTable<SourceMap>,
    src_index_log2: u32,
    stale_log2: u32,
}

/// The connections towards one destination.
pub(crate) struct SourceMap {
    pub(super) conns: HashTable<Connection>,
    /// Sockets admitted but not yet accepted.
    pub(super) backlog: Option<RingQueue<Option<Socket>>>,
    /// Options of admitted connections, while a socket is bound to the destination.
    pub(super) bound: Option<ConnOptions>,
}

/// A completed step of a multi-step setup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Undo {
    /// A connection was installed for the flow.
    Mapping(FourTuple),
    /// A backlog slot of the destination was reserved.
    BacklogSlot(FourTuple, usize),
}

/// Receives frames from the device and dispatches them.
struct Ingress<'a> {
    flows: &'a mut Flows,
    config: &'a Config,
    id: u64,
    /// Sources of refused data frames.
    denied: &'a mut Vec<(FourTuple, u64)>,
    queued: usize,
}

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// The largest listen backlog, as a power of two.
pub(super) const MAX_BACKLOG_LOG2: u32 = 16;

impl<D: Device> Endpoint<D> {
    /// Create an endpoint on a device.
    pub fn new(device: D, config: Config) -> Result<Self> {
        Ok(Endpoint {
            device,
            flows: Flows::new(&config)?,
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            config,
            tx_control: Box::new(Unlimited),
            rx_control: Box::new(Unlimited),
        })
    }

    /// Replace the transmit strategy.
    pub fn set_tx_control(&mut self, control: impl TxControl + 'static) {
        self.tx_control = Box::new(control);
    }

    /// Replace the acknowledgement strategy.
    pub fn set_rx_control(&mut self, control: impl RxControl + 'static) {
        self.rx_control = Box::new(control);
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Check if a connection of this flow exists, in either direction of data.
    pub fn has_connection(&self, tuple: &FourTuple) -> bool {
        self.flows.connection(tuple).is_some()
    }

    /// Tear down all connections and return the device.
    ///
    /// Pending data is dropped without notifying any peer.
    pub fn into_device(self) -> D {
        let Endpoint { device, flows, .. } = self;
        flows.maps.destroy_with(|_, map| {
            map.conns.destroy_with(|_, conn| {
                net_debug!("etcp: dropping connection {}", conn.tuple());
            });
        });
        device
    }

    /// Receive frames from the device.
    ///
    /// Returns the number of segments and acknowledgements queued on connections, including those
    /// of newly admitted connections.
    pub fn poll_rx(&mut self) -> Result<usize> {
        let mut denied = Vec::new();
        let Endpoint { device, flows, config, id, .. } = self;
        let batch = config.rx_batch;

        let mut ingress = Ingress {
            flows,
            config: &*config,
            id: *id,
            denied: &mut denied,
            queued: 0,
        };
        device.rx(batch, &mut ingress)?;
        let queued = ingress.queued;

        for (tuple, seq) in denied {
            self.deny(tuple, seq)?;
        }

        Ok(queued)
    }

    /// Transmit on every connection of the endpoint.
    ///
    /// Returns the number of sent frames.
    pub fn poll_tx(&mut self) -> Result<usize> {
        let mut sent = 0;
        for (tuple, is_sender) in self.flows.tuples() {
            sent += if is_sender {
                self.transmit(Some(tuple), None)?
            } else {
                self.transmit(None, Some(tuple))?
            };
        }
        Ok(sent)
    }

    /// Transmit data of `send` and acknowledgements of `recv`.
    ///
    /// Asks the transmit strategy for order and limits, then processes received acknowledgements
    /// before sending. Returns the number of sent frames.
    pub(super) fn transmit(&mut self, send: Option<FourTuple>, recv: Option<FourTuple>)
        -> Result<usize>
    {
        let send_conn = send.and_then(|tuple| self.flows.connection(&tuple));
        let recv_conn = recv.and_then(|tuple| self.flows.connection(&tuple));
        let queues = TxQueues {
            send_tx: send_conn.map(Connection::tx_state),
            send_rx: send_conn.map(Connection::rx_state),
            recv_tx: recv_conn.map(Connection::tx_state),
            recv_rx: recv_conn.map(Connection::rx_state),
        };
        let decision = self.tx_control.decide(&queues);

        let Endpoint { device, flows, .. } = self;
        if let Some(conn) = send.and_then(|tuple| flows.connection_mut(&tuple)) {
            conn.handle_acks()?;
        }

        let mut sent = 0;
        let ack_first = decision.order == Order::AckFirst;
        for &acks in if ack_first { &[true, false] } else { &[false, true] } {
            let (tuple, max) = if acks { (recv, decision.max_acks) } else { (send, decision.max_data) };
            let conn = match tuple.and_then(|tuple| flows.connection_mut(&tuple)) {
                Some(conn) => conn,
                None => continue,
            };

            sent += if acks {
                conn.transmit_acks(device, max)?
            } else {
                conn.transmit_data(device, max)?
            };
        }

        Ok(sent)
    }

    /// Refuse a data frame of a flow that is not accepted.
    fn deny(&mut self, tuple: FourTuple, seq: u64) -> Result<()> {
        let repr = FrameRepr {
            header: HeaderRepr {
                kind: MessageType::Den,
                src_port: tuple.dst_port,
                dst_port: tuple.src_port,
                timing: Timing { sw_tx: Instant::now(), .. Timing::default() },
            },
            body: Body::Sack(SackRepr::new(seq, 0)),
        };

        let mut bytes = [0; crate::wire::MAX_ACK_LEN];
        let len = repr.buffer_len();
        repr.emit(&mut bytes[..len]);

        let link = Link {
            src_addr: tuple.dst_addr,
            dst_addr: tuple.src_addr,
            .. Link::default()
        };
        if !Oneshot::new(&bytes[..len], link).transmit(&mut self.device)? {
            net_debug!("etcp: could not deny {}", tuple);
        }
        Ok(())
    }
}

impl Flows {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Flows {
            maps: HashTable::new(config.dst_index_log2)?,
            src_index_log2: config.src_index_log2,
            stale_log2: config.stale_log2,
        })
    }

    pub fn source_map(&self, dst: &Key) -> Option<&SourceMap> {
        self.maps.get(dst)
    }

    pub fn source_map_mut(&mut self, dst: &Key) -> Option<&mut SourceMap> {
        self.maps.get_mut(dst)
    }

    pub fn connection(&self, tuple: &FourTuple) -> Option<&Connection> {
        self.maps.get(&tuple.dst().key())?
            .conns.get(&tuple.src().key())
    }

    pub fn connection_mut(&mut self, tuple: &FourTuple) -> Option<&mut Connection> {
        self.maps.get_mut(&tuple.dst().key())?
            .conns.get_mut(&tuple.src().key())
    }

    /// All flows with their direction of data.
    pub fn tuples(&self) -> Vec<(FourTuple, bool)> {
        self.maps.iter()
            .flat_map(|(_, map)| map.conns.iter())
            .map(|(_, conn)| (conn.tuple(), conn.is_sender()))
            .collect()
    }

    /// Create a connection for a flow.
    pub fn open(&mut self, tuple: FourTuple, options: ConnOptions, sender: bool) -> Result<()> {
        let conn = if sender {
            Connection::sender(tuple, options, self.stale_log2)?
        } else {
            Connection::receiver(tuple, options, self.stale_log2)?
        };
        self.insert_connection(conn)
    }

    fn insert_connection(&mut self, conn: Connection) -> Result<()> {
        let tuple = conn.tuple();
        let dst = tuple.dst().key();

        let created = !self.maps.contains_key(&dst);
        if created {
            self.maps.insert_if_absent(dst, SourceMap::new(self.src_index_log2)?)?;
        }

        let map = self.maps.get_mut(&dst).ok_or(Error::Index)?;
        let result = match map.conns.insert_if_absent(tuple.src().key(), conn) {
            Ok(()) => Ok(()),
            Err(hashtable::Error::AlreadyExists) => Err(Error::AlreadyConnected),
            Err(err) => Err(err.into()),
        };

        if result.is_err() && created {
            self.maps.remove(&dst)?;
        }

        result
    }

    /// Remove the connection of a flow, and its source map if nothing else uses it.
    pub fn remove_connection(&mut self, tuple: &FourTuple) -> Result<()> {
        let dst = tuple.dst().key();
        let map = self.maps.get_mut(&dst).ok_or(Error::NotConnected)?;
        map.conns.remove(&tuple.src().key())
            .map_err(|_| Error::NotConnected)?;

        if map.is_unused() {
            self.maps.remove(&dst)?;
        }
        Ok(())
    }

    /// Reserve a destination for a listening socket.
    pub fn bind(&mut self, dst: &Key, options: ConnOptions) -> Result<()> {
        let mut map = SourceMap::new(self.src_index_log2)?;
        map.bound = Some(options);
        match self.maps.insert_if_absent(*dst, map) {
            Ok(()) => Ok(()),
            Err(hashtable::Error::AlreadyExists) => Err(Error::AlreadyBound),
            Err(err) => Err(err.into()),
        }
    }

    /// Release a destination, returning its backlog.
    pub fn unbind(&mut self, dst: &Key) -> Result<Option<RingQueue<Option<Socket>>>> {
        let map = self.maps.get_mut(dst).ok_or(Error::Index)?;
        let backlog = map.backlog.take();
        map.bound = None;

        if map.is_unused() {
            self.maps.remove(dst)?;
        }
        Ok(backlog)
    }

    /// Create a socket for an unknown flow towards a listening destination.
    ///
    /// The socket is committed to the backlog of the destination. A full backlog rejects the flow.
    pub fn admit(&mut self, tuple: FourTuple, id: u64, return_path: bool) -> Result<()> {
        let map = self.maps.get_mut(&tuple.dst().key()).ok_or(Error::Index)?;
        let options = map.bound.ok_or(Error::WrongSocket)?;
        let backlog = map.backlog.as_mut().ok_or(Error::WrongSocket)?;
        let (slot, _) = backlog.reserve().map_err(|_| Error::Rejected)?;

        let mut undo = vec![Undo::BacklogSlot(tuple, slot)];
        match self.admit_steps(tuple, options, id, return_path, slot, &mut undo) {
            Ok(()) => Ok(()),
            Err(err) => {
                self.unwind(undo);
                Err(err)
            },
        }
    }

    fn admit_steps(
        &mut self,
        tuple: FourTuple,
        options: ConnOptions,
        id: u64,
        return_path: bool,
        slot: usize,
        undo: &mut Vec<Undo>,
    ) -> Result<()> {
        undo.try_reserve(2)?;

        self.open(tuple, options, false)?;
        undo.push(Undo::Mapping(tuple));

        let send = if return_path {
            let swapped = tuple.swapped();
            self.open(swapped, options, true)?;
            undo.push(Undo::Mapping(swapped));
            Some(swapped)
        } else {
            None
        };

        let socket = Socket {
            endpoint: id,
            kind: SocketKind::SendReceive { send, recv: Some(tuple) },
        };

        let backlog = self.maps.get_mut(&tuple.dst().key())
            .and_then(|map| map.backlog.as_mut())
            .ok_or(Error::Index)?;
        *backlog.reserved_mut(slot)? = Some(socket);
        backlog.commit(slot, 1)?;
        Ok(())
    }

    /// Undo completed setup steps, the most recent first.
    pub fn unwind(&mut self, undo: Vec<Undo>) {
        for step in undo.into_iter().rev() {
            let result = match step {
                Undo::Mapping(tuple) => self.remove_connection(&tuple),
                Undo::BacklogSlot(tuple, slot) => self.maps.get_mut(&tuple.dst().key())
                    .and_then(|map| map.backlog.as_mut())
                    .map_or(Err(Error::Index), |backlog| backlog.abandon(slot).map_err(Error::from)),
            };

            if let Err(err) = result {
                net_warn!("etcp: failed to undo {:?}: {}", step, err);
            }
        }
    }
}

impl SourceMap {
    fn new(log2: u32) -> Result<Self> {
        Ok(SourceMap {
            conns: HashTable::new(log2)?,
            backlog: None,
            bound: None,
        })
    }

    fn is_unused(&self) -> bool {
        self.conns.is_empty() && self.bound.is_none()
    }
}

impl Ingress<'_> {
    fn data(&mut self, tuple: FourTuple, repr: &FrameRepr, frame: &[u8], hw_rx: Instant) {
        let data = match &repr.body {
            Body::Data(data) => data,
            _ => return,
        };

        let map = match self.flows.source_map(&tuple.dst().key()) {
            Some(map) => map,
            None => {
                net_trace!("etcp: no destination for {}", tuple);
                return;
            },
        };

        if !map.conns.contains_key(&tuple.src().key()) {
            if map.backlog.is_none() {
                if map.bound.is_some() {
                    self.denied.push((tuple, data.seq));
                }
                net_trace!("etcp: no connection for {}", tuple);
                return;
            }

            if repr.header.kind == MessageType::Fin {
                net_trace!("etcp: closing unknown flow {}", tuple);
                return;
            }

            match self.flows.admit(tuple, self.id, self.config.accept_return_path) {
                Ok(()) => {
                    net_debug!("etcp: admitted {}", tuple);
                },
                Err(err) => {
                    net_debug!("etcp: not admitting {}: {}", tuple, err);
                    return;
                },
            }
        }

        let conn = match self.flows.connection_mut(&tuple) {
            Some(conn) => conn,
            None => return,
        };

        match conn.accept_segment(&repr.header, data, repr.payload(frame), hw_rx) {
            Accepted::Fresh | Accepted::Stale => self.queued += 1,
            Accepted::Dropped => (),
        }
    }

    fn ack(&mut self, tuple: FourTuple, frame: &[u8]) {
        let acked = tuple.swapped();
        let accepted = match self.flows.connection_mut(&acked) {
            Some(conn) => conn.accept_ack(frame),
            None => false,
        };

        if accepted {
            self.queued += 1;
        } else {
            net_trace!("etcp: dropped acknowledgement for {}", acked);
        }
    }
}

impl<H, P> nic::Recv<H, P> for Ingress<'_>
    where H: nic::Handle + ?Sized, P: PayloadMut + ?Sized,
{
    fn receive(&mut self, packet: Packet<H, P>) {
        let info = packet.handle.info();
        let (link, hw_rx) = (info.link(), info.timestamp());
        let frame = packet.payload.payload();

        let repr = match FrameRepr::parse(frame) {
            Ok(repr) => repr,
            Err(err) => {
                net_trace!("etcp: dropping frame: {}", err);
                return;
            },
        };

        let tuple = FourTuple {
            src_addr: link.src_addr,
            src_port: repr.header.src_port,
            dst_addr: link.dst_addr,
            dst_port: repr.header.dst_port,
        };

        match repr.body {
            Body::Data(_) => self.data(tuple, &repr, frame, hw_rx),
            Body::Sack(_) => self.ack(tuple, frame),
            Body::Empty => {
                net_trace!("etcp: error frame from {}", tuple);
            },
        }
    }
}

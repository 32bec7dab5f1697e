//! The socket interface of an endpoint.
//!
//! A [`Socket`] is only a handle, all state lives in the [`Endpoint`] that created it. Every
//! operation takes the socket and checks that it is in a state permitting the operation, a socket
//! changes its kind at most once: from `Unknown` either to `ListenAccept` by binding or to
//! `SendReceive` by connecting. Sockets produced by `accept` start out as `SendReceive`.
//!
//! [`Socket`]: struct.Socket.html
//! [`Endpoint`]: struct.Endpoint.html
use crate::nic::Device;
use crate::storage::RingQueue;
use crate::wire::{DATA_HEADER_LEN, HEADER_LEN};

use super::connection::{Address, FourTuple};
use super::control::RxQueues;
use super::endpoint::{Endpoint, Undo, MAX_BACKLOG_LOG2};
use super::{ConnOptions, Error, Result};

/// A handle to a socket of an endpoint.
///
/// Not `Clone`, every socket is closed at most once.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct Socket {
    pub(super) endpoint: u64,
    pub(super) kind: SocketKind,
}

/// The state of a socket.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SocketKind {
    /// Neither bound nor connected.
    Unknown,
    /// Bound to a destination, accepting its new flows once listening.
    ListenAccept {
        /// The bound address.
        destination: Address,
    },
    /// Sending and receiving data.
    SendReceive {
        /// The flow of sent data.
        send: Option<FourTuple>,
        /// The flow of received data.
        recv: Option<FourTuple>,
    },
}

impl Socket {
    /// The state of the socket.
    pub fn kind(&self) -> SocketKind {
        self.kind
    }

    /// The flow of sent data, if the socket is connected.
    pub fn send_flow(&self) -> Option<FourTuple> {
        match self.kind {
            SocketKind::SendReceive { send, .. } => send,
            _ => None,
        }
    }

    /// The flow of received data, if the socket is connected.
    pub fn recv_flow(&self) -> Option<FourTuple> {
        match self.kind {
            SocketKind::SendReceive { recv, .. } => recv,
            _ => None,
        }
    }
}

impl<D: Device> Endpoint<D> {
    /// Create an unbound socket.
    pub fn socket(&self) -> Socket {
        Socket {
            endpoint: self.id,
            kind: SocketKind::Unknown,
        }
    }

    /// Bind a socket to a local destination.
    ///
    /// The options apply to connections admitted later. Fails with `AlreadyBound` if the
    /// destination is bound or has connections, the existing binding is not affected.
    pub fn bind(&mut self, sock: &mut Socket, destination: Address, options: ConnOptions)
        -> Result<()>
    {
        self.check_unknown(sock)?;
        self.check_options(&options)?;
        self.flows.bind(&destination.key(), options)?;
        sock.kind = SocketKind::ListenAccept { destination };
        Ok(())
    }

    /// Start accepting new flows with a backlog of `2^backlog_log2` sockets.
    ///
    /// A socket listens at most once, calling this again fails with `AlreadyListening`.
    pub fn listen(&mut self, sock: &Socket, backlog_log2: u32) -> Result<()> {
        let destination = self.listener(sock)?;
        if backlog_log2 > MAX_BACKLOG_LOG2 {
            return Err(Error::OutOfRange);
        }

        let map = self.flows.source_map_mut(&destination.key())
            .ok_or(Error::Index)?;
        if map.backlog.is_some() {
            return Err(Error::AlreadyListening);
        }

        map.backlog = Some(RingQueue::new(backlog_log2, || Ok(None))?);
        Ok(())
    }

    /// Connect a socket for sending from `src` to `dst`.
    ///
    /// With `return_path` the socket also receives data sent from `dst` to `src`. Either both
    /// connections are created or none.
    pub fn connect(
        &mut self,
        sock: &mut Socket,
        src: Address,
        dst: Address,
        options: ConnOptions,
        return_path: bool,
    ) -> Result<()> {
        self.check_unknown(sock)?;
        self.check_options(&options)?;

        let send = FourTuple::new(src, dst);
        let recv = if return_path { Some(send.swapped()) } else { None };

        let mut undo = Vec::new();
        undo.try_reserve(2)?;
        let result = self.flows.open(send, options, true)
            .and_then(|()| {
                undo.push(Undo::Mapping(send));
                match recv {
                    Some(recv) => self.flows.open(recv, options, false),
                    None => Ok(()),
                }
            });

        if let Err(err) = result {
            self.flows.unwind(undo);
            return Err(err);
        }

        net_debug!("etcp: connected {}", send);
        sock.kind = SocketKind::SendReceive { send: Some(send), recv };
        Ok(())
    }

    /// Take the next admitted socket of a listener.
    ///
    /// Receives from the device first when receiving is event triggered. Fails with `TryAgain`
    /// when no socket is waiting.
    pub fn accept(&mut self, sock: &Socket) -> Result<Socket> {
        let destination = self.listener(sock)?;
        match self.flows.source_map(&destination.key()) {
            Some(map) if map.backlog.is_some() => (),
            _ => return Err(Error::WrongSocket),
        }

        if self.config.event_triggered_rx {
            self.poll_rx()?;
        }

        let backlog = self.flows.source_map_mut(&destination.key())
            .and_then(|map| map.backlog.as_mut())
            .ok_or(Error::WrongSocket)?;
        let (slot, _, _) = backlog.pull()?;
        let accepted = backlog.slot_mut(slot)?.0.take();
        backlog.release(slot)?;
        accepted.ok_or(Error::Queue)
    }

    /// Queue data for sending and transmit.
    ///
    /// Without payload only transmits. At most one segment is queued, larger payloads are
    /// truncated to the buffer size of the connection. Returns the number of queued bytes.
    /// A full transmit queue is reported as `TryAgain` after transmitting.
    pub fn send(&mut self, sock: &Socket, payload: Option<&[u8]>) -> Result<usize> {
        let (send, recv) = self.connected(sock)?;
        let send = send.ok_or(Error::NotConnected)?;

        let conn = self.flows.connection_mut(&send)
            .ok_or(Error::NotConnected)?;
        if conn.is_denied() {
            return Err(Error::NotConnected);
        }

        let queued = match payload {
            Some(payload) => conn.queue_data(payload),
            None => Ok(0),
        };

        if self.config.event_triggered_tx {
            self.transmit(Some(send), recv)?;
        }

        queued
    }

    /// Receive data into `buffer`.
    ///
    /// Receives from the device first when receiving is event triggered and acknowledges new
    /// segments. Without a buffer only receives. Returns the number of bytes of the next segment
    /// copied to the buffer.
    pub fn recv(&mut self, sock: &Socket, buffer: Option<&mut [u8]>) -> Result<usize> {
        let (_, recv) = self.connected(sock)?;
        let recv = recv.ok_or(Error::NotConnected)?;

        let state = self.flows.connection(&recv)
            .ok_or(Error::NotConnected)?
            .rx_state();
        if state.available == 0 && state.readable == 0 {
            return Err(Error::TryAgain);
        }

        let admitted = if self.config.event_triggered_rx && state.available > 0 {
            self.poll_rx()?
        } else {
            0
        };

        let buffer = match buffer {
            Some(buffer) => buffer,
            None => return Ok(0),
        };

        let conn = self.flows.connection_mut(&recv)
            .ok_or(Error::NotConnected)?;
        let queues = RxQueues {
            rx: conn.rx_state(),
            stale: conn.stale_state(),
            tx: conn.tx_state(),
        };

        if admitted == 0 && queues.rx.readable == 0 && queues.stale.readable == 0 {
            return Err(if conn.is_finished() { Error::NotConnected } else { Error::TryAgain });
        }

        let decision = self.rx_control.decide(&queues);
        let acked = conn.generate_acks(decision.max_ack_slots, decision.max_ack_packets)
            .and_then(|_| conn.generate_stale_acks(decision.max_stale_slots, decision.max_stale_packets));
        if let Err(err) = acked {
            net_debug!("etcp: acknowledging {} failed: {}", recv, err);
        }

        // Segments are delivered even when their acknowledgements have to wait.
        if self.config.event_triggered_tx {
            if let Err(err) = self.transmit(None, Some(recv)) {
                net_debug!("etcp: sending acknowledgements of {} failed: {}", recv, err);
            }
        }

        self.flows.connection_mut(&recv)
            .ok_or(Error::NotConnected)?
            .deliver(buffer)
    }

    /// Close a socket.
    ///
    /// A sending connection tries to send a final FIN segment first. Closing a listener also closes
    /// the sockets waiting in its backlog.
    pub fn close(&mut self, sock: Socket) -> Result<()> {
        if sock.endpoint != self.id {
            return Err(Error::WrongSocket);
        }

        match sock.kind {
            SocketKind::Unknown => Ok(()),
            SocketKind::ListenAccept { destination } => {
                let key = destination.key();
                let backlog = if self.flows.source_map(&key).is_some() {
                    self.flows.unbind(&key)?
                } else {
                    None
                };

                if let Some(mut backlog) = backlog {
                    while let Ok((slot, _, _)) = backlog.pull() {
                        let pending = backlog.slot_mut(slot)?.0.take();
                        backlog.release(slot)?;
                        if let Some(pending) = pending {
                            self.close(pending)?;
                        }
                    }
                }
                Ok(())
            },
            SocketKind::SendReceive { send, recv } => {
                if let Some(send) = send {
                    if let Some(conn) = self.flows.connection_mut(&send) {
                        let fin = conn.queue_fin();
                        let sent = fin.and_then(|()| self.transmit(Some(send), None));
                        if let Err(err) = sent {
                            net_debug!("etcp: no FIN for {}: {}", send, err);
                        }
                    }
                    // Already removed connections are not an error.
                    let _ = self.flows.remove_connection(&send);
                }

                if let Some(recv) = recv {
                    let _ = self.flows.remove_connection(&recv);
                }
                Ok(())
            },
        }
    }

    fn check_owner(&self, sock: &Socket) -> Result<()> {
        if sock.endpoint == self.id {
            Ok(())
        } else {
            Err(Error::WrongSocket)
        }
    }

    fn check_unknown(&self, sock: &Socket) -> Result<()> {
        self.check_owner(sock)?;
        match sock.kind {
            SocketKind::Unknown => Ok(()),
            _ => Err(Error::WrongSocket),
        }
    }

    fn listener(&self, sock: &Socket) -> Result<Address> {
        self.check_owner(sock)?;
        match sock.kind {
            SocketKind::ListenAccept { destination } => Ok(destination),
            _ => Err(Error::WrongSocket),
        }
    }

    fn connected(&self, sock: &Socket) -> Result<(Option<FourTuple>, Option<FourTuple>)> {
        self.check_owner(sock)?;
        match sock.kind {
            SocketKind::SendReceive { send, recv } => Ok((send, recv)),
            _ => Err(Error::WrongSocket),
        }
    }

    /// Check that connections with these options fit the device.
    fn check_options(&self, options: &ConnOptions) -> Result<()> {
        let frame_len = HEADER_LEN + DATA_HEADER_LEN + options.buffer_size;
        if options.window_log2 > ConnOptions::MAX_WINDOW_LOG2
            || options.buffer_size > u32::max_value() as usize
            || frame_len > self.device.personality().mtu()
        {
            return Err(Error::OutOfRange);
        }
        Ok(())
    }
}

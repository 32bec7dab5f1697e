//! The protocol engine.
//!
//! ## Structure
//!
//! An [`Endpoint`] owns one link [`Device`] and every connection reachable through it. Users hold
//! [`Socket`] handles and drive all processing through the socket operations of the endpoint, there
//! is no background activity. A socket is either unbound, a listener accepting new flows of one
//! destination, or a pair of connections for sending and receiving.
//!
//! Connections are unidirectional. The sending side of a flow keeps its segments until they are
//! acknowledged, the receiving side buffers the segments for the user and produces selective
//! acknowledgements. A bidirectional socket consists of a sending connection and a receiving
//! connection with swapped addresses.
//!
//! Connections are found through a two-level index: first by the destination address and port of a
//! flow, then by its source. All flows towards one destination share the first level entry, which
//! also holds the listen backlog when that destination was bound.
//!
//! ## Receiving
//!
//! Frames are taken from the device either when a socket operation needs them (event triggered) or
//! when the user calls [`Endpoint::poll_rx`]. Data frames of unknown flows to a listening
//! destination create a new socket in the backlog of the listener, to be picked up by `accept`.
//!
//! ## Sending
//!
//! Segments are queued by `send` and transmitted either immediately (event triggered) or by
//! [`Endpoint::poll_tx`]. How many segments and acknowledgements are transmitted at once is chosen
//! by the [traffic control](control/index.html) strategies of the endpoint.
//!
//! [`Endpoint`]: struct.Endpoint.html
//! [`Endpoint::poll_rx`]: struct.Endpoint.html#method.poll_rx
//! [`Endpoint::poll_tx`]: struct.Endpoint.html#method.poll_tx
//! [`Device`]: ../nic/trait.Device.html
//! [`Socket`]: struct.Socket.html
use core::fmt;
use std::collections::TryReserveError;

use crate::managed::hashtable;
use crate::storage::ring;

pub mod control;
mod connection;
mod endpoint;
mod socket;

#[cfg(test)]
mod tests;

pub use self::connection::{Address, FourTuple};
pub use self::endpoint::Endpoint;
pub use self::socket::{Socket, SocketKind};

/// The result type of the engine.
pub type Result<T> = core::result::Result<T, Error>;

/// The error type of the engine.
///
/// Use [`is_retryable`] to tell backpressure apart from failures.
///
/// [`is_retryable`]: #method.is_retryable
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Error {
    /// No data or no space right now.
    ///
    /// The operation had no effect and may succeed when called again later.
    TryAgain,

    /// An inbound connection was not admitted because the backlog was full.
    ///
    /// The peer is not notified, it will retransmit and may be admitted later.
    Rejected,

    /// The operation is not valid for the current state of the socket.
    ///
    /// Also returned when a socket is used with an endpoint that did not create it.
    WrongSocket,

    /// The socket has no connection for the requested direction.
    ///
    /// Also returned once the peer closed or denied the connection.
    NotConnected,

    /// An argument exceeds what the endpoint or its device supports.
    OutOfRange,

    /// Memory could not be allocated.
    ///
    /// All effects of the failed operation were undone.
    Exhausted,

    /// The destination is already bound by another socket.
    AlreadyBound,

    /// A connection of the same flow already exists.
    AlreadyConnected,

    /// The socket is already listening.
    AlreadyListening,

    /// The operation was not permitted by the device.
    ///
    /// Returned when queueing a received frame for transmission.
    Illegal,

    /// The flow index was in an unexpected state.
    Index,

    /// A connection queue was in an unexpected state.
    Queue,
}

impl Error {
    /// Check if the error is backpressure, not a failure.
    pub fn is_retryable(self) -> bool {
        match self {
            Error::TryAgain | Error::Rejected => true,
            _ => false,
        }
    }
}

/// A standard wrapper for a function implementing the traffic control traits.
///
/// Keeps the type alias overhead low by providing a single wrapper type that implements the
/// callback traits of the crate, where applicable.
pub struct FnHandler<F>(pub F);

/// Configuration of an endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Config {
    /// Receive from the device within `recv` and `accept`.
    ///
    /// Otherwise frames are only received by `poll_rx`.
    pub event_triggered_rx: bool,
    /// Transmit within `send` and `recv`.
    ///
    /// Otherwise queued segments and acknowledgements are only transmitted by `poll_tx`.
    pub event_triggered_tx: bool,
    /// The number of destinations buckets, as a power of two.
    pub dst_index_log2: u32,
    /// The number of source buckets per destination, as a power of two.
    pub src_index_log2: u32,
    /// The capacity of the stale queue of each connection, as a power of two.
    pub stale_log2: u32,
    /// The largest number of frames received in one poll.
    pub rx_batch: usize,
    /// Also create a connection for sending back to admitted peers.
    pub accept_return_path: bool,
}

/// Options of one connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConnOptions {
    /// Capacity of the transmit and receive queue, as a power of two.
    pub window_log2: u32,
    /// The largest payload of one segment.
    pub buffer_size: usize,
    /// The VLAN identifier of outgoing frames.
    pub vlan: Option<u16>,
    /// The priority of outgoing frames.
    pub priority: Option<u8>,
}

impl ConnOptions {
    /// The largest supported window.
    pub const MAX_WINDOW_LOG2: u32 = 20;
}

impl Default for Config {
    fn default() -> Self {
        Config {
            event_triggered_rx: true,
            event_triggered_tx: true,
            dst_index_log2: 10,
            src_index_log2: 6,
            stale_log2: 4,
            rx_batch: 64,
            accept_return_path: true,
        }
    }
}

impl Default for ConnOptions {
    fn default() -> Self {
        ConnOptions {
            window_log2: 6,
            buffer_size: 1024,
            vlan: None,
            priority: None,
        }
    }
}

/// Classify index failures.
///
/// Duplicates and missing entries are context dependent and matched by the caller where they are
/// expected, everything left is internal.
impl From<hashtable::Error> for Error {
    fn from(err: hashtable::Error) -> Self {
        match err {
            hashtable::Error::Exhausted => Error::Exhausted,
            hashtable::Error::AlreadyExists | hashtable::Error::NotFound => Error::Index,
        }
    }
}

/// Classify queue failures.
impl From<ring::Error> for Error {
    fn from(err: ring::Error) -> Self {
        match err {
            ring::Error::NoSlot | ring::Error::Empty => Error::TryAgain,
            ring::Error::Exhausted => Error::Exhausted,
            ring::Error::Fault => Error::Queue,
        }
    }
}

/// Can convert from a wire error.
///
/// This indicates some layer tried to operate on a frame but failed.
impl From<crate::wire::Error> for Error {
    fn from(_: crate::wire::Error) -> Self {
        Error::Illegal
    }
}

impl From<TryReserveError> for Error {
    fn from(_: TryReserveError) -> Self {
        Error::Exhausted
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::TryAgain => write!(f, "try again"),
            Error::Rejected => write!(f, "connection rejected"),
            Error::WrongSocket => write!(f, "wrong socket type"),
            Error::NotConnected => write!(f, "not connected"),
            Error::OutOfRange => write!(f, "argument out of range"),
            Error::Exhausted => write!(f, "out of memory"),
            Error::AlreadyBound => write!(f, "already bound"),
            Error::AlreadyConnected => write!(f, "already connected"),
            Error::AlreadyListening => write!(f, "already listening"),
            Error::Illegal => write!(f, "operation not permitted"),
            Error::Index => write!(f, "flow index error"),
            Error::Queue => write!(f, "connection queue error"),
        }
    }
}

impl std::error::Error for Error {}

//! Traffic control strategies.
//!
//! The engine does not decide on its own how much to transmit or acknowledge at once. Before every
//! transmission it presents a snapshot of the involved queues to a strategy, which answers with
//! limits for the following batch. Limits of `None` mean that the queue itself is the limit.
//!
//! Strategies are plain trait objects owned by the [`Endpoint`], carrying any state they need.
//! Closures can be used through [`FnHandler`]. The default strategy, [`Unlimited`], never limits
//! anything.
//!
//! [`Endpoint`]: ../struct.Endpoint.html
//! [`FnHandler`]: ../struct.FnHandler.html
//! [`Unlimited`]: struct.Unlimited.html
use crate::storage::RingQueue;

use super::FnHandler;

/// Occupancy of one connection queue.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct QueueState {
    /// Entries committed but not yet consumed.
    pub readable: usize,
    /// Entries that can still be reserved.
    pub available: usize,
    /// The total number of entries.
    pub capacity: usize,
}

/// The queues of a socket consulted before transmission.
///
/// Queues of connections the socket does not have are `None`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct TxQueues {
    /// Data segments of the send connection.
    pub send_tx: Option<QueueState>,
    /// Acknowledgements received for the send connection.
    pub send_rx: Option<QueueState>,
    /// Acknowledgements waiting to be sent by the receive connection.
    pub recv_tx: Option<QueueState>,
    /// Segments received by the receive connection.
    pub recv_rx: Option<QueueState>,
}

/// Which of the two outbound queues is drained first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Order {
    /// Acknowledgements of the receive connection first.
    AckFirst,
    /// Data of the send connection first.
    DataFirst,
}

/// The answer of a transmit strategy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TxDecision {
    /// The order of draining.
    pub order: Order,
    /// The largest number of acknowledgement frames to send.
    pub max_acks: Option<usize>,
    /// The largest number of data frames to send.
    pub max_data: Option<usize>,
}

/// The queues of a receive connection consulted before acknowledging.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct RxQueues {
    /// Received segments.
    pub rx: QueueState,
    /// Received duplicates of segments that were already acknowledged.
    pub stale: QueueState,
    /// Acknowledgements waiting to be sent.
    pub tx: QueueState,
}

/// The answer of a receive strategy.
///
/// Fresh acknowledgements cover segments received for the first time, stale acknowledgements
/// repeat an acknowledgement for duplicates. Slots count covered segments, packets count ACK
/// frames.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct RxDecision {
    /// The largest number of fresh segments to acknowledge, `None` for the receive queue.
    pub max_ack_slots: Option<usize>,
    /// The largest number of fresh ACK frames.
    pub max_ack_packets: Option<usize>,
    /// The largest number of stale segments to acknowledge, `None` for the stale queue.
    pub max_stale_slots: Option<usize>,
    /// The largest number of stale ACK frames.
    pub max_stale_packets: Option<usize>,
}

/// A strategy deciding on transmission batches.
pub trait TxControl {
    /// Choose order and limits of the next transmission.
    fn decide(&mut self, queues: &TxQueues) -> TxDecision;
}

/// A strategy deciding on acknowledgement batches.
pub trait RxControl {
    /// Choose the limits of the next acknowledgements.
    fn decide(&mut self, queues: &RxQueues) -> RxDecision;
}

/// Transmit and acknowledge everything, acknowledgements first.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Unlimited;

impl QueueState {
    /// Take a snapshot of a ring.
    pub fn of<C>(ring: &RingQueue<C>) -> Self {
        QueueState {
            readable: ring.readable(),
            available: ring.available(),
            capacity: ring.capacity(),
        }
    }
}

impl Default for TxDecision {
    fn default() -> Self {
        TxDecision {
            order: Order::AckFirst,
            max_acks: None,
            max_data: None,
        }
    }
}

impl TxControl for Unlimited {
    fn decide(&mut self, _: &TxQueues) -> TxDecision {
        TxDecision::default()
    }
}

impl RxControl for Unlimited {
    fn decide(&mut self, _: &RxQueues) -> RxDecision {
        RxDecision::default()
    }
}

impl<F> TxControl for FnHandler<F>
    where F: FnMut(&TxQueues) -> TxDecision
{
    fn decide(&mut self, queues: &TxQueues) -> TxDecision {
        (self.0)(queues)
    }
}

impl<F> RxControl for FnHandler<F>
    where F: FnMut(&RxQueues) -> RxDecision
{
    fn decide(&mut self, queues: &RxQueues) -> RxDecision {
        (self.0)(queues)
    }
}

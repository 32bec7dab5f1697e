//! Buffer management of connections.
//!
//! The [`RingQueue`] holds the segments of a connection in both directions and the pending
//! sockets of a listener. The [`Assembler`] remembers which segments of a flow have arrived.
//!
//! [`RingQueue`]: ring/struct.RingQueue.html
//! [`Assembler`]: assembler/struct.Assembler.html
pub mod assembler;
pub mod ring;

pub use self::assembler::Assembler;
pub use self::ring::RingQueue;

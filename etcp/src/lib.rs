//! A user-space reliable transport for fast, low-latency links.
//!
//! ## Table of contents
//!
//! This is also a recommended reading order but feel free to skip ahead, each chapter tries to be
//! somewhat self-contained.
//!
//! 1. [Design](#design-and-relevant-core-concepts)
//! 2. [The wire module](wire/index.html)
//!    1. [Overview of frame representations](wire/index.html#an-overview-over-frame-representations)
//!    1. [Layout](wire/index.html#layout)
//! 3. [The protocol engine](layer/index.html)
//!    1. [Receiving](layer/index.html#receiving)
//!    1. [Sending](layer/index.html#sending)
//!    1. [Traffic control](layer/control/index.html)
//! 4. [Network interfaces](nic/index.html)
//! 5. Internals
//!    1. [The managed module](managed/index.html)
//!    2. [The storage module](storage/index.html)
//!
//! ## Design and relevant core concepts
//!
//! ETCP sends its frames directly on the link, without a network layer in between. Flows are
//! identified by the link addresses of both hosts and a 32-bit port on each side. Every flow is
//! unidirectional: the sender numbers its segments, the receiver selectively acknowledges the
//! segments it got and the sender retransmits what is missing below the highest acknowledgement.
//!
//! All buffers of a connection are allocated when it is created. Each connection has a fixed
//! window of segments, a sender can not queue more segments than have not been acknowledged, a
//! receiver can not buffer more segments than the user has not read. Running out of room is never
//! a failure but reported as [`TryAgain`], after which the caller simply retries. The engine never
//! blocks and never runs in the background, all work happens within the calls of the user.
//!
//! How much is sent or acknowledged at once is left to a pluggable [traffic control] strategy.
//!
//! [`TryAgain`]: layer/enum.Error.html#variant.TryAgain
//! [traffic control]: layer/control/index.html
#![warn(missing_docs)]

#[macro_use] mod macros;
pub mod layer;
pub mod managed;
pub mod nic;
pub mod storage;
pub mod time;
pub mod wire;

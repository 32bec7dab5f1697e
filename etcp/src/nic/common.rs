//! Useful base types for implementing a nic.
use crate::layer::{Error, Result};
use crate::time::Instant;

use super::{Handle, Info, Link};

/// A handle representation allowing to set a flag for queueing a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EnqueueFlag {
    flag: FlagState,
    info: PacketInfo,
}

/// Frame meta data stored by value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PacketInfo {
    /// When the frame was received, or when it was handed to the device.
    pub timestamp: Instant,
    /// Link addressing of the frame.
    pub link: Link,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FlagState {
    NotPossible,
    SetTrue(bool),
}

impl EnqueueFlag {
    /// A handle of a frame that can not be sent.
    pub fn not_possible(info: PacketInfo) -> Self {
        EnqueueFlag {
            flag: FlagState::NotPossible,
            info,
        }
    }

    /// A handle of a frame that is sent when it is queued.
    pub fn set_true(info: PacketInfo) -> Self {
        EnqueueFlag {
            flag: FlagState::SetTrue(false),
            info,
        }
    }

    /// Check if the frame was queued for sending.
    pub fn was_sent(&self) -> bool {
        self.flag.was_sent()
    }

    /// The meta data, including link changes made by the sender.
    pub fn packet_info(&self) -> PacketInfo {
        self.info
    }
}

impl FlagState {
    fn was_sent(&self) -> bool {
        match self {
            FlagState::NotPossible => false,
            FlagState::SetTrue(b) => *b,
        }
    }

    fn queue(&mut self) -> Result<()> {
        match self {
            FlagState::NotPossible => Err(Error::Illegal),
            FlagState::SetTrue(b) => Ok(*b = true),
        }
    }
}

impl Handle for EnqueueFlag {
    fn queue(&mut self) -> Result<()> {
        self.flag.queue()
    }

    fn info(&self) -> &dyn Info {
        &self.info
    }

    fn set_link(&mut self, link: Link) {
        self.info.link = link;
    }
}

impl Info for PacketInfo {
    fn timestamp(&self) -> Instant {
        self.timestamp
    }

    fn link(&self) -> Link {
        self.link
    }
}

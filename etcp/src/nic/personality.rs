/// A general description of a device.
///
/// The interaction with these happens purely via methods. This leaves the implementation open to
/// additions in the future.
#[derive(Clone, Debug)]
pub struct Personality {
    mtu: usize,
    capabilities: Capabilities,
}

/// Operations supported natively by the link hardware.
///
/// The usage for a `Device` is simply to instantiate a baseline with no support and then adjust
/// those for which support can be provided.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Capabilities {
    tx_timestamps: bool,
    rx_timestamps: bool,
    vlan: bool,
}

impl Personality {
    /// The default maximum frame length, a standard Ethernet payload.
    pub const DEFAULT_MTU: usize = 1500;

    /// A device without any hardware support and the standard frame length.
    pub fn baseline() -> Self {
        Personality {
            mtu: Self::DEFAULT_MTU,
            capabilities: Capabilities::no_support(),
        }
    }

    /// Change the largest frame the device transmits.
    pub fn with_mtu(self, mtu: usize) -> Self {
        Personality { mtu, ..self }
    }

    /// The largest frame the device transmits.
    pub fn mtu(&self) -> usize {
        self.mtu
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn capabilities_mut(&mut self) -> &mut Capabilities {
        &mut self.capabilities
    }
}

impl Capabilities {
    /// No hardware time stamps and no VLAN tagging.
    pub fn no_support() -> Self {
        Capabilities::default()
    }

    /// If the device records the time a frame actually left the wire.
    pub fn tx_timestamps(&self) -> bool {
        self.tx_timestamps
    }

    /// If the device records the time a frame arrived from the wire.
    pub fn rx_timestamps(&self) -> bool {
        self.rx_timestamps
    }

    /// If the device can tag frames with VLAN and priority.
    pub fn vlan(&self) -> bool {
        self.vlan
    }

    pub fn set_tx_timestamps(&mut self, value: bool) {
        self.tx_timestamps = value;
    }

    pub fn set_rx_timestamps(&mut self, value: bool) {
        self.rx_timestamps = value;
    }

    pub fn set_vlan(&mut self, value: bool) {
        self.vlan = value;
    }
}

use core::fmt;

/// The error type for parsing of ETCP frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Error {
    /// An incoming frame could not be parsed because it was shorter than assumed.
    ///
    /// The frame may be shorter than a fixed header, or a length or count field points beyond the
    /// end of the received data.
    Truncated,

    /// An incoming frame could not be recognized and was dropped.
    ///
    /// E.g. a frame without the `ETCP` magic or with an unknown message type. On a shared link
    /// this is the normal outcome for traffic of other protocols.
    Unrecognized,

    /// An incoming frame was recognized but was self-contradictory.
    ///
    /// Example: an ACK claiming more SACK fields than any ACK may carry.
    Malformed,

    /// The frame was recognized but speaks a protocol version we do not implement.
    Unsupported,
}

/// The result type for the wire module.
pub type Result<T> = core::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Truncated    => write!(f, "truncated frame"),
            Error::Unrecognized => write!(f, "unrecognized frame"),
            Error::Malformed    => write!(f, "malformed frame"),
            Error::Unsupported  => write!(f, "unsupported protocol version"),
        }
    }
}

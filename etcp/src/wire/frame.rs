use super::{Error, Result};
use super::data::{self, data_header, DATA_HEADER_LEN};
use super::header::{self, etcp_header, MessageType, HEADER_LEN};
use super::sack::{self, sack_header};

/// The part of a message following its header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Body {
    /// CON, DAT and FIN carry a segment.
    Data(data::Repr),
    /// ACK and DEN carry selective acknowledgements.
    Sack(sack::Repr),
    /// ERR has no body.
    Empty,
}

/// A complete message: header and body, without the segment payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Repr {
    pub header: header::Repr,
    pub body: Body,
}

impl Repr {
    /// Parse a whole link frame.
    ///
    /// The body layout must agree with the message type, otherwise the frame is `Malformed`.
    pub fn parse(bytes: &[u8]) -> Result<Repr> {
        let frame = etcp_header::new_checked(bytes)?;
        let header = header::Repr::parse(frame)?;

        let body = match header.kind {
            MessageType::Con | MessageType::Dat | MessageType::Fin => {
                let data = data_header::new_checked(frame.payload_slice())?;
                Body::Data(data::Repr::parse(data)?)
            },
            MessageType::Ack | MessageType::Den => {
                let sack = sack_header::new_checked(frame.payload_slice())?;
                Body::Sack(sack::Repr::parse(sack)?)
            },
            MessageType::Error => Body::Empty,
            MessageType::Unknown(_) => return Err(Error::Unrecognized),
        };

        Ok(Repr { header, body })
    }

    /// The length of the message, without the segment payload.
    pub fn buffer_len(&self) -> usize {
        HEADER_LEN + match &self.body {
            Body::Data(data) => data.buffer_len(),
            Body::Sack(sack) => sack.buffer_len(),
            Body::Empty => 0,
        }
    }

    /// The length of the complete message, including the segment payload.
    pub fn frame_len(&self) -> usize {
        self.buffer_len() + match &self.body {
            Body::Data(data) => data.len as usize,
            _ => 0,
        }
    }

    /// Emit the header and body, leaving the payload bytes untouched.
    ///
    /// # Panics
    /// This function panics if the buffer is shorter than `buffer_len()`.
    pub fn emit(&self, bytes: &mut [u8]) {
        let frame = etcp_header::new_unchecked_mut(bytes);
        self.header.emit(frame);
        match &self.body {
            Body::Data(data) => data.emit(data_header::new_unchecked_mut(frame.payload_mut_slice())),
            Body::Sack(sack) => sack.emit(sack_header::new_unchecked_mut(frame.payload_mut_slice())),
            Body::Empty => (),
        }
    }

    /// Get the segment payload of a parsed data message.
    pub fn payload<'a>(&self, bytes: &'a [u8]) -> &'a [u8] {
        match &self.body {
            Body::Data(data) => {
                let start = HEADER_LEN + DATA_HEADER_LEN;
                &bytes[start..start + data.len as usize]
            },
            _ => &[],
        }
    }

    /// Get the mutable segment payload of a data message.
    pub fn payload_mut<'a>(&self, bytes: &'a mut [u8]) -> &'a mut [u8] {
        match &self.body {
            Body::Data(data) => {
                let start = HEADER_LEN + DATA_HEADER_LEN;
                &mut bytes[start..start + data.len as usize]
            },
            _ => &mut [],
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::wire::Timing;

    fn dat(len: u32) -> Repr {
        Repr {
            header: header::Repr {
                kind: MessageType::Dat,
                src_port: 2000,
                dst_port: 1000,
                timing: Timing::default(),
            },
            body: Body::Data(data::Repr { seq: 42, len, attempts: 1 }),
        }
    }

    #[test]
    fn data_message() {
        let repr = dat(3);
        assert_eq!(repr.buffer_len(), 64);
        assert_eq!(repr.frame_len(), 67);

        let mut bytes = vec![0; repr.frame_len()];
        repr.emit(&mut bytes);
        repr.payload_mut(&mut bytes).copy_from_slice(b"abc");

        let parsed = Repr::parse(&bytes).unwrap();
        assert_eq!(parsed, repr);
        assert_eq!(parsed.payload(&bytes), b"abc");
    }

    #[test]
    fn body_must_match_type() {
        let repr = dat(0);
        let mut bytes = vec![0; repr.buffer_len()];
        repr.emit(&mut bytes);
        assert!(Repr::parse(&bytes).is_ok());

        // An ACK whose body is only as long as a data header has a truncated field list.
        let mut ack = repr;
        ack.header.kind = MessageType::Ack;
        ack.header.emit(etcp_header::new_unchecked_mut(&mut bytes));
        // The sequence number 42 is read as the base, count byte is zero.
        assert!(Repr::parse(&bytes).is_ok());
        bytes[HEADER_LEN + 8] = 1;
        assert_eq!(Repr::parse(&bytes), Err(Error::Truncated));

        assert_eq!(Repr::parse(&bytes[..HEADER_LEN + 4]), Err(Error::Truncated));
    }

    #[test]
    fn payload_must_fit() {
        let repr = dat(10);
        let mut bytes = vec![0; repr.frame_len()];
        repr.emit(&mut bytes);
        assert_eq!(Repr::parse(&bytes[..repr.frame_len() - 1]), Err(Error::Truncated));
    }
}

/*! Low-level frame access and construction.

# An overview over frame representations

The `wire` module deals with the frame *representation*. It provides two levels of
functionality.

 * First, it provides functions to extract fields from sequences of octets, and to insert fields
   into sequences of octets. This happens in the lowercase structures e.g. [`etcp_header`] or
   [`sack_header`].
 * Second, it provides a compact, high-level representation of header data that can be created from
   parsing and emitted into a sequence of octets. This happens through the `Repr` family of structs,
   e.g. [`HeaderRepr`] or [`SackRepr`]. The [`FrameRepr`] combines a header with the body its
   message type requires.

[`etcp_header`]: struct.etcp_header.html
[`sack_header`]: struct.sack_header.html
[`HeaderRepr`]: struct.HeaderRepr.html
[`SackRepr`]: struct.SackRepr.html
[`FrameRepr`]: struct.FrameRepr.html

# Layout

All fields are in network byte order.

```text
header   | fulltype: u64 | src port: u32 | dst port: u32 | timing: 4 x u64 |   48 bytes
data     | seq: u64 | len: u32 | tx attempts: u32 | payload ...             |   16 bytes
sack     | base seq: u64 | count: u8 | reserved: 24 bits | rx window: u32   |   16 bytes
field    | offset: u32 | count: u32 | timing: 4 x u64                       |   40 bytes
```

The full type consists of the magic `ETCP` in the upper 32 bits, the protocol version in the next 8
bits and the message type in the low 24 bits. CON, DAT and FIN messages carry a data header, ACK
and DEN messages a SACK header followed by up to [`MAX_SACK_FIELDS`] fields.

The `lowercase::check_len()` methods guarantee, when they return `Ok(())`, that no field accessor
will panic. In the `Repr` family of data structures, the `Repr::parse()` method never panics and the
`Repr::emit()` method never panics as long as the underlying buffer is at least
`Repr::buffer_len()` octets long.

[`MAX_SACK_FIELDS`]: constant.MAX_SACK_FIELDS.html

# Examples

To emit a data header into an octet buffer, and then parse it back:

```rust
use etcp::wire::*;
let repr = DataRepr { seq: 42, len: 0, attempts: 1 };
let mut buffer = vec![0; repr.buffer_len()];
{ // emission
    let header = data_header::new_unchecked_mut(&mut buffer);
    repr.emit(header);
}
{ // parsing
    let header = data_header::new_checked(&buffer)
        .expect("truncated header");
    let parsed = DataRepr::parse(header)
        .expect("malformed header");
    assert_eq!(repr, parsed);
}
```
*/
#![allow(missing_docs)]

mod field {
    pub(crate) type Field = ::core::ops::Range<usize>;
    pub(crate) type Rest  = ::core::ops::RangeFrom<usize>;
}

mod data;
mod error;
mod frame;
mod header;
mod sack;
mod timing;

pub use self::error::{
    Error,
    Result};

pub use self::timing::{
    timing_block,
    Timing,
    TIMING_LEN};

pub use self::header::{
    etcp_header,
    fulltype,
    MessageType,
    Repr as HeaderRepr,
    HEADER_LEN,
    MAGIC,
    VERSION};

pub use self::data::{
    data_header,
    Repr as DataRepr,
    DATA_HEADER_LEN};

pub use self::sack::{
    sack_header,
    sack_field,
    Field as SackField,
    Repr as SackRepr,
    MAX_SACK_FIELDS,
    SACK_FIELD_LEN,
    SACK_HEADER_LEN};

pub use self::frame::{
    Body,
    Repr as FrameRepr};

/// The length of the largest possible acknowledgement message.
pub const MAX_ACK_LEN: usize = HEADER_LEN + SACK_HEADER_LEN + MAX_SACK_FIELDS*SACK_FIELD_LEN;

//! Owning containers used by the protocol engine.
//!
//! The flow index is a two-level [`HashTable`], first keyed by the destination of a flow and then
//! by its source. Both levels use the same table with 128-bit keys.
//!
//! [`HashTable`]: struct.HashTable.html
pub mod hashtable;
mod siphash;

pub use self::hashtable::{HashTable, Key};
pub use self::siphash::SipHasher;

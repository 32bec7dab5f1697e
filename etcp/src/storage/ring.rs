//! A fixed capacity ring of reusable slots.
//!
//! Every slot goes through the same lifecycle:
//!
//! ```text
//! Free -> reserve -> (write) -> commit -> (readable) -> pull -> (read) -> release -> Free
//!                            \-> abandon -> skipped by the reader ----------------/
//! ```
//!
//! Three monotonically increasing cursors describe the ring. `wr` is the next slot handed to a
//! writer, `rd` the next slot handed to a reader and `rel` the oldest slot not yet released. Slots
//! may be released in any order, but a slot only becomes writable again once all slots before it
//! have been released as well. This lets a sender keep a transmitted segment around until its
//! acknowledgement arrives while later segments are acknowledged first.
//!
//! Readers consume in commit order of the slot positions. A slot reserved but never committed
//! blocks readers behind it until it is committed or abandoned.
use core::fmt;

/// A ring of `2^log2` slots with a buffer of type `C` each.
pub struct RingQueue<C> {
    slots: Box<[Slot<C>]>,
    mask: u64,
    rel: u64,
    rd: u64,
    wr: u64,
    readable: usize,
}

/// The error type of ring operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Error {
    /// All slots are reserved or unreleased.
    NoSlot,

    /// No committed slot is available for reading.
    Empty,

    /// A slot was used in a state that does not permit the operation.
    ///
    /// For example releasing a slot twice, or committing a slot that was not reserved.
    Fault,

    /// Storage for the ring could not be allocated.
    Exhausted,
}

struct Slot<C> {
    state: State,
    len: usize,
    buffer: C,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Free,
    Writing,
    Committed,
    Reading,
    Abandoned,
    Released,
}

impl<C> RingQueue<C> {
    /// Create a ring of `2^log2` slots, each initialized with a buffer from `factory`.
    pub fn new(log2: u32, mut factory: impl FnMut() -> Result<C, Error>) -> Result<Self, Error> {
        let count = 1usize.checked_shl(log2)
            .filter(|&count| count <= (u32::max_value() as usize))
            .ok_or(Error::Exhausted)?;

        let mut slots = Vec::new();
        slots.try_reserve_exact(count)
            .map_err(|_| Error::Exhausted)?;
        for _ in 0..count {
            slots.push(Slot {
                state: State::Free,
                len: 0,
                buffer: factory()?,
            });
        }

        Ok(RingQueue {
            slots: slots.into_boxed_slice(),
            mask: (count - 1) as u64,
            rel: 0,
            rd: 0,
            wr: 0,
            readable: 0,
        })
    }

    /// The total number of slots.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// The number of slots that can currently be reserved for writing.
    pub fn available(&self) -> usize {
        self.capacity() - (self.wr - self.rel) as usize
    }

    /// The number of committed slots that were not yet pulled.
    pub fn readable(&self) -> usize {
        self.readable
    }

    /// Reserve the next slot for writing.
    ///
    /// Fails with `NoSlot` exactly when `available()` is zero. The reservation is invisible to
    /// readers until it is committed.
    pub fn reserve(&mut self) -> Result<(usize, &mut C), Error> {
        if self.available() == 0 {
            return Err(Error::NoSlot);
        }

        let index = self.index(self.wr);
        let slot = &mut self.slots[index];
        if slot.state != State::Free {
            return Err(Error::Fault);
        }

        slot.state = State::Writing;
        slot.len = 0;
        self.wr += 1;
        Ok((index, &mut slot.buffer))
    }

    /// Publish a reserved slot to readers, with the number of bytes written.
    pub fn commit(&mut self, index: usize, len: usize) -> Result<(), Error> {
        let slot = self.slots.get_mut(index).ok_or(Error::Fault)?;
        if slot.state != State::Writing {
            return Err(Error::Fault);
        }

        slot.state = State::Committed;
        slot.len = len;
        self.readable += 1;
        Ok(())
    }

    /// Give up a write reservation without ever committing it.
    ///
    /// The slot is reclaimed once the read cursor reaches it.
    pub fn abandon(&mut self, index: usize) -> Result<(), Error> {
        let slot = self.slots.get_mut(index).ok_or(Error::Fault)?;
        if slot.state != State::Writing {
            return Err(Error::Fault);
        }

        slot.state = State::Abandoned;
        self.skip_abandoned();
        Ok(())
    }

    /// Inspect the next readable slot without taking it.
    pub fn peek(&self) -> Result<(usize, &C, usize), Error> {
        if self.rd == self.wr {
            return Err(Error::Empty);
        }

        let index = self.index(self.rd);
        let slot = &self.slots[index];
        match slot.state {
            State::Committed => Ok((index, &slot.buffer, slot.len)),
            _ => Err(Error::Empty),
        }
    }

    /// Take the next readable slot.
    ///
    /// The slot stays reserved for reading until it is released.
    pub fn pull(&mut self) -> Result<(usize, &C, usize), Error> {
        let index = self.peek()?.0;
        self.slots[index].state = State::Reading;
        self.readable -= 1;
        self.rd += 1;
        self.skip_abandoned();

        let slot = &self.slots[index];
        Ok((index, &slot.buffer, slot.len))
    }

    /// Access a slot held for reading.
    pub fn slot(&self, index: usize) -> Result<(&C, usize), Error> {
        match self.slots.get(index) {
            Some(slot) if slot.state == State::Reading => Ok((&slot.buffer, slot.len)),
            _ => Err(Error::Fault),
        }
    }

    /// Mutably access a slot held for reading.
    pub fn slot_mut(&mut self, index: usize) -> Result<(&mut C, usize), Error> {
        match self.slots.get_mut(index) {
            Some(slot) if slot.state == State::Reading => Ok((&mut slot.buffer, slot.len)),
            _ => Err(Error::Fault),
        }
    }

    /// Mutably access a slot reserved for writing.
    pub fn reserved_mut(&mut self, index: usize) -> Result<&mut C, Error> {
        match self.slots.get_mut(index) {
            Some(slot) if slot.state == State::Writing => Ok(&mut slot.buffer),
            _ => Err(Error::Fault),
        }
    }

    /// Hand a slot held for reading back to the ring.
    ///
    /// Releasing twice or releasing a slot that was never pulled is a `Fault`.
    pub fn release(&mut self, index: usize) -> Result<(), Error> {
        let slot = self.slots.get_mut(index).ok_or(Error::Fault)?;
        if slot.state != State::Reading {
            return Err(Error::Fault);
        }

        slot.state = State::Released;
        self.reclaim();
        Ok(())
    }

    /// Iterate over committed, unpulled slots in read order.
    pub fn iter_readable_mut(&mut self) -> impl Iterator<Item=(usize, &mut C, usize)> + '_ {
        let start = self.index(self.rd);
        let count = (self.wr - self.rd) as usize;
        let (front, back) = self.slots.split_at_mut(start);

        let back = back.iter_mut()
            .enumerate()
            .map(move |(i, slot)| (start + i, slot));
        let front = front.iter_mut()
            .enumerate();

        back.chain(front)
            .take(count)
            .filter_map(|(index, slot)| match slot.state {
                State::Committed => Some((index, &mut slot.buffer, slot.len)),
                _ => None,
            })
    }

    fn index(&self, cursor: u64) -> usize {
        (cursor & self.mask) as usize
    }

    /// Move the read cursor over abandoned slots.
    fn skip_abandoned(&mut self) {
        while self.rd != self.wr {
            let index = self.index(self.rd);
            if self.slots[index].state != State::Abandoned {
                break;
            }
            self.slots[index].state = State::Released;
            self.rd += 1;
        }

        self.reclaim();
    }

    /// Move the release cursor over released slots.
    fn reclaim(&mut self) {
        while self.rel != self.rd {
            let index = self.index(self.rel);
            if self.slots[index].state != State::Released {
                break;
            }
            self.slots[index].state = State::Free;
            self.rel += 1;
        }
    }
}

impl RingQueue<Vec<u8>> {
    /// Create a ring of `2^log2` zeroed byte buffers of `slot_size` bytes each.
    pub fn with_slot_size(log2: u32, slot_size: usize) -> Result<Self, Error> {
        RingQueue::new(log2, || {
            let mut buffer = Vec::new();
            buffer.try_reserve_exact(slot_size)
                .map_err(|_| Error::Exhausted)?;
            buffer.resize(slot_size, 0);
            Ok(buffer)
        })
    }
}

impl<C> fmt::Debug for RingQueue<C> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("RingQueue")
            .field("capacity", &self.capacity())
            .field("readable", &self.readable)
            .field("available", &self.available())
            .finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::NoSlot => write!(f, "no slot available"),
            Error::Empty => write!(f, "queue empty"),
            Error::Fault => write!(f, "slot in wrong state"),
            Error::Exhausted => write!(f, "out of memory"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring(log2: u32) -> RingQueue<Vec<u8>> {
        RingQueue::with_slot_size(log2, 16).unwrap()
    }

    fn write(ring: &mut RingQueue<Vec<u8>>, byte: u8) -> usize {
        let (index, buffer) = ring.reserve().unwrap();
        buffer[0] = byte;
        ring.commit(index, 1).unwrap();
        index
    }

    #[test]
    fn reserve_fails_when_full() {
        let mut ring = ring(2);
        assert_eq!(ring.capacity(), 4);
        for i in 0..4 {
            assert_eq!(ring.available(), 4 - i);
            assert!(ring.reserve().is_ok());
        }
        assert_eq!(ring.available(), 0);
        assert_eq!(ring.reserve().err(), Some(Error::NoSlot));
    }

    #[test]
    fn counts_follow_lifecycle() {
        let mut ring = ring(2);
        let (index, _) = ring.reserve().unwrap();
        assert_eq!(ring.readable(), 0);
        assert_eq!(ring.peek().err(), Some(Error::Empty));
        ring.reserved_mut(index).unwrap()[0] = 7;

        ring.commit(index, 5).unwrap();
        assert_eq!(ring.readable(), 1);
        assert_eq!(ring.available(), 3);

        let (pulled, buffer, len) = ring.pull().unwrap();
        assert_eq!((pulled, buffer[0], len), (index, 7, 5));
        assert!(ring.reserved_mut(index).is_err());
        assert_eq!(ring.readable(), 0);
        assert_eq!(ring.available(), 3);

        ring.release(index).unwrap();
        assert_eq!(ring.available(), 4);
    }

    #[test]
    fn fifo_order() {
        let mut ring = ring(2);
        write(&mut ring, 1);
        write(&mut ring, 2);
        assert_eq!(ring.peek().unwrap().1[0], 1);
        let (first, buffer, _) = ring.pull().unwrap();
        assert_eq!(buffer[0], 1);
        let (second, buffer, _) = ring.pull().unwrap();
        assert_eq!(buffer[0], 2);
        ring.release(first).unwrap();
        ring.release(second).unwrap();
        assert_eq!(ring.pull().err(), Some(Error::Empty));
    }

    #[test]
    fn faults() {
        let mut ring = ring(1);
        assert_eq!(ring.commit(0, 1), Err(Error::Fault));
        assert_eq!(ring.release(0), Err(Error::Fault));
        assert_eq!(ring.commit(7, 1), Err(Error::Fault));

        let index = write(&mut ring, 0);
        assert_eq!(ring.commit(index, 1), Err(Error::Fault));
        assert_eq!(ring.release(index), Err(Error::Fault));

        ring.pull().unwrap();
        assert_eq!(ring.release(index), Ok(()));
        assert_eq!(ring.release(index), Err(Error::Fault));
    }

    #[test]
    fn release_out_of_order() {
        let mut ring = ring(2);
        for i in 0..4 {
            write(&mut ring, i);
        }
        let pulled: Vec<_> = (0..4).map(|_| ring.pull().unwrap().0).collect();
        assert_eq!(ring.available(), 0);

        // Later slots stay unavailable until the first one is released.
        ring.release(pulled[2]).unwrap();
        ring.release(pulled[1]).unwrap();
        assert_eq!(ring.available(), 0);
        assert!(ring.slot_mut(pulled[0]).is_ok());
        assert!(ring.slot_mut(pulled[1]).is_err());

        ring.release(pulled[0]).unwrap();
        assert_eq!(ring.available(), 3);
        ring.release(pulled[3]).unwrap();
        assert_eq!(ring.available(), 4);
    }

    #[test]
    fn abandoned_slot_is_reclaimed() {
        let mut ring = ring(1);
        let (first, _) = ring.reserve().unwrap();
        let second = {
            let (index, _) = ring.reserve().unwrap();
            index
        };

        ring.commit(second, 1).unwrap();
        // The uncommitted head hides the committed second slot.
        assert_eq!(ring.readable(), 1);
        assert_eq!(ring.peek().err(), Some(Error::Empty));

        ring.abandon(first).unwrap();
        assert_eq!(ring.available(), 1);
        let (index, _, _) = ring.pull().unwrap();
        assert_eq!(index, second);
        ring.release(index).unwrap();
        assert_eq!(ring.available(), 2);
    }

    #[test]
    fn iterate_readable() {
        let mut ring = ring(2);
        // Wrap around the end of the slot array.
        for i in 0..3 {
            write(&mut ring, i);
            let (index, _, _) = ring.pull().unwrap();
            ring.release(index).unwrap();
        }
        for i in 10..13 {
            write(&mut ring, i);
        }

        let mut seen = Vec::new();
        for (index, buffer, len) in ring.iter_readable_mut() {
            seen.push((index, buffer[0], len));
            buffer[1] = 1;
        }
        assert_eq!(seen, [(3, 10, 1), (0, 11, 1), (1, 12, 1)]);
        assert_eq!(ring.peek().unwrap().1[1], 1);
    }
}

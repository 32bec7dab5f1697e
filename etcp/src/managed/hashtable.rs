//! A chained hash table with a fixed bucket count.
//!
//! ## Design
//!
//! There is no internal way to re-allocate the bucket array, the bucket count is chosen at
//! construction as a power of two. The table never reports itself full, instead an overloaded
//! table degrades to longer chains. The entry count is only tracked for diagnostics.
//!
//! Chains are not boxed linked lists but links between entries of a single node arena. A removed
//! node is put on a free list and reused by the next insertion, so a table with a stable number of
//! flows stops allocating after warm-up. Removing a node from the middle of a chain relinks its
//! predecessor to its successor.
//!
//! Keys are 128 bits wide, split into two 64 bit halves. For the flow index these are the address
//! and the port of one side of a connection.
use core::fmt;
use core::mem;

use super::siphash::SipHasher;

/// A 128-bit key of the table.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Key {
    /// The high half, by convention an address.
    pub hi: u64,
    /// The low half, by convention a port.
    pub lo: u64,
}

/// A hash table mapping 128-bit keys to values.
pub struct HashTable<V> {
    /// The head node of each chain.
    heads: Box<[Option<usize>]>,
    /// The node arena, containing used and free nodes.
    nodes: Vec<Node<V>>,
    /// Head of the list of free nodes.
    free: Option<usize>,
    /// Number of live entries.
    count: usize,
    log2: u32,
    hasher: SipHasher,
}

/// The error type of table operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Error {
    /// An entry with the same key was already present.
    ///
    /// The existing entry was not modified.
    AlreadyExists,

    /// No entry with the requested key exists.
    NotFound,

    /// Memory for the bucket array or a new node could not be allocated.
    Exhausted,
}

enum Node<V> {
    Used {
        key: Key,
        value: V,
        next: Option<usize>,
    },
    Free {
        next: Option<usize>,
    },
}

/// Iterator over the live entries of a table, in bucket and chain order.
pub struct Iter<'a, V> {
    nodes: core::slice::Iter<'a, Node<V>>,
}

impl Key {
    /// Create a key from its two halves.
    pub const fn new(hi: u64, lo: u64) -> Self {
        Key { hi, lo }
    }
}

impl<V> HashTable<V> {
    /// Create a table with `2^log2` buckets and a random hash key.
    pub fn new(log2: u32) -> Result<Self, Error> {
        Self::with_hasher(log2, SipHasher::from_std_hash())
    }

    /// Create a table with `2^log2` buckets and a chosen hash function key.
    pub fn with_hasher(log2: u32, hasher: SipHasher) -> Result<Self, Error> {
        let buckets = 1usize.checked_shl(log2)
            .ok_or(Error::Exhausted)?;
        let mut heads = Vec::new();
        heads.try_reserve_exact(buckets)
            .map_err(|_| Error::Exhausted)?;
        heads.resize(buckets, None);

        Ok(HashTable {
            heads: heads.into_boxed_slice(),
            nodes: Vec::new(),
            free: None,
            count: 0,
            log2,
            hasher,
        })
    }

    /// The number of live entries.
    pub fn len(&self) -> usize {
        self.count
    }

    /// Check if the table has no live entries.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// The number of buckets, as a power of two.
    pub fn buckets_log2(&self) -> u32 {
        self.log2
    }

    /// Insert a value unless its key is already present.
    ///
    /// On `Err(AlreadyExists)` the rejected value is dropped and the table is unchanged.
    pub fn insert_if_absent(&mut self, key: Key, value: V) -> Result<(), Error> {
        let bucket = self.bucket(&key);

        let mut tail = None;
        let mut cursor = self.heads[bucket];
        while let Some(idx) = cursor {
            match &self.nodes[idx] {
                Node::Used { key: other, .. } if *other == key => {
                    return Err(Error::AlreadyExists);
                },
                Node::Used { next, .. } => {
                    tail = Some(idx);
                    cursor = *next;
                },
                Node::Free { .. } => unreachable!("free node linked into a bucket chain"),
            }
        }

        let idx = self.alloc(Node::Used { key, value, next: None })?;
        match tail {
            None => self.heads[bucket] = Some(idx),
            Some(tail) => self.set_next(tail, Some(idx)),
        }

        self.count += 1;
        Ok(())
    }

    /// Returns a reference to the value corresponding to the key.
    pub fn get(&self, key: &Key) -> Option<&V> {
        let idx = self.find(key)?.1;
        match &self.nodes[idx] {
            Node::Used { value, .. } => Some(value),
            Node::Free { .. } => None,
        }
    }

    /// Returns a mutable reference to the value corresponding to the key.
    pub fn get_mut(&mut self, key: &Key) -> Option<&mut V> {
        let idx = self.find(key)?.1;
        match &mut self.nodes[idx] {
            Node::Used { value, .. } => Some(value),
            Node::Free { .. } => None,
        }
    }

    /// Check if an entry for the key exists.
    pub fn contains_key(&self, key: &Key) -> bool {
        self.find(key).is_some()
    }

    /// Remove the entry of a key, returning ownership of its value.
    pub fn remove(&mut self, key: &Key) -> Result<V, Error> {
        let (prev, idx) = self.find(key).ok_or(Error::NotFound)?;

        let freed = Node::Free { next: self.free };
        let (value, next) = match mem::replace(&mut self.nodes[idx], freed) {
            Node::Used { value, next, .. } => (value, next),
            Node::Free { .. } => unreachable!("found a free node by key"),
        };
        self.free = Some(idx);

        match prev {
            None => {
                let bucket = self.bucket(key);
                self.heads[bucket] = next;
            },
            Some(prev) => self.set_next(prev, next),
        }

        self.count -= 1;
        Ok(value)
    }

    /// Iterate over all live entries.
    pub fn iter(&self) -> Iter<'_, V> {
        Iter { nodes: self.nodes.iter() }
    }

    /// Tear down the table, handing every live entry to `cleanup`.
    ///
    /// The callback is called exactly once per live entry, in unspecified order, and never for an
    /// empty table. Simply dropping the table drops all values instead.
    pub fn destroy_with(self, mut cleanup: impl FnMut(&Key, V)) {
        for node in self.nodes.into_iter() {
            if let Node::Used { key, value, .. } = node {
                cleanup(&key, value);
            }
        }
    }

    fn bucket(&self, key: &Key) -> usize {
        let mask = (1u64 << self.log2) - 1;
        (self.hasher.hash(key) & mask) as usize
    }

    /// Find a key, returning the node index of its predecessor in the chain and its own.
    fn find(&self, key: &Key) -> Option<(Option<usize>, usize)> {
        let mut prev = None;
        let mut cursor = self.heads[self.bucket(key)];
        while let Some(idx) = cursor {
            match &self.nodes[idx] {
                Node::Used { key: other, .. } if other == key => return Some((prev, idx)),
                Node::Used { next, .. } => {
                    prev = Some(idx);
                    cursor = *next;
                },
                Node::Free { .. } => return None,
            }
        }
        None
    }

    fn set_next(&mut self, idx: usize, link: Option<usize>) {
        if let Node::Used { next, .. } = &mut self.nodes[idx] {
            *next = link;
        }
    }

    fn alloc(&mut self, node: Node<V>) -> Result<usize, Error> {
        if let Some(idx) = self.free {
            self.free = match &self.nodes[idx] {
                Node::Free { next } => *next,
                Node::Used { .. } => unreachable!("used node on the free list"),
            };
            self.nodes[idx] = node;
            return Ok(idx);
        }

        self.nodes.try_reserve(1)
            .map_err(|_| Error::Exhausted)?;
        self.nodes.push(node);
        Ok(self.nodes.len() - 1)
    }
}

impl<'a, V> Iterator for Iter<'a, V> {
    type Item = (&'a Key, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.nodes.next()? {
                Node::Used { key, value, .. } => return Some((key, value)),
                Node::Free { .. } => continue,
            }
        }
    }
}

impl<V> fmt::Debug for HashTable<V> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("HashTable")
            .field("buckets_log2", &self.log2)
            .field("count", &self.count)
            .finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::AlreadyExists => write!(f, "key already exists"),
            Error::NotFound => write!(f, "key not found"),
            Error::Exhausted => write!(f, "out of memory"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn table(log2: u32) -> HashTable<i64> {
        HashTable::with_hasher(log2, SipHasher::from_key(7, 11)).unwrap()
    }

    #[test]
    fn create() {
        let table = table(16);
        assert_eq!(table.buckets_log2(), 16);
        assert_eq!(table.heads.len(), 65536);
        assert!(table.is_empty());
    }

    #[test]
    fn destroy_empty_never_calls_cleanup() {
        let table = table(16);
        table.destroy_with(|_, _| panic!("Should not get here!"));
    }

    #[test]
    fn destroy_hands_out_entries() {
        let mut table = table(16);
        let key = Key::new(1, 1);
        assert_eq!(table.insert_if_absent(key, 3), Ok(()));

        let calls = Cell::new(0);
        table.destroy_with(|k, v| {
            assert_eq!(*k, key);
            assert_eq!(v, 3);
            calls.set(calls.get() + 1);
        });
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn get_after_insert() {
        let mut table = table(16);
        let key = Key::new(1, 1);
        assert_eq!(table.insert_if_absent(key, 3), Ok(()));
        assert_eq!(table.get(&key), Some(&3));
        assert_eq!(table.get(&Key::new(1, 2)), None);
        assert_eq!(table.get(&Key::new(2, 1)), None);
    }

    #[test]
    fn duplicate_insert_keeps_value() {
        let mut table = table(4);
        let key = Key::new(5, 6);
        assert_eq!(table.insert_if_absent(key, 1), Ok(()));
        assert_eq!(table.insert_if_absent(key, 2), Err(Error::AlreadyExists));
        assert_eq!(table.get(&key), Some(&1));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn remove_then_lookup() {
        let mut table = table(16);
        let key = Key::new(1, 1);
        assert_eq!(table.insert_if_absent(key, 3), Ok(()));
        assert_eq!(table.remove(&key), Ok(3));
        assert_eq!(table.get(&key), None);
        assert_eq!(table.remove(&key), Err(Error::NotFound));
        assert!(table.is_empty());
    }

    #[test]
    fn chains_relink_on_inner_removal() {
        // A single bucket forces every entry into one chain.
        let mut table = table(0);
        for i in 0..5 {
            assert_eq!(table.insert_if_absent(Key::new(i, i), i as i64), Ok(()));
        }

        assert_eq!(table.remove(&Key::new(2, 2)), Ok(2));
        assert_eq!(table.remove(&Key::new(0, 0)), Ok(0));
        assert_eq!(table.remove(&Key::new(4, 4)), Ok(4));

        assert_eq!(table.get(&Key::new(1, 1)), Some(&1));
        assert_eq!(table.get(&Key::new(3, 3)), Some(&3));
        assert_eq!(table.len(), 2);

        // Freed nodes are reused and linked at the tail.
        assert_eq!(table.insert_if_absent(Key::new(9, 9), 9), Ok(()));
        assert_eq!(table.nodes.len(), 5);
        let mut keys: Vec<_> = table.iter().map(|(k, _)| k.hi).collect();
        keys.sort();
        assert_eq!(keys, [1, 3, 9]);
    }

    #[test]
    fn destroy_counts_every_entry() {
        let mut table = table(2);
        for i in 0..40 {
            assert_eq!(table.insert_if_absent(Key::new(i, 0), 0), Ok(()));
        }
        for i in 0..10 {
            assert_eq!(table.remove(&Key::new(i, 0)), Ok(0));
        }

        let mut calls = 0;
        table.destroy_with(|_, _| calls += 1);
        assert_eq!(calls, 30);
    }
}

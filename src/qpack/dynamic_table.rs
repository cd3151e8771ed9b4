//! RFC 9204 §3.2: the dynamic table, a FIFO of (name, value) entries shared
//! between one encoder and one decoder, indexed by an ever-increasing
//! absolute insertion count rather than a position that shifts on eviction.

use std::collections::VecDeque;

use bytes::Bytes;

use super::error::QpackError;

/// RFC 9204 §3.2.2: every entry costs its name and value length plus 32
/// bytes of accounting overhead, regardless of the wire encoding used.
const ENTRY_OVERHEAD: usize = 32;

struct Entry {
    name: Bytes,
    value: Bytes,
    /// Number of header blocks (on the decoder side) or un-acknowledged
    /// references (on the encoder side) currently pointing at this entry.
    /// An entry with a nonzero count cannot be evicted (RFC 9204 §2.1.1).
    refs: u32,
}

/// Shared FIFO table logic used by both [`super::encoder::QpackEncoder`] and
/// [`super::decoder::QpackDecoder`]; each side drives its own copy in
/// lock-step via the instruction stream and the header blocks themselves.
pub struct DynamicTable {
    entries: VecDeque<Entry>,
    /// Absolute index of the oldest live entry; `entries[0]` is this index.
    dropped_count: u64,
    /// Total number of entries ever inserted; the next insertion lands at
    /// this absolute index.
    inserted_count: u64,
    size: usize,
    capacity: usize,
}

impl DynamicTable {
    pub fn new(capacity: usize) -> Self {
        Self { entries: VecDeque::new(), dropped_count: 0, inserted_count: 0, size: 0, capacity }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn inserted_count(&self) -> u64 {
        self.inserted_count
    }

    /// RFC 9204 §3.2.3's `MaxEntries`, the maximum number of entries the
    /// table could ever hold at its current capacity; used to interpret
    /// the wrapped Required Insert Count encoding.
    pub fn max_entries(&self) -> u64 {
        (self.capacity / ENTRY_OVERHEAD) as u64
    }

    pub fn entry_size(name: &[u8], value: &[u8]) -> usize {
        name.len() + value.len() + ENTRY_OVERHEAD
    }

    /// RFC 9204 §4.3.1: resizes the table, evicting from the front until the
    /// new, possibly smaller, capacity is satisfied. Fails if a still
    /// referenced entry would need evicting.
    pub fn set_capacity(&mut self, capacity: usize) -> Result<(), QpackError> {
        self.capacity = capacity;
        self.evict_to_fit(0)?;
        Ok(())
    }

    fn evict_to_fit(&mut self, incoming: usize) -> Result<(), QpackError> {
        while self.size + incoming > self.capacity {
            match self.entries.front() {
                Some(e) if e.refs == 0 => {
                    let evicted = self.entries.pop_front().expect("front just matched");
                    self.size -= Self::entry_size(&evicted.name, &evicted.value);
                    self.dropped_count += 1;
                }
                Some(_) => return Err(QpackError::EvictionOfReferencedEntry),
                None => return Err(QpackError::EntryTooLarge),
            }
        }
        Ok(())
    }

    /// Inserts a new entry, evicting from the front as needed, and returns
    /// its absolute index.
    pub fn insert(&mut self, name: Bytes, value: Bytes) -> Result<u64, QpackError> {
        let size = Self::entry_size(&name, &value);
        if size > self.capacity {
            return Err(QpackError::EntryTooLarge);
        }
        self.evict_to_fit(size)?;
        self.entries.push_back(Entry { name, value, refs: 0 });
        self.size += size;
        let index = self.inserted_count;
        self.inserted_count += 1;
        Ok(index)
    }

    /// RFC 9204 §3.2.4: duplicates a live entry, re-inserting it at the
    /// front of the eviction order without re-sending its content.
    pub fn duplicate(&mut self, index: u64) -> Result<u64, QpackError> {
        let (name, value) = self.get(index).map(|(n, v)| (n.clone(), v.clone()))?;
        self.insert(name, value)
    }

    pub fn get(&self, index: u64) -> Result<(&Bytes, &Bytes), QpackError> {
        if index < self.dropped_count || index >= self.inserted_count {
            return Err(QpackError::InvalidDynamicIndex);
        }
        let entry = &self.entries[(index - self.dropped_count) as usize];
        Ok((&entry.name, &entry.value))
    }

    pub fn is_live(&self, index: u64) -> bool {
        index >= self.dropped_count && index < self.inserted_count
    }

    /// Bumps the live reference count of `index`; must hold until the
    /// matching [`Self::release`] to keep the entry from being evicted
    /// while a header block still points at it.
    pub fn acquire(&mut self, index: u64) -> Result<(), QpackError> {
        if index < self.dropped_count || index >= self.inserted_count {
            return Err(QpackError::InvalidDynamicIndex);
        }
        self.entries[(index - self.dropped_count) as usize].refs += 1;
        Ok(())
    }

    /// Scans for an exact name+value match, most-recently-inserted first —
    /// a fresher entry is less likely to be evicted before the header
    /// block referencing it gets acknowledged.
    pub fn find_full(&self, name: &[u8], value: &[u8]) -> Option<u64> {
        self.entries
            .iter()
            .enumerate()
            .rev()
            .find(|(_, e)| e.name == name && e.value == value)
            .map(|(i, _)| self.dropped_count + i as u64)
    }

    pub fn find_name(&self, name: &[u8]) -> Option<u64> {
        self.entries
            .iter()
            .enumerate()
            .rev()
            .find(|(_, e)| e.name == name)
            .map(|(i, _)| self.dropped_count + i as u64)
    }

    pub fn release(&mut self, index: u64) {
        if index >= self.dropped_count && index < self.inserted_count {
            let slot = &mut self.entries[(index - self.dropped_count) as usize];
            slot.refs = slot.refs.saturating_sub(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_lookup_round_trips() {
        let mut t = DynamicTable::new(1024);
        let i0 = t.insert(Bytes::from_static(b"x-bench"), Bytes::from_static(b"v")).unwrap();
        assert_eq!(i0, 0);
        assert_eq!(t.get(0).unwrap(), (&Bytes::from_static(b"x-bench"), &Bytes::from_static(b"v")));
    }

    #[test]
    fn eviction_respects_capacity_and_refcounts() {
        let one_entry = DynamicTable::entry_size(b"a", b"1");
        let mut t = DynamicTable::new(one_entry * 2);
        let a = t.insert(Bytes::from_static(b"a"), Bytes::from_static(b"1")).unwrap();
        t.acquire(a).unwrap();
        t.insert(Bytes::from_static(b"b"), Bytes::from_static(b"2")).unwrap();
        // inserting a third entry would need to evict `a`, which is referenced.
        assert_eq!(
            t.insert(Bytes::from_static(b"c"), Bytes::from_static(b"3")),
            Err(QpackError::EvictionOfReferencedEntry)
        );
        t.release(a);
        assert!(t.insert(Bytes::from_static(b"c"), Bytes::from_static(b"3")).is_ok());
        assert!(!t.is_live(a));
    }

    #[test]
    fn duplicate_keeps_same_content_at_a_new_index() {
        let mut t = DynamicTable::new(1024);
        let i0 = t.insert(Bytes::from_static(b"name"), Bytes::from_static(b"value")).unwrap();
        let i1 = t.duplicate(i0).unwrap();
        assert_ne!(i0, i1);
        assert_eq!(t.get(i1).unwrap(), t.get(i0).unwrap());
    }
}

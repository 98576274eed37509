//! Body storage: an ordered array of fixed-capacity chunks.
//!
//! Each chunk holds a contiguous prefix of its byte range. Chunk `i` covers
//! body offsets `[i * chunk_size, (i + 1) * chunk_size)`; its buffer is
//! reserved at full capacity on first write so appends never reallocate
//! under a lock.

use crate::error::{CacheError, CacheResult};

#[derive(Debug, Default)]
struct Chunk {
    locked: u16,
    data: Option<Vec<u8>>,
}

/// Memory taken by one slot of the chunk array, buffer excluded.
pub(crate) const SLOT_BYTES: usize = std::mem::size_of::<Chunk>();

/// End of the body range `[offset, offset + len)`.
pub(crate) fn range_end(offset: usize, len: usize) -> CacheResult<usize> {
    offset
        .checked_add(len)
        .ok_or(CacheError::RangeOverflow { offset, len })
}

impl Chunk {
    fn size(&self) -> usize {
        self.data.as_ref().map_or(0, Vec::len)
    }
}

/// Result of a [`ChunkStore::write`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct WriteOutcome {
    /// Bytes newly materialized.
    pub stored: usize,
    /// Bytes dropped because they would leave a gap inside a chunk.
    pub skipped: usize,
}

#[derive(Debug)]
pub(crate) struct ChunkStore {
    chunk_size: usize,
    chunks: Vec<Chunk>,
}

impl ChunkStore {
    pub(crate) fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            chunks: Vec::new(),
        }
    }

    pub(crate) fn count(&self) -> usize {
        self.chunks.len()
    }

    /// Bytes held by the slot array itself.
    pub(crate) fn slot_bytes(&self) -> usize {
        self.chunks.len() * SLOT_BYTES
    }

    /// Slot-array bytes that growing to `n` slots would add.
    pub(crate) fn slot_growth(&self, n: usize) -> usize {
        n.saturating_sub(self.chunks.len()).saturating_mul(SLOT_BYTES)
    }

    /// Resize to exactly `n` slots. Returns the buffer bytes released.
    pub(crate) fn set_count(&mut self, n: usize) -> CacheResult<usize> {
        let len = self.chunks.len();
        if n < len {
            if let Some(index) = (n..len).find(|&i| self.chunks[i].locked > 0) {
                return Err(CacheError::ChunkLocked { index });
            }
            let freed = self.chunks[n..].iter().filter(|c| c.data.is_some()).count() * self.chunk_size;
            self.chunks.truncate(n);
            Ok(freed)
        } else {
            self.grow_to(n)?;
            Ok(0)
        }
    }

    fn grow_to(&mut self, n: usize) -> CacheResult<()> {
        let len = self.chunks.len();
        if n > len {
            self.chunks
                .try_reserve_exact(n - len)
                .map_err(|_| CacheError::OutOfMemory {
                    requested: self.slot_growth(n),
                })?;
            self.chunks.resize_with(n, Chunk::default);
        }
        Ok(())
    }

    fn check_index(&self, index: usize) -> CacheResult<()> {
        if index >= self.chunks.len() {
            return Err(CacheError::ChunkIndexOutOfRange {
                index,
                count: self.chunks.len(),
            });
        }
        Ok(())
    }

    pub(crate) fn lock(&mut self, index: usize) -> CacheResult<()> {
        self.check_index(index)?;
        let chunk = &mut self.chunks[index];
        if chunk.data.is_none() {
            return Err(CacheError::ChunkEvicted { index });
        }
        chunk.locked = chunk
            .locked
            .checked_add(1)
            .ok_or(CacheError::ChunkLocked { index })?;
        Ok(())
    }

    pub(crate) fn unlock(&mut self, index: usize) -> CacheResult<()> {
        self.check_index(index)?;
        let chunk = &mut self.chunks[index];
        if chunk.locked == 0 {
            return Err(CacheError::ChunkNotLocked { index });
        }
        chunk.locked -= 1;
        Ok(())
    }

    pub(crate) fn is_locked(&self, index: usize) -> bool {
        self.chunks.get(index).is_some_and(|c| c.locked > 0)
    }

    pub(crate) fn any_locked(&self) -> bool {
        self.chunks.iter().any(|c| c.locked > 0)
    }

    /// Bytes a write of `len` bytes at `offset` would newly allocate: chunk
    /// buffers plus any growth of the slot array.
    pub(crate) fn pending_allocation(&self, offset: usize, len: usize) -> CacheResult<usize> {
        if len == 0 {
            return Ok(0);
        }
        let end = range_end(offset, len)?;
        let first = offset / self.chunk_size;
        let last = (end - 1) / self.chunk_size;
        let buffers = (first..=last)
            .filter(|&i| self.chunks.get(i).map_or(true, |c| c.data.is_none()))
            .count()
            * self.chunk_size;
        Ok(buffers.saturating_add(self.slot_growth(last + 1)))
    }

    /// Store `data` at body offset `offset`.
    ///
    /// Bytes already present win over new ones, so overlapping and repeated
    /// writes are idempotent. A chunk only ever grows by appending to its
    /// prefix; a slice that would start past the prefix is skipped.
    pub(crate) fn write(&mut self, offset: usize, data: &[u8]) -> CacheResult<WriteOutcome> {
        let mut outcome = WriteOutcome::default();
        if data.is_empty() {
            return Ok(outcome);
        }
        let end = range_end(offset, data.len())?;
        self.grow_to((end - 1) / self.chunk_size + 1)?;

        let cs = self.chunk_size;
        for i in offset / cs..=(end - 1) / cs {
            let base = i * cs;
            let from = offset.max(base) - base;
            let to = end.min(base + cs) - base;
            let chunk = &mut self.chunks[i];
            let have = chunk.size();
            if from > have {
                outcome.skipped += to - from;
                continue;
            }
            if to <= have {
                continue;
            }
            if chunk.data.is_none() {
                let mut buf = Vec::new();
                buf.try_reserve_exact(cs)
                    .map_err(|_| CacheError::OutOfMemory { requested: cs })?;
                chunk.data = Some(buf);
            }
            let Some(buf) = chunk.data.as_mut() else {
                continue;
            };
            buf.extend_from_slice(&data[base + have - offset..base + to - offset]);
            outcome.stored += to - have;
        }
        Ok(outcome)
    }

    /// Returns `true` iff every byte of `[from, to)` is materialized.
    pub(crate) fn has_data(&self, from: usize, to: usize) -> bool {
        if to <= from {
            return true;
        }
        let cs = self.chunk_size;
        (from / cs..=(to - 1) / cs).all(|i| {
            let base = i * cs;
            let need = to.min(base + cs) - base;
            self.chunks.get(i).is_some_and(|c| c.size() >= need)
        })
    }

    /// Length of the unmaterialized run starting at `offset`, clipped to
    /// `declared`. `None` when no data follows and the length is unknown.
    pub(crate) fn hole_size(&self, offset: usize, declared: Option<usize>) -> Option<usize> {
        if let Some(len) = declared {
            if offset >= len {
                return Some(0);
            }
        }
        let cs = self.chunk_size;
        let mut pos = offset;
        loop {
            let i = pos / cs;
            let Some(chunk) = self.chunks.get(i) else {
                return declared.map(|len| len - offset);
            };
            if pos - i * cs < chunk.size() {
                let hole = pos - offset;
                return Some(declared.map_or(hole, |len| hole.min(len - offset)));
            }
            pos = (i + 1) * cs;
        }
    }

    /// Contiguous materialized bytes starting at `offset`, at most `max`.
    pub(crate) fn read(&self, offset: usize, max: usize) -> Vec<u8> {
        let cs = self.chunk_size;
        let mut out = Vec::new();
        let mut pos = offset;
        while out.len() < max {
            let i = pos / cs;
            let Some(buf) = self.chunks.get(i).and_then(|c| c.data.as_ref()) else {
                break;
            };
            let within = pos - i * cs;
            if within >= buf.len() {
                break;
            }
            let take = (buf.len() - within).min(max - out.len());
            out.extend_from_slice(&buf[within..within + take]);
            pos += take;
            if buf.len() < cs {
                break;
            }
        }
        out
    }

    /// One past the highest materialized byte.
    pub(crate) fn materialized_end(&self) -> usize {
        self.chunks
            .iter()
            .enumerate()
            .rev()
            .find(|(_, c)| c.size() > 0)
            .map_or(0, |(i, c)| i * self.chunk_size + c.size())
    }

    /// Total materialized bytes.
    pub(crate) fn stored_bytes(&self) -> usize {
        self.chunks.iter().map(Chunk::size).sum()
    }

    /// Buffer bytes currently allocated.
    pub(crate) fn allocated_bytes(&self) -> usize {
        self.chunks.iter().filter(|c| c.data.is_some()).count() * self.chunk_size
    }

    /// Drop unlocked buffers whose contents lie entirely below `limit`.
    /// Returns the buffer bytes released.
    pub(crate) fn discard_covered(&mut self, limit: usize) -> usize {
        let cs = self.chunk_size;
        let mut freed = 0;
        for (i, chunk) in self.chunks.iter_mut().enumerate() {
            if chunk.locked == 0 && chunk.size() > 0 && i * cs + chunk.size() <= limit {
                chunk.data = None;
                freed += cs;
            }
        }
        freed
    }

    /// Drop every unlocked buffer. Returns the buffer bytes released.
    pub(crate) fn discard_unlocked(&mut self) -> usize {
        let mut freed = 0;
        for chunk in self.chunks.iter_mut().filter(|c| c.locked == 0) {
            if chunk.data.take().is_some() {
                freed += self.chunk_size;
            }
        }
        freed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn body(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    // =========================================================================
    // Sizing and locking
    // =========================================================================

    #[test]
    fn set_count_grows_and_shrinks() {
        let mut store = ChunkStore::new(4);
        assert_eq!(store.set_count(3).unwrap(), 0);
        assert_eq!(store.count(), 3);
        store.write(0, &body(12)).unwrap();
        assert_eq!(store.allocated_bytes(), 12);
        assert_eq!(store.set_count(1).unwrap(), 8);
        assert_eq!(store.count(), 1);
        assert_eq!(store.allocated_bytes(), 4);
    }

    #[test]
    fn shrinking_over_locked_chunk_fails() {
        let mut store = ChunkStore::new(4);
        store.write(0, &body(8)).unwrap();
        store.lock(1).unwrap();
        let err = store.set_count(1).unwrap_err();
        assert!(matches!(err, CacheError::ChunkLocked { index: 1 }));
        assert_eq!(store.count(), 2);
        store.unlock(1).unwrap();
        store.set_count(1).unwrap();
    }

    #[test]
    fn lock_errors_are_distinct() {
        let mut store = ChunkStore::new(4);
        store.set_count(2).unwrap();
        store.write(0, b"ab").unwrap();
        assert!(matches!(
            store.lock(5),
            Err(CacheError::ChunkIndexOutOfRange { index: 5, count: 2 })
        ));
        assert!(matches!(store.lock(1), Err(CacheError::ChunkEvicted { index: 1 })));
        assert!(matches!(store.unlock(0), Err(CacheError::ChunkNotLocked { index: 0 })));
        store.lock(0).unwrap();
        store.lock(0).unwrap();
        assert!(store.is_locked(0));
        store.unlock(0).unwrap();
        assert!(store.any_locked());
        store.unlock(0).unwrap();
        assert!(!store.any_locked());
    }

    // =========================================================================
    // Writes
    // =========================================================================

    #[test]
    fn write_spans_chunk_boundaries() {
        let mut store = ChunkStore::new(4);
        let data = body(10);
        let outcome = store.write(0, &data).unwrap();
        assert_eq!(outcome.stored, 10);
        assert_eq!(store.allocated_bytes(), 12);
        assert_eq!(store.count(), 3);
        assert_eq!(store.read(0, usize::MAX), data);
    }

    #[test]
    fn overlapping_writes_do_not_duplicate() {
        let mut store = ChunkStore::new(8);
        let data = body(15);
        store.write(0, &data[0..10]).unwrap();
        let outcome = store.write(5, &data[5..15]).unwrap();
        assert_eq!(outcome.stored, 5);
        assert!(store.has_data(0, 15));
        assert_eq!(store.stored_bytes(), 15);
        assert_eq!(store.read(0, 100), data);
    }

    #[test]
    fn duplicate_write_is_noop() {
        let mut store = ChunkStore::new(8);
        store.write(2, b"xx").unwrap();
        store.write(0, b"abcd").unwrap();
        let again = store.write(0, b"abcd").unwrap();
        assert_eq!(again.stored, 0);
        assert_eq!(store.allocated_bytes(), 8);
        assert_eq!(store.read(0, 10), b"abcd");
    }

    #[test]
    fn gap_inside_chunk_is_skipped() {
        let mut store = ChunkStore::new(8);
        let outcome = store.write(3, b"def").unwrap();
        assert_eq!(outcome.stored, 0);
        assert_eq!(outcome.skipped, 3);
        assert!(!store.has_data(3, 4));
    }

    #[test]
    fn overflowing_range_is_rejected_untouched() {
        let mut store = ChunkStore::new(4);
        assert!(matches!(
            store.pending_allocation(usize::MAX, 2),
            Err(CacheError::RangeOverflow { offset: usize::MAX, len: 2 })
        ));
        assert!(matches!(
            store.write(usize::MAX - 1, b"xyz"),
            Err(CacheError::RangeOverflow { .. })
        ));
        assert_eq!(store.count(), 0);
    }

    #[test]
    fn far_write_reports_slot_growth() {
        let store = ChunkStore::new(4);
        let pending = store.pending_allocation(4 * 1000, 1).unwrap();
        assert_eq!(pending, 4 + 1001 * SLOT_BYTES);
        assert_eq!(store.slot_bytes(), 0);
    }

    #[test]
    fn out_of_order_chunk_aligned_writes() {
        let mut store = ChunkStore::new(4);
        store.write(4, b"efgh").unwrap();
        assert!(store.has_data(4, 8));
        assert!(!store.has_data(0, 1));
        store.write(0, b"abcd").unwrap();
        assert_eq!(store.read(0, 8), b"abcdefgh");
    }

    // =========================================================================
    // Holes and reads
    // =========================================================================

    #[test]
    fn hole_size_cases() {
        let mut store = ChunkStore::new(4);
        assert_eq!(store.hole_size(0, None), None);
        assert_eq!(store.hole_size(0, Some(10)), Some(10));

        store.write(0, b"ab").unwrap();
        store.write(8, b"ij").unwrap();
        assert_eq!(store.hole_size(0, Some(10)), Some(0));
        assert_eq!(store.hole_size(2, Some(10)), Some(6));
        assert_eq!(store.hole_size(4, None), Some(4));
        assert_eq!(store.hole_size(10, None), None);
        assert_eq!(store.hole_size(10, Some(12)), Some(2));
        assert_eq!(store.hole_size(12, Some(12)), Some(0));
    }

    #[test]
    fn read_stops_at_first_gap() {
        let mut store = ChunkStore::new(4);
        store.write(0, b"abcd").unwrap();
        store.write(4, b"ef").unwrap();
        store.write(12, b"mn").unwrap();
        assert_eq!(store.read(0, 100), b"abcdef");
        assert_eq!(store.read(1, 2), b"bc");
        assert_eq!(store.read(6, 10), b"");
        assert_eq!(store.materialized_end(), 14);
    }

    // =========================================================================
    // Discarding
    // =========================================================================

    #[test]
    fn discard_covered_keeps_locked_and_uncovered() {
        let mut store = ChunkStore::new(4);
        store.write(0, &body(12)).unwrap();
        store.lock(1).unwrap();
        let freed = store.discard_covered(8);
        assert_eq!(freed, 4);
        assert!(!store.has_data(0, 4));
        assert!(store.has_data(4, 12));
        assert_eq!(store.discard_unlocked(), 4);
        assert!(store.has_data(4, 8));
        assert_eq!(store.allocated_bytes(), 4);
    }

    // =========================================================================
    // Properties
    // =========================================================================

    proptest! {
        #[test]
        fn write_order_does_not_matter(
            cuts in proptest::collection::vec(0usize..64, 1..8),
        ) {
            let data = body(64);

            // Write [start, 64) for every cut, in the generated order, then
            // the whole body once more.
            let mut store = ChunkStore::new(16);
            for &start in &cuts {
                let _ = store.write(start, &data[start..]);
            }
            store.write(0, &data).unwrap();
            prop_assert_eq!(store.read(0, usize::MAX), data.clone());
            prop_assert_eq!(store.stored_bytes(), 64);

            let second = store.write(0, &data).unwrap();
            prop_assert_eq!(second.stored, 0);
        }

        #[test]
        fn hole_zero_iff_has_byte(
            writes in proptest::collection::vec((0usize..48, 1usize..16), 0..6),
            offset in 0usize..48,
        ) {
            let data = body(64);
            let mut store = ChunkStore::new(8);
            for (start, len) in writes {
                let _ = store.write(start, &data[start..start + len]);
            }
            let hole = store.hole_size(offset, Some(64));
            prop_assert_eq!(hole == Some(0), store.has_data(offset, offset + 1));
        }
    }
}

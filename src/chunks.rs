//! Input chunk store.
//!
//! The compressed input arrives as an arbitrary sequence of byte chunks.
//! Each append either borrows the caller's slice (large appends) or is
//! copied into a pooled appendable tail buffer (small appends), so feeding
//! a stream one byte at a time does not cost one allocation per byte.
//!
//! The queue is strictly append-only and never reordered; once a chunk's
//! bytes are visible to the bit reader they never move or shrink. Chunk
//! payloads are stable (`Box<[u8]>` or a borrowed slice) even while the
//! index arena grows, and the `'a` lifetime pins borrowed caller memory
//! for as long as the stream lives.

use crate::errors::DecodeErrors;

/// Capacity of a pooled appendable buffer
const POOL_CHUNK_SIZE: usize = 16 * 1024;

/// Largest append that is eligible for copying into a pooled buffer,
/// anything bigger is borrowed by reference
const SMALL_APPEND: usize = 8 * 1024;

enum ChunkData<'a> {
    /// A view of caller memory, valid for the stream's whole lifetime
    Borrowed(&'a [u8]),
    /// An owned fixed-capacity buffer filled up to `used`
    Pooled { buf: Box<[u8]>, used: usize },
}

struct Chunk<'a> {
    data: ChunkData<'a>,
    /// A sealed chunk never grows again; only the pooled tail is unsealed
    sealed: bool,
}

impl<'a> Chunk<'a> {
    fn bytes(&self) -> &[u8] {
        match &self.data {
            ChunkData::Borrowed(data) => data,
            ChunkData::Pooled { buf, used } => &buf[..*used],
        }
    }

    fn appendable(&self) -> bool {
        !self.sealed && matches!(self.data, ChunkData::Pooled { .. })
    }
}

/// Append-only queue of input chunks
pub(crate) struct ChunkStore<'a> {
    chunks: Vec<Chunk<'a>>,
    total_in: usize,
}

impl<'a> ChunkStore<'a> {
    pub fn new() -> ChunkStore<'a> {
        ChunkStore {
            chunks: Vec::new(),
            total_in: 0,
        }
    }

    /// Append input to the queue.
    ///
    /// Small appends coalesce into the pooled tail while it has room; a
    /// full tail is sealed and a fresh pooled buffer opened. Large appends
    /// and pool-allocation failures fall back to borrowing `data`
    /// directly. Appending an empty slice is a no-op.
    pub fn append(&mut self, data: &'a [u8]) -> Result<(), DecodeErrors> {
        if data.is_empty() {
            return Ok(());
        }
        self.append_inner(data)?;
        self.total_in += data.len();

        Ok(())
    }

    fn append_inner(&mut self, data: &'a [u8]) -> Result<(), DecodeErrors> {
        if data.len() <= SMALL_APPEND {
            if let Some(tail) = self.chunks.last_mut() {
                if tail.appendable() {
                    if let ChunkData::Pooled { buf, used } = &mut tail.data {
                        if buf.len() - *used >= data.len() {
                            buf[*used..*used + data.len()].copy_from_slice(data);
                            *used += data.len();

                            return Ok(());
                        }
                    }
                    // out of room, no pooled chunk grows twice
                    tail.sealed = true;
                }
            }

            if let Some(mut buf) = alloc_pool(data.len()) {
                buf[..data.len()].copy_from_slice(data);

                return self.push_chunk(Chunk {
                    data: ChunkData::Pooled {
                        buf,
                        used: data.len(),
                    },
                    sealed: false,
                });
            }
            // pool allocation failed, borrowing still works
        } else if let Some(tail) = self.chunks.last_mut() {
            if tail.appendable() {
                tail.sealed = true;
            }
        }

        self.push_chunk(Chunk {
            data: ChunkData::Borrowed(data),
            sealed: true,
        })
    }

    fn push_chunk(&mut self, chunk: Chunk<'a>) -> Result<(), DecodeErrors> {
        if self.chunks.try_reserve(1).is_err() {
            return Err(DecodeErrors::OutOfMemory);
        }
        self.chunks.push(chunk);

        Ok(())
    }

    /// Bytes of chunk `index`, or `None` past the tail.
    ///
    /// For the pooled tail the returned slice reflects all appends made so
    /// far, which is how a suspended reader picks up in-place growth.
    pub fn bytes(&self, index: usize) -> Option<&[u8]> {
        self.chunks.get(index).map(Chunk::bytes)
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Sum of all appended input lengths
    pub const fn total_in(&self) -> usize {
        self.total_in
    }
}

fn alloc_pool(len: usize) -> Option<Box<[u8]>> {
    let cap = POOL_CHUNK_SIZE.max(len);
    let mut buf = Vec::new();

    if buf.try_reserve_exact(cap).is_err() {
        return None;
    }
    buf.resize(cap, 0);

    Some(buf.into_boxed_slice())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_appends_coalesce() {
        let mut store = ChunkStore::new();

        store.append(b"ab").unwrap();
        store.append(b"cd").unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.bytes(0).unwrap(), b"abcd");
        assert_eq!(store.total_in(), 4);
    }

    #[test]
    fn large_append_seals_the_tail() {
        let big = vec![7_u8; SMALL_APPEND + 1];
        let mut store = ChunkStore::new();

        store.append(b"xy").unwrap();
        store.append(&big).unwrap();
        store.append(b"z").unwrap();

        // borrowed chunk in the middle, small appends on both sides
        assert_eq!(store.len(), 3);
        assert_eq!(store.bytes(1).unwrap().len(), big.len());
        assert_eq!(store.bytes(2).unwrap(), b"z");
    }

    #[test]
    fn empty_append_is_a_noop() {
        let mut store = ChunkStore::new();

        store.append(&[]).unwrap();

        assert!(store.is_empty());
        assert_eq!(store.total_in(), 0);
    }

    #[test]
    fn pooled_tail_rolls_over_when_full() {
        let mut store = ChunkStore::new();
        let piece = vec![1_u8; SMALL_APPEND];

        for _ in 0..3 {
            store.append(&piece).unwrap();
        }

        assert_eq!(store.len(), 2);
        assert_eq!(store.total_in(), 3 * SMALL_APPEND);
    }
}

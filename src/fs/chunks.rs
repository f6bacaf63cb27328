//! Transfer chunk boundaries.
//!
//! Chunks start at 128 KiB and grow by 128 KiB per step up to 1 MiB. The last
//! chunk covers whatever remains. Content MACs are computed per chunk, so the
//! boundaries have to match exactly.

/// First chunk size and growth step.
pub const CHUNK_SIZE_INIT: u64 = 0x20000;
/// Largest chunk size.
pub const CHUNK_SIZE_MAX: u64 = 0x100000;

/// One network read / decrypt window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub offset: u64,
    pub size: u64,
}

/// Lazy chunk sequence for a file of `total` bytes.
#[derive(Debug, Clone)]
pub struct ChunkPlanner {
    total: u64,
    offset: u64,
    size: u64,
    done: bool,
}

impl ChunkPlanner {
    pub fn new(total: u64) -> Self {
        Self {
            total,
            offset: 0,
            size: CHUNK_SIZE_INIT,
            done: false,
        }
    }
}

impl Iterator for ChunkPlanner {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        if self.done {
            return None;
        }
        if self.offset + self.size < self.total {
            let chunk = Chunk {
                offset: self.offset,
                size: self.size,
            };
            self.offset += self.size;
            if self.size < CHUNK_SIZE_MAX {
                self.size += CHUNK_SIZE_INIT;
            }
            return Some(chunk);
        }
        self.done = true;
        Some(Chunk {
            offset: self.offset,
            size: self.total - self.offset,
        })
    }
}

/// Plan the chunks of a file.
pub fn plan(total: u64) -> ChunkPlanner {
    ChunkPlanner::new(total)
}

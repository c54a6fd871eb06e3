//! Chunked bump arena for short strings.
//!
//! Saved strings live until the owning editor root closes; nothing is freed
//! individually. Chunks have a configurable minimum size and grow to fit an
//! oversized string, so a save never spans chunks.

use tracing::trace;

/// Handle to a string saved in a [`StrArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrRef {
    chunk: u32,
    off: u32,
    len: u32,
}

#[derive(Debug)]
pub struct StrArena {
    chunks: Vec<String>,
    chunk_size: usize,
}

impl StrArena {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunks: Vec::new(),
            chunk_size,
        }
    }

    /// Save a copy of `s`, bumping within the current chunk or opening a new
    /// one when it does not fit.
    pub fn save(&mut self, s: &str) -> StrRef {
        let need = s.len();
        let fits = self
            .chunks
            .last()
            .map(|c| c.capacity() - c.len() >= need)
            .unwrap_or(false);
        if !fits {
            let cap = self.chunk_size.max(need);
            trace!(target: "editor.arena", cap, "new_chunk");
            self.chunks.push(String::with_capacity(cap));
        }
        let chunk = self.chunks.len() - 1;
        let c = &mut self.chunks[chunk];
        let off = c.len();
        c.push_str(s);
        StrRef {
            chunk: chunk as u32,
            off: off as u32,
            len: need as u32,
        }
    }

    pub fn get(&self, r: StrRef) -> &str {
        let start = r.off as usize;
        &self.chunks[r.chunk as usize][start..start + r.len as usize]
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn bytes_used(&self) -> usize {
        self.chunks.iter().map(|c| c.len()).sum()
    }
}

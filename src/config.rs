use crate::Error;

/// Default size of a single write when serializing a stream part.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// When a chunk's progress percentage is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressMode {
    /// Percent of the source written including the chunk just written.
    /// The final report is `100.0`.
    AfterChunk,
    /// Percent of the source written before the chunk just written.
    /// Reports stay below `100.0`; kept for callers relying on that.
    BeforeChunk,
}

impl Default for ProgressMode {
    fn default() -> Self {
        ProgressMode::AfterChunk
    }
}

/// Chunking settings for stream parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkConfig {
    chunk_size: usize,
    progress_mode: ProgressMode,
}

impl ChunkConfig {
    pub fn new(chunk_size: usize, progress_mode: ProgressMode) -> Result<Self, Error> {
        if chunk_size == 0 {
            return Err(Error::invalid_argument("chunk_size"));
        }

        Ok(Self {
            chunk_size,
            progress_mode,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn progress_mode(&self) -> ProgressMode {
        self.progress_mode
    }
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            progress_mode: ProgressMode::default(),
        }
    }
}

use crate::error::{ChunkerError, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CHUNK_SIZE: usize = 500;
pub const DEFAULT_OVERLAP: usize = 100;

/// Window parameters, measured in characters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkerConfig {
    /// Maximum number of characters in one chunk
    pub chunk_size: usize,

    /// Number of characters shared by two consecutive chunks of the same page
    pub overlap: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_OVERLAP,
        }
    }
}

impl ChunkerConfig {
    #[must_use]
    pub const fn new(chunk_size: usize, overlap: usize) -> Self {
        Self {
            chunk_size,
            overlap,
        }
    }

    /// Distance between the starts of two consecutive windows.
    ///
    /// Only meaningful for a validated config.
    #[must_use]
    pub const fn stride(&self) -> usize {
        self.chunk_size.saturating_sub(self.overlap)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(ChunkerError::invalid_config("chunk_size must be > 0"));
        }

        if self.overlap >= self.chunk_size {
            return Err(ChunkerError::invalid_config(format!(
                "overlap ({}) must be smaller than chunk_size ({})",
                self.overlap, self.chunk_size
            )));
        }

        Ok(())
    }
}

//! Line framing for the device text protocol
//!
//! Device output arrives as decoded text chunks of arbitrary size. A line is
//! terminated by LF with an optional preceding CR; surrounding whitespace is
//! trimmed and empty lines are dropped.

use serde::{Deserialize, Serialize};

/// Upper bound on an unterminated fragment held between chunks
pub const MAX_PENDING_LEN: usize = 4096;

/// How chunk boundaries are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FramingMode {
    /// Every chunk is framed on its own, a trailing fragment counts as a line
    Chunk,
    /// Unterminated trailing fragments are held until the next chunk
    #[default]
    CarryOver,
}

/// Split one decoded chunk into trimmed, non-empty lines.
///
/// Stateless: a line cut by a chunk boundary comes out as two fragments.
pub fn split_lines(chunk: &str) -> Vec<String> {
    chunk
        .split('\n')
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Streaming line framer used by the read pump
#[derive(Debug, Clone, Default)]
pub struct LineFramer {
    mode: FramingMode,
    pending: String,
}

impl LineFramer {
    /// Create new framer
    pub fn new(mode: FramingMode) -> Self {
        Self {
            mode,
            pending: String::new(),
        }
    }

    /// Add a chunk and return the complete lines it produced
    pub fn push(&mut self, chunk: &str) -> Vec<String> {
        if self.mode == FramingMode::Chunk {
            return split_lines(chunk);
        }

        self.pending.push_str(chunk);

        let Some(last_newline) = self.pending.rfind('\n') else {
            if self.pending.len() > MAX_PENDING_LEN {
                // Device never terminates this line; hand it over as is.
                return self.finish().into_iter().collect();
            }
            return Vec::new();
        };

        let rest = self.pending.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.pending, rest);
        split_lines(&complete)
    }

    /// Flush a pending unterminated fragment, e.g. at end of stream
    pub fn finish(&mut self) -> Option<String> {
        let fragment = std::mem::take(&mut self.pending);
        let trimmed = fragment.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_owned())
    }
}

//! Position-tracked in-place text editing.
//!
//! Replacements are expressed in offsets of the *original* text. The editor
//! keeps a running delta so later replacements land at the right place in the
//! already-modified buffer. That only works when replacements arrive in
//! ascending, non-overlapping order, so anything else is rejected.

use anyhow::{Context, Result, bail};
use std::path::Path;

#[derive(Debug, Clone)]
pub struct TextEditor {
    text: String,
    original_len: usize,
    delta: isize,
    /// End offset (original coordinates) of the last applied replacement.
    last_end: usize,
    dirty: bool,
}

impl TextEditor {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        TextEditor {
            original_len: text.len(),
            text,
            delta: 0,
            last_end: 0,
            dirty: false,
        }
    }

    /// Replace `start..end` (original offsets) with `replacement`.
    pub fn replace(&mut self, start: usize, end: usize, replacement: &str) -> Result<()> {
        if start > end {
            bail!("invalid replacement range {}..{}", start, end);
        }
        if end > self.original_len {
            bail!(
                "replacement range {}..{} exceeds text length {}",
                start,
                end,
                self.original_len
            );
        }
        if start < self.last_end {
            bail!(
                "replacement {}..{} overlaps or precedes the previous replacement ending at {}",
                start,
                end,
                self.last_end
            );
        }

        let shifted_start = self.shift(start);
        let shifted_end = self.shift(end);
        if !self.text.is_char_boundary(shifted_start) || !self.text.is_char_boundary(shifted_end) {
            bail!("replacement {}..{} splits a character", start, end);
        }

        self.text.replace_range(shifted_start..shifted_end, replacement);
        self.delta += replacement.len() as isize - (end - start) as isize;
        self.last_end = end;
        self.dirty = true;
        Ok(())
    }

    fn shift(&self, offset: usize) -> usize {
        (offset as isize + self.delta) as usize
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Write the buffer to `path` if any replacement happened.
    ///
    /// Returns whether the file was written.
    pub fn save(&self, path: &Path) -> Result<bool> {
        if !self.dirty {
            return Ok(false);
        }
        std::fs::write(path, &self.text)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(true)
    }
}

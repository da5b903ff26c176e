//! Bounded, deduplicated log of now-playing metadata.
//!
//! Stream metadata arrives as raw ICY text that can carry HTML entities and
//! markup; [`sanitize_metadata`] normalizes it before it enters the
//! history. The history itself is an ordered list (oldest first) with
//! dedup-by-value and head eviction on overflow.

use crate::constants::{METADATA_ENTRY_MAX_LENGTH, METADATA_HISTORY_SIZE};

/// Ordered, deduplicated, size-bounded metadata log.
#[derive(Debug, Clone)]
pub struct MetadataHistory {
    entries: Vec<String>,
    size: usize,
}

impl Default for MetadataHistory {
    fn default() -> Self {
        Self::new(METADATA_HISTORY_SIZE)
    }
}

impl MetadataHistory {
    /// Creates an empty history bounded to `size` entries.
    #[must_use]
    pub fn new(size: usize) -> Self {
        Self {
            entries: Vec::new(),
            size: size.max(1),
        }
    }

    /// Creates a history from persisted entries, trimming to the bound.
    #[must_use]
    pub fn from_entries(entries: Vec<String>, size: usize) -> Self {
        let mut history = Self::new(size);
        for entry in entries {
            history.append(&entry);
        }
        history
    }

    /// Appends an entry at the tail.
    ///
    /// A duplicate value is relocated to the tail instead of growing the
    /// list; overflow evicts from the head; blank entries are a no-op.
    /// Returns true if the history changed.
    pub fn append(&mut self, entry: &str) -> bool {
        if entry.trim().is_empty() {
            return false;
        }
        if let Some(position) = self.entries.iter().position(|e| e == entry) {
            // already the newest entry, nothing to do
            if position == self.entries.len() - 1 {
                return false;
            }
            self.entries.remove(position);
        }
        self.entries.push(entry.to_string());
        while self.entries.len() > self.size {
            self.entries.remove(0);
        }
        true
    }

    /// Entries oldest to newest.
    #[must_use]
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// The newest entry, if any.
    #[must_use]
    pub fn latest(&self) -> Option<&str> {
        self.entries.last().map(String::as_str)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no entries are recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Normalizes a raw metadata string for display and history.
///
/// Decodes HTML entities, strips markup tags, collapses whitespace and caps
/// the result at a fixed length.
#[must_use]
pub fn sanitize_metadata(raw: &str) -> String {
    let decoded = html_escape::decode_html_entities(raw);

    let mut stripped = String::with_capacity(decoded.len());
    let mut in_tag = false;
    for c in decoded.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            c if !in_tag => stripped.push(c),
            _ => {}
        }
    }

    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(METADATA_ENTRY_MAX_LENGTH).collect()
}

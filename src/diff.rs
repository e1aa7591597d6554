//! Minimal single-span edit between two whole-document strings.

use tower_lsp::lsp_types::{Range, TextEdit};

use crate::line_index::LineIndex;

/// Replacement of the byte span `[start, end)` of the original text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MinimalEdit {
    pub start: usize,
    pub end: usize,
    pub new_text: String,
}

impl MinimalEdit {
    /// True when applying the edit changes nothing.
    pub fn is_noop(&self) -> bool {
        self.start == self.end && self.new_text.is_empty()
    }

    pub fn apply(&self, original: &str) -> String {
        let mut result = String::with_capacity(original.len() + self.new_text.len());
        result.push_str(&original[..self.start]);
        result.push_str(&self.new_text);
        result.push_str(&original[self.end..]);
        result
    }

    /// Convert to an LSP edit against `original`, whose line index is `index`.
    pub fn to_text_edit(&self, original: &str, index: &LineIndex) -> TextEdit {
        TextEdit {
            range: Range {
                start: index.position_of(original, self.start),
                end: index.position_of(original, self.end),
            },
            new_text: self.new_text.clone(),
        }
    }
}

/// Compute the shortest edit turning `original` into `candidate`.
///
/// The common prefix is matched first, then the common suffix of what is
/// left, so the two never overlap. Comparison is per `char`, which keeps
/// every offset on a char boundary.
pub fn minimal_edit(original: &str, candidate: &str) -> MinimalEdit {
    let prefix = original
        .chars()
        .zip(candidate.chars())
        .take_while(|(a, b)| a == b)
        .map(|(a, _)| a.len_utf8())
        .sum::<usize>();

    let suffix = original[prefix..]
        .chars()
        .rev()
        .zip(candidate[prefix..].chars().rev())
        .take_while(|(a, b)| a == b)
        .map(|(a, _)| a.len_utf8())
        .sum::<usize>();

    MinimalEdit {
        start: prefix,
        end: original.len() - suffix,
        new_text: candidate[prefix..candidate.len() - suffix].to_string(),
    }
}

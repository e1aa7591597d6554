//! Open text documents tracked by the server.

use std::path::PathBuf;

use tower_lsp::lsp_types::{Position, TextDocumentContentChangeEvent, Url};

use crate::line_index::LineIndex;

/// Language identifier editors use for files without a known language.
pub const PLAINTEXT_LANGUAGE_ID: &str = "plaintext";

/// Snapshot of one open document.
#[derive(Debug, Clone)]
pub struct TextDocument {
    uri: Url,
    language_id: String,
    version: i32,
    text: String,
    line_index: LineIndex,
}

impl TextDocument {
    pub fn new(uri: Url, language_id: impl Into<String>, version: i32, text: String) -> Self {
        Self {
            line_index: LineIndex::new(&text),
            uri,
            language_id: language_id.into(),
            version,
            text,
        }
    }

    pub fn uri(&self) -> &Url {
        &self.uri
    }

    pub fn language_id(&self) -> &str {
        &self.language_id
    }

    pub fn version(&self) -> i32 {
        self.version
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn line_index(&self) -> &LineIndex {
        &self.line_index
    }

    /// Filesystem path of the document. Non-file URIs (e.g. `untitled:`)
    /// fall back to their path component.
    pub fn path(&self) -> PathBuf {
        self.uri
            .to_file_path()
            .unwrap_or_else(|_| PathBuf::from(self.uri.path()))
    }

    pub fn position_at(&self, offset: usize) -> Position {
        self.line_index.position_of(&self.text, offset)
    }

    pub fn offset_at(&self, position: Position) -> usize {
        self.line_index.offset_of(&self.text, position)
    }

    /// Offset of `position` in UTF-16 code units, the unit Prettier's
    /// `rangeStart`/`rangeEnd` are expressed in.
    pub fn utf16_offset_at(&self, position: Position) -> usize {
        let offset = self.offset_at(position);
        self.text[..offset].encode_utf16().count()
    }

    /// Apply `didChange` content changes in order. A change without a range
    /// replaces the whole text.
    pub fn apply_changes(&mut self, changes: Vec<TextDocumentContentChangeEvent>, version: i32) {
        for change in changes {
            match change.range {
                Some(range) => {
                    let start = self.offset_at(range.start);
                    let end = self.offset_at(range.end).max(start);
                    self.text.replace_range(start..end, &change.text);
                }
                None => self.text = change.text,
            }
            self.line_index = LineIndex::new(&self.text);
        }
        self.version = version;
    }
}

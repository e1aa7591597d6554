//! Byte offset ↔ LSP position mapping.
//!
//! Offsets are byte offsets into the UTF-8 text. LSP positions count
//! characters in UTF-16 code units, so every conversion walks the line it
//! lands on.

use tower_lsp::lsp_types::Position;

#[derive(Debug, Clone)]
pub struct LineIndex {
    line_starts: Vec<usize>,
    text_len: usize,
}

impl LineIndex {
    pub fn new(text: &str) -> Self {
        let mut line_starts = Vec::with_capacity(128);
        line_starts.push(0);
        for (idx, b) in text.as_bytes().iter().enumerate() {
            if *b == b'\n' {
                line_starts.push(idx + 1);
            }
        }
        Self {
            line_starts,
            text_len: text.len(),
        }
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Byte offset of `position` in `text`.
    ///
    /// A character past the end of its line clamps to the line end, a line
    /// past the end of the document clamps to the end of the text.
    pub fn offset_of(&self, text: &str, position: Position) -> usize {
        let line = position.line as usize;
        let Some(&line_start) = self.line_starts.get(line) else {
            return self.text_len;
        };
        let line_end = self
            .line_starts
            .get(line + 1)
            .map(|next| next - 1)
            .unwrap_or(self.text_len);

        let mut remaining = position.character as usize;
        let mut offset = line_start;
        for ch in text[line_start..line_end].chars() {
            let width = ch.len_utf16();
            if remaining < width {
                break;
            }
            remaining -= width;
            offset += ch.len_utf8();
        }
        offset
    }

    /// LSP position of the byte `offset` in `text`. `offset` must fall on a
    /// char boundary; larger offsets clamp to the end of the text.
    pub fn position_of(&self, text: &str, offset: usize) -> Position {
        let clamped = offset.min(self.text_len);
        let line = match self.line_starts.binary_search(&clamped) {
            Ok(idx) => idx,
            Err(idx) => idx.saturating_sub(1),
        };
        let line_start = self.line_starts.get(line).copied().unwrap_or(0);
        let character = text[line_start..clamped].encode_utf16().count();
        Position {
            line: line as u32,
            character: character as u32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(line: u32, character: u32) -> Position {
        Position { line, character }
    }

    #[test]
    fn maps_ascii_lines() {
        let text = "ab\ncd\n";
        let index = LineIndex::new(text);
        assert_eq!(index.line_count(), 3);
        assert_eq!(index.position_of(text, 0), pos(0, 0));
        assert_eq!(index.position_of(text, 4), pos(1, 1));
        assert_eq!(index.position_of(text, 6), pos(2, 0));
        assert_eq!(index.offset_of(text, pos(1, 1)), 4);
    }

    #[test]
    fn counts_utf16_units_for_multibyte_text() {
        // 'é' is 2 bytes / 1 unit, '😀' is 4 bytes / 2 units.
        let text = "é😀x\ny";
        let index = LineIndex::new(text);
        let x_offset = text.find('x').unwrap();
        assert_eq!(index.position_of(text, x_offset), pos(0, 3));
        assert_eq!(index.offset_of(text, pos(0, 3)), x_offset);
        assert_eq!(index.offset_of(text, pos(1, 1)), text.len());
    }

    #[test]
    fn clamps_out_of_range_positions() {
        let text = "abc\nd";
        let index = LineIndex::new(text);
        assert_eq!(index.offset_of(text, pos(0, 99)), 3);
        assert_eq!(index.offset_of(text, pos(7, 0)), text.len());
        assert_eq!(index.position_of(text, 999), pos(1, 1));
    }
}

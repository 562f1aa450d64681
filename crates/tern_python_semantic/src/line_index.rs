use rustpython_ast::text_size::{TextRange, TextSize};

/// 0-based line/column pair, columns counted in bytes.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub struct SourceLocation {
    pub line: u32,
    pub column: u32,
}

/// Byte offsets of line starts, for offset <-> line/column conversion.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct LineIndex {
    line_starts: Vec<TextSize>,
}

impl LineIndex {
    pub fn from_source(source: &str) -> Self {
        let mut line_starts = vec![TextSize::from(0)];
        for (offset, byte) in source.bytes().enumerate() {
            if byte == b'\n' {
                line_starts.push(TextSize::from(offset as u32 + 1));
            }
        }
        Self { line_starts }
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// The 0-based line containing `offset`.
    pub fn line_of(&self, offset: TextSize) -> u32 {
        match self.line_starts.binary_search(&offset) {
            Ok(line) => line as u32,
            Err(next) => (next - 1) as u32,
        }
    }

    pub fn location(&self, offset: TextSize) -> SourceLocation {
        let line = self.line_of(offset);
        let start = self.line_starts[line as usize];
        SourceLocation {
            line,
            column: (offset - start).into(),
        }
    }

    /// Whether `range` touches the given 0-based line.
    pub fn range_intersects_line(&self, range: TextRange, line: u32) -> bool {
        self.line_of(range.start()) <= line && line <= self.line_of(range.end())
    }
}

#[cfg(test)]
mod tests {
    use super::LineIndex;
    use rustpython_ast::text_size::{TextRange, TextSize};

    #[test]
    fn locations() {
        let index = LineIndex::from_source("a = 1\nbb = 2\n");
        assert_eq!(index.line_of(TextSize::from(0)), 0);
        assert_eq!(index.line_of(TextSize::from(6)), 1);
        let loc = index.location(TextSize::from(9));
        assert_eq!((loc.line, loc.column), (1, 3));
    }

    #[test]
    fn line_intersection() {
        let index = LineIndex::from_source("a = 1\nbb = 2\nc = 3\n");
        let second_line = TextRange::new(TextSize::from(6), TextSize::from(12));
        assert!(index.range_intersects_line(second_line, 1));
        assert!(!index.range_intersects_line(second_line, 2));
    }
}

/// Byte offset to 1-based line/column lookup for expression source text.
pub struct SourceMap {
    line_starts: Vec<usize>,
    len: usize,
}

impl SourceMap {
    pub fn new(source: &str) -> Self {
        let line_starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        SourceMap { line_starts, len: source.len() }
    }

    /// Returns (line, col), both 1-based. Offsets past the end clamp to the
    /// final position.
    pub fn lookup(&self, offset: usize) -> (usize, usize) {
        let offset = offset.min(self.len);
        let line = self.line_starts.partition_point(|&start| start <= offset) - 1;
        (line + 1, offset - self.line_starts[line] + 1)
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Text of a 1-based line without its newline.
    pub fn line_text<'s>(&self, source: &'s str, line: usize) -> &'s str {
        let Some(&start) = line.checked_sub(1).and_then(|i| self.line_starts.get(i)) else {
            return "";
        };
        let end = self.line_starts.get(line).map_or(source.len(), |&next| next - 1);
        source.get(start..end).unwrap_or("").trim_end_matches('\r')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_line() {
        let sm = SourceMap::new("price * qty");
        assert_eq!(sm.lookup(0), (1, 1));
        assert_eq!(sm.lookup(8), (1, 9));
    }

    #[test]
    fn multi_line_statements() {
        let sm = SourceMap::new("x = 1\ny = x + 1\nreturn y");
        assert_eq!(sm.line_count(), 3);
        assert_eq!(sm.lookup(6), (2, 1));
        assert_eq!(sm.lookup(10), (2, 5));
        assert_eq!(sm.lookup(16), (3, 1));
    }

    #[test]
    fn clamps_past_end() {
        let sm = SourceMap::new("ab");
        assert_eq!(sm.lookup(99), (1, 3));
    }

    #[test]
    fn line_text() {
        let src = "a = 1\nreturn a";
        let sm = SourceMap::new(src);
        assert_eq!(sm.line_text(src, 1), "a = 1");
        assert_eq!(sm.line_text(src, 2), "return a");
        assert_eq!(sm.line_text(src, 3), "");
        assert_eq!(sm.line_text(src, 0), "");
    }
}

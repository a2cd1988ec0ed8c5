use super::RowCounter;

/// One row per line after a fixed number of header lines.
#[derive(Debug)]
pub struct LineCounter {
    header_lines: usize,
    seen_headers: usize,
    count: u64,
}

impl LineCounter {
    pub fn new(header_lines: usize) -> Self {
        LineCounter {
            header_lines,
            seen_headers: 0,
            count: 0,
        }
    }
}

impl RowCounter for LineCounter {
    fn consume(&mut self, _line: &str) -> Option<u64> {
        if self.seen_headers < self.header_lines {
            self.seen_headers += 1;
        } else {
            self.count += 1;
        }

        Some(self.count)
    }

    fn count(&self) -> Option<u64> {
        Some(self.count)
    }
}

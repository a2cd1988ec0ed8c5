use super::RowCounter;

/// Counts lines starting with a glyph that only data rows (or record
/// separators) start with.
#[derive(Debug)]
pub struct MarkerCounter {
    marker: &'static str,
    count: u64,
}

impl MarkerCounter {
    pub fn new(marker: &'static str) -> Self {
        MarkerCounter { marker, count: 0 }
    }
}

impl RowCounter for MarkerCounter {
    fn consume(&mut self, line: &str) -> Option<u64> {
        if line.starts_with(self.marker) {
            self.count += 1;
        }

        Some(self.count)
    }

    fn count(&self) -> Option<u64> {
        Some(self.count)
    }
}

use super::RowCounter;

/// `BlockTabSeparated` transposes the result: the first line holds one
/// field per row.
#[derive(Debug, Default)]
pub struct BlockCounter {
    count: Option<u64>,
}

impl RowCounter for BlockCounter {
    fn consume(&mut self, line: &str) -> Option<u64> {
        if self.count.is_none() {
            self.count = Some(line.matches('\t').count() as u64 + 1);
        }

        self.count
    }

    fn count(&self) -> Option<u64> {
        Some(self.count.unwrap_or(0))
    }
}

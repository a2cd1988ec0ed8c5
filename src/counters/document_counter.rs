use super::RowCounter;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DocumentKind {
    Json,
    Xml,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Phase {
    BeforeData,
    InData,
    AfterData,
    Counted,
}

/// JSON and XML documents report their own row count after the `data`
/// section, so the counter skips to that field instead of counting lines.
#[derive(Debug)]
pub struct DocumentCounter {
    kind: DocumentKind,
    phase: Phase,
    count: u64,
}

impl DocumentCounter {
    pub fn new(kind: DocumentKind) -> Self {
        DocumentCounter {
            kind,
            phase: Phase::BeforeData,
            count: 0,
        }
    }

    fn opens_data(&self, line: &str) -> bool {
        match self.kind {
            DocumentKind::Json => line == "\"data\":",
            DocumentKind::Xml => line.starts_with("<data>"),
        }
    }

    fn closes_data(&self, line: &str) -> bool {
        match self.kind {
            DocumentKind::Json => line == "],",
            DocumentKind::Xml => line.starts_with("</data>"),
        }
    }

    fn rows_field<'a>(&self, line: &'a str) -> Option<&'a str> {
        match self.kind {
            DocumentKind::Json => line
                .strip_prefix("\"rows\":")
                .map(|rest| rest.trim().trim_end_matches(',')),
            DocumentKind::Xml => line
                .strip_prefix("<rows>")
                .map(|rest| rest.trim_end_matches("</rows>")),
        }
    }
}

impl RowCounter for DocumentCounter {
    fn consume(&mut self, line: &str) -> Option<u64> {
        let line = line.trim();

        match self.phase {
            Phase::BeforeData if self.opens_data(line) => self.phase = Phase::InData,
            Phase::InData if self.closes_data(line) => self.phase = Phase::AfterData,
            Phase::AfterData => {
                if let Some(rows) = self.rows_field(line) {
                    self.count = rows.trim().parse().unwrap_or(0);
                    self.phase = Phase::Counted;
                }
            }
            _ => {}
        }

        Some(self.count)
    }

    fn count(&self) -> Option<u64> {
        Some(self.count)
    }
}

mod block_counter;
mod document_counter;
mod line_counter;
mod marker_counter;

pub use block_counter::BlockCounter;
pub use document_counter::{DocumentCounter, DocumentKind};
pub use line_counter::LineCounter;
pub use marker_counter::MarkerCounter;

/// Counts result rows in a streamed response, one line at a time.
///
/// A counter is built once per execution for the output format and keeps
/// whatever state that format needs. `None` means the format cannot be
/// counted.
pub trait RowCounter: Send {
    fn consume(&mut self, line: &str) -> Option<u64>;

    fn count(&self) -> Option<u64>;
}

pub struct Uncountable;

impl RowCounter for Uncountable {
    fn consume(&mut self, _line: &str) -> Option<u64> {
        None
    }

    fn count(&self) -> Option<u64> {
        None
    }
}

pub struct CounterFactory;

impl CounterFactory {
    pub fn create_counter(format: &str) -> Box<dyn RowCounter> {
        match format {
            "TabSeparated"
            | "TSV"
            | "TabSeparatedRaw"
            | "TSVRaw"
            | "CSV"
            | "TSKV"
            | "JSONEachRow"
            | "JSONStringsEachRow"
            | "JSONCompactEachRow"
            | "JSONCompactStringsEachRow"
            | "LineAsString" => Box::new(LineCounter::new(0)),
            "TabSeparatedWithNames"
            | "TSVWithNames"
            | "TabSeparatedRawWithNames"
            | "TSVRawWithNames"
            | "CSVWithNames"
            | "JSONCompactEachRowWithNames" => Box::new(LineCounter::new(1)),
            "TabSeparatedWithNamesAndTypes"
            | "TSVWithNamesAndTypes"
            | "TabSeparatedRawWithNamesAndTypes"
            | "TSVRawWithNamesAndTypes"
            | "CSVWithNamesAndTypes"
            | "JSONCompactEachRowWithNamesAndTypes"
            | "PrettySpace"
            | "PrettySpaceNoEscapes"
            | "Markdown" => Box::new(LineCounter::new(2)),
            "BlockTabSeparated" => Box::new(BlockCounter::default()),
            "Pretty"
            | "PrettyNoEscapes"
            | "PrettyMonoBlock"
            | "PrettyCompact"
            | "PrettyCompactMonoBlock"
            | "PrettyCompactNoEscapes" => Box::new(MarkerCounter::new("│")),
            "Vertical" | "VerticalRaw" => Box::new(MarkerCounter::new("───")),
            "JSON" | "JSONStrings" | "JSONCompact" | "JSONCompactStrings" => {
                Box::new(DocumentCounter::new(DocumentKind::Json))
            }
            "XML" => Box::new(DocumentCounter::new(DocumentKind::Xml)),
            _ => Box::new(Uncountable),
        }
    }
}

use super::{scale, Formatter};

const UNITS: [&str; 9] = [" B", " KB", " MB", " GB", " TB", " PB", " EB", " ZB", " YB"];

/// Decimal (power of 1000) byte sizes.
#[derive(Debug, Default)]
pub struct SizeFormatter;

impl Formatter for SizeFormatter {
    type Output = String;

    fn format(&self, value: f64) -> String {
        scale(value, &UNITS)
    }
}

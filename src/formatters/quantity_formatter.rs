use super::{scale, Formatter};

const UNITS: [&str; 6] = [
    "",
    " thousand",
    " million",
    " billion",
    " trillion",
    " quadrillion",
];

#[derive(Debug, Default)]
pub struct QuantityFormatter;

impl Formatter for QuantityFormatter {
    type Output = String;

    fn format(&self, value: f64) -> String {
        scale(value, &UNITS)
    }
}

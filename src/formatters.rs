mod quantity_formatter;
mod size_formatter;

pub use quantity_formatter::QuantityFormatter;
pub use size_formatter::SizeFormatter;

pub trait Formatter {
    type Output;

    fn format(&self, value: f64) -> Self::Output;
}

/// Divides by 1000 until the value fits the largest unit available.
fn scale(mut value: f64, units: &[&str]) -> String {
    let mut unit = 0;

    while value >= 1000.0 && unit + 1 < units.len() {
        value /= 1000.0;
        unit += 1;
    }

    format!("{:.2}{}", value, units[unit])
}

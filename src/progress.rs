use std::{io::Write, time::Duration};

use crate::formatters::{Formatter, QuantityFormatter, SizeFormatter};

// ESC 7 / ESC 8 rather than CSI s / CSI u, which VT100 and mosh ignore.
const SAVE_CURSOR: &str = "\x1b7";
const RESTORE_CURSOR: &str = "\x1b8";
const CLEAR_TO_END_OF_LINE: &str = "\x1b[K";

const BAR_COLOR: &str = "\x1b[0;32m";
const RESET_COLOR: &str = "\x1b[0m";

const INDICATORS: [&str; 8] = [
    "\x1b[1;30m→\x1b[0m",
    "\x1b[1;31m↘\x1b[0m",
    "\x1b[1;32m↓\x1b[0m",
    "\x1b[1;33m↙\x1b[0m",
    "\x1b[1;34m←\x1b[0m",
    "\x1b[1;35m↖\x1b[0m",
    "\x1b[1;36m↑\x1b[0m",
    "\x1b[1m↗\x1b[0m",
];

const BAR_DELAY: Duration = Duration::from_millis(500);
const PERCENT_WIDTH: usize = 4;
const DEFAULT_WIDTH: usize = 80;

/// Paints a single status line in place on the terminal.
///
/// Every paint saves the cursor first, so the next paint (or [`clear`])
/// can restore it and wipe the old line without scrolling.
///
/// [`clear`]: ProgressRenderer::clear
#[derive(Debug)]
pub struct ProgressRenderer {
    enabled: bool,
    width: Option<usize>,
    increment: usize,
    written_chars: usize,
    show_bar: bool,
}

impl ProgressRenderer {
    pub fn new(enabled: bool) -> Self {
        ProgressRenderer {
            enabled,
            width: None,
            increment: 0,
            written_chars: 0,
            show_bar: false,
        }
    }

    /// Fixes the terminal width instead of asking the terminal.
    pub fn with_width(mut self, width: usize) -> Self {
        self.width = Some(width);
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn bar_visible(&self) -> bool {
        self.show_bar
    }

    pub fn is_drawn(&self) -> bool {
        self.written_chars > 0
    }

    /// Resets per-execution state.
    pub fn reset(&mut self) {
        self.increment = 0;
        self.written_chars = 0;
        self.show_bar = false;
    }

    pub fn clear(&mut self, w: &mut dyn Write) -> std::io::Result<()> {
        if self.written_chars > 0 {
            w.write_all(format!("{}{}", RESTORE_CURSOR, CLEAR_TO_END_OF_LINE).as_bytes())?;
            w.flush()?;
            self.written_chars = 0;
        }

        Ok(())
    }

    pub fn render(
        &mut self,
        w: &mut dyn Write,
        rows: u64,
        bytes: u64,
        total_rows: u64,
        elapsed: Duration,
    ) -> std::io::Result<()> {
        if !self.enabled {
            return Ok(());
        }

        self.clear(w)?;

        let status = status_line(rows, bytes, elapsed);
        self.written_chars = status.chars().count() + 1;
        let bar = self.bar(rows, total_rows, elapsed);

        let indicator = INDICATORS[self.increment % INDICATORS.len()];
        w.write_all(format!("{}{}{}{}", SAVE_CURSOR, indicator, status, bar).as_bytes())?;
        w.flush()?;

        self.increment += 1;

        Ok(())
    }

    fn bar(&mut self, rows: u64, total_rows: u64, elapsed: Duration) -> String {
        if total_rows == 0 || elapsed <= BAR_DELAY {
            return String::new();
        }

        let total_rows = total_rows.max(rows);

        // Only start showing the bar while less than half is done, and
        // never take it away again.
        if rows.saturating_mul(2) < total_rows {
            self.show_bar = true;
        }

        let mut bar = String::new();
        let width = self
            .terminal_width()
            .saturating_sub(self.written_chars + PERCENT_WIDTH);

        if self.show_bar && width > 0 {
            let filled = (width as u128 * rows as u128 / total_rows as u128) as usize;
            bar.push_str(BAR_COLOR);
            bar.push_str(&"█".repeat(filled));
            bar.push_str(&" ".repeat(width - filled));
            bar.push_str(RESET_COLOR);
        }

        bar.push_str(&format!(" {:>2}%", percent(rows, total_rows)));
        bar
    }

    fn terminal_width(&self) -> usize {
        self.width.unwrap_or_else(|| {
            crossterm::terminal::size()
                .map(|(columns, _)| columns as usize)
                .unwrap_or(DEFAULT_WIDTH)
        })
    }
}

/// Scaled to 99 so an unfinished query never reads as 100%.
fn percent(rows: u64, total_rows: u64) -> u64 {
    (rows as u128 * 99 / total_rows as u128) as u64
}

fn status_line(rows: u64, bytes: u64, elapsed: Duration) -> String {
    let quantity = QuantityFormatter;
    let size = SizeFormatter;

    let throughput = if elapsed.is_zero() {
        ". ".to_string()
    } else {
        let seconds = elapsed.as_secs_f64();
        format!(
            " ({} rows/s., {}/s.) ",
            quantity.format(rows as f64 / seconds),
            size.format(bytes as f64 / seconds)
        )
    };

    format!(
        " Progress: {} rows, {}{}",
        quantity.format(rows as f64),
        size.format(bytes as f64),
        throughput
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(renderer: &mut ProgressRenderer, rows: u64, total: u64, millis: u64) -> String {
        let mut out = Vec::new();
        renderer
            .render(&mut out, rows, rows * 8, total, Duration::from_millis(millis))
            .unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn status_line_without_elapsed_time_has_no_throughput() {
        assert_eq!(
            status_line(1500, 2_000_000, Duration::ZERO),
            " Progress: 1.50 thousand rows, 2.00 MB. "
        );
    }

    #[test]
    fn status_line_reports_throughput() {
        assert_eq!(
            status_line(2000, 4000, Duration::from_secs(2)),
            " Progress: 2.00 thousand rows, 4.00 KB (1.00 thousand rows/s., 2.00 KB/s.) "
        );
    }

    #[test]
    fn bar_appears_after_half_a_second_when_less_than_half_done() {
        let mut renderer = ProgressRenderer::new(true).with_width(120);

        let painted = render(&mut renderer, 10, 1000, 600);

        assert!(renderer.bar_visible());
        assert!(painted.contains(BAR_COLOR));
        assert!(painted.ends_with("  0%"));
    }

    #[test]
    fn bar_waits_for_half_a_second() {
        let mut renderer = ProgressRenderer::new(true).with_width(120);

        let painted = render(&mut renderer, 10, 1000, 400);

        assert!(!renderer.bar_visible());
        assert!(!painted.contains('%'));
    }

    #[test]
    fn bar_does_not_newly_appear_past_half() {
        let mut renderer = ProgressRenderer::new(true).with_width(120);

        let painted = render(&mut renderer, 600, 1000, 600);

        assert!(!renderer.bar_visible());
        assert!(!painted.contains(BAR_COLOR));
        assert!(painted.ends_with(" 59%"));
    }

    #[test]
    fn bar_stays_once_shown() {
        let mut renderer = ProgressRenderer::new(true).with_width(120);

        render(&mut renderer, 10, 1000, 600);
        let painted = render(&mut renderer, 900, 1000, 900);

        assert!(renderer.bar_visible());
        assert!(painted.contains(BAR_COLOR));
    }

    #[test]
    fn percentage_never_reaches_one_hundred() {
        assert_eq!(percent(1000, 1000), 99);
        assert_eq!(percent(999, 1000), 98);
        assert_eq!(percent(0, 1000), 0);
    }

    #[test]
    fn rows_beyond_the_estimate_fill_the_bar() {
        let mut renderer = ProgressRenderer::new(true).with_width(120);

        render(&mut renderer, 1, 1000, 600);
        let painted = render(&mut renderer, 5000, 1000, 700);

        assert!(!painted.contains(&format!("█ {}", RESET_COLOR)));
        assert!(painted.ends_with(" 99%"));
    }

    #[test]
    fn each_paint_restores_the_previous_one() {
        let mut renderer = ProgressRenderer::new(true).with_width(120);

        let first = render(&mut renderer, 1, 0, 10);
        let second = render(&mut renderer, 2, 0, 20);

        assert!(first.starts_with(SAVE_CURSOR));
        assert!(second.starts_with(&format!("{}{}", RESTORE_CURSOR, CLEAR_TO_END_OF_LINE)));
    }

    #[test]
    fn clear_is_a_no_op_when_nothing_is_drawn() {
        let mut renderer = ProgressRenderer::new(true);
        let mut out = Vec::new();

        renderer.clear(&mut out).unwrap();

        assert!(out.is_empty());
    }

    #[test]
    fn disabled_renderer_writes_nothing() {
        let mut renderer = ProgressRenderer::new(false).with_width(120);

        assert!(render(&mut renderer, 10, 1000, 600).is_empty());
        assert!(!renderer.is_drawn());
    }
}

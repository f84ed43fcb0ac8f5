//! Console implementation of the StylesheetSink port.
//! Prints one report line per applied sheet.

use crate::domain::Stylesheet;
use crate::ports::StylesheetSink;
use anyhow::{Context, Result};
use std::io::Write;

pub struct ConsoleSink<W: Write> {
    out: W,
}

impl ConsoleSink<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write> ConsoleSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }
}

pub fn report_line(sheet: &Stylesheet) -> String {
    format!(
        "[{}] applied {} ({} rules, {} bytes)",
        sheet.loaded_at.format("%H:%M:%S"),
        sheet.url(),
        sheet.rule_count(),
        sheet.contents.len()
    )
}

impl<W: Write> StylesheetSink for ConsoleSink<W> {
    fn apply(&mut self, sheet: &Stylesheet) -> Result<()> {
        writeln!(self.out, "{}", report_line(sheet)).context("Failed to write report line")?;
        self.out.flush().context("Failed to flush report line")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Local, TimeZone};
    use pretty_assertions::assert_eq;

    #[test]
    fn report_line_describes_the_sheet() {
        let loaded_at = Local.with_ymd_and_hms(2024, 5, 1, 9, 30, 5).unwrap();
        let sheet = Stylesheet::new(
            "/data/config.css",
            ".btn { color: red; }\n".to_string(),
            loaded_at,
        );

        let mut sink = ConsoleSink::new(Vec::new());
        sink.apply(&sheet).unwrap();

        assert_eq!(
            String::from_utf8(sink.out).unwrap(),
            "[09:30:05] applied file:///data/config.css (1 rules, 21 bytes)\n"
        );
    }
}

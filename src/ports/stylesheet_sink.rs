//! Stylesheet sink port (trait).
//! Whatever presents the stylesheet: a window, a console, a test recorder.

use crate::domain::Stylesheet;
use anyhow::Result;

pub trait StylesheetSink {
    /// Replace whatever sheet is currently applied with `sheet`.
    fn apply(&mut self, sheet: &Stylesheet) -> Result<()>;
}

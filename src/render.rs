//! Terminal output renderer for status and section/field rows.
//!
//! All human-facing output goes to stderr so stdout stays clean for
//! machine-consumable values (`mercato token` prints the bare token there).

use crossterm::style::{Color, Stylize};

/// Compact stderr renderer with an on/off color switch.
#[derive(Debug, Clone, Copy)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(color: bool) -> Self {
        Self { color }
    }

    /// Titled section divider.
    pub fn section(&self, title: &str) {
        if self.color {
            eprintln!("{}", format!("== {title}").with(Color::Cyan).bold());
        } else {
            eprintln!("== {title}");
        }
    }

    /// One key/value field row.
    pub fn field(&self, key: &str, value: &str) {
        if self.color {
            eprintln!("  {} {value}", format!("{key}:").with(Color::DarkGrey));
        } else {
            eprintln!("  {key}: {value}");
        }
    }

    /// Supplementary detail text.
    pub fn detail(&self, text: &str) {
        eprintln!("  {text}");
    }

    /// Warning line.
    pub fn warn(&self, msg: &str) {
        if self.color {
            eprintln!("{} {msg}", "warning:".with(Color::Yellow).bold());
        } else {
            eprintln!("warning: {msg}");
        }
    }

    /// Error line.
    pub fn error(&self, msg: &str) {
        if self.color {
            eprintln!("{} {msg}", "error:".with(Color::Red).bold());
        } else {
            eprintln!("error: {msg}");
        }
    }
}

//! Static registry of wire formats, keyed by name.
//!
//! Initialised on first use and read-only afterwards, so lookups from many
//! integrations need no locking.

use std::collections::HashMap;
use std::sync::OnceLock;

use crate::Formatter;
use crate::error::{FormatError, FormatResult};
use crate::json::JsonFormatter;

/// A registered wire format.
pub struct Format {
    pub name: &'static str,
    /// Human-readable name for listings.
    pub display_name: &'static str,
    pub formatter: &'static dyn Formatter,
}

static JSON: JsonFormatter = JsonFormatter;

static FORMATS: OnceLock<HashMap<&'static str, Format>> = OnceLock::new();

fn formats() -> &'static HashMap<&'static str, Format> {
    FORMATS.get_or_init(|| {
        let mut formats = HashMap::new();
        formats.insert(
            JSON.name(),
            Format {
                name: JSON.name(),
                display_name: "JSON",
                formatter: &JSON,
            },
        );
        formats
    })
}

/// Look up a format entry by name.
pub fn format(name: &str) -> FormatResult<&'static Format> {
    formats()
        .get(name)
        .ok_or_else(|| FormatError::UnsupportedFormat(name.to_string()))
}

/// Look up the formatter registered under `name`.
pub fn lookup(name: &str) -> FormatResult<&'static dyn Formatter> {
    format(name).map(|f| f.formatter)
}

/// Names of all registered formats, sorted.
pub fn names() -> Vec<&'static str> {
    let mut names: Vec<_> = formats().keys().copied().collect();
    names.sort_unstable();
    names
}

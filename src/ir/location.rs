use std::fmt;

/// A source location attached to decoded operations and diagnostics.
///
/// Locations inside a function body come from the LocationPositions
/// table. When a diagnostic has no decoded position, the origin location
/// the caller passed to `decode` is used instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    Unknown,
    /// Caller-supplied origin, e.g. the path of the BEF file itself.
    Origin(String),
    FileLineCol {
        filename: String,
        line: u64,
        col: u64,
    },
}

impl Default for Location {
    fn default() -> Self {
        Location::Unknown
    }
}

impl Location {
    pub fn origin(name: impl Into<String>) -> Self {
        Location::Origin(name.into())
    }

    pub fn file_line_col(filename: impl Into<String>, line: u64, col: u64) -> Self {
        Location::FileLineCol {
            filename: filename.into(),
            line,
            col,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Unknown => f.write_str("<unknown>"),
            Location::Origin(name) => f.write_str(name),
            Location::FileLineCol {
                filename,
                line,
                col,
            } => write!(f, "{}:{}:{}", filename, line, col),
        }
    }
}

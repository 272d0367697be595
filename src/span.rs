use line_col::LineColLookup;
use std::path::PathBuf;
use std::sync::Arc;

/// A byte range into a source file. The analysis core never holds the source
/// text itself; consumers that do can recover line/column info via
/// [`Span::line_col`].
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct Span {
    pub(crate) start: usize,
    pub(crate) end: usize,
    pub(crate) path: Option<Arc<PathBuf>>,
}

impl Span {
    pub fn new(start: usize, end: usize, path: Option<Arc<PathBuf>>) -> Span {
        Span { start, end, path }
    }

    /// Span for built-in declarations that have no source location.
    pub fn builtin() -> Span {
        Span {
            start: 0,
            end: 0,
            path: None,
        }
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn end(&self) -> usize {
        self.end
    }

    pub fn path(&self) -> String {
        self.path
            .as_deref()
            .map(|path| path.to_string_lossy().into_owned())
            .unwrap_or_else(|| "<builtin>".into())
    }

    /// Returns the 1-indexed line and column of both endpoints, given the
    /// source text of the file this span points into.
    pub fn line_col(&self, input: &str) -> (LineCol, LineCol) {
        let lookup = LineColLookup::new(input);
        let start = lookup.get(self.start.min(input.len()));
        let end = lookup.get(self.end.min(input.len()));
        (start.into(), end.into())
    }
}

pub struct LineCol {
    pub line: usize,
    pub col: usize,
}

impl From<(usize, usize)> for LineCol {
    fn from(o: (usize, usize)) -> Self {
        LineCol {
            line: o.0,
            col: o.1,
        }
    }
}

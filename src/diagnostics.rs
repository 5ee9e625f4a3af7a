mod writer;

pub use writer::*;

use std::path::Path;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use termcolor::{ColorChoice, StandardStream};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Error,
    Warning,
    Note,
}

/// A line within a trace file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinePos {
    pub path: Arc<Path>,
    /// 1-based
    pub line: usize,
}

/// Reports errors to the user and counts how many were emitted
pub struct Diagnostics<W: DiagnosticsWriter = StandardStream> {
    out: Mutex<W>,
    emitted_errors: Mutex<usize>,
}

impl Diagnostics {
    /// Creates diagnostics that write to stderr
    pub fn new(color_choice: ColorChoice) -> Self {
        Self::with_writer(StandardStream::stderr(color_choice))
    }
}

impl<W: DiagnosticsWriter> Diagnostics<W> {
    pub fn with_writer(out: W) -> Self {
        Self {
            out: Mutex::new(out),
            emitted_errors: Mutex::new(0),
        }
    }

    /// Provides direct access to the stream that diagnostics are written to
    pub fn output_stream(&self) -> MutexGuard<W> {
        self.out.lock()
    }

    pub fn emitted_errors(&self) -> usize {
        *self.emitted_errors.lock()
    }

    pub fn error(&self, message: impl Into<String>) -> Diagnostic<W> {
        Diagnostic::new(self, Level::Error, None, message.into())
    }

    pub fn line_error(&self, pos: LinePos, message: impl Into<String>) -> Diagnostic<W> {
        Diagnostic::new(self, Level::Error, Some(pos), message.into())
    }

    pub fn warning(&self, message: impl Into<String>) -> Diagnostic<W> {
        Diagnostic::new(self, Level::Warning, None, message.into())
    }
}

/// A diagnostic that has been built but not emitted yet
#[must_use = "diagnostics do nothing unless `emit` is called"]
pub struct Diagnostic<'a, W: DiagnosticsWriter> {
    diag: &'a Diagnostics<W>,
    level: Level,
    pos: Option<LinePos>,
    message: String,
    notes: Vec<String>,
}

impl<'a, W: DiagnosticsWriter> Diagnostic<'a, W> {
    fn new(diag: &'a Diagnostics<W>, level: Level, pos: Option<LinePos>, message: String) -> Self {
        Self {diag, level, pos, message, notes: Vec::new()}
    }

    pub fn note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn emit(self) {
        let Self {diag, level, pos, message, notes} = self;

        if level == Level::Error {
            *diag.emitted_errors.lock() += 1;
        }

        let mut out = diag.out.lock();
        // Nothing sensible can be done if writing a diagnostic fails
        let _ = out.write_diag(level, pos.as_ref(), &message);
        for note in notes {
            let _ = out.write_diag(Level::Note, None, &note);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_are_counted_and_written() {
        let diag = Diagnostics::with_writer(BytesWriter::new());
        let path: Arc<Path> = Path::new("a.flow").into();

        diag.line_error(LinePos {path, line: 3}, "unknown set `x`").note("declare it with `set x`").emit();
        diag.warning("not counted").emit();

        assert_eq!(diag.emitted_errors(), 1);
        let output = String::from_utf8(diag.output_stream().drain()).unwrap();
        assert_eq!(output, "[a.flow:3] error: unknown set `x`\nnote: declare it with `set x`\nwarning: not counted\n");
    }
}

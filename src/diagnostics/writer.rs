use std::io::{self, Write};

use termcolor::{StandardStream, ColorSpec, Color, WriteColor};

use super::{Level, LinePos};

pub trait DiagnosticsWriter: Write + WriteColor {
    fn write_diag(&mut self, level: Level, pos: Option<&LinePos>, message: &str) -> io::Result<()> {
        if let Some(LinePos {path, line}) = pos {
            write!(self, "[{}:{}] ", path.display(), line)?;
        }

        let (prefix, prefix_color) = level_prefix(level);
        self.set_color(ColorSpec::new().set_fg(Some(prefix_color)).set_bold(true))?;
        write!(self, "{}: ", prefix)?;
        self.reset()?;

        writeln!(self, "{}", message)
    }
}

impl DiagnosticsWriter for StandardStream {}

fn level_prefix(level: Level) -> (&'static str, Color) {
    use Level::*;
    match level {
        Error => ("error", Color::Red),
        Warning => ("warning", Color::Yellow),
        Note => ("note", Color::Green),
    }
}

/// Collects diagnostics in memory without any color
#[derive(Debug, Default)]
pub struct BytesWriter {
    value: Vec<u8>,
}

impl BytesWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the entire value currently stored in the writer and resets it to an empty buffer
    pub fn drain(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.value)
    }
}

impl Write for BytesWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.value.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.value.flush()
    }
}

impl WriteColor for BytesWriter {
    fn supports_color(&self) -> bool {
        false
    }

    fn set_color(&mut self, _: &ColorSpec) -> io::Result<()> {
        Ok(())
    }

    fn reset(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl DiagnosticsWriter for BytesWriter {}

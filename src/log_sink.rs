//! The server's user-facing log: tagged lines to a file or to stdout.

use std::{
    fs::OpenOptions,
    io::{self, Write},
    path::Path,
};

/// prefix on every line
pub const LOG_TAG: &str = "script-server: ";

pub struct LogSink {
    out: Box<dyn Write + Send>,
}

impl LogSink {
    pub fn stdout() -> Self {
        Self::to_writer(Box::new(io::stdout()))
    }

    /// Append to `path`, creating it if needed.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::to_writer(Box::new(file)))
    }

    /// `None` or an empty path logs to stdout.
    pub fn from_path(path: Option<&Path>) -> io::Result<Self> {
        match path {
            Some(p) if !p.as_os_str().is_empty() => Self::open(p),
            _ => Ok(Self::stdout()),
        }
    }

    pub fn to_writer(out: Box<dyn Write + Send>) -> Self {
        Self { out }
    }

    pub fn line(&mut self, message: &str) {
        log::info!("{message}");
        self.write_line(message);
    }

    pub fn warn(&mut self, message: &str) {
        log::warn!("{message}");
        self.write_line(message);
    }

    // logging must never take the server down
    fn write_line(&mut self, message: &str) {
        let _ = writeln!(self.out, "{LOG_TAG}{message}");
        let _ = self.out.flush();
    }
}

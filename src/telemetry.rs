//! Tracing subscriber setup for the `ruccola` binary.
//!
//! The library never installs a subscriber; clients take a [`tracing::Span`]
//! instead. This module is the one place a process-wide subscriber is
//! created, and it hands back a [`LogGuard`] that owns the log file.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "ruccola=info";
const VERBOSE_FILTER: &str = "ruccola=debug";

/// Owns the log destination for the lifetime of the process.
///
/// Dropping the guard flushes buffered records to disk.
#[derive(Debug)]
pub struct LogGuard {
    file: Option<SharedLogFile>,
}

impl LogGuard {
    /// Flushes buffered records without giving up the file.
    pub fn flush(&self) -> io::Result<()> {
        match &self.file {
            Some(file) => file.clone().flush(),
            None => io::stderr().flush(),
        }
    }
}

impl Drop for LogGuard {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

/// Buffered log file shared between the subscriber and the guard.
#[derive(Clone, Debug)]
struct SharedLogFile(Arc<Mutex<BufWriter<File>>>);

impl SharedLogFile {
    fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self(Arc::new(Mutex::new(BufWriter::new(file)))))
    }
}

impl Write for SharedLogFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut writer = self
            .0
            .lock()
            .map_err(|_| io::Error::other("log file lock poisoned"))?;
        writer.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut writer = self
            .0
            .lock()
            .map_err(|_| io::Error::other("log file lock poisoned"))?;
        writer.flush()
    }
}

/// Picks the filter: `RUST_LOG` wins, then `verbose`, then the default.
pub fn env_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if verbose {
            VERBOSE_FILTER
        } else {
            DEFAULT_FILTER
        })
    })
}

/// Installs the global fmt subscriber.
///
/// With `log_file`, records are appended to that file instead of stderr so
/// they do not interleave with command output.
pub fn init(log_file: Option<&Path>, verbose: bool) -> io::Result<LogGuard> {
    let filter = env_filter(verbose);

    let Some(path) = log_file else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(io::stderr)
            .try_init()
            .map_err(io::Error::other)?;
        return Ok(LogGuard { file: None });
    };

    let file = SharedLogFile::open(path)?;
    let writer = file.clone();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .try_init()
        .map_err(io::Error::other)?;

    Ok(LogGuard { file: Some(file) })
}

//! Incremental reader over a captured-output file
//!
//! A [`LogTail`] treats a file that another process keeps appending to as an
//! unbounded sequence of lines. Every [`LogTail::read`] hands back the
//! complete lines written since the previous call, so concatenating all
//! batches reproduces the file with nothing dropped or repeated.

use crate::{Error, Result};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Tail reader with a monotonic byte offset
#[derive(Debug)]
pub struct LogTail {
    path: PathBuf,
    reading_from: u64,
    mid_line: bool,
}

impl LogTail {
    /// Tail `path` from its beginning
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            reading_from: 0,
            mid_line: false,
        }
    }

    /// Tail `path` from its current end
    pub fn at_end(path: impl Into<PathBuf>) -> Result<Self> {
        let mut tail = Self::open(path);
        tail.flush()?;
        Ok(tail)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Byte offset of the next unread line
    pub fn offset(&self) -> u64 {
        self.reading_from
    }

    /// Return the complete lines appended since the previous read.
    ///
    /// A trailing line without its newline stays unread until it is finished.
    pub fn read(&mut self) -> Result<Vec<String>> {
        let mut file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let len = file.metadata()?.len();
        if len < self.reading_from {
            warn!(
                "{} shrank from {} to {} bytes, reading from the start",
                self.path.display(),
                self.reading_from,
                len
            );
            self.reading_from = 0;
            self.mid_line = false;
        }
        if len == self.reading_from {
            return Ok(Vec::new());
        }

        file.seek(SeekFrom::Start(self.reading_from))?;
        let mut buf = Vec::with_capacity((len - self.reading_from) as usize);
        file.take(len - self.reading_from).read_to_end(&mut buf)?;

        let complete = match buf.iter().rposition(|b| *b == b'\n') {
            Some(last) => &buf[..=last],
            None => return Ok(Vec::new()),
        };

        self.reading_from += complete.len() as u64;
        let complete = if self.mid_line {
            self.mid_line = false;
            let first = complete.iter().position(|b| *b == b'\n').map_or(0, |i| i + 1);
            &complete[first..]
        } else {
            complete
        };

        let lines: Vec<String> = String::from_utf8_lossy(complete)
            .lines()
            .map(|l| l.trim_end_matches('\r').to_string())
            .collect();

        trace!(
            "Read {} lines from {} (offset {})",
            lines.len(),
            self.path.display(),
            self.reading_from
        );
        Ok(lines)
    }

    /// Skip everything written so far.
    ///
    /// If the file currently ends in an unfinished line, the rest of that line
    /// is dropped when it completes, so it is never reported as a new line.
    pub fn flush(&mut self) -> Result<()> {
        let mut file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.reading_from = 0;
                self.mid_line = false;
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let len = file.metadata()?.len();
        self.mid_line = if len == 0 {
            false
        } else {
            let mut last = [0u8; 1];
            file.seek(SeekFrom::Start(len - 1))?;
            file.read_exact(&mut last)?;
            last[0] != b'\n'
        };
        self.reading_from = len;
        Ok(())
    }

    /// Poll until a new line contains `marker`, returning that line
    pub fn wait_for_marker(
        &mut self,
        marker: &str,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<String> {
        debug!("Waiting up to {:?} for '{}' in {}", timeout, marker, self.path.display());
        let start = Instant::now();

        loop {
            if let Some(line) = self.read()?.into_iter().find(|l| l.contains(marker)) {
                debug!("Marker '{}' seen after {:?}", marker, start.elapsed());
                return Ok(line);
            }

            let elapsed = start.elapsed();
            if elapsed >= timeout {
                return Err(Error::MarkerTimeout {
                    marker: marker.to_string(),
                    path: self.path.clone(),
                    waited: elapsed,
                });
            }

            std::thread::sleep(poll_interval.min(timeout - elapsed));
        }
    }
}

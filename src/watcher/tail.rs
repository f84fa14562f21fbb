//! Incremental reader for an append-only JSON-lines file.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Read position within one transcript file.
#[derive(Debug, Clone)]
pub struct TranscriptTail {
    path: PathBuf,
    /// Bytes already consumed from `path`
    offset: u64,
    /// Trailing bytes not yet terminated by a newline
    partial: Vec<u8>,
    /// The last read attempt failed
    failing: bool,
}

impl TranscriptTail {
    /// Start tailing `path` from the beginning.
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            offset: 0,
            partial: Vec::new(),
            failing: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn pending_bytes(&self) -> usize {
        self.partial.len()
    }

    /// Whether the most recent read failed. Cleared by the next successful
    /// read.
    pub fn is_failing(&self) -> bool {
        self.failing
    }

    /// Read whatever was appended since the last call and return the newly
    /// completed lines, in file order. Blank lines are skipped.
    ///
    /// If the file is no larger than the consumed offset (nothing new, or a
    /// truncation) nothing is read. The offset only moves after a successful
    /// read, so an I/O error leaves the tail untouched for the next attempt.
    pub fn read_new_lines(&mut self) -> std::io::Result<Vec<String>> {
        let result = self.read_appended();
        self.failing = result.is_err();
        result
    }

    fn read_appended(&mut self) -> std::io::Result<Vec<String>> {
        let size = std::fs::metadata(&self.path)?.len();
        if size <= self.offset {
            return Ok(Vec::new());
        }

        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(self.offset))?;
        let mut chunk = vec![0u8; (size - self.offset) as usize];
        file.read_exact(&mut chunk)?;
        self.offset = size;

        let mut buffer = std::mem::take(&mut self.partial);
        buffer.extend_from_slice(&chunk);

        let mut lines = Vec::new();
        let mut start = 0;
        for (index, byte) in buffer.iter().enumerate() {
            if *byte != b'\n' {
                continue;
            }
            let mut line = &buffer[start..index];
            if let [rest @ .., b'\r'] = line {
                line = rest;
            }
            if !line.iter().all(u8::is_ascii_whitespace) {
                lines.push(String::from_utf8_lossy(line).into_owned());
            }
            start = index + 1;
        }
        self.partial = buffer[start..].to_vec();

        Ok(lines)
    }
}

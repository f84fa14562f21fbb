//! Ring buffer for terminal output
//!
//! Keeps the tail of what an agent printed so a startup failure can be
//! reported with the CLI's last words.

/// A fixed-capacity ring buffer
///
/// When the buffer is full, old data is overwritten by new data.
pub struct RingBuffer {
    data: Vec<u8>,
    capacity: usize,
    /// Where the next byte goes once the buffer is full
    write_pos: usize,
    /// Total bytes written (may exceed capacity due to wraparound)
    total_written: usize,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            capacity,
            write_pos: 0,
            total_written: 0,
        }
    }

    /// Write data to the buffer, overwriting the oldest bytes when full.
    pub fn write(&mut self, data: &[u8]) {
        self.total_written += data.len();
        if self.capacity == 0 {
            return;
        }

        // only the last `capacity` bytes can survive
        let data = if data.len() > self.capacity {
            &data[data.len() - self.capacity..]
        } else {
            data
        };

        let room = self.capacity - self.data.len();
        let (fill, rest) = data.split_at(data.len().min(room));
        self.data.extend_from_slice(fill);
        self.write_pos = self.data.len() % self.capacity;

        for &byte in rest {
            self.data[self.write_pos] = byte;
            self.write_pos = (self.write_pos + 1) % self.capacity;
        }
    }

    /// All buffered bytes, oldest first.
    pub fn read_all(&self) -> Vec<u8> {
        if self.data.len() < self.capacity {
            return self.data.clone();
        }
        let mut out = Vec::with_capacity(self.capacity);
        out.extend_from_slice(&self.data[self.write_pos..]);
        out.extend_from_slice(&self.data[..self.write_pos]);
        out
    }

    /// Last non-blank line of the buffered output with terminal escape
    /// sequences removed.
    pub fn last_line(&self) -> Option<String> {
        let plain = strip_ansi_escapes::strip(self.read_all());
        String::from_utf8_lossy(&plain)
            .lines()
            .map(str::trim)
            .rev()
            .find(|line| !line.is_empty())
            .map(str::to_string)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn has_wrapped(&self) -> bool {
        self.total_written > self.capacity
    }

    pub fn total_written(&self) -> usize {
        self.total_written
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

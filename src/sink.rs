use std::fs;
use std::io::{self, Cursor, Seek, SeekFrom, Write};
use std::path::Path;

/// Positional byte sink the emit pass streams into.
///
/// Padding between regions is seeked over, never written, so skipped
/// ranges must read back as zero (files and `MemorySink` both do).
pub trait OatSink {
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()>;

    /// Seeks relative to the current position and returns the new
    /// absolute position. Seeking past the end is allowed.
    fn seek_relative(&mut self, delta: i64) -> io::Result<u64>;

    /// Identity used in error reports, typically the file path.
    fn name(&self) -> &str;
}

pub struct FileSink {
    file: fs::File,
    name: String,
}

impl FileSink {
    pub fn create<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let name = path.as_ref().display().to_string();
        let file = fs::File::create(path)?;
        Ok(Self { file, name })
    }

    pub fn from_file(file: fs::File, name: String) -> Self {
        Self { file, name }
    }

    pub fn into_inner(self) -> fs::File {
        self.file
    }
}

impl OatSink for FileSink {
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.file.write_all(buf)
    }

    fn seek_relative(&mut self, delta: i64) -> io::Result<u64> {
        self.file.seek(SeekFrom::Current(delta))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Growable in-memory sink; gaps left by seeks read back as zeros.
pub struct MemorySink {
    buf: Cursor<Vec<u8>>,
    name: String,
}

impl MemorySink {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            buf: Cursor::new(Vec::new()),
            name: name.into(),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        self.buf.get_ref()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf.into_inner()
    }
}

impl OatSink for MemorySink {
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.buf.write_all(buf)
    }

    fn seek_relative(&mut self, delta: i64) -> io::Result<u64> {
        self.buf.seek(SeekFrom::Current(delta))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_zero_fills_seek_gap() {
        let mut sink = MemorySink::new("[in-memory]");
        sink.write_all(b"ab").unwrap();
        let pos = sink.seek_relative(3).unwrap();
        assert_eq!(pos, 5);
        sink.write_all(b"cd").unwrap();
        assert_eq!(sink.bytes(), b"ab\0\0\0cd");
    }

    #[test]
    fn test_memory_sink_trailing_seek_leaves_len() {
        let mut sink = MemorySink::new("[in-memory]");
        sink.write_all(b"abcd").unwrap();
        assert_eq!(sink.seek_relative(100).unwrap(), 104);
        assert_eq!(sink.bytes().len(), 4);
    }
}

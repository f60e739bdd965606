//! Result log: append-only file of per-frame query results
//!
//! File format (binary):
//! [magic: u32 LE] [version: u16 LE]
//! then one record per frame:
//! [length: u32 LE] [crc32: u32 LE] [bincode FrameResult: length bytes]
//!
//! A record cut short at the end of the file (crash while appending) ends
//! iteration without an error. A checksum mismatch is reported.

use crate::format_version::{self, magic, RESULT_LOG_FORMAT_VERSION};
use crate::query::FrameResult;
use crate::{Error, Result};
use crc32fast::Hasher;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const HEADER_SIZE: usize = 6;
/// Larger length prefixes are treated as corruption
pub const MAX_RECORD_SIZE: usize = 64 * 1024 * 1024;

fn checksum(payload: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(payload);
    hasher.finalize()
}

/// Encode one frame result with framing and CRC
pub fn encode_record(result: &FrameResult) -> Result<Vec<u8>> {
    let payload = bincode::serialize(result)
        .map_err(|e| Error::Serialization(format!("Failed to serialize frame result: {}", e)))?;
    if payload.len() > MAX_RECORD_SIZE {
        return Err(Error::Serialization(format!(
            "Frame result too large: {} bytes",
            payload.len()
        )));
    }
    let length = payload.len() as u32;

    let mut frame = Vec::with_capacity(8 + payload.len());
    frame.extend_from_slice(&length.to_le_bytes());
    frame.extend_from_slice(&checksum(&payload).to_le_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Appends frame results to a log file
pub struct ResultLogWriter {
    file: BufWriter<File>,
    path: PathBuf,
    records: u64,
}

impl ResultLogWriter {
    /// Create (or truncate) a log file and write its header
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)?;

        let mut file = BufWriter::new(file);
        file.write_all(&magic::RESULT_LOG.to_le_bytes())?;
        file.write_all(&RESULT_LOG_FORMAT_VERSION.to_le_bytes())?;

        debug!(path = %path.display(), "Created result log");
        Ok(Self {
            file,
            path,
            records: 0,
        })
    }

    /// Append one frame result. Returns the number of records written so far.
    pub fn append(&mut self, result: &FrameResult) -> Result<u64> {
        let encoded = encode_record(result)?;
        self.file.write_all(&encoded)?;
        self.records += 1;
        Ok(self.records)
    }

    /// Flush buffered records and fsync the file
    pub fn sync(&mut self) -> Result<()> {
        self.file.flush()?;
        self.file.get_ref().sync_all()?;
        Ok(())
    }

    /// File being written
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records appended through this writer
    pub fn records(&self) -> u64 {
        self.records
    }
}

impl Drop for ResultLogWriter {
    fn drop(&mut self) {
        if let Err(e) = self.file.flush() {
            warn!(path = %self.path.display(), error = %e, "Failed to flush result log");
        }
    }
}

/// Reads frame results back from a log file
pub struct ResultLogReader {
    reader: BufReader<File>,
    version: u16,
    done: bool,
}

impl ResultLogReader {
    /// Open a log file and validate its header
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut reader = BufReader::new(File::open(path.as_ref())?);

        let mut header = [0u8; HEADER_SIZE];
        reader.read_exact(&mut header).map_err(|e| match e.kind() {
            ErrorKind::UnexpectedEof => {
                Error::Serialization("Result log header is incomplete".to_string())
            }
            _ => Error::Io(e),
        })?;

        let found = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        if found != magic::RESULT_LOG {
            return Err(Error::Serialization(format!(
                "Not a result log: bad magic {:#010x}",
                found
            )));
        }
        let version = u16::from_le_bytes([header[4], header[5]]);
        format_version::RESULT_LOG.check(version)?;

        Ok(Self {
            reader,
            version,
            done: false,
        })
    }

    /// Format version found in the header
    pub fn version(&self) -> u16 {
        self.version
    }

    /// Fill `buf` completely. `Ok(false)` means the file ended first.
    fn read_full(&mut self, buf: &mut [u8]) -> Result<bool> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => return Ok(false),
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(Error::Io(e)),
            }
        }
        Ok(true)
    }

    fn next_record(&mut self) -> Result<Option<FrameResult>> {
        let mut prefix = [0u8; 8];
        let mut probe = [0u8; 1];
        // Clean end of file between records
        if !self.read_full(&mut probe)? {
            return Ok(None);
        }
        prefix[0] = probe[0];
        if !self.read_full(&mut prefix[1..])? {
            warn!("Result log ends with a truncated record header");
            return Ok(None);
        }

        let length = u32::from_le_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;
        let expected = u32::from_le_bytes([prefix[4], prefix[5], prefix[6], prefix[7]]);
        if length > MAX_RECORD_SIZE {
            return Err(Error::Serialization(format!(
                "Record length {} exceeds maximum {}",
                length, MAX_RECORD_SIZE
            )));
        }

        let mut payload = vec![0u8; length];
        if !self.read_full(&mut payload)? {
            warn!(length, "Result log ends with a truncated record");
            return Ok(None);
        }

        let actual = checksum(&payload);
        if actual != expected {
            return Err(Error::Serialization(format!(
                "CRC mismatch: expected {}, got {}",
                expected, actual
            )));
        }

        bincode::deserialize(&payload)
            .map(Some)
            .map_err(|e| Error::Serialization(format!("Failed to deserialize frame result: {}", e)))
    }
}

impl Iterator for ResultLogReader {
    type Item = Result<FrameResult>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_record() {
            Ok(Some(result)) => Some(Ok(result)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{Column, QueryOutput, Row, Value};
    use tempfile::tempdir;

    fn sample(frame_index: u64) -> FrameResult {
        FrameResult {
            frame_index,
            timestamp: frame_index as f64 / 30.0,
            outputs: vec![QueryOutput {
                query: "cars".to_string(),
                rows: vec![Row {
                    columns: vec![Column {
                        name: "track_id".to_string(),
                        alias: None,
                    }],
                    values: vec![Value::Integer(7)],
                }],
            }],
        }
    }

    #[test]
    fn test_write_and_read_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("results.vqrl");

        let mut writer = ResultLogWriter::create(&path).unwrap();
        for i in 0..3 {
            writer.append(&sample(i)).unwrap();
        }
        writer.sync().unwrap();
        assert_eq!(writer.records(), 3);
        drop(writer);

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..4], b"VQRL");

        let reader = ResultLogReader::open(&path).unwrap();
        assert_eq!(reader.version(), 1);
        let results: Vec<FrameResult> = reader.map(|r| r.unwrap()).collect();
        assert_eq!(results, vec![sample(0), sample(1), sample(2)]);
    }

    #[test]
    fn test_truncated_tail_is_ignored() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("results.vqrl");

        let mut writer = ResultLogWriter::create(&path).unwrap();
        writer.append(&sample(0)).unwrap();
        writer.append(&sample(1)).unwrap();
        writer.sync().unwrap();
        drop(writer);

        let len = std::fs::metadata(&path).unwrap().len();
        let file = OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(len - 5).unwrap();

        let results: Vec<FrameResult> = ResultLogReader::open(&path)
            .unwrap()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(results, vec![sample(0)]);
    }

    #[test]
    fn test_corruption_is_detected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("results.vqrl");

        let mut writer = ResultLogWriter::create(&path).unwrap();
        writer.append(&sample(0)).unwrap();
        writer.sync().unwrap();
        drop(writer);

        let mut bytes = std::fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        std::fs::write(&path, &bytes).unwrap();

        let mut reader = ResultLogReader::open(&path).unwrap();
        assert!(matches!(reader.next(), Some(Err(Error::Serialization(_)))));
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_rejects_foreign_files() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("other.bin");
        std::fs::write(&path, b"NOTALOG").unwrap();
        assert!(ResultLogReader::open(&path).is_err());

        std::fs::write(&path, b"VQ").unwrap();
        assert!(ResultLogReader::open(&path).is_err());

        let mut header = magic::RESULT_LOG.to_le_bytes().to_vec();
        header.extend_from_slice(&99u16.to_le_bytes());
        std::fs::write(&path, &header).unwrap();
        assert!(ResultLogReader::open(&path).is_err());
    }

    #[test]
    fn test_oversized_length_prefix() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("huge.vqrl");

        let mut bytes = magic::RESULT_LOG.to_le_bytes().to_vec();
        bytes.extend_from_slice(&RESULT_LOG_FORMAT_VERSION.to_le_bytes());
        bytes.extend_from_slice(&u32::MAX.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        std::fs::write(&path, &bytes).unwrap();

        let mut reader = ResultLogReader::open(&path).unwrap();
        assert!(matches!(reader.next(), Some(Err(Error::Serialization(_)))));
    }

    #[test]
    fn test_empty_log() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.vqrl");
        drop(ResultLogWriter::create(&path).unwrap());

        assert_eq!(ResultLogReader::open(&path).unwrap().count(), 0);
    }
}

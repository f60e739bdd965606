//! On-disk format identification for VQPy files.
//!
//! Every persisted file starts with a magic number followed by a format
//! version; readers refuse files written by a newer, unknown layout.

use crate::{Error, Result};

/// Result log format version written by this build
pub const RESULT_LOG_FORMAT_VERSION: u16 = 1;

/// Magic numbers for file validation
pub mod magic {
    /// Result log magic. Written little-endian, so files start with `VQRL`.
    pub const RESULT_LOG: u32 = u32::from_le_bytes(*b"VQRL");
}

/// Range of format versions a reader understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatVersion {
    /// Name used in error messages
    pub format: &'static str,
    /// Version written by this build
    pub current: u16,
    /// Oldest version still readable
    pub min_read: u16,
}

impl FormatVersion {
    /// Whether files of `version` can be read
    pub fn can_read(&self, version: u16) -> bool {
        (self.min_read..=self.current).contains(&version)
    }

    /// Fails with [`Error::Serialization`] unless `version` is readable
    pub fn check(&self, version: u16) -> Result<()> {
        if self.can_read(version) {
            Ok(())
        } else {
            Err(Error::Serialization(format!(
                "Unsupported {} version {} (supported {}..={})",
                self.format, version, self.min_read, self.current
            )))
        }
    }
}

/// Versions of the result log this build reads
pub const RESULT_LOG: FormatVersion = FormatVersion {
    format: "result log",
    current: RESULT_LOG_FORMAT_VERSION,
    min_read: 1,
};

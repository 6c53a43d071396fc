//! # Column File Format
//!
//! Binary serialization of a single named column (a one-column table).
//!
//! Format: Header (5 bytes) + postcard-serialized column.
//! - 4 bytes: Magic ("RDGC")
//! - 1 byte: Version
//!
//! ## Validation
//!
//! Loading validates before deserializing:
//! - Minimum size (header present)
//! - Maximum size (caller-supplied limit, prevents allocation blow-ups)
//! - Magic bytes and version

use crate::column::Column;
use crate::{RdgError, primitives};

/// Minimum valid file size (header only).
const MIN_FILE_SIZE: usize = 5;

// =============================================================================
// FILE HEADER
// =============================================================================

/// The header preceding every column payload.
#[derive(Debug, Clone, Copy)]
pub struct ColumnFileHeader {
    pub magic: [u8; 4],
    pub version: u8,
}

impl ColumnFileHeader {
    /// Create a header with the current format version.
    #[must_use]
    pub fn new() -> Self {
        Self {
            magic: *primitives::COLUMN_MAGIC_BYTES,
            version: primitives::COLUMN_FORMAT_VERSION,
        }
    }

    /// Validate the header.
    pub fn validate(&self) -> Result<(), RdgError> {
        if &self.magic != primitives::COLUMN_MAGIC_BYTES {
            return Err(RdgError::ArrowError("Invalid magic bytes".to_string()));
        }
        if self.version != primitives::COLUMN_FORMAT_VERSION {
            return Err(RdgError::ArrowError(format!(
                "Unsupported column format version: {} (expected {})",
                self.version,
                primitives::COLUMN_FORMAT_VERSION
            )));
        }
        Ok(())
    }

    /// Write header to bytes.
    pub fn to_bytes(&self) -> [u8; 5] {
        let mut bytes = [0u8; 5];
        bytes[0..4].copy_from_slice(&self.magic);
        bytes[4] = self.version;
        bytes
    }

    /// Read header from bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, RdgError> {
        if bytes.len() < MIN_FILE_SIZE {
            return Err(RdgError::ArrowError("Header too short".to_string()));
        }
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[0..4]);
        Ok(Self {
            magic,
            version: bytes[4],
        })
    }
}

impl Default for ColumnFileHeader {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// SERIALIZATION FUNCTIONS
// =============================================================================

/// Serialize a column to bytes (header + payload).
///
/// This is a pure transformation - no I/O.
pub fn column_to_bytes(column: &Column) -> Result<Vec<u8>, RdgError> {
    let header = ColumnFileHeader::new();
    let payload = postcard::to_stdvec(column).map_err(|e| RdgError::ArrowError(e.to_string()))?;

    let mut result = Vec::with_capacity(MIN_FILE_SIZE + payload.len());
    result.extend_from_slice(&header.to_bytes());
    result.extend_from_slice(&payload);

    Ok(result)
}

/// Deserialize a column from bytes.
///
/// This is a pure transformation - no I/O. `max_bytes` bounds the accepted
/// file size and is checked before the payload is touched.
pub fn column_from_bytes(bytes: &[u8], max_bytes: usize) -> Result<Column, RdgError> {
    if bytes.len() < MIN_FILE_SIZE {
        return Err(RdgError::ArrowError(format!(
            "Data too short: minimum {} bytes required",
            MIN_FILE_SIZE
        )));
    }

    if bytes.len() > max_bytes {
        return Err(RdgError::ArrowError(format!(
            "Column file of {} bytes exceeds maximum allowed {} bytes",
            bytes.len(),
            max_bytes
        )));
    }

    let header = ColumnFileHeader::from_bytes(bytes)?;
    header.validate()?;

    postcard::from_bytes(&bytes[MIN_FILE_SIZE..])
        .map_err(|e| RdgError::ArrowError(format!("Failed to deserialize column: {}", e)))
}

// =============================================================================
// TESTS
// =============================================================================

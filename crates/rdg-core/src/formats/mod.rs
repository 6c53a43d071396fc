//! # On-Storage Formats
//!
//! Pure byte-level encodings; file I/O lives in `storage`.

pub mod column_file;

pub use column_file::{ColumnFileHeader, column_from_bytes, column_to_bytes};

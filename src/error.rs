//! The crate's single tagged result type.
//!
//! The original driver this was ported from mixed `None`-returns,
//! `False`-returns, and raised exceptions for its error conditions; this
//! consolidates everything above the sector-image boundary into one enum.
//! Sector-level absence and write-refusal stay plain `Option`/`bool` returns
//! (see [`crate::image::SectorImage`]) rather than `Error` variants — they are
//! not failures, they are normal outcomes a caller is expected to handle
//! inline.

use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Open-time: the image could not be dispatched to any format handler.
    #[error("{path}: format not recognized")]
    FormatNotRecognized { path: PathBuf },

    /// Directory scan exhausted without finding a matching entry.
    #[error("file not found: {0}")]
    FileNotFound(String),

    /// The allocator could not find enough free granules.
    #[error("disk full")]
    DiskFull,

    /// Allocating the requested extents would exceed the five-extent FPDE
    /// capacity.
    #[error("file too fragmented (would need more than five extents)")]
    TooFragmented,

    /// No directory entry with attribute byte 0 in the scan range.
    #[error("no free directory slot")]
    NoFreeDirectorySlot,

    /// Propagated from the backing file's I/O (open/save).
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

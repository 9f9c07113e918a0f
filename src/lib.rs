//! Read/write driver for TRS-80 floppy disk images (JV1/JV3/DMK) and the
//! TRSDOS/NEWDOS-family filesystems they carry.
//!
//! The crate is organized in dependency order:
//!
//! - [`image`]: sector-addressable disk images, one handler per container
//!   format, behind a uniform `(cylinder, head, sector)` interface.
//! - [`fs`]: the TRSDOS/NEWDOS filesystem layer built on top of [`image`] —
//!   directory-track discovery, directory/extent decoding, the granule
//!   allocation table, and file read/write/delete.
//!
//! A user-space mount layer (translating POSIX calls onto
//! [`fs::TrsdosFileSystem`]'s operations) is an external collaborator; this
//! crate only defines the contract it consumes (see [`fs::TrsdosFileSystem`]'s
//! inherent methods).

pub mod error;
pub mod fs;
pub mod image;

pub use error::Error;
pub use fs::TrsdosFileSystem;
pub use image::DiskImage;

/// Every sector the filesystem layer deals with is exactly this many bytes.
pub const SECTOR_SIZE: usize = 256;

/// A single disk sector's payload.
pub type Sector = [u8; SECTOR_SIZE];

//! Shared value types for the filesystem layer.

use std::fmt;
use std::ops::Range;

/// How the analyzer located the directory track, and which sector-numbering
/// convention the image uses. Mirrors the tags the original driver's
/// analyzer assigns to `system_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemType {
    ModelI,
    ModelIOneBased,
    ModelIii4,
    ModelIii4OneBased,
    Newdos80Track9,
    Newdos80System,
    /// The directory track was found by the last-resort full scan.
    Detected(u8),
    /// Every probe failed; assumed Model I as a last resort.
    UnknownAssumedModelI,
}

impl fmt::Display for SystemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SystemType::ModelI => write!(f, "Model I"),
            SystemType::ModelIOneBased => write!(f, "Model I (1-based)"),
            SystemType::ModelIii4 => write!(f, "Model III/4"),
            SystemType::ModelIii4OneBased => write!(f, "Model III/4 (1-based)"),
            SystemType::Newdos80Track9 => write!(f, "NEWDOS/80 (Track 9)"),
            SystemType::Newdos80System => write!(f, "NEWDOS/80 (System)"),
            SystemType::Detected(track) => write!(f, "Detected (Track {track})"),
            SystemType::UnknownAssumedModelI => write!(f, "Unknown (Assumed Model I)"),
        }
    }
}

/// The operating-system variant identified from the directory listing and/or
/// the boot sector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OsVariant {
    #[default]
    Unknown,
    LdosLsDos,
    Newdos80,
    MultiDos,
    DosPlus,
    Trsdos,
    /// Files were found, but none matched a recognized system-file name.
    GenericCompatible,
    /// No files found, and the boot sector didn't look like a TRS-80 loader.
    NonBootable,
    /// No files found, but the boot sector looks like Z80 boot code.
    Booter,
    /// `list_files` itself failed while analyzing.
    ReadError,
}

impl fmt::Display for OsVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OsVariant::Unknown => "Unknown",
            OsVariant::LdosLsDos => "LDOS / LS-DOS",
            OsVariant::Newdos80 => "NEWDOS/80",
            OsVariant::MultiDos => "MultiDOS",
            OsVariant::DosPlus => "DOSPLUS",
            OsVariant::Trsdos => "TRSDOS",
            OsVariant::GenericCompatible => "Generic TRSDOS-compatible",
            OsVariant::NonBootable => "Unknown / Non-Bootable",
            OsVariant::Booter => "Booter / Non-Standard FS",
            OsVariant::ReadError => "Read Error",
        };
        write!(f, "{s}")
    }
}

/// The range of directory sectors (within `dir_track`) that hold user file
/// entries, as settled on by the analyzer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRange(pub Range<u8>);

impl ScanRange {
    pub fn standard(sector_base: u8) -> Self {
        Self((2 + sector_base)..(18 + sector_base))
    }

    pub fn newdos80_system() -> Self {
        Self(10..18)
    }
}

/// One extent: a contiguous run of granules on a single track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
    pub track: u8,
    pub start_granule: u8,
    pub count: u8,
}

/// A directory listing entry, as returned by [`crate::fs::TrsdosFileSystem::list_files`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// `"NAME/EXT"`, trimmed.
    pub name: String,
    pub size: u32,
    pub attr: u8,
    pub invisible: bool,
    pub system: bool,
}

/// Sectors-per-granule and granules-per-track, as inferred (or defaulted) by
/// the analyzer. See spec.md §9's open question on double-density geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocationGeometry {
    pub sectors_per_granule: u8,
    pub granules_per_track: u8,
}

impl Default for AllocationGeometry {
    fn default() -> Self {
        // Model I single density: 5 sectors/granule, 2 granules/track.
        Self { sectors_per_granule: 5, granules_per_track: 2 }
    }
}

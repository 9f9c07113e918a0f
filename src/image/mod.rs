//! Sector-image abstraction and format dispatch.
//!
//! A [`DiskImage`] owns the whole backing file in memory plus whichever
//! concrete format handler ([`Jv1Image`], [`Jv3Image`], [`DmkImage`])
//! [`detect_format`] dispatched it to, all behind the uniform
//! `(cylinder, head, sector)` interface described by [`SectorImage`].

mod dmk;
mod jv1;
mod jv3;

pub use dmk::DmkImage;
pub use jv1::Jv1Image;
pub use jv3::Jv3Image;

use crate::error::{Error, Result};
use crate::Sector;
use std::fmt::Debug;
use std::fs;
use std::path::{Path, PathBuf};

/// Implementors provide `(cylinder, head, sector)`-addressed access to one
/// disk image container format.
///
/// Reads of an address with no backing record return `None`; writes to a
/// format or address that doesn't support writing return `false`. Neither
/// case is an [`Error`] — per the crate's propagation policy, sector-level
/// absence and write-refusal are normal, silently-returned outcomes.
pub trait SectorImage: Debug {
    /// Reads one 256-byte sector, or `None` if there is no such sector.
    fn read_sector(&self, cylinder: u8, head: u8, sector: u8) -> Option<Sector>;

    /// Overwrites one 256-byte sector in place. Returns `false` if the
    /// format doesn't support writes, or the address is unknown/out of range.
    fn write_sector(&mut self, cylinder: u8, head: u8, sector: u8, data: &Sector) -> bool;

    /// A short human-readable description of the detected geometry, e.g.
    /// `"DMK (40 Tracks)"`.
    fn geometry_description(&self) -> String;

    /// The in-memory buffer backing this image, for [`DiskImage::save`].
    fn raw_buffer(&self) -> &[u8];
}

/// Detects the container format of `path` and dispatches to the matching
/// handler.
///
/// 1. If the filename ends in `.dmk`, the first four header bytes are peeked;
///    the image is accepted as DMK iff `0 < track_count <= 100` and
///    `0 < track_length < 20000`.
/// 2. Otherwise (or if the DMK header looks implausible) the image is treated
///    as JV1, a flat linear sector dump — the default fallback.
///
/// JV3 is never the *result* of auto-detection (its wire format has no
/// reliable self-describing signature); callers that know they have a JV3
/// image construct [`Jv3Image`] directly.
pub fn detect_format(path: &Path) -> Result<Box<dyn SectorImage>> {
    let buffer = fs::read(path)?;

    let looks_like_dmk = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("dmk"))
        .unwrap_or(false)
        && dmk::header_is_plausible(&buffer);

    if looks_like_dmk {
        log::debug!("{}: detected as DMK", path.display());
        Ok(Box::new(DmkImage::from_buffer(buffer)))
    } else {
        log::debug!("{}: falling back to JV1", path.display());
        Ok(Box::new(Jv1Image::from_buffer(buffer)))
    }
}

/// An open disk image: the dispatched format handler, plus bookkeeping for
/// persisting changes back to the backing file.
#[derive(Debug)]
pub struct DiskImage {
    path: PathBuf,
    format: Box<dyn SectorImage>,
    dirty: bool,
}

impl DiskImage {
    /// Opens `path`, auto-detecting its container format.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let format = detect_format(path)?;
        Ok(Self { path: path.to_path_buf(), format, dirty: false })
    }

    /// Wraps an already-dispatched handler (used by callers that built a
    /// [`Jv3Image`] directly, or by tests constructing synthetic images).
    pub fn from_format(path: impl AsRef<Path>, format: Box<dyn SectorImage>) -> Self {
        Self { path: path.as_ref().to_path_buf(), format, dirty: false }
    }

    pub fn read_sector(&self, cylinder: u8, head: u8, sector: u8) -> Option<Sector> {
        self.format.read_sector(cylinder, head, sector)
    }

    pub fn write_sector(&mut self, cylinder: u8, head: u8, sector: u8, data: &Sector) -> bool {
        let ok = self.format.write_sector(cylinder, head, sector, data);
        if ok {
            self.dirty = true;
        }
        ok
    }

    pub fn geometry_description(&self) -> String {
        self.format.geometry_description()
    }

    /// Rewrites the whole backing file from the in-memory buffer.
    ///
    /// A no-op (but still `Ok`) if no sector write has happened since the
    /// last save — there's nothing new to persist. Not atomic: a process
    /// kill mid-write leaves the backing file in whatever state the OS
    /// exposes (spec.md §5).
    pub fn save(&mut self) -> Result<()> {
        if !self.dirty {
            log::debug!("{}: save() skipped, nothing dirty", self.path.display());
            return Ok(());
        }

        log::debug!("{}: writing {} bytes", self.path.display(), self.format.raw_buffer().len());
        fs::write(&self.path, self.format.raw_buffer())?;
        self.dirty = false;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

//! TRSDOS/NEWDOS-family filesystem: directory-track discovery, directory
//! decoding, allocation, and file read/write/delete, layered atop
//! [`crate::image::DiskImage`].

mod dir;
mod gat;
mod types;

pub use types::{AllocationGeometry, Extent, FileEntry, OsVariant, ScanRange, SystemType};

use crate::error::{Error, Result};
use crate::image::DiskImage;
use dir::RawEntry;
use std::collections::HashSet;

const VALID_GAT_MARKERS: [u8; 8] = [0xFF, 0xFE, 0xFD, 0xFC, 0x3F, 0x1F, 0x0F, 0x7F];
const NEWDOS_SYSTEM_OPCODES: [u8; 6] = [0xE1, 0xC1, 0x3A, 0xCD, 0xC3, 0xF3];
const BOOTER_OPCODES: [u8; 7] = [0x00, 0xF3, 0x3E, 0x21, 0xC3, 0x18, 0xFE];

/// An open TRSDOS/NEWDOS-family filesystem. Analysis (directory track,
/// sector base, scan range, OS variant, allocation geometry) runs once at
/// construction and is cached for the object's lifetime, per spec.md's
/// Lifecycle section.
pub struct TrsdosFileSystem {
    image: DiskImage,
    dir_track: u8,
    sector_base: u8,
    scan_range: ScanRange,
    system_type: SystemType,
    os_variant: OsVariant,
    geometry: AllocationGeometry,
    /// Set when every directory-track probe failed; operations proceed with
    /// the Model I fallback but reads/writes will report "file not found".
    inconsistency: Option<String>,
}

impl TrsdosFileSystem {
    pub fn open(image: DiskImage) -> Self {
        let mut fs = Self {
            image,
            dir_track: 17,
            sector_base: 0,
            scan_range: ScanRange::standard(0),
            system_type: SystemType::ModelI,
            os_variant: OsVariant::Unknown,
            geometry: AllocationGeometry::default(),
            inconsistency: None,
        };
        fs.analyze();
        fs
    }

    pub fn dir_track(&self) -> u8 {
        self.dir_track
    }

    pub fn sector_base(&self) -> u8 {
        self.sector_base
    }

    pub fn system_type(&self) -> &SystemType {
        &self.system_type
    }

    pub fn os_variant(&self) -> &OsVariant {
        &self.os_variant
    }

    pub fn allocation_geometry(&self) -> AllocationGeometry {
        self.geometry
    }

    pub fn inconsistency(&self) -> Option<&str> {
        self.inconsistency.as_deref()
    }

    pub fn geometry_description(&self) -> String {
        self.image.geometry_description()
    }

    // -- analysis ------------------------------------------------------

    fn looks_like_gat(&self, track: u8, sector: u8) -> bool {
        let Some(data) = self.image.read_sector(track, 0, sector) else {
            return false;
        };
        if VALID_GAT_MARKERS.contains(&data[0]) {
            return true;
        }
        let text: String = data.iter().map(|&b| b as char).collect();
        text.contains("TRSDOS") || text.contains("GAT")
    }

    fn looks_like_newdos80_track9(&self) -> bool {
        let Some(data) = self.image.read_sector(9, 0, 10) else {
            return false;
        };
        let attr = data[0];
        if attr == 0 || attr == 0xFF {
            return false;
        }
        let name = &data[5..13];
        contains_subslice(name, b"BOOT") || contains_subslice(name, b"SYS")
    }

    fn looks_like_newdos80_system(&self) -> bool {
        self.image
            .read_sector(17, 0, 0)
            .map(|data| NEWDOS_SYSTEM_OPCODES.contains(&data[0]))
            .unwrap_or(false)
    }

    fn scan_all_tracks_for_directory(&self) -> Option<u8> {
        for track in 0..80u8 {
            if track == 17 || track == 20 {
                continue;
            }
            let mut valid = 0usize;
            for sector in 2..6u8 {
                if let Some(data) = self.image.read_sector(track, 0, sector) {
                    valid += count_plausible_entries(&data);
                }
            }
            if valid > 0 {
                return Some(track);
            }
        }
        None
    }

    fn analyze(&mut self) {
        if self.looks_like_gat(17, 0) {
            self.dir_track = 17;
            self.sector_base = 0;
            self.system_type = SystemType::ModelI;
        } else if self.looks_like_gat(17, 1) {
            self.dir_track = 17;
            self.sector_base = 1;
            self.system_type = SystemType::ModelIOneBased;
        } else if self.looks_like_gat(20, 0) {
            self.dir_track = 20;
            self.sector_base = 0;
            self.system_type = SystemType::ModelIii4;
        } else if self.looks_like_gat(20, 1) {
            self.dir_track = 20;
            self.sector_base = 1;
            self.system_type = SystemType::ModelIii4OneBased;
        } else if self.looks_like_newdos80_track9() {
            self.dir_track = 9;
            self.sector_base = 0;
            self.system_type = SystemType::Newdos80Track9;
            self.os_variant = OsVariant::Newdos80;
        } else if self.looks_like_newdos80_system() {
            self.dir_track = 17;
            self.sector_base = 0;
            self.system_type = SystemType::Newdos80System;
            self.os_variant = OsVariant::Newdos80;
        } else if let Some(found) = self.scan_all_tracks_for_directory() {
            self.dir_track = found;
            self.system_type = SystemType::Detected(found);
            self.sector_base = if self.image.read_sector(found, 0, 0).is_some() { 0 } else { 1 };
        } else {
            let geometry_desc = self.image.geometry_description();
            if geometry_desc.contains("JV1") {
                self.dir_track = 17;
                self.system_type = SystemType::ModelI;
            } else {
                if self.image.read_sector(0, 0, 0).is_some() {
                    self.sector_base = 0;
                } else if self.image.read_sector(0, 0, 1).is_some() {
                    self.sector_base = 1;
                }
                self.system_type = SystemType::UnknownAssumedModelI;
            }
            self.inconsistency =
                Some("directory-track probes all failed; assuming Model I defaults".to_string());
            log::warn!(
                "{}: {}",
                self.image.path().display(),
                self.inconsistency.as_ref().unwrap()
            );
        }

        self.scan_range = match self.system_type {
            SystemType::Newdos80Track9 | SystemType::Newdos80System => ScanRange::newdos80_system(),
            _ => ScanRange::standard(self.sector_base),
        };

        log::info!(
            "{}: dir_track={} sector_base={} system_type={}",
            self.image.path().display(),
            self.dir_track,
            self.sector_base,
            self.system_type
        );

        self.identify_os_variant();
    }

    fn identify_os_variant(&mut self) {
        let entries = match self.scan_entries() {
            Ok(entries) => entries,
            Err(_) => {
                self.os_variant = OsVariant::ReadError;
                return;
            }
        };

        let base_names: HashSet<String> =
            entries.iter().map(|e| e.name_str().trim().to_string()).collect();

        self.os_variant = if base_names.contains("LDOS") || base_names.contains("LSDOS") {
            OsVariant::LdosLsDos
        } else if base_names.contains("NEWDOS") || base_names.contains("NEWDOS80") {
            OsVariant::Newdos80
        } else if base_names.contains("MULTIDOS") {
            OsVariant::MultiDos
        } else if base_names.contains("DOSPLUS") {
            OsVariant::DosPlus
        } else if base_names.contains("TRSDOS") {
            OsVariant::Trsdos
        } else if !entries.is_empty() {
            OsVariant::GenericCompatible
        } else {
            OsVariant::NonBootable
        };

        let refinable = matches!(
            self.os_variant,
            OsVariant::Unknown | OsVariant::GenericCompatible | OsVariant::NonBootable
        );

        if let Some(boot) = self.image.read_sector(0, 0, self.sector_base) {
            if refinable {
                let text: String = boot
                    .iter()
                    .filter(|&&b| (32..=126).contains(&b))
                    .map(|&b| b as char)
                    .collect();
                if text.contains("NEWDOS") {
                    self.os_variant = OsVariant::Newdos80;
                } else if text.contains("LDOS") {
                    self.os_variant = OsVariant::LdosLsDos;
                } else if text.contains("R.S.") || text.contains("RADIO SHACK") {
                    self.os_variant = OsVariant::Trsdos;
                } else if text.contains("Disk error") || text.contains("No system") {
                    self.os_variant = OsVariant::Trsdos;
                }
            }

            if entries.is_empty() && BOOTER_OPCODES.contains(&boot[0]) {
                self.os_variant = OsVariant::Booter;
            }
        }
    }

    // -- directory scanning ---------------------------------------------

    fn scan_entries(&self) -> Result<Vec<RawEntry>> {
        let mut entries = Vec::new();
        for sector in self.scan_range.0.clone() {
            let Some(data) = self.image.read_sector(self.dir_track, 0, sector) else {
                continue;
            };
            for chunk in data.chunks_exact(dir::ENTRY_SIZE) {
                let entry = RawEntry::from_bytes(chunk);
                if entry.is_in_use() && !entry.is_fxde() && entry.looks_plausible() {
                    entries.push(entry);
                }
            }
        }
        Ok(entries)
    }

    fn find_entry(&self, name: &str) -> Option<(u8, usize, RawEntry)> {
        let target = name.trim().to_ascii_uppercase();
        for sector in self.scan_range.0.clone() {
            let Some(data) = self.image.read_sector(self.dir_track, 0, sector) else {
                continue;
            };
            for (i, chunk) in data.chunks_exact(dir::ENTRY_SIZE).enumerate() {
                let entry = RawEntry::from_bytes(chunk);
                if entry.is_in_use() && !entry.is_fxde() && entry.looks_plausible() {
                    if entry.full_name() == target {
                        return Some((sector, i * dir::ENTRY_SIZE, entry));
                    }
                }
            }
        }
        None
    }

    fn gat_location(&self) -> (u8, u8) {
        (self.dir_track, self.sector_base)
    }

    fn read_gat(&self) -> Result<[u8; crate::SECTOR_SIZE]> {
        let (track, sector) = self.gat_location();
        self.image.read_sector(track, 0, sector).ok_or(Error::FileNotFound("<gat>".to_string()))
    }

    // -- public filesystem contract --------------------------------------

    /// Lists in-use, non-extended directory entries. Matches spec.md §6.
    pub fn list_files(&self) -> Vec<FileEntry> {
        self.scan_entries()
            .unwrap_or_default()
            .into_iter()
            .map(|entry| FileEntry {
                name: entry.full_name(),
                size: entry.file_size(self.geometry.sectors_per_granule),
                attr: entry.attr(),
                invisible: entry.is_invisible(),
                system: entry.is_system(),
            })
            .collect()
    }

    /// Reads the full contents of `name` (`"NAME/EXT"`). Returns `None` if no
    /// matching in-use entry is found.
    pub fn read_file(&self, name: &str) -> Option<Vec<u8>> {
        let (_, _, entry) = self.find_entry(name)?;
        let size = entry.file_size(self.geometry.sectors_per_granule) as usize;

        let mut buf = Vec::with_capacity(size);
        for extent in entry.extents() {
            for g in extent.start_granule..extent.start_granule + extent.count {
                let start_sector = granule_start_sector(g, self.geometry.sectors_per_granule);
                for s in 0..self.geometry.sectors_per_granule {
                    let sector = self.image.read_sector(extent.track, 0, start_sector + s);
                    match sector {
                        Some(data) => buf.extend_from_slice(&data),
                        None => buf.extend(std::iter::repeat(0u8).take(crate::SECTOR_SIZE)),
                    }
                }
            }
        }

        buf.truncate(size);
        Some(buf)
    }

    /// Overwrite semantics: deletes any existing entry with the same name
    /// first (idempotent), then allocates, writes, and persists.
    pub fn write_file(&mut self, name: &str, bytes: &[u8]) -> Result<()> {
        let _ = self.delete_file(name);

        let (name_buf, ext_buf) = dir::normalize_name(name);

        let free_slot = self.scan_range.0.clone().find_map(|sector| {
            let data = self.image.read_sector(self.dir_track, 0, sector)?;
            data.chunks_exact(dir::ENTRY_SIZE)
                .position(|chunk| RawEntry::from_bytes(chunk).is_free_slot())
                .map(|index| (sector, index * dir::ENTRY_SIZE))
        });
        let Some((free_sector, free_offset)) = free_slot else {
            log::debug!("write_file({name}): no free directory slot in scan range");
            return Err(Error::NoFreeDirectorySlot);
        };

        let mut gat = self.read_gat()?;
        let sectors_needed = bytes.len().div_ceil(crate::SECTOR_SIZE) as u32;
        let extents = gat::allocate(&mut gat, self.geometry, self.dir_track, sectors_needed)?;

        for (i, extent) in extents.iter().enumerate() {
            let mut content_offset = extents[..i]
                .iter()
                .map(|e| e.count as usize * self.geometry.sectors_per_granule as usize * crate::SECTOR_SIZE)
                .sum::<usize>();

            for g in extent.start_granule..extent.start_granule + extent.count {
                let start_sector = granule_start_sector(g, self.geometry.sectors_per_granule);
                for s in 0..self.geometry.sectors_per_granule {
                    let mut sector = [0u8; crate::SECTOR_SIZE];
                    let remaining = bytes.len().saturating_sub(content_offset);
                    let take = remaining.min(crate::SECTOR_SIZE);
                    if take > 0 {
                        sector[..take].copy_from_slice(&bytes[content_offset..content_offset + take]);
                    }
                    self.image.write_sector(extent.track, 0, start_sector + s, &sector);
                    content_offset += crate::SECTOR_SIZE;
                }
            }
        }

        let (gat_track, gat_sector) = self.gat_location();
        self.image.write_sector(gat_track, 0, gat_sector, &gat);

        let entry = RawEntry::new_file(&name_buf, &ext_buf, &extents, bytes.len() as u32);
        let mut dir_sector = self
            .image
            .read_sector(self.dir_track, 0, free_sector)
            .unwrap_or([0u8; crate::SECTOR_SIZE]);
        dir_sector[free_offset..free_offset + dir::ENTRY_SIZE].copy_from_slice(&entry.0);
        self.image.write_sector(self.dir_track, 0, free_sector, &dir_sector);

        self.image.save()
    }

    /// Frees the entry's granules and zeroes its attribute byte. A no-op
    /// (returns `Ok`) if the file doesn't exist, matching the unconditional
    /// pre-delete step `write_file` performs before creating.
    pub fn delete_file(&mut self, name: &str) -> Result<()> {
        let Some((sector, offset, entry)) = self.find_entry(name) else {
            return Ok(());
        };

        let mut gat = self.read_gat()?;
        gat::free(&mut gat, self.geometry, &entry.extents());
        let (gat_track, gat_sector) = self.gat_location();
        self.image.write_sector(gat_track, 0, gat_sector, &gat);

        let mut dir_sector = self
            .image
            .read_sector(self.dir_track, 0, sector)
            .unwrap_or([0u8; crate::SECTOR_SIZE]);
        dir_sector[offset] = 0;
        self.image.write_sector(self.dir_track, 0, sector, &dir_sector);

        self.image.save()
    }

    /// Bytes available for new file content, per spec.md §4.5.
    pub fn get_free_space(&self) -> u32 {
        let Ok(gat) = self.read_gat() else {
            return 0;
        };
        let free_granules = gat::free_granule_count(&gat, self.geometry, self.dir_track);
        free_granules as u32 * self.geometry.sectors_per_granule as u32 * crate::SECTOR_SIZE as u32
    }
}

/// Granule 0 starts at sector 0, granule 1 at sector `sectors_per_granule`
/// (the Model-I SD layout quirk spec.md §4.4 calls out), and granule `g > 1`
/// at `g * sectors_per_granule`.
fn granule_start_sector(granule: u8, sectors_per_granule: u8) -> u8 {
    match granule {
        0 => 0,
        1 => sectors_per_granule,
        g => g * sectors_per_granule,
    }
}

fn contains_subslice(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

fn count_plausible_entries(data: &[u8]) -> usize {
    data.chunks_exact(dir::ENTRY_SIZE)
        .filter(|chunk| RawEntry::from_bytes(chunk).looks_plausible())
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::{DiskImage, Jv1Image};
    use std::path::PathBuf;

    /// A blank 40-track Model I SD image (10 sectors/track, 256 bytes/sector)
    /// with a plausible GAT at (17, 0, 0).
    fn blank_image() -> DiskImage {
        let buffer = vec![0u8; 40 * 10 * crate::SECTOR_SIZE];
        let mut image = DiskImage::from_format(PathBuf::from("test.dsk"), Box::new(Jv1Image::from_buffer(buffer)));

        let mut gat = [0xFFu8; crate::SECTOR_SIZE];
        // Track 0 and the directory track (17) are never allocatable, but the
        // GAT bytes covering them are left 0xFF here too; allocation skips
        // them by track regardless of GAT content.
        image.write_sector(17, 0, 0, &gat_buf(&mut gat));
        image
    }

    fn gat_buf(gat: &mut [u8; crate::SECTOR_SIZE]) -> [u8; crate::SECTOR_SIZE] {
        *gat
    }

    #[test]
    fn analyzer_detects_model_i_layout() {
        let fs = TrsdosFileSystem::open(blank_image());
        assert_eq!(fs.dir_track(), 17);
        assert_eq!(fs.sector_base(), 0);
        assert!(matches!(fs.system_type(), SystemType::ModelI));
        assert!(fs.inconsistency().is_none());
    }

    #[test]
    fn write_read_delete_round_trip() {
        let mut fs = TrsdosFileSystem::open(blank_image());
        let payload = b"HELLO, WORLD!".to_vec();

        fs.write_file("TEST/TXT", &payload).unwrap();
        assert_eq!(fs.read_file("TEST/TXT"), Some(payload.clone()));

        let listed = fs.list_files();
        assert!(listed.iter().any(|f| f.name == "TEST/TXT" && f.size as usize == payload.len()));

        let free_before_delete = fs.get_free_space();
        fs.delete_file("TEST/TXT").unwrap();
        assert!(fs.read_file("TEST/TXT").is_none());
        assert!(fs.get_free_space() > free_before_delete);
    }

    #[test]
    fn delete_then_recreate_restores_free_space() {
        let mut fs = TrsdosFileSystem::open(blank_image());
        let free_at_start = fs.get_free_space();

        fs.write_file("A/1", &vec![0xAAu8; 4000]).unwrap();
        fs.delete_file("A/1").unwrap();

        assert_eq!(fs.get_free_space(), free_at_start);
    }

    #[test]
    fn empty_file_round_trips_as_zero_bytes() {
        let mut fs = TrsdosFileSystem::open(blank_image());
        fs.write_file("EMPTY/TXT", &[]).unwrap();
        assert_eq!(fs.read_file("EMPTY/TXT"), Some(Vec::new()));
    }

    #[test]
    fn write_file_is_idempotent_overwrite() {
        let mut fs = TrsdosFileSystem::open(blank_image());
        fs.write_file("A/B", b"first").unwrap();
        fs.write_file("A/B", b"second, longer payload").unwrap();

        assert_eq!(fs.read_file("A/B").unwrap(), b"second, longer payload");
        assert_eq!(fs.list_files().iter().filter(|f| f.name == "A/B").count(), 1);
    }

    #[test]
    fn read_file_missing_returns_none() {
        let fs = TrsdosFileSystem::open(blank_image());
        assert!(fs.read_file("NOPE/XXX").is_none());
    }

    #[test]
    fn file_needing_exactly_five_granules_uses_one_extent() {
        let mut fs = TrsdosFileSystem::open(blank_image());
        let spg = fs.allocation_geometry().sectors_per_granule as usize;
        let size = 5 * spg * crate::SECTOR_SIZE;

        fs.write_file("BIG/DAT", &vec![0x5Au8; size]).unwrap();

        let (_, _, entry) = fs.find_entry("BIG/DAT").unwrap();
        let extents = entry.extents();
        assert_eq!(extents.len(), 1);
        assert_eq!(extents[0].count, 5);
        assert_eq!(fs.read_file("BIG/DAT").unwrap().len(), size);
    }

    #[test]
    fn write_file_fails_too_fragmented_when_free_granules_are_scattered() {
        let mut fs = TrsdosFileSystem::open(blank_image());
        let geometry = fs.allocation_geometry();
        let gpt = geometry.granules_per_track as usize;

        // Mark every granule allocated except one on each of six distinct,
        // non-reserved tracks, so six granules of free space exist but can't
        // be expressed in five extent slots.
        let mut gat = [gat::ALLOCATED; crate::SECTOR_SIZE];
        for track in 1u8..=6 {
            gat[track as usize * gpt] = gat::FREE;
        }
        let (gat_track, gat_sector) = (fs.dir_track, fs.sector_base);
        fs.image.write_sector(gat_track, 0, gat_sector, &gat);

        let size = 6 * geometry.sectors_per_granule as usize * crate::SECTOR_SIZE;
        let err = fs.write_file("FRAG/DAT", &vec![0x11u8; size]).unwrap_err();
        assert!(matches!(err, Error::TooFragmented));
        assert!(fs.read_file("FRAG/DAT").is_none());
    }
}

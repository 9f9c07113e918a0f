//! JV1: a flat, headerless linear array of sectors — always single-sided,
//! 10 sectors per track, 0-based sector numbers.

use super::SectorImage;
use crate::{Sector, SECTOR_SIZE};

const SECTORS_PER_TRACK: u8 = 10;

#[derive(Debug)]
pub struct Jv1Image {
    buffer: Vec<u8>,
}

impl Jv1Image {
    pub fn from_buffer(buffer: Vec<u8>) -> Self {
        Self { buffer }
    }

    fn offset(cylinder: u8, sector: u8) -> usize {
        (cylinder as usize * SECTORS_PER_TRACK as usize + sector as usize) * SECTOR_SIZE
    }
}

impl SectorImage for Jv1Image {
    fn read_sector(&self, cylinder: u8, head: u8, sector: u8) -> Option<Sector> {
        if head != 0 || sector >= SECTORS_PER_TRACK {
            return None;
        }

        let offset = Self::offset(cylinder, sector);
        let slice = self.buffer.get(offset..offset + SECTOR_SIZE)?;

        let mut out = [0u8; SECTOR_SIZE];
        out.copy_from_slice(slice);
        Some(out)
    }

    fn write_sector(&mut self, cylinder: u8, head: u8, sector: u8, data: &Sector) -> bool {
        if head != 0 || sector >= SECTORS_PER_TRACK {
            return false;
        }

        let offset = Self::offset(cylinder, sector);
        if offset + SECTOR_SIZE > self.buffer.len() {
            return false;
        }

        self.buffer[offset..offset + SECTOR_SIZE].copy_from_slice(data);
        true
    }

    fn geometry_description(&self) -> String {
        "JV1 (Raw Sector Dump)".to_string()
    }

    fn raw_buffer(&self) -> &[u8] {
        &self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image_with_tracks(tracks: usize) -> Jv1Image {
        Jv1Image::from_buffer(vec![0u8; tracks * SECTORS_PER_TRACK as usize * SECTOR_SIZE])
    }

    #[test]
    fn read_write_round_trip() {
        let mut img = image_with_tracks(2);
        let mut payload = [0u8; SECTOR_SIZE];
        payload[0] = 0xAB;
        payload[255] = 0xCD;

        assert!(img.write_sector(1, 0, 3, &payload));
        assert_eq!(img.read_sector(1, 0, 3), Some(payload));
    }

    #[test]
    fn second_side_is_absent() {
        let img = image_with_tracks(1);
        assert_eq!(img.read_sector(0, 1, 0), None);
    }

    #[test]
    fn sector_out_of_range_is_absent() {
        let img = image_with_tracks(1);
        assert_eq!(img.read_sector(0, 0, 10), None);
    }

    #[test]
    fn write_beyond_buffer_is_refused() {
        let mut img = image_with_tracks(1);
        let payload = [0u8; SECTOR_SIZE];
        assert!(!img.write_sector(5, 0, 0, &payload));
    }

    #[test]
    fn no_op_write_back_is_identity() {
        let mut img = image_with_tracks(1);
        let original = img.read_sector(0, 0, 4).unwrap();
        assert!(img.write_sector(0, 0, 4, &original));
        assert_eq!(img.read_sector(0, 0, 4), Some(original));
    }
}

//! JV3: a packed stream of `(header, data)` records.
//!
//! Each record starts with a 3-byte header `(track, sector, flags)`. Bits
//! 0-1 of `flags` are a size code (`0 -> 256, 1 -> 128, 2 -> 1024, 3 -> 512`)
//! and bit 4 is the head. `track == 0xFF` marks an unused slot — it still
//! carries a size-coded payload that must be skipped to keep parsing the
//! rest of the stream, it just isn't addressable.
//!
//! Only size-code-0 (256-byte) records are ever exposed through
//! [`SectorImage::read_sector`]; the filesystem layer never asks for
//! anything else, per spec. Writes are not implemented for this format.

use super::SectorImage;
use crate::{Sector, SECTOR_SIZE};
use std::collections::HashMap;

const HEADER_LEN: usize = 3;

fn data_len(flags: u8) -> usize {
    match flags & 0x03 {
        0 => 256,
        1 => 128,
        2 => 1024,
        3 => 512,
        _ => unreachable!("only 2 bits"),
    }
}

fn pack_key(track: u8, head: u8, sector: u8) -> u32 {
    ((track as u32) << 16) | ((head as u32) << 8) | sector as u32
}

#[derive(Debug)]
pub struct Jv3Image {
    buffer: Vec<u8>,
    /// `(track, head, sector) -> offset of the 256-byte payload`, packed as a
    /// single `u32` key (the crate's substitute for the tuple-keyed map the
    /// original driver used directly).
    sector_map: HashMap<u32, usize>,
    tracks_seen: u8,
    heads_seen: u8,
}

impl Jv3Image {
    pub fn from_buffer(buffer: Vec<u8>) -> Self {
        let mut sector_map = HashMap::new();
        let mut tracks_seen: u8 = 0;
        let mut heads_seen: u8 = 0;

        let mut offset = 0usize;
        while offset + HEADER_LEN <= buffer.len() {
            let track = buffer[offset];
            let sector = buffer[offset + 1];
            let flags = buffer[offset + 2];
            let len = data_len(flags);

            if track == 0xFF {
                // Unused slot: still occupies a size-coded payload.
                offset += HEADER_LEN + len;
                continue;
            }

            let head = (flags >> 4) & 1;

            if len == SECTOR_SIZE {
                sector_map.insert(pack_key(track, head, sector), offset + HEADER_LEN);
            }

            tracks_seen = tracks_seen.max(track.wrapping_add(1));
            heads_seen = heads_seen.max(head + 1);

            offset += HEADER_LEN + len;
        }

        Self { buffer, sector_map, tracks_seen, heads_seen }
    }
}

impl SectorImage for Jv3Image {
    fn read_sector(&self, cylinder: u8, head: u8, sector: u8) -> Option<Sector> {
        let offset = *self.sector_map.get(&pack_key(cylinder, head, sector))?;
        let slice = self.buffer.get(offset..offset + SECTOR_SIZE)?;

        let mut out = [0u8; SECTOR_SIZE];
        out.copy_from_slice(slice);
        Some(out)
    }

    fn write_sector(&mut self, _cylinder: u8, _head: u8, _sector: u8, _data: &Sector) -> bool {
        // Never exercised: JV3 write support is out of scope (spec.md §1/§9).
        false
    }

    fn geometry_description(&self) -> String {
        format!("JV3 ({} Tracks, {} Sides)", self.tracks_seen, self.heads_seen)
    }

    fn raw_buffer(&self) -> &[u8] {
        &self.buffer
    }
}

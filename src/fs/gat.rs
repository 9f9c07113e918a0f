//! The Granule Allocation Table: one byte per granule on the disk. `0xFF`
//! means free; any other value means allocated. Newly allocated granules are
//! stamped `0xFE` — this crate doesn't track GAT chain pointers, extents in
//! the directory entry carry that information instead (spec.md §4.5).

use super::types::{AllocationGeometry, Extent};
use crate::error::{Error, Result};

pub const FREE: u8 = 0xFF;
pub const ALLOCATED: u8 = 0xFE;

/// Max granule-run length a single extent slot can express: `count - 1` fits
/// in 5 bits, so `count` ranges 1..=32.
const MAX_RUN: usize = 32;
const MAX_EXTENTS: usize = super::dir::MAX_EXTENTS;

/// Granules on `track` are never allocated to files: track 0 holds the boot
/// sector(s) and system reserved area, and `dir_track` holds the GAT and
/// directory entries themselves.
fn track_is_allocatable(track: u8, dir_track: u8) -> bool {
    track != 0 && track != dir_track
}

pub fn free_granule_count(gat: &[u8], geometry: AllocationGeometry, dir_track: u8) -> usize {
    let gpt = geometry.granules_per_track as usize;
    gat.iter()
        .enumerate()
        .filter(|&(i, &b)| {
            let track = (i / gpt) as u8;
            b == FREE && track_is_allocatable(track, dir_track)
        })
        .count()
}

fn granules_needed(sectors_needed: u32, sectors_per_granule: u8) -> usize {
    if sectors_needed == 0 {
        return 0;
    }
    sectors_needed.div_ceil(sectors_per_granule as u32) as usize
}

/// Allocates granules for a file needing `sectors_needed` sectors, marking
/// them `0xFE` in `gat`. Tracks are walked in ascending order; within a
/// track, the first free run is taken greedily (up to 31 granules, the most
/// a single extent slot can encode). Fails with [`Error::DiskFull`] if there
/// isn't enough free space at all, or [`Error::TooFragmented`] if the free
/// space exists but can't be expressed in five or fewer extents — in the
/// latter case `gat` is left unmodified.
pub fn allocate(
    gat: &mut [u8],
    geometry: AllocationGeometry,
    dir_track: u8,
    sectors_needed: u32,
) -> Result<Vec<Extent>> {
    let needed = granules_needed(sectors_needed, geometry.sectors_per_granule);
    if needed == 0 {
        return Ok(Vec::new());
    }

    if free_granule_count(gat, geometry, dir_track) < needed {
        log::debug!("allocate: need {needed} granules, not enough free space");
        return Err(Error::DiskFull);
    }

    let gpt = geometry.granules_per_track as usize;
    let num_tracks = gat.len() / gpt.max(1);
    let mut remaining = needed;
    let mut extents: Vec<Extent> = Vec::new();

    'tracks: for track_idx in 0..num_tracks {
        let track = track_idx as u8;
        if remaining == 0 {
            break;
        }
        if !track_is_allocatable(track, dir_track) {
            continue;
        }

        let base = track as usize * gpt;
        if base >= gat.len() {
            break;
        }
        let track_len = gpt.min(gat.len() - base);

        let mut g = 0;
        while g < track_len && remaining > 0 {
            if gat[base + g] != FREE {
                g += 1;
                continue;
            }

            let run_start = g;
            let mut run_len = 0;
            while g < track_len && gat[base + g] == FREE && run_len < MAX_RUN.min(remaining) {
                run_len += 1;
                g += 1;
            }

            for slot in gat.iter_mut().skip(base + run_start).take(run_len) {
                *slot = ALLOCATED;
            }
            extents.push(Extent { track, start_granule: run_start as u8, count: run_len as u8 });
            remaining -= run_len;

            if extents.len() > MAX_EXTENTS {
                break 'tracks;
            }
        }
    }

    if remaining > 0 || extents.len() > MAX_EXTENTS {
        for extent in &extents {
            let base = extent.track as usize * gpt;
            for slot in gat
                .iter_mut()
                .skip(base + extent.start_granule as usize)
                .take(extent.count as usize)
            {
                *slot = FREE;
            }
        }
        log::debug!("allocate: need {needed} granules, would exceed five-extent capacity");
        return Err(Error::TooFragmented);
    }

    Ok(extents)
}

/// Frees the granules held by `extents`, restoring `0xFF`.
pub fn free(gat: &mut [u8], geometry: AllocationGeometry, extents: &[Extent]) {
    let gpt = geometry.granules_per_track as usize;
    for extent in extents {
        let base = extent.track as usize * gpt;
        for slot in gat
            .iter_mut()
            .skip(base + extent.start_granule as usize)
            .take(extent.count as usize)
        {
            *slot = FREE;
        }
    }
}

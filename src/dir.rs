//! Directory iteration, name lookup, and free-slot search (C8).
//!
//! Grounded on `original_source/src/fat_dir_search.c`'s `fat_find_entry` /
//! `fat_iterate_directory` / `fat_find_free_entry`, and the teacher's
//! `dir.rs` for the general shape (LFN-run-then-short-entry scanning). The
//! source addresses directory slots by manually tracking a cluster/sector
//! pair and advancing it inside the same loop that scans entries within a
//! buffer, which is also where two of its bugs live (the free-run scan
//! resets its counter in unreachable code, and the "move to next
//! cluster" step is nested inside the per-entry loop instead of following
//! it, so it can never actually cross a cluster boundary correctly). This
//! module addresses directory slots purely by a flat `index`, resolving
//! index -> (sector, offset) through [`locate`] once per access; that
//! indexing sidesteps the whole bug class, since there is no separate
//! "advance to next cluster" step to get nested in the wrong place.

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::bpb::BiosParameterBlock;
use crate::cache;
use crate::device::BlockDevice;
use crate::entry::{EntryKind, LongDirEntry, ShortDirEntry};
use crate::error::Error;
use crate::fat::Fat;
use crate::lfn;
use crate::volume::Volume;
use crate::DIRENT_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirLocation {
    /// FAT12/16 fixed-region root: a bounded run of sectors that cannot grow.
    FixedRoot,
    /// Any other directory (or the FAT32 root): a cluster chain like any file.
    Cluster(u32),
}

#[derive(Debug, Clone)]
pub struct DirEntry {
    pub short: ShortDirEntry,
    pub long_name: Option<String>,
    /// Flat slot index of the short entry (its LFN run, if any, precedes it).
    pub slot_index: usize,
    /// Total slots occupied: LFN run length + 1.
    pub slot_count: usize,
}

impl DirEntry {
    pub fn display_name(&self) -> String {
        self.long_name.clone().unwrap_or_else(|| self.short.short_name_string())
    }

    pub fn kind(&self) -> EntryKind {
        if self.short.is_dir() {
            EntryKind::Directory
        } else {
            EntryKind::File
        }
    }
}

fn locate(bpb: &BiosParameterBlock, fat: &Fat, loc: DirLocation, index: usize) -> Result<(usize, usize), Error> {
    let bps = bpb.bytes_per_sector();
    let entries_per_sector = bps / DIRENT_SIZE;
    match loc {
        DirLocation::FixedRoot => {
            let root_start = bpb.root_start_sector();
            let root_sectors = bpb.root_dir_sector_cnt();
            let sector_in_root = index / entries_per_sector;
            if sector_in_root >= root_sectors {
                return Err(Error::Eof);
            }
            Ok((root_start + sector_in_root, (index % entries_per_sector) * DIRENT_SIZE))
        }
        DirLocation::Cluster(start) => {
            let entries_per_cluster = bpb.bytes_per_cluster() / DIRENT_SIZE;
            let cluster_hop = index / entries_per_cluster;
            let entry_in_cluster = index % entries_per_cluster;
            let mut cluster = start;
            for _ in 0..cluster_hop {
                cluster = match fat.next(cluster)? {
                    Some(c) => c,
                    None => return Err(Error::Eof),
                };
            }
            let byte_in_cluster = entry_in_cluster * DIRENT_SIZE;
            Ok((
                bpb.cluster_to_sector(cluster) + byte_in_cluster / bps,
                byte_in_cluster % bps,
            ))
        }
    }
}

pub fn read_entry_slot(vol: &Volume, loc: DirLocation, index: usize) -> Result<[u8; DIRENT_SIZE], Error> {
    read_entry_slot_raw(Arc::clone(&vol.device), &vol.bpb, &vol.fat, loc, index)
}

pub fn write_entry_slot(vol: &Volume, loc: DirLocation, index: usize, bytes: &[u8; DIRENT_SIZE]) -> Result<(), Error> {
    write_entry_slot_raw(Arc::clone(&vol.device), &vol.bpb, &vol.fat, loc, index, bytes)
}

/// Same as [`read_entry_slot`], taking the mount's parts directly rather
/// than a `&Volume`. Used by `File`, which carries its own clone of those
/// parts instead of borrowing the `Volume` it was opened from.
pub fn read_entry_slot_raw(
    device: Arc<dyn BlockDevice>,
    bpb: &BiosParameterBlock,
    fat: &Fat,
    loc: DirLocation,
    index: usize,
) -> Result<[u8; DIRENT_SIZE], Error> {
    let (sector, offset) = locate(bpb, fat, loc, index)?;
    let block = cache::get_block(sector, device)?;
    let guard = block.read();
    let mut buf = [0u8; DIRENT_SIZE];
    guard.read_slice(offset, &mut buf);
    Ok(buf)
}

/// Same as [`write_entry_slot`], taking the mount's parts directly.
pub fn write_entry_slot_raw(
    device: Arc<dyn BlockDevice>,
    bpb: &BiosParameterBlock,
    fat: &Fat,
    loc: DirLocation,
    index: usize,
    bytes: &[u8; DIRENT_SIZE],
) -> Result<(), Error> {
    let (sector, offset) = locate(bpb, fat, loc, index)?;
    let block = cache::get_block(sector, device)?;
    block.write().write_slice(offset, bytes);
    Ok(())
}

fn zero_cluster(vol: &Volume, cluster: u32) -> Result<(), Error> {
    let bps = vol.bpb.bytes_per_sector();
    let zero = alloc::vec![0u8; bps];
    let first_sector = vol.bpb.cluster_to_sector(cluster);
    for s in 0..vol.bpb.sectors_per_cluster() {
        let block = cache::get_block(first_sector + s, Arc::clone(&vol.device))?;
        block.write().write_slice(0, &zero);
    }
    Ok(())
}

/// Append one cluster to the chain starting at `start` and zero it, growing
/// a cluster-chained directory by one cluster's worth of free slots.
fn grow(vol: &Volume, start: u32) -> Result<(), Error> {
    let mut tail = start;
    while let Some(next) = vol.fat.next(tail)? {
        tail = next;
    }
    let new_cluster = vol.fat.allocate_and_link(tail)?;
    zero_cluster(vol, new_cluster)
}

/// Scan `loc` from the start, invoking `visit` with each live entry.
/// Stops when `visit` returns `false` or the directory's end is reached.
pub fn iterate(vol: &Volume, loc: DirLocation, mut visit: impl FnMut(&DirEntry) -> bool) -> Result<(), Error> {
    let mut index = 0usize;
    let mut pending: Vec<LongDirEntry> = Vec::new();
    let mut run_start = 0usize;
    loop {
        let raw = match read_entry_slot(vol, loc, index) {
            Ok(raw) => raw,
            Err(Error::Eof) => return Ok(()),
            Err(e) => return Err(e),
        };

        if raw[0] == crate::DIR_ENTRY_LAST_AND_UNUSED {
            return Ok(());
        }
        if raw[0] == crate::DIR_ENTRY_UNUSED {
            pending.clear();
            index += 1;
            continue;
        }
        if raw[0x0B] == crate::ATTR_LONG_NAME {
            if pending.is_empty() {
                run_start = index;
            }
            pending.push(LongDirEntry::from_bytes(&raw));
            index += 1;
            continue;
        }

        let short = ShortDirEntry::from_bytes(&raw);
        if short.is_volume_id() {
            pending.clear();
            index += 1;
            continue;
        }

        let long_name = if pending.is_empty() {
            None
        } else {
            lfn::collect_run(&pending, &short).map(|run| lfn::decode_run(&run))
        };
        let slot_count = pending.len() + 1;
        let slot_index = if pending.is_empty() { index } else { run_start };
        pending.clear();

        let entry = DirEntry {
            short,
            long_name,
            slot_index,
            slot_count,
        };
        let keep_going = visit(&entry);
        index += 1;
        if !keep_going {
            return Ok(());
        }
    }
}

/// Case-insensitive ASCII name match against either the short name or the
/// assembled long name (spec's explicit ASCII-only matching non-goal).
fn names_match(entry: &DirEntry, name: &str) -> bool {
    if entry.short.short_name_string().eq_ignore_ascii_case(name) {
        return true;
    }
    if let Some(long) = &entry.long_name {
        return long.eq_ignore_ascii_case(name);
    }
    false
}

pub fn find(vol: &Volume, loc: DirLocation, name: &str) -> Result<DirEntry, Error> {
    let mut found = None;
    iterate(vol, loc, |entry| {
        if names_match(entry, name) {
            found = Some(entry.clone());
            false
        } else {
            true
        }
    })?;
    found.ok_or(Error::NotFound)
}

pub fn list(vol: &Volume, loc: DirLocation) -> Result<Vec<DirEntry>, Error> {
    let mut out = Vec::new();
    iterate(vol, loc, |entry| {
        out.push(entry.clone());
        true
    })?;
    Ok(out)
}

/// Find `needed` consecutive free slots, growing a cluster-chained
/// directory by one cluster at a time when the scan runs off the end.
/// A fixed-region FAT12/16 root cannot grow and reports `NoSpace` instead.
pub fn find_free_run(vol: &Volume, loc: DirLocation, needed: usize) -> Result<usize, Error> {
    let mut index = 0usize;
    let mut run = 0usize;
    loop {
        match read_entry_slot(vol, loc, index) {
            Ok(raw) => {
                if raw[0] == crate::DIR_ENTRY_UNUSED || raw[0] == crate::DIR_ENTRY_LAST_AND_UNUSED {
                    run += 1;
                    if run >= needed {
                        return Ok(index + 1 - run);
                    }
                } else {
                    run = 0;
                }
                index += 1;
            }
            Err(Error::Eof) => match loc {
                DirLocation::FixedRoot => return Err(Error::NoSpace),
                DirLocation::Cluster(start) => grow(vol, start)?,
            },
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::Volume;

    fn mount_fat12() -> Volume {
        let device = crate::testutil::build_fat12(4000, 1);
        Volume::mount(device).unwrap()
    }

    fn mount_fat32() -> Volume {
        let device = crate::testutil::build_fat32(70_000, 1, 600);
        Volume::mount(device).unwrap()
    }

    #[test]
    fn find_free_on_empty_fat12_root_returns_index_zero() {
        let vol = mount_fat12();
        let idx = find_free_run(&vol, DirLocation::FixedRoot, 1).unwrap();
        assert_eq!(idx, 0);
    }

    #[test]
    fn find_free_on_full_fat12_root_reports_no_space() {
        let vol = mount_fat12();
        // root_entry_count is 224 for this image; mark every slot "in use".
        for i in 0..224usize {
            let mut raw = [0u8; DIRENT_SIZE];
            raw[0] = b'A';
            raw[0x0B] = crate::ATTR_ARCHIVE;
            write_entry_slot(&vol, DirLocation::FixedRoot, i, &raw).unwrap();
        }
        assert_eq!(find_free_run(&vol, DirLocation::FixedRoot, 1), Err(Error::NoSpace));
    }

    #[test]
    fn find_free_grows_cluster_chained_directory_across_boundary() {
        let vol = mount_fat32();
        let root = vol.bpb.root_dir_cluster();
        // One cluster (512 bytes / 32 = 16 slots) isn't enough for a
        // 17-slot run; the scan must allocate a second cluster and keep
        // counting the free run across the boundary.
        let idx = find_free_run(&vol, DirLocation::Cluster(root), 17).unwrap();
        assert_eq!(idx, 0);
        assert!(vol.fat.next(root).unwrap().is_some());
    }

    #[test]
    fn find_and_iterate_see_a_short_entry_written_directly() {
        let vol = mount_fat12();
        let mut entry = ShortDirEntry::new(*b"HELLO   ", *b"TXT", 0, EntryKind::File);
        entry.file_size = 5;
        write_entry_slot(&vol, DirLocation::FixedRoot, 0, &entry.to_bytes()).unwrap();

        let found = find(&vol, DirLocation::FixedRoot, "HELLO.TXT").unwrap();
        assert_eq!(found.short.file_size, 5);
        assert_eq!(found.display_name(), "HELLO.TXT");

        let listed = list(&vol, DirLocation::FixedRoot).unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[test]
    fn find_is_case_insensitive() {
        let vol = mount_fat12();
        let entry = ShortDirEntry::new(*b"HELLO   ", *b"TXT", 0, EntryKind::File);
        write_entry_slot(&vol, DirLocation::FixedRoot, 0, &entry.to_bytes()).unwrap();
        assert!(find(&vol, DirLocation::FixedRoot, "hello.txt").is_ok());
    }

    #[test]
    fn find_missing_name_is_not_found() {
        let vol = mount_fat12();
        assert_eq!(find(&vol, DirLocation::FixedRoot, "NOPE.TXT"), Err(Error::NotFound));
    }
}

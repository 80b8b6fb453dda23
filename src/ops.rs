//! Entry creation and removal (C11): short-name generation, `create`,
//! `mkdir`, `rmdir`, `unlink`, `rename`.
//!
//! Grounded on `original_source/src/fat_file_create.c`
//! (`fat_generate_short_name`, `fat_validate_filename`), `fat_mkdir.c`
//! (`fat_create_dot_entries`, `fat_initialize_directory_cluster`), and
//! `fat_rmdir.c`/`fat_file_delete.c` (empty-directory check, tombstoning an
//! entry's whole LFN run). The source allocates a data cluster for every
//! new file up front, even before any byte is written; this module defers
//! that to the first write (`File::extend`), since a freshly created
//! zero-byte file has nothing to store yet — recorded as an explicit
//! deviation in the accompanying design notes rather than left implicit.

use alloc::vec::Vec;

use crate::dir::{self, DirLocation};
use crate::entry::{EntryKind, ShortDirEntry};
use crate::error::Error;
use crate::lfn;
use crate::path::ResolvedDir;
use crate::volume::Volume;

const RESERVED_DEVICE_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

fn base_name(name: &str) -> &str {
    match name.find('.') {
        Some(i) => &name[..i],
        None => name,
    }
}

/// Characters allowed in a generated short-name base, beyond alphanumerics.
fn is_short_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || matches!(
            c,
            '_' | '-' | '$' | '%' | '\'' | '@' | '~' | '`' | '!' | '(' | ')' | '{' | '}' | '^' | '#' | '&'
        )
}

fn is_valid_entry_name(name: &str) -> bool {
    if name.is_empty() || name.len() > 255 {
        return false;
    }
    if name
        .chars()
        .any(|c| (c as u32) < 0x20 || "<>:\"|?*".contains(c))
    {
        return false;
    }
    !RESERVED_DEVICE_NAMES
        .iter()
        .any(|r| r.eq_ignore_ascii_case(base_name(name)))
}

fn sanitize_char(c: char) -> Option<u8> {
    let upper = c.to_ascii_uppercase();
    let mapped = match upper {
        '+' | ',' | ';' | '=' | '[' | ']' => '_',
        other => other,
    };
    if is_short_name_char(mapped) {
        Some(mapped as u8)
    } else {
        None
    }
}

/// Generate an 8.3 short name for `long_name` that doesn't collide with any
/// entry currently in `loc`, appending a `~N` suffix on collision the way
/// the source's generator does.
fn generate_short_name(vol: &Volume, loc: DirLocation, long_name: &str) -> Result<[u8; 11], Error> {
    let (name_part, ext_part) = match long_name.rfind('.') {
        Some(0) => (long_name, ""),
        Some(i) => (&long_name[..i], &long_name[i + 1..]),
        None => (long_name, ""),
    };

    let mut base: Vec<u8> = name_part.chars().filter_map(sanitize_char).collect();
    base.truncate(8);
    if base.is_empty() {
        base = b"NONAME".to_vec();
    }

    let mut ext: Vec<u8> = ext_part.chars().filter_map(sanitize_char).collect();
    ext.truncate(3);

    for suffix in 0u32..=999_999 {
        let mut name11 = [crate::SPACE; 11];
        if suffix == 0 {
            name11[0..base.len()].copy_from_slice(&base);
        } else {
            let suffix_str = alloc::format!("~{suffix}");
            let suffix_bytes = suffix_str.as_bytes();
            let keep = 8usize.saturating_sub(suffix_bytes.len());
            let copy_len = core::cmp::min(base.len(), keep);
            name11[0..copy_len].copy_from_slice(&base[..copy_len]);
            name11[copy_len..copy_len + suffix_bytes.len()].copy_from_slice(suffix_bytes);
        }
        name11[8..8 + ext.len()].copy_from_slice(&ext);

        let mut candidate_entry = ShortDirEntry::empty();
        candidate_entry.name.copy_from_slice(&name11[0..8]);
        candidate_entry.extension.copy_from_slice(&name11[8..11]);
        let candidate = candidate_entry.short_name_string();

        match dir::find(vol, loc, &candidate) {
            Err(Error::NotFound) => return Ok(name11),
            Ok(_) => continue,
            Err(e) => return Err(e),
        }
    }
    Err(Error::AlreadyExists)
}

/// Write a short entry (plus LFN run, if the name doesn't fit 8.3) for
/// `name` into the first free run of slots in `loc`, and return the slot
/// index of the short entry itself.
pub fn create_entry(vol: &Volume, loc: DirLocation, name: &str, kind: EntryKind) -> Result<usize, Error> {
    if !is_valid_entry_name(name) {
        return Err(Error::BadParam);
    }
    if dir::find(vol, loc, name).is_ok() {
        return Err(Error::AlreadyExists);
    }

    let name11 = generate_short_name(vol, loc, name)?;
    let needs_lfn = !lfn::fits_short_name(name);
    let run = if needs_lfn { lfn::build_run(name, &name11)? } else { Vec::new() };
    let total_slots = run.len() + 1;

    let start = dir::find_free_run(vol, loc, total_slots)?;
    for (i, lfn_entry) in run.iter().enumerate() {
        dir::write_entry_slot(vol, loc, start + i, &lfn_entry.to_bytes())?;
    }
    let short_slot = start + run.len();

    let mut short = ShortDirEntry::empty();
    short.name.copy_from_slice(&name11[0..8]);
    short.extension.copy_from_slice(&name11[8..11]);
    short.attr = match kind {
        EntryKind::File => crate::ATTR_ARCHIVE,
        EntryKind::Directory => crate::ATTR_DIRECTORY,
    };
    dir::write_entry_slot(vol, loc, short_slot, &short.to_bytes())?;

    Ok(short_slot)
}

/// Write the `.` and `..` entries a freshly allocated directory cluster
/// needs as its first two slots.
fn write_dot_entries(vol: &Volume, dir_cluster: u32, parent_cluster: u32) -> Result<(), Error> {
    let mut dot = ShortDirEntry::empty();
    dot.name = *b".       ";
    dot.attr = crate::ATTR_DIRECTORY;
    dot.set_first_cluster(dir_cluster);

    let mut dotdot = ShortDirEntry::empty();
    dotdot.name = *b"..      ";
    dotdot.attr = crate::ATTR_DIRECTORY;
    let parent_ref = if parent_cluster == vol.bpb.root_dir_cluster() { 0 } else { parent_cluster };
    dotdot.set_first_cluster(parent_ref);

    dir::write_entry_slot(vol, DirLocation::Cluster(dir_cluster), 0, &dot.to_bytes())?;
    dir::write_entry_slot(vol, DirLocation::Cluster(dir_cluster), 1, &dotdot.to_bytes())
}

pub fn mkdir(vol: &Volume, parent: ResolvedDir, name: &str) -> Result<(), Error> {
    if name == "." || name == ".." || !is_valid_entry_name(name) {
        return Err(Error::BadParam);
    }
    if dir::find(vol, parent.location, name).is_ok() {
        return Err(Error::AlreadyExists);
    }

    let dir_cluster = vol.fat.allocate()?;
    let result: Result<(), Error> = (|| {
        zero_and_link_directory_cluster(vol, dir_cluster)?;
        write_dot_entries(vol, dir_cluster, parent.cluster)?;
        let slot = create_entry(vol, parent.location, name, EntryKind::Directory)?;
        let raw = dir::read_entry_slot(vol, parent.location, slot)?;
        let mut short = ShortDirEntry::from_bytes(&raw);
        short.set_first_cluster(dir_cluster);
        dir::write_entry_slot(vol, parent.location, slot, &short.to_bytes())
    })();

    if result.is_err() {
        let _ = vol.fat.write_entry(dir_cluster, crate::FREE_CLUSTER);
    }
    result
}

fn zero_and_link_directory_cluster(vol: &Volume, cluster: u32) -> Result<(), Error> {
    let bps = vol.bpb.bytes_per_sector();
    let zero = alloc::vec![0u8; bps];
    let first_sector = vol.bpb.cluster_to_sector(cluster);
    for s in 0..vol.bpb.sectors_per_cluster() {
        let block = crate::cache::get_block(first_sector + s, vol.device())?;
        block.write().write_slice(0, &zero);
    }
    Ok(())
}

/// A directory is empty if its only live entries are `.` and `..`.
fn is_directory_empty(vol: &Volume, cluster: u32) -> Result<bool, Error> {
    let mut count = 0usize;
    dir::iterate(vol, DirLocation::Cluster(cluster), |_| {
        count += 1;
        count <= 2
    })?;
    Ok(count <= 2)
}

fn tombstone_run(vol: &Volume, loc: DirLocation, slot_index: usize, slot_count: usize) -> Result<(), Error> {
    for i in 0..slot_count {
        let raw = dir::read_entry_slot(vol, loc, slot_index + i)?;
        let mut tombstoned = raw;
        tombstoned[0] = crate::DIR_ENTRY_UNUSED;
        dir::write_entry_slot(vol, loc, slot_index + i, &tombstoned)?;
    }
    Ok(())
}

pub fn rmdir(vol: &Volume, loc: DirLocation, name: &str) -> Result<(), Error> {
    let entry = dir::find(vol, loc, name)?;
    if entry.kind() != EntryKind::Directory {
        return Err(Error::NotADirectory);
    }
    if entry.short.is_read_only() {
        return Err(Error::ReadOnly);
    }
    let cluster = entry.short.first_cluster();
    if cluster == 0 || !is_directory_empty(vol, cluster)? {
        return Err(Error::NotEmpty);
    }
    vol.fat.free_chain(cluster)?;
    tombstone_run(vol, loc, entry.slot_index, entry.slot_count)
}

pub fn unlink(vol: &Volume, loc: DirLocation, name: &str) -> Result<(), Error> {
    let entry = dir::find(vol, loc, name)?;
    if entry.kind() == EntryKind::Directory {
        return Err(Error::IsDirectory);
    }
    if entry.short.is_read_only() {
        return Err(Error::ReadOnly);
    }
    vol.fat.free_chain_if_any(entry.short.first_cluster())?;
    tombstone_run(vol, loc, entry.slot_index, entry.slot_count)
}

/// Move an entry between directories (or just rename it within one) by
/// tombstoning the old slots and re-creating the entry at the destination
/// name, carrying over the original's first cluster, size, and kind.
pub fn rename(
    vol: &Volume,
    from_loc: DirLocation,
    from_name: &str,
    to_loc: DirLocation,
    to_name: &str,
) -> Result<(), Error> {
    let entry = dir::find(vol, from_loc, from_name)?;
    if dir::find(vol, to_loc, to_name).is_ok() {
        return Err(Error::AlreadyExists);
    }

    let kind = entry.kind();
    let slot = create_entry(vol, to_loc, to_name, kind)?;
    let raw = dir::read_entry_slot(vol, to_loc, slot)?;
    let mut short = ShortDirEntry::from_bytes(&raw);
    short.set_first_cluster(entry.short.first_cluster());
    short.file_size = entry.short.file_size;
    dir::write_entry_slot(vol, to_loc, slot, &short.to_bytes())?;

    tombstone_run(vol, from_loc, entry.slot_index, entry.slot_count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::Volume;

    fn mount_fat12() -> Volume {
        let device = crate::testutil::build_fat12(4000, 1);
        Volume::mount(device).unwrap()
    }

    #[test]
    fn reserved_device_names_are_rejected() {
        assert!(!is_valid_entry_name("CON"));
        assert!(!is_valid_entry_name("con.txt"));
        assert!(!is_valid_entry_name("LPT1"));
        assert!(is_valid_entry_name("CONSOLE.txt"));
        assert!(is_valid_entry_name("readme.txt"));
    }

    #[test]
    fn generate_short_name_sanitizes_and_uppercases() {
        let vol = mount_fat12();
        let name11 = generate_short_name(&vol, DirLocation::FixedRoot, "my file+name.txt").unwrap();
        // '+' maps to '_', spaces are dropped, everything is uppercased.
        assert_eq!(&name11[0..8], b"MYFILE_N");
        assert_eq!(&name11[8..11], b"TXT");
    }

    #[test]
    fn generate_short_name_appends_numeric_suffix_on_collision() {
        let vol = mount_fat12();
        create_entry(&vol, DirLocation::FixedRoot, "samename.txt", EntryKind::File).unwrap();
        let name11 = generate_short_name(&vol, DirLocation::FixedRoot, "samename.txt").unwrap();
        let mut entry = ShortDirEntry::empty();
        entry.name.copy_from_slice(&name11[0..8]);
        entry.extension.copy_from_slice(&name11[8..11]);
        assert_eq!(entry.short_name_string(), "SAMENA~1.TXT");
    }

    #[test]
    fn create_entry_twice_with_same_name_fails() {
        let vol = mount_fat12();
        create_entry(&vol, DirLocation::FixedRoot, "a.txt", EntryKind::File).unwrap();
        assert_eq!(
            create_entry(&vol, DirLocation::FixedRoot, "a.txt", EntryKind::File),
            Err(Error::AlreadyExists)
        );
    }

    #[test]
    fn create_entry_long_name_gets_an_lfn_run_and_a_short_alias() {
        let vol = mount_fat12();
        let slot = create_entry(&vol, DirLocation::FixedRoot, "a rather long file name.txt", EntryKind::File).unwrap();
        let found = dir::find(&vol, DirLocation::FixedRoot, "a rather long file name.txt").unwrap();
        assert_eq!(found.slot_index, slot);
        assert!(found.slot_count > 1, "a name over 8.3 needs at least one LFN entry");
        assert_eq!(found.long_name.as_deref(), Some("a rather long file name.txt"));
    }
}

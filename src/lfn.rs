//! Long file name (LFN) codec (C7): checksum, run parsing, and emission.
//!
//! Grounded on `original_source/src/fat_lfn.c`. The source splits this
//! across `fat_parse_lfn` (per-entry UTF-16 extraction) and
//! `fat_read_lfn_sequence` (the backward directory walk that assembles a
//! full run), with a second, never-actually-present `fat_find_lfn_entries`
//! referenced only in comments. This module keeps one codec: [`checksum`],
//! [`collect_run`], and [`build_run`].

use alloc::string::String;
use alloc::vec::Vec;

use crate::entry::{LongDirEntry, ShortDirEntry};
use crate::error::Error;
use crate::LAST_LONG_ENTRY;

/// `Sum = ((Sum & 1) ? 0x80 : 0) + (Sum >> 1) + byte`, over the 11-byte
/// packed short name. Ties an LFN run to the short entry that terminates it.
pub fn checksum(name11: &[u8; 11]) -> u8 {
    let mut sum: u8 = 0;
    for &b in name11 {
        sum = (if sum & 1 != 0 { 0x80 } else { 0 })
            .wrapping_add(sum >> 1)
            .wrapping_add(b);
    }
    sum
}

/// Decode the UTF-16LE units of one run (oldest-to-newest order, i.e.
/// sequence 1 first) into a `String`. Non-ASCII code points become `?`,
/// matching the source's placeholder behavior (spec'd as acceptable; full
/// UTF-8 re-encoding is not required).
pub fn decode_run(entries: &[LongDirEntry]) -> String {
    let mut out = String::new();
    // `entries` is in on-disk order: index 0 carries the highest sequence
    // number (and the terminator, if any), index len-1 carries sequence 1.
    // The name's logical order is the reverse of that.
    'entries: for entry in entries.iter().rev() {
        for unit in entry.name_units() {
            if unit == 0x0000 || unit == 0xFFFF {
                break 'entries;
            }
            if unit < 0x80 {
                out.push(unit as u8 as char);
            } else {
                out.push('?');
            }
        }
    }
    out
}

/// Validate a backward-collected run: sequence numbers must count down from
/// `entries.len()` to 1 with the first physical entry (the one with the
/// highest sequence number) marked [`LAST_LONG_ENTRY`], and every entry must
/// carry the same checksum.
pub fn validate_run(entries: &[LongDirEntry], expected_checksum: u8) -> bool {
    if entries.is_empty() {
        return false;
    }
    let count = entries.len();
    for (i, entry) in entries.iter().enumerate() {
        let expected_seq = (count - i) as u8;
        if entry.sequence() != expected_seq {
            return false;
        }
        if i == 0 && !entry.is_last_in_run() {
            return false;
        }
        if entry.chk_sum != expected_checksum {
            return false;
        }
    }
    true
}

/// Validate a run of [`LongDirEntry`] values already collected in on-disk
/// order (the entry carrying [`LAST_LONG_ENTRY`] first, sequence 1 last,
/// immediately preceding the short entry) against the short entry they
/// claim to belong to. Returns the same slice back as `Some` if it checks
/// out, `None` if the run is orphaned (bad checksum, broken sequence).
pub fn collect_run(preceding: &[LongDirEntry], short: &ShortDirEntry) -> Option<Vec<LongDirEntry>> {
    if preceding.is_empty() {
        return None;
    }
    let expected_checksum = checksum(&short.name11());
    if validate_run(preceding, expected_checksum) {
        Some(preceding.to_vec())
    } else {
        None
    }
}

/// Number of LFN entries needed to store `name` (ceil(chars / 13)).
pub fn entries_needed(name: &str) -> usize {
    let chars = name.chars().count();
    if chars == 0 {
        0
    } else {
        (chars + 12) / 13
    }
}

/// Build a run of [`LongDirEntry`] values for `name`, oldest-physical-first
/// (i.e. the order to write immediately before the short entry): entry 0
/// carries the highest sequence number and the [`LAST_LONG_ENTRY`] bit.
pub fn build_run(name: &str, short_name11: &[u8; 11]) -> Result<Vec<LongDirEntry>, Error> {
    let sum = checksum(short_name11);
    let units: Vec<u16> = name.encode_utf16().collect();
    let count = entries_needed(name);
    if count == 0 || count > 20 {
        return Err(Error::BadParam);
    }

    let mut out = Vec::with_capacity(count);
    for seq in (1..=count).rev() {
        let start = (seq - 1) * 13;
        let end = core::cmp::min(start + 13, units.len());
        let mut chunk = [0xFFFFu16; 13];
        for (i, &u) in units[start..end].iter().enumerate() {
            chunk[i] = u;
        }
        // Terminate with NUL right after the name if it doesn't fill the
        // entry exactly; an exact multiple of 13 gets no terminator.
        if end - start < 13 {
            chunk[end - start] = 0x0000;
        }

        let mut entry = LongDirEntry {
            ord: seq as u8,
            name1: [0; 5],
            attr: crate::ATTR_LONG_NAME,
            ldir_type: 0,
            chk_sum: sum,
            name2: [0; 6],
            fst_clus_lo: 0,
            name3: [0; 2],
        };
        entry.set_name_units(chunk);
        if seq == count {
            entry.ord |= LAST_LONG_ENTRY;
        }
        out.push(entry);
    }
    Ok(out)
}

/// Whether `name` can be represented exactly as an 8.3 short name without an
/// LFN run (all-uppercase ASCII, no embedded spaces, <=8.3 split).
pub fn fits_short_name(name: &str) -> bool {
    let (base, ext) = match name.rfind('.') {
        Some(i) => (&name[..i], &name[i + 1..]),
        None => (name, ""),
    };
    base.is_ascii()
        && ext.is_ascii()
        && !base.is_empty()
        && base.len() <= 8
        && ext.len() <= 3
        && !base.contains(' ')
        && !ext.contains(' ')
        && !base.contains('.')
        && base.chars().all(|c| !c.is_ascii_lowercase())
        && ext.chars().all(|c| !c.is_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_is_a_pure_function_of_the_short_name() {
        let name11 = *b"MYRESU~1TXT";
        assert_eq!(checksum(&name11), checksum(&name11));
        let other = *b"OTHER   TXT";
        assert_ne!(checksum(&name11), checksum(&other));
    }

    #[test]
    fn entries_needed_matches_ceil_division() {
        assert_eq!(entries_needed(""), 0);
        assert_eq!(entries_needed("a"), 1);
        assert_eq!(entries_needed(&"a".repeat(13)), 1);
        assert_eq!(entries_needed(&"a".repeat(14)), 2);
        assert_eq!(entries_needed(&"a".repeat(26)), 2);
        assert_eq!(entries_needed(&"a".repeat(27)), 3);
    }

    #[test]
    fn build_run_then_collect_run_round_trips_ascii_name() {
        let long_name = "My Long File Name.txt";
        let name11 = *b"MYLONG~1TXT";
        let run = build_run(long_name, &name11).unwrap();
        assert_eq!(run.len(), entries_needed(long_name));

        let short = ShortDirEntry::new(*b"MYLONG~1", *b"TXT", 0, crate::entry::EntryKind::File);
        let collected = collect_run(&run, &short).expect("run should validate against its own checksum");
        assert_eq!(decode_run(&collected), long_name);
    }

    #[test]
    fn collect_run_rejects_checksum_mismatch() {
        let name11 = *b"MYLONG~1TXT";
        let run = build_run("My Long File Name.txt", &name11).unwrap();
        let wrong_short = ShortDirEntry::new(*b"OTHER   ", *b"TXT", 0, crate::entry::EntryKind::File);
        assert!(collect_run(&run, &wrong_short).is_none());
    }

    #[test]
    fn decode_run_renders_non_ascii_as_placeholder() {
        let mut entry = LongDirEntry {
            ord: 1 | LAST_LONG_ENTRY,
            name1: [0; 5],
            attr: crate::ATTR_LONG_NAME,
            ldir_type: 0,
            chk_sum: 0,
            name2: [0; 6],
            fst_clus_lo: 0,
            name3: [0; 2],
        };
        let mut units = [0xFFFFu16; 13];
        units[0] = 'A' as u16;
        units[1] = 0x00E9; // 'é', non-ASCII
        units[2] = 0x0000;
        entry.set_name_units(units);
        assert_eq!(decode_run(&[entry]), "A?");
    }

    #[test]
    fn fits_short_name_accepts_only_bare_8_3_ascii_upper() {
        assert!(fits_short_name("README.TXT"));
        assert!(fits_short_name("README"));
        assert!(!fits_short_name("readme.txt"));
        assert!(!fits_short_name("My File.txt"));
        assert!(!fits_short_name("verylongname.txt"));
        assert!(!fits_short_name("README.TEXT"));
    }
}

#![no_std]
//! FAT12/16/32 filesystem driver core.
//!
//! A single-threaded, block-device-agnostic FAT driver: mount a volume over
//! any [`device::BlockDevice`], then open/create/read/write/seek files and
//! walk directories. No internal locking — callers that share a `Volume`
//! across threads must serialize access themselves (see `volume` module
//! docs).

extern crate alloc;

pub mod bpb;
pub mod cache;
pub mod device;
pub mod dir;
pub mod entry;
pub mod error;
pub mod fat;
pub mod file;
pub mod lfn;
pub mod ops;
pub mod path;
pub mod volume;

#[cfg(test)]
pub(crate) mod testutil;

pub use error::Error;

pub const LEAD_SIGNATURE: u32 = 0x41615252;
pub const STRUCT_SIGNATURE: u32 = 0x61417272;
pub const TRAIL_SIGNATURE: u32 = 0xAA550000;

pub const FREE_CLUSTER: u32 = 0x00000000;
pub const END_CLUSTER: u32 = 0x0FFFFFF8;
pub const BAD_CLUSTER: u32 = 0x0FFFFFF7;
/// Value written into a cluster's own FAT slot to mark it the end of its
/// chain. Distinct from the cluster number itself, which remains a normal,
/// in-use cluster.
pub const END_OF_CLUSTER: u32 = 0x0FFFFFFF;

pub const ATTR_READ_ONLY: u8 = 0x01;
pub const ATTR_HIDDEN: u8 = 0x02;
pub const ATTR_SYSTEM: u8 = 0x04;
pub const ATTR_VOLUME_ID: u8 = 0x08;
pub const ATTR_DIRECTORY: u8 = 0x10;
pub const ATTR_ARCHIVE: u8 = 0x20;
pub const ATTR_LONG_NAME: u8 = ATTR_READ_ONLY | ATTR_HIDDEN | ATTR_SYSTEM | ATTR_VOLUME_ID;

pub const DIRENT_SIZE: usize = 32;
pub const LONG_NAME_LEN: u32 = 13;

pub const BLOCK_CACHE_LIMIT: usize = 64;

pub const SPACE: u8 = 0x20;
pub const DOT: u8 = 0x2E;

/// Fixed device block size this crate works in; `bytes_per_sector` read from
/// the BPB drives higher-level buffer arithmetic but every device call moves
/// whole blocks of this size.
pub const BLOCK_SIZE: usize = 512;

pub const LONG_DIR_ENT_NAME_CAPACITY: usize = 13;
pub const SHORT_DIR_ENT_NAME_CAPACITY: usize = 11;

/// Short entry `name[0]` / LFN entry `ord`: slot is a tombstone, scan continues.
pub const DIR_ENTRY_UNUSED: u8 = 0xE5;
/// Short entry `name[0]`: slot and everything after it is unused.
pub const DIR_ENTRY_LAST_AND_UNUSED: u8 = 0x00;
/// LFN entry `ord` high bit: this is the first (logically last-written) entry
/// of the run.
pub const LAST_LONG_ENTRY: u8 = 0x40;

pub const MAX_CLUSTER_FAT12: usize = 4085;
pub const MAX_CLUSTER_FAT16: usize = 65525;
pub const MAX_CLUSTER_FAT32: usize = 268435445;

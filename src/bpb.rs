//! BIOS Parameter Block (BPB) / boot sector parsing (C0c, C2, C5).
//!
//! Grounded on the teacher's `bpb.rs`, which hard-coded FAT32 geometry via a
//! `#[repr(packed)]` struct overlaid directly on the sector buffer. This
//! module keeps the teacher's field layout and accessor names but drops the
//! struct-overlay: every field is read by explicit little-endian
//! composition off a [`crate::cache::BlockCache`], per the "never type-pun a
//! cache offset" design note, and the accessors are generalized to also
//! produce FAT12/16 geometry (`original_source/src/fat_table.c`'s FAT-type
//! thresholds and `fat_root.c`'s fixed-root math).

use alloc::sync::Arc;

use crate::cache::BlockCache;
use crate::device::BlockDevice;
use crate::error::Error;
use crate::{LEAD_SIGNATURE, MAX_CLUSTER_FAT12, MAX_CLUSTER_FAT16, STRUCT_SIGNATURE, TRAIL_SIGNATURE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatType {
    Fat12,
    Fat16,
    Fat32,
}

/// Mounted-volume geometry (V in the data model). Immutable once parsed.
#[derive(Debug, Clone, Copy)]
pub struct BiosParameterBlock {
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub reserved_sector_count: u16,
    pub num_fats: u8,
    pub root_entry_count: u16,
    pub total_sectors_16: u16,
    pub fat_size_16: u16,
    pub total_sectors_32: u32,
    /// FAT32 only: sectors per single FAT. Zero for FAT12/16 (use `fat_size_16`).
    pub fat_size_32: u32,
    /// FAT32 only: first cluster of the root directory.
    pub root_cluster: u32,
    /// FAT32 only: sector number of the FSInfo structure.
    pub fs_info_sector: u16,
}

impl BiosParameterBlock {
    /// Parse and validate a boot sector already loaded into a block cache
    /// entry for sector 0.
    pub fn parse(sector: &BlockCache) -> Result<Self, Error> {
        let bytes_per_sector = sector.read_u16(0x0B);
        let sectors_per_cluster = sector.bytes()[0x0D];
        let reserved_sector_count = sector.read_u16(0x0E);
        let num_fats = sector.bytes()[0x10];
        let root_entry_count = sector.read_u16(0x11);
        let total_sectors_16 = sector.read_u16(0x13);
        let fat_size_16 = sector.read_u16(0x16);
        let total_sectors_32 = sector.read_u32(0x20);

        let (fat_size_32, root_cluster, fs_info_sector) = if fat_size_16 == 0 {
            (
                sector.read_u32(0x24),
                sector.read_u32(0x2C),
                sector.read_u16(0x30),
            )
        } else {
            (0, 0, 0)
        };

        let bpb = Self {
            bytes_per_sector,
            sectors_per_cluster,
            reserved_sector_count,
            num_fats,
            root_entry_count,
            total_sectors_16,
            fat_size_16,
            total_sectors_32,
            fat_size_32,
            root_cluster,
            fs_info_sector,
        };

        bpb.validate()?;
        Ok(bpb)
    }

    fn validate(&self) -> Result<(), Error> {
        let valid_sector_size = matches!(self.bytes_per_sector, 512 | 1024 | 2048 | 4096);
        let valid_cluster_size = self.sectors_per_cluster.is_power_of_two();
        let valid_fat_cnt = self.num_fats >= 1 && self.num_fats <= 2;
        let has_fat_size = self.fat_size_16 != 0 || self.fat_size_32 != 0;
        let has_total_sectors = self.total_sectors_16 != 0 || self.total_sectors_32 != 0;

        if !(valid_sector_size && valid_cluster_size && valid_fat_cnt && has_fat_size && has_total_sectors)
        {
            log::error!("boot sector failed basic sanity checks");
            return Err(Error::Corrupt);
        }
        Ok(())
    }

    #[inline]
    pub fn bytes_per_sector(&self) -> usize {
        self.bytes_per_sector as usize
    }

    #[inline]
    pub fn sectors_per_cluster(&self) -> usize {
        self.sectors_per_cluster as usize
    }

    #[inline]
    pub fn bytes_per_cluster(&self) -> usize {
        self.bytes_per_sector() * self.sectors_per_cluster()
    }

    #[inline]
    pub fn reserved_sector_count(&self) -> usize {
        self.reserved_sector_count as usize
    }

    #[inline]
    pub fn num_fats(&self) -> usize {
        self.num_fats as usize
    }

    /// Sectors occupied by one FAT, for either FAT12/16 (`fat_size_16`) or
    /// FAT32 (`fat_size_32`).
    #[inline]
    pub fn fat_size_sectors(&self) -> usize {
        if self.fat_size_16 != 0 {
            self.fat_size_16 as usize
        } else {
            self.fat_size_32 as usize
        }
    }

    #[inline]
    pub fn total_sectors(&self) -> usize {
        if self.total_sectors_16 != 0 {
            self.total_sectors_16 as usize
        } else {
            self.total_sectors_32 as usize
        }
    }

    /// `RootDirSectors = ceil(root_entry_count * 32 / bytes_per_sector)`.
    /// Always 0 on FAT32.
    #[inline]
    pub fn root_dir_sector_cnt(&self) -> usize {
        ((self.root_entry_count as usize) * 32 + self.bytes_per_sector() - 1)
            / self.bytes_per_sector()
    }

    /// `fat12_root_start_sector` (C5): `R + N*F`.
    #[inline]
    pub fn root_start_sector(&self) -> usize {
        self.reserved_sector_count() + self.num_fats() * self.fat_size_sectors()
    }

    /// First data sector beyond the root directory region (D in the data
    /// model).
    #[inline]
    pub fn first_data_sector(&self) -> usize {
        self.root_start_sector() + self.root_dir_sector_cnt()
    }

    #[inline]
    pub fn data_sector_cnt(&self) -> usize {
        self.total_sectors() - self.first_data_sector()
    }

    /// Count of data clusters, T in the data model. Determines FAT type.
    #[inline]
    pub fn data_cluster_cnt(&self) -> usize {
        self.data_sector_cnt() / self.sectors_per_cluster()
    }

    /// The one and only way FAT type is determined: by cluster count, never
    /// by a stored type string.
    pub fn fat_type(&self) -> FatType {
        let clusters = self.data_cluster_cnt();
        if clusters < MAX_CLUSTER_FAT12 {
            FatType::Fat12
        } else if clusters < MAX_CLUSTER_FAT16 {
            FatType::Fat16
        } else {
            FatType::Fat32
        }
    }

    /// `cluster_to_sector(c) = D + (c - 2) * S` (C5).
    #[inline]
    pub fn cluster_to_sector(&self, cluster: u32) -> usize {
        self.first_data_sector() + (cluster as usize - 2) * self.sectors_per_cluster()
    }

    /// Sentinel meaning "fixed-region root" on FAT12/16, or the first FAT32
    /// root cluster.
    #[inline]
    pub fn root_dir_cluster(&self) -> u32 {
        match self.fat_type() {
            FatType::Fat32 => self.root_cluster,
            _ => 0,
        }
    }
}

/// FAT32 FSInfo sector. Read once at mount for a free-cluster hint; never
/// written back (FSInfo maintenance is an explicit non-goal).
#[derive(Debug, Clone, Copy)]
pub struct FsInfo {
    pub free_cluster_hint: u32,
    pub next_free_hint: u32,
    valid: bool,
}

impl FsInfo {
    pub fn parse(sector: &BlockCache) -> Self {
        let lead_sig = sector.read_u32(0);
        let struc_sig = sector.read_u32(484);
        let trail_sig = sector.read_u32(508);
        let valid = lead_sig == LEAD_SIGNATURE && struc_sig == STRUCT_SIGNATURE && trail_sig == TRAIL_SIGNATURE;
        if !valid {
            log::warn!("FSInfo signature mismatch, free-cluster hint unavailable");
        }
        Self {
            free_cluster_hint: sector.read_u32(488),
            next_free_hint: sector.read_u32(492),
            valid,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }
}

pub fn read_boot_sector(device: Arc<dyn BlockDevice>) -> Result<BiosParameterBlock, Error> {
    let cache = crate::cache::get_block(0, device)?;
    let guard = cache.read();
    BiosParameterBlock::parse(&guard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;

    #[test]
    fn fat12_image_classifies_as_fat12() {
        let device = testutil::build_fat12(4000, 1);
        let bpb = read_boot_sector(device).unwrap();
        assert_eq!(bpb.fat_type(), FatType::Fat12);
        assert_eq!(bpb.bytes_per_sector(), 512);
    }

    #[test]
    fn fat16_image_classifies_as_fat16() {
        let device = testutil::build_fat16(8300, 2);
        let bpb = read_boot_sector(device).unwrap();
        assert_eq!(bpb.fat_type(), FatType::Fat16);
    }

    #[test]
    fn fat32_image_classifies_as_fat32_with_root_cluster_2() {
        let device = testutil::build_fat32(70_000, 1, 600);
        let bpb = read_boot_sector(device).unwrap();
        assert_eq!(bpb.fat_type(), FatType::Fat32);
        assert_eq!(bpb.root_dir_cluster(), 2);
        assert_eq!(bpb.root_dir_sector_cnt(), 0);
    }

    #[test]
    fn cluster_to_sector_is_strictly_increasing() {
        let device = testutil::build_fat32(70_000, 1, 600);
        let bpb = read_boot_sector(device).unwrap();
        let mut prev = bpb.cluster_to_sector(2);
        for c in 3..100u32 {
            let s = bpb.cluster_to_sector(c);
            assert!(s > prev);
            prev = s;
        }
    }

    #[test]
    fn fs_info_parses_known_signatures() {
        let device = testutil::build_fat32(70_000, 1, 600);
        let block = crate::cache::get_block(1, device).unwrap();
        let info = FsInfo::parse(&block.read());
        assert!(info.is_valid());
        assert_eq!(info.free_cluster_hint, 0xFFFF_FFFF);
    }
}

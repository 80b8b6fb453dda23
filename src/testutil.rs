//! Test-only in-memory block device and minimal FAT12/16/32 image builder.
//!
//! Grounded on the pattern shared by the `other_examples/` mock block
//! devices: a `Vec<u8>` behind a lock implementing [`BlockDevice`] directly,
//! no real storage involved. The image builder writes just enough of a
//! boot sector (and FSInfo, for FAT32) for [`crate::bpb::read_boot_sector`]
//! to parse and validate it, then zeroes the FAT and root directory
//! regions so every cluster starts out free and every directory starts out
//! empty.

use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;

use spin::Mutex;

use crate::bpb::FatType;
use crate::device::{BlockDevice, DeviceError};
use crate::BLOCK_SIZE;

pub struct RamDisk {
    data: Mutex<Vec<u8>>,
}

impl RamDisk {
    pub fn new(total_sectors: usize) -> Arc<Self> {
        let _ = env_logger::builder().is_test(true).try_init();
        Arc::new(Self {
            data: Mutex::new(vec![0u8; total_sectors * BLOCK_SIZE]),
        })
    }
}

impl BlockDevice for RamDisk {
    fn read(&self, buf: &mut [u8], offset: usize, block_cnt: usize) -> Result<(), DeviceError> {
        let len = block_cnt * BLOCK_SIZE;
        let data = self.data.lock();
        if offset + len > data.len() {
            return Err(DeviceError);
        }
        buf[..len].copy_from_slice(&data[offset..offset + len]);
        Ok(())
    }

    fn write(&self, buf: &[u8], offset: usize, block_cnt: usize) -> Result<(), DeviceError> {
        let len = block_cnt * BLOCK_SIZE;
        let mut data = self.data.lock();
        if offset + len > data.len() {
            return Err(DeviceError);
        }
        data[offset..offset + len].copy_from_slice(&buf[..len]);
        Ok(())
    }
}

pub struct ImageLayout {
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub reserved_sector_count: u16,
    pub num_fats: u8,
    pub root_entry_count: u16,
    pub total_sectors: u32,
    pub fat_size: u32,
}

fn write_u16(buf: &mut [u8], offset: usize, value: u16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

fn write_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

/// Write a boot sector for `layout` into sector 0. FAT32 is selected by
/// `root_entry_count == 0` (the on-disk convention this driver itself
/// relies on in `BiosParameterBlock::fat_type`).
fn write_boot_sector(device: &RamDisk, layout: &ImageLayout, fat32: bool) {
    let mut sector = [0u8; BLOCK_SIZE];
    write_u16(&mut sector, 0x0B, layout.bytes_per_sector);
    sector[0x0D] = layout.sectors_per_cluster;
    write_u16(&mut sector, 0x0E, layout.reserved_sector_count);
    sector[0x10] = layout.num_fats;
    write_u16(&mut sector, 0x11, layout.root_entry_count);
    if layout.total_sectors <= u16::MAX as u32 && !fat32 {
        write_u16(&mut sector, 0x13, layout.total_sectors as u16);
    } else {
        write_u32(&mut sector, 0x20, layout.total_sectors);
    }

    if fat32 {
        write_u16(&mut sector, 0x16, 0);
        write_u32(&mut sector, 0x24, layout.fat_size);
        write_u32(&mut sector, 0x2C, 2);
        write_u16(&mut sector, 0x30, 1);
    } else {
        write_u16(&mut sector, 0x16, layout.fat_size as u16);
    }

    device.write(&sector, 0, 1).unwrap();
}

fn write_fsinfo(device: &RamDisk, sector_num: usize) {
    let mut sector = [0u8; BLOCK_SIZE];
    write_u32(&mut sector, 0, crate::LEAD_SIGNATURE);
    write_u32(&mut sector, 484, crate::STRUCT_SIGNATURE);
    write_u32(&mut sector, 508, crate::TRAIL_SIGNATURE);
    write_u32(&mut sector, 488, 0xFFFF_FFFF);
    write_u32(&mut sector, 492, 0xFFFF_FFFF);
    device.write(&sector, sector_num * BLOCK_SIZE, 1).unwrap();
}

/// Seed the first FAT entries (the two reserved slots at the start of
/// every FAT) and, for FAT32, mark cluster 2 (the root) as end-of-chain.
fn seed_fat(device: &RamDisk, layout: &ImageLayout, fat_type: FatType) {
    let fat_start = layout.reserved_sector_count as usize;
    let mut sector = [0u8; BLOCK_SIZE];
    match fat_type {
        FatType::Fat12 => {
            sector[0] = 0xF8;
            sector[1] = 0xFF;
            sector[2] = 0xFF;
        }
        FatType::Fat16 => {
            write_u16(&mut sector, 0, 0xFFF8);
            write_u16(&mut sector, 2, 0xFFFF);
        }
        FatType::Fat32 => {
            write_u32(&mut sector, 0, 0x0FFF_FFF8);
            write_u32(&mut sector, 4, 0x0FFF_FFFF);
            write_u32(&mut sector, 8, 0x0FFF_FFFF);
        }
    }
    device.write(&sector, fat_start * BLOCK_SIZE, 1).unwrap();

    for copy in 1..layout.num_fats as usize {
        let sector_num = fat_start + copy * layout.fat_size as usize;
        device.write(&sector, sector_num * BLOCK_SIZE, 1).unwrap();
    }
}

/// Build a minimal FAT12 image: `total_sectors` must keep the data cluster
/// count under 4085 for the result to actually parse as FAT12.
pub fn build_fat12(total_sectors: u32, sectors_per_cluster: u8) -> Arc<RamDisk> {
    let layout = ImageLayout {
        bytes_per_sector: BLOCK_SIZE as u16,
        sectors_per_cluster,
        reserved_sector_count: 1,
        num_fats: 2,
        root_entry_count: 224,
        total_sectors,
        fat_size: 9,
    };
    let device = RamDisk::new(total_sectors as usize);
    write_boot_sector(&device, &layout, false);
    seed_fat(&device, &layout, FatType::Fat12);
    device
}

/// Build a minimal FAT16 image.
pub fn build_fat16(total_sectors: u32, sectors_per_cluster: u8) -> Arc<RamDisk> {
    let layout = ImageLayout {
        bytes_per_sector: BLOCK_SIZE as u16,
        sectors_per_cluster,
        reserved_sector_count: 1,
        num_fats: 2,
        root_entry_count: 512,
        total_sectors,
        fat_size: 32,
    };
    let device = RamDisk::new(total_sectors as usize);
    write_boot_sector(&device, &layout, false);
    seed_fat(&device, &layout, FatType::Fat16);
    device
}

/// Build a minimal FAT32 image: root directory is cluster 2, already
/// zeroed (an empty directory).
pub fn build_fat32(total_sectors: u32, sectors_per_cluster: u8, fat_size: u32) -> Arc<RamDisk> {
    let layout = ImageLayout {
        bytes_per_sector: BLOCK_SIZE as u16,
        sectors_per_cluster,
        reserved_sector_count: 32,
        num_fats: 2,
        root_entry_count: 0,
        total_sectors,
        fat_size,
    };
    let device = RamDisk::new(total_sectors as usize);
    write_boot_sector(&device, &layout, true);
    write_fsinfo(&device, 1);
    seed_fat(&device, &layout, FatType::Fat32);

    let root_sector = layout.reserved_sector_count as usize
        + layout.num_fats as usize * layout.fat_size as usize;
    let zero = vec![0u8; BLOCK_SIZE];
    for s in 0..sectors_per_cluster as usize {
        device.write(&zero, (root_sector + s) * BLOCK_SIZE, 1).unwrap();
    }
    device
}

//! Sector block cache (part of C2's "FAT cache" concept, generalized to any
//! sector-sized buffer: FAT entries, directory entries, the boot sector).
//!
//! Grounded on the teacher's `block_cache.rs`: a fixed-size LRU of
//! [`BlockCache`] entries, each a 512-byte buffer with a dirty flag that
//! writes back through [`Drop`]. Unlike the teacher, cache misses under
//! pressure propagate a [`crate::Error::NoMemory`] instead of silently
//! falling back to an uncached direct device access, and cache reads are
//! bounds-checked rather than pointer-cast.

use alloc::sync::Arc;
use core::convert::TryInto;

use lazy_static::lazy_static;
use lru::LruCache;
use spin::RwLock;

use crate::device::BlockDevice;
use crate::error::Error;
use crate::BLOCK_CACHE_LIMIT;
use crate::BLOCK_SIZE;

pub struct BlockCache {
    cache: [u8; BLOCK_SIZE],
    block_id: usize,
    device: Arc<dyn BlockDevice>,
    modified: bool,
}

impl BlockCache {
    fn load(block_id: usize, device: Arc<dyn BlockDevice>) -> Result<Self, Error> {
        let mut cache = [0u8; BLOCK_SIZE];
        device
            .read(&mut cache, block_id * BLOCK_SIZE, 1)
            .map_err(|_| Error::Device)?;
        Ok(Self {
            cache,
            block_id,
            device,
            modified: false,
        })
    }

    pub fn bytes(&self) -> &[u8; BLOCK_SIZE] {
        &self.cache
    }

    /// Read a little-endian `u16` at `offset`. Bounds-checked; never
    /// type-punned.
    pub fn read_u16(&self, offset: usize) -> u16 {
        u16::from_le_bytes(self.cache[offset..offset + 2].try_into().unwrap())
    }

    /// Read a little-endian `u32` at `offset`. Bounds-checked; never
    /// type-punned.
    pub fn read_u32(&self, offset: usize) -> u32 {
        u32::from_le_bytes(self.cache[offset..offset + 4].try_into().unwrap())
    }

    pub fn read_slice(&self, offset: usize, out: &mut [u8]) {
        out.copy_from_slice(&self.cache[offset..offset + out.len()]);
    }

    pub fn write_u16(&mut self, offset: usize, value: u16) {
        self.cache[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
        self.modified = true;
    }

    pub fn write_u32(&mut self, offset: usize, value: u32) {
        self.cache[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
        self.modified = true;
    }

    pub fn write_slice(&mut self, offset: usize, data: &[u8]) {
        self.cache[offset..offset + data.len()].copy_from_slice(data);
        self.modified = true;
    }

    pub fn sync(&mut self) -> Result<(), Error> {
        if self.modified {
            self.device
                .write(&self.cache, self.block_id * BLOCK_SIZE, 1)
                .map_err(|_| Error::Device)?;
            self.modified = false;
        }
        Ok(())
    }
}

impl Drop for BlockCache {
    fn drop(&mut self) {
        let _ = self.sync();
    }
}

/// Identifies the backing device a cached block belongs to. The teacher's
/// cache keys purely by `block_id`, which is correct only under its
/// single-global-disk assumption; this crate lets a `Volume` and every `File`
/// opened from it hold independent `Arc<dyn BlockDevice>` clones, so two
/// mounted volumes (or two tests) can legitimately both have a "block 0" —
/// the cache key must disambiguate by device identity too.
type CacheKey = (usize, usize);

fn device_key(device: &Arc<dyn BlockDevice>) -> usize {
    Arc::as_ptr(device) as *const () as usize
}

pub struct BlockCacheManager {
    lru: LruCache<CacheKey, Arc<RwLock<BlockCache>>>,
}

impl BlockCacheManager {
    pub fn new() -> Self {
        Self {
            lru: LruCache::unbounded(),
        }
    }

    pub fn get(
        &mut self,
        block_id: usize,
        device: Arc<dyn BlockDevice>,
    ) -> Result<Arc<RwLock<BlockCache>>, Error> {
        let key = (device_key(&device), block_id);
        if let Some(cached) = self.lru.get(&key) {
            return Ok(Arc::clone(cached));
        }

        if self.lru.len() >= BLOCK_CACHE_LIMIT {
            if let Some((_, victim)) = self.lru.peek_lru() {
                if Arc::strong_count(victim) > 1 {
                    log::warn!("block cache full and lru entry {block_id} still referenced");
                    return Err(Error::NoMemory);
                }
            }
            self.lru.pop_lru();
        }

        let block = Arc::new(RwLock::new(BlockCache::load(block_id, device)?));
        self.lru.put(key, Arc::clone(&block));
        Ok(block)
    }

    pub fn flush_all(&mut self) -> Result<(), Error> {
        for (_, block) in self.lru.iter() {
            block.write().sync()?;
        }
        Ok(())
    }
}

impl Default for BlockCacheManager {
    fn default() -> Self {
        Self::new()
    }
}

lazy_static! {
    pub static ref BLOCK_CACHE_MANAGER: RwLock<BlockCacheManager> =
        RwLock::new(BlockCacheManager::new());
}

pub fn get_block(block_id: usize, device: Arc<dyn BlockDevice>) -> Result<Arc<RwLock<BlockCache>>, Error> {
    BLOCK_CACHE_MANAGER.write().get(block_id, device)
}

pub fn flush_all() -> Result<(), Error> {
    BLOCK_CACHE_MANAGER.write().flush_all()
}

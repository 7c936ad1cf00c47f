//! Cache of decoded TIFF tiles.
//!
//! Neighbouring regions share most of their source tiles: a 512 px region
//! over 256 px tiles touches up to nine of them, and the next stride
//! position touches six of the same. Keeping decoded tiles avoids
//! re-reading and re-decoding them.
//!
//! Capacity is bounded by decoded bytes; least-recently-used tiles are
//! evicted first.

use std::num::NonZeroUsize;
use std::sync::Arc;

use image::RgbImage;
use lru::LruCache;

/// Default cache capacity: 64MB of decoded pixels
pub const DEFAULT_TILE_CACHE_CAPACITY: usize = 64 * 1024 * 1024;

/// Upper bound on entries, to bound LRU bookkeeping
const DEFAULT_MAX_ENTRIES: usize = 4096;

/// Cache key: pyramid level and tile column/row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileKey {
    pub level: u32,
    pub tile_x: u32,
    pub tile_y: u32,
}

impl TileKey {
    pub const fn new(level: u32, tile_x: u32, tile_y: u32) -> Self {
        Self {
            level,
            tile_x,
            tile_y,
        }
    }
}

/// LRU cache of decoded tiles with a byte budget.
pub struct DecodedTileCache {
    cache: LruCache<TileKey, Arc<RgbImage>>,
    max_size: usize,
    current_size: usize,
}

impl DecodedTileCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_TILE_CACHE_CAPACITY)
    }

    /// Create a cache holding at most `max_size` bytes of decoded pixels.
    pub fn with_capacity(max_size: usize) -> Self {
        Self {
            cache: LruCache::new(NonZeroUsize::new(DEFAULT_MAX_ENTRIES).unwrap_or(NonZeroUsize::MIN)),
            max_size,
            current_size: 0,
        }
    }

    /// Get a tile, marking it as recently used.
    pub fn get(&mut self, key: &TileKey) -> Option<Arc<RgbImage>> {
        self.cache.get(key).cloned()
    }

    pub fn contains(&self, key: &TileKey) -> bool {
        self.cache.contains(key)
    }

    /// Store a tile, evicting least-recently-used tiles over capacity.
    ///
    /// A tile larger than the whole capacity is not stored.
    pub fn put(&mut self, key: TileKey, tile: Arc<RgbImage>) {
        let tile_size = byte_size(&tile);
        if tile_size > self.max_size {
            return;
        }

        if let Some(old) = self.cache.peek(&key) {
            self.current_size = self.current_size.saturating_sub(byte_size(old));
        }
        // Entry-count eviction happens inside `push`.
        if let Some((evicted_key, evicted)) = self.cache.push(key, tile) {
            if evicted_key != key {
                self.current_size = self.current_size.saturating_sub(byte_size(&evicted));
            }
        }
        self.current_size += tile_size;

        while self.current_size > self.max_size {
            match self.cache.pop_lru() {
                Some((_, evicted)) => {
                    self.current_size = self.current_size.saturating_sub(byte_size(&evicted));
                }
                None => {
                    self.current_size = 0;
                    break;
                }
            }
        }
    }

    pub fn clear(&mut self) {
        self.cache.clear();
        self.current_size = 0;
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Decoded bytes currently held.
    pub fn size(&self) -> usize {
        self.current_size
    }

    pub fn capacity(&self) -> usize {
        self.max_size
    }
}

impl Default for DecodedTileCache {
    fn default() -> Self {
        Self::new()
    }
}

fn byte_size(tile: &RgbImage) -> usize {
    tile.as_raw().len()
}

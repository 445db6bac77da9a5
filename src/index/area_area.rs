use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use tracing::info;

use crate::error::Result;
use crate::geom::GeoBox;
use crate::index::cell_box;
use crate::io::scanner::{FileScanner, ScannerMode};
use crate::model::FileOffset;
use crate::types::{TypeId, TypeSet};

pub const AREA_AREA_IDX: &str = "areaarea.idx";

const DEFAULT_CACHE_SIZE: usize = 1000;

/// One decoded quadtree cell. Child order is SW, SE, NW, NE; offset 0 marks
/// an absent child.
struct IndexCell {
    children: [FileOffset; 4],
    entries: Vec<(TypeId, FileOffset)>,
}

/// Hierarchical index over `areas.dat`: a quadtree in which every area is
/// stored at the deepest cell that fully contains its outer ring. Cells are
/// decoded on demand and kept in an LRU cache.
pub struct AreaAreaIndex {
    scanner: Mutex<FileScanner>,
    top_level: u32,
    top_cell_offset: FileOffset,
    cache: Mutex<LruCache<FileOffset, Arc<IndexCell>>>,
}

impl AreaAreaIndex {
    pub fn open(dir: &Path, cache_size: usize) -> Result<Self> {
        let mut scanner = FileScanner::open(dir.join(AREA_AREA_IDX), ScannerMode::LowMemRandom)?;

        let top_level = scanner.read_var_u32()?;
        let top_cell_offset = FileOffset::from(scanner.read_u32()?);
        let capacity = NonZeroUsize::new(cache_size)
            .unwrap_or_else(|| NonZeroUsize::new(DEFAULT_CACHE_SIZE).expect("nonzero default"));

        Ok(Self {
            scanner: Mutex::new(scanner),
            top_level,
            top_cell_offset,
            cache: Mutex::new(LruCache::new(capacity)),
        })
    }

    /// Offsets of areas of the selected types stored in cells intersecting
    /// `bbox`, descending no deeper than `max_level`. Stops early once
    /// `max_count` offsets are collected.
    pub fn get_offsets(
        &self,
        bbox: &GeoBox,
        max_level: u32,
        types: &TypeSet,
        max_count: usize,
    ) -> Result<Vec<FileOffset>> {
        let mut offsets = Vec::new();
        if !types.has_types() || max_count == 0 {
            return Ok(offsets);
        }

        let mut pending = vec![(self.top_cell_offset, self.top_level, 0u32, 0u32)];
        while let Some((cell_offset, level, x, y)) = pending.pop() {
            let cell = self.load_cell(cell_offset)?;

            for &(type_id, offset) in &cell.entries {
                if types.has_type(type_id) {
                    if offsets.len() >= max_count {
                        return Ok(offsets);
                    }
                    offsets.push(offset);
                }
            }

            if level >= max_level {
                continue;
            }
            for (child_idx, &child_offset) in cell.children.iter().enumerate() {
                if child_offset == 0 {
                    continue;
                }
                let child_x = 2 * x + (child_idx as u32 & 1);
                let child_y = 2 * y + (child_idx as u32 >> 1);
                if cell_box(child_x, child_y, level + 1).intersects(bbox) {
                    pending.push((child_offset, level + 1, child_x, child_y));
                }
            }
        }

        Ok(offsets)
    }

    fn load_cell(&self, cell_offset: FileOffset) -> Result<Arc<IndexCell>> {
        if let Some(cell) = self.cache.lock().get(&cell_offset) {
            return Ok(Arc::clone(cell));
        }

        let cell = {
            let mut scanner = self.scanner.lock();
            scanner.set_pos(cell_offset)?;

            let mut children = [0u64; 4];
            for child in &mut children {
                *child = scanner.read_var_u64()?;
            }

            let entry_count = scanner.read_var_u64()? as usize;
            let mut entries = Vec::with_capacity(entry_count);
            let mut previous = 0u64;
            for _ in 0..entry_count {
                let type_id = scanner.read_var_u16()?;
                let delta = scanner.read_var_u64()?;
                previous += delta;
                entries.push((type_id, previous));
            }

            Arc::new(IndexCell { children, entries })
        };

        self.cache.lock().push(cell_offset, Arc::clone(&cell));
        Ok(cell)
    }

    pub fn dump_statistics(&self) {
        info!(
            file = AREA_AREA_IDX,
            top_level = self.top_level,
            cached_cells = self.cache.lock().len(),
            "area area index statistics"
        );
    }
}

use std::path::Path;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::info;

use crate::error::Result;
use crate::geom::GeoBox;
use crate::index::cell_range;
use crate::io::scanner::{FileScanner, ScannerMode};
use crate::model::FileOffset;
use crate::types::TypeSet;

pub const AREA_NODE_IDX: &str = "areanode.idx";

/// Tiled index over `nodes.dat`: one grid level, each cell holding per-type
/// offset lists.
///
/// The cell directory is resident; cell bodies are read on demand.
pub struct AreaNodeIndex {
    scanner: Mutex<FileScanner>,
    level: u32,
    cells: FxHashMap<(u32, u32), FileOffset>,
}

impl AreaNodeIndex {
    pub fn open(dir: &Path) -> Result<Self> {
        let mut scanner = FileScanner::open(dir.join(AREA_NODE_IDX), ScannerMode::LowMemRandom)?;

        let level = scanner.read_var_u32()?;
        let cell_count = scanner.read_var_u64()? as usize;
        let mut cells = FxHashMap::default();
        cells.reserve(cell_count);
        for _ in 0..cell_count {
            let x = scanner.read_u32()?;
            let y = scanner.read_u32()?;
            let offset = scanner.read_u32()?;
            cells.insert((x, y), FileOffset::from(offset));
        }

        Ok(Self {
            scanner: Mutex::new(scanner),
            level,
            cells,
        })
    }

    /// Offsets of all nodes of the selected types in cells intersecting
    /// `bbox`. Stops early once `max_count` offsets are collected; the
    /// returned set is then a subset of all matches.
    pub fn get_offsets(
        &self,
        bbox: &GeoBox,
        types: &TypeSet,
        max_count: usize,
    ) -> Result<Vec<FileOffset>> {
        let mut offsets = Vec::new();
        if !types.has_types() || max_count == 0 {
            return Ok(offsets);
        }

        let (x_min, x_max, y_min, y_max) = cell_range(bbox, self.level);
        for y in y_min..=y_max {
            for x in x_min..=x_max {
                let Some(&cell_offset) = self.cells.get(&(x, y)) else {
                    continue;
                };
                if !self.read_cell(cell_offset, types, max_count, &mut offsets)? {
                    return Ok(offsets);
                }
            }
        }

        Ok(offsets)
    }

    /// Returns false once `max_count` is reached.
    fn read_cell(
        &self,
        cell_offset: FileOffset,
        types: &TypeSet,
        max_count: usize,
        offsets: &mut Vec<FileOffset>,
    ) -> Result<bool> {
        let mut scanner = self.scanner.lock();
        scanner.set_pos(cell_offset)?;

        let entry_count = scanner.read_var_u64()? as usize;
        for _ in 0..entry_count {
            let type_id = scanner.read_var_u16()?;
            let offset_count = scanner.read_var_u64()? as usize;
            let wanted = types.has_type(type_id);

            let mut previous = 0u64;
            for _ in 0..offset_count {
                let delta = scanner.read_var_u64()?;
                previous += delta;
                if wanted {
                    if offsets.len() >= max_count {
                        return Ok(false);
                    }
                    offsets.push(previous);
                }
            }
        }

        Ok(true)
    }

    pub fn dump_statistics(&self) {
        info!(
            file = AREA_NODE_IDX,
            level = self.level,
            cells = self.cells.len(),
            "area node index statistics"
        );
    }
}

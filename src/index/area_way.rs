use std::path::Path;

use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::info;

use crate::error::Result;
use crate::geom::GeoBox;
use crate::index::cell_range;
use crate::io::scanner::{FileScanner, ScannerMode};
use crate::model::FileOffset;
use crate::types::{TypeId, TypeSet};

pub const AREA_WAY_IDX: &str = "areaway.idx";

struct TypeGrid {
    level: u32,
    cells: FxHashMap<(u32, u32), FileOffset>,
}

/// Tiled index over `ways.dat`. Each way type carries its own grid level, so
/// dense types (paths, service roads) can tile finer than sparse ones
/// (motorways).
pub struct AreaWayIndex {
    scanner: Mutex<FileScanner>,
    grids: FxHashMap<TypeId, TypeGrid>,
}

impl AreaWayIndex {
    pub fn open(dir: &Path) -> Result<Self> {
        let mut scanner = FileScanner::open(dir.join(AREA_WAY_IDX), ScannerMode::LowMemRandom)?;

        let type_count = scanner.read_var_u64()? as usize;
        let mut grids = FxHashMap::default();
        grids.reserve(type_count);
        for _ in 0..type_count {
            let type_id = scanner.read_var_u16()?;
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
            grids.insert(type_id, TypeGrid { level, cells });
        }

        Ok(Self {
            scanner: Mutex::new(scanner),
            grids,
        })
    }

    /// Offsets of all ways whose type is selected by any of `type_sets`, in
    /// cells intersecting `bbox`. A way spanning several cells is reported
    /// once. Stops early once `max_count` offsets are collected.
    pub fn get_offsets(
        &self,
        bbox: &GeoBox,
        type_sets: &[TypeSet],
        max_count: usize,
    ) -> Result<Vec<FileOffset>> {
        let mut offsets = Vec::new();
        let mut seen = FxHashSet::default();
        if max_count == 0 {
            return Ok(offsets);
        }

        for types in type_sets {
            for type_id in types.types() {
                let Some(grid) = self.grids.get(&type_id) else {
                    continue;
                };
                let (x_min, x_max, y_min, y_max) = cell_range(bbox, grid.level);
                for y in y_min..=y_max {
                    for x in x_min..=x_max {
                        let Some(&cell_offset) = grid.cells.get(&(x, y)) else {
                            continue;
                        };
                        if !self.read_cell(cell_offset, max_count, &mut seen, &mut offsets)? {
                            return Ok(offsets);
                        }
                    }
                }
            }
        }

        Ok(offsets)
    }

    fn read_cell(
        &self,
        cell_offset: FileOffset,
        max_count: usize,
        seen: &mut FxHashSet<FileOffset>,
        offsets: &mut Vec<FileOffset>,
    ) -> Result<bool> {
        let mut scanner = self.scanner.lock();
        scanner.set_pos(cell_offset)?;

        let offset_count = scanner.read_var_u64()? as usize;
        let mut previous = 0u64;
        for _ in 0..offset_count {
            let delta = scanner.read_var_u64()?;
            previous += delta;
            if seen.insert(previous) {
                if offsets.len() >= max_count {
                    return Ok(false);
                }
                offsets.push(previous);
            }
        }

        Ok(true)
    }

    pub fn dump_statistics(&self) {
        info!(
            file = AREA_WAY_IDX,
            types = self.grids.len(),
            "area way index statistics"
        );
    }
}

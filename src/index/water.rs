use std::path::Path;

use parking_lot::Mutex;
use tracing::info;

use crate::error::{CartaError, Result};
use crate::geom::{GeoBox, Magnification};
use crate::index::{cell_box, cell_range};
use crate::io::scanner::{FileScanner, ScannerMode};
use crate::model::{FileOffset, GroundTile, GroundTileKind};

pub const WATER_IDX: &str = "water.idx";

const STATE_UNKNOWN: u8 = 0;
const STATE_LAND: u8 = 1;
const STATE_WATER: u8 = 2;
const STATE_COAST: u8 = 3;

struct WaterLevel {
    level: u32,
    x_start: u32,
    x_end: u32,
    y_start: u32,
    y_end: u32,
    data_offset: FileOffset,
}

/// Ground-state raster: per level, one state byte per covered cell, with the
/// coastline polyline attached to coast cells.
pub struct WaterIndex {
    scanner: Mutex<FileScanner>,
    levels: Vec<WaterLevel>,
}

impl WaterIndex {
    pub fn open(dir: &Path) -> Result<Self> {
        let mut scanner = FileScanner::open(dir.join(WATER_IDX), ScannerMode::LowMemRandom)?;

        let level_count = scanner.read_var_u64()? as usize;
        let mut levels = Vec::with_capacity(level_count);
        for _ in 0..level_count {
            let level = scanner.read_var_u32()?;
            let x_start = scanner.read_var_u32()?;
            let x_end = scanner.read_var_u32()?;
            let y_start = scanner.read_var_u32()?;
            let y_end = scanner.read_var_u32()?;
            let data_offset = FileOffset::from(scanner.read_u32()?);
            levels.push(WaterLevel {
                level,
                x_start,
                x_end,
                y_start,
                y_end,
                data_offset,
            });
        }
        levels.sort_by_key(|l| l.level);

        Ok(Self {
            scanner: Mutex::new(scanner),
            levels,
        })
    }

    /// Ground tiles of the level matching `magnification` that intersect
    /// `bbox`. Tiles outside the dataset's coverage are not reported.
    pub fn get_regions(
        &self,
        bbox: &GeoBox,
        magnification: Magnification,
    ) -> Result<Vec<GroundTile>> {
        let mut tiles = Vec::new();
        let Some(level) = self.pick_level(magnification.level()) else {
            return Ok(tiles);
        };

        let (x_min, x_max, y_min, y_max) = cell_range(bbox, level.level);
        let mut scanner = self.scanner.lock();
        scanner.set_pos(level.data_offset)?;

        for y in level.y_start..=level.y_end {
            if y > y_max {
                break;
            }
            for x in level.x_start..=level.x_end {
                let state = scanner.read_u8()?;
                let coast = if state == STATE_COAST {
                    let coord_count = scanner.read_var_u64()? as usize;
                    let mut coords = Vec::with_capacity(coord_count);
                    for _ in 0..coord_count {
                        coords.push(scanner.read_coord()?);
                    }
                    Some(coords)
                } else {
                    None
                };

                if y < y_min || x < x_min || x > x_max {
                    continue;
                }

                let kind = match state {
                    STATE_UNKNOWN => continue,
                    STATE_LAND => GroundTileKind::Land,
                    STATE_WATER => GroundTileKind::Water,
                    STATE_COAST => GroundTileKind::Coast,
                    other => {
                        return Err(CartaError::Corrupt(format!(
                            "invalid ground state: 0x{other:02X}"
                        )))
                    }
                };
                tiles.push(GroundTile {
                    kind,
                    bbox: cell_box(x, y, level.level),
                    coast,
                });
            }
        }

        Ok(tiles)
    }

    /// Deepest stored level not finer than the requested one; the coarsest
    /// stored level when the request is below all of them.
    fn pick_level(&self, target: u32) -> Option<&WaterLevel> {
        self.levels
            .iter()
            .rev()
            .find(|l| l.level <= target)
            .or_else(|| self.levels.first())
    }

    pub fn dump_statistics(&self) {
        info!(
            file = WATER_IDX,
            levels = self.levels.len(),
            "water index statistics"
        );
    }
}

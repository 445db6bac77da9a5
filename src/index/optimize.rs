use std::path::Path;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::error::Result;
use crate::geom::{GeoBox, Magnification};
use crate::io::scanner::{FileScanner, ScannerMode};
use crate::model::{Area, Way};
use crate::types::{TypeId, TypeSet};

pub const AREAS_OPT_DAT: &str = "areasopt.dat";
pub const WAYS_OPT_DAT: &str = "waysopt.dat";

/// Pre-simplified area geometries for coarse magnifications. Types served
/// from here are consumed from the query's type set so the regular index does
/// not fetch them again.
pub struct OptimizeAreasLowZoom {
    max_level: u32,
    areas: FxHashMap<TypeId, Vec<Arc<Area>>>,
}

impl OptimizeAreasLowZoom {
    pub fn open(dir: &Path) -> Result<Self> {
        let mut scanner = FileScanner::open(dir.join(AREAS_OPT_DAT), ScannerMode::Sequential)?;
        let (max_level, areas) = load_bundles(&mut scanner, |offset, scanner| {
            Area::read(offset, scanner).map(Arc::new)
        })?;
        Ok(Self { max_level, areas })
    }

    pub fn has_optimizations(&self, magnification: Magnification) -> bool {
        magnification.level() <= self.max_level && !self.areas.is_empty()
    }

    pub fn get_areas(
        &self,
        bbox: &GeoBox,
        max_count: usize,
        types: &mut TypeSet,
        areas: &mut Vec<Arc<Area>>,
    ) {
        let served: Vec<TypeId> = types.types().filter(|t| self.areas.contains_key(t)).collect();
        for type_id in served {
            for area in &self.areas[&type_id] {
                if areas.len() >= max_count {
                    break;
                }
                if area.bounding_box().intersects(bbox) {
                    areas.push(Arc::clone(area));
                }
            }
            types.unset_type(type_id);
        }
    }
}

/// Pre-simplified way geometries for coarse magnifications; the way-side
/// counterpart of [`OptimizeAreasLowZoom`].
pub struct OptimizeWaysLowZoom {
    max_level: u32,
    ways: FxHashMap<TypeId, Vec<Arc<Way>>>,
}

impl OptimizeWaysLowZoom {
    pub fn open(dir: &Path) -> Result<Self> {
        let mut scanner = FileScanner::open(dir.join(WAYS_OPT_DAT), ScannerMode::Sequential)?;
        let (max_level, ways) = load_bundles(&mut scanner, |offset, scanner| {
            Way::read(offset, scanner).map(Arc::new)
        })?;
        Ok(Self { max_level, ways })
    }

    pub fn has_optimizations(&self, magnification: Magnification) -> bool {
        magnification.level() <= self.max_level && !self.ways.is_empty()
    }

    /// Serves matching types out of every set in `type_sets`, consuming them.
    pub fn get_ways(
        &self,
        bbox: &GeoBox,
        max_count: usize,
        type_sets: &mut [TypeSet],
        ways: &mut Vec<Arc<Way>>,
    ) {
        for types in type_sets {
            let served: Vec<TypeId> =
                types.types().filter(|t| self.ways.contains_key(t)).collect();
            for type_id in served {
                for way in &self.ways[&type_id] {
                    if ways.len() >= max_count {
                        break;
                    }
                    if way.bounding_box().intersects(bbox) {
                        ways.push(Arc::clone(way));
                    }
                }
                types.unset_type(type_id);
            }
        }
    }
}

/// Shared loader: the bundle header plus per-type record lists. Records carry
/// synthetic offsets (their position inside the optimization file).
fn load_bundles<T>(
    scanner: &mut FileScanner,
    mut read_record: impl FnMut(u64, &mut FileScanner) -> Result<T>,
) -> Result<(u32, FxHashMap<TypeId, Vec<T>>)> {
    let max_level = scanner.read_var_u32()?;
    let type_count = scanner.read_var_u64()? as usize;

    let mut bundles = FxHashMap::default();
    bundles.reserve(type_count);
    for _ in 0..type_count {
        let type_id = scanner.read_var_u16()?;
        let record_count = scanner.read_var_u64()? as usize;
        let mut records = Vec::with_capacity(record_count);
        for _ in 0..record_count {
            let offset = scanner.pos();
            let _payload_len = scanner.read_var_u64()?;
            records.push(read_record(offset, scanner)?);
        }
        bundles.insert(type_id, records);
    }

    Ok((max_level, bundles))
}

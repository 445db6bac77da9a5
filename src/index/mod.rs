//! Tiled spatial indices over the blob data files.
//!
//! All indices share one grid scheme: at `level` the world is divided into
//! `2^level x 2^level` cells of `360/2^level` degrees of longitude by
//! `180/2^level` degrees of latitude, with cell (0, 0) at the south-west
//! corner.

pub mod area_area;
pub mod area_node;
pub mod area_way;
pub mod optimize;
pub mod water;

pub use area_area::AreaAreaIndex;
pub use area_node::AreaNodeIndex;
pub use area_way::AreaWayIndex;
pub use optimize::{OptimizeAreasLowZoom, OptimizeWaysLowZoom};
pub use water::WaterIndex;

use crate::geom::GeoBox;

pub(crate) fn cell_width(level: u32) -> f64 {
    360.0 / (1u64 << level.min(62)) as f64
}

pub(crate) fn cell_height(level: u32) -> f64 {
    180.0 / (1u64 << level.min(62)) as f64
}

pub(crate) fn cell_x(lon: f64, level: u32) -> u32 {
    let max = (1u64 << level.min(31)) - 1;
    let cell = ((lon + 180.0) / cell_width(level)).floor();
    (cell.max(0.0) as u64).min(max) as u32
}

pub(crate) fn cell_y(lat: f64, level: u32) -> u32 {
    let max = (1u64 << level.min(31)) - 1;
    let cell = ((lat + 90.0) / cell_height(level)).floor();
    (cell.max(0.0) as u64).min(max) as u32
}

/// Inclusive cell range `(x_min, x_max, y_min, y_max)` covered by `bbox`.
pub(crate) fn cell_range(bbox: &GeoBox, level: u32) -> (u32, u32, u32, u32) {
    (
        cell_x(bbox.min_lon, level),
        cell_x(bbox.max_lon, level),
        cell_y(bbox.min_lat, level),
        cell_y(bbox.max_lat, level),
    )
}

/// Geographic extent of cell `(x, y)` at `level`.
pub(crate) fn cell_box(x: u32, y: u32, level: u32) -> GeoBox {
    let width = cell_width(level);
    let height = cell_height(level);
    let min_lon = f64::from(x) * width - 180.0;
    let min_lat = f64::from(y) * height - 90.0;
    GeoBox::new(min_lat, min_lon, min_lat + height, min_lon + width)
}

/// Deepest level at which `bbox` still fits inside a single cell.
pub(crate) fn fitting_level(bbox: &GeoBox, max_level: u32) -> u32 {
    for level in (0..=max_level).rev() {
        let (x_min, x_max, y_min, y_max) = cell_range(bbox, level);
        if x_min == x_max && y_min == y_max {
            return level;
        }
    }
    0
}

//! Dataset assembly: writes a complete, consistent dataset directory from
//! in-memory model objects.
//!
//! This is fixture and tooling support for the read engine: it performs no
//! OSM parsing and cannot mutate an existing dataset. Entity offsets are
//! assigned at add time, so references between files (regions to areas,
//! locations to ways, addresses to nodes) can be expressed naturally while
//! building.

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::Result;
use crate::geom::{GeoBox, GeoCoord, CONVERSION_FACTOR};
use crate::index::{cell_range, cell_x, cell_y, fitting_level};
use crate::io::writer::{put_coord, put_string, put_u32, put_var_u64, string_len, var_len, FileWriter};
use crate::location::{ADDRESS_DAT, LOCATION_IDX};
use crate::model::{
    Area, FileOffset, GroundTileKind, Node, ObjectFileRef, Ring, SegmentAttributes, Tag, Way,
};
use crate::types::{TypeConfig, TypeId};

const DEFAULT_NODE_INDEX_LEVEL: u32 = 10;
const DEFAULT_WAY_INDEX_LEVEL: u32 = 10;
const DEFAULT_AREA_INDEX_MAX_LEVEL: u32 = 14;
const DEFAULT_OPTIMIZATION_MAX_LEVEL: u32 = 6;

const STATE_LAND: u8 = 1;
const STATE_WATER: u8 = 2;
const STATE_COAST: u8 = 3;

/// House number attached to a location.
#[derive(Debug, Clone)]
pub struct AddressSpec {
    pub name: String,
    pub object: ObjectFileRef,
}

/// Street (or equivalent) within a region.
#[derive(Debug, Clone, Default)]
pub struct LocationSpec {
    pub name: String,
    pub objects: Vec<ObjectFileRef>,
    pub addresses: Vec<AddressSpec>,
}

#[derive(Debug, Clone)]
pub struct PoiSpec {
    pub name: String,
    pub object: ObjectFileRef,
}

/// One admin region and its subtree.
#[derive(Debug, Clone, Default)]
pub struct RegionSpec {
    pub name: String,
    pub object: ObjectFileRef,
    /// Alternative names, each bound to a node offset.
    pub aliases: Vec<(String, FileOffset)>,
    pub pois: Vec<PoiSpec>,
    pub locations: Vec<LocationSpec>,
    pub children: Vec<RegionSpec>,
}

/// Ground state of one water-index cell; `kind` of `None` marks an unknown
/// cell that the reader will not report.
#[derive(Debug, Clone, Default)]
pub struct GroundCellSpec {
    pub kind: Option<GroundTileKind>,
    pub coast: Vec<GeoCoord>,
}

/// One level of the ground-state raster. `cells` is row-major over the
/// inclusive cell rectangle, southern row first.
#[derive(Debug, Clone)]
pub struct GroundLevelSpec {
    pub level: u32,
    pub x_start: u32,
    pub x_end: u32,
    pub y_start: u32,
    pub y_end: u32,
    pub cells: Vec<GroundCellSpec>,
}

struct BlobFile {
    data: Vec<u8>,
}

impl BlobFile {
    fn new() -> Self {
        Self { data: Vec::new() }
    }

    fn append(&mut self, payload: &[u8]) -> FileOffset {
        let offset = self.data.len() as FileOffset;
        put_var_u64(&mut self.data, payload.len() as u64);
        self.data.extend_from_slice(payload);
        offset
    }
}

/// Assembles a dataset directory. Add entities first (offsets are handed
/// back immediately), then the hierarchy and rasters referencing them, then
/// [`write_to`](Self::write_to).
pub struct DatasetBuilder {
    type_config: TypeConfig,
    bounding: GeoBox,
    nodes: BlobFile,
    ways: BlobFile,
    areas: BlobFile,
    node_entries: Vec<(FileOffset, TypeId, GeoCoord)>,
    way_entries: Vec<(FileOffset, TypeId, GeoBox)>,
    area_entries: Vec<(FileOffset, TypeId, GeoBox)>,
    node_index_level: u32,
    way_index_level: u32,
    area_index_max_level: u32,
    optimization_max_level: u32,
    optimized_ways: Vec<Way>,
    optimized_areas: Vec<Area>,
    ground_levels: Vec<GroundLevelSpec>,
    roots: Vec<RegionSpec>,
}

impl DatasetBuilder {
    pub fn new(type_config: TypeConfig, bounding: GeoBox) -> Self {
        Self {
            type_config,
            bounding,
            nodes: BlobFile::new(),
            ways: BlobFile::new(),
            areas: BlobFile::new(),
            node_entries: Vec::new(),
            way_entries: Vec::new(),
            area_entries: Vec::new(),
            node_index_level: DEFAULT_NODE_INDEX_LEVEL,
            way_index_level: DEFAULT_WAY_INDEX_LEVEL,
            area_index_max_level: DEFAULT_AREA_INDEX_MAX_LEVEL,
            optimization_max_level: DEFAULT_OPTIMIZATION_MAX_LEVEL,
            optimized_ways: Vec::new(),
            optimized_areas: Vec::new(),
            ground_levels: Vec::new(),
            roots: Vec::new(),
        }
    }

    pub fn add_node(
        &mut self,
        type_id: TypeId,
        coord: GeoCoord,
        tags: Vec<Tag>,
    ) -> ObjectFileRef {
        let node = Node {
            file_offset: 0,
            type_id,
            coord,
            tags,
        };
        let offset = self.nodes.append(&node.encode());
        self.node_entries.push((offset, type_id, coord));
        ObjectFileRef::Node(offset)
    }

    pub fn add_way(
        &mut self,
        type_id: TypeId,
        attributes: SegmentAttributes,
        nodes: Vec<GeoCoord>,
    ) -> ObjectFileRef {
        let way = Way {
            file_offset: 0,
            type_id,
            attributes,
            nodes,
        };
        let bbox = way.bounding_box();
        let offset = self.ways.append(&way.encode());
        self.way_entries.push((offset, type_id, bbox));
        ObjectFileRef::Way(offset)
    }

    pub fn add_area(&mut self, rings: Vec<Ring>) -> ObjectFileRef {
        let area = Area {
            file_offset: 0,
            rings,
        };
        let bbox = area.bounding_box();
        let type_id = area.type_id();
        let offset = self.areas.append(&area.encode());
        self.area_entries.push((offset, type_id, bbox));
        ObjectFileRef::Area(offset)
    }

    pub fn add_root_region(&mut self, region: RegionSpec) {
        self.roots.push(region);
    }

    pub fn add_ground_level(&mut self, spec: GroundLevelSpec) {
        self.ground_levels.push(spec);
    }

    pub fn add_optimized_way(&mut self, way: Way) {
        self.optimized_ways.push(way);
    }

    pub fn add_optimized_area(&mut self, area: Area) {
        self.optimized_areas.push(area);
    }

    pub fn set_optimization_max_level(&mut self, level: u32) {
        self.optimization_max_level = level;
    }

    /// Writes all dataset files into `dir`.
    pub fn write_to(&self, dir: &Path) -> Result<()> {
        self.write_types(dir)?;
        self.write_bounding(dir)?;
        write_file(dir, crate::db::NODES_DAT, &self.nodes.data)?;
        write_file(dir, crate::db::WAYS_DAT, &self.ways.data)?;
        write_file(dir, crate::db::AREAS_DAT, &self.areas.data)?;
        self.write_area_node_index(dir)?;
        self.write_area_way_index(dir)?;
        self.write_area_area_index(dir)?;
        self.write_water_index(dir)?;
        self.write_optimizations(dir)?;
        let address_offsets = self.write_addresses(dir)?;
        self.write_location_index(dir, &address_offsets)?;
        Ok(())
    }

    fn write_types(&self, dir: &Path) -> Result<()> {
        let mut buf = Vec::new();
        self.type_config.encode(&mut buf);
        write_file(dir, crate::db::TYPES_DAT, &buf)
    }

    fn write_bounding(&self, dir: &Path) -> Result<()> {
        let mut buf = Vec::new();
        let scale = |value: f64, offset: f64| ((value + offset) * CONVERSION_FACTOR).round() as u64;
        put_var_u64(&mut buf, scale(self.bounding.min_lat, 90.0));
        put_var_u64(&mut buf, scale(self.bounding.min_lon, 180.0));
        put_var_u64(&mut buf, scale(self.bounding.max_lat, 90.0));
        put_var_u64(&mut buf, scale(self.bounding.max_lon, 180.0));
        write_file(dir, crate::db::BOUNDING_DAT, &buf)
    }

    fn write_area_node_index(&self, dir: &Path) -> Result<()> {
        let level = self.node_index_level;
        let mut cells: BTreeMap<(u32, u32), BTreeMap<TypeId, Vec<FileOffset>>> = BTreeMap::new();
        for &(offset, type_id, coord) in &self.node_entries {
            let cell = (cell_x(coord.lon, level), cell_y(coord.lat, level));
            cells
                .entry(cell)
                .or_default()
                .entry(type_id)
                .or_default()
                .push(offset);
        }

        let bodies: Vec<Vec<u8>> = cells
            .values()
            .map(|types| {
                let mut body = Vec::new();
                put_var_u64(&mut body, types.len() as u64);
                for (&type_id, offsets) in types {
                    put_var_u64(&mut body, u64::from(type_id));
                    put_delta_offsets(&mut body, offsets);
                }
                body
            })
            .collect();

        let header_len = var_len(u64::from(level)) + var_len(cells.len() as u64) + 12 * cells.len();
        let mut buf = Vec::new();
        put_var_u64(&mut buf, u64::from(level));
        put_var_u64(&mut buf, cells.len() as u64);
        let mut body_offset = header_len as u64;
        for ((&(x, y), _), body) in cells.iter().zip(&bodies) {
            put_u32(&mut buf, x);
            put_u32(&mut buf, y);
            put_u32(&mut buf, body_offset as u32);
            body_offset += body.len() as u64;
        }
        for body in &bodies {
            buf.extend_from_slice(body);
        }

        write_file(dir, crate::index::area_node::AREA_NODE_IDX, &buf)
    }

    fn write_area_way_index(&self, dir: &Path) -> Result<()> {
        let level = self.way_index_level;
        let mut grids: BTreeMap<TypeId, BTreeMap<(u32, u32), Vec<FileOffset>>> = BTreeMap::new();
        for &(offset, type_id, bbox) in &self.way_entries {
            let (x_min, x_max, y_min, y_max) = cell_range(&bbox, level);
            let grid = grids.entry(type_id).or_default();
            for y in y_min..=y_max {
                for x in x_min..=x_max {
                    grid.entry((x, y)).or_default().push(offset);
                }
            }
        }

        let mut header_len = var_len(grids.len() as u64);
        for (&type_id, cells) in &grids {
            header_len += var_len(u64::from(type_id))
                + var_len(u64::from(level))
                + var_len(cells.len() as u64)
                + 12 * cells.len();
        }

        let mut bodies: Vec<Vec<u8>> = Vec::new();
        let mut directory = Vec::new();
        put_var_u64(&mut directory, grids.len() as u64);
        let mut body_offset = header_len as u64;
        for (&type_id, cells) in &grids {
            put_var_u64(&mut directory, u64::from(type_id));
            put_var_u64(&mut directory, u64::from(level));
            put_var_u64(&mut directory, cells.len() as u64);
            for (&(x, y), offsets) in cells {
                let mut body = Vec::new();
                put_delta_offsets(&mut body, offsets);
                put_u32(&mut directory, x);
                put_u32(&mut directory, y);
                put_u32(&mut directory, body_offset as u32);
                body_offset += body.len() as u64;
                bodies.push(body);
            }
        }

        let mut buf = directory;
        for body in &bodies {
            buf.extend_from_slice(body);
        }
        write_file(dir, crate::index::area_way::AREA_WAY_IDX, &buf)
    }

    fn write_area_area_index(&self, dir: &Path) -> Result<()> {
        // Every area lives in the deepest cell fully containing its outer
        // ring; ancestor cells exist up to the single top cell.
        let mut cells: BTreeMap<(u32, u32, u32), Vec<(TypeId, FileOffset)>> = BTreeMap::new();
        cells.insert((0, 0, 0), Vec::new());
        for &(offset, type_id, bbox) in &self.area_entries {
            let level = fitting_level(&bbox, self.area_index_max_level);
            let x = cell_x(bbox.min_lon, level);
            let y = cell_y(bbox.min_lat, level);
            cells.entry((level, x, y)).or_default().push((type_id, offset));

            let (mut level, mut x, mut y) = (level, x, y);
            while level > 0 {
                level -= 1;
                x /= 2;
                y /= 2;
                cells.entry((level, x, y)).or_default();
            }
        }

        let header_len = var_len(0) + 4;
        let mut body = Vec::new();
        let mut cell_offsets: BTreeMap<(u32, u32, u32), u64> = BTreeMap::new();

        // Bottom-up: children are serialized before their parents so parent
        // records can reference them by absolute offset.
        let mut ordered: Vec<(u32, u32, u32)> = cells.keys().copied().collect();
        ordered.sort_by(|a, b| b.0.cmp(&a.0).then(a.cmp(b)));

        for &(level, x, y) in &ordered {
            let offset = header_len as u64 + body.len() as u64;
            cell_offsets.insert((level, x, y), offset);

            for child_idx in 0..4u32 {
                let child = (level + 1, 2 * x + (child_idx & 1), 2 * y + (child_idx >> 1));
                let child_offset = cell_offsets.get(&child).copied().unwrap_or(0);
                put_var_u64(&mut body, child_offset);
            }

            let mut entries = cells[&(level, x, y)].clone();
            entries.sort_by_key(|&(_, offset)| offset);
            put_var_u64(&mut body, entries.len() as u64);
            let mut previous = 0u64;
            for (type_id, offset) in entries {
                put_var_u64(&mut body, u64::from(type_id));
                put_var_u64(&mut body, offset - previous);
                previous = offset;
            }
        }

        let mut buf = Vec::new();
        put_var_u64(&mut buf, 0);
        put_u32(&mut buf, cell_offsets[&(0, 0, 0)] as u32);
        buf.extend_from_slice(&body);
        write_file(dir, crate::index::area_area::AREA_AREA_IDX, &buf)
    }

    fn write_water_index(&self, dir: &Path) -> Result<()> {
        let mut levels: Vec<&GroundLevelSpec> = self.ground_levels.iter().collect();
        levels.sort_by_key(|spec| spec.level);

        let bodies: Vec<Vec<u8>> = levels
            .iter()
            .map(|spec| {
                let mut body = Vec::new();
                for cell in &spec.cells {
                    match cell.kind {
                        None => body.push(0),
                        Some(GroundTileKind::Land) => body.push(STATE_LAND),
                        Some(GroundTileKind::Water) => body.push(STATE_WATER),
                        Some(GroundTileKind::Coast) => {
                            body.push(STATE_COAST);
                            put_var_u64(&mut body, cell.coast.len() as u64);
                            for &coord in &cell.coast {
                                put_coord(&mut body, coord);
                            }
                        }
                    }
                }
                body
            })
            .collect();

        let mut header_len = var_len(levels.len() as u64);
        for spec in &levels {
            header_len += var_len(u64::from(spec.level))
                + var_len(u64::from(spec.x_start))
                + var_len(u64::from(spec.x_end))
                + var_len(u64::from(spec.y_start))
                + var_len(u64::from(spec.y_end))
                + 4;
        }

        let mut buf = Vec::new();
        put_var_u64(&mut buf, levels.len() as u64);
        let mut body_offset = header_len as u64;
        for (spec, body) in levels.iter().zip(&bodies) {
            put_var_u64(&mut buf, u64::from(spec.level));
            put_var_u64(&mut buf, u64::from(spec.x_start));
            put_var_u64(&mut buf, u64::from(spec.x_end));
            put_var_u64(&mut buf, u64::from(spec.y_start));
            put_var_u64(&mut buf, u64::from(spec.y_end));
            put_u32(&mut buf, body_offset as u32);
            body_offset += body.len() as u64;
        }
        for body in &bodies {
            buf.extend_from_slice(body);
        }

        write_file(dir, crate::index::water::WATER_IDX, &buf)
    }

    fn write_optimizations(&self, dir: &Path) -> Result<()> {
        let ways: BTreeMap<TypeId, Vec<Vec<u8>>> =
            group_payloads(self.optimized_ways.iter().map(|w| (w.type_id, w.encode())));
        write_optimization_file(
            dir,
            crate::index::optimize::WAYS_OPT_DAT,
            self.optimization_max_level,
            &ways,
        )?;

        let areas: BTreeMap<TypeId, Vec<Vec<u8>>> = group_payloads(
            self.optimized_areas
                .iter()
                .map(|a| (a.type_id(), a.encode())),
        );
        write_optimization_file(
            dir,
            crate::index::optimize::AREAS_OPT_DAT,
            self.optimization_max_level,
            &areas,
        )
    }

    /// Writes `address.dat` and returns, per region path and location index,
    /// the chunk offset of that location's addresses.
    fn write_addresses(&self, dir: &Path) -> Result<BTreeMap<(usize, usize), FileOffset>> {
        // One pad byte keeps real chunks away from offset 0, the "no
        // addresses" sentinel.
        let mut buf = vec![0u8];
        let mut offsets = BTreeMap::new();

        let flat = flatten_regions(&self.roots);
        for (region_idx, flat_region) in flat.iter().enumerate() {
            for (location_idx, location) in flat_region.spec.locations.iter().enumerate() {
                if location.addresses.is_empty() {
                    continue;
                }
                offsets.insert((region_idx, location_idx), buf.len() as FileOffset);
                put_var_u64(&mut buf, location.addresses.len() as u64);
                for address in &location.addresses {
                    put_string(&mut buf, &address.name);
                    address.object.encode(&mut buf);
                }
            }
        }

        write_file(dir, ADDRESS_DAT, &buf)?;
        Ok(offsets)
    }

    fn write_location_index(
        &self,
        dir: &Path,
        address_offsets: &BTreeMap<(usize, usize), FileOffset>,
    ) -> Result<()> {
        let flat = flatten_regions(&self.roots);

        // Region records use fixed-width intra-file offsets, so their sizes
        // are known before any offset is assigned.
        let sizes: Vec<usize> = flat
            .iter()
            .enumerate()
            .map(|(region_idx, flat_region)| {
                region_record_len(flat_region.spec, region_idx, address_offsets)
            })
            .collect();

        let root_count = self.roots.len();
        let header_len = var_len(root_count as u64) + 4 * root_count;
        let mut offsets = Vec::with_capacity(flat.len());
        let mut position = header_len as u64;
        for size in &sizes {
            offsets.push(position);
            position += *size as u64;
        }

        let mut buf = Vec::new();
        put_var_u64(&mut buf, root_count as u64);
        for (idx, flat_region) in flat.iter().enumerate() {
            if flat_region.parent.is_none() {
                put_u32(&mut buf, offsets[idx] as u32);
            }
        }

        for (region_idx, flat_region) in flat.iter().enumerate() {
            let spec = flat_region.spec;
            spec.object.encode(&mut buf);
            put_string(&mut buf, &spec.name);

            put_var_u64(&mut buf, spec.aliases.len() as u64);
            for (name, node_offset) in &spec.aliases {
                put_string(&mut buf, name);
                put_var_u64(&mut buf, *node_offset);
            }

            put_var_u64(&mut buf, spec.pois.len() as u64);
            for poi in &spec.pois {
                put_string(&mut buf, &poi.name);
                poi.object.encode(&mut buf);
            }

            put_var_u64(&mut buf, spec.locations.len() as u64);
            for (location_idx, location) in spec.locations.iter().enumerate() {
                put_string(&mut buf, &location.name);
                put_var_u64(&mut buf, location.objects.len() as u64);
                for object in &location.objects {
                    object.encode(&mut buf);
                }
                let address_offset = address_offsets
                    .get(&(region_idx, location_idx))
                    .copied()
                    .unwrap_or(0);
                put_var_u64(&mut buf, address_offset);
            }

            put_var_u64(&mut buf, flat_region.children.len() as u64);
            for &child in &flat_region.children {
                put_u32(&mut buf, offsets[child] as u32);
            }

            let parent_offset = flat_region.parent.map(|p| offsets[p]).unwrap_or(0);
            put_u32(&mut buf, parent_offset as u32);
        }

        write_file(dir, LOCATION_IDX, &buf)
    }
}

struct FlatRegion<'a> {
    spec: &'a RegionSpec,
    parent: Option<usize>,
    children: Vec<usize>,
}

/// Pre-order flattening of the region forest.
fn flatten_regions(roots: &[RegionSpec]) -> Vec<FlatRegion<'_>> {
    fn descend<'a>(
        spec: &'a RegionSpec,
        parent: Option<usize>,
        flat: &mut Vec<FlatRegion<'a>>,
    ) -> usize {
        let idx = flat.len();
        flat.push(FlatRegion {
            spec,
            parent,
            children: Vec::new(),
        });
        for child in &spec.children {
            let child_idx = descend(child, Some(idx), flat);
            flat[idx].children.push(child_idx);
        }
        idx
    }

    let mut flat = Vec::new();
    for root in roots {
        descend(root, None, &mut flat);
    }
    flat
}

fn ref_len(object: ObjectFileRef) -> usize {
    1 + var_len(object.offset())
}

fn region_record_len(
    spec: &RegionSpec,
    region_idx: usize,
    address_offsets: &BTreeMap<(usize, usize), FileOffset>,
) -> usize {
    let mut len = ref_len(spec.object) + string_len(&spec.name);

    len += var_len(spec.aliases.len() as u64);
    for (name, node_offset) in &spec.aliases {
        len += string_len(name) + var_len(*node_offset);
    }

    len += var_len(spec.pois.len() as u64);
    for poi in &spec.pois {
        len += string_len(&poi.name) + ref_len(poi.object);
    }

    len += var_len(spec.locations.len() as u64);
    for (location_idx, location) in spec.locations.iter().enumerate() {
        len += string_len(&location.name) + var_len(location.objects.len() as u64);
        for object in &location.objects {
            len += ref_len(*object);
        }
        let address_offset = address_offsets
            .get(&(region_idx, location_idx))
            .copied()
            .unwrap_or(0);
        len += var_len(address_offset);
    }

    len += var_len(spec.children.len() as u64) + 4 * spec.children.len();
    len += 4;
    len
}

fn put_delta_offsets(buf: &mut Vec<u8>, offsets: &[FileOffset]) {
    let mut sorted = offsets.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    put_var_u64(buf, sorted.len() as u64);
    let mut previous = 0u64;
    for offset in sorted {
        put_var_u64(buf, offset - previous);
        previous = offset;
    }
}

fn group_payloads(
    items: impl Iterator<Item = (TypeId, Vec<u8>)>,
) -> BTreeMap<TypeId, Vec<Vec<u8>>> {
    let mut groups: BTreeMap<TypeId, Vec<Vec<u8>>> = BTreeMap::new();
    for (type_id, payload) in items {
        groups.entry(type_id).or_default().push(payload);
    }
    groups
}

fn write_optimization_file(
    dir: &Path,
    filename: &str,
    max_level: u32,
    groups: &BTreeMap<TypeId, Vec<Vec<u8>>>,
) -> Result<()> {
    let mut buf = Vec::new();
    put_var_u64(&mut buf, u64::from(max_level));
    put_var_u64(&mut buf, groups.len() as u64);
    for (&type_id, payloads) in groups {
        put_var_u64(&mut buf, u64::from(type_id));
        put_var_u64(&mut buf, payloads.len() as u64);
        for payload in payloads {
            put_var_u64(&mut buf, payload.len() as u64);
            buf.extend_from_slice(payload);
        }
    }
    write_file(dir, filename, &buf)
}

fn write_file(dir: &Path, filename: &str, data: &[u8]) -> Result<()> {
    let mut writer = FileWriter::create(dir.join(filename))?;
    writer.write_all(data)?;
    writer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypeInfo;
    use tempfile::tempdir;

    #[test]
    fn writes_every_dataset_file() {
        let mut config = TypeConfig::new();
        config.register_tag(1, "highway");
        config.register_type(TypeInfo::new(1, 1, "residential").way());

        let mut builder =
            DatasetBuilder::new(config, GeoBox::new(48.0, 11.0, 48.5, 11.5));
        builder.add_node(1, GeoCoord::new(48.1, 11.1), Vec::new());
        builder.add_way(
            1,
            SegmentAttributes::default(),
            vec![GeoCoord::new(48.1, 11.1), GeoCoord::new(48.2, 11.2)],
        );

        let dir = tempdir().expect("temp dir");
        builder.write_to(dir.path()).expect("write dataset");

        for filename in [
            "types.dat",
            "bounding.dat",
            "nodes.dat",
            "ways.dat",
            "areas.dat",
            "areanode.idx",
            "areaway.idx",
            "areaarea.idx",
            "water.idx",
            "areasopt.dat",
            "waysopt.dat",
            "location.idx",
            "address.dat",
        ] {
            assert!(
                dir.path().join(filename).exists(),
                "missing dataset file {filename}"
            );
        }
    }
}

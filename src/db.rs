//! The public database façade: lifecycle, bounded-box retrieval with the
//! optional parallel fan-out, forward location search, reverse lookup and the
//! routing helper.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, info};

use crate::error::{CartaError, Result};
use crate::geom::{
    ellipsoidal_destination, is_area_at_least_partly_in_area, is_coord_in_area, GeoBox,
    GeoCoord, Magnification, CONVERSION_FACTOR,
};
use crate::index::{
    AreaAreaIndex, AreaNodeIndex, AreaWayIndex, OptimizeAreasLowZoom, OptimizeWaysLowZoom,
    WaterIndex,
};
use crate::io::scanner::{FileScanner, ScannerMode};
use crate::location::{
    Address, AddressVisitor, AdminRegion, AdminRegionVisitor, Location, LocationIndex,
    LocationVisitor, Poi, VisitorAction,
};
use crate::model::{Area, FileOffset, GroundTile, Node, ObjectFileRef, Way};
use crate::search::{
    AddressMatchVisitor, AdminRegionMatchVisitor, AdminRegionResult, LocationMatchVisitor,
    LocationResult, LocationSearch, LocationSearchResult, MatchQuality, SearchEntry,
    SearchResultEntry,
};
use crate::store::DataFile;
use crate::types::{TypeConfig, TypeSet, Vehicle};

pub const TYPES_DAT: &str = "types.dat";
pub const BOUNDING_DAT: &str = "bounding.dat";
pub const NODES_DAT: &str = "nodes.dat";
pub const AREAS_DAT: &str = "areas.dat";
pub const WAYS_DAT: &str = "ways.dat";

/// Cache capacities and diagnostics switches fixed at open time.
#[derive(Debug, Clone)]
pub struct DatabaseParameter {
    pub area_area_index_cache_size: usize,
    /// Accepted for API compatibility; the area-node index keeps its cell
    /// directory resident and performs no entry caching.
    pub area_node_index_cache_size: usize,
    pub node_cache_size: usize,
    pub way_cache_size: usize,
    pub area_cache_size: usize,
    /// Emit per-phase query timings to the debug log channel.
    pub debug_performance: bool,
}

impl Default for DatabaseParameter {
    fn default() -> Self {
        Self {
            area_area_index_cache_size: 1000,
            area_node_index_cache_size: 1000,
            node_cache_size: 1000,
            way_cache_size: 4000,
            area_cache_size: 4000,
            debug_performance: false,
        }
    }
}

/// Cooperative cancellation token shared between a caller and a running
/// query. Queries poll it at phase boundaries; nothing is force-terminated.
#[derive(Debug, Clone, Default)]
pub struct Breaker {
    aborted: Arc<AtomicBool>,
}

impl Breaker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.aborted.store(false, Ordering::SeqCst);
    }
}

/// Per-query tuning of the bounded-box retrieval.
#[derive(Debug, Clone)]
pub struct AreaSearchParameter {
    /// Extra zoom levels beyond the current magnification to descend in the
    /// area-area index.
    pub max_area_level: u32,
    pub max_nodes: usize,
    pub max_ways: usize,
    pub max_areas: usize,
    pub use_low_zoom_optimization: bool,
    pub use_multithreading: bool,
    pub breaker: Option<Breaker>,
}

impl Default for AreaSearchParameter {
    fn default() -> Self {
        Self {
            max_area_level: 4,
            max_nodes: 2000,
            max_ways: 10_000,
            max_areas: usize::MAX,
            use_low_zoom_optimization: true,
            use_multithreading: false,
            breaker: None,
        }
    }
}

impl AreaSearchParameter {
    pub fn is_aborted(&self) -> bool {
        self.breaker
            .as_ref()
            .map(Breaker::is_aborted)
            .unwrap_or(false)
    }

    fn check_aborted(&self) -> Result<()> {
        if self.is_aborted() {
            Err(CartaError::Aborted)
        } else {
            Ok(())
        }
    }
}

/// Result of a bounded-box retrieval: the three entity kinds, each
/// independently ordered.
#[derive(Debug, Default)]
pub struct MapData {
    pub nodes: Vec<Arc<Node>>,
    pub ways: Vec<Arc<Way>>,
    pub areas: Vec<Arc<Area>>,
}

/// Identity resolution of a reference set, keyed by file offset per kind.
#[derive(Debug, Default)]
pub struct ObjectLookup {
    pub nodes: FxHashMap<FileOffset, Arc<Node>>,
    pub areas: FxHashMap<FileOffset, Arc<Area>>,
    pub ways: FxHashMap<FileOffset, Arc<Way>>,
}

/// Snapshot of the blob cache counters, one entry per data file.
#[derive(Debug, Clone, Copy, Default)]
pub struct DatabaseStatistics {
    pub nodes: crate::store::CacheStats,
    pub ways: crate::store::CacheStats,
    pub areas: crate::store::CacheStats,
}

/// One hierarchy entry produced by reverse lookup. The populated optional
/// fields follow the same combinations as forward search results.
#[derive(Debug, Clone)]
pub struct ReverseLookupResult {
    pub object: ObjectFileRef,
    pub admin_region: Option<Arc<AdminRegion>>,
    pub poi: Option<Arc<Poi>>,
    pub location: Option<Arc<Location>>,
    pub address: Option<Arc<Address>>,
}

struct Inner {
    debug_performance: bool,
    bounding_box: GeoBox,
    type_config: Arc<TypeConfig>,
    node_data: DataFile<Node>,
    area_data: DataFile<Area>,
    way_data: DataFile<Way>,
    area_node_index: AreaNodeIndex,
    area_way_index: AreaWayIndex,
    area_area_index: AreaAreaIndex,
    water_index: WaterIndex,
    optimize_areas: OptimizeAreasLowZoom,
    optimize_ways: OptimizeWaysLowZoom,
    location_index: LocationIndex,
}

/// Read-only geospatial database over a dataset directory.
///
/// All retrieval runs against immutable on-disk state; decoded entities are
/// shared snapshots. The database is `Sync`: concurrent queries contend only
/// on the cache mutexes.
pub struct Database {
    path: PathBuf,
    inner: Option<Inner>,
}

impl Database {
    /// Opens the dataset at `path`, loading the type registry, the boundary
    /// and all indices. On failure every partially acquired resource is
    /// released and the database stays closed.
    pub fn open(path: impl AsRef<Path>, parameter: &DatabaseParameter) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let mut scanner = FileScanner::open(path.join(TYPES_DAT), ScannerMode::Sequential)?;
        let type_config = Arc::new(TypeConfig::read(&mut scanner)?);

        let mut scanner = FileScanner::open(path.join(BOUNDING_DAT), ScannerMode::Sequential)?;
        let min_lat = scanner.read_var_u64()? as f64 / CONVERSION_FACTOR - 90.0;
        let min_lon = scanner.read_var_u64()? as f64 / CONVERSION_FACTOR - 180.0;
        let max_lat = scanner.read_var_u64()? as f64 / CONVERSION_FACTOR - 90.0;
        let max_lon = scanner.read_var_u64()? as f64 / CONVERSION_FACTOR - 180.0;
        let bounding_box = GeoBox::new(min_lat, min_lon, max_lat, max_lon);

        let inner = Inner {
            debug_performance: parameter.debug_performance,
            bounding_box,
            type_config,
            node_data: DataFile::open(
                &path,
                NODES_DAT,
                ScannerMode::LowMemRandom,
                parameter.node_cache_size,
            )?,
            area_data: DataFile::open(
                &path,
                AREAS_DAT,
                ScannerMode::LowMemRandom,
                parameter.area_cache_size,
            )?,
            way_data: DataFile::open(
                &path,
                WAYS_DAT,
                ScannerMode::LowMemRandom,
                parameter.way_cache_size,
            )?,
            area_node_index: AreaNodeIndex::open(&path)?,
            area_way_index: AreaWayIndex::open(&path)?,
            area_area_index: AreaAreaIndex::open(&path, parameter.area_area_index_cache_size)?,
            water_index: WaterIndex::open(&path)?,
            optimize_areas: OptimizeAreasLowZoom::open(&path)?,
            optimize_ways: OptimizeWaysLowZoom::open(&path)?,
            location_index: LocationIndex::open(&path)?,
        };

        info!(path = %path.display(), "database opened");

        Ok(Self {
            path,
            inner: Some(inner),
        })
    }

    pub fn is_open(&self) -> bool {
        self.inner.is_some()
    }

    /// Releases every file and cache. Idempotent.
    pub fn close(&mut self) {
        if self.inner.take().is_some() {
            info!(path = %self.path.display(), "database closed");
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn inner(&self) -> Result<&Inner> {
        self.inner.as_ref().ok_or(CartaError::NotOpen)
    }

    pub fn bounding_box(&self) -> Result<GeoBox> {
        Ok(self.inner()?.bounding_box)
    }

    pub fn type_config(&self) -> Result<Arc<TypeConfig>> {
        Ok(Arc::clone(&self.inner()?.type_config))
    }

    /// Empties the blob caches without touching the files.
    pub fn flush_cache(&self) -> Result<()> {
        let inner = self.inner()?;
        inner.node_data.flush_cache();
        inner.area_data.flush_cache();
        inner.way_data.flush_cache();
        Ok(())
    }

    /// Current blob cache counters, for diagnostics and tests.
    pub fn statistics(&self) -> Result<DatabaseStatistics> {
        let inner = self.inner()?;
        Ok(DatabaseStatistics {
            nodes: inner.node_data.stats(),
            ways: inner.way_data.stats(),
            areas: inner.area_data.stats(),
        })
    }

    pub fn dump_statistics(&self) -> Result<()> {
        let inner = self.inner()?;
        inner.node_data.dump_statistics();
        inner.area_data.dump_statistics();
        inner.way_data.dump_statistics();
        inner.area_area_index.dump_statistics();
        inner.area_node_index.dump_statistics();
        inner.area_way_index.dump_statistics();
        inner.water_index.dump_statistics();
        inner.location_index.dump_statistics();
        Ok(())
    }

    /// Bounded-box retrieval for rendering: nodes, ways and areas of the
    /// requested types intersecting `bbox` at `magnification`.
    ///
    /// With `use_multithreading` set, the three retrievals run concurrently;
    /// the result collections are set-equal to a serial run either way.
    #[allow(clippy::too_many_arguments)]
    pub fn objects(
        &self,
        bbox: &GeoBox,
        magnification: Magnification,
        node_types: &TypeSet,
        way_types: &[TypeSet],
        area_types: &TypeSet,
        parameter: &AreaSearchParameter,
    ) -> Result<MapData> {
        let inner = self.inner()?;
        parameter.check_aborted()?;

        let whole = Instant::now();
        let (nodes, ways, areas) = if parameter.use_multithreading {
            let (nodes, (ways, areas)) = rayon::join(
                || inner.objects_nodes(parameter, node_types, bbox),
                || {
                    rayon::join(
                        || inner.objects_ways(parameter, way_types, magnification, bbox),
                        || inner.objects_areas(parameter, area_types, magnification, bbox),
                    )
                },
            );
            (nodes?, ways?, areas?)
        } else {
            (
                inner.objects_nodes(parameter, node_types, bbox)?,
                inner.objects_ways(parameter, way_types, magnification, bbox)?,
                inner.objects_areas(parameter, area_types, magnification, bbox)?,
            )
        };

        if inner.debug_performance {
            debug!(
                total_us = whole.elapsed().as_micros() as u64,
                nodes = nodes.len(),
                ways = ways.len(),
                areas = areas.len(),
                "objects query finished"
            );
        }

        Ok(MapData { nodes, ways, areas })
    }

    /// Unbounded variant used for identity-style lookups: all entities of the
    /// given types intersecting `bbox`, without caps or low-zoom diversion.
    pub fn objects_in_box(&self, bbox: &GeoBox, types: &TypeSet) -> Result<MapData> {
        let inner = self.inner()?;
        let parameter = AreaSearchParameter {
            max_nodes: usize::MAX,
            max_ways: usize::MAX,
            max_areas: usize::MAX,
            use_low_zoom_optimization: false,
            ..AreaSearchParameter::default()
        };

        let way_types = [types.clone()];
        Ok(MapData {
            nodes: inner.objects_nodes(&parameter, types, bbox)?,
            ways: inner.objects_ways(
                &parameter,
                &way_types,
                Magnification::from_level(u32::MAX),
                bbox,
            )?,
            areas: inner.objects_areas(
                &parameter,
                types,
                Magnification::from_level(u32::MAX - 4),
                bbox,
            )?,
        })
    }

    /// Resolves a set of references to their entities, split per kind.
    pub fn objects_by_ref(
        &self,
        objects: impl IntoIterator<Item = ObjectFileRef>,
    ) -> Result<ObjectLookup> {
        let inner = self.inner()?;

        let mut node_offsets = Vec::new();
        let mut area_offsets = Vec::new();
        let mut way_offsets = Vec::new();
        for object in objects {
            match object {
                ObjectFileRef::Node(offset) => node_offsets.push(offset),
                ObjectFileRef::Area(offset) => area_offsets.push(offset),
                ObjectFileRef::Way(offset) => way_offsets.push(offset),
                ObjectFileRef::None => {}
            }
        }

        Ok(ObjectLookup {
            nodes: inner.node_data.get_by_offset_set(node_offsets)?,
            areas: inner.area_data.get_by_offset_set(area_offsets)?,
            ways: inner.way_data.get_by_offset_set(way_offsets)?,
        })
    }

    /// Ground tiles (land/water/coast classification) for `bbox` at the
    /// level matching `magnification`.
    pub fn ground_tiles(
        &self,
        bbox: &GeoBox,
        magnification: Magnification,
    ) -> Result<Vec<GroundTile>> {
        self.inner()?.water_index.get_regions(bbox, magnification)
    }

    pub fn node_by_offset(&self, offset: FileOffset) -> Result<Arc<Node>> {
        self.inner()?.node_data.get_by_offset(offset)
    }

    pub fn nodes_by_offsets(&self, offsets: &[FileOffset]) -> Result<Vec<Arc<Node>>> {
        self.inner()?.node_data.get_by_offsets(offsets)
    }

    pub fn nodes_by_offset_set(
        &self,
        offsets: impl IntoIterator<Item = FileOffset>,
    ) -> Result<FxHashMap<FileOffset, Arc<Node>>> {
        self.inner()?.node_data.get_by_offset_set(offsets)
    }

    pub fn area_by_offset(&self, offset: FileOffset) -> Result<Arc<Area>> {
        self.inner()?.area_data.get_by_offset(offset)
    }

    pub fn areas_by_offsets(&self, offsets: &[FileOffset]) -> Result<Vec<Arc<Area>>> {
        self.inner()?.area_data.get_by_offsets(offsets)
    }

    pub fn areas_by_offset_set(
        &self,
        offsets: impl IntoIterator<Item = FileOffset>,
    ) -> Result<FxHashMap<FileOffset, Arc<Area>>> {
        self.inner()?.area_data.get_by_offset_set(offsets)
    }

    pub fn way_by_offset(&self, offset: FileOffset) -> Result<Arc<Way>> {
        self.inner()?.way_data.get_by_offset(offset)
    }

    pub fn ways_by_offsets(&self, offsets: &[FileOffset]) -> Result<Vec<Arc<Way>>> {
        self.inner()?.way_data.get_by_offsets(offsets)
    }

    pub fn ways_by_offset_set(
        &self,
        offsets: impl IntoIterator<Item = FileOffset>,
    ) -> Result<FxHashMap<FileOffset, Arc<Way>>> {
        self.inner()?.way_data.get_by_offset_set(offsets)
    }

    /// Drives `visitor` over the admin-region forest.
    pub fn visit_admin_regions(&self, visitor: &mut dyn AdminRegionVisitor) -> Result<()> {
        self.inner()?.location_index.visit_admin_regions(visitor)
    }

    /// Enumerates the POIs and locations of `region` and its subregions.
    pub fn visit_admin_region_locations(
        &self,
        region: &AdminRegion,
        visitor: &mut dyn LocationVisitor,
    ) -> Result<()> {
        self.inner()?
            .location_index
            .visit_admin_region_locations(region, visitor, true)
    }

    pub fn visit_location_addresses(
        &self,
        region: &AdminRegion,
        location: &Location,
        visitor: &mut dyn AddressVisitor,
    ) -> Result<()> {
        self.inner()?
            .location_index
            .visit_location_addresses(region, location, visitor)
    }

    pub fn resolve_admin_region_hierarchy(
        &self,
        region: &AdminRegion,
    ) -> Result<FxHashMap<FileOffset, Arc<AdminRegion>>> {
        self.inner()?
            .location_index
            .resolve_admin_region_hierarchy(region)
    }

    /// Runs a prepared [`LocationSearch`], returning deduplicated results
    /// ranked best-first and capped at the search limit.
    pub fn search_for_locations(&self, search: &LocationSearch) -> Result<LocationSearchResult> {
        let inner = self.inner()?;
        let mut result = LocationSearchResult::default();

        for entry in &search.searches {
            if entry.admin_region_pattern.is_empty() {
                continue;
            }

            let mut region_visitor =
                AdminRegionMatchVisitor::new(&entry.admin_region_pattern, search.limit);
            inner.location_index.visit_admin_regions(&mut region_visitor)?;
            if region_visitor.limit_reached {
                result.limit_reached = true;
            }

            for region_result in &region_visitor.results {
                inner.handle_admin_region(search, entry, region_result, &mut result)?;
            }
        }

        result.results.sort_by(SearchResultEntry::compare);
        result.results.dedup_by(|a, b| a.same_identity(b));
        if result.results.len() > search.limit {
            result.results.truncate(search.limit);
            result.limit_reached = true;
        }

        Ok(result)
    }

    /// Determines, for each input reference, the hierarchy of admin region /
    /// location / address enclosing it. Each input may yield zero, one or
    /// several results; no deduplication is performed.
    pub fn reverse_lookup_objects(
        &self,
        objects: &[ObjectFileRef],
    ) -> Result<Vec<ReverseLookupResult>> {
        let inner = self.inner()?;
        let mut results = Vec::new();

        let mut region_visitor = AdminRegionReverseLookupVisitor {
            inner,
            search_entries: Vec::new(),
            results: &mut results,
            admin_regions: BTreeMap::new(),
        };

        for object in objects {
            match object {
                ObjectFileRef::Node(offset) => {
                    let node = inner.node_data.get_by_offset(*offset)?;
                    region_visitor.search_entries.push(ReverseSearchEntry {
                        object: *object,
                        coords: vec![node.coord],
                    });
                }
                ObjectFileRef::Area(offset) => {
                    let area = inner.area_data.get_by_offset(*offset)?;
                    region_visitor.search_entries.push(ReverseSearchEntry {
                        object: *object,
                        coords: area.outer_ring().nodes.clone(),
                    });
                }
                ObjectFileRef::Way(offset) => {
                    let way = inner.way_data.get_by_offset(*offset)?;
                    region_visitor.search_entries.push(ReverseSearchEntry {
                        object: *object,
                        coords: way.nodes.clone(),
                    });
                }
                ObjectFileRef::None => {
                    return Err(CartaError::Corrupt(
                        "reverse lookup requires valid object references".into(),
                    ))
                }
            }
        }

        inner.location_index.visit_admin_regions(&mut region_visitor)?;

        let admin_regions = region_visitor.admin_regions;
        if admin_regions.is_empty() {
            return Ok(results);
        }

        let object_set: FxHashSet<ObjectFileRef> = objects.iter().copied().collect();
        let mut location_visitor = LocationReverseLookupVisitor {
            objects: &object_set,
            results: &mut results,
            locations: Vec::new(),
        };

        for region in admin_regions.values() {
            inner.location_index.visit_admin_region_locations(
                region,
                &mut location_visitor,
                false,
            )?;
        }

        let locations = location_visitor.locations;
        let mut address_visitor = AddressReverseLookupVisitor {
            objects: &object_set,
            results: &mut results,
        };

        for (region, location) in &locations {
            inner
                .location_index
                .visit_location_addresses(region, location, &mut address_visitor)?;
        }

        Ok(results)
    }

    pub fn reverse_lookup_object(
        &self,
        object: ObjectFileRef,
    ) -> Result<Vec<ReverseLookupResult>> {
        self.reverse_lookup_objects(&[object])
    }

    /// Finds the way-or-area node closest to `(lat, lon)` among routable
    /// types of `vehicle`, searching a box `radius_meter` across. Standalone
    /// nodes are deliberately not considered routable. Ties keep the first
    /// candidate seen.
    pub fn closest_routable_node(
        &self,
        lat: f64,
        lon: f64,
        vehicle: Vehicle,
        radius_meter: f64,
    ) -> Result<Option<(ObjectFileRef, usize)>> {
        let inner = self.inner()?;

        let top_left = ellipsoidal_destination(lat, lon, 315.0, radius_meter);
        let bottom_right = ellipsoidal_destination(lat, lon, 135.0, radius_meter);
        let bbox = GeoBox::new(
            bottom_right.lat,
            top_left.lon,
            top_left.lat,
            bottom_right.lon,
        );

        let routable = inner.type_config.routable_types(vehicle);
        let data = self.objects_in_box(&bbox, &routable)?;

        let mut best: Option<(ObjectFileRef, usize)> = None;
        let mut min_distance = f64::MAX;

        for area in &data.areas {
            for (idx, node) in area.outer_ring().nodes.iter().enumerate() {
                let distance =
                    ((node.lat - lat).powi(2) + (node.lon - lon).powi(2)).sqrt();
                if distance < min_distance {
                    min_distance = distance;
                    best = Some((ObjectFileRef::Area(area.file_offset), idx));
                }
            }
        }

        for way in &data.ways {
            for (idx, node) in way.nodes.iter().enumerate() {
                let distance =
                    ((node.lat - lat).powi(2) + (node.lon - lon).powi(2)).sqrt();
                if distance < min_distance {
                    min_distance = distance;
                    best = Some((ObjectFileRef::Way(way.file_offset), idx));
                }
            }
        }

        Ok(best)
    }
}

impl Inner {
    fn objects_nodes(
        &self,
        parameter: &AreaSearchParameter,
        node_types: &TypeSet,
        bbox: &GeoBox,
    ) -> Result<Vec<Arc<Node>>> {
        parameter.check_aborted()?;

        let index_timer = Instant::now();
        let mut offsets = Vec::new();
        if node_types.has_types() {
            offsets = self
                .area_node_index
                .get_offsets(bbox, node_types, parameter.max_nodes)?;
        }
        let index_us = index_timer.elapsed().as_micros() as u64;

        parameter.check_aborted()?;
        offsets.sort_unstable();
        parameter.check_aborted()?;

        let blob_timer = Instant::now();
        let mut nodes = self.node_data.get_by_offsets(&offsets)?;
        nodes.retain(|node| bbox.contains(node.coord));
        let blob_us = blob_timer.elapsed().as_micros() as u64;

        parameter.check_aborted()?;

        if self.debug_performance {
            debug!(index_us, blob_us, count = nodes.len(), "node retrieval");
        }
        Ok(nodes)
    }

    fn objects_ways(
        &self,
        parameter: &AreaSearchParameter,
        way_types: &[TypeSet],
        magnification: Magnification,
        bbox: &GeoBox,
    ) -> Result<Vec<Arc<Way>>> {
        let mut remaining_types: Vec<TypeSet> = way_types.to_vec();
        parameter.check_aborted()?;

        let optimized_timer = Instant::now();
        let mut ways = Vec::new();
        if !remaining_types.is_empty()
            && parameter.use_low_zoom_optimization
            && self.optimize_ways.has_optimizations(magnification)
        {
            self.optimize_ways
                .get_ways(bbox, parameter.max_ways, &mut remaining_types, &mut ways);
        }
        let optimized_us = optimized_timer.elapsed().as_micros() as u64;

        parameter.check_aborted()?;

        let index_timer = Instant::now();
        let mut offsets = Vec::new();
        if remaining_types.iter().any(TypeSet::has_types) {
            offsets =
                self.area_way_index
                    .get_offsets(bbox, &remaining_types, parameter.max_ways)?;
        }
        let index_us = index_timer.elapsed().as_micros() as u64;

        parameter.check_aborted()?;
        offsets.sort_unstable();
        parameter.check_aborted()?;

        let blob_timer = Instant::now();
        if !offsets.is_empty() {
            let mut resolved = self.way_data.get_by_offsets(&offsets)?;
            resolved.retain(|way| way.bounding_box().intersects(bbox));
            ways.append(&mut resolved);
        }
        let blob_us = blob_timer.elapsed().as_micros() as u64;

        parameter.check_aborted()?;

        if self.debug_performance {
            debug!(
                optimized_us,
                index_us,
                blob_us,
                count = ways.len(),
                "way retrieval"
            );
        }
        Ok(ways)
    }

    fn objects_areas(
        &self,
        parameter: &AreaSearchParameter,
        area_types: &TypeSet,
        magnification: Magnification,
        bbox: &GeoBox,
    ) -> Result<Vec<Arc<Area>>> {
        let mut remaining_types = area_types.clone();
        parameter.check_aborted()?;

        let optimized_timer = Instant::now();
        let mut areas = Vec::new();
        if remaining_types.has_types()
            && parameter.use_low_zoom_optimization
            && self.optimize_areas.has_optimizations(magnification)
        {
            // The low-zoom area stage is capped by the way limit, mirroring
            // the behavior of the reference engine.
            self.optimize_areas
                .get_areas(bbox, parameter.max_ways, &mut remaining_types, &mut areas);
        }
        let optimized_us = optimized_timer.elapsed().as_micros() as u64;

        parameter.check_aborted()?;

        let index_timer = Instant::now();
        let mut offsets = Vec::new();
        if remaining_types.has_types() {
            let max_level = magnification
                .level()
                .saturating_add(parameter.max_area_level);
            offsets = self.area_area_index.get_offsets(
                bbox,
                max_level,
                &remaining_types,
                parameter.max_areas,
            )?;
        }
        let index_us = index_timer.elapsed().as_micros() as u64;

        parameter.check_aborted()?;
        offsets.sort_unstable();
        parameter.check_aborted()?;

        let blob_timer = Instant::now();
        if !offsets.is_empty() {
            let mut resolved = self.area_data.get_by_offsets(&offsets)?;
            resolved.retain(|area| area.bounding_box().intersects(bbox));
            areas.append(&mut resolved);
        }
        let blob_us = blob_timer.elapsed().as_micros() as u64;

        parameter.check_aborted()?;

        if self.debug_performance {
            debug!(
                optimized_us,
                index_us,
                blob_us,
                count = areas.len(),
                "area retrieval"
            );
        }
        Ok(areas)
    }

    fn handle_admin_region(
        &self,
        search: &LocationSearch,
        entry: &SearchEntry,
        region_result: &AdminRegionResult,
        result: &mut LocationSearchResult,
    ) -> Result<()> {
        let region_quality = if region_result.is_match {
            MatchQuality::Match
        } else {
            MatchQuality::Candidate
        };

        if entry.location_pattern.is_empty() {
            result.results.push(SearchResultEntry {
                admin_region: Some(Arc::clone(&region_result.admin_region)),
                poi: None,
                location: None,
                address: None,
                admin_region_match_quality: region_quality,
                poi_match_quality: MatchQuality::None,
                location_match_quality: MatchQuality::None,
                address_match_quality: MatchQuality::None,
            });
            return Ok(());
        }

        let remaining = search.limit.saturating_sub(result.results.len());
        let mut location_visitor = LocationMatchVisitor::new(&entry.location_pattern, remaining);
        self.location_index.visit_admin_region_locations(
            &region_result.admin_region,
            &mut location_visitor,
            true,
        )?;
        if location_visitor.limit_reached {
            result.limit_reached = true;
        }

        // A region hit is not reported on its own when a location was
        // demanded but none matched inside it.
        if location_visitor.poi_results.is_empty() && location_visitor.location_results.is_empty()
        {
            return Ok(());
        }

        for poi_result in &location_visitor.poi_results {
            result.results.push(SearchResultEntry {
                admin_region: Some(Arc::clone(&poi_result.admin_region)),
                poi: Some(Arc::clone(&poi_result.poi)),
                location: None,
                address: None,
                admin_region_match_quality: region_quality,
                poi_match_quality: if poi_result.is_match {
                    MatchQuality::Match
                } else {
                    MatchQuality::Candidate
                },
                location_match_quality: MatchQuality::None,
                address_match_quality: MatchQuality::None,
            });
        }

        for location_result in &location_visitor.location_results {
            self.handle_admin_region_location(
                search,
                entry,
                region_quality,
                location_result,
                result,
            )?;
        }

        Ok(())
    }

    fn handle_admin_region_location(
        &self,
        search: &LocationSearch,
        entry: &SearchEntry,
        region_quality: MatchQuality,
        location_result: &LocationResult,
        result: &mut LocationSearchResult,
    ) -> Result<()> {
        let location_quality = if location_result.is_match {
            MatchQuality::Match
        } else {
            MatchQuality::Candidate
        };

        if entry.address_pattern.is_empty() {
            result.results.push(SearchResultEntry {
                admin_region: Some(Arc::clone(&location_result.admin_region)),
                poi: None,
                location: Some(Arc::clone(&location_result.location)),
                address: None,
                admin_region_match_quality: region_quality,
                poi_match_quality: MatchQuality::None,
                location_match_quality: location_quality,
                address_match_quality: MatchQuality::None,
            });
            return Ok(());
        }

        let remaining = search.limit.saturating_sub(result.results.len());
        let mut address_visitor = AddressMatchVisitor::new(&entry.address_pattern, remaining);
        self.location_index.visit_location_addresses(
            &location_result.admin_region,
            &location_result.location,
            &mut address_visitor,
        )?;
        if address_visitor.limit_reached {
            result.limit_reached = true;
        }

        if address_visitor.results.is_empty() {
            // An address was demanded but none matched: report the location
            // hit without an address rather than suppressing it.
            result.results.push(SearchResultEntry {
                admin_region: Some(Arc::clone(&location_result.admin_region)),
                poi: None,
                location: Some(Arc::clone(&location_result.location)),
                address: None,
                admin_region_match_quality: region_quality,
                poi_match_quality: MatchQuality::None,
                location_match_quality: location_quality,
                address_match_quality: MatchQuality::None,
            });
            return Ok(());
        }

        for address_result in &address_visitor.results {
            result.results.push(SearchResultEntry {
                admin_region: Some(Arc::clone(&location_result.admin_region)),
                poi: None,
                location: Some(Arc::clone(&address_result.location)),
                address: Some(Arc::clone(&address_result.address)),
                admin_region_match_quality: region_quality,
                poi_match_quality: MatchQuality::None,
                location_match_quality: location_quality,
                address_match_quality: if address_result.is_match {
                    MatchQuality::Match
                } else {
                    MatchQuality::Candidate
                },
            });
        }

        Ok(())
    }
}

struct ReverseSearchEntry {
    object: ObjectFileRef,
    coords: Vec<GeoCoord>,
}

/// Walks the region forest for reverse lookup: emits direct identity matches
/// and records containment candidates, descending only below candidates.
struct AdminRegionReverseLookupVisitor<'a> {
    inner: &'a Inner,
    search_entries: Vec<ReverseSearchEntry>,
    results: &'a mut Vec<ReverseLookupResult>,
    admin_regions: BTreeMap<FileOffset, Arc<AdminRegion>>,
}

impl AdminRegionVisitor for AdminRegionReverseLookupVisitor<'_> {
    fn visit(&mut self, region: &AdminRegion) -> Result<VisitorAction> {
        for entry in &self.search_entries {
            if region.match_ref(entry.object) {
                self.results.push(ReverseLookupResult {
                    object: entry.object,
                    admin_region: Some(Arc::new(region.clone())),
                    poi: None,
                    location: None,
                    address: None,
                });
            }
        }

        // Only area-backed regions can contain geometry.
        let ObjectFileRef::Area(area_offset) = region.object else {
            return Ok(VisitorAction::SkipChildren);
        };
        let area = self.inner.area_data.get_by_offset(area_offset)?;

        let outer_ring = &area.outer_ring().nodes;
        let candidate = self.search_entries.iter().any(|entry| {
            if entry.coords.len() == 1 {
                is_coord_in_area(entry.coords[0], outer_ring)
            } else {
                is_area_at_least_partly_in_area(&entry.coords, outer_ring)
            }
        });

        if candidate {
            self.admin_regions
                .insert(region.region_offset, Arc::new(region.clone()));
            Ok(VisitorAction::VisitChildren)
        } else {
            Ok(VisitorAction::SkipChildren)
        }
    }
}

/// Matches POIs and location objects of candidate regions against the query
/// set, remembering every traversed location for the address phase.
struct LocationReverseLookupVisitor<'a> {
    objects: &'a FxHashSet<ObjectFileRef>,
    results: &'a mut Vec<ReverseLookupResult>,
    locations: Vec<(Arc<AdminRegion>, Arc<Location>)>,
}

impl LocationVisitor for LocationReverseLookupVisitor<'_> {
    fn visit_poi(&mut self, region: &AdminRegion, poi: &Poi) -> Result<bool> {
        if self.objects.contains(&poi.object) {
            self.results.push(ReverseLookupResult {
                object: poi.object,
                admin_region: Some(Arc::new(region.clone())),
                poi: Some(Arc::new(poi.clone())),
                location: None,
                address: None,
            });
        }
        Ok(true)
    }

    fn visit_location(&mut self, region: &AdminRegion, location: &Location) -> Result<bool> {
        let region = Arc::new(region.clone());
        let location = Arc::new(location.clone());
        self.locations
            .push((Arc::clone(&region), Arc::clone(&location)));

        for object in &location.objects {
            if self.objects.contains(object) {
                self.results.push(ReverseLookupResult {
                    object: *object,
                    admin_region: Some(Arc::clone(&region)),
                    poi: None,
                    location: Some(Arc::clone(&location)),
                    address: None,
                });
            }
        }
        Ok(true)
    }
}

struct AddressReverseLookupVisitor<'a> {
    objects: &'a FxHashSet<ObjectFileRef>,
    results: &'a mut Vec<ReverseLookupResult>,
}

impl AddressVisitor for AddressReverseLookupVisitor<'_> {
    fn visit_address(
        &mut self,
        region: &AdminRegion,
        location: &Location,
        address: &Address,
    ) -> Result<bool> {
        if self.objects.contains(&address.object) {
            self.results.push(ReverseLookupResult {
                object: address.object,
                admin_region: Some(Arc::new(region.clone())),
                poi: None,
                location: Some(Arc::new(location.clone())),
                address: Some(Arc::new(address.clone())),
            });
        }
        Ok(true)
    }
}

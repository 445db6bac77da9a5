//! Shared on-disk fixture: a miniature dataset around an alpine bounding box
//! with a three-region admin hierarchy, streets, addresses, a POI, water
//! classification and low-zoom bundles.

#![allow(dead_code)]

use carta::dataset::{
    AddressSpec, DatasetBuilder, GroundCellSpec, GroundLevelSpec, LocationSpec, PoiSpec,
    RegionSpec,
};
use carta::{
    Area, GeoBox, GeoCoord, GroundTileKind, ObjectFileRef, Ring, SegmentAttributes, Tag,
    TypeConfig, TypeInfo, TypeId, Vehicle, Way,
};
use tempfile::TempDir;

pub const TYPE_RESIDENTIAL: TypeId = 1;
pub const TYPE_CITY: TypeId = 2;
pub const TYPE_WATER: TypeId = 3;
pub const TYPE_ADMIN: TypeId = 4;
pub const TYPE_PATH: TypeId = 5;
pub const TYPE_TOWNHALL: TypeId = 6;
pub const TYPE_HOUSE: TypeId = 7;

/// Street names under the root region; every one contains a lowercase `a`
/// for the limit-reached search scenario.
pub const BAVARIA_STREETS: [&str; 12] = [
    "Gartenstraße",
    "Parkweg",
    "Wasserweg",
    "Bahnhofstraße",
    "Marktplatz",
    "Talstraße",
    "Waldweg",
    "Hauptstraße",
    "Am Anger",
    "Lindenallee",
    "Rosengasse",
    "Schlossallee",
];

pub struct Fixture {
    pub dir: TempDir,
    pub main_street: ObjectFileRef,
    pub high_street: ObjectFileRef,
    pub node_in_bavaria: ObjectFileRef,
    pub bavaria_alias_node: ObjectFileRef,
    pub addr10_node: ObjectFileRef,
    pub addr12_node: ObjectFileRef,
    pub cityhall_node: ObjectFileRef,
    pub springfield_area: ObjectFileRef,
    pub bavaria_area: ObjectFileRef,
    pub lake_area: ObjectFileRef,
}

pub fn bounding() -> GeoBox {
    GeoBox::new(48.0, 11.0, 48.5, 11.5)
}

fn type_config() -> TypeConfig {
    let mut config = TypeConfig::new();
    config
        .register_tag(1, "highway")
        .register_tag(2, "place")
        .register_tag(3, "natural")
        .register_tag(4, "boundary")
        .register_tag(5, "amenity")
        .register_tag(6, "addr");
    config
        .register_type(
            TypeInfo::new(TYPE_RESIDENTIAL, 1, "residential")
                .way()
                .routable(Vehicle::Car)
                .routable(Vehicle::Foot)
                .indexed(),
        )
        .register_type(TypeInfo::new(TYPE_CITY, 2, "city").node().area().indexed())
        .register_type(TypeInfo::new(TYPE_WATER, 3, "water").area())
        .register_type(TypeInfo::new(TYPE_ADMIN, 4, "administrative").area().indexed())
        .register_type(
            TypeInfo::new(TYPE_PATH, 1, "path")
                .way()
                .routable(Vehicle::Foot),
        )
        .register_type(TypeInfo::new(TYPE_TOWNHALL, 5, "townhall").node().indexed())
        .register_type(TypeInfo::new(TYPE_HOUSE, 6, "housenumber").node());
    config
}

fn rectangle(min_lat: f64, min_lon: f64, max_lat: f64, max_lon: f64) -> Vec<GeoCoord> {
    vec![
        GeoCoord::new(min_lat, min_lon),
        GeoCoord::new(min_lat, max_lon),
        GeoCoord::new(max_lat, max_lon),
        GeoCoord::new(max_lat, min_lon),
    ]
}

fn outer_ring(type_id: TypeId, min_lat: f64, min_lon: f64, max_lat: f64, max_lon: f64) -> Ring {
    Ring {
        ring: Ring::OUTER,
        type_id,
        attributes: SegmentAttributes::default(),
        nodes: rectangle(min_lat, min_lon, max_lat, max_lon),
    }
}

pub fn build() -> Fixture {
    let mut builder = DatasetBuilder::new(type_config(), bounding());

    // Blobs. Offsets are handed out immediately, so the hierarchy below can
    // reference them.
    let bavaria_alias_node = builder.add_node(
        TYPE_CITY,
        GeoCoord::new(48.25, 11.25),
        vec![Tag::new(2, "city")],
    );
    let cityhall_node = builder.add_node(TYPE_TOWNHALL, GeoCoord::new(48.21, 11.21), Vec::new());
    let addr10_node = builder.add_node(TYPE_HOUSE, GeoCoord::new(48.151, 11.151), Vec::new());
    let addr12_node = builder.add_node(TYPE_HOUSE, GeoCoord::new(48.152, 11.152), Vec::new());
    let node_in_bavaria = builder.add_node(TYPE_CITY, GeoCoord::new(48.4, 11.4), Vec::new());

    let main_street = builder.add_way(
        TYPE_RESIDENTIAL,
        SegmentAttributes::default(),
        vec![
            GeoCoord::new(48.15, 11.15),
            GeoCoord::new(48.155, 11.155),
            GeoCoord::new(48.16, 11.16),
        ],
    );
    let high_street = builder.add_way(
        TYPE_RESIDENTIAL,
        SegmentAttributes::default(),
        vec![GeoCoord::new(48.17, 11.17), GeoCoord::new(48.18, 11.18)],
    );
    let ridge_path = builder.add_way(
        TYPE_PATH,
        SegmentAttributes::default(),
        vec![GeoCoord::new(48.35, 11.35), GeoCoord::new(48.36, 11.36)],
    );

    let mut bavaria_street_ways = Vec::new();
    for idx in 0..BAVARIA_STREETS.len() {
        let lat = 48.31 + idx as f64 * 0.004;
        bavaria_street_ways.push(builder.add_way(
            TYPE_RESIDENTIAL,
            SegmentAttributes::default(),
            vec![GeoCoord::new(lat, 11.31), GeoCoord::new(lat, 11.32)],
        ));
    }

    let bavaria_area = builder.add_area(vec![outer_ring(TYPE_ADMIN, 48.0, 11.0, 48.5, 11.5)]);
    let springfield_area = builder.add_area(vec![outer_ring(TYPE_ADMIN, 48.1, 11.1, 48.3, 11.3)]);
    let shelbyville_area =
        builder.add_area(vec![outer_ring(TYPE_ADMIN, 48.32, 11.32, 48.38, 11.38)]);
    let lake_area = builder.add_area(vec![outer_ring(TYPE_WATER, 48.42, 11.42, 48.46, 11.46)]);

    // Admin hierarchy.
    let bavaria_locations: Vec<LocationSpec> = BAVARIA_STREETS
        .iter()
        .zip(&bavaria_street_ways)
        .map(|(&name, &way)| {
            let mut objects = vec![way];
            if name == "Am Anger" {
                objects.push(node_in_bavaria);
            }
            LocationSpec {
                name: name.to_owned(),
                objects,
                addresses: Vec::new(),
            }
        })
        .collect();

    builder.add_root_region(RegionSpec {
        name: "Bavaria".to_owned(),
        object: bavaria_area,
        aliases: vec![("Bayern".to_owned(), bavaria_alias_node.offset())],
        pois: Vec::new(),
        locations: bavaria_locations,
        children: vec![
            RegionSpec {
                name: "Springfield".to_owned(),
                object: springfield_area,
                aliases: Vec::new(),
                pois: vec![PoiSpec {
                    name: "City Hall".to_owned(),
                    object: cityhall_node,
                }],
                locations: vec![
                    LocationSpec {
                        name: "Main Street".to_owned(),
                        objects: vec![main_street],
                        addresses: vec![
                            AddressSpec {
                                name: "10".to_owned(),
                                object: addr10_node,
                            },
                            AddressSpec {
                                name: "12".to_owned(),
                                object: addr12_node,
                            },
                        ],
                    },
                    LocationSpec {
                        name: "High Street".to_owned(),
                        objects: vec![high_street],
                        addresses: Vec::new(),
                    },
                ],
                children: Vec::new(),
            },
            RegionSpec {
                name: "Shelbyville".to_owned(),
                object: shelbyville_area,
                aliases: Vec::new(),
                pois: Vec::new(),
                locations: vec![LocationSpec {
                    name: "Ridge Path".to_owned(),
                    objects: vec![ridge_path],
                    addresses: Vec::new(),
                }],
                children: Vec::new(),
            },
        ],
    });

    // Ground raster at level 10: the bounding box covers cells x 543..=544,
    // y 785..=787.
    builder.add_ground_level(GroundLevelSpec {
        level: 10,
        x_start: 543,
        x_end: 544,
        y_start: 785,
        y_end: 787,
        cells: vec![
            GroundCellSpec {
                kind: Some(GroundTileKind::Land),
                coast: Vec::new(),
            },
            GroundCellSpec {
                kind: Some(GroundTileKind::Land),
                coast: Vec::new(),
            },
            GroundCellSpec {
                kind: Some(GroundTileKind::Coast),
                coast: vec![GeoCoord::new(48.3, 11.1), GeoCoord::new(48.32, 11.15)],
            },
            GroundCellSpec {
                kind: Some(GroundTileKind::Water),
                coast: Vec::new(),
            },
            GroundCellSpec {
                kind: Some(GroundTileKind::Land),
                coast: Vec::new(),
            },
            GroundCellSpec {
                kind: None,
                coast: Vec::new(),
            },
        ],
    });

    // Low-zoom bundles: a simplified main street and the lake outline,
    // usable up to magnification level 6.
    builder.set_optimization_max_level(6);
    builder.add_optimized_way(Way {
        file_offset: 0,
        type_id: TYPE_RESIDENTIAL,
        attributes: SegmentAttributes::default(),
        nodes: vec![GeoCoord::new(48.15, 11.15), GeoCoord::new(48.16, 11.16)],
    });
    builder.add_optimized_area(Area {
        file_offset: 0,
        rings: vec![outer_ring(TYPE_WATER, 48.42, 11.42, 48.46, 11.46)],
    });

    let dir = TempDir::new().expect("temp dir");
    builder.write_to(dir.path()).expect("write dataset");

    Fixture {
        dir,
        main_street,
        high_street,
        node_in_bavaria,
        bavaria_alias_node,
        addr10_node,
        addr12_node,
        cityhall_node,
        springfield_area,
        bavaria_area,
        lake_area,
    }
}

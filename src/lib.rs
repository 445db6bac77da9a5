//! carta — an offline, read-only geospatial database for
//! OpenStreetMap-derived datasets.
//!
//! The crate answers three classes of queries over a pre-built on-disk
//! dataset: bounded-box retrieval of map features for rendering, forward
//! free-text location search, and reverse lookup of the admin-region /
//! location / address hierarchy enclosing stored entities.

pub mod dataset;
pub mod db;
pub mod error;
pub mod geom;
pub mod index;
pub mod io;
pub mod location;
pub mod model;
pub mod search;
pub mod store;
pub mod types;

pub use crate::db::{
    AreaSearchParameter, Breaker, Database, DatabaseParameter, DatabaseStatistics, MapData,
    ObjectLookup, ReverseLookupResult,
};
pub use crate::error::{CartaError, Result};
pub use crate::geom::{GeoBox, GeoCoord, Magnification};
pub use crate::location::{
    Address, AddressListVisitor, AddressVisitor, AdminRegion, AdminRegionVisitor, Location,
    LocationVisitor, Poi, RegionAlias, VisitorAction,
};
pub use crate::model::{
    Area, FileOffset, GroundTile, GroundTileKind, Node, ObjectFileRef, RefType, Ring,
    SegmentAttributes, Tag, Way,
};
pub use crate::search::{
    LocationSearch, LocationSearchResult, MatchQuality, SearchEntry, SearchResultEntry,
};
pub use crate::store::CacheStats;
pub use crate::types::{TagId, TagInfo, TypeConfig, TypeId, TypeInfo, TypeSet, Vehicle};

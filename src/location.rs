//! The hierarchical admin-region / location / address index
//! (`location.idx` + `address.dat`), traversed through visitor protocols
//! with per-node control over descent.

use std::path::Path;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::info;

use crate::error::{CartaError, Result};
use crate::io::scanner::{FileScanner, ScannerMode};
use crate::model::{FileOffset, ObjectFileRef};

pub const LOCATION_IDX: &str = "location.idx";
pub const ADDRESS_DAT: &str = "address.dat";

/// Root sentinel for [`AdminRegion::parent_region_offset`]: offset 0 is the
/// index header, never a region record.
pub const ROOT_REGION_OFFSET: FileOffset = 0;

/// Alternative name of an admin region (postal code, historic name), bound to
/// a node in `nodes.dat`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionAlias {
    pub name: String,
    pub object_offset: FileOffset,
}

/// Administrative subdivision: one node of the region forest.
///
/// `alias_name`/`alias_object` are empty on a plain read; admin-region search
/// fills them in on results produced by an alias hit.
#[derive(Debug, Clone, PartialEq)]
pub struct AdminRegion {
    pub region_offset: FileOffset,
    pub object: ObjectFileRef,
    pub name: String,
    pub alias_name: String,
    pub alias_object: ObjectFileRef,
    pub aliases: Vec<RegionAlias>,
    pub parent_region_offset: FileOffset,
}

impl AdminRegion {
    /// True when `object` identifies this region directly: its own object,
    /// the alias object, or any alias node.
    pub fn match_ref(&self, object: ObjectFileRef) -> bool {
        if self.object == object || self.alias_object == object {
            return true;
        }
        if let ObjectFileRef::Node(offset) = object {
            return self.aliases.iter().any(|alias| alias.object_offset == offset);
        }
        false
    }
}

/// Point-of-interest attached directly to an admin region.
#[derive(Debug, Clone, PartialEq)]
pub struct Poi {
    pub name: String,
    pub object: ObjectFileRef,
}

/// A street or equivalent within a region, bundling the objects that make it
/// up. `address_offset` points into `address.dat` (0 = no addresses).
#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    pub location_offset: FileOffset,
    pub name: String,
    pub region_offset: FileOffset,
    pub objects: Vec<ObjectFileRef>,
    pub address_offset: FileOffset,
}

/// House number or equivalent within a location.
#[derive(Debug, Clone, PartialEq)]
pub struct Address {
    pub address_offset: FileOffset,
    pub name: String,
    pub object: ObjectFileRef,
}

/// Directive returned by [`AdminRegionVisitor::visit`]; the traversal honors
/// it strictly. Failure is the `Err` arm of the visit result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitorAction {
    VisitChildren,
    SkipChildren,
    Stop,
}

pub trait AdminRegionVisitor {
    fn visit(&mut self, region: &AdminRegion) -> Result<VisitorAction>;
}

/// Visitor over a region's POIs and locations. Returning `false` stops the
/// enumeration within the visited region scope.
pub trait LocationVisitor {
    fn visit_poi(&mut self, region: &AdminRegion, poi: &Poi) -> Result<bool>;
    fn visit_location(&mut self, region: &AdminRegion, location: &Location) -> Result<bool>;
}

pub trait AddressVisitor {
    fn visit_address(
        &mut self,
        region: &AdminRegion,
        location: &Location,
        address: &Address,
    ) -> Result<bool>;
}

/// Plain collecting address visitor with a limit; useful for enumerating a
/// street's house numbers without pattern matching.
#[derive(Debug, Default)]
pub struct AddressListVisitor {
    limit: usize,
    pub addresses: Vec<Address>,
    pub limit_reached: bool,
}

impl AddressListVisitor {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            addresses: Vec::new(),
            limit_reached: false,
        }
    }
}

impl AddressVisitor for AddressListVisitor {
    fn visit_address(
        &mut self,
        _region: &AdminRegion,
        _location: &Location,
        address: &Address,
    ) -> Result<bool> {
        if self.addresses.len() >= self.limit {
            self.limit_reached = true;
            return Ok(false);
        }
        self.addresses.push(address.clone());
        if self.addresses.len() >= self.limit {
            self.limit_reached = true;
        }
        Ok(!self.limit_reached)
    }
}

/// One fully decoded region record.
pub(crate) struct RegionRecord {
    pub(crate) region: AdminRegion,
    pub(crate) pois: Vec<Poi>,
    pub(crate) locations: Vec<Location>,
    pub(crate) children: Vec<FileOffset>,
}

/// Read-side of the hierarchical index. Traversals run on duplicated
/// scanners, so concurrent visitors do not contend.
pub struct LocationIndex {
    region_scanner: FileScanner,
    address_scanner: FileScanner,
    roots: Vec<FileOffset>,
}

impl LocationIndex {
    pub fn open(dir: &Path) -> Result<Self> {
        let mut region_scanner =
            FileScanner::open(dir.join(LOCATION_IDX), ScannerMode::LowMemRandom)?;
        let address_scanner =
            FileScanner::open(dir.join(ADDRESS_DAT), ScannerMode::LowMemRandom)?;

        let root_count = region_scanner.read_var_u64()? as usize;
        let mut roots = Vec::with_capacity(root_count);
        for _ in 0..root_count {
            roots.push(FileOffset::from(region_scanner.read_u32()?));
        }

        Ok(Self {
            region_scanner,
            address_scanner,
            roots,
        })
    }

    fn read_region(
        &self,
        scanner: &mut FileScanner,
        region_offset: FileOffset,
    ) -> Result<RegionRecord> {
        scanner.set_pos(region_offset)?;

        let object = ObjectFileRef::read(scanner)?;
        let name = scanner.read_string()?;

        let alias_count = scanner.read_var_u64()? as usize;
        let mut aliases = Vec::with_capacity(alias_count);
        for _ in 0..alias_count {
            let name = scanner.read_string()?;
            let object_offset = scanner.read_var_u64()?;
            aliases.push(RegionAlias {
                name,
                object_offset,
            });
        }

        let poi_count = scanner.read_var_u64()? as usize;
        let mut pois = Vec::with_capacity(poi_count);
        for _ in 0..poi_count {
            let name = scanner.read_string()?;
            let object = ObjectFileRef::read(scanner)?;
            pois.push(Poi { name, object });
        }

        let location_count = scanner.read_var_u64()? as usize;
        let mut locations = Vec::with_capacity(location_count);
        for _ in 0..location_count {
            let location_offset = scanner.pos();
            let name = scanner.read_string()?;
            let object_count = scanner.read_var_u64()? as usize;
            let mut objects = Vec::with_capacity(object_count);
            for _ in 0..object_count {
                objects.push(ObjectFileRef::read(scanner)?);
            }
            let address_offset = scanner.read_var_u64()?;
            locations.push(Location {
                location_offset,
                name,
                region_offset,
                objects,
                address_offset,
            });
        }

        let child_count = scanner.read_var_u64()? as usize;
        let mut children = Vec::with_capacity(child_count);
        for _ in 0..child_count {
            children.push(FileOffset::from(scanner.read_u32()?));
        }

        let parent_region_offset = FileOffset::from(scanner.read_u32()?);

        Ok(RegionRecord {
            region: AdminRegion {
                region_offset,
                object,
                name,
                alias_name: String::new(),
                alias_object: ObjectFileRef::None,
                aliases,
                parent_region_offset,
            },
            pois,
            locations,
            children,
        })
    }

    /// Loads a single region by offset.
    pub fn region(&self, region_offset: FileOffset) -> Result<AdminRegion> {
        let mut scanner = self.region_scanner.duplicate()?;
        Ok(self.read_region(&mut scanner, region_offset)?.region)
    }

    /// Drives `visitor` over the region forest in stored order, honoring the
    /// returned directives.
    pub fn visit_admin_regions(&self, visitor: &mut dyn AdminRegionVisitor) -> Result<()> {
        let mut scanner = self.region_scanner.duplicate()?;
        for &root in &self.roots {
            if !self.visit_region(&mut scanner, root, visitor)? {
                break;
            }
        }
        Ok(())
    }

    /// Returns `false` when the whole traversal should halt.
    fn visit_region(
        &self,
        scanner: &mut FileScanner,
        region_offset: FileOffset,
        visitor: &mut dyn AdminRegionVisitor,
    ) -> Result<bool> {
        let record = self.read_region(scanner, region_offset)?;

        match visitor.visit(&record.region)? {
            VisitorAction::Stop => Ok(false),
            VisitorAction::SkipChildren => Ok(true),
            VisitorAction::VisitChildren => {
                for child in record.children {
                    if !self.visit_region(scanner, child, visitor)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
        }
    }

    /// Enumerates a region's POIs, then its locations. With `recursive` set,
    /// child regions follow in stored order, each presented with its own
    /// region object.
    pub fn visit_admin_region_locations(
        &self,
        region: &AdminRegion,
        visitor: &mut dyn LocationVisitor,
        recursive: bool,
    ) -> Result<()> {
        let mut scanner = self.region_scanner.duplicate()?;
        self.visit_region_locations(&mut scanner, region.region_offset, visitor, recursive)?;
        Ok(())
    }

    fn visit_region_locations(
        &self,
        scanner: &mut FileScanner,
        region_offset: FileOffset,
        visitor: &mut dyn LocationVisitor,
        recursive: bool,
    ) -> Result<bool> {
        let record = self.read_region(scanner, region_offset)?;

        for poi in &record.pois {
            if !visitor.visit_poi(&record.region, poi)? {
                return Ok(false);
            }
        }
        for location in &record.locations {
            if !visitor.visit_location(&record.region, location)? {
                return Ok(false);
            }
        }

        if recursive {
            for child in record.children {
                if !self.visit_region_locations(scanner, child, visitor, true)? {
                    return Ok(false);
                }
            }
        }

        Ok(true)
    }

    /// Enumerates the addresses of one location.
    pub fn visit_location_addresses(
        &self,
        region: &AdminRegion,
        location: &Location,
        visitor: &mut dyn AddressVisitor,
    ) -> Result<()> {
        if location.address_offset == 0 {
            return Ok(());
        }

        let mut scanner = self.address_scanner.duplicate()?;
        scanner.set_pos(location.address_offset)?;

        let address_count = scanner.read_var_u64()? as usize;
        for _ in 0..address_count {
            let address_offset = scanner.pos();
            let name = scanner.read_string()?;
            let object = ObjectFileRef::read(&mut scanner)?;
            let address = Address {
                address_offset,
                name,
                object,
            };
            if !visitor.visit_address(region, location, &address)? {
                break;
            }
        }

        Ok(())
    }

    /// Materializes the ancestor chain of `region` as an owned map keyed by
    /// region offset, following parent offsets up to the root sentinel.
    pub fn resolve_admin_region_hierarchy(
        &self,
        region: &AdminRegion,
    ) -> Result<FxHashMap<FileOffset, Arc<AdminRegion>>> {
        let mut scanner = self.region_scanner.duplicate()?;
        let mut refs: FxHashMap<FileOffset, Arc<AdminRegion>> = FxHashMap::default();

        refs.insert(region.region_offset, Arc::new(region.clone()));

        let mut parent_offset = region.parent_region_offset;
        while parent_offset != ROOT_REGION_OFFSET {
            if refs.contains_key(&parent_offset) {
                return Err(CartaError::Corrupt(format!(
                    "admin region parent cycle at offset {parent_offset}"
                )));
            }
            let record = self.read_region(&mut scanner, parent_offset)?;
            parent_offset = record.region.parent_region_offset;
            refs.insert(record.region.region_offset, Arc::new(record.region));
        }

        Ok(refs)
    }

    pub fn dump_statistics(&self) {
        info!(
            file = LOCATION_IDX,
            roots = self.roots.len(),
            "location index statistics"
        );
    }
}

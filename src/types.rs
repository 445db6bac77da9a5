use rustc_hash::FxHashMap;

use crate::error::Result;
use crate::io::scanner::FileScanner;
use crate::io::writer::{put_string, put_var_u64};

pub type TagId = u16;
pub type TypeId = u16;

pub const TAG_IGNORE: TagId = 0;
pub const TYPE_IGNORE: TypeId = 0;

const SHAPE_NODE: u8 = 0x01;
const SHAPE_WAY: u8 = 0x02;
const SHAPE_AREA: u8 = 0x04;
const SHAPE_RELATION: u8 = 0x08;
const SHAPE_INDEXED: u8 = 0x10;

const ROUTE_FOOT: u8 = 0x01;
const ROUTE_BICYCLE: u8 = 0x02;
const ROUTE_CAR: u8 = 0x04;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Vehicle {
    Foot,
    Bicycle,
    Car,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagInfo {
    pub id: TagId,
    pub name: String,
}

/// Registry entry for one feature category: which tag/value pair selects it,
/// which shapes it may take and which vehicle classes can route over it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeInfo {
    pub id: TypeId,
    pub tag: TagId,
    pub tag_value: String,
    pub can_be_node: bool,
    pub can_be_way: bool,
    pub can_be_area: bool,
    pub can_be_relation: bool,
    pub can_route_foot: bool,
    pub can_route_bicycle: bool,
    pub can_route_car: bool,
    pub can_be_indexed: bool,
}

impl TypeInfo {
    pub fn new(id: TypeId, tag: TagId, tag_value: impl Into<String>) -> Self {
        Self {
            id,
            tag,
            tag_value: tag_value.into(),
            can_be_node: false,
            can_be_way: false,
            can_be_area: false,
            can_be_relation: false,
            can_route_foot: false,
            can_route_bicycle: false,
            can_route_car: false,
            can_be_indexed: false,
        }
    }

    pub fn node(mut self) -> Self {
        self.can_be_node = true;
        self
    }

    pub fn way(mut self) -> Self {
        self.can_be_way = true;
        self
    }

    pub fn area(mut self) -> Self {
        self.can_be_area = true;
        self
    }

    pub fn relation(mut self) -> Self {
        self.can_be_relation = true;
        self
    }

    pub fn indexed(mut self) -> Self {
        self.can_be_indexed = true;
        self
    }

    pub fn routable(mut self, vehicle: Vehicle) -> Self {
        match vehicle {
            Vehicle::Foot => self.can_route_foot = true,
            Vehicle::Bicycle => self.can_route_bicycle = true,
            Vehicle::Car => self.can_route_car = true,
        }
        self
    }

    pub fn can_route(&self, vehicle: Vehicle) -> bool {
        match vehicle {
            Vehicle::Foot => self.can_route_foot,
            Vehicle::Bicycle => self.can_route_bicycle,
            Vehicle::Car => self.can_route_car,
        }
    }
}

/// Append-only registry of tags and feature types, loaded once from
/// `types.dat` at open time and immutable afterwards.
#[derive(Debug, Default)]
pub struct TypeConfig {
    tags: Vec<TagInfo>,
    types: Vec<TypeInfo>,
    name_to_tag: FxHashMap<String, TagId>,
    tag_value_to_type: FxHashMap<(TagId, String), usize>,
    id_to_type: FxHashMap<TypeId, usize>,
    max_type_id: TypeId,
}

impl TypeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_tag(&mut self, id: TagId, name: impl Into<String>) -> &mut Self {
        let info = TagInfo {
            id,
            name: name.into(),
        };
        self.name_to_tag.insert(info.name.clone(), id);
        self.tags.push(info);
        self
    }

    pub fn register_type(&mut self, info: TypeInfo) -> &mut Self {
        self.max_type_id = self.max_type_id.max(info.id);
        self.tag_value_to_type
            .insert((info.tag, info.tag_value.clone()), self.types.len());
        self.id_to_type.insert(info.id, self.types.len());
        self.types.push(info);
        self
    }

    pub fn tag_id(&self, name: &str) -> TagId {
        self.name_to_tag.get(name).copied().unwrap_or(TAG_IGNORE)
    }

    pub fn type_info(&self, id: TypeId) -> Option<&TypeInfo> {
        self.id_to_type.get(&id).map(|&idx| &self.types[idx])
    }

    pub fn types(&self) -> impl Iterator<Item = &TypeInfo> {
        self.types.iter()
    }

    pub fn max_type_id(&self) -> TypeId {
        self.max_type_id
    }

    fn lookup(&self, tag: TagId, value: &str) -> Option<&TypeInfo> {
        self.tag_value_to_type
            .get(&(tag, value.to_owned()))
            .map(|&idx| &self.types[idx])
    }

    pub fn node_type_id(&self, tag: TagId, value: &str) -> TypeId {
        match self.lookup(tag, value) {
            Some(info) if info.can_be_node => info.id,
            _ => TYPE_IGNORE,
        }
    }

    pub fn way_type_id(&self, tag: TagId, value: &str) -> TypeId {
        match self.lookup(tag, value) {
            Some(info) if info.can_be_way => info.id,
            _ => TYPE_IGNORE,
        }
    }

    pub fn area_type_id(&self, tag: TagId, value: &str) -> TypeId {
        match self.lookup(tag, value) {
            Some(info) if info.can_be_area => info.id,
            _ => TYPE_IGNORE,
        }
    }

    pub fn relation_type_id(&self, tag: TagId, value: &str) -> TypeId {
        match self.lookup(tag, value) {
            Some(info) if info.can_be_relation => info.id,
            _ => TYPE_IGNORE,
        }
    }

    /// Types a vehicle of the given class may route over.
    pub fn routable_types(&self, vehicle: Vehicle) -> TypeSet {
        let mut set = TypeSet::new();
        for info in &self.types {
            if info.can_route(vehicle) {
                set.set_type(info.id);
            }
        }
        set
    }

    pub fn indexable_types(&self) -> TypeSet {
        let mut set = TypeSet::new();
        for info in &self.types {
            if info.can_be_indexed {
                set.set_type(info.id);
            }
        }
        set
    }

    pub fn read(scanner: &mut FileScanner) -> Result<Self> {
        let mut config = Self::new();

        let tag_count = scanner.read_var_u64()? as usize;
        for _ in 0..tag_count {
            let id = scanner.read_var_u16()?;
            let name = scanner.read_string()?;
            config.register_tag(id, name);
        }

        let type_count = scanner.read_var_u64()? as usize;
        for _ in 0..type_count {
            let id = scanner.read_var_u16()?;
            let tag = scanner.read_var_u16()?;
            let tag_value = scanner.read_string()?;
            let shapes = scanner.read_u8()?;
            let routes = scanner.read_u8()?;

            let mut info = TypeInfo::new(id, tag, tag_value);
            info.can_be_node = shapes & SHAPE_NODE != 0;
            info.can_be_way = shapes & SHAPE_WAY != 0;
            info.can_be_area = shapes & SHAPE_AREA != 0;
            info.can_be_relation = shapes & SHAPE_RELATION != 0;
            info.can_be_indexed = shapes & SHAPE_INDEXED != 0;
            info.can_route_foot = routes & ROUTE_FOOT != 0;
            info.can_route_bicycle = routes & ROUTE_BICYCLE != 0;
            info.can_route_car = routes & ROUTE_CAR != 0;
            config.register_type(info);
        }

        Ok(config)
    }

    pub fn encode(&self, buf: &mut Vec<u8>) {
        put_var_u64(buf, self.tags.len() as u64);
        for tag in &self.tags {
            put_var_u64(buf, u64::from(tag.id));
            put_string(buf, &tag.name);
        }

        put_var_u64(buf, self.types.len() as u64);
        for info in &self.types {
            put_var_u64(buf, u64::from(info.id));
            put_var_u64(buf, u64::from(info.tag));
            put_string(buf, &info.tag_value);

            let mut shapes = 0u8;
            if info.can_be_node {
                shapes |= SHAPE_NODE;
            }
            if info.can_be_way {
                shapes |= SHAPE_WAY;
            }
            if info.can_be_area {
                shapes |= SHAPE_AREA;
            }
            if info.can_be_relation {
                shapes |= SHAPE_RELATION;
            }
            if info.can_be_indexed {
                shapes |= SHAPE_INDEXED;
            }
            buf.push(shapes);

            let mut routes = 0u8;
            if info.can_route_foot {
                routes |= ROUTE_FOOT;
            }
            if info.can_route_bicycle {
                routes |= ROUTE_BICYCLE;
            }
            if info.can_route_car {
                routes |= ROUTE_CAR;
            }
            buf.push(routes);
        }
    }
}

/// Compact bitset over [`TypeId`], used as the query-side type filter.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TypeSet {
    bits: Vec<u64>,
}

impl TypeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn of(ids: impl IntoIterator<Item = TypeId>) -> Self {
        let mut set = Self::new();
        for id in ids {
            set.set_type(id);
        }
        set
    }

    pub fn set_type(&mut self, id: TypeId) {
        let word = id as usize / 64;
        if word >= self.bits.len() {
            self.bits.resize(word + 1, 0);
        }
        self.bits[word] |= 1u64 << (id as usize % 64);
    }

    pub fn unset_type(&mut self, id: TypeId) {
        let word = id as usize / 64;
        if word < self.bits.len() {
            self.bits[word] &= !(1u64 << (id as usize % 64));
        }
    }

    pub fn has_type(&self, id: TypeId) -> bool {
        let word = id as usize / 64;
        word < self.bits.len() && self.bits[word] & (1u64 << (id as usize % 64)) != 0
    }

    /// True when at least one type is set.
    pub fn has_types(&self) -> bool {
        self.bits.iter().any(|&word| word != 0)
    }

    pub fn clear(&mut self) {
        self.bits.clear();
    }

    pub fn types(&self) -> impl Iterator<Item = TypeId> + '_ {
        self.bits.iter().enumerate().flat_map(|(word_idx, &word)| {
            (0..64).filter_map(move |bit| {
                if word & (1u64 << bit) != 0 {
                    Some((word_idx * 64 + bit) as TypeId)
                } else {
                    None
                }
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> TypeConfig {
        let mut config = TypeConfig::new();
        config
            .register_tag(1, "highway")
            .register_tag(2, "place")
            .register_tag(3, "natural");
        config
            .register_type(
                TypeInfo::new(1, 1, "motorway")
                    .way()
                    .routable(Vehicle::Car),
            )
            .register_type(
                TypeInfo::new(2, 1, "footpath")
                    .way()
                    .routable(Vehicle::Foot),
            )
            .register_type(TypeInfo::new(3, 2, "city").node().area().indexed())
            .register_type(TypeInfo::new(4, 3, "water").area());
        config
    }

    #[test]
    fn registry_lookups() {
        let config = sample_config();
        assert_eq!(config.tag_id("highway"), 1);
        assert_eq!(config.tag_id("unknown"), TAG_IGNORE);
        assert_eq!(config.way_type_id(1, "motorway"), 1);
        assert_eq!(config.node_type_id(1, "motorway"), TYPE_IGNORE);
        assert_eq!(config.area_type_id(2, "city"), 3);
        assert_eq!(config.max_type_id(), 4);
    }

    #[test]
    fn routable_and_indexable_sets() {
        let config = sample_config();
        let car = config.routable_types(Vehicle::Car);
        assert!(car.has_type(1));
        assert!(!car.has_type(2));

        let foot = config.routable_types(Vehicle::Foot);
        assert!(foot.has_type(2));

        let indexable = config.indexable_types();
        assert!(indexable.has_type(3));
        assert!(!indexable.has_type(4));
    }

    #[test]
    fn type_set_operations() {
        let mut set = TypeSet::new();
        assert!(!set.has_types());
        set.set_type(3);
        set.set_type(130);
        assert!(set.has_types());
        assert!(set.has_type(3));
        assert!(set.has_type(130));
        assert!(!set.has_type(4));
        assert_eq!(set.types().collect::<Vec<_>>(), vec![3, 130]);
        set.unset_type(3);
        assert!(!set.has_type(3));
        assert_eq!(set.types().collect::<Vec<_>>(), vec![130]);
    }
}

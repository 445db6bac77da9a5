use std::fmt;

use crate::error::{CartaError, Result};
use crate::geom::{GeoBox, GeoCoord};
use crate::io::scanner::FileScanner;
use crate::io::writer::{put_coord, put_string, put_var_u64};
use crate::types::{TagId, TypeId};

/// Byte position inside one of the `.dat` files. Offsets are the stable
/// identity of stored entities.
pub type FileOffset = u64;

const REF_NONE: u8 = 0;
const REF_NODE: u8 = 1;
const REF_WAY: u8 = 2;
const REF_AREA: u8 = 3;

const ATTR_BRIDGE: u8 = 0x01;
const ATTR_TUNNEL: u8 = 0x02;
const ATTR_BUILDING: u8 = 0x04;
const ATTR_START_IS_JOINT: u8 = 0x08;
const ATTR_END_IS_JOINT: u8 = 0x10;
const ATTR_HAS_WIDTH: u8 = 0x20;
const ATTR_HAS_LAYER: u8 = 0x40;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RefType {
    None,
    Node,
    Way,
    Area,
}

impl fmt::Display for RefType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RefType::None => "none",
            RefType::Node => "node",
            RefType::Way => "way",
            RefType::Area => "area",
        };
        write!(f, "{name}")
    }
}

/// Typed reference to a stored entity: entity kind plus byte offset into the
/// kind's data file. `None` is the invalid sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum ObjectFileRef {
    #[default]
    None,
    Node(FileOffset),
    Way(FileOffset),
    Area(FileOffset),
}

impl ObjectFileRef {
    pub fn ref_type(&self) -> RefType {
        match self {
            ObjectFileRef::None => RefType::None,
            ObjectFileRef::Node(_) => RefType::Node,
            ObjectFileRef::Way(_) => RefType::Way,
            ObjectFileRef::Area(_) => RefType::Area,
        }
    }

    pub fn offset(&self) -> FileOffset {
        match self {
            ObjectFileRef::None => 0,
            ObjectFileRef::Node(offset)
            | ObjectFileRef::Way(offset)
            | ObjectFileRef::Area(offset) => *offset,
        }
    }

    pub fn is_valid(&self) -> bool {
        !matches!(self, ObjectFileRef::None)
    }

    pub(crate) fn read(scanner: &mut FileScanner) -> Result<Self> {
        let kind = scanner.read_u8()?;
        let offset = scanner.read_var_u64()?;
        match kind {
            REF_NONE => Ok(ObjectFileRef::None),
            REF_NODE => Ok(ObjectFileRef::Node(offset)),
            REF_WAY => Ok(ObjectFileRef::Way(offset)),
            REF_AREA => Ok(ObjectFileRef::Area(offset)),
            other => Err(CartaError::Corrupt(format!(
                "unknown object reference kind: 0x{other:02X}"
            ))),
        }
    }

    pub(crate) fn encode(&self, buf: &mut Vec<u8>) {
        let kind = match self {
            ObjectFileRef::None => REF_NONE,
            ObjectFileRef::Node(_) => REF_NODE,
            ObjectFileRef::Way(_) => REF_WAY,
            ObjectFileRef::Area(_) => REF_AREA,
        };
        buf.push(kind);
        put_var_u64(buf, self.offset());
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub key: TagId,
    pub value: String,
}

impl Tag {
    pub fn new(key: TagId, value: impl Into<String>) -> Self {
        Self {
            key,
            value: value.into(),
        }
    }

    fn read(scanner: &mut FileScanner) -> Result<Self> {
        let key = scanner.read_var_u16()?;
        let value = scanner.read_string()?;
        Ok(Self { key, value })
    }

    fn encode(&self, buf: &mut Vec<u8>) {
        put_var_u64(buf, u64::from(self.key));
        put_string(buf, &self.value);
    }
}

/// Per-segment rendering and topology attributes of a way or ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SegmentAttributes {
    pub is_bridge: bool,
    pub is_tunnel: bool,
    pub is_building: bool,
    pub start_is_joint: bool,
    pub end_is_joint: bool,
    /// Width in decimetres, when the source data carried one.
    pub width: Option<u8>,
    pub layer: i8,
}

impl SegmentAttributes {
    fn read(scanner: &mut FileScanner) -> Result<Self> {
        let flags = scanner.read_u8()?;
        let width = if flags & ATTR_HAS_WIDTH != 0 {
            Some(scanner.read_u8()?)
        } else {
            None
        };
        let layer = if flags & ATTR_HAS_LAYER != 0 {
            scanner.read_u8()? as i8
        } else {
            0
        };
        Ok(Self {
            is_bridge: flags & ATTR_BRIDGE != 0,
            is_tunnel: flags & ATTR_TUNNEL != 0,
            is_building: flags & ATTR_BUILDING != 0,
            start_is_joint: flags & ATTR_START_IS_JOINT != 0,
            end_is_joint: flags & ATTR_END_IS_JOINT != 0,
            width,
            layer,
        })
    }

    fn encode(&self, buf: &mut Vec<u8>) {
        let mut flags = 0u8;
        if self.is_bridge {
            flags |= ATTR_BRIDGE;
        }
        if self.is_tunnel {
            flags |= ATTR_TUNNEL;
        }
        if self.is_building {
            flags |= ATTR_BUILDING;
        }
        if self.start_is_joint {
            flags |= ATTR_START_IS_JOINT;
        }
        if self.end_is_joint {
            flags |= ATTR_END_IS_JOINT;
        }
        if self.width.is_some() {
            flags |= ATTR_HAS_WIDTH;
        }
        if self.layer != 0 {
            flags |= ATTR_HAS_LAYER;
        }
        buf.push(flags);
        if let Some(width) = self.width {
            buf.push(width);
        }
        if self.layer != 0 {
            buf.push(self.layer as u8);
        }
    }
}

/// Point feature.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub file_offset: FileOffset,
    pub type_id: TypeId,
    pub coord: GeoCoord,
    pub tags: Vec<Tag>,
}

impl Node {
    pub fn read(file_offset: FileOffset, scanner: &mut FileScanner) -> Result<Self> {
        let type_id = scanner.read_var_u16()?;
        let coord = scanner.read_coord()?;
        let tag_count = scanner.read_var_u64()? as usize;
        let mut tags = Vec::with_capacity(tag_count);
        for _ in 0..tag_count {
            tags.push(Tag::read(scanner)?);
        }
        Ok(Self {
            file_offset,
            type_id,
            coord,
            tags,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        put_var_u64(&mut buf, u64::from(self.type_id));
        put_coord(&mut buf, self.coord);
        put_var_u64(&mut buf, self.tags.len() as u64);
        for tag in &self.tags {
            tag.encode(&mut buf);
        }
        buf
    }
}

/// Ordered polyline feature.
#[derive(Debug, Clone, PartialEq)]
pub struct Way {
    pub file_offset: FileOffset,
    pub type_id: TypeId,
    pub attributes: SegmentAttributes,
    pub nodes: Vec<GeoCoord>,
}

impl Way {
    pub fn read(file_offset: FileOffset, scanner: &mut FileScanner) -> Result<Self> {
        let type_id = scanner.read_var_u16()?;
        let attributes = SegmentAttributes::read(scanner)?;
        let node_count = scanner.read_var_u64()? as usize;
        let mut nodes = Vec::with_capacity(node_count.min(1 << 16));
        for _ in 0..node_count {
            nodes.push(scanner.read_coord()?);
        }
        Ok(Self {
            file_offset,
            type_id,
            attributes,
            nodes,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        put_var_u64(&mut buf, u64::from(self.type_id));
        self.attributes.encode(&mut buf);
        put_var_u64(&mut buf, self.nodes.len() as u64);
        for coord in &self.nodes {
            put_coord(&mut buf, *coord);
        }
        buf
    }

    pub fn bounding_box(&self) -> GeoBox {
        GeoBox::covering(&self.nodes)
    }
}

/// One closed polyline of an area: the outer boundary
/// (`ring == Ring::OUTER`) or a hole.
#[derive(Debug, Clone, PartialEq)]
pub struct Ring {
    pub ring: u8,
    pub type_id: TypeId,
    pub attributes: SegmentAttributes,
    pub nodes: Vec<GeoCoord>,
}

impl Ring {
    pub const OUTER: u8 = 0;

    fn read(scanner: &mut FileScanner) -> Result<Self> {
        let ring = scanner.read_u8()?;
        let type_id = scanner.read_var_u16()?;
        let attributes = SegmentAttributes::read(scanner)?;
        let node_count = scanner.read_var_u64()? as usize;
        let mut nodes = Vec::with_capacity(node_count.min(1 << 16));
        for _ in 0..node_count {
            nodes.push(scanner.read_coord()?);
        }
        Ok(Self {
            ring,
            type_id,
            attributes,
            nodes,
        })
    }

    fn encode(&self, buf: &mut Vec<u8>) {
        buf.push(self.ring);
        put_var_u64(buf, u64::from(self.type_id));
        self.attributes.encode(buf);
        put_var_u64(buf, self.nodes.len() as u64);
        for coord in &self.nodes {
            put_coord(buf, *coord);
        }
    }
}

/// Polygonal feature: exactly one outer ring plus zero or more inner rings
/// describing holes.
#[derive(Debug, Clone, PartialEq)]
pub struct Area {
    pub file_offset: FileOffset,
    pub rings: Vec<Ring>,
}

impl Area {
    pub fn read(file_offset: FileOffset, scanner: &mut FileScanner) -> Result<Self> {
        let ring_count = scanner.read_var_u64()? as usize;
        if ring_count == 0 {
            return Err(CartaError::Corrupt("area without rings".into()));
        }
        let mut rings = Vec::with_capacity(ring_count.min(1 << 12));
        for _ in 0..ring_count {
            rings.push(Ring::read(scanner)?);
        }
        if rings.iter().filter(|r| r.ring == Ring::OUTER).count() != 1 {
            return Err(CartaError::Corrupt(
                "area must carry exactly one outer ring".into(),
            ));
        }
        Ok(Self { file_offset, rings })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        put_var_u64(&mut buf, self.rings.len() as u64);
        for ring in &self.rings {
            ring.encode(&mut buf);
        }
        buf
    }

    pub fn outer_ring(&self) -> &Ring {
        self.rings
            .iter()
            .find(|r| r.ring == Ring::OUTER)
            .expect("decoded area always has an outer ring")
    }

    pub fn type_id(&self) -> TypeId {
        self.outer_ring().type_id
    }

    pub fn bounding_box(&self) -> GeoBox {
        GeoBox::covering(&self.outer_ring().nodes)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroundTileKind {
    Land,
    Water,
    Coast,
}

/// Ground-state classification of one water-index tile. Coast tiles carry the
/// coastline polyline crossing them.
#[derive(Debug, Clone, PartialEq)]
pub struct GroundTile {
    pub kind: GroundTileKind,
    pub bbox: GeoBox,
    pub coast: Option<Vec<GeoCoord>>,
}

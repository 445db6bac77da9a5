//! Geographic primitives shared by the codec, the spatial indices and the
//! query layer.
//!
//! Coordinates are stored on disk as unsigned integers scaled by
//! [`CONVERSION_FACTOR`] and shifted into the positive range (+90 for
//! latitudes, +180 for longitudes). All in-memory arithmetic is plain
//! degree-valued `f64`.

/// Scale factor between degree values and their on-disk integer encoding.
pub const CONVERSION_FACTOR: f64 = 10_000_000.0;

const EARTH_RADIUS_METER: f64 = 6_371_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GeoCoord {
    pub lat: f64,
    pub lon: f64,
}

impl GeoCoord {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub(crate) fn to_scaled(self) -> (u32, u32) {
        let lat = ((self.lat + 90.0) * CONVERSION_FACTOR).round() as u32;
        let lon = ((self.lon + 180.0) * CONVERSION_FACTOR).round() as u32;
        (lat, lon)
    }

    pub(crate) fn from_scaled(lat: u32, lon: u32) -> Self {
        Self {
            lat: lat as f64 / CONVERSION_FACTOR - 90.0,
            lon: lon as f64 / CONVERSION_FACTOR - 180.0,
        }
    }
}

/// Axis-aligned bounding box in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GeoBox {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
}

impl GeoBox {
    pub fn new(min_lat: f64, min_lon: f64, max_lat: f64, max_lon: f64) -> Self {
        Self {
            min_lat: min_lat.min(max_lat),
            min_lon: min_lon.min(max_lon),
            max_lat: min_lat.max(max_lat),
            max_lon: min_lon.max(max_lon),
        }
    }

    /// Smallest box enclosing all of `coords`. Empty input yields the default
    /// (degenerate) box.
    pub fn covering(coords: &[GeoCoord]) -> Self {
        let mut iter = coords.iter();
        let first = match iter.next() {
            Some(first) => first,
            None => return Self::default(),
        };
        let mut result = Self {
            min_lat: first.lat,
            min_lon: first.lon,
            max_lat: first.lat,
            max_lon: first.lon,
        };
        for coord in iter {
            result.min_lat = result.min_lat.min(coord.lat);
            result.min_lon = result.min_lon.min(coord.lon);
            result.max_lat = result.max_lat.max(coord.lat);
            result.max_lon = result.max_lon.max(coord.lon);
        }
        result
    }

    pub fn contains(&self, coord: GeoCoord) -> bool {
        coord.lat >= self.min_lat
            && coord.lat <= self.max_lat
            && coord.lon >= self.min_lon
            && coord.lon <= self.max_lon
    }

    pub fn intersects(&self, other: &GeoBox) -> bool {
        self.min_lat <= other.max_lat
            && self.max_lat >= other.min_lat
            && self.min_lon <= other.max_lon
            && self.max_lon >= other.min_lon
    }
}

/// Zoom factor. Level `n` corresponds to a magnification of `2^n`; higher
/// levels show more detail over a smaller geographic extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Magnification {
    level: u32,
}

impl Magnification {
    pub fn from_level(level: u32) -> Self {
        Self { level }
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn magnification(&self) -> f64 {
        (1u64 << self.level.min(62)) as f64
    }
}

/// Ray-casting point-in-polygon test against a closed ring. The ring is given
/// as its vertex sequence; the closing edge back to the first vertex is
/// implied.
pub fn is_coord_in_area(coord: GeoCoord, ring: &[GeoCoord]) -> bool {
    if ring.len() < 3 {
        return false;
    }

    let mut inside = false;
    let mut j = ring.len() - 1;
    for i in 0..ring.len() {
        let pi = ring[i];
        let pj = ring[j];
        if (pi.lat > coord.lat) != (pj.lat > coord.lat) {
            let crossing_lon =
                (pj.lon - pi.lon) * (coord.lat - pi.lat) / (pj.lat - pi.lat) + pi.lon;
            if coord.lon < crossing_lon {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

fn orientation(p: GeoCoord, q: GeoCoord, r: GeoCoord) -> i8 {
    let cross = (q.lon - p.lon) * (r.lat - p.lat) - (q.lat - p.lat) * (r.lon - p.lon);
    if cross > 0.0 {
        1
    } else if cross < 0.0 {
        -1
    } else {
        0
    }
}

fn on_segment(p: GeoCoord, q: GeoCoord, r: GeoCoord) -> bool {
    q.lon >= p.lon.min(r.lon)
        && q.lon <= p.lon.max(r.lon)
        && q.lat >= p.lat.min(r.lat)
        && q.lat <= p.lat.max(r.lat)
}

/// True when segment `a1-a2` intersects segment `b1-b2`, touching included.
pub fn lines_intersect(a1: GeoCoord, a2: GeoCoord, b1: GeoCoord, b2: GeoCoord) -> bool {
    let o1 = orientation(a1, a2, b1);
    let o2 = orientation(a1, a2, b2);
    let o3 = orientation(b1, b2, a1);
    let o4 = orientation(b1, b2, a2);

    if o1 != o2 && o3 != o4 {
        return true;
    }

    (o1 == 0 && on_segment(a1, b1, a2))
        || (o2 == 0 && on_segment(a1, b2, a2))
        || (o3 == 0 && on_segment(b1, a1, b2))
        || (o4 == 0 && on_segment(b1, a2, b2))
}

/// True when the polyline or polygon `outline` lies at least partly inside the
/// closed ring `ring`: some vertex of one is inside the other, or any pair of
/// edges intersects.
pub fn is_area_at_least_partly_in_area(outline: &[GeoCoord], ring: &[GeoCoord]) -> bool {
    if outline.is_empty() || ring.len() < 3 {
        return false;
    }

    if outline.iter().any(|&coord| is_coord_in_area(coord, ring)) {
        return true;
    }
    if ring.iter().any(|&coord| is_coord_in_area(coord, outline)) {
        return true;
    }

    for i in 0..outline.len() {
        let a1 = outline[i];
        let a2 = outline[(i + 1) % outline.len()];
        for j in 0..ring.len() {
            let b1 = ring[j];
            let b2 = ring[(j + 1) % ring.len()];
            if lines_intersect(a1, a2, b1, b2) {
                return true;
            }
        }
    }

    false
}

/// Destination point `distance_meter` away from `(lat, lon)` along the given
/// compass bearing, on a spherical earth model.
pub fn ellipsoidal_destination(
    lat: f64,
    lon: f64,
    bearing_deg: f64,
    distance_meter: f64,
) -> GeoCoord {
    let lat1 = lat.to_radians();
    let lon1 = lon.to_radians();
    let bearing = bearing_deg.to_radians();
    let angular = distance_meter / EARTH_RADIUS_METER;

    let lat2 =
        (lat1.sin() * angular.cos() + lat1.cos() * angular.sin() * bearing.cos()).asin();
    let lon2 = lon1
        + (bearing.sin() * angular.sin() * lat1.cos())
            .atan2(angular.cos() - lat1.sin() * lat2.sin());

    GeoCoord::new(lat2.to_degrees(), lon2.to_degrees())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Vec<GeoCoord> {
        vec![
            GeoCoord::new(0.0, 0.0),
            GeoCoord::new(0.0, 10.0),
            GeoCoord::new(10.0, 10.0),
            GeoCoord::new(10.0, 0.0),
        ]
    }

    #[test]
    fn scaled_round_trip_is_exact_for_decimal_coords() {
        let coord = GeoCoord::new(48.5, 11.25);
        let (lat, lon) = coord.to_scaled();
        let back = GeoCoord::from_scaled(lat, lon);
        assert_eq!(back.lat, 48.5);
        assert_eq!(back.lon, 11.25);
    }

    #[test]
    fn point_in_polygon() {
        assert!(is_coord_in_area(GeoCoord::new(5.0, 5.0), &square()));
        assert!(!is_coord_in_area(GeoCoord::new(15.0, 5.0), &square()));
        assert!(!is_coord_in_area(GeoCoord::new(-1.0, -1.0), &square()));
    }

    #[test]
    fn polyline_crossing_polygon_is_partly_inside() {
        let crossing = vec![GeoCoord::new(5.0, -5.0), GeoCoord::new(5.0, 15.0)];
        assert!(is_area_at_least_partly_in_area(&crossing, &square()));

        let outside = vec![GeoCoord::new(20.0, 20.0), GeoCoord::new(25.0, 25.0)];
        assert!(!is_area_at_least_partly_in_area(&outside, &square()));
    }

    #[test]
    fn polygon_containing_ring_counts_as_partly_inside() {
        let big = vec![
            GeoCoord::new(-10.0, -10.0),
            GeoCoord::new(-10.0, 20.0),
            GeoCoord::new(20.0, 20.0),
            GeoCoord::new(20.0, -10.0),
        ];
        assert!(is_area_at_least_partly_in_area(&big, &square()));
    }

    #[test]
    fn destination_moves_in_bearing_direction() {
        let north = ellipsoidal_destination(48.0, 11.0, 0.0, 10_000.0);
        assert!(north.lat > 48.0);
        assert!((north.lon - 11.0).abs() < 1e-6);

        let north_west = ellipsoidal_destination(48.0, 11.0, 315.0, 10_000.0);
        assert!(north_west.lat > 48.0);
        assert!(north_west.lon < 11.0);
    }

    #[test]
    fn geo_box_predicates() {
        let bbox = GeoBox::new(48.0, 11.0, 48.5, 11.5);
        assert!(bbox.contains(GeoCoord::new(48.2, 11.2)));
        assert!(!bbox.contains(GeoCoord::new(47.9, 11.2)));
        assert!(bbox.intersects(&GeoBox::new(48.4, 11.4, 49.0, 12.0)));
        assert!(!bbox.intersects(&GeoBox::new(50.0, 11.0, 51.0, 12.0)));
    }
}

//! Regions of interest.

use crate::SlideruleError;
use geo::{
    geometry::{Coord, Geometry, LineString, MultiPoint, Point, Polygon},
    ConvexHull, Simplify,
};
use geojson::{quick_collection, GeoJson};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

/// Default raster mask cell size, degrees.
pub const DEFAULT_CELLSIZE: f64 = 0.01;

/// A polygon vertex as the service expects it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    pub lon: f64,
    pub lat: f64,
}

impl From<Coord<f64>> for LatLon {
    fn from(Coord { x, y }: Coord<f64>) -> Self {
        Self { lon: x, lat: y }
    }
}

impl From<LatLon> for Coord<f64> {
    fn from(LatLon { lon, lat }: LatLon) -> Self {
        Coord { x: lon, y: lat }
    }
}

/// A GeoJSON document the service rasterizes to refine a polygon
/// filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RasterMask {
    pub geojson: String,
    pub length: usize,
    pub cellsize: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    /// Closed, counter-clockwise convex hull of the source polygons.
    pub poly: Vec<LatLon>,

    pub raster: RasterMask,
}

impl Region {
    /// Reads polygons from the GeoJSON file at `path`.
    pub fn from_geojson<P: AsRef<Path>>(path: P, tolerance: f64) -> Result<Self, SlideruleError> {
        let contents = fs::read_to_string(&path)?;
        Self::parse(contents, tolerance)
            .map_err(|e| match e {
                SlideruleError::Region(_) => {
                    SlideruleError::Region(path.as_ref().display().to_string())
                }
                e => e,
            })
    }

    pub fn from_geojson_str(geojson: &str, tolerance: f64) -> Result<Self, SlideruleError> {
        Self::parse(geojson.to_owned(), tolerance)
    }

    /// This region's polygon filter as a geometry.
    pub fn polygon(&self) -> Polygon<f64> {
        let exterior: LineString<f64> = self.poly.iter().copied().map(Coord::from).collect();
        Polygon::new(exterior, vec![])
    }
}

impl Region {
    fn parse(contents: String, tolerance: f64) -> Result<Self, SlideruleError> {
        let geojson: GeoJson = contents.parse()?;
        let collection: geo::GeometryCollection<f64> = quick_collection(&geojson)?;

        let mut vertices: Vec<Point<f64>> = Vec::new();
        for geometry in collection {
            match geometry {
                Geometry::Polygon(polygon) => vertices.extend(polygon.exterior().points()),
                Geometry::MultiPolygon(polygons) => {
                    for polygon in polygons {
                        vertices.extend(polygon.exterior().points());
                    }
                }
                _ => (),
            }
        }
        if vertices.is_empty() {
            return Err(SlideruleError::Region("geojson".to_owned()));
        }

        let mut hull = MultiPoint::from(vertices).convex_hull();
        if tolerance > 0.0 {
            hull = hull.simplify(&tolerance);
        }
        let poly = hull.exterior().coords().copied().map(LatLon::from).collect();

        let raster = RasterMask {
            length: contents.len(),
            geojson: contents,
            cellsize: DEFAULT_CELLSIZE,
        };
        Ok(Self { poly, raster })
    }
}

#[cfg(test)]
mod tests {
    use super::{LatLon, Region};
    use crate::SlideruleError;
    use geo::{algorithm::Area, Intersects, Point};
    use std::path::PathBuf;

    fn grandmesa() -> PathBuf {
        [env!("CARGO_MANIFEST_DIR"), "..", "data", "grandmesa.geojson"]
            .iter()
            .collect()
    }

    #[test]
    fn test_region_is_closed_ccw_hull() {
        let region = Region::from_geojson(grandmesa(), 0.0).unwrap();
        assert!(region.poly.len() >= 4);
        assert_eq!(region.poly.first(), region.poly.last());
        let polygon = region.polygon();
        assert!(polygon.signed_area() > 0.0);
        // Hull covers every source vertex.
        for (lon, lat) in [
            (-108.311_682_565_537_67, 39.137_576_462_129_44),
            (-108.043_537_029_339_21, 39.104_051_357_064_62),
            (-107.728_398_587_557_52, 39.015_109_302_306_33),
        ] {
            assert!(polygon.intersects(&Point::new(lon, lat)));
        }
        assert_eq!(region.raster.length, region.raster.geojson.len());
        assert!(region.raster.geojson.contains("Grand Mesa"));
    }

    #[test]
    fn test_concave_vertices_dropped() {
        let geojson = r#"{
            "type": "Polygon",
            "coordinates": [[[0, 0], [2, 0], [2, 2], [1, 1], [0, 2], [0, 0]]]
        }"#;
        let region = Region::from_geojson_str(geojson, 0.0).unwrap();
        assert_eq!(region.poly.len(), 5);
        assert!(!region.poly.contains(&LatLon { lon: 1.0, lat: 1.0 }));
    }

    #[test]
    fn test_no_polygons() {
        let geojson = r#"{ "type": "Point", "coordinates": [1.0, 2.0] }"#;
        assert!(matches!(
            Region::from_geojson_str(geojson, 0.0),
            Err(SlideruleError::Region(_))
        ));
    }
}

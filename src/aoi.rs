//! Area-of-interest loading.
//!
//! The boundary polygon comes from a shapefile or, with the `gdal` feature,
//! a file-geodatabase feature class. It is handed to the database as 2D
//! little-endian WKB plus an EPSG code.

use std::fs;
use std::path::{Path, PathBuf};

use geo::{Area, Coord, LineString, MultiPolygon, Polygon};
use once_cell::sync::Lazy;
use regex::Regex;
use shapefile::record::traits::HasXY;
use shapefile::{PolygonRing, Shape, ShapeReader};

use crate::catalog::{BindSet, BindValue};
use crate::error::{ReportError, Result};
use crate::utils::short_fingerprint;

pub const WKB_BIND: &str = "wkb_aoi";
pub const SRID_BIND: &str = "srid";

const WKB_LITTLE_ENDIAN: u8 = 1;
const WKB_POLYGON: u32 = 3;
const WKB_MULTIPOLYGON: u32 = 6;

static EPSG_AUTHORITY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"AUTHORITY\s*\[\s*"EPSG"\s*,\s*"?(\d+)"?\s*\]"#).expect("authority pattern")
});
static WKT_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^\s*(?:PROJCS|GEOGCS)\s*\[\s*"([^"]+)""#).expect("name pattern"));

/// Coordinate-system names written by ESRI tools without an authority clause.
const KNOWN_SPATIAL_REFERENCES: &[(&str, i32)] = &[
    ("NAD_1983_BC_Environment_Albers", 3005),
    ("NAD83 / BC Albers", 3005),
    ("GCS_WGS_1984", 4326),
    ("WGS 84", 4326),
    ("GCS_North_American_1983", 4269),
    ("NAD_1983_UTM_Zone_10N", 26910),
    ("NAD_1983_UTM_Zone_11N", 26911),
    ("WGS_1984_Web_Mercator_Auxiliary_Sphere", 3857),
];

#[derive(Debug, Clone, PartialEq, Eq)]
enum AoiSource {
    Shapefile(PathBuf),
    FeatureClass { gdb: PathBuf, layer: String },
}

fn classify(path: &Path) -> Result<AoiSource> {
    let is_shp = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("shp"));
    if is_shp {
        return Ok(AoiSource::Shapefile(path.to_path_buf()));
    }

    let gdb = path.ancestors().skip(1).find(|ancestor| {
        ancestor
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("gdb"))
    });
    if let (Some(gdb), Some(layer)) = (gdb, path.file_name().and_then(|name| name.to_str())) {
        return Ok(AoiSource::FeatureClass {
            gdb: gdb.to_path_buf(),
            layer: layer.to_string(),
        });
    }

    Err(ReportError::format(
        path,
        "Format not recognized. Please provide a shp or featureclass (gdb)",
    ))
}

/// The loaded boundary and the artifacts derived from it.
#[derive(Debug, Clone, PartialEq)]
pub struct AreaOfInterest {
    source: PathBuf,
    polygons: MultiPolygon<f64>,
    srid: i32,
    wkb: Vec<u8>,
}

impl AreaOfInterest {
    /// Loads the first polygon feature of `path`.
    ///
    /// `srid_override` wins over whatever the file declares.
    pub fn load(path: &Path, srid_override: Option<i32>) -> Result<Self> {
        let (polygons, declared) = match classify(path)? {
            AoiSource::Shapefile(shp) => read_shapefile(&shp)?,
            AoiSource::FeatureClass { gdb, layer } => read_feature_class(path, &gdb, &layer)?,
        };
        let srid = srid_override
            .or(declared)
            .ok_or_else(|| ReportError::UnknownSpatialReference {
                path: path.to_path_buf(),
            })?;

        let aoi = Self::from_polygons(path, polygons, srid);
        tracing::info!(
            path = %path.display(),
            srid = aoi.srid,
            polygons = aoi.polygons.0.len(),
            area_ha = aoi.area_ha(),
            fingerprint = %aoi.fingerprint(),
            "area of interest loaded"
        );
        Ok(aoi)
    }

    pub fn from_polygons(source: impl Into<PathBuf>, polygons: MultiPolygon<f64>, srid: i32) -> Self {
        let wkb = encode_wkb(&polygons);
        Self {
            source: source.into(),
            polygons,
            srid,
            wkb,
        }
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn polygons(&self) -> &MultiPolygon<f64> {
        &self.polygons
    }

    pub fn srid(&self) -> i32 {
        self.srid
    }

    pub fn wkb(&self) -> &[u8] {
        &self.wkb
    }

    /// Planar area in the units of the coordinate system (m² for projected systems).
    pub fn area_m2(&self) -> f64 {
        self.polygons.unsigned_area()
    }

    pub fn area_ha(&self) -> f64 {
        self.area_m2() / 10_000.0
    }

    pub fn fingerprint(&self) -> String {
        short_fingerprint(&self.wkb)
    }

    /// The `:wkb_aoi` and `:srid` bind values.
    pub fn binds(&self) -> BindSet {
        let mut binds = BindSet::new();
        binds.insert(WKB_BIND.to_string(), BindValue::Bytes(self.wkb.clone()));
        binds.insert(SRID_BIND.to_string(), BindValue::Int(self.srid));
        binds
    }
}

fn read_shapefile(path: &Path) -> Result<(MultiPolygon<f64>, Option<i32>)> {
    let mut reader =
        ShapeReader::from_path(path).map_err(|error| ReportError::format(path, error.to_string()))?;

    let mut found = None;
    for shape in reader.iter_shapes() {
        let shape = shape.map_err(|error| ReportError::format(path, error.to_string()))?;
        let polygons = match shape {
            Shape::Polygon(polygon) => group_rings(polygon.rings()),
            Shape::PolygonM(polygon) => group_rings(polygon.rings()),
            Shape::PolygonZ(polygon) => group_rings(polygon.rings()),
            _ => continue,
        };
        if !polygons.0.is_empty() {
            found = Some(polygons);
            break;
        }
    }
    let polygons = found.ok_or_else(|| ReportError::NoPolygon {
        path: path.to_path_buf(),
    })?;

    let prj = path.with_extension("prj");
    let srid = if prj.exists() {
        let wkt = fs::read_to_string(&prj)?;
        srid_from_wkt(&wkt)
    } else {
        tracing::debug!(path = %prj.display(), "no projection sidecar");
        None
    };
    Ok((polygons, srid))
}

/// Each outer ring starts a polygon; inner rings attach to the outer ring before them.
fn group_rings<P: HasXY>(rings: &[PolygonRing<P>]) -> MultiPolygon<f64> {
    let to_line = |points: &[P]| -> LineString<f64> {
        points
            .iter()
            .map(|point| Coord {
                x: point.x(),
                y: point.y(),
            })
            .collect()
    };

    let mut polygons: Vec<Polygon<f64>> = Vec::new();
    for ring in rings {
        match ring {
            PolygonRing::Outer(points) => polygons.push(Polygon::new(to_line(points), Vec::new())),
            PolygonRing::Inner(points) => match polygons.last_mut() {
                Some(polygon) => polygon.interiors_push(to_line(points)),
                None => polygons.push(Polygon::new(to_line(points), Vec::new())),
            },
        }
    }
    MultiPolygon::new(polygons)
}

/// Resolves an EPSG code from projection WKT, preferring an explicit authority.
pub fn srid_from_wkt(wkt: &str) -> Option<i32> {
    if let Some(code) = EPSG_AUTHORITY
        .captures_iter(wkt)
        .last()
        .and_then(|caps| caps[1].parse().ok())
    {
        return Some(code);
    }
    let name = WKT_NAME.captures(wkt)?;
    KNOWN_SPATIAL_REFERENCES
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(&name[1]))
        .map(|(_, code)| *code)
}

#[cfg(feature = "gdal")]
fn read_feature_class(path: &Path, gdb: &Path, layer: &str) -> Result<(MultiPolygon<f64>, Option<i32>)> {
    use gdal::Dataset;
    use gdal::vector::LayerAccess;

    let dataset = Dataset::open(gdb).map_err(|error| ReportError::format(path, error.to_string()))?;
    let mut layer = dataset
        .layer_by_name(layer)
        .map_err(|error| ReportError::format(path, error.to_string()))?;
    let srid = layer.spatial_ref().and_then(|srs| srs.auth_code().ok());

    for feature in layer.features() {
        let Some(geometry) = feature.geometry() else {
            continue;
        };
        let geometry = geometry
            .to_geo()
            .map_err(|error| ReportError::format(path, error.to_string()))?;
        let polygons = match geometry {
            geo::Geometry::Polygon(polygon) => MultiPolygon::new(vec![polygon]),
            geo::Geometry::MultiPolygon(polygons) => polygons,
            _ => continue,
        };
        if !polygons.0.is_empty() {
            return Ok((polygons, srid));
        }
    }
    Err(ReportError::NoPolygon {
        path: path.to_path_buf(),
    })
}

#[cfg(not(feature = "gdal"))]
fn read_feature_class(path: &Path, _gdb: &Path, _layer: &str) -> Result<(MultiPolygon<f64>, Option<i32>)> {
    Err(ReportError::format(
        path,
        "file geodatabase input needs the `gdal` feature",
    ))
}

fn encode_wkb(polygons: &MultiPolygon<f64>) -> Vec<u8> {
    let mut out = Vec::new();
    match polygons.0.as_slice() {
        [polygon] if polygon.interiors().is_empty() => write_polygon(&mut out, polygon),
        many => {
            out.push(WKB_LITTLE_ENDIAN);
            out.extend_from_slice(&WKB_MULTIPOLYGON.to_le_bytes());
            out.extend_from_slice(&(many.len() as u32).to_le_bytes());
            for polygon in many {
                write_polygon(&mut out, polygon);
            }
        }
    }
    out
}

fn write_polygon(out: &mut Vec<u8>, polygon: &Polygon<f64>) {
    out.push(WKB_LITTLE_ENDIAN);
    out.extend_from_slice(&WKB_POLYGON.to_le_bytes());
    let rings = 1 + polygon.interiors().len();
    out.extend_from_slice(&(rings as u32).to_le_bytes());
    for ring in std::iter::once(polygon.exterior()).chain(polygon.interiors()) {
        out.extend_from_slice(&(ring.0.len() as u32).to_le_bytes());
        for coord in &ring.0 {
            out.extend_from_slice(&coord.x.to_le_bytes());
            out.extend_from_slice(&coord.y.to_le_bytes());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use geo::polygon;

    const BC_ALBERS_ESRI: &str = r#"PROJCS["NAD_1983_BC_Environment_Albers",GEOGCS["GCS_North_American_1983",DATUM["D_North_American_1983",SPHEROID["GRS_1980",6378137.0,298.257222101]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]],PROJECTION["Albers"],UNIT["Meter",1.0]]"#;

    #[test]
    fn classifies_inputs() {
        assert_eq!(
            classify(Path::new("data/nicolaWS_bcAlbers.shp")).unwrap(),
            AoiSource::Shapefile(PathBuf::from("data/nicolaWS_bcAlbers.shp"))
        );
        assert_eq!(
            classify(Path::new("data/aoi.gdb/watershed")).unwrap(),
            AoiSource::FeatureClass {
                gdb: PathBuf::from("data/aoi.gdb"),
                layer: "watershed".into()
            }
        );
        assert_matches!(
            classify(Path::new("data/aoi.geojson")),
            Err(ReportError::Format { message, .. }) if message.starts_with("Format not recognized")
        );
    }

    #[test]
    fn srid_from_authority_or_name() {
        assert_eq!(srid_from_wkt(BC_ALBERS_ESRI), Some(3005));
        let ogc = r#"PROJCS["NAD83 / UTM zone 10N",GEOGCS["NAD83",AUTHORITY["EPSG","4269"]],AUTHORITY["EPSG","26910"]]"#;
        assert_eq!(srid_from_wkt(ogc), Some(26910));
        assert_eq!(srid_from_wkt(r#"PROJCS["Local_Grid"]"#), None);
    }

    #[test]
    fn single_polygon_encodes_as_polygon_wkb() {
        let square = polygon![(x: 0.0, y: 0.0), (x: 100.0, y: 0.0), (x: 100.0, y: 100.0), (x: 0.0, y: 100.0), (x: 0.0, y: 0.0)];
        let aoi = AreaOfInterest::from_polygons("square.shp", MultiPolygon::new(vec![square]), 3005);
        let wkb = aoi.wkb();
        assert_eq!(wkb[0], 1);
        assert_eq!(u32::from_le_bytes(wkb[1..5].try_into().unwrap()), WKB_POLYGON);
        // header 9 + point count 4 + 5 points * 16
        assert_eq!(wkb.len(), 9 + 4 + 5 * 16);
        assert_eq!(aoi.area_m2(), 10_000.0);
        assert_eq!(aoi.area_ha(), 1.0);
    }

    #[test]
    fn multiple_polygons_encode_as_multipolygon() {
        let a = polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0), (x: 0.0, y: 0.0)];
        let b = polygon![(x: 5.0, y: 5.0), (x: 6.0, y: 5.0), (x: 6.0, y: 6.0), (x: 5.0, y: 5.0)];
        let aoi = AreaOfInterest::from_polygons("two.shp", MultiPolygon::new(vec![a, b]), 3005);
        assert_eq!(u32::from_le_bytes(aoi.wkb()[1..5].try_into().unwrap()), WKB_MULTIPOLYGON);
        assert_eq!(u32::from_le_bytes(aoi.wkb()[5..9].try_into().unwrap()), 2);
    }

    #[test]
    fn binds_carry_wkb_and_srid() {
        let square = polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0), (x: 0.0, y: 0.0)];
        let aoi = AreaOfInterest::from_polygons("a.shp", MultiPolygon::new(vec![square]), 3005);
        let binds = aoi.binds();
        assert_eq!(binds.get(SRID_BIND), Some(&BindValue::Int(3005)));
        assert_matches!(binds.get(WKB_BIND), Some(BindValue::Bytes(bytes)) if bytes == aoi.wkb());
    }

    #[test]
    fn inner_rings_attach_to_preceding_outer_ring() {
        use shapefile::Point;
        let rings = vec![
            PolygonRing::Outer(vec![Point::new(0.0, 0.0), Point::new(0.0, 10.0), Point::new(10.0, 10.0), Point::new(0.0, 0.0)]),
            PolygonRing::Inner(vec![Point::new(1.0, 1.0), Point::new(2.0, 1.0), Point::new(2.0, 2.0), Point::new(1.0, 1.0)]),
            PolygonRing::Outer(vec![Point::new(20.0, 20.0), Point::new(20.0, 30.0), Point::new(30.0, 30.0), Point::new(20.0, 20.0)]),
        ];
        let polygons = group_rings(&rings);
        assert_eq!(polygons.0.len(), 2);
        assert_eq!(polygons.0[0].interiors().len(), 1);
        assert!(polygons.0[1].interiors().is_empty());
    }
}

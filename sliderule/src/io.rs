//! Saving and restoring result tables.
//!
//! Tables are written either as netCDF, one variable per column along a
//! `delta_time` dimension, or as a JSON document. Both carry CF-style
//! variable attributes, the request parameters that shaped the result
//! and the polygons it was requested for.

use crate::{icesat2::TIME, parms::Parms, region::LatLon, table::Table, SlideruleError};
use chrono::Utc;
use log::debug;
use netcdf::{types::NcVariableType, AttributeValue};
use polars::prelude::{NamedFrom, Series};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value as Json};
use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::Path,
};

pub const TITLE: &str = "ATLAS/ICESat-2 SlideRule Height";
pub const REFERENCE: &str = "https://doi.org/10.5281/zenodo.5484048";

/// Seconds in `delta_time` count from 2018-01-01T00:00:00Z, the ATLAS
/// data product epoch, here in Unix nanoseconds.
const ATLAS_SDP_EPOCH_NS: i64 = 1_514_764_800_000_000_000;

const TIME_DIMENSION: &str = "delta_time";

/// Marks undefined integers in netCDF variables.
const INT_FILL: i64 = i64::MIN;

/// Request parameters recorded alongside the data.
const RECORDED_PARMS: [&str; 10] = [
    "H_min_win",
    "atl08_class",
    "ats",
    "cnf",
    "cnt",
    "len",
    "maxi",
    "res",
    "sigma_r_max",
    "srt",
];

#[derive(Debug, Serialize, Deserialize)]
struct Document {
    attributes: FileAttributes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    index: Option<String>,
    variables: Vec<Variable>,
}

#[derive(Debug, Serialize, Deserialize)]
struct FileAttributes {
    #[serde(rename = "featureType")]
    feature_type: String,
    title: String,
    reference: String,
    date_created: String,
    geospatial_lat_units: String,
    geospatial_lon_units: String,
    geospatial_ellipsoid: String,
    date_type: String,
    time_type: String,
    #[serde(default)]
    parameters: Map<String, Json>,
    #[serde(default)]
    regions: Vec<RegionCoordinates>,
}

/// A polygon as parallel longitude and latitude arrays.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct RegionCoordinates {
    x: Vec<f64>,
    y: Vec<f64>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Variable {
    name: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    attributes: Map<String, Json>,
    data: Data,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "values", rename_all = "lowercase")]
enum Data {
    Float(Vec<Option<f64>>),
    Int(Vec<Option<i64>>),
    Text(Vec<Option<String>>),
}

impl Data {
    fn read(table: &Table, name: &str) -> Result<Self, SlideruleError> {
        let dtype = table.column(name)?.dtype();
        if dtype.is_float() {
            Ok(Self::Float(table.f64_values(name)?))
        } else if dtype.is_integer() {
            Ok(Self::Int(table.i64_values(name)?))
        } else {
            Ok(Self::Text(table.str_values(name)?))
        }
    }

    fn into_series(self, name: &str) -> Series {
        match self {
            Self::Float(v) => Series::new(name.into(), v),
            Self::Int(v) => Series::new(name.into(), v),
            Self::Text(v) => Series::new(name.into(), v),
        }
    }
}

/// Known attributes of the service's output variables.
fn variable_attributes(name: &str) -> Map<String, Json> {
    let coordinates = "latitude longitude";
    let attrs = match name {
        "segment_id" => json!({
            "long_name": "Along-track segment ID number",
            "coordinates": coordinates,
        }),
        "delta_time" => json!({
            "units": "seconds since 2018-01-01",
            "long_name": "Elapsed GPS seconds",
            "standard_name": "time",
            "calendar": "standard",
            "coordinates": coordinates,
        }),
        "latitude" => json!({
            "units": "degrees_north",
            "long_name": "Latitude",
            "standard_name": "latitude",
            "valid_min": -90.0,
            "valid_max": 90.0,
        }),
        "longitude" => json!({
            "units": "degrees_east",
            "long_name": "Longitude",
            "standard_name": "longitude",
            "valid_min": -180.0,
            "valid_max": 180.0,
        }),
        "h_mean" => json!({ "units": "meters", "long_name": "Height Mean", "coordinates": coordinates }),
        "h_sigma" => json!({ "units": "meters", "long_name": "Height Error", "coordinates": coordinates }),
        "rms_misfit" => json!({ "units": "meters", "long_name": "RMS of fit", "coordinates": coordinates }),
        "dh_fit_dx" => json!({
            "units": "meters/meters",
            "contentType": "modelResult",
            "long_name": "Along Track Slope",
            "coordinates": coordinates,
        }),
        "dh_fit_dy" => json!({
            "units": "meters/meters",
            "long_name": "Across Track Slope",
            "coordinates": coordinates,
        }),
        "n_fit_photons" => json!({
            "units": "1",
            "long_name": "Number of Photons in Fit",
            "coordinates": coordinates,
        }),
        "w_surface_window_final" => json!({
            "units": "meters",
            "long_name": "Surface Window Width",
            "coordinates": coordinates,
        }),
        "h_robust_sprd" => json!({ "units": "meters", "long_name": "Robust Spread", "coordinates": coordinates }),
        "cycle" => json!({ "long_name": "Orbital cycle", "coordinates": coordinates }),
        "rgt" => json!({ "long_name": "Reference Ground Track", "coordinates": coordinates }),
        "gt" => json!({
            "long_name": "Ground track identifier",
            "flag_values": [10, 20, 30, 40, 50, 60],
            "flag_meanings": "GT1L, GT1R, GT2L, GT2R, GT3L, GT3R",
            "valid_min": 10,
            "valid_max": 60,
        }),
        "spot" => json!({
            "long_name": "ATLAS spot number",
            "coordinates": coordinates,
            "valid_min": 1,
            "valid_max": 6,
        }),
        "pflags" => json!({
            "long_name": "Processing Flags",
            "coordinates": coordinates,
            "flag_values": [0, 1, 2, 4],
            "flag_meanings": "valid, spread too short, too few photons, max iterations reached",
            "valid_min": 0,
            "valid_max": 4,
        }),
        _ => return Map::new(),
    };
    match attrs {
        Json::Object(map) => map,
        _ => Map::new(),
    }
}

/// Writes `table` to `path`.
///
/// `parms` contributes the fitting parameters that shaped the result;
/// each of `regions` is stored as parallel coordinate arrays.
pub fn to_json<P: AsRef<Path>>(
    table: &Table,
    path: P,
    parms: Option<&Parms>,
    regions: &[Vec<LatLon>],
) -> Result<(), SlideruleError> {
    let document = Document {
        attributes: FileAttributes {
            feature_type: "trajectory".to_owned(),
            title: TITLE.to_owned(),
            reference: REFERENCE.to_owned(),
            date_created: Utc::now().to_rfc3339(),
            geospatial_lat_units: "degrees_north".to_owned(),
            geospatial_lon_units: "degrees_east".to_owned(),
            geospatial_ellipsoid: "WGS84".to_owned(),
            date_type: "UTC".to_owned(),
            time_type: "CCSDS UTC-A".to_owned(),
            parameters: recorded_parameters(parms)?,
            regions: regions
                .iter()
                .map(|poly| RegionCoordinates {
                    x: poly.iter().map(|p| p.lon).collect(),
                    y: poly.iter().map(|p| p.lat).collect(),
                })
                .collect(),
        },
        index: table.index_name().map(str::to_owned),
        variables: table
            .names()
            .map(|name| {
                Ok(Variable {
                    name: name.to_owned(),
                    attributes: variable_attributes(name),
                    data: Data::read(table, name)?,
                })
            })
            .collect::<Result<_, SlideruleError>>()?,
    };

    let mut wtr = BufWriter::new(File::create(path.as_ref())?);
    serde_json::to_writer(&mut wtr, &document)?;
    wtr.flush()?;
    debug!(
        "wrote {} rows of {} variables to {}",
        table.len(),
        document.variables.len(),
        path.as_ref().display()
    );
    Ok(())
}

/// Reads a table written by [to_json].
pub fn from_json<P: AsRef<Path>>(path: P) -> Result<Table, SlideruleError> {
    let rdr = BufReader::new(File::open(path)?);
    let document: Document = serde_json::from_reader(rdr)?;
    let mut table = Table::new();
    for variable in document.variables {
        let series = variable.data.into_series(&variable.name);
        table.push_column(variable.name, series)?;
    }
    if let Some(index) = document.index {
        table.set_index(&index)?;
    }
    Ok(table)
}

/// The subset of `parms` recorded with exported data.
fn recorded_parameters(parms: Option<&Parms>) -> Result<Map<String, Json>, SlideruleError> {
    let mut parameters = Map::new();
    if let Some(parms) = parms {
        if let Json::Object(all) = serde_json::to_value(parms)? {
            for key in RECORDED_PARMS {
                if let Some(value) = all.get(key) {
                    parameters.insert(key.to_owned(), value.clone());
                }
            }
        }
    }
    Ok(parameters)
}

fn attribute_value(value: &Json) -> Option<AttributeValue> {
    match value {
        Json::String(s) => Some(AttributeValue::Str(s.clone())),
        Json::Number(n) => n
            .as_i64()
            .map(AttributeValue::Longlong)
            .or_else(|| n.as_f64().map(AttributeValue::Double)),
        Json::Array(items) => {
            if let Some(ints) = items.iter().map(Json::as_i64).collect::<Option<Vec<_>>>() {
                Some(AttributeValue::Longlongs(ints))
            } else if let Some(floats) = items.iter().map(Json::as_f64).collect::<Option<Vec<_>>>() {
                Some(AttributeValue::Doubles(floats))
            } else {
                items
                    .iter()
                    .map(|item| item.as_str().map(str::to_owned))
                    .collect::<Option<Vec<_>>>()
                    .map(AttributeValue::Strs)
            }
        }
        _ => None,
    }
}

/// Writes `table` to `path` as netCDF.
///
/// A table indexed by `time` is stored along `delta_time`, seconds
/// since the ATLAS epoch, in place of its index column. Undefined
/// floats are written as NaN, undefined integers as [INT_FILL] and
/// undefined strings as empty strings.
pub fn to_nc<P: AsRef<Path>>(
    table: &Table,
    path: P,
    parms: Option<&Parms>,
    regions: &[Vec<LatLon>],
) -> Result<(), SlideruleError> {
    let path = path.as_ref();
    let mut file = netcdf::create(path)?;
    file.add_dimension(TIME_DIMENSION, table.len())?;

    let time_index = table.index_name() == Some(TIME) && !table.contains(TIME_DIMENSION);
    if time_index {
        #[allow(clippy::cast_precision_loss)]
        let delta_time: Vec<f64> = table
            .i64_values(TIME)?
            .into_iter()
            .map(|t| t.map_or(f64::NAN, |t| (t - ATLAS_SDP_EPOCH_NS) as f64 / 1e9))
            .collect();
        let mut var = file.add_variable::<f64>(TIME_DIMENSION, &[TIME_DIMENSION])?;
        put_variable_attributes(&mut var, TIME_DIMENSION)?;
        var.put_values(&delta_time, ..)?;
    }

    for name in table.names() {
        if time_index && name == TIME {
            continue;
        }
        match Data::read(table, name)? {
            Data::Float(values) => {
                let values: Vec<f64> = values.iter().map(|v| v.unwrap_or(f64::NAN)).collect();
                let mut var = file.add_variable::<f64>(name, &[TIME_DIMENSION])?;
                var.put_attribute("_FillValue", AttributeValue::Double(f64::NAN))?;
                put_variable_attributes(&mut var, name)?;
                var.put_values(&values, ..)?;
            }
            Data::Int(values) => {
                let values: Vec<i64> = values.iter().map(|v| v.unwrap_or(INT_FILL)).collect();
                let mut var = file.add_variable::<i64>(name, &[TIME_DIMENSION])?;
                var.put_attribute("_FillValue", AttributeValue::Longlong(INT_FILL))?;
                put_variable_attributes(&mut var, name)?;
                var.put_values(&values, ..)?;
            }
            Data::Text(values) => {
                let mut var = file.add_string_variable(name, &[TIME_DIMENSION])?;
                put_variable_attributes(&mut var, name)?;
                for (row, value) in values.iter().enumerate() {
                    var.put_string(value.as_deref().unwrap_or_default(), [row])?;
                }
            }
        }
    }

    let date_created = Utc::now().to_rfc3339();
    for (key, value) in [
        ("featureType", "trajectory"),
        ("title", TITLE),
        ("reference", REFERENCE),
        ("date_created", date_created.as_str()),
        ("geospatial_lat_units", "degrees_north"),
        ("geospatial_lon_units", "degrees_east"),
        ("geospatial_ellipsoid", "WGS84"),
        ("date_type", "UTC"),
        ("time_type", "CCSDS UTC-A"),
    ] {
        file.add_attribute(key, AttributeValue::Str(value.to_owned()))?;
    }
    for (key, value) in &recorded_parameters(parms)? {
        if let Some(value) = attribute_value(value) {
            file.add_attribute(key, value)?;
        }
    }
    for (i, poly) in regions.iter().enumerate() {
        let x: Vec<f64> = poly.iter().map(|p| p.lon).collect();
        let y: Vec<f64> = poly.iter().map(|p| p.lat).collect();
        file.add_attribute(&format!("poly{i}_x"), AttributeValue::Doubles(x))?;
        file.add_attribute(&format!("poly{i}_y"), AttributeValue::Doubles(y))?;
    }
    debug!("wrote {} rows to {}", table.len(), path.display());
    Ok(())
}

fn put_variable_attributes(
    var: &mut netcdf::VariableMut<'_>,
    name: &str,
) -> Result<(), SlideruleError> {
    for (key, value) in &variable_attributes(name) {
        if let Some(value) = attribute_value(value) {
            var.put_attribute(key, value)?;
        }
    }
    Ok(())
}

/// Reads a table written by [to_nc].
///
/// When `delta_time` is present the `time` index is rebuilt from it and
/// rows are sorted by time.
pub fn from_nc<P: AsRef<Path>>(path: P) -> Result<Table, SlideruleError> {
    let path = path.as_ref();
    let file = netcdf::open(path)?;
    let mut table = Table::new();
    for var in file.variables() {
        let name = var.name();
        let data = match var.vartype() {
            NcVariableType::Float(_) => {
                let values: Vec<f64> = var.get_values(..)?;
                Data::Float(values.into_iter().map(|v| (!v.is_nan()).then_some(v)).collect())
            }
            NcVariableType::Int(_) => {
                let values: Vec<i64> = var.get_values(..)?;
                Data::Int(values.into_iter().map(|v| (v != INT_FILL).then_some(v)).collect())
            }
            NcVariableType::String => Data::Text(
                (0..var.len())
                    .map(|row| {
                        let value = var.get_string([row])?;
                        Ok((!value.is_empty()).then_some(value))
                    })
                    .collect::<Result<_, netcdf::Error>>()?,
            ),
            _ => {
                debug!("skipping {name} of unsupported type");
                continue;
            }
        };
        let series = data.into_series(&name);
        table.push_column(name, series)?;
    }

    if table.contains(TIME_DIMENSION) {
        #[allow(clippy::cast_possible_truncation)]
        let time: Vec<Option<i64>> = table
            .f64_values(TIME_DIMENSION)?
            .into_iter()
            .map(|dt| dt.map(|dt| ATLAS_SDP_EPOCH_NS + (dt * 1e9).round() as i64))
            .collect();
        table.push_column(TIME, Series::new(TIME.into(), time))?;
        table.set_index(TIME)?;
        table.sort_by_index()?;
    }
    Ok(table)
}

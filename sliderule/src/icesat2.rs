//! ICESat-2 processing requests.
//!
//! Each request streams back records holding arrays of per-extent (or
//! per-photon) results. These are flattened into a [Table] with one row
//! per array element, keyed by `extent_id` and indexed by `time`.

use crate::{
    client::Client,
    handlers::Handlers,
    parms::Parms,
    table::Table,
    SlideruleError,
};
use log::{debug, info};
use records::Record;
use serde_json::json;
use std::collections::BTreeMap;

pub const DEFAULT_ASSET: &str = "icesat2";

pub const ATL06REC: &str = "atl06rec";
pub const ATL08REC: &str = "atl08rec";
pub const ATL03REC: &str = "atl03rec";
pub const ZONAL_SAMPLEREC: &str = "zsrec";
pub const POINT_SAMPLEREC: &str = "rsrec";

pub const EXTENT_ID: &str = "extent_id";
pub const TIME: &str = "time";

/// Opens a session with `url`.
pub fn init(
    url: &str,
    organization: Option<&str>,
    desired_nodes: Option<u32>,
    verbose: bool,
) -> Result<Client, SlideruleError> {
    Client::init(url, organization, desired_nodes, verbose)
}

impl Client {
    /// Fits elevations to ATL03 photons within `parms`' region, in
    /// parallel across the service's nodes.
    pub fn atl06p(
        &self,
        parms: &Parms,
        asset: &str,
        resources: Option<&[String]>,
    ) -> Result<Table, SlideruleError> {
        self.processing_request("atl06p", parms, asset, resources, ATL06REC, "elevation")
    }

    /// Vegetation and canopy heights.
    pub fn atl08p(
        &self,
        parms: &Parms,
        asset: &str,
        resources: Option<&[String]>,
    ) -> Result<Table, SlideruleError> {
        self.processing_request("atl08p", parms, asset, resources, ATL08REC, "vegetation")
    }

    /// Subsets the photons of a single granule.
    pub fn atl03s(&self, parms: &Parms, resource: &str, asset: &str) -> Result<Table, SlideruleError> {
        let mut parms = parms.clone();
        parms.asset = Some(asset.to_owned());
        let rqst = json!({ "resource": resource, "parms": parms });
        let records = self.stream("atl03s", &rqst, &mut Handlers::new())?;
        build_table(&records, ATL03REC, "photons")
    }

    fn processing_request(
        &self,
        api: &str,
        parms: &Parms,
        asset: &str,
        resources: Option<&[String]>,
        rectype: &str,
        array: &str,
    ) -> Result<Table, SlideruleError> {
        let mut parms = parms.clone();
        parms.asset = Some(asset.to_owned());
        if let Some(resources) = resources {
            parms.resources = Some(resources.to_vec());
        }
        let records = self.stream(api, &json!({ "parms": parms }), &mut Handlers::new())?;
        let table = build_table(&records, rectype, array)?;
        info!("{api} returned {} rows", table.len());
        Ok(table)
    }
}

/// Flattens `rectype` records into rows and joins any raster samples.
fn build_table(records: &[Record], rectype: &str, array: &str) -> Result<Table, SlideruleError> {
    let rows = flatten(records, rectype, array);
    if rows.is_empty() {
        debug!("no {rectype} records returned");
        return Ok(Table::new());
    }
    let mut table = Table::from_records(&rows)?;
    for (from, to) in [("lat", "latitude"), ("lon", "longitude")] {
        if table.contains(from) {
            table.rename(from, to)?;
        }
    }
    if table.contains(TIME) {
        table.set_index(TIME)?;
    }

    if table.contains(EXTENT_ID) {
        for (key, samples) in sample_tables(records)? {
            debug!("joining {} samples of {key}", samples.len());
            table = table.left_join(&samples, EXTENT_ID, "", &format!("_{key}"))?;
        }
    }
    Ok(table)
}

/// One row per element of each record's `array`, carrying the parent
/// record's scalar fields.
fn flatten(records: &[Record], rectype: &str, array: &str) -> Vec<Record> {
    let mut rows = Vec::new();
    for parent in records.iter().filter(|r| r.rectype == rectype) {
        for child in parent.records(array) {
            let mut row = child.clone();
            for (name, value) in &parent.fields {
                if value.is_scalar() && !row.fields.contains_key(name) {
                    row.insert(name.clone(), value.clone());
                }
            }
            rows.push(row);
        }
    }
    rows
}

/// Tables of raster samples by raster key.
///
/// The first sample of each record becomes `{key}.{field}` columns,
/// keyed by the record's `index`.
fn sample_tables(records: &[Record]) -> Result<BTreeMap<String, Table>, SlideruleError> {
    let mut rows: BTreeMap<String, Vec<Record>> = BTreeMap::new();
    for rec in records
        .iter()
        .filter(|r| r.rectype == ZONAL_SAMPLEREC || r.rectype == POINT_SAMPLEREC)
    {
        let (Some(key), Some(index)) = (rec.get_str("key"), rec.get("index")) else {
            continue;
        };
        let Some(sample) = rec.records("samples").next() else {
            continue;
        };
        let mut row = Record::new(rec.rectype.clone());
        row.insert(EXTENT_ID, index.clone());
        for (name, value) in &sample.fields {
            if value.is_scalar() {
                row.insert(format!("{key}.{name}"), value.clone());
            }
        }
        rows.entry(key.to_owned()).or_default().push(row);
    }
    rows.into_iter()
        .map(|(key, rows)| Ok((key, Table::from_records(&rows)?)))
        .collect()
}

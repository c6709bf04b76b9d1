//! Request parameters.
//!
//! Unset keys are left out of the request body, so the service applies
//! its own defaults. Keys without a typed field can be set through
//! [Parms::set].

use crate::region::{LatLon, RasterMask};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use std::collections::BTreeMap;

// Surface types.
pub const SRT_LAND: i32 = 0;
pub const SRT_OCEAN: i32 = 1;
pub const SRT_SEA_ICE: i32 = 2;
pub const SRT_LAND_ICE: i32 = 3;
pub const SRT_INLAND_WATER: i32 = 4;

// Photon signal confidence.
pub const CNF_POSSIBLE_TEP: i32 = -2;
pub const CNF_NOT_CONSIDERED: i32 = -1;
pub const CNF_BACKGROUND: i32 = 0;
pub const CNF_WITHIN_10M: i32 = 1;
pub const CNF_SURFACE_LOW: i32 = 2;
pub const CNF_SURFACE_MEDIUM: i32 = 3;
pub const CNF_SURFACE_HIGH: i32 = 4;

// ATL08 photon classes.
pub const ATL08_NOISE: &str = "atl08_noise";
pub const ATL08_GROUND: &str = "atl08_ground";
pub const ATL08_CANOPY: &str = "atl08_canopy";
pub const ATL08_TOP_OF_CANOPY: &str = "atl08_top_of_canopy";
pub const ATL08_UNCLASSIFIED: &str = "atl08_unclassified";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Parms {
    /// Polygon filter, counter-clockwise lon/lat vertices.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poly: Option<Vec<LatLon>>,

    /// Raster mask refining `poly`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raster: Option<RasterMask>,

    /// Start of time window, `YYYY-MM-DDTHH:MM:SSZ`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub t0: Option<String>,

    /// End of time window.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub t1: Option<String>,

    /// Surface type.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub srt: Option<i32>,

    /// Minimum signal confidence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cnf: Option<i32>,

    /// ATL08 classes to keep.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub atl08_class: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality_ph: Option<Vec<String>>,

    /// Minimum along-track spread, meters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ats: Option<f64>,

    /// Minimum photon count per segment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cnt: Option<u32>,

    /// Segment length, meters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub len: Option<f64>,

    /// Segment step, meters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub res: Option<f64>,

    /// Maximum fit iterations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maxi: Option<u32>,

    /// Minimum height of the surface window, meters.
    #[serde(rename = "H_min_win", skip_serializing_if = "Option::is_none")]
    pub h_min_win: Option<f64>,

    /// Maximum robust dispersion, meters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sigma_r_max: Option<f64>,

    /// Auxiliary rasters to sample at each result, by name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub samples: Option<BTreeMap<String, RasterSampling>>,

    /// Canopy height binning.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phoreal: Option<Phoreal>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset: Option<String>,

    /// Explicit granules to process.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<Vec<String>>,

    #[serde(flatten)]
    pub extra: Map<String, Json>,
}

impl Parms {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets an arbitrary key.
    pub fn set(mut self, key: impl Into<String>, value: impl Into<Json>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Adds an auxiliary raster sampled under `name`.
    pub fn sample(mut self, name: impl Into<String>, sampling: RasterSampling) -> Self {
        self.samples
            .get_or_insert_with(BTreeMap::new)
            .insert(name.into(), sampling);
        self
    }

    /// Names of the requested auxiliary rasters.
    pub fn sample_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.samples.iter().flat_map(|s| s.keys().map(String::as_str))
    }
}

/// Sampling of an auxiliary raster at each result location.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RasterSampling {
    pub asset: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<String>,

    /// Sampling radius, meters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub radius: Option<f64>,

    /// Compute count/min/max/mean/median/stdev/mad within `radius`.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub zonal_stats: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub with_flags: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub t0: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub t1: Option<String>,
}

impl RasterSampling {
    pub fn new(asset: impl Into<String>) -> Self {
        Self {
            asset: asset.into(),
            ..Self::default()
        }
    }

    pub fn radius(mut self, meters: f64) -> Self {
        self.radius = Some(meters);
        self
    }

    pub fn zonal_stats(mut self, enable: bool) -> Self {
        self.zonal_stats = enable;
        self
    }
}

/// Canopy height binning parameters.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Phoreal {
    /// Height bin size, meters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub binsize: Option<f64>,

    /// `mean`, `median` or `center`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geoloc: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_abs_h: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub send_waveform: Option<bool>,
}

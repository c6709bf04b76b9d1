//! Client for the SlideRule ICESat-2 processing service.
//!
//! A [Client] holds a session with one deployment. Processing requests
//! are configured with [Parms], usually constrained to a [Region], and
//! answer with a [Table] that can be derived, filtered and joined before
//! it is plotted or saved.
//!
//! ```no_run
//! use sliderule::{icesat2, Parms, Region, SRT_LAND};
//!
//! # fn main() -> Result<(), sliderule::SlideruleError> {
//! let client = icesat2::init("slideruleearth.io", Some("sliderule"), None, true)?;
//! let region = Region::from_geojson("grandmesa.geojson", 0.0)?;
//! let parms = Parms {
//!     poly: Some(region.poly),
//!     srt: Some(SRT_LAND),
//!     len: Some(40.0),
//!     res: Some(20.0),
//!     ..Parms::default()
//! };
//! let table = client.atl06p(&parms, icesat2::DEFAULT_ASSET, None)?;
//! println!("{table}");
//! # Ok(())
//! # }
//! ```

mod auth;
mod client;
mod error;
mod handlers;
pub mod icesat2;
pub mod io;
mod parms;
mod region;
mod table;
pub mod time;

#[cfg(test)]
mod mock;

pub use crate::{
    auth::{netrc_lookup, Credentials},
    client::{BasicType, Client, ClientConfig, Reply, CLIENT_VERSION, DEFAULT_URL, PUBLIC_ORG},
    error::SlideruleError,
    handlers::{Handler, Handlers, ARROWREC_DATA, ARROWREC_META, EVENTREC, EXCEPTREC},
    parms::*,
    region::{LatLon, RasterMask, Region, DEFAULT_CELLSIZE},
    table::{Predicate, Scalar, Table},
};

use records::RecordError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SlideruleError {
    /// The request cannot succeed as issued.
    #[error("{0}")]
    Fatal(String),

    /// The service is overloaded; the request may succeed later.
    #[error("{0}")]
    Transient(String),

    #[error("HTTP error {status} from endpoint {url}")]
    Http { status: u16, url: String },

    #[error("{0}")]
    Request(#[from] reqwest::Error),

    #[error("{0}")]
    Record(#[from] RecordError),

    #[error("{0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    GeoJson(#[from] geojson::Error),

    #[error("{0}")]
    Frame(#[from] polars::prelude::PolarsError),

    #[error("{0}")]
    NetCdf(#[from] netcdf::Error),

    #[error("no polygons in {0}")]
    Region(String),

    #[error("no column named {0}")]
    MissingColumn(String),

    #[error("column {0} is not numeric")]
    NotNumeric(String),

    #[error("column {name} has {actual} rows, table has {expected}")]
    Length {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("join would produce two columns named {0}")]
    Collision(String),

    #[error("client version {client} is incompatible with {entity} version {server}")]
    Version {
        entity: String,
        client: String,
        server: String,
    },
}

impl SlideruleError {
    /// Whether the service may accept the same request later.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

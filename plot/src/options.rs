use anyhow::{anyhow, Error as AnyError};
use clap::{Args, Parser, Subcommand};
use sliderule::{Predicate, Scalar, DEFAULT_URL};
use std::{path::PathBuf, str::FromStr};

/// Request ICESat-2 products from SlideRule and plot them.
#[derive(Parser, Debug, Clone)]
pub struct Cli {
    /// Service host.
    #[arg(long, default_value = DEFAULT_URL)]
    pub url: String,

    /// Organization cluster; "none" for direct access to `url`.
    #[arg(long, default_value = "sliderule")]
    pub org: String,

    /// Desired number of processing nodes.
    #[arg(long)]
    pub nodes: Option<u32>,

    /// Log service events.
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    #[command(subcommand)]
    pub cmd: Command,
}

impl Cli {
    pub fn organization(&self) -> Option<&str> {
        match self.org.as_str() {
            "" | "none" => None,
            org => Some(org),
        }
    }
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Print server and plugin versions.
    Version,

    /// Land ice heights.
    Atl06 {
        #[command(flatten)]
        request: Request,

        /// Auxiliary raster sampled at each segment, "key=asset".
        #[arg(long)]
        raster: Vec<KeyValue>,

        #[command(flatten)]
        output: Output,
    },

    /// Canopy heights.
    Atl08 {
        #[command(flatten)]
        request: Request,

        #[command(flatten)]
        output: Output,
    },
}

#[derive(Debug, Args, Clone)]
pub struct Request {
    /// GeoJSON file with the region of interest.
    #[arg(long)]
    pub region: PathBuf,

    /// Hull simplification tolerance, degrees.
    #[arg(long, default_value_t = 0.0)]
    pub tolerance: f64,

    /// Source data asset.
    #[arg(long, default_value = sliderule::icesat2::DEFAULT_ASSET)]
    pub asset: String,

    /// Start of time window, "YYYY-MM-DDTHH:MM:SSZ".
    #[arg(long)]
    pub t0: Option<String>,

    /// End of time window.
    #[arg(long)]
    pub t1: Option<String>,

    /// Granule to process; repeat for several.
    #[arg(long)]
    pub resource: Vec<String>,
}

#[derive(Debug, Args, Clone)]
pub struct Output {
    /// Keep rows where "column=value"; repeat to combine.
    #[arg(long)]
    pub filter: Vec<KeyValue>,

    /// Derived column "name=a-b".
    #[arg(long)]
    pub delta: Vec<Delta>,

    /// Columns to plot against the index.
    #[arg(long)]
    pub column: Vec<String>,

    /// Write an SVG figure instead of plotting to the terminal.
    #[arg(long)]
    pub plot: Option<PathBuf>,

    /// Save the result table as JSON.
    #[arg(long)]
    pub json: Option<PathBuf>,

    /// Save the result table as netCDF.
    #[arg(long)]
    pub nc: Option<PathBuf>,
}

/// "key=value".
#[derive(Debug, Clone, PartialEq)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
}

impl FromStr for KeyValue {
    type Err = AnyError;
    fn from_str(s: &str) -> Result<Self, AnyError> {
        let (key, value) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected key=value, got {s}"))?;
        if key.is_empty() {
            return Err(anyhow!("empty key in {s}"));
        }
        Ok(Self {
            key: key.to_owned(),
            value: value.to_owned(),
        })
    }
}

impl KeyValue {
    /// An equality predicate, comparing numerically when the value
    /// parses as a number.
    pub fn predicate(&self) -> Predicate {
        let value = if let Ok(i) = self.value.parse::<i64>() {
            Scalar::Int(i)
        } else if let Ok(f) = self.value.parse::<f64>() {
            Scalar::Float(f)
        } else {
            Scalar::Text(self.value.clone())
        };
        Predicate::eq(self.key.as_str(), value)
    }
}

/// "name=a-b".
#[derive(Debug, Clone, PartialEq)]
pub struct Delta {
    pub name: String,
    pub a: String,
    pub b: String,
}

impl FromStr for Delta {
    type Err = AnyError;
    fn from_str(s: &str) -> Result<Self, AnyError> {
        let KeyValue { key, value } = s.parse()?;
        // Column names may hold '-', so split on the last one.
        let (a, b) = value
            .rsplit_once('-')
            .ok_or_else(|| anyhow!("expected name=a-b, got {s}"))?;
        Ok(Self {
            name: key,
            a: a.to_owned(),
            b: b.to_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{Cli, Command, Delta, KeyValue};
    use clap::Parser;
    use sliderule::{Predicate, Scalar};

    #[test]
    fn test_parse_filter_and_delta() {
        let kv: KeyValue = "rgt=295".parse().unwrap();
        assert_eq!(kv.predicate(), Predicate::eq("rgt", Scalar::Int(295)));
        let kv: KeyValue = "gt=gt1l".parse().unwrap();
        assert_eq!(kv.predicate(), Predicate::eq("gt", "gt1l"));
        assert!("rgt".parse::<KeyValue>().is_err());

        let delta: Delta = "value_delta=h_mean-mosaic.value".parse().unwrap();
        assert_eq!(
            delta,
            Delta {
                name: "value_delta".into(),
                a: "h_mean".into(),
                b: "mosaic.value".into(),
            }
        );
        assert!("d=h_mean".parse::<Delta>().is_err());
    }

    #[test]
    fn test_cli() {
        let cli = Cli::try_parse_from([
            "plot",
            "--org",
            "none",
            "atl06",
            "--region",
            "grandmesa.geojson",
            "--raster",
            "mosaic=arcticdem-mosaic",
            "--filter",
            "cycle=1",
            "--delta",
            "value_delta=h_mean-mosaic.value",
            "--column",
            "value_delta",
            "--nc",
            "grandmesa.nc",
        ])
        .unwrap();
        assert_eq!(cli.organization(), None);
        match cli.cmd {
            Command::Atl06 {
                request,
                raster,
                output,
            } => {
                assert_eq!(request.asset, "icesat2");
                assert_eq!(raster[0].value, "arcticdem-mosaic");
                assert_eq!(output.filter.len(), 1);
                assert_eq!(output.delta[0].b, "mosaic.value");
                assert_eq!(output.nc.unwrap().to_str(), Some("grandmesa.nc"));
            }
            cmd => panic!("unexpected {cmd:?}"),
        }
    }
}

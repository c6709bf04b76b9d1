mod figure;
mod options;

use anyhow::Error as AnyError;
use clap::Parser;
use figure::{index_points, Figure, Style};
use log::info;
use options::{Cli, Command as CliCmd, Delta, KeyValue, Output, Request};
use sliderule::{
    icesat2, io, Parms, Phoreal, Predicate, RasterSampling, Region, Table, ATL08_CANOPY,
    ATL08_GROUND, ATL08_TOP_OF_CANOPY, CNF_SURFACE_HIGH, SRT_LAND,
};

fn main() -> Result<(), AnyError> {
    let cli = Cli::parse();
    env_logger::init();

    let client = icesat2::init(&cli.url, cli.organization(), cli.nodes, cli.verbose)?;

    match cli.cmd {
        CliCmd::Version => {
            let info = client.get_version()?;
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
        CliCmd::Atl06 {
            request,
            raster,
            output,
        } => {
            let (region, mut parms) = request_parms(&request)?;
            parms.cnf = Some(CNF_SURFACE_HIGH);
            parms.ats = Some(20.0);
            parms.cnt = Some(10);
            parms.len = Some(40.0);
            parms.res = Some(20.0);
            parms.maxi = Some(1);
            for KeyValue { key, value } in &raster {
                let sampling = RasterSampling::new(value.as_str()).zonal_stats(true);
                parms = parms.sample(key.as_str(), sampling);
            }
            let table = client.atl06p(&parms, &request.asset, resources(&request))?;
            present("ATL06", table, &parms, &region, &output, "h_mean")?;
        }
        CliCmd::Atl08 { request, output } => {
            let (region, mut parms) = request_parms(&request)?;
            parms.cnf = Some(CNF_SURFACE_HIGH);
            parms.len = Some(30.0);
            parms.res = Some(30.0);
            parms.atl08_class = Some(
                [ATL08_GROUND, ATL08_CANOPY, ATL08_TOP_OF_CANOPY]
                    .map(str::to_owned)
                    .to_vec(),
            );
            parms.phoreal = Some(Phoreal {
                binsize: Some(1.0),
                geoloc: Some("center".to_owned()),
                ..Default::default()
            });
            let table = client.atl08p(&parms, &request.asset, resources(&request))?;
            present("ATL08", table, &parms, &region, &output, "h_te_median")?;
        }
    }
    Ok(())
}

fn request_parms(request: &Request) -> Result<(Region, Parms), AnyError> {
    let region = Region::from_geojson(&request.region, request.tolerance)?;
    let parms = Parms {
        poly: Some(region.poly.clone()),
        raster: Some(region.raster.clone()),
        srt: Some(SRT_LAND),
        t0: request.t0.clone(),
        t1: request.t1.clone(),
        ..Parms::default()
    };
    Ok((region, parms))
}

fn resources(request: &Request) -> Option<&[String]> {
    (!request.resource.is_empty()).then_some(request.resource.as_slice())
}

fn present(
    product: &str,
    mut table: Table,
    parms: &Parms,
    region: &Region,
    output: &Output,
    default_column: &str,
) -> Result<(), AnyError> {
    for Delta { name, a, b } in &output.delta {
        table.derive(name, a, b)?;
    }
    let predicates: Vec<Predicate> = output.filter.iter().map(KeyValue::predicate).collect();
    let table = table.filter(&predicates)?;
    info!("{product}: {} rows after filtering", table.len());

    if let Some(path) = &output.json {
        io::to_json(&table, path, Some(parms), &[region.poly.clone()])?;
    }
    if let Some(path) = &output.nc {
        io::to_nc(&table, path, Some(parms), &[region.poly.clone()])?;
    }

    let columns: Vec<&str> = if output.column.is_empty() {
        vec![default_column]
    } else {
        output.column.iter().map(String::as_str).collect()
    };
    let mut figure = Figure::new(product).axes(
        table.index_name().unwrap_or("row"),
        columns.join(", "),
    );
    for column in columns {
        let style = if figure.series.is_empty() {
            Style::Scatter
        } else {
            Style::Line
        };
        let color = figure.next_color();
        figure.push(style, column, color, index_points(&table, column)?);
    }

    match &output.plot {
        Some(path) => figure.render_svg(path, (1200, 700))?,
        None => figure.display(),
    }
    Ok(())
}

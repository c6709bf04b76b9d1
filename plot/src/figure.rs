use anyhow::{anyhow, Error as AnyError};
use plotters::prelude::*;
use sliderule::Table;
use std::{ops::Range, path::Path};
use textplots::{Chart, Plot, Shape};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Style {
    Scatter,
    Line,
}

#[derive(Debug, Clone)]
pub struct Series {
    pub label: String,
    pub style: Style,
    pub color: RGBColor,
    pub points: Vec<(f64, f64)>,
}

/// A single chart of one or more series sharing axes.
#[derive(Debug, Clone, Default)]
pub struct Figure {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub series: Vec<Series>,
}

/// Colors handed out to series in order.
pub const PALETTE: [RGBColor; 6] = [
    RGBColor(0x1f, 0x77, 0xb4),
    RGBColor(0xd6, 0x27, 0x28),
    RGBColor(0x2c, 0xa0, 0x2c),
    RGBColor(0xff, 0x7f, 0x0e),
    RGBColor(0x94, 0x67, 0xbd),
    RGBColor(0x8c, 0x56, 0x4b),
];

impl Figure {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn axes(mut self, x_label: impl Into<String>, y_label: impl Into<String>) -> Self {
        self.x_label = x_label.into();
        self.y_label = y_label.into();
        self
    }

    pub fn push(
        &mut self,
        style: Style,
        label: impl Into<String>,
        color: RGBColor,
        points: Vec<(f64, f64)>,
    ) {
        self.series.push(Series {
            label: label.into(),
            style,
            color,
            points,
        });
    }

    /// Next unused palette color.
    pub fn next_color(&self) -> RGBColor {
        PALETTE[self.series.len() % PALETTE.len()]
    }

    /// Extent of all points, padded so that flat data still spans a
    /// range.
    pub fn bounds(&self) -> Option<(Range<f64>, Range<f64>)> {
        let mut points = self.series.iter().flat_map(|s| s.points.iter());
        let &(x, y) = points.next()?;
        let (mut x_min, mut x_max, mut y_min, mut y_max) = (x, x, y, y);
        for &(x, y) in points {
            x_min = x_min.min(x);
            x_max = x_max.max(x);
            y_min = y_min.min(y);
            y_max = y_max.max(y);
        }
        let pad = |lo: f64, hi: f64| {
            let margin = if hi > lo { (hi - lo) * 0.05 } else { 1.0 };
            (lo - margin)..(hi + margin)
        };
        Some((pad(x_min, x_max), pad(y_min, y_max)))
    }

    pub fn render_svg(&self, path: &Path, size: (u32, u32)) -> Result<(), AnyError> {
        let (x_range, y_range) = self
            .bounds()
            .ok_or_else(|| anyhow!("nothing to plot in {}", self.title))?;

        let root = SVGBackend::new(path, size).into_drawing_area();
        root.fill(&WHITE)?;
        let mut chart = ChartBuilder::on(&root)
            .caption(&self.title, ("sans-serif", 20))
            .margin(10)
            .x_label_area_size(40)
            .y_label_area_size(60)
            .build_cartesian_2d(x_range, y_range)?;

        chart
            .configure_mesh()
            .x_desc(&self.x_label)
            .y_desc(&self.y_label)
            .draw()?;

        for series in &self.series {
            let color = series.color;
            let points = series.points.iter().copied();
            let drawn = match series.style {
                Style::Line => chart.draw_series(LineSeries::new(points, color))?,
                Style::Scatter => chart.draw_series(
                    points.map(|pt| Circle::new(pt, 2, color.filled())),
                )?,
            };
            drawn
                .label(series.label.as_str())
                .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
        }

        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()?;

        root.present()?;
        Ok(())
    }

    /// Draws the figure on the terminal.
    pub fn display(&self) {
        let Some((x_range, _)) = self.bounds() else {
            return;
        };
        #[allow(clippy::cast_possible_truncation)]
        let shapes: Vec<Vec<(f32, f32)>> = self
            .series
            .iter()
            .map(|s| s.points.iter().map(|&(x, y)| (x as f32, y as f32)).collect())
            .collect();
        let shapes: Vec<Shape> = self
            .series
            .iter()
            .zip(shapes.iter())
            .map(|(series, points)| match series.style {
                Style::Line => Shape::Lines(points),
                Style::Scatter => Shape::Points(points),
            })
            .collect();

        println!("{}", self.title);
        for series in &self.series {
            println!("  {} ({} points)", series.label, series.points.len());
        }
        #[allow(clippy::cast_possible_truncation)]
        let mut chart = Chart::new(200, 80, x_range.start as f32, x_range.end as f32);
        shapes
            .iter()
            .fold(&mut chart, |chart, shape| chart.lineplot(shape))
            .display();
    }
}

/// Points pairing the table index (or row number, without one) with
/// `column`. Rows where either is undefined are skipped.
pub fn index_points(table: &Table, column: &str) -> Result<Vec<(f64, f64)>, AnyError> {
    let values = table.f64_values(column)?;
    let index = table.index_name().map(|name| table.f64_values(name)).transpose()?;
    #[allow(clippy::cast_precision_loss)]
    let points = values
        .into_iter()
        .enumerate()
        .filter_map(|(row, y)| {
            let x = match &index {
                Some(index) => index[row]?,
                None => row as f64,
            };
            Some((x, y?))
        })
        .collect();
    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::{index_points, Figure, Style, PALETTE};
    use polars::prelude::{NamedFrom, Series};
    use sliderule::Table;

    fn table() -> Table {
        let mut table = Table::new();
        table
            .push_column("time", Series::new("time".into(), &[10_i64, 20, 30]))
            .unwrap();
        table
            .push_column(
                "h_mean",
                Series::new("h_mean".into(), &[Some(1.0_f64), None, Some(3.0)]),
            )
            .unwrap();
        table
            .push_column("gt", Series::new("gt".into(), &["a", "b", "c"]))
            .unwrap();
        table
    }

    #[test]
    fn test_index_points() {
        let mut table = table();
        assert_eq!(
            index_points(&table, "h_mean").unwrap(),
            vec![(0.0, 1.0), (2.0, 3.0)]
        );
        table.set_index("time").unwrap();
        assert_eq!(
            index_points(&table, "h_mean").unwrap(),
            vec![(10.0, 1.0), (30.0, 3.0)]
        );
        assert!(index_points(&table, "gt").is_err());
        assert!(index_points(&table, "missing").is_err());
    }

    #[test]
    fn test_bounds_pad_flat_data() {
        let mut figure = Figure::new("flat").axes("time", "height");
        assert!(figure.bounds().is_none());
        figure.push(Style::Scatter, "a", PALETTE[0], vec![(1.0, 5.0), (3.0, 5.0)]);
        let (x, y) = figure.bounds().unwrap();
        assert!(x.start < 1.0 && x.end > 3.0);
        assert_eq!(y, 4.0..6.0);
        assert_eq!(figure.next_color(), PALETTE[1]);
    }

    #[test]
    fn test_render_svg() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("figure.svg");
        let mut figure = Figure::new("ATL06 vs mosaic").axes("time", "meters");
        figure.push(Style::Scatter, "h_mean", PALETTE[0], vec![(0.0, 10.0), (1.0, 12.0)]);
        figure.push(Style::Line, "mosaic.value", PALETTE[1], vec![(0.0, 9.5), (1.0, 11.0)]);
        figure.render_svg(&path, (640, 480)).unwrap();
        let svg = std::fs::read_to_string(&path).unwrap();
        assert!(svg.contains("<svg"));
        assert!(svg.contains("mosaic.value"));
    }
}

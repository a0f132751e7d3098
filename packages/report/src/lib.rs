#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Chart rendering for the gold-layer aggregations.
//!
//! Reads the three gold collections and renders one PNG per analysis into
//! the configured output directory. A gold collection that is empty or
//! missing skips its chart with a warning instead of failing the run.

use std::path::{Path, PathBuf};

use plotters::prelude::{
    BLUE, BitMapBackend, ChartBuilder, Circle, Color, IntoDrawingArea, LineSeries, Rectangle,
    WHITE,
};
use serde_json::Value;

use nyc_collisions_models::{BoroughRow, HourlyRow, VehicleRow, collections};
use nyc_collisions_store::{StoreError, StoreGateway};

/// Errors that end a rendering run.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    /// Store access failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A gold row does not match its expected shape.
    #[error("Malformed gold row: {0}")]
    Json(#[from] serde_json::Error),

    /// The output directory could not be created.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The chart backend failed to draw or write the image.
    #[error("Chart rendering failed: {0}")]
    Render(String),
}

/// Where and how large to render the charts.
#[derive(Debug, Clone)]
pub struct ReportConfig {
    /// Directory the PNGs are written into; created if absent.
    pub output_dir: PathBuf,
    /// Image dimensions in pixels.
    pub figure_size: (u32, u32),
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("plots"),
            figure_size: (1200, 600),
        }
    }
}

/// Renders the gold aggregations as PNG charts.
pub struct ChartRenderer {
    gateway: StoreGateway,
    config: ReportConfig,
}

impl ChartRenderer {
    #[must_use]
    pub const fn new(gateway: StoreGateway, config: ReportConfig) -> Self {
        Self { gateway, config }
    }

    /// Renders every chart whose gold collection has data, returning the
    /// paths of the images written. The store connection is released on
    /// every exit path.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError`] if the output directory cannot be created,
    /// a gold collection cannot be read, or the chart backend fails.
    pub fn render_all(&mut self) -> Result<Vec<PathBuf>, ReportError> {
        let result = self.render_all_inner();
        self.gateway.close();
        result
    }

    fn render_all_inner(&mut self) -> Result<Vec<PathBuf>, ReportError> {
        std::fs::create_dir_all(&self.config.output_dir)?;
        let mut written = Vec::new();

        let hourly: Vec<HourlyRow> = self.load_rows(collections::GOLD_TIME_ANALYSIS)?;
        if hourly.is_empty() {
            log::warn!("Skipping hourly chart: no time analysis rows");
        } else {
            let path = self.config.output_dir.join("hourly_distribution.png");
            render_hourly_chart(&path, self.config.figure_size, &hourly)?;
            log::info!("Wrote {}", path.display());
            written.push(path);
        }

        let boroughs: Vec<BoroughRow> = self.load_rows(collections::GOLD_BOROUGH_ANALYSIS)?;
        if boroughs.is_empty() {
            log::warn!("Skipping borough chart: no borough analysis rows");
        } else {
            let path = self.config.output_dir.join("borough_comparison.png");
            render_borough_chart(&path, self.config.figure_size, &boroughs)?;
            log::info!("Wrote {}", path.display());
            written.push(path);
        }

        let vehicles: Vec<VehicleRow> = self.load_rows(collections::GOLD_VEHICLE_ANALYSIS)?;
        if vehicles.is_empty() {
            log::warn!("Skipping vehicle chart: no vehicle analysis rows");
        } else {
            let path = self.config.output_dir.join("vehicle_analysis.png");
            render_vehicle_chart(&path, self.config.figure_size, &vehicles)?;
            log::info!("Wrote {}", path.display());
            written.push(path);
        }

        Ok(written)
    }

    fn load_rows<T: serde::de::DeserializeOwned>(
        &mut self,
        name: &str,
    ) -> Result<Vec<T>, ReportError> {
        let coll = self.gateway.collection(name)?;
        coll.find_all()?
            .into_iter()
            .map(|doc: Value| serde_json::from_value(doc).map_err(ReportError::from))
            .collect()
    }
}

fn render_error<E: std::fmt::Display>(e: E) -> ReportError {
    ReportError::Render(e.to_string())
}

/// Line chart of accidents per hour of day.
fn render_hourly_chart(
    path: &Path,
    size: (u32, u32),
    rows: &[HourlyRow],
) -> Result<(), ReportError> {
    let max_accidents = rows.iter().map(|r| r.total_accidents).max().unwrap_or(1);

    let root = BitMapBackend::new(path, size).into_drawing_area();
    root.fill(&WHITE).map_err(render_error)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Distribution of Accidents by Hour of Day", ("sans-serif", 28))
        .margin(20)
        .x_label_area_size(45)
        .y_label_area_size(70)
        .build_cartesian_2d(0u32..24u32, 0u64..max_accidents + max_accidents / 10 + 1)
        .map_err(render_error)?;

    chart
        .configure_mesh()
        .x_desc("Hour of Day")
        .y_desc("Number of Accidents")
        .draw()
        .map_err(render_error)?;

    chart
        .draw_series(LineSeries::new(
            rows.iter().map(|r| (r.hour, r.total_accidents)),
            &BLUE,
        ))
        .map_err(render_error)?;
    chart
        .draw_series(
            rows.iter()
                .map(|r| Circle::new((r.hour, r.total_accidents), 4, BLUE.filled())),
        )
        .map_err(render_error)?;

    root.present().map_err(render_error)
}

/// Vertical bar chart of accidents per borough.
fn render_borough_chart(
    path: &Path,
    size: (u32, u32),
    rows: &[BoroughRow],
) -> Result<(), ReportError> {
    let max_accidents = rows.iter().map(|r| r.total_accidents).max().unwrap_or(1);
    let n = rows.len();

    let root = BitMapBackend::new(path, size).into_drawing_area();
    root.fill(&WHITE).map_err(render_error)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Total Accidents by Borough", ("sans-serif", 28))
        .margin(20)
        .x_label_area_size(45)
        .y_label_area_size(70)
        .build_cartesian_2d(0usize..n, 0u64..max_accidents + max_accidents / 10 + 1)
        .map_err(render_error)?;

    chart
        .configure_mesh()
        .x_desc("Borough")
        .y_desc("Number of Accidents")
        .x_labels(n)
        .x_label_formatter(&|idx| {
            rows.get(*idx)
                .map(|r| r.borough.clone())
                .unwrap_or_default()
        })
        .draw()
        .map_err(render_error)?;

    chart
        .draw_series(rows.iter().enumerate().map(|(i, r)| {
            let mut bar = Rectangle::new([(i, 0), (i + 1, r.total_accidents)], BLUE.filled());
            bar.set_margin(0, 0, 10, 10);
            bar
        }))
        .map_err(render_error)?;

    root.present().map_err(render_error)
}

/// Horizontal bar chart of the top vehicle types.
fn render_vehicle_chart(
    path: &Path,
    size: (u32, u32),
    rows: &[VehicleRow],
) -> Result<(), ReportError> {
    let max_accidents = rows.iter().map(|r| r.total_accidents).max().unwrap_or(1);
    let n = rows.len();

    let root = BitMapBackend::new(path, size).into_drawing_area();
    root.fill(&WHITE).map_err(render_error)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Top Vehicle Types Involved in Accidents", ("sans-serif", 28))
        .margin(20)
        .x_label_area_size(45)
        .y_label_area_size(160)
        .build_cartesian_2d(0u64..max_accidents + max_accidents / 10 + 1, 0usize..n)
        .map_err(render_error)?;

    chart
        .configure_mesh()
        .x_desc("Number of Accidents")
        .y_desc("Vehicle Type")
        .y_labels(n)
        .y_label_formatter(&|idx| {
            rows.get(*idx)
                .map(|r| r.vehicle_type.clone())
                .unwrap_or_default()
        })
        .draw()
        .map_err(render_error)?;

    chart
        .draw_series(rows.iter().enumerate().map(|(i, r)| {
            let mut bar = Rectangle::new([(0, i), (r.total_accidents, i + 1)], BLUE.filled());
            bar.set_margin(4, 4, 0, 0);
            bar
        }))
        .map_err(render_error)?;

    root.present().map_err(render_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nyc_collisions_store::StoreConfig;

    // Chart drawing needs a font-capable environment; these tests cover
    // the empty-collection paths and output directory handling.

    #[test]
    fn empty_gold_collections_render_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config = ReportConfig {
            output_dir: dir.path().join("plots"),
            ..ReportConfig::default()
        };

        let mut renderer = ChartRenderer::new(StoreGateway::new(StoreConfig::memory()), config);
        let written = renderer.render_all().unwrap();

        assert!(written.is_empty());
        assert!(dir.path().join("plots").is_dir());
    }

    #[test]
    fn default_config_targets_plots_directory() {
        let config = ReportConfig::default();
        assert_eq!(config.output_dir, PathBuf::from("plots"));
        assert_eq!(config.figure_size, (1200, 600));
    }
}

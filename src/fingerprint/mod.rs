//! Fingerprint chart rendering.
//!
//! A track's metrics cube has three axes (band, time, metric). Each axis
//! permutation maps them onto image X, Y and Z, and the Z axis renders
//! three ways: stacked as rows within each cell, stacked as columns
//! within each cell, or as one image per Z value. Pages carry min/max
//! color indicator strips along the metric axis so charts stay readable
//! without text labels.

pub mod color;
pub mod naming;
pub mod normalize;
pub mod png;
pub mod surface;
pub mod view;

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::FingerprintConfig;
use crate::cube::MetricsDocument;

use color::datapoint_color;
use surface::{GridLayout, Surface, GRID_LINE, HOLE, PAGE_BG};
use view::{Axis, AxisPerm, CubeView, ViewError};

/// Subdirectory of a track's output root that holds the charts.
pub const FINGERPRINT_DIR: &str = "fingerprint";

#[derive(Error, Debug)]
pub enum RenderError {
    #[error(transparent)]
    View(#[from] ViewError),
    #[error(transparent)]
    Png(#[from] png::PngError),
    #[error("failed to create {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// How the Z axis is folded into the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZMode {
    /// Every cell is a vertical stack, one datapoint row per Z value.
    RowsWithinCell,
    /// Every cell is a horizontal strip, one datapoint column per Z value.
    ColumnsWithinCell,
    /// One page per Z value; cells are single datapoints.
    FilePerValue,
}

impl ZMode {
    pub fn code(self) -> &'static str {
        match self {
            ZMode::RowsWithinCell => "zich",
            ZMode::ColumnsWithinCell => "zicv",
            ZMode::FilePerValue => "zfile",
        }
    }
}

/// Render every configured permutation of a track's metrics document into
/// `<output_root>/fingerprint/`. Returns the paths written.
pub fn render_track(
    document: &MetricsDocument,
    output_root: &Path,
    config: &FingerprintConfig,
) -> Result<Vec<PathBuf>, RenderError> {
    let view = CubeView::build(document)?;
    let dir = output_root.join(FINGERPRINT_DIR);
    std::fs::create_dir_all(&dir).map_err(|source| RenderError::CreateDir {
        path: dir.clone(),
        source,
    })?;

    let track = &document.track.name;
    let mut written = Vec::new();

    for code in &config.permutations {
        let perm = AxisPerm::parse(code)?;
        let z_len = view.axis_len(perm.z);
        let all_z: Vec<usize> = (0..z_len).collect();

        for zmode in [ZMode::RowsWithinCell, ZMode::ColumnsWithinCell] {
            let surface = render_page(&view, &perm, &all_z, zmode, config);
            let path = dir.join(naming::layout_file_name(&perm.code(), zmode.code(), track));
            png::write_surface(&surface, &path)?;
            written.push(path);
        }

        let z_labels = view.axis_labels(perm.z);
        for (z, label) in z_labels.iter().enumerate() {
            let surface = render_page(&view, &perm, &[z], ZMode::FilePerValue, config);
            let path = dir.join(naming::zfile_file_name(&perm.code(), label, track));
            png::write_surface(&surface, &path)?;
            written.push(path);
        }
    }

    log::info!("{track}: wrote {} fingerprint pages", written.len());
    Ok(written)
}

/// Render one page covering the given Z indices.
fn render_page(
    view: &CubeView,
    perm: &AxisPerm,
    z_indices: &[usize],
    zmode: ZMode,
    config: &FingerprintConfig,
) -> Surface {
    let cols = view.axis_len(perm.x);
    let rows = view.axis_len(perm.y);
    let (icols, irows) = match zmode {
        ZMode::RowsWithinCell => (1, z_indices.len()),
        ZMode::ColumnsWithinCell => (z_indices.len(), 1),
        ZMode::FilePerValue => (1, 1),
    };

    let layout = GridLayout::new(cols, rows, icols, irows, config);
    let mut surface = Surface::new(layout.page_width(), layout.page_height(), PAGE_BG);

    // Gaps between cells show this as grid lines.
    let (gx, gy) = layout.grid_origin();
    surface.fill_rect(gx, gy, layout.grid_width(), layout.grid_height(), GRID_LINE);

    for col in 0..cols {
        for row in 0..rows {
            for (slot, &z) in z_indices.iter().enumerate() {
                let (icol, irow) = match zmode {
                    ZMode::RowsWithinCell => (0, slot as u32),
                    ZMode::ColumnsWithinCell => (slot as u32, 0),
                    ZMode::FilePerValue => (0, 0),
                };
                let (px, py) = layout.datapoint_origin(col as u32, row as u32, icol, irow);
                let rgb = match view.value_at(perm, col, row, z) {
                    Some(v) => {
                        let m = view.metric_at(perm, col, row, z);
                        let table_idx = view.metric_indices[m];
                        datapoint_color(
                            table_idx,
                            v,
                            view.metrics[m].is_bipolar(),
                            normalize::METRIC_TABLE.len(),
                        )
                    }
                    None => HOLE,
                };
                surface.fill_rect(px, py, layout.datapoint, layout.datapoint, rgb);
            }
        }
    }

    draw_indicators(&mut surface, view, perm, z_indices, zmode, &layout);
    surface
}

/// Paint min/max color strips for the metric axis in the page gutters,
/// so a reader can anchor each metric's color range without text.
fn draw_indicators(
    surface: &mut Surface,
    view: &CubeView,
    perm: &AxisPerm,
    z_indices: &[usize],
    zmode: ZMode,
    layout: &GridLayout,
) {
    let range_colors = |metric: usize| {
        let spec = view.metrics[metric];
        let table_idx = view.metric_indices[metric];
        let count = normalize::METRIC_TABLE.len();
        let min = datapoint_color(table_idx, spec.min_value(), spec.is_bipolar(), count);
        let max = datapoint_color(table_idx, 1.0, spec.is_bipolar(), count);
        (min, max)
    };

    if perm.x == Axis::Metric {
        // Metrics run across the page: min above each column, max below.
        for col in 0..layout.cols {
            let (min, max) = range_colors(col as usize);
            let (cx, _) = layout.cell_origin(col, 0);
            let w = layout.cell_width();
            surface.fill_rect(cx, layout.top_strip_y(), w, layout.indicator, min);
            surface.fill_rect(cx, layout.bottom_strip_y(), w, layout.indicator, max);
        }
    } else if perm.y == Axis::Metric {
        // Metrics run down the page: min left of each row, max right.
        for row in 0..layout.rows {
            let (min, max) = range_colors(row as usize);
            let (_, cy) = layout.cell_origin(0, row);
            let h = layout.cell_height();
            surface.fill_rect(layout.left_strip_x(), cy, layout.indicator, h, min);
            surface.fill_rect(layout.right_strip_x(), cy, layout.indicator, h, max);
        }
    } else {
        // Metric is on Z; the strips follow wherever Z values land.
        match zmode {
            ZMode::RowsWithinCell => {
                for row in 0..layout.rows {
                    for (slot, &z) in z_indices.iter().enumerate() {
                        let (min, max) = range_colors(z);
                        let (_, cy) = layout.cell_origin(0, row);
                        let y = cy + slot as u32 * layout.datapoint;
                        let h = layout.datapoint;
                        surface.fill_rect(layout.left_strip_x(), y, layout.indicator, h, min);
                        surface.fill_rect(layout.right_strip_x(), y, layout.indicator, h, max);
                    }
                }
            }
            ZMode::ColumnsWithinCell => {
                for col in 0..layout.cols {
                    for (slot, &z) in z_indices.iter().enumerate() {
                        let (min, max) = range_colors(z);
                        let (cx, _) = layout.cell_origin(col, 0);
                        let x = cx + slot as u32 * layout.datapoint;
                        let w = layout.datapoint;
                        surface.fill_rect(x, layout.top_strip_y(), w, layout.indicator, min);
                        surface.fill_rect(x, layout.bottom_strip_y(), w, layout.indicator, max);
                    }
                }
            }
            ZMode::FilePerValue => {
                // One metric per page: full-width strips top and bottom.
                let (min, max) = range_colors(z_indices[0]);
                let (gx, _) = layout.grid_origin();
                let w = layout.grid_width();
                surface.fill_rect(gx, layout.top_strip_y(), w, layout.indicator, min);
                surface.fill_rect(gx, layout.bottom_strip_y(), w, layout.indicator, max);
            }
        }
    }
}

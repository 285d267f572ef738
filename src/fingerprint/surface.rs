//! Pixel buffer and grid geometry for fingerprint pages.
//!
//! A page is a grid of cells with one pixel of spacing between them,
//! framed by indicator gutters on all four sides and outer padding.
//! Each cell holds an intracell grid of square datapoints, so a cell
//! can carry a whole Z-axis worth of values.

use crate::config::FingerprintConfig;

use super::color::Rgb;

/// Background showing through between cells as grid lines.
pub const GRID_LINE: Rgb = [0x99, 0x99, 0x99];
/// Missing datapoints render as black.
pub const HOLE: Rgb = [0x00, 0x00, 0x00];
/// Page background outside the grid.
pub const PAGE_BG: Rgb = [0xff, 0xff, 0xff];

/// A fixed-size RGB8 raster.
pub struct Surface {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Surface {
    pub fn new(width: u32, height: u32, fill: Rgb) -> Self {
        let mut data = Vec::with_capacity((width * height * 3) as usize);
        for _ in 0..width * height {
            data.extend_from_slice(&fill);
        }
        Self {
            width,
            height,
            data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Fill a rectangle, clipped to the surface.
    pub fn fill_rect(&mut self, x: u32, y: u32, w: u32, h: u32, color: Rgb) {
        let x_end = (x + w).min(self.width);
        let y_end = (y + h).min(self.height);
        for py in y.min(self.height)..y_end {
            for px in x..x_end {
                let idx = ((py * self.width + px) * 3) as usize;
                self.data[idx..idx + 3].copy_from_slice(&color);
            }
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> Rgb {
        let idx = ((y * self.width + x) * 3) as usize;
        [self.data[idx], self.data[idx + 1], self.data[idx + 2]]
    }
}

/// Pixel geometry of one page: a cols x rows cell grid where each cell
/// is an intracell_cols x intracell_rows block of datapoints.
#[derive(Debug, Clone, Copy)]
pub struct GridLayout {
    pub cols: u32,
    pub rows: u32,
    pub intracell_cols: u32,
    pub intracell_rows: u32,
    pub datapoint: u32,
    pub padding: u32,
    pub spacing: u32,
    pub indicator: u32,
}

impl GridLayout {
    pub fn new(
        cols: usize,
        rows: usize,
        intracell_cols: usize,
        intracell_rows: usize,
        config: &FingerprintConfig,
    ) -> Self {
        Self {
            cols: cols as u32,
            rows: rows as u32,
            intracell_cols: intracell_cols as u32,
            intracell_rows: intracell_rows as u32,
            datapoint: config.datapoint_px,
            padding: config.padding_px,
            spacing: config.spacing_px,
            indicator: config.indicator_px,
        }
    }

    pub fn cell_width(&self) -> u32 {
        self.intracell_cols * self.datapoint
    }

    pub fn cell_height(&self) -> u32 {
        self.intracell_rows * self.datapoint
    }

    pub fn grid_width(&self) -> u32 {
        self.cols * self.cell_width() + (self.cols - 1) * self.spacing
    }

    pub fn grid_height(&self) -> u32 {
        self.rows * self.cell_height() + (self.rows - 1) * self.spacing
    }

    /// Top-left corner of the cell grid.
    pub fn grid_origin(&self) -> (u32, u32) {
        let edge = self.padding + self.indicator + self.spacing;
        (edge, edge)
    }

    pub fn page_width(&self) -> u32 {
        2 * (self.padding + self.indicator + self.spacing) + self.grid_width()
    }

    pub fn page_height(&self) -> u32 {
        2 * (self.padding + self.indicator + self.spacing) + self.grid_height()
    }

    pub fn cell_origin(&self, col: u32, row: u32) -> (u32, u32) {
        let (gx, gy) = self.grid_origin();
        (
            gx + col * (self.cell_width() + self.spacing),
            gy + row * (self.cell_height() + self.spacing),
        )
    }

    /// Top-left corner of one datapoint inside a cell.
    pub fn datapoint_origin(&self, col: u32, row: u32, icol: u32, irow: u32) -> (u32, u32) {
        let (cx, cy) = self.cell_origin(col, row);
        (cx + icol * self.datapoint, cy + irow * self.datapoint)
    }

    /// X coordinate of the left indicator gutter.
    pub fn left_strip_x(&self) -> u32 {
        self.padding
    }

    /// X coordinate of the right indicator gutter.
    pub fn right_strip_x(&self) -> u32 {
        self.grid_origin().0 + self.grid_width() + self.spacing
    }

    /// Y coordinate of the top indicator gutter.
    pub fn top_strip_y(&self) -> u32 {
        self.padding
    }

    /// Y coordinate of the bottom indicator gutter.
    pub fn bottom_strip_y(&self) -> u32 {
        self.grid_origin().1 + self.grid_height() + self.spacing
    }
}

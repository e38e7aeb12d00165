//! Screen ↔ canvas transforms and grid-cell addressing.
//!
//! `x`/`y` are the pan offset in screen pixels and `scale` the uniform zoom
//! factor, so `screen = canvas * scale + offset`.
//!
//! The visible screen is split into an 8×8 grid: columns `A`–`H` left to
//! right, rows `1`–`8` top to bottom. Cell codes let an external mutation
//! source say "put it in C4" instead of quoting raw coordinates.

#[cfg(test)]
#[path = "viewport_test.rs"]
mod viewport_test;

use std::fmt;
use std::str::FromStr;

use crate::net::types::Point;

pub const MIN_SCALE: f64 = 0.1;
pub const MAX_SCALE: f64 = 5.0;
/// Cells per side of the viewport grid.
pub const GRID_SIZE: u8 = 8;
/// Screen size assumed until a caller reports the real one.
pub const DEFAULT_SCREEN_WIDTH: f64 = 1280.0;
pub const DEFAULT_SCREEN_HEIGHT: f64 = 800.0;

/// Pan/zoom state of the local view.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub x: f64,
    pub y: f64,
    pub scale: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self { x: 0.0, y: 0.0, scale: 1.0 }
    }
}

impl Viewport {
    /// Viewport with `scale` clamped to the supported range.
    #[must_use]
    pub fn new(x: f64, y: f64, scale: f64) -> Self {
        Self { x, y, scale: clamp_scale(scale) }
    }

    #[must_use]
    pub fn screen_to_canvas(&self, screen: Point) -> Point {
        Point { x: (screen.x - self.x) / self.scale, y: (screen.y - self.y) / self.scale }
    }

    #[must_use]
    pub fn canvas_to_screen(&self, canvas: Point) -> Point {
        Point { x: canvas.x * self.scale + self.x, y: canvas.y * self.scale + self.y }
    }

    /// Shift the view by a screen-space delta.
    pub fn pan_by(&mut self, dx: f64, dy: f64) {
        self.x += dx;
        self.y += dy;
    }

    /// Set the zoom while keeping the canvas point under `anchor` fixed.
    pub fn set_scale_at(&mut self, anchor: Point, scale: f64) {
        if !scale.is_finite() || scale <= 0.0 {
            return;
        }
        let pinned = self.screen_to_canvas(anchor);
        self.scale = clamp_scale(scale);
        self.x = anchor.x - pinned.x * self.scale;
        self.y = anchor.y - pinned.y * self.scale;
    }

    /// Multiply the zoom by `factor` around the screen point `anchor`.
    pub fn zoom_at(&mut self, anchor: Point, factor: f64) {
        self.set_scale_at(anchor, self.scale * factor);
    }
}

fn clamp_scale(scale: f64) -> f64 {
    if scale.is_finite() { scale.clamp(MIN_SCALE, MAX_SCALE) } else { 1.0 }
}

/// One grid cell, `A1` (top-left) to `H8` (bottom-right).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellCode {
    row: u8,
    col: u8,
}

impl CellCode {
    /// Zero-based column and row; `None` outside the grid.
    #[must_use]
    pub fn new(col: u8, row: u8) -> Option<Self> {
        (col < GRID_SIZE && row < GRID_SIZE).then_some(Self { row, col })
    }

    #[must_use]
    pub fn col(self) -> u8 {
        self.col
    }

    #[must_use]
    pub fn row(self) -> u8 {
        self.row
    }

    /// All 64 cells in row-major order.
    pub fn all() -> impl Iterator<Item = Self> {
        (0..GRID_SIZE).flat_map(|row| (0..GRID_SIZE).map(move |col| Self { row, col }))
    }
}

impl fmt::Display for CellCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", char::from(b'A' + self.col), self.row + 1)
    }
}

/// A cell code that is not `A1`–`H8`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid grid cell `{0}`")]
pub struct InvalidCell(pub String);

impl FromStr for CellCode {
    type Err = InvalidCell;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidCell(s.to_owned());
        let bytes = s.trim().as_bytes();
        let [letter, digit] = bytes else {
            return Err(invalid());
        };
        let col = letter.to_ascii_uppercase().wrapping_sub(b'A');
        let row = digit.wrapping_sub(b'1');
        Self::new(col, row).ok_or_else(invalid)
    }
}

/// A viewport together with the screen size it is drawn into.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewportGrid {
    pub viewport: Viewport,
    /// Screen width in pixels.
    pub width: f64,
    /// Screen height in pixels.
    pub height: f64,
}

impl Default for ViewportGrid {
    fn default() -> Self {
        Self::new(Viewport::default(), DEFAULT_SCREEN_WIDTH, DEFAULT_SCREEN_HEIGHT)
    }
}

impl ViewportGrid {
    #[must_use]
    pub fn new(viewport: Viewport, width: f64, height: f64) -> Self {
        Self { viewport, width: width.max(1.0), height: height.max(1.0) }
    }

    fn cell_width(&self) -> f64 {
        self.width / f64::from(GRID_SIZE)
    }

    fn cell_height(&self) -> f64 {
        self.height / f64::from(GRID_SIZE)
    }

    /// Canvas-space center of `cell`.
    #[must_use]
    pub fn cell_to_canvas(&self, cell: CellCode) -> Point {
        let screen = Point {
            x: (f64::from(cell.col) + 0.5) * self.cell_width(),
            y: (f64::from(cell.row) + 0.5) * self.cell_height(),
        };
        self.viewport.screen_to_canvas(screen)
    }

    /// Cell containing the canvas point, clamped to the grid edges.
    #[must_use]
    pub fn canvas_to_cell(&self, canvas: Point) -> CellCode {
        let screen = self.viewport.canvas_to_screen(canvas);
        CellCode { col: grid_index(screen.x / self.cell_width()), row: grid_index(screen.y / self.cell_height()) }
    }

    /// Textual table of every cell's canvas-space center.
    ///
    /// One header line, then one line per row: `A1=(x,y) B1=(x,y) ...`,
    /// coordinates rounded to whole canvas units.
    #[must_use]
    pub fn build_grid_context(&self) -> String {
        let mut out = String::from(
            "Viewport grid 8x8 (columns A-H left to right, rows 1-8 top to bottom), canvas coordinates of each cell center:\n",
        );
        for row in 0..GRID_SIZE {
            let line = (0..GRID_SIZE)
                .map(|col| {
                    let cell = CellCode { row, col };
                    let center = self.cell_to_canvas(cell);
                    format!("{cell}=({},{})", whole(center.x), whole(center.y))
                })
                .collect::<Vec<_>>()
                .join(" ");
            out.push_str(&line);
            out.push('\n');
        }
        out
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn grid_index(position: f64) -> u8 {
    if !position.is_finite() {
        return if position > 0.0 { GRID_SIZE - 1 } else { 0 };
    }
    position.floor().clamp(0.0, f64::from(GRID_SIZE - 1)) as u8
}

fn whole(value: f64) -> String {
    let rounded = value.round();
    let rounded = if rounded == 0.0 { 0.0 } else { rounded };
    format!("{rounded:.0}")
}

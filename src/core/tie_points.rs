//! Tie-point grids of geometry and Earth location.
//!
//! Every scan line stores angles and positions for 51 points spaced along
//! the scan. The grids keep every `step_y`-th product line plus the last
//! line, already rotated into product orientation.

use crate::io::layout::{field, DimensionInfo, TIE_POINTS_PER_LINE};
use crate::io::store::{Record, ScanLineStore};
use crate::types::{AvhrrResult, FormatFamily, Orientation, NO_DATA_VALUE};
use ndarray::Array2;
use serde::Serialize;

const EARTH_RADIUS_KM: f64 = 6371.0;
const NOMINAL_ALTITUDE_KM: f64 = 833.0;
/// Scan angle between adjacent full-resolution pixels, in degrees
const SCAN_STEP_DEG: f64 = 55.37 / 1024.0;

/// One sub-sampled grid over the product raster
#[derive(Debug, Clone, Serialize)]
pub struct TiePointGrid {
    pub name: &'static str,
    pub unit: &'static str,
    /// Product pixel of the first column
    pub offset_x: f64,
    pub step_x: f64,
    /// Nominal spacing of the rows
    pub step_y: f64,
    /// Product line of every row; the last row is clamped to the final line
    pub row_lines: Vec<usize>,
    #[serde(skip)]
    pub data: Array2<f32>,
}

impl TiePointGrid {
    fn new(
        name: &'static str,
        unit: &'static str,
        dim: &DimensionInfo,
        row_lines: &[usize],
        orientation: Orientation,
    ) -> Self {
        let last_raw_pixel = dim.tie_point_offset_x + (dim.tie_point_grid_width - 1) * dim.tie_point_step_x;
        // reversed columns start at the mirror of the last raw tie point
        let offset_x = match orientation {
            Orientation::Northbound => dim.tie_point_offset_x,
            Orientation::Southbound => dim.pixels - 1 - last_raw_pixel,
        };
        Self {
            name,
            unit,
            offset_x: offset_x as f64,
            step_x: dim.tie_point_step_x as f64,
            step_y: dim.tie_point_step_y as f64,
            row_lines: row_lines.to_vec(),
            data: Array2::from_elem((row_lines.len(), dim.tie_point_grid_width), NO_DATA_VALUE),
        }
    }

    pub fn width(&self) -> usize {
        self.data.ncols()
    }

    pub fn height(&self) -> usize {
        self.data.nrows()
    }

    /// Bilinear value at product pixel `(x, y)`; extrapolates flat past the edges
    pub fn interpolate(&self, x: f64, y: f64) -> f32 {
        let fx = ((x - self.offset_x) / self.step_x).clamp(0.0, (self.width() - 1) as f64);
        let x0 = fx.floor() as usize;
        let x1 = (x0 + 1).min(self.width() - 1);
        let wx = fx - x0 as f64;
        let (y0, y1, wy) = self.row_weights(y);

        let v = |r: usize, c: usize| f64::from(self.data[[r, c]]);
        let top = v(y0, x0) * (1.0 - wx) + v(y0, x1) * wx;
        let bottom = v(y1, x0) * (1.0 - wx) + v(y1, x1) * wx;
        (top * (1.0 - wy) + bottom * wy) as f32
    }

    /// Rows bracketing product line `y` and the weight given to the second
    fn row_weights(&self, y: f64) -> (usize, usize, f64) {
        let last = self.height() - 1;
        let upper = self.row_lines.iter().position(|&line| line as f64 > y);
        match upper {
            Some(0) => (0, 0, 0.0),
            None => (last, last, 0.0),
            Some(r1) => {
                let r0 = r1 - 1;
                let (y0, y1) = (self.row_lines[r0] as f64, self.row_lines[r1] as f64);
                (r0, r1, (y - y0) / (y1 - y0))
            }
        }
    }
}

/// The five geometry grids of a file
#[derive(Debug, Clone, Serialize)]
pub struct TiePointGrids {
    pub sun_zenith: TiePointGrid,
    pub view_zenith: TiePointGrid,
    pub relative_azimuth: TiePointGrid,
    pub latitude: TiePointGrid,
    pub longitude: TiePointGrid,
}

impl TiePointGrids {
    pub fn iter(&self) -> impl Iterator<Item = &TiePointGrid> {
        [
            &self.sun_zenith,
            &self.view_zenith,
            &self.relative_azimuth,
            &self.latitude,
            &self.longitude,
        ]
        .into_iter()
    }
}

/// Tie points of one raw scan line in raw (scan) order
struct LineTiePoints {
    sun_zenith: Vec<f32>,
    view_zenith: Vec<f32>,
    relative_azimuth: Vec<f32>,
    latitude: Vec<f32>,
    longitude: Vec<f32>,
}

/// Number of grid rows for a product of `height` lines
pub fn grid_height(height: usize, step_y: usize) -> usize {
    height / step_y + 1
}

/// Raw scan line sampled by grid row `row`
pub fn raw_line_for_row(row: usize, height: usize, step_y: usize, orientation: Orientation) -> usize {
    let product_line = (row * step_y).min(height - 1);
    match orientation {
        Orientation::Northbound => product_line,
        Orientation::Southbound => height - 1 - product_line,
    }
}

/// Read the tie-point grids of every sampled scan line
pub fn extract(store: &ScanLineStore, orientation: Orientation) -> AvhrrResult<TiePointGrids> {
    let dim = store.layout().dimension;
    let family = store.layout().family;
    let height = store.record_count();
    let rows = grid_height(height, dim.tie_point_step_y);

    let row_lines: Vec<usize> = (0..rows).map(|r| (r * dim.tie_point_step_y).min(height - 1)).collect();
    let grid = |name, unit| TiePointGrid::new(name, unit, &dim, &row_lines, orientation);
    let mut grids = TiePointGrids {
        sun_zenith: grid("sun_zenith", "deg"),
        view_zenith: grid("view_zenith", "deg"),
        relative_azimuth: grid("delta_azimuth", "deg"),
        latitude: grid("latitude", "deg"),
        longitude: grid("longitude", "deg"),
    };

    let pod_view_zenith = nominal_view_zenith_row(&dim);
    log::debug!(
        "Extracting {} x {} tie points ({:?}, every {} lines)",
        dim.tie_point_grid_width,
        rows,
        orientation,
        dim.tie_point_step_y
    );

    for row in 0..rows {
        let raw = raw_line_for_row(row, height, dim.tie_point_step_y, orientation);
        let line = match family {
            FormatFamily::Klm => read_klm_line(store, raw)?,
            FormatFamily::Pod => read_pod_line(store, raw, &pod_view_zenith)?,
        };

        let targets = [
            (&mut grids.sun_zenith, &line.sun_zenith),
            (&mut grids.view_zenith, &line.view_zenith),
            (&mut grids.relative_azimuth, &line.relative_azimuth),
            (&mut grids.latitude, &line.latitude),
            (&mut grids.longitude, &line.longitude),
        ];
        for (grid, values) in targets {
            let mut out = grid.data.row_mut(row);
            for (col, &value) in values.iter().enumerate().take(TIE_POINTS_PER_LINE) {
                let target = match orientation {
                    Orientation::Northbound => col,
                    Orientation::Southbound => TIE_POINTS_PER_LINE - 1 - col,
                };
                out[target] = value;
            }
        }
    }

    Ok(grids)
}

fn read_klm_line(store: &ScanLineStore, raw: usize) -> AvhrrResult<LineTiePoints> {
    let angles = store.read_scaled_array(Record::Line(raw), field::ANGULAR_RELATIONSHIPS)?;
    let location = store.read_scaled_array(Record::Line(raw), field::EARTH_LOCATION)?;
    let pick = |values: &[f64], stride: usize, k: usize| -> Vec<f32> {
        values.iter().skip(k).step_by(stride).map(|&v| v as f32).collect()
    };
    Ok(LineTiePoints {
        sun_zenith: pick(&angles, 3, 0),
        view_zenith: pick(&angles, 3, 1),
        relative_azimuth: pick(&angles, 3, 2),
        latitude: pick(&location, 2, 0),
        longitude: pick(&location, 2, 1),
    })
}

fn read_pod_line(store: &ScanLineStore, raw: usize, view_zenith: &[f32]) -> AvhrrResult<LineTiePoints> {
    let sun_zenith = store.read_scaled_array(Record::Line(raw), field::SOLAR_ZENITH_ANGLES)?;
    let location = store.read_scaled_array(Record::Line(raw), field::EARTH_LOCATION)?;
    Ok(LineTiePoints {
        sun_zenith: sun_zenith.iter().map(|&v| v as f32).collect(),
        view_zenith: view_zenith.to_vec(),
        relative_azimuth: vec![NO_DATA_VALUE; TIE_POINTS_PER_LINE],
        latitude: location.iter().step_by(2).map(|&v| v as f32).collect(),
        longitude: location.iter().skip(1).step_by(2).map(|&v| v as f32).collect(),
    })
}

/// View zenith at a raw pixel for a spherical Earth and nominal altitude
pub fn nominal_view_zenith(pixel: usize, pixels: usize) -> f64 {
    let centre = (pixels as f64 - 1.0) / 2.0;
    // GAC pixels span the same swath as the full-resolution scan
    let step = SCAN_STEP_DEG * 2048.0 / pixels as f64;
    let scan_angle = ((pixel as f64 - centre) * step).to_radians();
    let ratio = (EARTH_RADIUS_KM + NOMINAL_ALTITUDE_KM) / EARTH_RADIUS_KM;
    (ratio * scan_angle.sin()).clamp(-1.0, 1.0).asin().to_degrees().abs()
}

fn nominal_view_zenith_row(dim: &DimensionInfo) -> Vec<f32> {
    (0..dim.tie_point_grid_width)
        .map(|k| {
            let pixel = dim.tie_point_offset_x + k * dim.tie_point_step_x;
            nominal_view_zenith(pixel, dim.pixels) as f32
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProductDimension;
    use approx::assert_relative_eq;

    #[test]
    fn test_row_sampling() {
        assert_eq!(grid_height(10, 40), 1);
        assert_eq!(grid_height(81, 40), 3);
        assert_eq!(raw_line_for_row(0, 10, 40, Orientation::Southbound), 9);
        assert_eq!(raw_line_for_row(2, 81, 40, Orientation::Northbound), 80);
        // last row is clamped to the final line
        assert_eq!(raw_line_for_row(2, 90, 40, Orientation::Northbound), 80);
        assert_eq!(raw_line_for_row(3, 90, 40, Orientation::Northbound), 89);
        assert_eq!(raw_line_for_row(3, 90, 40, Orientation::Southbound), 0);
    }

    #[test]
    fn test_nominal_view_zenith() {
        assert!(nominal_view_zenith(1024, 2048) < 0.1);
        let edge = nominal_view_zenith(0, 2048);
        assert!(edge > 65.0 && edge < 70.0, "edge view zenith {}", edge);
        assert_relative_eq!(nominal_view_zenith(0, 409), nominal_view_zenith(408, 409), epsilon = 1e-9);
    }

    #[test]
    fn test_interpolation() {
        let dim = DimensionInfo::of(ProductDimension::Gac);
        let mut grid = TiePointGrid::new("latitude", "deg", &dim, &[0, 8], Orientation::Northbound);
        for ((r, c), v) in grid.data.indexed_iter_mut() {
            *v = (r * 100 + c) as f32;
        }
        assert_relative_eq!(grid.interpolate(4.0, 0.0), 0.0);
        assert_relative_eq!(grid.interpolate(8.0, 4.0), 50.5);
        assert_relative_eq!(grid.interpolate(-10.0, 100.0), 100.0);
    }

    #[test]
    fn test_interpolation_follows_clamped_last_row() {
        // 80 lines every 40: rows at 0, 40 and 79
        let dim = DimensionInfo::of(ProductDimension::Hrpt);
        let mut grid = TiePointGrid::new("latitude", "deg", &dim, &[0, 40, 79], Orientation::Northbound);
        for ((r, _), v) in grid.data.indexed_iter_mut() {
            *v = [0.0, 40.0, 79.0][r];
        }
        assert_relative_eq!(grid.interpolate(500.0, 60.0), 60.0, epsilon = 1e-4);
        assert_relative_eq!(grid.interpolate(500.0, 79.0), 79.0, epsilon = 1e-4);
        assert_relative_eq!(grid.interpolate(500.0, 20.0), 20.0, epsilon = 1e-4);
    }

    #[test]
    fn test_southbound_column_offset_mirrors_raw_pixels() {
        let hrpt = DimensionInfo::of(ProductDimension::Hrpt);
        let grid = TiePointGrid::new("longitude", "deg", &hrpt, &[0], Orientation::Southbound);
        // raw tie point 50 at pixel 2024 is product pixel 23
        assert_relative_eq!(grid.offset_x, 23.0);
        let gac = DimensionInfo::of(ProductDimension::Gac);
        let grid = TiePointGrid::new("longitude", "deg", &gac, &[0], Orientation::Southbound);
        assert_relative_eq!(grid.offset_x, 4.0);
    }
}

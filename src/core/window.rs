//! Mapping of product-space read requests onto raw scan lines and pixels.
//!
//! The product raster always shows the scene north up. For southbound
//! passes that is the raw raster rotated by 180 degrees, so reads walk the
//! raw data forward and fill the destination from its last element
//! backwards.

use crate::types::{AvhrrError, AvhrrResult, Orientation};
use serde::{Deserialize, Serialize};

/// Sub-sampled rectangle of the product raster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub offset_x: usize,
    pub offset_y: usize,
    pub width: usize,
    pub height: usize,
    pub step_x: usize,
    pub step_y: usize,
}

impl Window {
    /// Full-resolution window
    pub fn new(offset_x: usize, offset_y: usize, width: usize, height: usize) -> Self {
        Self { offset_x, offset_y, width, height, step_x: 1, step_y: 1 }
    }

    pub fn with_steps(mut self, step_x: usize, step_y: usize) -> Self {
        self.step_x = step_x;
        self.step_y = step_y;
        self
    }

    /// Whole product at full resolution
    pub fn full(width: usize, height: usize) -> Self {
        Self::new(0, 0, width, height)
    }

    pub fn dest_width(&self) -> usize {
        self.width.div_ceil(self.step_x.max(1))
    }

    pub fn dest_height(&self) -> usize {
        self.height.div_ceil(self.step_y.max(1))
    }

    pub fn dest_len(&self) -> usize {
        self.dest_width() * self.dest_height()
    }

    /// Reject empty, zero-step or out-of-bounds windows
    pub fn validate(&self, product_width: usize, product_height: usize) -> AvhrrResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(AvhrrError::InvalidRequest(format!("empty window {:?}", self)));
        }
        if self.step_x == 0 || self.step_y == 0 {
            return Err(AvhrrError::InvalidRequest(format!("zero sub-sampling step in {:?}", self)));
        }
        let end_x = self.offset_x.checked_add(self.width);
        let end_y = self.offset_y.checked_add(self.height);
        let inside = matches!((end_x, end_y), (Some(x), Some(y)) if x <= product_width && y <= product_height);
        if !inside {
            return Err(AvhrrError::InvalidRequest(format!(
                "window {}x{}+{}+{} exceeds the {}x{} product raster",
                self.width, self.height, self.offset_x, self.offset_y, product_width, product_height
            )));
        }
        Ok(())
    }
}

/// Raw-space bounds of a request and where its samples land in the destination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawCoordinates {
    pub min_x: usize,
    pub max_x: usize,
    pub min_y: usize,
    pub max_y: usize,
    pub step_x: usize,
    pub step_y: usize,
    pub dest_width: usize,
    pub dest_height: usize,
    pub target_start: usize,
    pub target_increment: isize,
}

impl RawCoordinates {
    /// Map `window` into raw space for a `width` x `height` product.
    ///
    /// Callers validate the window first; nothing is clamped here.
    pub fn compute(window: &Window, width: usize, height: usize, orientation: Orientation) -> Self {
        let dest_width = window.dest_width();
        let dest_height = window.dest_height();
        let span_x = (dest_width - 1) * window.step_x;
        let span_y = (dest_height - 1) * window.step_y;

        let (min_x, max_x, min_y, max_y, target_start, target_increment) = match orientation {
            Orientation::Northbound => (
                window.offset_x,
                window.offset_x + span_x,
                window.offset_y,
                window.offset_y + span_y,
                0,
                1,
            ),
            Orientation::Southbound => {
                let max_x = width - 1 - window.offset_x;
                let max_y = height - 1 - window.offset_y;
                (max_x - span_x, max_x, max_y - span_y, max_y, dest_width * dest_height - 1, -1)
            }
        };

        Self {
            min_x,
            max_x,
            min_y,
            max_y,
            step_x: window.step_x,
            step_y: window.step_y,
            dest_width,
            dest_height,
            target_start,
            target_increment,
        }
    }

    /// Raw scan lines in file order
    pub fn lines(&self) -> impl Iterator<Item = usize> {
        (self.min_y..=self.max_y).step_by(self.step_y)
    }

    /// Raw pixel columns in scan order
    pub fn columns(&self) -> impl Iterator<Item = usize> {
        (self.min_x..=self.max_x).step_by(self.step_x)
    }

    /// Destination index of the `row`-th raw line's `col`-th sample
    pub fn target_index(&self, row: usize, col: usize) -> usize {
        let linear = (row * self.dest_width + col) as isize;
        (self.target_start as isize + self.target_increment * linear) as usize
    }
}

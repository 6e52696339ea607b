// THEORY:
// A `FlowField` is the output of block matching: one integer motion vector per
// block, stored as two row-major planes (`velx`, `vely`). Its grid is fixed by
// the frame size and block size at setup and overwritten in place every tick.
// `summary` folds it into the few numbers that are sent every tick.

use serde::Serialize;

/// One motion vector per block of the source frame, in row-major order.
///
/// The grid size is fixed when the field is created and never changes; the
/// estimator overwrites the vectors in place every tick.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowField {
    cols: u32,
    rows: u32,
    velx: Vec<i32>,
    vely: Vec<i32>,
}

/// Aggregate of a flow field, small enough to send every tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct FlowSummary {
    pub mean_dx: f32,
    pub mean_dy: f32,
    pub mean_magnitude: f32,
    /// Blocks whose vector is not zero.
    pub moving_blocks: u32,
}

impl FlowField {
    pub fn new(cols: u32, rows: u32) -> Self {
        let size = (cols * rows) as usize;
        Self {
            cols,
            rows,
            velx: vec![0; size],
            vely: vec![0; size],
        }
    }

    /// Get `(cols, rows)` of the field.
    pub fn dim(&self) -> (u32, u32) {
        (self.cols, self.rows)
    }

    /// Number of vectors, `cols * rows`.
    pub fn len(&self) -> usize {
        self.velx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.velx.is_empty()
    }

    pub fn get(&self, col: u32, row: u32) -> (i32, i32) {
        let idx = (row * self.cols + col) as usize;
        (self.velx[idx], self.vely[idx])
    }

    pub fn set(&mut self, col: u32, row: u32, motion: (i32, i32)) {
        let idx = (row * self.cols + col) as usize;
        self.velx[idx] = motion.0;
        self.vely[idx] = motion.1;
    }

    /// Zeroes every vector.
    pub fn clear(&mut self) {
        self.velx.iter_mut().for_each(|v| *v = 0);
        self.vely.iter_mut().for_each(|v| *v = 0);
    }

    pub fn velx(&self) -> &[i32] {
        &self.velx
    }

    pub fn vely(&self) -> &[i32] {
        &self.vely
    }

    /// Iterate every element of the field.
    ///
    /// The resulting iterator yields `(col, row, (dx, dy))` entries.
    pub fn iter(&self) -> impl Iterator<Item = (u32, u32, (i32, i32))> + '_ {
        let cols = self.cols;
        self.velx
            .iter()
            .zip(&self.vely)
            .enumerate()
            .map(move |(i, (&dx, &dy))| (i as u32 % cols, i as u32 / cols, (dx, dy)))
    }

    pub fn summary(&self) -> FlowSummary {
        if self.is_empty() {
            return FlowSummary::default();
        }

        let mut sum_dx = 0i64;
        let mut sum_dy = 0i64;
        let mut sum_magnitude = 0f32;
        let mut moving_blocks = 0;

        for (_, _, (dx, dy)) in self.iter() {
            sum_dx += dx as i64;
            sum_dy += dy as i64;
            sum_magnitude += ((dx * dx + dy * dy) as f32).sqrt();
            if dx != 0 || dy != 0 {
                moving_blocks += 1;
            }
        }

        let n = self.len() as f32;
        FlowSummary {
            mean_dx: sum_dx as f32 / n,
            mean_dy: sum_dy as f32 / n,
            mean_magnitude: sum_magnitude / n,
            moving_blocks,
        }
    }
}

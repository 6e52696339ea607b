// THEORY:
// The `BlockMatcher` estimates optical flow by brute-force block matching. It
// is the most expensive stage of a tick, so it owns nothing that needs to be
// reallocated and writes straight into a `FlowField` that lives as long as the
// pipeline.
//
// Algorithm:
// 1.  **Partition**: the previous frame is cut into non-overlapping square blocks
//     of `block_size`. Pixels past the last full block are not covered.
// 2.  **Search**: for each block, candidate offsets from `-max_range` to
//     `+max_range` are visited in steps of `shift_size` on both axes. Offsets
//     that would put the candidate block outside the current frame are clamped
//     away, so edge blocks search a smaller window instead of being skipped.
// 3.  **Score**: each candidate is scored by the sum of absolute differences
//     (SAD). The zero offset is scored first and only a strictly smaller SAD
//     replaces it, so a static or featureless block always reports (0, 0).
// 4.  **Record**: the winning offset is that block's motion vector.
//
// Cost is `rows * cols * (2 * max_range / shift + 1)^2 * block_size^2`.

use crate::core_modules::flow_field::FlowField;
use crate::error::{CueError, Result};
use image::GrayImage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockMatchParams {
    pub block_size: u32,
    pub shift_size: u32,
    pub max_range: u32,
}

pub struct BlockMatcher {
    params: BlockMatchParams,
    width: u32,
    height: u32,
}

impl BlockMatcher {
    /// Validates the parameters against the frame size the matcher will see.
    pub fn new(params: BlockMatchParams, width: u32, height: u32) -> Result<Self> {
        if params.shift_size == 0 {
            return Err(CueError::config("block matching shift size must be positive"));
        }
        if params.max_range == 0 {
            return Err(CueError::config("block matching max range must be positive"));
        }
        if params.block_size == 0 || params.block_size > width || params.block_size > height {
            return Err(CueError::config(format!(
                "block size {} does not fit a {width}x{height} frame",
                params.block_size
            )));
        }
        Ok(Self {
            params,
            width,
            height,
        })
    }

    pub fn params(&self) -> BlockMatchParams {
        self.params
    }

    /// A field with the grid size this matcher fills.
    pub fn new_field(&self) -> FlowField {
        FlowField::new(
            self.width / self.params.block_size,
            self.height / self.params.block_size,
        )
    }

    /// Estimates per-block motion from `previous` to `current` into `field`.
    pub fn estimate(
        &self,
        previous: &GrayImage,
        current: &GrayImage,
        field: &mut FlowField,
    ) -> Result<()> {
        let expected = (self.width, self.height);
        if previous.dimensions() != expected || current.dimensions() != expected {
            return Err(CueError::config(format!(
                "block matcher sized {expected:?} was given {:?} and {:?}",
                previous.dimensions(),
                current.dimensions()
            )));
        }
        let grid = (
            self.width / self.params.block_size,
            self.height / self.params.block_size,
        );
        if field.dim() != grid {
            return Err(CueError::config(format!(
                "flow field is {:?} but the block grid is {grid:?}",
                field.dim()
            )));
        }

        let block = self.params.block_size as i32;
        let (cols, rows) = grid;
        for row in 0..rows {
            for col in 0..cols {
                let origin = (col as i32 * block, row as i32 * block);
                let motion = self.best_offset(previous, current, origin);
                field.set(col, row, motion);
            }
        }
        Ok(())
    }

    fn best_offset(
        &self,
        previous: &GrayImage,
        current: &GrayImage,
        origin: (i32, i32),
    ) -> (i32, i32) {
        let block = self.params.block_size as i32;
        let range = self.params.max_range as i32;
        let shift = self.params.shift_size as i32;

        // Clamp the search window so every candidate block lies inside the frame.
        let min_dx = (-range).max(-origin.0);
        let max_dx = range.min(self.width as i32 - block - origin.0);
        let min_dy = (-range).max(-origin.1);
        let max_dy = range.min(self.height as i32 - block - origin.1);

        let mut best = (0, 0);
        let mut best_sad = self.sad(previous, current, origin, (0, 0));
        if best_sad == 0 {
            return best;
        }

        // Walk the lattice -range, -range + shift, ... that passes through 0,
        // keeping only the offsets inside the clamped window.
        let first = |min: i32| -> i32 {
            let steps_back = (-min) / shift;
            -steps_back * shift
        };

        let mut dy = first(min_dy);
        while dy <= max_dy {
            let mut dx = first(min_dx);
            while dx <= max_dx {
                if (dx, dy) != (0, 0) {
                    let sad = self.sad_bounded(previous, current, origin, (dx, dy), best_sad);
                    if sad < best_sad {
                        best_sad = sad;
                        best = (dx, dy);
                    }
                }
                dx += shift;
            }
            dy += shift;
        }

        best
    }

    fn sad(&self, previous: &GrayImage, current: &GrayImage, origin: (i32, i32), offset: (i32, i32)) -> u64 {
        self.sad_bounded(previous, current, origin, offset, u64::MAX)
    }

    /// SAD between the block at `origin` in `previous` and the block at
    /// `origin + offset` in `current`. Stops early once `limit` is reached.
    fn sad_bounded(
        &self,
        previous: &GrayImage,
        current: &GrayImage,
        origin: (i32, i32),
        offset: (i32, i32),
        limit: u64,
    ) -> u64 {
        let block = self.params.block_size as usize;
        let stride = self.width as usize;
        let prev = previous.as_raw();
        let curr = current.as_raw();

        let (px, py) = (origin.0 as usize, origin.1 as usize);
        let (cx, cy) = ((origin.0 + offset.0) as usize, (origin.1 + offset.1) as usize);

        let mut sad = 0u64;
        for row in 0..block {
            let p = (py + row) * stride + px;
            let c = (cy + row) * stride + cx;
            sad += prev[p..p + block]
                .iter()
                .zip(&curr[c..c + block])
                .map(|(&a, &b)| a.abs_diff(b) as u64)
                .sum::<u64>();
            if sad >= limit {
                return sad;
            }
        }
        sad
    }
}

// THEORY:
// The `difference` module provides the comparative operators of the engine.
// Like a pairwise pixel comparison, none of these functions mean anything on a
// single frame; they quantify how two equally sized grayscale frames differ.
//
// Three uses, one operator:
// - live vs. background:      what is in the scene that was not there before
// - live vs. previous frame:  what moved since the last tick
// - diff vs. previous diff:   what changed in the change itself, which cancels
//                             noise that sits still across consecutive diffs
//
// All of them are the pixelwise absolute difference. It is symmetric, so the
// order of operands never matters, and it is written into a caller-owned buffer
// so nothing is allocated per tick. Operands of different sizes are refused;
// there is no implicit resizing.

pub mod difference {
    use crate::error::{CueError, Result};
    use image::GrayImage;

    /// Writes `|a - b|` for every pixel into `out`.
    pub fn absdiff_into(a: &GrayImage, b: &GrayImage, out: &mut GrayImage) -> Result<()> {
        if a.dimensions() != b.dimensions() || a.dimensions() != out.dimensions() {
            return Err(CueError::config(format!(
                "difference operands differ in size: {:?}, {:?} -> {:?}",
                a.dimensions(),
                b.dimensions(),
                out.dimensions()
            )));
        }

        let out: &mut [u8] = out;
        for ((o, &pa), &pb) in out.iter_mut().zip(a.as_raw()).zip(b.as_raw()) {
            *o = pa.abs_diff(pb);
        }
        Ok(())
    }

    /// Fraction of pixels whose value is at least `threshold`.
    pub fn coverage(frame: &GrayImage, threshold: u8) -> f32 {
        let total = frame.as_raw().len();
        if total == 0 {
            return 0.0;
        }
        let over = frame.as_raw().iter().filter(|&&v| v >= threshold).count();
        over as f32 / total as f32
    }

}

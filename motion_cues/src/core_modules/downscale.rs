// THEORY:
// Downscaling groups pixels into square blocks and keeps only the block mean.
// It serves two purposes for the difference pipeline:
//
// 1.  **Cost**: thresholding and contour tracing scale with the pixel count, so
//     a 2x reduction cuts that work by four.
// 2.  **Noise Reduction**: averaging cancels isolated sensor noise, leaving only
//     spatially coherent change.
//
// The output size is `floor(dim / factor)`; a trailing partial block on the
// right or bottom edge is dropped rather than averaged over fewer pixels.

use crate::error::{CueError, Result};
use image::GrayImage;

/// Size of the frame produced by `block_mean_into` for a given source size.
pub fn reduced_size(width: u32, height: u32, factor: u32) -> (u32, u32) {
    if factor == 0 {
        return (0, 0);
    }
    (width / factor, height / factor)
}

/// Averages every `factor x factor` block of `src` into one pixel of `out`.
pub fn block_mean_into(src: &GrayImage, factor: u32, out: &mut GrayImage) -> Result<()> {
    let (width, height) = src.dimensions();
    let expected = reduced_size(width, height, factor);
    if factor == 0 || out.dimensions() != expected {
        return Err(CueError::config(format!(
            "downscale by {factor} of {width}x{height} needs a {:?} buffer, got {:?}",
            expected,
            out.dimensions()
        )));
    }

    if factor == 1 {
        let dst: &mut [u8] = out;
        dst.copy_from_slice(src.as_raw());
        return Ok(());
    }

    let data = src.as_raw();
    let stride = width as usize;
    let f = factor as usize;
    let count = (f * f) as u32;
    let (out_width, _) = expected;

    let dst: &mut [u8] = out;
    for (i, pixel) in dst.iter_mut().enumerate() {
        let bx = i % out_width as usize;
        let by = i / out_width as usize;
        let mut sum = 0u32;
        for row in data[by * f * stride..].chunks(stride).take(f) {
            sum += row[bx * f..bx * f + f].iter().map(|&v| v as u32).sum::<u32>();
        }
        *pixel = (sum / count) as u8;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn reduced_size_floors() {
        assert_eq!(reduced_size(65, 47, 8), (8, 5));
        assert_eq!(reduced_size(64, 64, 1), (64, 64));
    }

    #[test]
    fn uniform_frame_stays_uniform() {
        let src = GrayImage::from_pixel(12, 8, Luma([200]));
        let mut out = GrayImage::new(3, 2);
        block_mean_into(&src, 4, &mut out).unwrap();
        assert!(out.as_raw().iter().all(|&v| v == 200));
    }

    #[test]
    fn each_block_is_averaged_independently() {
        // Left 2x2 block is white, right 2x2 block is black.
        let src = GrayImage::from_fn(4, 2, |x, _| if x < 2 { Luma([255]) } else { Luma([0]) });
        let mut out = GrayImage::new(2, 1);
        block_mean_into(&src, 2, &mut out).unwrap();
        assert_eq!(out.as_raw(), &vec![255u8, 0]);
    }

    #[test]
    fn mean_truncates() {
        let mut src = GrayImage::new(2, 2);
        src.put_pixel(0, 0, Luma([3]));
        let mut out = GrayImage::new(1, 1);
        block_mean_into(&src, 2, &mut out).unwrap();
        assert_eq!(out.get_pixel(0, 0).0[0], 0);
    }

    #[test]
    fn trailing_partial_blocks_are_ignored() {
        let src = GrayImage::from_fn(5, 5, |x, y| {
            if x == 4 || y == 4 { Luma([255]) } else { Luma([10]) }
        });
        let mut out = GrayImage::new(2, 2);
        block_mean_into(&src, 2, &mut out).unwrap();
        assert!(out.as_raw().iter().all(|&v| v == 10));
    }

    #[test]
    fn wrong_output_size_is_refused() {
        let src = GrayImage::new(8, 8);
        let mut out = GrayImage::new(3, 3);
        assert!(block_mean_into(&src, 2, &mut out).is_err());
    }
}

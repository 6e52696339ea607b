// THEORY (Color/Grayscale Conversion):
// This is the first stage every frame passes through. It takes one color frame
// and derives the single-channel planes the rest of the engine works on:
//
// - Grayscale: Rec. 601 luma (0.299 R + 0.587 G + 0.114 B). Everything that
//   measures motion (differences, contours, block matching) runs on this plane.
// - HSV planes: hue, saturation and value, in the 8-bit convention used by
//   common CV libraries. Hue is stored as degrees / 2 so the full wheel fits in
//   0..180; saturation and value use the full 0..255 range.
//
// Key principles:
// 1) Single-pixel scope: every output sample depends on exactly one input pixel.
// 2) No allocation: outputs are written into buffers sized once at setup.
// 3) A size mismatch between input and output buffers is a configuration
//    mistake, not something to repair per frame.

pub mod color {
    use crate::error::{CueError, Result};
    use image::{GrayImage, RgbImage};

    pub type Luma = u8;
    pub type Hue = u8;
    pub type Saturation = u8;
    pub type Value = u8;

    /// The three planes of an HSV decomposition.
    pub struct HsvPlanes<'a> {
        pub hue: &'a mut GrayImage,
        pub saturation: &'a mut GrayImage,
        pub value: &'a mut GrayImage,
    }

    /// Luminance estimate (Rec. 601 luma), rounded to the nearest integer.
    #[inline]
    pub fn luma(red: u8, green: u8, blue: u8) -> Luma {
        let y = 0.299_f32 * red as f32 + 0.587_f32 * green as f32 + 0.114_f32 * blue as f32;
        y.round().clamp(0.0, 255.0) as Luma
    }

    /// HSV of a single pixel in the 8-bit convention.
    ///
    /// - Hue is the color-wheel angle halved (0..180). Gray pixels get hue 0.
    /// - Saturation is chroma relative to the brightest channel. Black gets 0.
    /// - Value is the brightest channel.
    pub fn hsv(red: u8, green: u8, blue: u8) -> (Hue, Saturation, Value) {
        let maximum_channel = red.max(green).max(blue);
        let minimum_channel = red.min(green).min(blue);
        let chroma = (maximum_channel - minimum_channel) as f32;

        let saturation = if maximum_channel == 0 {
            0.0
        } else {
            255.0 * chroma / maximum_channel as f32
        };

        if chroma <= 0.0 {
            return (0, saturation.round() as Saturation, maximum_channel);
        }

        let (r, g, b) = (red as f32, green as f32, blue as f32);
        let (base_difference, sector_offset) = if maximum_channel == red {
            (g - b, 0.0)
        } else if maximum_channel == green {
            (b - r, 2.0)
        } else {
            (r - g, 4.0)
        };

        let mut hue_degrees = (base_difference / chroma + sector_offset) * 60.0;
        if hue_degrees < 0.0 {
            hue_degrees += 360.0;
        }
        // 360 degrees wraps to 0 after halving and rounding.
        let hue = ((hue_degrees / 2.0).round() as u32 % 180) as Hue;

        (hue, saturation.round() as Saturation, maximum_channel)
    }

    fn ensure_same_size(frame: &RgbImage, plane: &GrayImage, name: &str) -> Result<()> {
        if frame.dimensions() != plane.dimensions() {
            return Err(CueError::config(format!(
                "{name} buffer is {:?} but the color frame is {:?}",
                plane.dimensions(),
                frame.dimensions()
            )));
        }
        Ok(())
    }

    /// Converts a color frame into its grayscale plane.
    pub fn to_gray_into(frame: &RgbImage, gray: &mut GrayImage) -> Result<()> {
        ensure_same_size(frame, gray, "grayscale")?;
        let out: &mut [u8] = gray;
        for (rgb, y) in frame.as_raw().chunks_exact(3).zip(out.iter_mut()) {
            *y = luma(rgb[0], rgb[1], rgb[2]);
        }
        Ok(())
    }

    /// Splits a color frame into hue, saturation and value planes.
    pub fn to_hsv_into(frame: &RgbImage, planes: HsvPlanes<'_>) -> Result<()> {
        ensure_same_size(frame, planes.hue, "hue")?;
        ensure_same_size(frame, planes.saturation, "saturation")?;
        ensure_same_size(frame, planes.value, "value")?;

        let hue: &mut [u8] = planes.hue;
        let saturation: &mut [u8] = planes.saturation;
        let value: &mut [u8] = planes.value;

        for (i, rgb) in frame.as_raw().chunks_exact(3).enumerate() {
            let (h, s, v) = hsv(rgb[0], rgb[1], rgb[2]);
            hue[i] = h;
            saturation[i] = s;
            value[i] = v;
        }
        Ok(())
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use image::Rgb;

        #[test]
        fn luma_of_primaries() {
            assert_eq!(luma(0, 0, 0), 0);
            assert_eq!(luma(255, 255, 255), 255);
            assert_eq!(luma(255, 0, 0), 76);
            assert_eq!(luma(0, 255, 0), 150);
            assert_eq!(luma(0, 0, 255), 29);
        }

        #[test]
        fn hsv_of_primaries_uses_half_degrees() {
            assert_eq!(hsv(255, 0, 0), (0, 255, 255));
            assert_eq!(hsv(0, 255, 0), (60, 255, 255));
            assert_eq!(hsv(0, 0, 255), (120, 255, 255));
        }

        #[test]
        fn gray_and_black_have_no_hue_or_saturation() {
            assert_eq!(hsv(128, 128, 128), (0, 0, 128));
            assert_eq!(hsv(0, 0, 0), (0, 0, 0));
        }

        #[test]
        fn hue_just_below_red_stays_in_range() {
            // Magenta-ish red: max is red, blue > green, negative base difference.
            let (h, _, _) = hsv(255, 0, 1);
            assert!(h < 180);
        }

        #[test]
        fn conversion_preserves_dimensions() {
            let frame = RgbImage::from_pixel(5, 3, Rgb([10, 200, 30]));
            let mut gray = GrayImage::new(5, 3);
            let mut hue = GrayImage::new(5, 3);
            let mut saturation = GrayImage::new(5, 3);
            let mut value = GrayImage::new(5, 3);

            to_gray_into(&frame, &mut gray).unwrap();
            to_hsv_into(
                &frame,
                HsvPlanes {
                    hue: &mut hue,
                    saturation: &mut saturation,
                    value: &mut value,
                },
            )
            .unwrap();

            let expected = luma(10, 200, 30);
            assert!(gray.pixels().all(|p| p.0[0] == expected));
            assert!(value.pixels().all(|p| p.0[0] == 200));
            assert_eq!(hue.dimensions(), (5, 3));
        }

        #[test]
        fn size_mismatch_is_a_configuration_error() {
            let frame = RgbImage::new(4, 4);
            let mut gray = GrayImage::new(4, 5);
            assert!(matches!(
                to_gray_into(&frame, &mut gray),
                Err(CueError::Configuration(_))
            ));
        }
    }
}

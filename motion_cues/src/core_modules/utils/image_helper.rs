pub mod image_helper {
    use crate::core_modules::frame_arena::FrameArena;
    use crate::error::Result;
    use image::{GrayImage, ImageEncoder};
    use std::path::{Path, PathBuf};

    /// Writes a grayscale buffer as an 8-bit PNG.
    pub fn save_gray(path: impl AsRef<Path>, frame: &GrayImage) -> Result<()> {
        let output = std::fs::File::create(path)?;
        let encoder = image::codecs::png::PngEncoder::new(output);

        encoder.write_image(
            frame.as_raw(),
            frame.width(),
            frame.height(),
            image::ExtendedColorType::L8,
        )?;

        Ok(())
    }

    /// Dumps every stage buffer of `arena` as `<dir>/<tick>_<stage>.png`.
    pub fn save_stages(dir: impl AsRef<Path>, tick: u64, arena: &FrameArena) -> Result<Vec<PathBuf>> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;

        let mut written = Vec::new();
        for (stage, frame) in arena.stages() {
            if frame.width() == 0 || frame.height() == 0 {
                continue;
            }
            let path = dir.join(format!("{tick:06}_{}.png", stage.name()));
            save_gray(&path, frame)?;
            written.push(path);
        }
        Ok(written)
    }
}

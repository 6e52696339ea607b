// THEORY:
// A frame source is anything that can fill a color frame once per tick. The
// pipeline never knows whether frames come from a camera, a video file, a
// folder of stills or a test fixture: the host picks a concrete source from
// configuration and drives it through the `FrameSource` trait.
//
// Contract of `next_frame`:
// - `Ok(true)`: `frame` now holds the next frame at `dimensions()`.
// - `Ok(false)`: the stream has ended. `frame` is left untouched.
// - `Err(_)`: acquisition failed. A size the source cannot deliver is a
//   configuration error; a file that cannot be decoded is an image error.
//   Only configuration errors are fatal. After any other error the source
//   has already moved past the bad frame, so the next call continues.

use crate::error::{CueError, Result};
use image::RgbImage;
use image::imageops::{self, FilterType};
use log::{debug, info};
use std::path::{Path, PathBuf};

/// Sequential producer of color frames.
pub trait FrameSource {
    /// Fills `frame` with the next frame of the stream.
    ///
    /// Returns `Ok(false)` once the stream is exhausted.
    fn next_frame(&mut self, frame: &mut RgbImage) -> Result<bool>;

    /// Size of every frame this source produces, as `(width, height)`.
    fn dimensions(&self) -> (u32, u32);
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn next_frame(&mut self, frame: &mut RgbImage) -> Result<bool> {
        (**self).next_frame(frame)
    }

    fn dimensions(&self) -> (u32, u32) {
        (**self).dimensions()
    }
}

fn deliver(image: RgbImage, frame: &mut RgbImage) {
    if frame.dimensions() == image.dimensions() {
        let dst: &mut [u8] = frame;
        dst.copy_from_slice(image.as_raw());
    } else {
        *frame = image;
    }
}

/// Still images from a directory, played back in file-name order.
///
/// Images that do not match the configured size are resized on load.
pub struct ImageSequenceSource {
    paths: Vec<PathBuf>,
    cursor: usize,
    width: u32,
    height: u32,
    looping: bool,
}

impl ImageSequenceSource {
    pub fn open(dir: impl AsRef<Path>, width: u32, height: u32, looping: bool) -> Result<Self> {
        let dir = dir.as_ref();
        if width == 0 || height == 0 {
            return Err(CueError::config(format!("frame size {width}x{height} is empty")));
        }

        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() && image::ImageFormat::from_path(&path).is_ok() {
                paths.push(path);
            }
        }
        paths.sort();

        if paths.is_empty() {
            return Err(CueError::config(format!(
                "no images found in {}",
                dir.display()
            )));
        }

        info!(
            "image sequence: {} frames from {} at {width}x{height}{}",
            paths.len(),
            dir.display(),
            if looping { ", looping" } else { "" }
        );

        Ok(Self {
            paths,
            cursor: 0,
            width,
            height,
            looping,
        })
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl FrameSource for ImageSequenceSource {
    fn next_frame(&mut self, frame: &mut RgbImage) -> Result<bool> {
        if self.cursor >= self.paths.len() {
            if !self.looping {
                return Ok(false);
            }
            debug!("image sequence wrapped around");
            self.cursor = 0;
        }

        let path = &self.paths[self.cursor];
        self.cursor += 1;

        let mut image = image::open(path)?.to_rgb8();
        if image.dimensions() != (self.width, self.height) {
            image = imageops::resize(&image, self.width, self.height, FilterType::Triangle);
        }
        deliver(image, frame);
        Ok(true)
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Frames held in memory. Used by tests and by hosts that synthesize frames.
pub struct MemorySource {
    frames: Vec<RgbImage>,
    cursor: usize,
    looping: bool,
}

impl MemorySource {
    /// Every frame must share the size of the first one.
    pub fn new(frames: Vec<RgbImage>) -> Result<Self> {
        let Some(first) = frames.first() else {
            return Err(CueError::config("memory source needs at least one frame"));
        };
        let size = first.dimensions();
        if let Some(odd) = frames.iter().position(|f| f.dimensions() != size) {
            return Err(CueError::config(format!(
                "frame {odd} is {:?}, expected {size:?}",
                frames[odd].dimensions()
            )));
        }
        Ok(Self {
            frames,
            cursor: 0,
            looping: false,
        })
    }

    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }
}

impl FrameSource for MemorySource {
    fn next_frame(&mut self, frame: &mut RgbImage) -> Result<bool> {
        if self.cursor >= self.frames.len() {
            if !self.looping {
                return Ok(false);
            }
            self.cursor = 0;
        }
        deliver(self.frames[self.cursor].clone(), frame);
        self.cursor += 1;
        Ok(true)
    }

    fn dimensions(&self) -> (u32, u32) {
        self.frames[0].dimensions()
    }
}

// THEORY:
// OpenCV-backed frame sources for live cameras and video files. OpenCV hands
// out BGR `Mat`s at whatever size the device negotiates, so every frame is
// converted to RGB and resized to the configured pipeline size before it is
// copied into the caller's buffer. File sources can rewind to frame zero at
// end of stream; cameras never end on their own.

use image::RgbImage;
use log::{debug, info};
use motion_cues::error::{CueError, Result};
use motion_cues::source::FrameSource;
use opencv::core::{Mat, Size};
use opencv::imgproc;
use opencv::prelude::*;
use opencv::videoio::{self, VideoCapture};
use std::path::Path;

fn cv_error(e: opencv::Error) -> CueError {
    CueError::Io(std::io::Error::other(e))
}

pub struct CaptureSource {
    capture: VideoCapture,
    bgr: Mat,
    rgb: Mat,
    resized: Mat,
    width: u32,
    height: u32,
    looping: bool,
}

impl CaptureSource {
    pub fn open_camera(index: i32, width: u32, height: u32) -> Result<Self> {
        let mut capture = VideoCapture::new(index, videoio::CAP_ANY).map_err(cv_error)?;
        // A hint only; frames are resized regardless of what the device picks.
        let _ = capture.set(videoio::CAP_PROP_FRAME_WIDTH, width as f64);
        let _ = capture.set(videoio::CAP_PROP_FRAME_HEIGHT, height as f64);
        info!("opened camera {index}");
        Self::from_capture(capture, width, height, false, &format!("camera {index}"))
    }

    pub fn open_file(path: &Path, width: u32, height: u32, looping: bool) -> Result<Self> {
        let name = path.display().to_string();
        let capture = VideoCapture::from_file(&name, videoio::CAP_ANY).map_err(cv_error)?;
        info!("opened video file {name}{}", if looping { ", looping" } else { "" });
        Self::from_capture(capture, width, height, looping, &name)
    }

    fn from_capture(
        capture: VideoCapture,
        width: u32,
        height: u32,
        looping: bool,
        name: &str,
    ) -> Result<Self> {
        if !capture.is_opened().map_err(cv_error)? {
            return Err(CueError::config(format!("cannot open {name}")));
        }
        Ok(Self {
            capture,
            bgr: Mat::default(),
            rgb: Mat::default(),
            resized: Mat::default(),
            width,
            height,
            looping,
        })
    }

    fn grab(&mut self) -> Result<bool> {
        let grabbed = self.capture.read(&mut self.bgr).map_err(cv_error)?;
        Ok(grabbed && !self.bgr.empty())
    }
}

impl FrameSource for CaptureSource {
    fn next_frame(&mut self, frame: &mut RgbImage) -> Result<bool> {
        if !self.grab()? {
            if !self.looping {
                return Ok(false);
            }
            debug!("rewinding video file");
            self.capture
                .set(videoio::CAP_PROP_POS_FRAMES, 0.0)
                .map_err(cv_error)?;
            if !self.grab()? {
                return Ok(false);
            }
        }

        imgproc::cvt_color(&self.bgr, &mut self.rgb, imgproc::COLOR_BGR2RGB, 0).map_err(cv_error)?;
        let rgb = if self.rgb.cols() as u32 != self.width || self.rgb.rows() as u32 != self.height {
            imgproc::resize(
                &self.rgb,
                &mut self.resized,
                Size::new(self.width as i32, self.height as i32),
                0.0,
                0.0,
                imgproc::INTER_LINEAR,
            )
            .map_err(cv_error)?;
            &self.resized
        } else {
            &self.rgb
        };

        let bytes = rgb.data_bytes().map_err(cv_error)?;
        if frame.dimensions() != (self.width, self.height) {
            *frame = RgbImage::new(self.width, self.height);
        }
        let dst: &mut [u8] = frame;
        dst.copy_from_slice(bytes);
        Ok(true)
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

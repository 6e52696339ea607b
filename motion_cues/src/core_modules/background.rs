// THEORY:
// The `BackgroundModel` remembers what the empty scene looks like. It is the
// only piece of state besides the previous-frame buffer that outlives a tick.
//
// It never learns on its own. A reference is captured when the operator asks
// for one (or once at startup, if configured), and it stays until replaced or
// cleared. Until the first capture, asking for the reference fails with
// `UninitializedState` so callers skip background stages instead of differencing
// against garbage.

use crate::error::{CueError, Result};
use image::{GrayImage, RgbImage};
use log::info;

#[derive(Default)]
pub struct BackgroundModel {
    reference: Option<GrayImage>,
    /// The color frame seen when the reference was captured.
    captured_color: Option<RgbImage>,
    /// Set by the operator; consumed by the next tick.
    capture_requested: bool,
    captures: u64,
}

impl BackgroundModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the stored reference with `frame`.
    pub fn capture(&mut self, frame: &GrayImage) {
        match &mut self.reference {
            Some(reference) if reference.dimensions() == frame.dimensions() => {
                let dst: &mut [u8] = reference;
                dst.copy_from_slice(frame.as_raw());
            }
            slot => *slot = Some(frame.clone()),
        }
        self.captures += 1;
        info!(
            "background captured ({}x{}, capture #{})",
            frame.width(),
            frame.height(),
            self.captures
        );
    }

    /// Captures both the grayscale reference and the color frame it came from.
    pub fn capture_with_color(&mut self, frame: &GrayImage, color: &RgbImage) {
        self.capture(frame);
        match &mut self.captured_color {
            Some(snapshot) if snapshot.dimensions() == color.dimensions() => {
                let dst: &mut [u8] = snapshot;
                dst.copy_from_slice(color.as_raw());
            }
            slot => *slot = Some(color.clone()),
        }
    }

    /// The stored reference frame.
    pub fn current(&self) -> Result<&GrayImage> {
        self.reference.as_ref().ok_or(CueError::UninitializedState)
    }

    pub fn captured_color(&self) -> Option<&RgbImage> {
        self.captured_color.as_ref()
    }

    pub fn is_initialized(&self) -> bool {
        self.reference.is_some()
    }

    /// Asks for a capture on the next tick.
    pub fn request_capture(&mut self) {
        self.capture_requested = true;
    }

    /// Returns whether a capture was pending, clearing the request.
    pub fn take_capture_request(&mut self) -> bool {
        std::mem::take(&mut self.capture_requested)
    }

    /// Forgets the reference; `current` fails again until the next capture.
    pub fn clear(&mut self) {
        if self.reference.take().is_some() {
            info!("background cleared");
        }
        self.captured_color = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb};

    #[test]
    fn current_before_capture_is_uninitialized() {
        let model = BackgroundModel::new();
        assert!(matches!(model.current(), Err(CueError::UninitializedState)));
        assert!(!model.is_initialized());
    }

    #[test]
    fn capture_replaces_reference() {
        let mut model = BackgroundModel::new();
        model.capture(&GrayImage::from_pixel(4, 4, Luma([10])));
        model.capture(&GrayImage::from_pixel(4, 4, Luma([20])));
        let reference = model.current().unwrap();
        assert!(reference.as_raw().iter().all(|&v| v == 20));
    }

    #[test]
    fn capture_with_new_size_reallocates() {
        let mut model = BackgroundModel::new();
        model.capture(&GrayImage::new(4, 4));
        model.capture(&GrayImage::new(8, 2));
        assert_eq!(model.current().unwrap().dimensions(), (8, 2));
    }

    #[test]
    fn capture_request_is_consumed_once() {
        let mut model = BackgroundModel::new();
        assert!(!model.take_capture_request());
        model.request_capture();
        assert!(model.take_capture_request());
        assert!(!model.take_capture_request());
    }

    #[test]
    fn clear_returns_to_uninitialized() {
        let mut model = BackgroundModel::new();
        model.capture_with_color(&GrayImage::new(2, 2), &RgbImage::from_pixel(2, 2, Rgb([1, 2, 3])));
        assert!(model.captured_color().is_some());
        model.clear();
        assert!(model.current().is_err());
        assert!(model.captured_color().is_none());
    }
}

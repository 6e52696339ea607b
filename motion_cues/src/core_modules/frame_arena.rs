// THEORY:
// The `FrameArena` owns every image buffer the pipeline touches during a tick.
// All of them are allocated once, from the configured frame size, and then
// overwritten in place forever after. Buffers are plain named fields so stages
// can borrow several of them at once (read two, write a third) without copies;
// `Stage` names the same buffers for code that wants to walk all of them, such
// as debug snapshots.

use crate::config::PipelineConfig;
use crate::core_modules::downscale::reduced_size;
use image::GrayImage;

/// Every per-tick buffer, by the pipeline stage that fills it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Gray,
    Previous,
    BackgroundDiff,
    FrameDiff,
    PastDiff,
    DiffOfDiffs,
    Small,
    Tiny,
    Hue,
    Saturation,
    Value,
    Binary,
}

impl Stage {
    pub const ALL: [Stage; 12] = [
        Stage::Gray,
        Stage::Previous,
        Stage::BackgroundDiff,
        Stage::FrameDiff,
        Stage::PastDiff,
        Stage::DiffOfDiffs,
        Stage::Small,
        Stage::Tiny,
        Stage::Hue,
        Stage::Saturation,
        Stage::Value,
        Stage::Binary,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Stage::Gray => "gray",
            Stage::Previous => "previous",
            Stage::BackgroundDiff => "background_diff",
            Stage::FrameDiff => "frame_diff",
            Stage::PastDiff => "past_diff",
            Stage::DiffOfDiffs => "diff_of_diffs",
            Stage::Small => "small",
            Stage::Tiny => "tiny",
            Stage::Hue => "hue",
            Stage::Saturation => "saturation",
            Stage::Value => "value",
            Stage::Binary => "binary",
        }
    }
}

/// Pre-sized buffers for one pipeline, reused across ticks.
pub struct FrameArena {
    pub gray: GrayImage,
    pub previous: GrayImage,
    pub background_diff: GrayImage,
    pub frame_diff: GrayImage,
    pub past_diff: GrayImage,
    pub diff_of_diffs: GrayImage,
    pub small: GrayImage,
    pub tiny: GrayImage,
    pub hue: GrayImage,
    pub saturation: GrayImage,
    pub value: GrayImage,
    /// Thresholded copy of `small`, the contour finder's working plane.
    pub binary: GrayImage,
}

impl FrameArena {
    pub fn new(config: &PipelineConfig) -> Self {
        let (w, h) = (config.image_width, config.image_height);
        let (sw, sh) = reduced_size(w, h, config.small_factor);
        let (tw, th) = reduced_size(w, h, config.tiny_factor);
        Self {
            gray: GrayImage::new(w, h),
            previous: GrayImage::new(w, h),
            background_diff: GrayImage::new(w, h),
            frame_diff: GrayImage::new(w, h),
            past_diff: GrayImage::new(w, h),
            diff_of_diffs: GrayImage::new(w, h),
            small: GrayImage::new(sw, sh),
            tiny: GrayImage::new(tw, th),
            hue: GrayImage::new(w, h),
            saturation: GrayImage::new(w, h),
            value: GrayImage::new(w, h),
            binary: GrayImage::new(sw, sh),
        }
    }

    pub fn stage(&self, stage: Stage) -> &GrayImage {
        match stage {
            Stage::Gray => &self.gray,
            Stage::Previous => &self.previous,
            Stage::BackgroundDiff => &self.background_diff,
            Stage::FrameDiff => &self.frame_diff,
            Stage::PastDiff => &self.past_diff,
            Stage::DiffOfDiffs => &self.diff_of_diffs,
            Stage::Small => &self.small,
            Stage::Tiny => &self.tiny,
            Stage::Hue => &self.hue,
            Stage::Saturation => &self.saturation,
            Stage::Value => &self.value,
            Stage::Binary => &self.binary,
        }
    }

    /// Iterates `(stage, buffer)` pairs in pipeline order.
    pub fn stages(&self) -> impl Iterator<Item = (Stage, &GrayImage)> + '_ {
        Stage::ALL.into_iter().map(move |stage| (stage, self.stage(stage)))
    }
}

// THEORY:
// The `pipeline` module is the top-level API of the engine. One call to
// `CuePipeline::tick` runs the whole chain for one frame, to completion:
//
//   color frame -> gray + HSV -> background diff -> small/tiny -> contours
//                             -> frame diff -> diff of diffs -> activity
//                             -> block-matching flow
//
// All long-lived state is owned here: the buffer arena, the background model,
// the previous-frame and previous-diff buffers, the flow field and the live
// threshold. Ticks are strictly sequential, so nothing needs a lock.
//
// Failure policy: a frame of the wrong size is a configuration error and is
// returned to the caller. A missing background is not an error for the tick;
// background stages are skipped and report nothing.

use crate::config::PipelineConfig;
use crate::core_modules::background::BackgroundModel;
use crate::core_modules::block_matcher::{BlockMatchParams, BlockMatcher};
use crate::core_modules::color::color::{self, HsvPlanes};
use crate::core_modules::contour_finder::{ContourFinder, ContourLimits};
use crate::core_modules::difference::difference::{absdiff_into, coverage};
use crate::core_modules::downscale::block_mean_into;
use crate::core_modules::frame_arena::FrameArena;
use crate::error::{CueError, Result};
use crate::operator::{OperatorCommand, adjust_threshold};
use image::{GrayImage, RgbImage};
use log::{debug, info};
use serde::Serialize;

// Re-export key data structures for the public API.
pub use crate::core_modules::contour_finder::Contour;
pub use crate::core_modules::flow_field::{FlowField, FlowSummary};
pub use crate::core_modules::frame_arena::Stage;

/// Everything a single tick found, ready to be emitted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickReport {
    /// Zero-based index of the tick that produced this report.
    pub frame: u64,
    /// Threshold in effect during the tick.
    pub threshold: u8,
    /// Whether a background reference was available.
    pub has_background: bool,
    /// Outer contours of the background difference, full-frame coordinates.
    pub contours: Vec<Contour>,
    /// `(col, row)` of every tiny-grid cell at or above the threshold.
    pub occupied_cells: Vec<(u32, u32)>,
    /// Fraction of diff-of-diffs pixels at or above the threshold, once two
    /// frame differences exist.
    pub activity: Option<f32>,
    /// Flow summary, once a previous frame exists.
    pub flow: Option<FlowSummary>,
}

/// The main, top-level struct for the motion-cue engine.
pub struct CuePipeline {
    config: PipelineConfig,
    arena: FrameArena,
    background: BackgroundModel,
    contour_finder: ContourFinder,
    matcher: BlockMatcher,
    flow: FlowField,
    threshold: u8,
    has_previous: bool,
    has_past_diff: bool,
    debug: bool,
    ticks: u64,
}

impl CuePipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;

        let arena = FrameArena::new(&config);
        let (small_w, small_h) = arena.small.dimensions();
        let contour_finder = ContourFinder::new(small_w, small_h);
        let matcher = BlockMatcher::new(
            BlockMatchParams {
                block_size: config.block_size,
                shift_size: config.shift_size,
                max_range: config.max_range,
            },
            config.image_width,
            config.image_height,
        )?;
        let flow = matcher.new_field();

        let mut background = BackgroundModel::new();
        if config.learn_background_on_start {
            background.request_capture();
        }

        info!(
            "pipeline ready: {}x{}, flow grid {:?}, threshold {}",
            config.image_width,
            config.image_height,
            flow.dim(),
            config.threshold
        );

        Ok(Self {
            threshold: config.threshold,
            config,
            arena,
            background,
            contour_finder,
            matcher,
            flow,
            has_previous: false,
            has_past_diff: false,
            debug: false,
            ticks: 0,
        })
    }

    /// Runs every stage for one color frame.
    pub fn tick(&mut self, frame: &RgbImage) -> Result<TickReport> {
        let expected = (self.config.image_width, self.config.image_height);
        if frame.dimensions() != expected {
            return Err(CueError::config(format!(
                "frame source produced {:?}, pipeline is configured for {expected:?}",
                frame.dimensions()
            )));
        }

        let frame_index = self.ticks;
        self.ticks += 1;

        // Stage 1: Conversion
        self.convert(frame)?;

        // Stage 2: Background reference
        if self.background.take_capture_request() {
            self.background.capture_with_color(&self.arena.gray, frame);
        }

        // Stage 3: Background difference and contours
        let (contours, occupied_cells) = self.background_stage()?;

        // Stage 4: Temporal difference and flow
        let (activity, flow) = self.temporal_stage()?;

        let report = TickReport {
            frame: frame_index,
            threshold: self.threshold,
            has_background: self.background.is_initialized(),
            contours,
            occupied_cells,
            activity,
            flow,
        };

        debug!(
            "tick {}: {} contours, {} occupied cells, activity {:?}, flow {:?}",
            report.frame,
            report.contours.len(),
            report.occupied_cells.len(),
            report.activity,
            report.flow
        );

        Ok(report)
    }

    fn convert(&mut self, frame: &RgbImage) -> Result<()> {
        let arena = &mut self.arena;
        color::to_gray_into(frame, &mut arena.gray)?;
        color::to_hsv_into(
            frame,
            HsvPlanes {
                hue: &mut arena.hue,
                saturation: &mut arena.saturation,
                value: &mut arena.value,
            },
        )?;
        Ok(())
    }

    fn background_stage(&mut self) -> Result<(Vec<Contour>, Vec<(u32, u32)>)> {
        let background = match self.background.current() {
            Ok(background) => background,
            Err(CueError::UninitializedState) => {
                debug!("no background captured, skipping background stages");
                return Ok((Vec::new(), Vec::new()));
            }
            Err(e) => return Err(e),
        };

        let limits = self.contour_limits();
        let threshold = self.threshold;
        let (small_factor, tiny_factor) = (self.config.small_factor, self.config.tiny_factor);

        let arena = &mut self.arena;
        absdiff_into(&arena.gray, background, &mut arena.background_diff)?;
        block_mean_into(&arena.background_diff, small_factor, &mut arena.small)?;
        block_mean_into(&arena.background_diff, tiny_factor, &mut arena.tiny)?;

        let contours = self
            .contour_finder
            .find(&arena.small, threshold, limits, &mut arena.binary)?
            .into_iter()
            .map(|contour| contour.scaled(small_factor))
            .collect();

        let occupied_cells = arena
            .tiny
            .enumerate_pixels()
            .filter(|(_, _, p)| p.0[0] >= threshold)
            .map(|(x, y, _)| (x, y))
            .collect();

        Ok((contours, occupied_cells))
    }

    /// Contour limits expressed in small-frame pixels.
    fn contour_limits(&self) -> ContourLimits {
        let cell = self.config.small_factor * self.config.small_factor;
        ContourLimits {
            min_area: self.config.min_contour_area.div_ceil(cell),
            max_area: self.config.max_contour_area / cell,
            max_contours: self.config.max_contours,
        }
    }

    fn temporal_stage(&mut self) -> Result<(Option<f32>, Option<FlowSummary>)> {
        let arena = &mut self.arena;

        if !self.has_previous {
            debug!("first frame, no temporal stages");
            copy_into(&arena.gray, &mut arena.previous);
            self.has_previous = true;
            return Ok((None, None));
        }

        absdiff_into(&arena.gray, &arena.previous, &mut arena.frame_diff)?;

        let activity = if self.has_past_diff {
            absdiff_into(&arena.frame_diff, &arena.past_diff, &mut arena.diff_of_diffs)?;
            Some(coverage(&arena.diff_of_diffs, self.threshold))
        } else {
            None
        };

        self.matcher
            .estimate(&arena.previous, &arena.gray, &mut self.flow)?;
        let flow = self.flow.summary();

        // Depth-one history: this tick's diff and gray are next tick's past.
        copy_into(&arena.frame_diff, &mut arena.past_diff);
        copy_into(&arena.gray, &mut arena.previous);
        self.has_past_diff = true;

        Ok((activity, Some(flow)))
    }

    /// Applies an operator command between ticks.
    pub fn apply(&mut self, command: OperatorCommand) {
        match command {
            OperatorCommand::LearnBackground => {
                info!("background capture requested");
                self.background.request_capture();
            }
            OperatorCommand::ClearBackground => self.background.clear(),
            OperatorCommand::ToggleDebug => {
                self.debug = !self.debug;
                info!("debug output {}", if self.debug { "on" } else { "off" });
            }
            OperatorCommand::RaiseThreshold(_)
            | OperatorCommand::LowerThreshold(_)
            | OperatorCommand::SetThreshold(_)
            | OperatorCommand::PointerThreshold { .. } => {
                let threshold = adjust_threshold(self.threshold, command, self.config.draw_width);
                if threshold != self.threshold {
                    info!("threshold {} -> {}", self.threshold, threshold);
                    self.threshold = threshold;
                }
            }
        }
    }

    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    pub fn debug_enabled(&self) -> bool {
        self.debug
    }

    pub fn set_debug(&mut self, enabled: bool) {
        self.debug = enabled;
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn background(&self) -> &BackgroundModel {
        &self.background
    }

    /// Captures `frame` as the background immediately, outside a tick.
    pub fn capture_background(&mut self, frame: &RgbImage) -> Result<()> {
        self.convert(frame)?;
        self.background.capture_with_color(&self.arena.gray, frame);
        Ok(())
    }

    /// Per-block vectors from the most recent tick.
    pub fn flow_field(&self) -> &FlowField {
        &self.flow
    }

    /// Stage buffers, for inspection and debug snapshots.
    pub fn arena(&self) -> &FrameArena {
        &self.arena
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }
}

fn copy_into(src: &GrayImage, dst: &mut GrayImage) {
    let dst: &mut [u8] = dst;
    dst.copy_from_slice(src.as_raw());
}

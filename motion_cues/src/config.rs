// THEORY:
// All tunables are fixed at setup time. A `CueConfig` is read once from a TOML
// file, validated, and then handed out by reference; there is no hot reload.
// Each section has sensible defaults so a config file only needs to name what
// it changes. The threshold is the one value that moves at runtime, and that
// movement goes through operator commands against the live pipeline, never
// back into the config.

use crate::error::{CueError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration for the `CuePipeline`, allowing for tunable behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Width of every frame the source delivers, in pixels.
    pub image_width: u32,
    /// Height of every frame the source delivers, in pixels.
    pub image_height: u32,
    /// Width of the operator's view; pointer positions are relative to it.
    pub draw_width: u32,
    /// Height of the operator's view.
    pub draw_height: u32,
    /// Side of a square optical-flow block, in pixels.
    pub block_size: u32,
    /// Step between candidate offsets during the block search.
    pub shift_size: u32,
    /// Largest displacement searched in either axis.
    pub max_range: u32,
    /// Initial binarization cutoff for difference frames.
    pub threshold: u8,
    /// Contours covering fewer pixels than this are treated as noise.
    pub min_contour_area: u32,
    /// Contours covering more pixels than this are dropped.
    pub max_contour_area: u32,
    /// Only the largest `max_contours` regions are reported.
    pub max_contours: usize,
    /// Reduction factor of the "small" difference frame used for contours.
    pub small_factor: u32,
    /// Reduction factor of the "tiny" difference frame used for the occupancy grid.
    pub tiny_factor: u32,
    /// Capture the background from the very first frame.
    pub learn_background_on_start: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            image_width: 320,
            image_height: 240,
            draw_width: 320,
            draw_height: 240,
            block_size: 8,
            shift_size: 2,
            max_range: 8,
            threshold: 40,
            min_contour_area: 20,
            max_contour_area: 320 * 240,
            max_contours: 10,
            small_factor: 2,
            tiny_factor: 8,
            learn_background_on_start: false,
        }
    }
}

impl PipelineConfig {
    /// Rejects combinations the pipeline cannot be built from.
    pub fn validate(&self) -> Result<()> {
        let (w, h) = (self.image_width, self.image_height);
        if w == 0 || h == 0 {
            return Err(CueError::config(format!("frame size {w}x{h} is empty")));
        }
        if self.block_size == 0 || self.block_size > w || self.block_size > h {
            return Err(CueError::config(format!(
                "block size {} does not fit a {w}x{h} frame",
                self.block_size
            )));
        }
        if self.shift_size == 0 {
            return Err(CueError::config("shift size must be positive"));
        }
        if self.max_range == 0 {
            return Err(CueError::config("max search range must be positive"));
        }
        for (name, factor) in [("small", self.small_factor), ("tiny", self.tiny_factor)] {
            if factor == 0 || factor > w || factor > h {
                return Err(CueError::config(format!(
                    "{name} downscale factor {factor} does not fit a {w}x{h} frame"
                )));
            }
        }
        if self.min_contour_area > self.max_contour_area {
            return Err(CueError::config(format!(
                "min contour area {} exceeds max contour area {}",
                self.min_contour_area, self.max_contour_area
            )));
        }
        if self.draw_width == 0 || self.draw_height == 0 {
            return Err(CueError::config("draw size must be positive"));
        }
        Ok(())
    }

    /// Number of flow blocks as `(cols, rows)`.
    pub fn flow_grid(&self) -> (u32, u32) {
        (
            self.image_width / self.block_size,
            self.image_height / self.block_size,
        )
    }
}

/// Wire encoding of outbound cue messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageFormat {
    Osc,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmitterConfig {
    pub host: String,
    pub port: u16,
    pub format: MessageFormat,
    /// Also send every per-block vector, not just the flow summary.
    pub send_flow_field: bool,
}

impl Default for EmitterConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 12345,
            format: MessageFormat::Osc,
            send_flow_field: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceKind {
    /// Every image file in a directory, in file-name order.
    Images {
        dir: PathBuf,
        #[serde(default)]
        looping: bool,
    },
    /// A live capture device.
    Camera {
        #[serde(default)]
        index: i32,
    },
    /// A pre-recorded video file.
    File {
        path: PathBuf,
        #[serde(default)]
        looping: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(flatten)]
    pub kind: SourceKind,
    /// Tick rate of the run loop.
    #[serde(default = "default_fps")]
    pub fps: f64,
}

fn default_fps() -> f64 {
    30.0
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::Camera { index: 0 },
            fps: default_fps(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub enabled: bool,
    pub dir: PathBuf,
    pub every_n_ticks: u64,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dir: PathBuf::from("debug_frames"),
            every_n_ticks: 30,
        }
    }
}

/// Top-level configuration file layout.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CueConfig {
    pub pipeline: PipelineConfig,
    pub emitter: EmitterConfig,
    pub source: SourceConfig,
    pub debug: DebugConfig,
}

impl CueConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: CueConfig =
            toml::from_str(text).map_err(|e| CueError::config(format!("invalid config: {e}")))?;
        config.pipeline.validate()?;
        if config.source.fps <= 0.0 {
            return Err(CueError::config("source fps must be positive"));
        }
        if config.debug.every_n_ticks == 0 {
            return Err(CueError::config("debug.every_n_ticks must be positive"));
        }
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            CueError::config(format!("cannot read config {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        PipelineConfig::default().validate().expect("default config validates");
    }

    #[test]
    fn zero_shift_is_rejected() {
        let config = PipelineConfig {
            shift_size: 0,
            ..PipelineConfig::default()
        };
        assert!(matches!(config.validate(), Err(CueError::Configuration(_))));
    }

    #[test]
    fn oversized_block_is_rejected() {
        let config = PipelineConfig {
            image_width: 16,
            image_height: 16,
            block_size: 32,
            small_factor: 2,
            tiny_factor: 4,
            ..PipelineConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn flow_grid_divides_frame_by_block() {
        let config = PipelineConfig {
            image_width: 64,
            image_height: 48,
            block_size: 8,
            ..PipelineConfig::default()
        };
        assert_eq!(config.flow_grid(), (8, 6));
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let text = r#"
            [pipeline]
            image_width = 64
            image_height = 64
            threshold = 128

            [emitter]
            port = 9000
            format = "json"

            [source]
            kind = "images"
            dir = "frames"
            looping = true
        "#;
        let config = CueConfig::from_toml_str(text).expect("config parses");
        assert_eq!(config.pipeline.threshold, 128);
        assert_eq!(config.pipeline.block_size, 8);
        assert_eq!(config.emitter.port, 9000);
        assert_eq!(config.emitter.format, MessageFormat::Json);
        assert_eq!(config.emitter.host, "127.0.0.1");
        assert_eq!(
            config.source.kind,
            SourceKind::Images {
                dir: PathBuf::from("frames"),
                looping: true
            }
        );
        assert_eq!(config.source.fps, 30.0);
        assert!(!config.debug.enabled);
    }

    #[test]
    fn invalid_pipeline_section_fails_to_load() {
        let text = r#"
            [pipeline]
            shift_size = 0
        "#;
        assert!(matches!(
            CueConfig::from_toml_str(text),
            Err(CueError::Configuration(_))
        ));
    }
}

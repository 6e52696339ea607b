// THEORY:
// This file is the entry point for the `motion_cues` library crate. It exposes
// `CuePipeline` and the data it reports (`TickReport`, `Contour`, `FlowSummary`)
// as the high-level interface, together with the pieces a host program needs
// around it: configuration, frame sources, operator commands and the event
// emitter.
//
// The image-processing stages live in `core_modules`. They are public so that
// tools can reuse a single stage, but a host only needs the pipeline.

pub mod config;
pub mod core_modules;
pub mod emitter;
pub mod error;
pub mod operator;
pub mod pipeline;
pub mod source;

pub use config::{CueConfig, PipelineConfig};
pub use error::{CueError, Result};
pub use pipeline::{CuePipeline, TickReport};

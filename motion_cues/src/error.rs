// THEORY:
// Every fallible operation in the engine reports through a single error type.
// The variants mirror how the caller is expected to react:
//
// - `Configuration` is fatal. It is raised while the pipeline is being set up
//   (bad block/shift/range values, a frame source that does not produce the
//   configured size) and should stop the process.
// - `UninitializedState` is recoverable. The background model has not captured
//   a reference yet, so background-dependent stages are skipped for the tick.
// - `Transport` is swallowed by the emitter. Cues are best-effort.
// - `Io` and `Image` cover file-backed sources and debug snapshots.

use std::io;

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, CueError>;

#[derive(Debug, thiserror::Error)]
pub enum CueError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("background model has not captured a reference frame")]
    UninitializedState,

    #[error("transport error: {0}")]
    Transport(#[source] io::Error),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),
}

impl CueError {
    pub fn config(message: impl Into<String>) -> Self {
        CueError::Configuration(message.into())
    }

    /// True for errors that must abort the process rather than the tick.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CueError::Configuration(_))
    }
}

// THEORY:
// `cue_runner` is the host program around the `motion_cues` library. It owns
// everything the pipeline itself stays out of: picking a frame source, pacing
// ticks, reading operator commands, sending cues and writing debug snapshots.
//
// One task runs the tick loop. A second task reads operator commands from
// stdin and forwards them over a channel; they are applied between ticks, so
// the pipeline is never touched from two places at once.

#[cfg(feature = "opencv")]
mod capture;

use anyhow::{Context, Result, bail};
use image::RgbImage;
use log::{info, warn};
use motion_cues::core_modules::utils::image_helper::image_helper::save_stages;
use motion_cues::emitter::EventEmitter;
use motion_cues::operator::OperatorCommand;
use motion_cues::source::{FrameSource, ImageSequenceSource};
use motion_cues::{CueConfig, CuePipeline, config::SourceKind};
use std::env;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    // --- 1. Configuration ---
    let config_path = env::args().nth(1).unwrap_or_else(|| "motion_cues.toml".to_string());
    let config = CueConfig::load(&config_path)
        .with_context(|| format!("loading configuration from {config_path}"))?;
    let size = (config.pipeline.image_width, config.pipeline.image_height);

    // --- 2. Frame source, pipeline and emitter ---
    let mut source = open_source(&config)?;
    if source.dimensions() != size {
        bail!(
            "frame source delivers {:?} but the pipeline expects {size:?}",
            source.dimensions()
        );
    }

    let mut pipeline = CuePipeline::new(config.pipeline.clone())?;
    pipeline.set_debug(config.debug.enabled);
    let emitter = EventEmitter::bind(&config.emitter, size).await?;

    // --- 3. Operator input ---
    let mut commands = spawn_operator_input();
    info!("commands: b (learn background), c (clear), + / - (threshold), t <n>, x <px>, d (debug)");

    // --- 4. Tick loop ---
    let mut interval = tokio::time::interval(Duration::from_secs_f64(1.0 / config.source.fps));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut frame = RgbImage::new(size.0, size.1);
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("interrupted");
                break;
            }
            Some(command) = commands.recv() => {
                pipeline.apply(command);
            }
            _ = interval.tick() => {
                match source.next_frame(&mut frame) {
                    Ok(true) => {}
                    Ok(false) => {
                        info!("end of stream");
                        break;
                    }
                    Err(e) if e.is_fatal() => return Err(e.into()),
                    Err(e) => {
                        warn!("frame skipped: {e}");
                        continue;
                    }
                }

                let report = match pipeline.tick(&frame) {
                    Ok(report) => report,
                    Err(e) if e.is_fatal() => return Err(e.into()),
                    Err(e) => {
                        warn!("tick skipped: {e}");
                        continue;
                    }
                };

                emitter.emit(&report, Some(pipeline.flow_field())).await;

                if pipeline.debug_enabled() && report.frame % config.debug.every_n_ticks == 0 {
                    match save_stages(&config.debug.dir, report.frame, pipeline.arena()) {
                        Ok(written) => info!("tick {}: wrote {} debug frames", report.frame, written.len()),
                        Err(e) => warn!("tick {}: debug snapshot failed: {e}", report.frame),
                    }
                }
            }
        }
    }

    info!("processed {} ticks", pipeline.ticks());
    Ok(())
}

fn open_source(config: &CueConfig) -> Result<Box<dyn FrameSource>> {
    let (width, height) = (config.pipeline.image_width, config.pipeline.image_height);
    let source: Box<dyn FrameSource> = match &config.source.kind {
        SourceKind::Images { dir, looping } => {
            Box::new(ImageSequenceSource::open(dir, width, height, *looping)?)
        }
        #[cfg(feature = "opencv")]
        SourceKind::Camera { index } => {
            Box::new(capture::CaptureSource::open_camera(*index, width, height)?)
        }
        #[cfg(feature = "opencv")]
        SourceKind::File { path, looping } => {
            Box::new(capture::CaptureSource::open_file(path, width, height, *looping)?)
        }
        #[cfg(not(feature = "opencv"))]
        SourceKind::Camera { .. } | SourceKind::File { .. } => {
            bail!("camera and video file sources need cue_runner built with the `opencv` feature")
        }
    };
    Ok(source)
}

/// Reads stdin line by line and forwards every recognized command.
fn spawn_operator_input() -> mpsc::Receiver<OperatorCommand> {
    let (tx, rx) = mpsc::channel(16);
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => match OperatorCommand::parse_line(&line) {
                    Some(command) => {
                        if tx.send(command).await.is_err() {
                            break;
                        }
                    }
                    None if line.trim().is_empty() => {}
                    None => warn!("unrecognized command {:?}", line.trim()),
                },
                Ok(None) => break,
                Err(e) => {
                    warn!("operator input closed: {e}");
                    break;
                }
            }
        }
    });
    rx
}

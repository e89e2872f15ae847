//! pose_stream - run a pose detector and print keypoints as they arrive
//!
//! This tool:
//! 1. Loads configuration (POSE_STREAM_CONFIG file, env overrides, CLI flags)
//! 2. Builds the detector for the selected input
//! 3. Prints a keypoint table per result until the input ends or Ctrl-C

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

use pose_stream::detect::Resolution;
use pose_stream::{
    build_detector, DetectionResult, EngineRegistry, InputSource, Pipeline, PipelineConfig,
    PoseKeypoints,
};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Input kind: image, video, image-dir, camera or depth-sensor.
    #[arg(long, value_name = "KIND")]
    input: Option<String>,
    /// File or directory for image, video and image-dir inputs.
    #[arg(long)]
    path: Option<PathBuf>,
    /// Device index for camera and depth-sensor inputs.
    #[arg(long)]
    index: Option<i64>,
    /// Registered engine name.
    #[arg(long, env = "POSE_STREAM_ENGINE")]
    engine: Option<String>,
    /// Network input size, WxH (-1 for auto).
    #[arg(long)]
    net_resolution: Option<String>,
    /// Face detector input size; empty disables face detection.
    #[arg(long)]
    face_resolution: Option<String>,
    /// Hand detector input size; empty disables hand detection.
    #[arg(long)]
    hand_resolution: Option<String>,
    /// Pose model, e.g. BODY_25, COCO, MPI.
    #[arg(long)]
    model: Option<String>,
    /// Directory the engine writes rendered images and JSON into.
    #[arg(long)]
    output_dir: Option<PathBuf>,
    /// Engine log priority threshold (0-255).
    #[arg(long)]
    logging_level: Option<i64>,
    /// Stop after this many frame results.
    #[arg(long)]
    max_results: Option<u64>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut config = PipelineConfig::load()?;
    apply_args(&mut config, &args)?;
    config.validate()?;

    let registry = EngineRegistry::with_builtin();
    let detector = build_detector(&config, &registry)?;

    let (tx, rx) = mpsc::channel();
    let limit_tx = tx.clone();
    let max_results = args.max_results;
    let mut frames = 0u64;
    let handle = Pipeline::start(detector, move |result: &DetectionResult| {
        print_result(result);
        if !result.is_final {
            frames += 1;
            if max_results.is_some_and(|max| frames >= max) {
                let _ = limit_tx.send(());
            }
        }
    })?;

    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .expect("error setting Ctrl-C handler");

    loop {
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(()) => {
                log::info!("stopping detector...");
                handle
                    .request_stop()?
                    .join()
                    .map_err(|_| anyhow!("stop thread panicked"))?;
                break;
            }
            Err(RecvTimeoutError::Timeout) if !handle.is_finished() => continue,
            Err(_) => break,
        }
    }

    handle.join()?;
    log::info!("pose_stream finished");
    Ok(())
}

fn apply_args(config: &mut PipelineConfig, args: &Args) -> Result<()> {
    if let Some(kind) = args.input.as_deref() {
        config.input = Some(InputSource::from_kind(kind, args.path.clone(), args.index)?);
    }
    if let Some(engine) = &args.engine {
        config.engine = engine.clone();
    }
    if let Some(value) = &args.net_resolution {
        config.net_resolution = value.parse()?;
    }
    if let Some(value) = &args.face_resolution {
        config.face_resolution = parse_optional_resolution(value)?;
    }
    if let Some(value) = &args.hand_resolution {
        config.hand_resolution = parse_optional_resolution(value)?;
    }
    if let Some(model) = &args.model {
        config.model_pose = model.clone();
    }
    if let Some(dir) = &args.output_dir {
        config.output_dir = Some(dir.clone()).filter(|d| !d.as_os_str().is_empty());
    }
    if let Some(level) = args.logging_level {
        config.logging_level = u8::try_from(level)
            .map_err(|_| anyhow!("logging level must be in 0..=255, got {}", level))?;
    }
    Ok(())
}

fn parse_optional_resolution(value: &str) -> Result<Option<Resolution>> {
    if value.trim().is_empty() {
        Ok(None)
    } else {
        Ok(Some(value.parse()?))
    }
}

fn print_result(result: &DetectionResult) {
    if result.is_final {
        println!("-- detection finished ({} results) --", result.sequence);
        return;
    }
    println!("== result {} ==", result.sequence);
    if let Some(images) = &result.sensor {
        println!(
            "colour {}x{}, depth {}x{}",
            images.color.width(),
            images.color.height(),
            images.depth.width(),
            images.depth.height()
        );
    }
    match &result.payload {
        Some(data) if !data.pose.is_empty() => {
            print_keypoints(&data.pose);
            if let Some(rendered) = data.rendered_frame() {
                println!("rendered {}x{}", rendered.width(), rendered.height());
            }
        }
        _ => println!("No keypoints found"),
    }
}

fn print_keypoints(keypoints: &PoseKeypoints) {
    println!("{:>4} {:>9} {:>9} {:>6} {:>6}", "part", "x", "y", "conf", "person");
    for row in keypoints.rows() {
        println!(
            "{:>4} {:>9.2} {:>9.2} {:>6.3} {:>6}",
            row.part, row.x, row.y, row.confidence, row.person
        );
    }
}

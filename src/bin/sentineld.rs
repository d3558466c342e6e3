//! sentineld - thermal hotspot detection over a video source
//!
//! Subcommands:
//! 1. `run`: process a source end to end and emit a JSON report
//! 2. `checkpoints`: show saved progress for a source
//! 3. `detect-test`: run the detector on the built-in synthetic frame

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use hotspot_sentinel::checkpoint::{CheckpointStore, FsCheckpointStore};
use hotspot_sentinel::ingest::synthetic::test_frame;
use hotspot_sentinel::ui::Ui;
use hotspot_sentinel::{
    ChannelProgressSink, DetectionMode, FileConfig, FileSource, FrameProcessor, PipelineConfig,
    ThermalDetector, VideoSource,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Thermal hotspot detection with checkpointed runs")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Process a video file or stub:// source.
    Run {
        /// Local file path (.y4m, or any format with ingest-file-ffmpeg) or stub://name.
        source: String,
        /// Detection mode (speed|balanced|accuracy). Overrides config.
        #[arg(long)]
        mode: Option<DetectionMode>,
        /// Checkpoint directory. Overrides config.
        #[arg(long)]
        checkpoint_dir: Option<PathBuf>,
        /// Write the JSON report here instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
        /// Print the latest checkpoint for this source before starting.
        #[arg(long)]
        resume: bool,
        /// Stamp random hot discs into frames (demo footage).
        #[arg(long)]
        inject_signatures: bool,
        /// Use decoded luminance as-is instead of simulating thermal.
        #[arg(long)]
        raw_intensity: bool,
        /// UI mode for stderr progress (auto|plain|pretty)
        #[arg(long, default_value = "auto", value_name = "MODE")]
        ui: String,
    },
    /// List checkpoints and the resume point for a source.
    Checkpoints {
        source: String,
        #[arg(long)]
        checkpoint_dir: Option<PathBuf>,
    },
    /// Detect on the built-in synthetic test frame and print the result.
    DetectTest {
        #[arg(long)]
        mode: Option<DetectionMode>,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let mut cfg = PipelineConfig::load()?;

    match args.command {
        Command::Run {
            source,
            mode,
            checkpoint_dir,
            output,
            resume,
            inject_signatures,
            raw_intensity,
            ui,
        } => {
            if let Some(mode) = mode {
                cfg.mode = mode;
            }
            if let Some(dir) = checkpoint_dir {
                cfg.checkpoint_dir = dir;
            }
            cfg.inject_signatures |= inject_signatures;
            if raw_intensity {
                cfg.simulate_thermal = false;
            }
            let is_tty = std::io::stderr().is_terminal();
            let ui = Ui::from_args(Some(&ui), is_tty, output.is_none() && std::io::stdout().is_terminal());
            run(&cfg, &source, output, resume, &ui)
        }
        Command::Checkpoints {
            source,
            checkpoint_dir,
        } => {
            let dir = checkpoint_dir.unwrap_or(cfg.checkpoint_dir);
            let store = FsCheckpointStore::new(dir, cfg.checkpoint_keep);
            let all: Vec<_> = store
                .list()?
                .into_iter()
                .filter(|c| c.video_path == source)
                .collect();
            let resumable = store.find_resumable(&source)?;
            let out = serde_json::json!({
                "source": source,
                "checkpoints": all,
                "resume_from": resumable.map(|c| c.frame_number),
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
            Ok(())
        }
        Command::DetectTest { mode } => {
            let detector = ThermalDetector::new(mode.unwrap_or(cfg.mode));
            let result = detector.detect_frame(&test_frame())?;
            let out = serde_json::json!({
                "mode": detector.mode(),
                "detections": result.detections,
                "performance": result.performance,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
            Ok(())
        }
    }
}

fn run(cfg: &PipelineConfig, source: &str, output: Option<PathBuf>, resume: bool, ui: &Ui) -> Result<()> {
    let mut source = {
        let _stage = ui.stage("Prepare source");
        FileSource::new(FileConfig {
            path: source.to_string(),
            simulate_thermal: cfg.simulate_thermal,
            inject_signatures: cfg.inject_signatures,
        })?
    };

    let (sink, events) = ChannelProgressSink::bounded(cfg.progress_queue);
    let sink = Arc::new(sink);
    let processor = FrameProcessor::from_config(ThermalDetector::new(cfg.mode), cfg)
        .with_progress_sink(sink.clone());

    if resume {
        match processor.resume_hint(source.source_id())? {
            Some(checkpoint) => log::info!(
                "last checkpoint for {} at frame {}/{}; processing restarts from frame 0",
                checkpoint.video_path,
                checkpoint.frame_number,
                checkpoint.total_frames
            ),
            None => log::info!("no checkpoint found for {}", source.source_id()),
        }
    }

    let stop = processor.stop_handle();
    ctrlc::set_handler(move || stop.stop())
        .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    let mut progress = ui.frame_progress(0);
    let consumer = thread::spawn(move || {
        for event in events.iter() {
            progress.update(&event);
        }
        progress.finish();
    });

    log::info!("sentineld running in {} mode; Ctrl-C to stop", cfg.mode);
    let report = processor.process(&mut source)?;

    let dropped = sink.dropped();
    drop(processor);
    drop(sink);
    if consumer.join().is_err() {
        log::warn!("progress display thread panicked");
    }
    if dropped > 0 {
        log::debug!("{} progress events dropped by a slow consumer", dropped);
    }

    let json = serde_json::to_string_pretty(&report)?;
    match output {
        Some(path) => {
            std::fs::write(&path, json)
                .map_err(|e| anyhow!("failed to write report {}: {}", path.display(), e))?;
            log::info!("report written to {}", path.display());
        }
        None => println!("{json}"),
    }

    if !report.is_success() {
        return Err(anyhow!(
            "run failed: {}",
            report.error.as_deref().unwrap_or("unknown error")
        ));
    }
    Ok(())
}

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::{Duration, Instant};

use crate::pipeline::ProgressEvent;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UiMode {
    Auto,
    Plain,
    Pretty,
}

/// Terminal feedback for the CLI: stage spinners and a frame progress bar.
#[derive(Clone, Debug)]
pub struct Ui {
    mode: UiMode,
    is_tty: bool,
    disable_pretty: bool,
}

impl Ui {
    pub fn new(mode: UiMode, is_tty: bool, disable_pretty: bool) -> Self {
        Self {
            mode,
            is_tty,
            disable_pretty,
        }
    }

    pub fn from_args(ui_flag: Option<&str>, is_tty: bool, disable_pretty: bool) -> Self {
        let mode = match ui_flag {
            Some("plain") => UiMode::Plain,
            Some("pretty") => UiMode::Pretty,
            _ => UiMode::Auto,
        };
        Self::new(mode, is_tty, disable_pretty)
    }

    fn use_pretty(&self) -> bool {
        self.is_tty
            && match self.mode {
                UiMode::Pretty => true,
                UiMode::Auto => !self.disable_pretty,
                UiMode::Plain => false,
            }
    }

    pub fn stage(&self, name: &str) -> StageGuard {
        if self.use_pretty() {
            let spinner = ProgressBar::new_spinner();
            spinner.set_draw_target(ProgressDrawTarget::stderr());
            spinner.enable_steady_tick(Duration::from_millis(120));
            let style = ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            spinner.set_style(style);
            spinner.set_message(format!("{name}…"));
            StageGuard::new(name.to_string(), Some(spinner))
        } else {
            eprintln!("==> {}", name);
            StageGuard::new(name.to_string(), None)
        }
    }

    /// Progress display for a run over `total_frames` (0 when unknown).
    pub fn frame_progress(&self, total_frames: u64) -> FrameProgress {
        let bar = self.use_pretty().then(|| {
            let bar = if total_frames > 0 {
                ProgressBar::new(total_frames)
            } else {
                ProgressBar::new_spinner()
            };
            bar.set_draw_target(ProgressDrawTarget::stderr());
            let style = ProgressStyle::with_template(
                "{bar:40.cyan/blue} {pos}/{len} frames {msg} [{elapsed_precise}]",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar());
            bar.set_style(style);
            bar
        });
        FrameProgress {
            bar,
            last_plain_decile: None,
        }
    }
}

pub struct StageGuard {
    name: String,
    start: Instant,
    spinner: Option<ProgressBar>,
}

impl StageGuard {
    fn new(name: String, spinner: Option<ProgressBar>) -> Self {
        Self {
            name,
            start: Instant::now(),
            spinner,
        }
    }
}

impl Drop for StageGuard {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        let message = format!("✔ {} ({})", self.name, format_duration(elapsed));
        if let Some(spinner) = &self.spinner {
            spinner.finish_with_message(message);
        } else {
            eprintln!("{message}");
        }
    }
}

/// Renders [`ProgressEvent`]s as a bar, or as one line per 10% when plain.
pub struct FrameProgress {
    bar: Option<ProgressBar>,
    last_plain_decile: Option<u64>,
}

impl FrameProgress {
    pub fn update(&mut self, event: &ProgressEvent) {
        let message = describe(event);
        match &self.bar {
            Some(bar) => {
                if event.total_frames > 0 {
                    bar.set_length(event.total_frames.max(event.current_frame));
                }
                bar.set_position(event.current_frame);
                bar.set_message(message);
            }
            None => {
                let decile = (event.progress_percent / 10.0).floor() as u64;
                if self.last_plain_decile != Some(decile) {
                    self.last_plain_decile = Some(decile);
                    eprintln!(
                        "{:>5.1}% frame {}/{} {}",
                        event.progress_percent, event.current_frame, event.total_frames, message
                    );
                }
            }
        }
    }

    pub fn finish(&self) {
        if let Some(bar) = &self.bar {
            bar.finish();
        }
    }
}

fn describe(event: &ProgressEvent) -> String {
    let mut message = format!(
        "{} detections, {:.1} fps",
        event.detections_so_far, event.current_fps
    );
    if let Some(mb) = event.memory_mb {
        message.push_str(&format!(", {:.0} MiB", mb));
    }
    if event.error_count > 0 {
        message.push_str(&format!(", {} errors", event.error_count));
    }
    message
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 1 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_mode_never_draws_bars() {
        let ui = Ui::from_args(Some("plain"), true, false);
        assert!(!ui.use_pretty());
        assert!(ui.frame_progress(100).bar.is_none());
    }

    #[test]
    fn describe_mentions_errors_only_when_present() {
        let mut event = ProgressEvent {
            progress_percent: 50.0,
            current_frame: 5,
            total_frames: 10,
            detections_so_far: 3,
            current_fps: 12.0,
            memory_mb: Some(256.0),
            error_count: 0,
        };
        assert_eq!(describe(&event), "3 detections, 12.0 fps, 256 MiB");
        event.error_count = 2;
        assert!(describe(&event).ends_with("2 errors"));
    }

    #[test]
    fn durations_switch_units() {
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
    }
}

use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use vodcut_engine::{Phase, ProgressCallback, ProgressEvent};

fn phase_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} {msg:<12} [{elapsed_precise}] [{bar:40.green/white}] {pos:>3}%")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ")
}

/// Renders engine progress events as a single bar that restarts on each phase.
#[derive(Clone)]
pub struct ProgressManager {
    bar: ProgressBar,
    disabled: bool,
}

impl ProgressManager {
    pub fn new() -> Self {
        let bar = ProgressBar::new(100);
        bar.set_style(phase_style());
        bar.enable_steady_tick(Duration::from_millis(200));
        Self {
            bar,
            disabled: false,
        }
    }

    pub fn new_disabled() -> Self {
        Self {
            bar: ProgressBar::with_draw_target(Some(100), ProgressDrawTarget::hidden()),
            disabled: true,
        }
    }

    pub fn handle_event(&self, event: ProgressEvent) {
        if self.disabled {
            return;
        }
        match event {
            ProgressEvent::Percent { phase, percent } => {
                let label = phase.to_string();
                if self.bar.message() != label {
                    self.bar.set_message(label);
                    self.bar.reset_elapsed();
                }
                self.bar.set_position(u64::from(percent));
            }
            // Download status mirrors the percent events already drawn on the bar.
            ProgressEvent::Status {
                phase: Phase::Downloading,
                ..
            } => {}
            ProgressEvent::Status { message, .. } => {
                self.bar.println(message);
            }
        }
    }

    pub fn callback(&self) -> ProgressCallback {
        let manager = self.clone();
        Arc::new(move |event: ProgressEvent| manager.handle_event(event))
    }

    pub fn finish(&self, message: &str) {
        if !self.disabled {
            self.bar.finish_with_message(message.to_string());
        }
    }

    pub fn abandon(&self) {
        if !self.disabled {
            self.bar.abandon();
        }
    }
}

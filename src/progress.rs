//! Transfer progress bar on stderr, driven by request events.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use netbound_http::RequestEvent;

const SIZED_TEMPLATE: &str = "{spinner} [{bar:30}] {bytes}/{total_bytes} ({bytes_per_sec})";
const UNSIZED_TEMPLATE: &str = "{spinner} {bytes} ({bytes_per_sec})";

/// Mirrors Status/Progress events into an indicatif bar.
pub(crate) struct TransferProgress {
    bar: ProgressBar,
}

impl TransferProgress {
    /// Creates a visible bar when `enabled`, otherwise a hidden one.
    pub(crate) fn new(enabled: bool) -> Self {
        let bar = ProgressBar::with_draw_target(None, draw_target(enabled));
        bar.set_style(style(UNSIZED_TEMPLATE));
        Self { bar }
    }

    pub(crate) fn observe(&self, event: &RequestEvent) {
        match event {
            RequestEvent::Status { total_bytes, .. } => self.set_total(*total_bytes),
            RequestEvent::Progress {
                bytes_downloaded,
                total_bytes,
                ..
            } => {
                if self.bar.length().is_none() && total_bytes.is_some() {
                    self.set_total(*total_bytes);
                }
                self.bar.set_position(*bytes_downloaded);
            }
            RequestEvent::Complete { .. } | RequestEvent::Error { .. } => self.finish(),
        }
    }

    pub(crate) fn finish(&self) {
        self.bar.finish_and_clear();
    }

    fn set_total(&self, total_bytes: Option<u64>) {
        if let Some(total) = total_bytes {
            self.bar.set_length(total);
            self.bar.set_style(style(SIZED_TEMPLATE));
        }
    }

    #[cfg(test)]
    fn position(&self) -> u64 {
        self.bar.position()
    }

    #[cfg(test)]
    fn length(&self) -> Option<u64> {
        self.bar.length()
    }
}

fn draw_target(enabled: bool) -> ProgressDrawTarget {
    if enabled {
        ProgressDrawTarget::stderr()
    } else {
        ProgressDrawTarget::hidden()
    }
}

fn style(template: &str) -> ProgressStyle {
    ProgressStyle::with_template(template)
        .map(|style| style.progress_chars("=> "))
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

//! Plain-text progress rendering
//!
//! The engine reports through a [`ChannelProgressReporter`]; a background
//! task drains the channel and prints one line per event to stderr.

use container::{ChannelProgressReporter, ProgressEvent, ProgressStatus};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const CHANNEL_CAPACITY: usize = 128;

/// Render a single event as a terminal line
pub fn render(event: &ProgressEvent) -> String {
    let marker = match event.status {
        ProgressStatus::Pending => "…",
        ProgressStatus::Done => "✓",
        ProgressStatus::Ready => "✓",
        ProgressStatus::Updating => "↻",
    };

    match (&event.phase, &event.resource) {
        (Some(phase), Some(resource)) => {
            format!("  {} {} {} [{}]", marker, event.message, resource, phase)
        }
        (None, Some(resource)) => format!("  {} {} {}", marker, event.message, resource),
        _ => format!("  {} {}", marker, event.message),
    }
}

/// Reporter plus the task printing its events.
///
/// Dropping the reporter closes the channel; await [`TerminalProgress::finish`]
/// to flush the remaining lines.
pub struct TerminalProgress {
    pub reporter: ChannelProgressReporter,
    printer: JoinHandle<()>,
}

impl TerminalProgress {
    pub fn spawn() -> Self {
        let (tx, mut rx) = mpsc::channel::<ProgressEvent>(CHANNEL_CAPACITY);
        let printer = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                eprintln!("{}", render(&event));
            }
        });
        Self {
            reporter: ChannelProgressReporter::new(tx),
            printer,
        }
    }

    pub async fn finish(self) {
        drop(self.reporter);
        if let Err(e) = self.printer.await {
            tracing::debug!("Progress printer stopped: {}", e);
        }
    }
}

//! Progress updates for layer downloads
//!
//! Each layer task owns one [ProgressTracker] and reports cumulative byte
//! counts over a channel. A single display task owns the progress bars and
//! redraws them on a fixed tick. Nothing is shared between tasks except the
//! channel.

use crate::{errors::ImageError, image::ContentDigest};
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::{collections::HashMap, time::Duration};
use tokio::{sync::mpsc, task};

/// Redraw interval for the progress display
pub const TICK: Duration = Duration::from_millis(100);

const TEMPLATE: &str =
    "{msg:15} [{bar:25.cyan/blue}] {percent:>3}% {bytes}/{total_bytes} {bytes_per_sec} eta {eta}";

/// An update on the state of one tracked download
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProgressUpdate {
    pub tracker: usize,
    pub event: ProgressEvent,
}

/// An amount of progress toward one download
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ProgressEvent {
    Begin {
        digest: ContentDigest,
        size: Option<u64>,
    },
    /// Cumulative bytes written so far
    Progress(u64),
    Complete,
}

/// Hands out trackers that all report to one display
pub struct Progress {
    sender: mpsc::UnboundedSender<ProgressUpdate>,
    next_id: usize,
}

impl Progress {
    /// Start the display task
    ///
    /// With `visible` false the bars are drawn to a hidden target, but the
    /// same task still runs and consumes updates.
    pub fn start(visible: bool) -> (Progress, ProgressDisplay) {
        let target = if visible {
            ProgressDrawTarget::stderr()
        } else {
            ProgressDrawTarget::hidden()
        };
        Progress::with_draw_target(target)
    }

    pub fn with_draw_target(target: ProgressDrawTarget) -> (Progress, ProgressDisplay) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let multi = MultiProgress::with_draw_target(target);
        let handle = task::spawn(render(receiver, multi));
        (Progress { sender, next_id: 0 }, ProgressDisplay { handle })
    }

    /// Create the tracker for one download
    pub fn tracker(&mut self, digest: &ContentDigest) -> ProgressTracker {
        let id = self.next_id;
        self.next_id += 1;
        ProgressTracker {
            id,
            digest: digest.clone(),
            sender: self.sender.clone(),
            total: None,
            done: false,
        }
    }
}

/// Sends progress for a single download
///
/// The tracker marks itself complete once the reported byte count reaches
/// the size given to [ProgressTracker::begin].
pub struct ProgressTracker {
    id: usize,
    digest: ContentDigest,
    sender: mpsc::UnboundedSender<ProgressUpdate>,
    total: Option<u64>,
    done: bool,
}

impl ProgressTracker {
    pub fn begin(&mut self, size: Option<u64>) {
        self.total = size;
        self.send(ProgressEvent::Begin {
            digest: self.digest.clone(),
            size,
        });
    }

    pub fn progress(&mut self, written: u64) {
        self.send(ProgressEvent::Progress(written));
        if let Some(total) = self.total {
            if written >= total {
                self.complete();
            }
        }
    }

    pub fn complete(&mut self) {
        if !self.done {
            self.done = true;
            self.send(ProgressEvent::Complete);
        }
    }

    pub fn is_complete(&self) -> bool {
        self.done
    }

    fn send(&self, event: ProgressEvent) {
        // the display may already be gone, progress is best effort
        let _ = self.sender.send(ProgressUpdate {
            tracker: self.id,
            event,
        });
    }
}

/// Handle to the running display task
pub struct ProgressDisplay {
    handle: task::JoinHandle<()>,
}

impl ProgressDisplay {
    /// Wait for the display to finish rendering
    ///
    /// Consumes the [Progress] so that the channel can close once every
    /// tracker has been dropped.
    pub async fn finish(self, progress: Progress) -> Result<(), ImageError> {
        std::mem::drop(progress);
        self.handle.await?;
        Ok(())
    }
}

async fn render(mut receiver: mpsc::UnboundedReceiver<ProgressUpdate>, multi: MultiProgress) {
    let style = ProgressStyle::with_template(TEMPLATE)
        .map(|style| style.progress_chars("=> "))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    let mut bars: HashMap<usize, ProgressBar> = HashMap::new();
    let mut ticker = tokio::time::interval(TICK);

    loop {
        tokio::select! {
            update = receiver.recv() => match update {
                None => break,
                Some(update) => apply(&multi, &style, &mut bars, update),
            },
            _ = ticker.tick() => {
                for bar in bars.values().filter(|bar| !bar.is_finished()) {
                    bar.tick();
                }
            }
        }
    }

    for bar in bars.values().filter(|bar| !bar.is_finished()) {
        bar.abandon();
    }
}

fn apply(
    multi: &MultiProgress,
    style: &ProgressStyle,
    bars: &mut HashMap<usize, ProgressBar>,
    update: ProgressUpdate,
) {
    match update.event {
        ProgressEvent::Begin { digest, size } => {
            let bar = multi.add(ProgressBar::new(size.unwrap_or(0)));
            bar.set_style(style.clone());
            bar.set_message(label(&digest));
            bars.insert(update.tracker, bar);
        }
        ProgressEvent::Progress(written) => {
            if let Some(bar) = bars.get(&update.tracker) {
                bar.set_length(bar.length().unwrap_or(0).max(written));
                bar.set_position(written);
            }
        }
        ProgressEvent::Complete => {
            if let Some(bar) = bars.get(&update.tracker) {
                bar.finish();
            }
        }
    }
}

/// Short name for a layer, like `[0123456789ab]`
pub fn label(digest: &ContentDigest) -> String {
    let hex = digest.hex_str();
    format!("[{}]", &hex[..hex.len().min(12)])
}

//! Byte-count progress reporting shared by all chunk tasks

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Destination for "n bytes were read" events
///
/// Every chunk task holds a handle to the same sink, so implementations
/// must tolerate concurrent calls.
pub trait ProgressSink: Send + Sync + Debug {
    fn observe(&self, bytes: u64);
}

/// Lock-free running total of observed bytes
#[derive(Debug, Clone, Default)]
pub struct ByteCounter(Arc<AtomicU64>);

impl ByteCounter {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn total(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
    /// Start counting from zero again
    pub fn reset(&self) {
        self.0.store(0, Ordering::SeqCst);
    }
}

impl ProgressSink for ByteCounter {
    fn observe(&self, bytes: u64) {
        self.0.fetch_add(bytes, Ordering::SeqCst);
    }
}

#[cfg(feature = "progress")]
impl ProgressSink for indicatif::ProgressBar {
    fn observe(&self, bytes: u64) {
        self.inc(bytes);
    }
}

impl<T: ProgressSink + ?Sized> ProgressSink for Arc<T> {
    fn observe(&self, bytes: u64) {
        (**self).observe(bytes)
    }
}

/// Terminal bar sized to `len`, redrawn at most ten times a second
#[cfg(feature = "progress")]
pub fn default_bar(len: u64) -> indicatif::ProgressBar {
    let bar = indicatif::ProgressBar::with_draw_target(
        len,
        indicatif::ProgressDrawTarget::stderr_with_hz(10),
    );
    bar.set_style(
        indicatif::ProgressStyle::default_bar()
            .template("{msg} [{elapsed_precise}] [{bar:60.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})")
            .progress_chars("=> "),
    );
    bar.set_message("Downloading");
    bar
}

/// Handle given to each chunk task: always feeds the internal counter and
/// forwards to the user's sink when one is connected
#[derive(Debug, Clone)]
pub(crate) struct Tracker {
    counter: ByteCounter,
    sink: Option<Arc<dyn ProgressSink>>,
}

impl Tracker {
    pub(crate) fn new(counter: ByteCounter, sink: Option<Arc<dyn ProgressSink>>) -> Self {
        Self { counter, sink }
    }
}

impl ProgressSink for Tracker {
    fn observe(&self, bytes: u64) {
        self.counter.observe(bytes);
        if let Some(sink) = &self.sink {
            sink.observe(bytes);
        }
    }
}

use chunkdl::DEFAULT_CHUNKS;
use clap::Parser;
use clap_verbosity_flag::{Verbosity, WarnLevel};
use std::path::PathBuf;

/// Download a file over concurrent HTTP range requests
#[derive(Debug, Parser)]
#[clap(author, version, about)]
pub(crate) struct App {
    /// URL of the file to download
    pub(crate) url: String,
    /// Output file, or directory to place `download.<ext>` in
    #[clap(short, long, parse(from_os_str))]
    pub(crate) output: Option<PathBuf>,
    /// Number of concurrent download chunks
    #[clap(short, long, default_value_t = DEFAULT_CHUNKS)]
    pub(crate) chunks: usize,
    /// Fetch at most this many chunks at the same time
    #[clap(long)]
    pub(crate) max_concurrency: Option<usize>,
    /// Per-request timeout in seconds
    #[clap(long)]
    pub(crate) timeout: Option<u64>,
    /// Give up when the whole download takes longer than this many seconds
    #[clap(long)]
    pub(crate) deadline: Option<u64>,
    /// Don't draw a progress bar
    #[clap(long)]
    pub(crate) no_progress: bool,
    #[clap(flatten)]
    pub(crate) verbose: Verbosity<WarnLevel>,
}

impl App {
    pub(crate) fn new() -> Self {
        Self::parse()
    }
    pub(crate) fn init_logging(&self) {
        pretty_env_logger::formatted_builder()
            .filter_level(self.verbose.log_level_filter())
            .init()
    }
}

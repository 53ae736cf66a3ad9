//! Fetch a remote file over concurrent HTTP range requests
//!
//! The resource is probed with a HEAD request, split into byte ranges, and
//! every range is fetched by its own task. Once all tasks have finished the
//! ranges are written to disk in order. If any range fails, nothing is
//! written and every failure is reported together.
//!
//! The crate exposes debug logs through the [`tracing`][tracing] crate
//!
//! ## Feature flags
//!
//! - `progress`: Enables progress reporting using `indicatif`, on by default
//! - `rustls`: Use rustls for HTTPS, on by default
//! - `openssl`: Use openssl for HTTPS
//!
//! ## Crate usage
//!
//! # Example
//!
//! ```no_run
//! use chunkdl::Downloader;
//! #[tokio::main]
//! async fn main() -> Result<(), chunkdl::ChunkdlError> {
//!     let number_of_chunks = 6;
//!     let mut client = Downloader::new("https://crates.io", number_of_chunks).await?;
//!     client.progress_bar();
//!     let saved = client.download_and_save(".").await?;
//!     Ok(())
//! }
//! ```
#[macro_use]
extern crate derive_builder;

mod async_utils;
mod chunk;
mod downloader;
mod error;
pub mod probe;
pub mod progress;

pub use chunk::{plan, ByteRange, ChunkPlan, ChunkResult, ResultTable};
pub use downloader::{Config, ConfigBuilder, ConfigBuilderError, Downloader, DEFAULT_CHUNKS};
pub use error::{ChunkError, ChunkErrorKind, ChunkdlError, Result};
#[cfg(feature = "progress")]
pub use indicatif::ProgressStyle;
pub use probe::ResourceMetadata;
pub use progress::{ByteCounter, ProgressSink};
pub use reqwest::{header, Url};

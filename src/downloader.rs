use crate::async_utils::join_barrier;
use crate::chunk::{ByteRange, ChunkPlan, ChunkResult, ResultTable};
use crate::error::{ChunkError, ChunkErrorKind};
use crate::probe::{probe, ResourceMetadata};
use crate::progress::{ByteCounter, ProgressSink, Tracker};
use crate::{ChunkdlError, Result};
use bytes::BytesMut;
use reqwest::header::RANGE;
use reqwest::{Client, StatusCode, Url};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

/// Number of chunks used when none is given
pub const DEFAULT_CHUNKS: usize = 6;
/// Largest buffer reserved up front for one chunk, the rest grows as data arrives
const MAX_PREALLOC: usize = 8 * 1024 * 1024;

fn default_user_agent() -> String {
    concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_string()
}

/// Download settings
///
/// # Example
///
/// ```
/// use chunkdl::ConfigBuilder;
/// use std::time::Duration;
/// # fn main() -> Result<(), chunkdl::ChunkdlError> {
/// let config = ConfigBuilder::default()
///     .chunks(8)
///     .max_concurrency(4)
///     .request_timeout(Duration::from_secs(30))
///     .build()?;
/// assert_eq!(config.chunks, 8);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Builder)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct Config {
    /// Number of ranges the resource is split into
    #[builder(default = "DEFAULT_CHUNKS")]
    pub chunks: usize,
    /// Upper bound on chunks fetched at the same time, unbounded when unset
    #[builder(default, setter(strip_option))]
    pub max_concurrency: Option<usize>,
    /// Timeout applied to every single HTTP request
    #[builder(default, setter(strip_option))]
    pub request_timeout: Option<Duration>,
    /// Upper bound on the whole fetch phase
    #[builder(default, setter(strip_option))]
    pub deadline: Option<Duration>,
    #[builder(default = "default_user_agent()", setter(into))]
    pub user_agent: String,
}

impl ConfigBuilder {
    fn validate(&self) -> std::result::Result<(), String> {
        if self.chunks == Some(0) {
            return Err("chunk count must be at least 1".to_string());
        }
        if self.max_concurrency == Some(Some(0)) {
            return Err("max concurrency must be at least 1".to_string());
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chunks: DEFAULT_CHUNKS,
            max_concurrency: None,
            request_timeout: None,
            deadline: None,
            user_agent: default_user_agent(),
        }
    }
}

/// Fetches one resource as concurrent range requests
#[derive(Debug, Clone)]
pub struct Downloader {
    client: Client,
    url: Url,
    config: Config,
    metadata: ResourceMetadata,
    plan: ChunkPlan,
    counter: ByteCounter,
    progress: Option<Arc<dyn ProgressSink>>,
    #[cfg(feature = "progress")]
    pb: Option<indicatif::ProgressBar>,
}

impl Downloader {
    /// Create a new downloader
    ///
    /// # Arguments
    /// * `url` - URL of the file
    /// * `chunks` - number of ranges, each fetched by its own task
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use chunkdl::Downloader;
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), chunkdl::ChunkdlError> {
    ///     let downloader = Downloader::new("https://crates.io", 5).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn new(url: &str, chunks: usize) -> Result<Self> {
        let config = ConfigBuilder::default().chunks(chunks).build()?;
        Self::with_config(url, config).await
    }
    /// Probe the resource and plan its chunks
    #[instrument(skip(config), fields(chunks = config.chunks))]
    pub async fn with_config(url: &str, config: Config) -> Result<Self> {
        if config.max_concurrency == Some(0) {
            return Err(ChunkdlError::InvalidConfiguration(
                "max concurrency must be at least 1".to_string(),
            ));
        }
        let parsed = Url::parse(url)?;
        let client = build_client(&config)?;
        let metadata = probe(&client, &parsed).await?;
        let plan = ChunkPlan::new(metadata.total_size, config.chunks)?;
        debug!("Planned {} chunks: {:?}", plan.len(), plan.ranges());
        Ok(Self {
            client,
            url: parsed,
            config,
            metadata,
            plan,
            counter: ByteCounter::new(),
            progress: None,
            #[cfg(feature = "progress")]
            pb: None,
        })
    }
    pub fn url(&self) -> &Url {
        &self.url
    }
    pub fn get_len(&self) -> u64 {
        self.metadata.total_size
    }
    pub fn metadata(&self) -> &ResourceMetadata {
        &self.metadata
    }
    pub fn plan(&self) -> &ChunkPlan {
        &self.plan
    }
    pub fn config(&self) -> &Config {
        &self.config
    }
    /// Name derived from the content type, see [`ResourceMetadata::default_filename`]
    pub fn filename(&self) -> String {
        self.metadata.default_filename()
    }
    /// Bytes observed by the chunk tasks of the latest download
    pub fn bytes_observed(&self) -> u64 {
        self.counter.total()
    }
    /// Forward every read to `sink`, replaces any previously connected sink
    pub fn connect_progress(&mut self, sink: Arc<dyn ProgressSink>) -> &mut Self {
        self.progress = Some(sink);
        self
    }
    /// Enable progress reporting on the terminal
    #[cfg(feature = "progress")]
    pub fn progress_bar(&mut self) -> &mut Self {
        let bar = crate::progress::default_bar(self.get_len());
        self.pb = Some(bar.clone());
        self.connect_progress(Arc::new(bar))
    }
    /// Set the progress bar style
    #[cfg(feature = "progress")]
    pub fn bar_style(&self, style: indicatif::ProgressStyle) {
        if let Some(pb) = &self.pb {
            pb.set_style(style);
        }
    }
    /// Fetch every chunk and return the complete result table
    ///
    /// All chunk tasks run to completion even when some of them fail; the
    /// failures are then returned together as
    /// [`ChunkFetch`][ChunkdlError::ChunkFetch].
    ///
    /// # Example
    ///
    /// ```no_run
    /// use chunkdl::Downloader;
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), chunkdl::ChunkdlError> {
    /// let client = Downloader::new("https://crates.io", 5).await?;
    /// let data = client.download().await?.to_vec();
    /// # Ok(())
    /// # }
    /// ```
    #[instrument(skip(self), fields(URL = %self.url, chunks = self.plan.len()))]
    pub async fn download(&self) -> Result<ResultTable> {
        let res = self.fetch_all().await;
        #[cfg(feature = "progress")]
        if let Some(pb) = &self.pb {
            match &res {
                Ok(_) => pb.finish(),
                Err(_) => pb.abandon(),
            }
        }
        res
    }
    async fn fetch_all(&self) -> Result<ResultTable> {
        self.counter.reset();
        #[cfg(feature = "progress")]
        if let Some(pb) = &self.pb {
            pb.reset();
        }
        let tracker = Tracker::new(self.counter.clone(), self.progress.clone());
        let permits = self
            .config
            .max_concurrency
            .map(|n| Arc::new(Semaphore::new(n)));
        let whole = self.plan.len() == 1;
        let mut handles = self
            .plan
            .iter()
            .map(|range| {
                tokio::spawn(fetch_chunk(
                    self.client.clone(),
                    self.url.clone(),
                    *range,
                    whole,
                    tracker.clone(),
                    permits.clone(),
                ))
            })
            .collect::<Vec<_>>();
        let joined = join_barrier(&mut handles, self.config.deadline).await?;

        let mut table = ResultTable::new(self.plan.len());
        let mut failures = Vec::new();
        for (range, res) in self.plan.iter().zip(joined) {
            let res = res.unwrap_or_else(|e| {
                Err(ChunkError::new(*range, ChunkErrorKind::Aborted(e.to_string())))
            });
            match res {
                Ok(result) => table.fill(result)?,
                Err(e) => {
                    warn!("Chunk {} failed: {}", e.index, e.kind);
                    failures.push(e);
                }
            }
        }
        if !failures.is_empty() {
            return Err(ChunkdlError::ChunkFetch(failures));
        }
        info!(
            "Downloaded {} bytes in {} chunks",
            table.byte_len(),
            table.len()
        );
        Ok(table)
    }
    /// Where [`download_and_save`][Self::download_and_save] writes for `path`
    pub async fn resolve_output(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        let is_dir = tokio::fs::metadata(path)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);
        if is_dir {
            path.join(self.filename())
        } else {
            path.to_path_buf()
        }
    }
    /// Download and write the file, returns the path written
    ///
    /// # Arguments
    /// * `path` - path to save the file to, if it's a directory then the name
    ///   derived from the content type is used
    ///
    /// # Example
    ///
    /// ```no_run
    /// use chunkdl::Downloader;
    /// #[tokio::main]
    /// async fn main() -> Result<(), chunkdl::ChunkdlError> {
    ///     let client = Downloader::new("https://crates.io", 5).await?;
    ///     let saved = client.download_and_save(".").await?;
    ///     println!("{}", saved.display());
    ///     Ok(())
    ///  }
    /// ```
    #[instrument(skip(self, path), fields(URL = %self.url))]
    pub async fn download_and_save(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let target = self.resolve_output(path).await;
        let table = self.download().await?;
        table.save_to_file(&target).await?;
        info!("Saved {}", target.display());
        Ok(target)
    }
}

fn build_client(config: &Config) -> Result<Client> {
    let mut builder = Client::builder().user_agent(config.user_agent.as_str());
    if let Some(timeout) = config.request_timeout {
        builder = builder.timeout(timeout);
    }
    builder.build().map_err(Into::into)
}

#[instrument(skip(client, url, range, whole, tracker, permits), fields(index = range.index, range = %range))]
async fn fetch_chunk(
    client: Client,
    url: Url,
    range: ByteRange,
    whole: bool,
    tracker: Tracker,
    permits: Option<Arc<Semaphore>>,
) -> std::result::Result<ChunkResult, ChunkError> {
    let _permit = match permits {
        Some(sem) => Some(
            sem.acquire_owned()
                .await
                .map_err(|e| ChunkError::new(range, ChunkErrorKind::Aborted(e.to_string())))?,
        ),
        None => None,
    };
    let mut resp = client
        .get(url)
        .header(RANGE, range.header_value())
        .send()
        .await
        .map_err(|e| ChunkError::new(range, e))?;
    let status = resp.status();
    debug!("Response code: {}", status);
    if status != StatusCode::PARTIAL_CONTENT && !(whole && status == StatusCode::OK) {
        return Err(ChunkError::new(
            range,
            ChunkErrorKind::UnexpectedStatus(status.as_u16()),
        ));
    }
    let cap = usize::try_from(range.len())
        .unwrap_or(usize::MAX)
        .min(MAX_PREALLOC);
    let mut buf = BytesMut::with_capacity(cap);
    while let Some(chunk) = resp.chunk().await.map_err(|e| ChunkError::new(range, e))? {
        let received = buf.len() as u64 + chunk.len() as u64;
        if received > range.len() {
            return Err(ChunkError::new(
                range,
                ChunkErrorKind::LengthMismatch {
                    expected: range.len(),
                    received,
                },
            ));
        }
        tracker.observe(chunk.len() as u64);
        buf.extend_from_slice(&chunk);
    }
    let received = buf.len() as u64;
    if received != range.len() {
        return Err(ChunkError::new(
            range,
            ChunkErrorKind::LengthMismatch {
                expected: range.len(),
                received,
            },
        ));
    }
    debug!("Received {} bytes", received);
    Ok(ChunkResult {
        index: range.index,
        bytes: buf.freeze(),
    })
}

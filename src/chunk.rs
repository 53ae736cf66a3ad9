use crate::{ChunkdlError, Result};
use bytes::Bytes;
use std::fmt;
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};

/// Inclusive byte interval of the remote resource, fetched by one task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ByteRange {
    pub index: usize,
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// Number of bytes covered, `end` is inclusive
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }
    /// Formatted [`RANGE`][reqwest::header::RANGE] header value
    pub fn header_value(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Ordered, contiguous, non-overlapping ranges covering a whole resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPlan {
    total: u64,
    ranges: Vec<ByteRange>,
}

impl ChunkPlan {
    /// Split `total` bytes into `chunks` ranges
    ///
    /// Every range but the last is `total / chunks` long, the last one absorbs
    /// the remainder. A chunk count larger than `total` is clamped to `total`
    /// and an empty resource yields an empty plan.
    ///
    /// # Arguments
    /// * `total` - size of the resource in bytes
    /// * `chunks` - the desired number of ranges
    ///
    /// # Example
    ///
    /// ```
    /// use chunkdl::ChunkPlan;
    /// # fn main() -> chunkdl::Result<()> {
    /// let plan = ChunkPlan::new(1000, 4)?;
    /// let headers = plan.iter().map(|r| r.header_value()).collect::<Vec<_>>();
    /// assert_eq!(headers[2], "bytes=500-749");
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(total: u64, chunks: usize) -> Result<Self> {
        if chunks == 0 {
            return Err(ChunkdlError::InvalidConfiguration(
                "chunk count must be at least 1".to_string(),
            ));
        }
        if total == 0 {
            debug!("Empty resource, nothing to plan");
            return Ok(Self {
                total,
                ranges: Vec::new(),
            });
        }
        let mut count = chunks as u64;
        if count > total {
            debug!("Clamping chunk count {} to resource size {}", count, total);
            count = total;
        }
        let base = total / count;
        let ranges = (0..count)
            .map(|i| {
                let start = i * base;
                let end = if i == count - 1 {
                    total - 1
                } else {
                    start + base - 1
                };
                ByteRange {
                    index: i as usize,
                    start,
                    end,
                }
            })
            .collect();
        Ok(Self { total, ranges })
    }
    pub fn total(&self) -> u64 {
        self.total
    }
    pub fn len(&self) -> usize {
        self.ranges.len()
    }
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
    pub fn iter(&self) -> std::slice::Iter<'_, ByteRange> {
        self.ranges.iter()
    }
    pub fn ranges(&self) -> &[ByteRange] {
        &self.ranges
    }
}

impl<'a> IntoIterator for &'a ChunkPlan {
    type Item = &'a ByteRange;
    type IntoIter = std::slice::Iter<'a, ByteRange>;
    fn into_iter(self) -> Self::IntoIter {
        self.ranges.iter()
    }
}

/// Shorthand for [`ChunkPlan::new`]
pub fn plan(total: u64, chunks: usize) -> Result<ChunkPlan> {
    ChunkPlan::new(total, chunks)
}

/// Bytes of one range, produced by the task that fetched it
#[derive(Debug, Clone)]
pub struct ChunkResult {
    pub index: usize,
    pub bytes: Bytes,
}

/// One write-once slot per planned range, addressed by chunk index
#[derive(Debug, Clone, Default)]
pub struct ResultTable {
    slots: Vec<Option<Bytes>>,
}

impl ResultTable {
    pub fn new(len: usize) -> Self {
        Self {
            slots: vec![None; len],
        }
    }
    /// Move a finished chunk into its slot, a slot is only ever filled once
    pub fn fill(&mut self, result: ChunkResult) -> Result<()> {
        let slot = self
            .slots
            .get_mut(result.index)
            .ok_or(ChunkdlError::SlotOutOfRange(result.index))?;
        if slot.is_some() {
            return Err(ChunkdlError::SlotFilled(result.index));
        }
        *slot = Some(result.bytes);
        Ok(())
    }
    pub fn len(&self) -> usize {
        self.slots.len()
    }
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
    pub fn is_complete(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }
    /// Indices of slots that were never filled
    pub fn missing(&self) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_none())
            .map(|(i, _)| i)
            .collect()
    }
    /// Total number of bytes held across all slots
    pub fn byte_len(&self) -> u64 {
        self.slots.iter().flatten().map(|b| b.len() as u64).sum()
    }
    /// Concatenate all slots in index order
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.byte_len() as usize);
        for b in self.slots.iter().flatten() {
            out.extend_from_slice(b);
        }
        out
    }
    fn ensure_complete(&self) -> Result<()> {
        if self.is_complete() {
            Ok(())
        } else {
            Err(ChunkdlError::IncompleteResult(self.missing()))
        }
    }
    /// Write all slots in index order to a newly created file at `path`
    pub async fn save_to_file<T: AsRef<Path>>(&self, path: T) -> Result<()> {
        let path = path.as_ref();
        self.ensure_complete()?;
        let f = File::create(path).await.map_err(ChunkdlError::fs(path))?;
        self.save(f, path).await
    }
    #[instrument(skip(self, output, path), fields(path = %path.display(), slots = self.slots.len()))]
    async fn save(&self, mut output: File, path: &Path) -> Result<()> {
        for (i, b) in self.slots.iter().flatten().enumerate() {
            output
                .write_all(b)
                .await
                .map_err(ChunkdlError::fs(path))?;
            debug!("Written chunk {} ({} bytes)", i, b.len());
        }
        output.flush().await.map_err(ChunkdlError::fs(path))?;
        output.sync_all().await.map_err(ChunkdlError::fs(path))?;
        Ok(())
    }
}

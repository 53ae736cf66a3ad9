use crate::{ChunkdlError, Result};
use reqwest::header::{HeaderMap, ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Client, Url};
use tracing::{debug, instrument};

/// Extension used when the media type is absent or malformed
pub const FALLBACK_EXTENSION: &str = "bin";

/// What the server told us about the resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceMetadata {
    pub total_size: u64,
    pub supports_ranges: bool,
    pub content_type: Option<String>,
}

impl ResourceMetadata {
    /// Interpret the headers of a successful metadata response
    ///
    /// Fails with [`MissingSize`][ChunkdlError::MissingSize] when the length is
    /// absent or not a non-negative integer, and with
    /// [`RangeUnsupported`][ChunkdlError::RangeUnsupported] when the server
    /// doesn't list `bytes` in `Accept-Ranges`.
    pub fn from_headers(headers: &HeaderMap) -> Result<Self> {
        let total_size = headers
            .get(CONTENT_LENGTH)
            .ok_or(ChunkdlError::MissingSize)?
            .to_str()
            .map_err(|_| ChunkdlError::MissingSize)?
            .trim()
            .parse::<u64>()
            .map_err(|_| ChunkdlError::MissingSize)?;
        let supports_ranges = headers
            .get_all(ACCEPT_RANGES)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .any(|unit| unit.trim().eq_ignore_ascii_case("bytes"));
        if !supports_ranges {
            return Err(ChunkdlError::RangeUnsupported);
        }
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        Ok(Self {
            total_size,
            supports_ranges,
            content_type,
        })
    }
    /// File extension derived from the declared media type
    pub fn extension(&self) -> &str {
        extension_for(self.content_type.as_deref())
    }
    /// `download.<ext>`, used when no output path is given
    pub fn default_filename(&self) -> String {
        format!("download.{}", self.extension())
    }
}

/// Map `type/subtype` to `subtype`, ignoring media type parameters
///
/// # Example
/// ```
/// use chunkdl::probe::extension_for;
/// assert_eq!(extension_for(Some("application/zip")), "zip");
/// assert_eq!(extension_for(Some("text/html; charset=utf-8")), "html");
/// assert_eq!(extension_for(None), "bin");
/// ```
pub fn extension_for(content_type: Option<&str>) -> &str {
    let essence = match content_type {
        Some(ct) => ct.split(';').next().unwrap_or_default().trim(),
        None => return FALLBACK_EXTENSION,
    };
    let mut parts = essence.split('/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(ty), Some(subtype), None) if !ty.trim().is_empty() && !subtype.trim().is_empty() => {
            subtype.trim()
        }
        _ => FALLBACK_EXTENSION,
    }
}

/// Issue a HEAD request and check that the resource can be fetched in ranges
#[instrument(skip(client, url), fields(URL = %url))]
pub async fn probe(client: &Client, url: &Url) -> Result<ResourceMetadata> {
    let resp = client.head(url.clone()).send().await?;
    debug!("Response code: {}", resp.status());
    debug!("Received HEAD response: {:?}", resp.headers());
    if !resp.status().is_success() {
        return Err(ChunkdlError::UnexpectedStatus(resp.status().as_u16()));
    }
    let meta = ResourceMetadata::from_headers(resp.headers())?;
    debug!("File size: {}MB", meta.total_size / 1_000_000);
    Ok(meta)
}

//! Image reference types

use std::fmt;

use crate::error::StorageError;
use crate::storage::ObjectLocation;

/// Where the bytes of one coloring page come from.
///
/// Decided once when a submission is accepted, so the resolver only ever
/// matches over these variants.
#[derive(Clone, PartialEq, Eq)]
pub enum ImageRef {
    /// Bytes embedded in the request (a data URI)
    Inline { content_type: String, data: Vec<u8> },
    /// An object in S3-compatible storage; `url` is kept for the HTTP fallback
    Storage { location: ObjectLocation, url: String },
    /// Any other http(s) URL
    Remote { url: String },
}

impl ImageRef {
    pub fn kind(&self) -> &'static str {
        match self {
            ImageRef::Inline { .. } => "inline",
            ImageRef::Storage { .. } => "storage",
            ImageRef::Remote { .. } => "remote",
        }
    }
}

// Inline payloads can be megabytes; never dump them into logs.
impl fmt::Debug for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageRef::Inline { content_type, data } => f
                .debug_struct("Inline")
                .field("content_type", content_type)
                .field("len", &data.len())
                .finish(),
            ImageRef::Storage { location, url } => f
                .debug_struct("Storage")
                .field("location", location)
                .field("url", url)
                .finish(),
            ImageRef::Remote { url } => f.debug_struct("Remote").field("url", url).finish(),
        }
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageRef::Inline { content_type, data } => {
                write!(f, "inline {} ({} bytes)", content_type, data.len())
            }
            ImageRef::Storage { location, .. } => write!(f, "s3://{}", location),
            ImageRef::Remote { url } => f.write_str(url),
        }
    }
}

/// Image bytes ready to be decoded
#[derive(Debug, Clone)]
pub struct ResolvedImage {
    pub data: Vec<u8>,
    pub content_type: String,
}

impl ResolvedImage {
    pub fn new(data: Vec<u8>, content_type: impl Into<String>) -> Self {
        Self {
            data,
            content_type: content_type.into(),
        }
    }
}

/// Rejection of a raw reference string at submission time
#[derive(Debug, thiserror::Error)]
pub enum ImageRefError {
    #[error("empty image reference")]
    Empty,

    #[error("malformed data URI: {0}")]
    MalformedDataUri(String),

    #[error("invalid base64 payload: {0}")]
    InvalidBase64(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("unsupported reference scheme: {0}")]
    UnsupportedScheme(String),

    #[error("storage URL does not name both a bucket and a key: {0}")]
    IncompleteStorageUrl(String),
}

/// HTTP fetch failure
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    #[error("request to {0} timed out")]
    Timeout(String),

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("request failed: {0}")]
    Request(String),
}

/// One image reference could not be turned into a drawable image
#[derive(Debug, thiserror::Error)]
pub enum ResolutionError {
    #[error("storage read failed: {0}")]
    Storage(#[from] StorageError),

    #[error("storage read failed ({storage}); HTTP fallback failed ({fallback})")]
    Unreachable {
        storage: StorageError,
        fallback: FetchError,
    },

    #[error("HTTP fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("image could not be decoded: {0}")]
    Decode(String),
}

/// Best guess of a content type from a key or URL path
pub fn guess_content_type(path: &str) -> String {
    mime_guess::from_path(path)
        .first_raw()
        .unwrap_or("application/octet-stream")
        .to_string()
}

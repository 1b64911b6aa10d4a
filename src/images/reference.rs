//! Image reference parsing
//!
//! Turns the raw strings clients submit into [`ImageRef`] variants:
//! - `data:` URIs become inline payloads
//! - URLs on a path-style endpoint (MinIO, localhost, `s3.<region>.amazonaws.com`)
//!   carry the bucket as the first path segment
//! - virtual-hosted AWS URLs (`<bucket>.s3.<region>.amazonaws.com`) carry the
//!   bucket in the host
//! - every other http(s) URL is fetched over plain HTTP

use base64::Engine;
use reqwest::Url;

use crate::config::StorageConfig;
use crate::storage::ObjectLocation;

use super::types::{ImageRef, ImageRefError};

const AWS_SUFFIX: &str = ".amazonaws.com";

/// Classifies raw reference strings
#[derive(Debug, Clone)]
pub struct ReferenceParser {
    /// Hosts (without port) that serve path-style bucket URLs
    path_style_hosts: Vec<String>,
}

impl ReferenceParser {
    pub fn new<I, S>(path_style_hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut hosts: Vec<String> = vec!["localhost".to_string(), "127.0.0.1".to_string()];
        for host in path_style_hosts {
            let host = host.into().to_lowercase();
            if !host.is_empty() && !hosts.contains(&host) {
                hosts.push(host);
            }
        }
        Self {
            path_style_hosts: hosts,
        }
    }

    /// Parser that recognizes the configured storage endpoint
    pub fn from_config(storage: &StorageConfig) -> Self {
        let endpoint_host = storage
            .provider
            .uses_path_style()
            .then(|| Url::parse(&storage.endpoint).ok())
            .flatten()
            .and_then(|url| url.host_str().map(str::to_string));
        Self::new(endpoint_host)
    }

    pub fn parse(&self, raw: &str) -> Result<ImageRef, ImageRefError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ImageRefError::Empty);
        }

        if raw.get(..5).is_some_and(|p| p.eq_ignore_ascii_case("data:")) {
            return parse_data_uri(&raw[5..]);
        }

        let url = Url::parse(raw).map_err(|e| ImageRefError::InvalidUrl(format!("{}: {}", e, raw)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ImageRefError::UnsupportedScheme(url.scheme().to_string()));
        }

        let host = url
            .host_str()
            .map(str::to_lowercase)
            .ok_or_else(|| ImageRefError::InvalidUrl(raw.to_string()))?;

        if self.path_style_hosts.contains(&host) {
            return path_style_location(&url, raw);
        }

        match classify_aws_host(&host) {
            AwsHost::PathStyle => path_style_location(&url, raw),
            AwsHost::VirtualHosted(bucket) => {
                let key = decode_component(url.path().trim_start_matches('/'));
                if key.is_empty() {
                    return Err(ImageRefError::IncompleteStorageUrl(raw.to_string()));
                }
                Ok(ImageRef::Storage {
                    location: ObjectLocation::new(bucket, key),
                    url: raw.to_string(),
                })
            }
            AwsHost::Other => Ok(ImageRef::Remote {
                url: raw.to_string(),
            }),
        }
    }

    /// Parse every reference, naming the first bad one by its 1-based position
    pub fn parse_all<S: AsRef<str>>(&self, raw: &[S]) -> Result<Vec<ImageRef>, (usize, ImageRefError)> {
        raw.iter()
            .enumerate()
            .map(|(i, r)| self.parse(r.as_ref()).map_err(|e| (i + 1, e)))
            .collect()
    }
}

impl Default for ReferenceParser {
    fn default() -> Self {
        Self::new(Vec::<String>::new())
    }
}

#[derive(Debug, PartialEq, Eq)]
enum AwsHost {
    /// `s3.amazonaws.com`, `s3.<region>.amazonaws.com`, `s3-<region>.amazonaws.com`
    PathStyle,
    /// `<bucket>.s3[.-]<region>.amazonaws.com` or `<bucket>.s3.amazonaws.com`
    VirtualHosted(String),
    Other,
}

fn classify_aws_host(host: &str) -> AwsHost {
    let Some(stem) = host.strip_suffix(AWS_SUFFIX) else {
        return AwsHost::Other;
    };

    if stem == "s3" || stem.starts_with("s3.") || stem.starts_with("s3-") {
        return AwsHost::PathStyle;
    }

    let bucket_end = stem
        .find(".s3.")
        .or_else(|| stem.find(".s3-"))
        .or_else(|| stem.strip_suffix(".s3").map(str::len));

    match bucket_end {
        Some(end) if end > 0 => AwsHost::VirtualHosted(stem[..end].to_string()),
        _ => AwsHost::Other,
    }
}

fn path_style_location(url: &Url, raw: &str) -> Result<ImageRef, ImageRefError> {
    let path = url.path().trim_start_matches('/');
    let (bucket, key) = path
        .split_once('/')
        .ok_or_else(|| ImageRefError::IncompleteStorageUrl(raw.to_string()))?;

    let bucket = decode_component(bucket);
    let key = decode_component(key);
    if bucket.is_empty() || key.is_empty() {
        return Err(ImageRefError::IncompleteStorageUrl(raw.to_string()));
    }

    Ok(ImageRef::Storage {
        location: ObjectLocation::new(bucket, key),
        url: raw.to_string(),
    })
}

fn decode_component(s: &str) -> String {
    urlencoding::decode(s)
        .map(|c| c.into_owned())
        .unwrap_or_else(|_| s.to_string())
}

/// Parse the part of a data URI after `data:`
fn parse_data_uri(rest: &str) -> Result<ImageRef, ImageRefError> {
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| ImageRefError::MalformedDataUri("missing ',' separator".to_string()))?;

    let mut params = meta.split(';');
    let content_type = params
        .next()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .unwrap_or("application/octet-stream")
        .to_lowercase();
    let is_base64 = params.any(|p| p.trim().eq_ignore_ascii_case("base64"));

    let data = if is_base64 {
        let compact: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        base64::engine::general_purpose::STANDARD
            .decode(compact.as_bytes())
            .map_err(|e| ImageRefError::InvalidBase64(e.to_string()))?
    } else {
        urlencoding::decode_binary(payload.as_bytes()).into_owned()
    };

    if data.is_empty() {
        return Err(ImageRefError::MalformedDataUri("empty payload".to_string()));
    }

    Ok(ImageRef::Inline { content_type, data })
}

//! S3 URL parsing
//!
//! Document records reference their objects by URL. Two shapes exist in the
//! corpus:
//!
//! - **Well-formed**: `s3://bucket/allusers/<uuid>.<ext>` (or the
//!   virtual-hosted `https://bucket.s3.amazonaws.com/<key>` form). The object
//!   key is everything after the bucket.
//! - **Legacy**: `s3://bucket/<uuid>.<ext>/<original filename>`. Historical
//!   uploads appended the human-readable filename to the URL, so the real
//!   object lives at `allusers/<uuid>.<ext>` and the trailing segment (which
//!   may itself contain `/`) must be discarded.
//!
//! Everything here is pure string handling; no I/O.

use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use thiserror::Error;

/// Prefix under which uploaded documents are stored
pub const DOCUMENT_KEY_PREFIX: &str = "allusers";

/// Prefix under which generated zip packages are stored
pub const ZIP_KEY_PREFIX: &str = "zips";

/// Errors raised while parsing an S3 URL
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum S3UrlError {
    #[error("missing or invalid scheme in '{0}'")]
    MissingScheme(String),

    #[error("missing bucket name in '{0}'")]
    MissingBucket(String),

    #[error("missing object key in '{0}'")]
    MissingKey(String),

    #[error("'{0}' is not a legacy bucket/<uuid>/<filename> URL")]
    NotLegacy(String),
}

/// Bucket and key of an object in storage
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct S3Location {
    pub bucket: String,
    pub key: String,
}

impl S3Location {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Render as an `s3://bucket/key` URL
    pub fn to_url(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.key)
    }
}

impl std::fmt::Display for S3Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

/// Extract bucket and key from `scheme://bucket/key...` or
/// `https://bucket.s3.<region>.amazonaws.com/key...`.
///
/// Any other HTTP host (`s3.<region>.amazonaws.com`, MinIO on an IP or
/// `localhost`) is path-style; the bucket is then the first path segment.
pub fn parse_bucket_and_key(url: &str) -> Result<S3Location, S3UrlError> {
    let (scheme, rest) = split_scheme(url)?;

    let (authority, path) = rest.split_once('/').unwrap_or((rest, ""));
    if authority.is_empty() {
        return Err(S3UrlError::MissingBucket(url.to_string()));
    }

    let (bucket, key) = if is_http(scheme) {
        match virtual_hosted_bucket(authority) {
            Some(bucket) => (bucket, path),
            None => path.split_once('/').unwrap_or((path, "")),
        }
    } else {
        (authority, path)
    };

    if bucket.is_empty() {
        return Err(S3UrlError::MissingBucket(url.to_string()));
    }
    if key.is_empty() {
        return Err(S3UrlError::MissingKey(url.to_string()));
    }

    Ok(S3Location::new(bucket, key))
}

/// Extract the true object key from a legacy `scheme://bucket/<uuid>/<filename>` URL.
///
/// Returns `allusers/<uuid>`; the filename segment, including any further
/// slashes inside it, is ignored.
pub fn extract_legacy_key(url: &str) -> Result<String, S3UrlError> {
    let location = parse_bucket_and_key(url)?;

    match location.key.split_once('/') {
        Some((object_id, filename)) if !object_id.is_empty() && !filename.is_empty() => {
            Ok(format!("{}/{}", DOCUMENT_KEY_PREFIX, object_id))
        },
        _ => Err(S3UrlError::NotLegacy(url.to_string())),
    }
}

/// Resolve where a document URL actually lives, whichever shape it has.
///
/// Keys already under a known prefix and single-segment keys are used as is;
/// any other multi-segment key is treated as the legacy shape.
pub fn resolve_document_location(url: &str) -> Result<S3Location, S3UrlError> {
    let location = parse_bucket_and_key(url)?;

    if is_canonical_key(&location.key) || !location.key.contains('/') {
        return Ok(location);
    }

    let key = extract_legacy_key(url)?;
    Ok(S3Location::new(location.bucket, key))
}

/// Extract the key of a zip package URL (everything after the bucket).
pub fn extract_zip_key(url: &str) -> Result<String, S3UrlError> {
    parse_bucket_and_key(url).map(|location| location.key)
}

/// Whether a key already sits under one of the canonical prefixes
pub fn is_canonical_key(key: &str) -> bool {
    [DOCUMENT_KEY_PREFIX, ZIP_KEY_PREFIX].iter().any(|prefix| {
        key.strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
    })
}

fn split_scheme(url: &str) -> Result<(&str, &str), S3UrlError> {
    let (scheme, rest) = url
        .split_once("://")
        .ok_or_else(|| S3UrlError::MissingScheme(url.to_string()))?;

    let valid = !scheme.is_empty()
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    if !valid {
        return Err(S3UrlError::MissingScheme(url.to_string()));
    }

    Ok((scheme, rest))
}

fn is_http(scheme: &str) -> bool {
    scheme.eq_ignore_ascii_case("http") || scheme.eq_ignore_ascii_case("https")
}

/// Bucket of a `bucket.s3[.-]...` host; `None` for path-style endpoints
/// (`s3.<region>.amazonaws.com`, IP addresses, `localhost`, custom hosts).
fn virtual_hosted_bucket(authority: &str) -> Option<&str> {
    let host = strip_port(authority);
    if host.parse::<IpAddr>().is_ok() {
        return None;
    }

    let mut offset = 0;
    for label in host.split('.') {
        let lower = label.to_ascii_lowercase();
        if lower == "s3" || lower.starts_with("s3-") {
            // A leading s3 label is the path-style endpoint itself
            return (offset > 0).then(|| &host[..offset - 1]);
        }
        offset += label.len() + 1;
    }
    None
}

fn strip_port(authority: &str) -> &str {
    if let Some(bracketed) = authority.strip_prefix('[') {
        return bracketed.split_once(']').map_or(authority, |(ip, _)| ip);
    }
    match authority.rsplit_once(':') {
        Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) => host,
        _ => authority,
    }
}
